// Polyplex
// Copyright (c) 2024-2026 The Project Polyplex Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory RIFF builders shared by the unit tests.

use std::io::Cursor;

use polyplex_core::io::{MediaSourceStream, ReadOnlySource};

/// A RIFF chunk under construction.
pub struct Chunk {
    tag: [u8; 4],
    body: Vec<u8>,
}

impl Chunk {
    pub fn new(tag: &[u8; 4], body: &[u8]) -> Self {
        Chunk { tag: *tag, body: body.to_vec() }
    }

    /// A `LIST` chunk of the given form.
    pub fn list(form: &[u8; 4], children: &[Chunk]) -> Self {
        let mut body = form.to_vec();
        for child in children {
            body.extend(child.to_bytes());
        }
        Chunk { tag: *b"LIST", body }
    }

    /// Serialize the chunk, padded to an even length.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = self.tag.to_vec();
        buf.extend((self.body.len() as u32).to_le_bytes());
        buf.extend(&self.body);
        if self.body.len() % 2 == 1 {
            buf.push(0);
        }
        buf
    }
}

/// A complete RIFF file of the given form.
pub fn riff(form: &[u8; 4], children: &[Chunk]) -> Vec<u8> {
    let mut list = Chunk::list(form, children);
    list.tag = *b"RIFF";
    list.to_bytes()
}

/// The body of a `WAVEFORMATEX` structure. The extension size field is only written if `extra`
/// is not empty.
pub fn fmt_chunk_body(tag: u16, channels: u16, rate: u32, bits: u16, extra: &[u8]) -> Vec<u8> {
    let block_align = (channels * bits / 8).max(1);

    let mut buf = Vec::new();
    buf.extend(tag.to_le_bytes());
    buf.extend(channels.to_le_bytes());
    buf.extend(rate.to_le_bytes());
    buf.extend((rate * u32::from(block_align)).to_le_bytes());
    buf.extend(block_align.to_le_bytes());
    buf.extend(bits.to_le_bytes());

    if !extra.is_empty() {
        buf.extend((extra.len() as u16).to_le_bytes());
        buf.extend(extra);
    }

    buf
}

/// The value of every byte of audio frame `frame` in generated WAVE files.
pub fn frame_byte(frame: u32) -> u8 {
    (frame % 251) as u8
}

fn pcm_frames(channels: u16, frames: u32) -> Vec<u8> {
    let frame_len = 2 * usize::from(channels);
    (0..frames).flat_map(|f| std::iter::repeat(frame_byte(f)).take(frame_len)).collect()
}

/// A 16-bit PCM WAVE file with an `INFO` list before the data.
pub fn wav_file(channels: u16, rate: u32, frames: u32) -> Vec<u8> {
    riff(
        b"WAVE",
        &[
            Chunk::new(b"fmt ", &fmt_chunk_body(0x0001, channels, rate, 16, &[])),
            Chunk::list(b"INFO", &[Chunk::new(b"INAM", b"tone\0")]),
            Chunk::new(b"data", &pcm_frames(channels, frames)),
        ],
    )
}

/// A 16-bit PCM WAVE file as written to a pipe: the RIFF and data lengths are unknown.
pub fn streamed_wav_file(channels: u16, rate: u32, frames: u32) -> Vec<u8> {
    let mut buf = b"RIFF".to_vec();
    buf.extend(u32::MAX.to_le_bytes());
    buf.extend(b"WAVE");
    buf.extend(Chunk::new(b"fmt ", &fmt_chunk_body(0x0001, channels, rate, 16, &[])).to_bytes());
    buf.extend(b"data");
    buf.extend(u32::MAX.to_le_bytes());
    buf.extend(pcm_frames(channels, frames));
    buf
}

/// The `strl` list of a video stream.
pub fn video_strl(fourcc: &[u8; 4], scale: u32, rate: u32, length: u32) -> Chunk {
    let mut bmp = Vec::new();
    bmp.extend(40u32.to_le_bytes());
    bmp.extend(320i32.to_le_bytes());
    bmp.extend(240i32.to_le_bytes());
    bmp.extend(1u16.to_le_bytes());
    bmp.extend(24u16.to_le_bytes());
    bmp.extend(fourcc);
    bmp.extend([0; 20]);

    Chunk::list(
        b"strl",
        &[
            Chunk::new(b"strh", &strh_body(b"vids", fourcc, scale, rate, length, 0)),
            Chunk::new(b"strf", &bmp),
            Chunk::new(b"strn", b"picture\0"),
        ],
    )
}

/// The `strl` list of an audio stream described by a `WAVEFORMATEX` body.
pub fn audio_strl(wave_format: &[u8], scale: u32, rate: u32, sample_size: u32) -> Chunk {
    Chunk::list(
        b"strl",
        &[
            Chunk::new(b"strh", &strh_body(b"auds", &[0; 4], scale, rate, 0, sample_size)),
            Chunk::new(b"strf", wave_format),
        ],
    )
}

fn strh_body(
    fcc_type: &[u8; 4],
    handler: &[u8; 4],
    scale: u32,
    rate: u32,
    length: u32,
    sample_size: u32,
) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend(fcc_type);
    buf.extend(handler);
    // Flags, priority and language, initial frames.
    buf.extend([0; 12]);
    buf.extend(scale.to_le_bytes());
    buf.extend(rate.to_le_bytes());
    // Start.
    buf.extend(0u32.to_le_bytes());
    buf.extend(length.to_le_bytes());
    // Suggested buffer size, quality.
    buf.extend([0; 8]);
    buf.extend(sample_size.to_le_bytes());
    // Frame rectangle.
    buf.extend([0; 8]);
    buf
}

/// What the offsets of an `idx1` index count from.
pub enum IndexBase {
    Movi,
    File,
}

/// Builds an AVI file from stream lists and data chunks.
pub struct AviBuilder {
    strls: Vec<Chunk>,
    units: Vec<([u8; 4], Vec<u8>, bool)>,
    index: Option<IndexBase>,
    rec_lists: bool,
}

impl AviBuilder {
    pub fn new() -> Self {
        AviBuilder { strls: Vec::new(), units: Vec::new(), index: None, rec_lists: false }
    }

    pub fn stream(mut self, strl: Chunk) -> Self {
        self.strls.push(strl);
        self
    }

    pub fn unit(mut self, ckid: [u8; 4], payload: &[u8], keyframe: bool) -> Self {
        self.units.push((ckid, payload.to_vec(), keyframe));
        self
    }

    pub fn index(mut self, index: Option<IndexBase>) -> Self {
        self.index = index;
        self
    }

    /// Group every two data chunks in a `LIST rec ` list. Not combined with an index.
    pub fn rec_lists(mut self) -> Self {
        self.rec_lists = true;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut avih = Vec::new();
        avih.extend(40_000u32.to_le_bytes());
        avih.extend([0; 8]);
        let flags: u32 = if self.index.is_some() { 0x10 } else { 0 };
        avih.extend(flags.to_le_bytes());
        avih.extend((self.units.len() as u32).to_le_bytes());
        avih.extend(0u32.to_le_bytes());
        avih.extend((self.strls.len() as u32).to_le_bytes());
        avih.extend(0u32.to_le_bytes());
        avih.extend(320u32.to_le_bytes());
        avih.extend(240u32.to_le_bytes());
        avih.extend([0; 16]);

        let mut hdrl_children = vec![Chunk::new(b"avih", &avih)];
        for strl in &self.strls {
            hdrl_children.push(Chunk { tag: strl.tag, body: strl.body.clone() });
        }
        let hdrl = Chunk::list(b"hdrl", &hdrl_children).to_bytes();

        // The body of the movi list, starting with its form. Offsets into it are the relative
        // offsets of idx1.
        let mut movi = b"movi".to_vec();
        movi.extend(Chunk::new(b"JUNK", &[0; 6]).to_bytes());

        let mut idx1 = Vec::new();

        if self.rec_lists {
            for pair in self.units.chunks(2) {
                let children: Vec<Chunk> =
                    pair.iter().map(|(ckid, payload, _)| Chunk::new(ckid, payload)).collect();
                movi.extend(Chunk::list(b"rec ", &children).to_bytes());
            }
        }
        else {
            let movi_abs = (12 + hdrl.len() + 8) as u32;

            for (ckid, payload, keyframe) in &self.units {
                let offset = match self.index {
                    Some(IndexBase::File) => movi_abs + movi.len() as u32,
                    _ => movi.len() as u32,
                };

                idx1.extend(ckid);
                idx1.extend((if *keyframe { 0x10u32 } else { 0 }).to_le_bytes());
                idx1.extend(offset.to_le_bytes());
                idx1.extend((payload.len() as u32).to_le_bytes());

                movi.extend(Chunk::new(ckid, payload).to_bytes());
            }
        }

        let mut body = b"AVI ".to_vec();
        body.extend(hdrl);
        body.extend(Chunk { tag: *b"LIST", body: movi }.to_bytes());

        if self.index.is_some() {
            body.extend(Chunk::new(b"idx1", &idx1).to_bytes());
        }

        Chunk { tag: *b"RIFF", body }.to_bytes()
    }
}

pub fn source(bytes: Vec<u8>) -> MediaSourceStream {
    MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default())
}

pub fn unseekable_source(bytes: Vec<u8>) -> MediaSourceStream {
    MediaSourceStream::new(Box::new(ReadOnlySource::new(Cursor::new(bytes))), Default::default())
}
