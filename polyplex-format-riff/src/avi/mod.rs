// Polyplex
// Copyright (c) 2024-2026 The Project Polyplex Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io;

use polyplex_core::codecs::{Bitrate, CodecId, CompressionInfo};
use polyplex_core::errors::{decode_error, limit_error, seek_error, Result, SeekErrorKind};
use polyplex_core::formats::prelude::*;
use polyplex_core::formats::{AudioFormat, StreamFlags, StreamFormat, TextFormat, VideoFormat};
use polyplex_core::io::{BufReader, MediaSourceStream, ReadBytes};
use polyplex_core::packet::{Packet, PacketFlags};

use log::{debug, info, warn};

use crate::common::{ascii, probe_riff, read_riff_header, ChunksReader, ParseChunk, WaveFormat};

mod chunks;

use chunks::*;

/// The AVI RIFF form.
const AVI_RIFF_FORM: [u8; 4] = *b"AVI ";

const AVI_FORMAT_INFO: FormatInfo =
    FormatInfo { short_name: "avi", long_name: "Audio Video Interleave" };

/// Per-stream state of the driver.
struct AviTrack {
    kind: StreamType,
    /// Bytes per sample of an audio stream. Zero if chunks carry whole frames.
    sample_size: u32,
    /// Chunks of the stream are keyframes unless the index says otherwise.
    intra_only: bool,
    /// The timestamp of the next chunk delivered sequentially.
    next_pts: Timestamp,
    start: Timestamp,
}

impl AviTrack {
    /// The number of ticks a chunk of `size` bytes lasts.
    fn ticks(&self, size: u32) -> Duration {
        match self.kind {
            StreamType::Audio if self.sample_size > 0 => i64::from(size / self.sample_size),
            _ => 1,
        }
    }
}

/// The streams parsed from `LIST hdrl`.
struct HeaderList {
    main: MainHeaderChunk,
    streams: Vec<StreamInfo>,
    /// Indexed by the stream number used in chunk IDs. `None` for unsupported stream types.
    tracks: Vec<Option<AviTrack>>,
}

/// Audio Video Interleave (AVI) format driver.
///
/// `AviDriver` builds a superindex from the legacy `idx1` index when one is present, otherwise it
/// delivers the chunks of the `movi` list in file order.
pub struct AviDriver {
    streams: Vec<StreamInfo>,
    tracks: Vec<Option<AviTrack>>,
    index: Option<Superindex>,
    /// The position of the first chunk in the `movi` list.
    movi_start: u64,
    /// The position one past the end of the `movi` list.
    movi_end: u64,
    max_packet_size: u32,
}

impl AviDriver {
    fn read_header_list(src: &mut MediaSourceStream, len: u32) -> Result<HeaderList> {
        let mut chunks = ChunksReader::<HeaderListChunks>::new(Some(len));

        let mut main = None;
        let mut streams = Vec::new();
        let mut tracks = Vec::new();

        while let Some(chunk) = chunks.next(src)? {
            match chunk {
                HeaderListChunks::MainHeader(avih) => {
                    main = Some(avih.parse(src)?);
                }
                HeaderListChunks::List(lst) => {
                    let list = lst.parse(src)?;

                    if &list.form != b"strl" {
                        list.skip(src)?;
                        continue;
                    }

                    let Some(ref main) = main
                    else {
                        return decode_error("avi: strl list before avih chunk");
                    };

                    let number = tracks.len() as u32;

                    match read_stream_list(src, list.len, number, main)? {
                        Some((info, track)) => {
                            streams.push(info);
                            tracks.push(Some(track));
                        }
                        None => tracks.push(None),
                    }
                }
            }
        }

        chunks.finish(src)?;

        let Some(main) = main
        else {
            return decode_error("avi: missing avih chunk");
        };

        if main.n_streams as usize != tracks.len() {
            debug!("avih declares {} streams, found {}", main.n_streams, tracks.len());
        }

        // The first stream of each type is the default one.
        for kind in [StreamType::Video, StreamType::Audio] {
            if let Some(info) = streams.iter_mut().find(|info| info.stream_type() == kind) {
                info.flags |= StreamFlags::DEFAULT;
            }
        }

        Ok(HeaderList { main, streams, tracks })
    }

    /// Build the superindex from the `idx1` entries.
    fn build_superindex(&self, entries: &[IndexEntry], movi_list: u64) -> Superindex {
        // Offsets point at chunk headers, either relative to the "movi" form or absolute. The
        // first chunk of the list can not precede the list itself.
        let first = entries.iter().find(|entry| parse_chunk_id(&entry.ckid).is_some());

        let base = match first {
            Some(entry) if u64::from(entry.offset) < movi_list => {
                debug!("idx1 offsets are relative to the movi list");
                movi_list
            }
            _ => 0,
        };

        let mut index = Superindex::with_capacity(entries.len());

        let mut next_pts: Vec<Timestamp> =
            self.tracks.iter().map(|track| track.as_ref().map_or(0, |t| t.start)).collect();

        for entry in entries {
            let Some((number, kind)) = parse_chunk_id(&entry.ckid)
            else {
                continue;
            };

            if kind == DataKind::PaletteChange {
                continue;
            }

            let Some(Some(track)) = self.tracks.get(number as usize)
            else {
                continue;
            };

            let pts = next_pts[number as usize];
            let ticks = track.ticks(entry.size);
            next_pts[number as usize] += ticks;

            // Dropped frames take time but carry no data.
            if entry.size == 0 {
                continue;
            }

            if entry.size > self.max_packet_size {
                warn!("stream {}: skipping oversized chunk of {} bytes", number, entry.size);
                continue;
            }

            index.push(SuperindexEntry {
                stream_id: number,
                offset: base + u64::from(entry.offset) + 8,
                size: entry.size,
                pts,
                duration: ticks,
                keyframe: track.intra_only || entry.flags & INDEX_FLAG_KEYFRAME != 0,
                samples: ticks as u32,
            });
        }

        index
    }
}

fn read_stream_list(
    src: &mut MediaSourceStream,
    len: u32,
    number: u32,
    main: &MainHeaderChunk,
) -> Result<Option<(StreamInfo, AviTrack)>> {
    let mut chunks = ChunksReader::<StreamListChunks>::new(Some(len));

    let mut header = None;
    let mut format = None;
    let mut name = None;

    while let Some(chunk) = chunks.next(src)? {
        match chunk {
            StreamListChunks::Header(strh) => header = Some(strh.parse(src)?),
            StreamListChunks::Format(strf) => format = Some(strf.parse(src)?.data),
            StreamListChunks::Name(strn) => name = Some(strn.parse(src)?.name),
        }
    }

    chunks.finish(src)?;

    let Some(header) = header
    else {
        return decode_error("avi: strl list without strh chunk");
    };

    let format = format.unwrap_or_default();

    let kind = match &header.fcc_type {
        b"vids" => StreamType::Video,
        b"auds" => StreamType::Audio,
        b"txts" => StreamType::Text,
        other => {
            info!("stream {}: ignoring unsupported stream type {}", number, ascii(other));
            return Ok(None);
        }
    };

    let time_base = match TimeBase::try_new(header.scale, header.rate) {
        Some(tb) => tb,
        // Fall back to the frame period of the main header.
        None if kind == StreamType::Video && main.micro_sec_per_frame > 0 => {
            TimeBase::new(main.micro_sec_per_frame, 1_000_000)
        }
        None => return decode_error("avi: stream has no valid time base"),
    };

    let mut compression;
    let stream_format;

    match kind {
        StreamType::Video => {
            let bmp =
                BitmapInfo::parse(&mut BufReader::new(&format), *b"strf", format.len() as u32)?;

            let mapping =
                codec_for_fourcc(&bmp.compression).or_else(|| codec_for_fourcc(&header.handler));

            compression = match mapping {
                Some((id, flags)) => {
                    let mut compression = CompressionInfo::new(id);
                    compression.with_flags(flags);
                    compression
                }
                None => {
                    info!("stream {}: unknown video fourcc {}", number, ascii(&bmp.compression));
                    CompressionInfo::new(CodecId::None)
                }
            };

            // Paletted raw video carries its palette where codecs put their headers.
            if compression.id == CodecId::RawVideo && bmp.bit_count <= 8 {
                let palette_size = if bmp.clr_used > 0 { bmp.clr_used } else { 1 << bmp.bit_count };
                compression.with_palette_size(palette_size);
            }

            compression.set_global_header(&bmp.extra);

            let (width, height) = match (bmp.width, bmp.height) {
                (0, 0) => (main.width, main.height),
                dims => dims,
            };

            stream_format = StreamFormat::Video(VideoFormat { width, height, frame_duration: 1 });
        }
        StreamType::Audio => {
            let wave =
                WaveFormat::parse(&mut BufReader::new(&format), *b"strf", format.len() as u32)?;

            compression = match wave.codec {
                Some(id) => CompressionInfo::new(id),
                None => {
                    info!("stream {}: unknown wave format tag {:#06x}", number, wave.format_tag);
                    CompressionInfo::new(CodecId::None)
                }
            };

            if wave.avg_bytes_per_sec > 0 {
                let bitrate = wave.avg_bytes_per_sec.saturating_mul(8);
                compression.with_bitrate(Bitrate::Constant(bitrate));
            }

            compression.set_global_header(&wave.extra);

            stream_format = StreamFormat::Audio(AudioFormat {
                sample_rate: wave.sample_rate,
                channels: wave.n_channels,
                bits_per_sample: wave.bits_per_sample,
                block_align: wave.block_align,
            });
        }
        StreamType::Text => {
            compression = CompressionInfo::new(CodecId::None);
            stream_format = StreamFormat::Text(TextFormat::default());
        }
    }

    let intra_only = kind != StreamType::Video || !compression.has_inter_frames();

    let mut info = StreamInfo::new(number, time_base, stream_format);
    info.compression = compression;
    info.name = name.filter(|name| !name.is_empty());

    info.duration = match header.length {
        0 if kind == StreamType::Video && main.total_frames > 0 => {
            Some(i64::from(main.total_frames))
        }
        0 => None,
        length => Some(i64::from(length)),
    };

    let track = AviTrack {
        kind,
        sample_size: header.sample_size,
        intra_only,
        next_pts: i64::from(header.start),
        start: i64::from(header.start),
    };

    Ok(Some((info, track)))
}

impl FormatDriver for AviDriver {
    fn probe(header: &[u8]) -> bool {
        probe_riff(header, &AVI_RIFF_FORM)
    }

    fn open(src: &mut MediaSourceStream, options: &FormatOptions) -> Result<Self> {
        let riff_len = read_riff_header(src, &AVI_RIFF_FORM)?;

        let mut riff_chunks = ChunksReader::<RiffAviChunks>::new(riff_len);

        let mut header_list = None;
        let mut movi = None;
        let mut idx1 = None;

        loop {
            let chunk = match riff_chunks.next(src) {
                Ok(chunk) => chunk,
                // Files cut short often still have a usable movi list.
                Err(err) if movi.is_some() => {
                    warn!("stopped reading chunks after the movi list: {}", err);
                    None
                }
                Err(err) => return Err(err),
            };

            let Some(chunk) = chunk
            else {
                break;
            };

            match chunk {
                RiffAviChunks::List(lst) => {
                    let list = lst.parse(src)?;

                    match &list.form {
                        b"hdrl" => header_list = Some(AviDriver::read_header_list(src, list.len)?),
                        b"movi" if movi.is_none() => {
                            let start = src.pos();
                            let end = start + u64::from(list.len);

                            movi = Some((start, end));

                            // The index follows the movi list. Skip ahead for it, unless the
                            // chunks will be read in order anyway.
                            if !options.prefer_superindex || !src.is_seekable() {
                                break;
                            }

                            src.seek_to(end)?;
                        }
                        _ => list.skip(src)?,
                    }
                }
                RiffAviChunks::Index(chunk) => {
                    if options.prefer_superindex && idx1.is_none() {
                        idx1 = Some(chunk.parse(src)?);
                    }
                    else {
                        chunk.skip(src)?;
                    }
                }
            }
        }

        let Some(HeaderList { main, streams, tracks }) = header_list
        else {
            return decode_error("avi: missing hdrl list");
        };

        let Some((movi_start, movi_end)) = movi
        else {
            return decode_error("avi: missing movi list");
        };

        debug!(
            "avi: {} streams, flags={:?}, movi={}..{}",
            streams.len(),
            main.flags,
            movi_start,
            movi_end
        );

        let mut driver = AviDriver {
            streams,
            tracks,
            index: None,
            movi_start,
            movi_end,
            max_packet_size: options.max_packet_size,
        };

        match idx1 {
            Some(idx1) => {
                // The offsets of relative entries count from the "movi" form.
                let index = driver.build_superindex(&idx1.entries, movi_start - 4);
                info!("avi: superindex of {} entries", index.len());
                driver.index = Some(index);
            }
            None => {
                if main.flags.contains(AviFlags::HAS_INDEX) && options.prefer_superindex {
                    warn!("avi: header announces an index, but there is none");
                }

                info!("avi: reading chunks sequentially");

                if src.pos() != movi_start {
                    src.seek_to(movi_start)?;
                }
            }
        }

        Ok(driver)
    }

    fn format_info(&self) -> &FormatInfo {
        &AVI_FORMAT_INFO
    }

    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    fn take_superindex(&mut self) -> Option<Superindex> {
        self.index.take()
    }

    fn caps(&self) -> DriverCaps {
        DriverCaps::empty()
    }

    fn next_unit(&mut self, src: &mut MediaSourceStream, pkt: &mut Packet) -> Result<bool> {
        loop {
            // Chunks are aligned to 2-byte boundaries.
            let mut pos = src.pos();

            if pos & 0x1 == 1 && pos < self.movi_end {
                src.ignore_bytes(1)?;
                pos += 1;
            }

            if pos + 8 > self.movi_end {
                return Ok(false);
            }

            let (ckid, len) = match read_chunk_header(src) {
                Ok(header) => header,
                Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                    warn!("avi: movi list is truncated");
                    return Ok(false);
                }
                Err(err) => return Err(err.into()),
            };

            // The children of a "rec " list are regular chunks.
            if &ckid == b"LIST" {
                let form = src.read_quad_bytes()?;

                if &form != b"rec " {
                    src.ignore_bytes(u64::from(len.saturating_sub(4)))?;
                }
                continue;
            }

            let Some((number, kind)) = parse_chunk_id(&ckid)
            else {
                if &ckid != b"JUNK" {
                    info!("ignoring unknown chunk: tag={}, len={}", ascii(&ckid), len);
                }
                src.ignore_bytes(u64::from(len))?;
                continue;
            };

            let track = match self.tracks.get_mut(number as usize) {
                Some(Some(track)) if kind != DataKind::PaletteChange => track,
                _ => {
                    src.ignore_bytes(u64::from(len))?;
                    continue;
                }
            };

            let pts = track.next_pts;
            let ticks = track.ticks(len);
            track.next_pts += ticks;

            if len == 0 {
                continue;
            }

            if len > self.max_packet_size {
                return limit_error("avi: chunk exceeds the maximum packet size");
            }

            pkt.reset();
            pkt.read_from(src, len as usize)?;
            pkt.stream_id = number;
            pkt.pts = Some(pts);
            pkt.duration = Some(ticks);
            pkt.samples = Some(ticks as u32);
            pkt.position = Some(pos + 8);

            // Without an index only intra-only streams are known to be made of keyframes.
            if track.intra_only {
                pkt.flags |= PacketFlags::KEYFRAME;
            }

            return Ok(true);
        }
    }

    fn seek(&mut self, _src: &mut MediaSourceStream, _time: Time) -> Result<Time> {
        seek_error(SeekErrorKind::Unseekable)
    }

    fn close(&mut self) {
        debug!("avi: closing, {} bytes of movi data", self.movi_end - self.movi_start);
    }
}

fn read_chunk_header(src: &mut MediaSourceStream) -> io::Result<([u8; 4], u32)> {
    Ok((src.read_quad_bytes()?, src.read_u32()?))
}

#[cfg(test)]
mod tests {
    use polyplex_core::demux::{Demuxer, Layout};

    use super::*;
    use crate::testing::*;

    fn av_file(index: Option<IndexBase>) -> Vec<u8> {
        let mut avi = AviBuilder::new()
            .stream(video_strl(b"MJPG", 1, 25, 4))
            .stream(audio_strl(&fmt_chunk_body(0x0001, 1, 8000, 16, &[]), 1, 8000, 2));

        for k in 0..4u8 {
            avi = avi.unit(*b"00dc", &[k; 10], true).unit(*b"01wb", &[0x80 | k; 640], true);
        }

        avi.index(index).build()
    }

    fn open(bytes: Vec<u8>, options: &FormatOptions) -> (MediaSourceStream, AviDriver) {
        let mut src = source(bytes);
        let driver = AviDriver::open(&mut src, options).unwrap();
        (src, driver)
    }

    #[test]
    fn verify_probe() {
        let file = av_file(None);
        assert!(AviDriver::probe(&file[..12]));
        assert!(!AviDriver::probe(b"RIFF\x00\x00\x00\x00WAVE"));
    }

    #[test]
    fn verify_stream_headers() {
        let (_, driver) = open(av_file(Some(IndexBase::Movi)), &Default::default());

        let streams = driver.streams();
        assert_eq!(streams.len(), 2);

        assert_eq!(streams[0].stream_type(), StreamType::Video);
        assert_eq!(streams[0].time_base, TimeBase::new(1, 25));
        assert_eq!(streams[0].compression.id, CodecId::Mjpeg);
        assert_eq!(streams[0].duration, Some(4));

        assert_eq!(streams[1].stream_type(), StreamType::Audio);
        assert_eq!(streams[1].time_base, TimeBase::new(1, 8000));
        assert_eq!(streams[1].compression.id, CodecId::PcmS16Le);
        assert_eq!(streams[1].compression.bitrate, Bitrate::Constant(128_000));
    }

    #[test]
    fn verify_relative_and_absolute_index() {
        for base in [IndexBase::Movi, IndexBase::File] {
            let file = av_file(Some(base));
            let (_, mut driver) = open(file.clone(), &Default::default());

            let index = driver.take_superindex().unwrap();
            assert_eq!(index.len(), 8);

            for (k, entry) in index.entries().iter().enumerate() {
                let payload = &file[entry.offset as usize..entry.end() as usize];
                let unit = (k / 2) as u8;

                if entry.stream_id == 0 {
                    assert_eq!(payload, &[unit; 10]);
                    assert_eq!(entry.pts, k as i64 / 2);
                }
                else {
                    assert_eq!(payload, &[0x80 | unit; 640]);
                    // 640 bytes of 16-bit mono audio are 320 samples.
                    assert_eq!(entry.pts, 320 * (k as i64 / 2));
                    assert_eq!(entry.duration, 320);
                }
            }
        }
    }

    #[test]
    fn verify_demux_indexed() {
        let file = av_file(Some(IndexBase::Movi));
        let mut src = source(file);
        let driver = AviDriver::open(&mut src, &Default::default()).unwrap();

        let mut demux = Demuxer::new(src, driver, &Default::default()).unwrap();
        assert_eq!(demux.layout(), Layout::Interleaved);

        demux.start();

        for k in 0..4 {
            let pkt = demux.get_packet(1).unwrap().unwrap();
            assert_eq!(pkt.pts, Some(320 * k));
            assert_eq!(pkt.data_len(), 640);
        }
        assert!(demux.get_packet(1).unwrap().is_none());
    }

    #[test]
    fn verify_sequential_without_index() {
        let mut avi = AviBuilder::new()
            .stream(video_strl(b"XVID", 1, 25, 3))
            .stream(audio_strl(&fmt_chunk_body(0x0055, 1, 8000, 0, &[1; 12]), 1, 1000, 0));

        for k in 0..3u8 {
            avi = avi.unit(*b"00dc", &[k; 7], k == 0).unit(*b"01wb", &[k; 20], true);
        }

        let (mut src, mut driver) = open(avi.rec_lists().build(), &Default::default());

        assert!(driver.take_superindex().is_none());
        assert!(driver.caps().is_empty());
        assert!(driver.streams()[0].compression.has_inter_frames());

        let mut pkt = Packet::new();
        let mut got = Vec::new();

        while driver.next_unit(&mut src, &mut pkt).unwrap() {
            got.push((pkt.stream_id, pkt.pts.unwrap(), pkt.data_len(), pkt.is_keyframe()));
        }

        assert_eq!(
            got,
            vec![
                (0, 0, 7, false),
                (1, 0, 20, true),
                (0, 1, 7, false),
                (1, 1, 20, true),
                (0, 2, 7, false),
                (1, 2, 20, true),
            ]
        );
    }

    #[test]
    fn verify_index_ignored_when_not_preferred() {
        let options = FormatOptions { prefer_superindex: false, ..Default::default() };
        let (mut src, mut driver) = open(av_file(Some(IndexBase::Movi)), &options);

        assert!(driver.take_superindex().is_none());

        let mut pkt = Packet::new();
        assert!(driver.next_unit(&mut src, &mut pkt).unwrap());
        assert_eq!((pkt.stream_id, pkt.data_len()), (0, 10));
    }

    #[test]
    fn verify_oversized_chunk_rejected() {
        let options =
            FormatOptions { prefer_superindex: false, max_packet_size: 100, ..Default::default() };
        let (mut src, mut driver) = open(av_file(None), &options);

        let mut pkt = Packet::new();
        assert!(driver.next_unit(&mut src, &mut pkt).unwrap());
        assert!(driver.next_unit(&mut src, &mut pkt).is_err());
    }

    #[test]
    fn verify_not_seekable_without_index() {
        let (mut src, mut driver) = open(av_file(None), &Default::default());
        assert!(driver.seek(&mut src, Time::ZERO).is_err());
    }
}
