// Polyplex
// Copyright (c) 2024-2026 The Project Polyplex Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::marker::PhantomData;

use polyplex_core::codecs::CodecId;
use polyplex_core::errors::{decode_error, unsupported_error, Result};
use polyplex_core::io::ReadBytes;

use log::{debug, error, info};

/// Every RIFF file starts with this marker.
pub const RIFF_STREAM_MARKER: [u8; 4] = *b"RIFF";

/// Returns true if `header` starts a RIFF stream of the given form.
pub fn probe_riff(header: &[u8], form: &[u8; 4]) -> bool {
    header.len() >= 12 && header[0..4] == RIFF_STREAM_MARKER && header[8..12] == *form
}

/// Read the top-level RIFF chunk header and check its form. Returns the length of the RIFF chunk
/// body following the form, or `None` if the writer did not know it.
pub fn read_riff_header<B: ReadBytes>(reader: &mut B, form: &[u8; 4]) -> Result<Option<u32>> {
    let marker = reader.read_quad_bytes()?;

    if marker != RIFF_STREAM_MARKER {
        return unsupported_error("riff: missing riff stream marker");
    }

    // The length of the top-level RIFF chunk. Must be at least 4 bytes for the form.
    let riff_len = reader.read_u32()?;

    if riff_len < 4 {
        return decode_error("riff: invalid riff length");
    }

    let riff_form = reader.read_quad_bytes()?;

    if riff_form != *form {
        error!("riff form is not {} ({})", ascii(form), ascii(&riff_form));
        return unsupported_error("riff: unexpected riff form");
    }

    // Streaming writers set the length to (2^32)-1 since the size is not known ahead of time.
    Ok(if riff_len < u32::MAX { Some(riff_len - 4) } else { None })
}

/// Render a four character code for logging.
pub fn ascii(tag: &[u8; 4]) -> String {
    String::from_utf8_lossy(tag).into_owned()
}

/// `ParseChunkTag` maps a chunk identifier to the enumeration of chunks understood within the
/// parent chunk.
pub trait ParseChunkTag: Sized {
    fn parse_tag(tag: [u8; 4], len: u32) -> Option<Self>;
}

pub enum NullChunks {}

impl ParseChunkTag for NullChunks {
    fn parse_tag(_tag: [u8; 4], _len: u32) -> Option<Self> {
        None
    }
}

/// `ChunksReader` iterates over the child chunks of a parent chunk. Child chunks `T` does not
/// recognize are skipped. Recognized chunks are returned unread so the caller decides how, and
/// whether, to parse their bodies.
pub struct ChunksReader<T: ParseChunkTag> {
    len: Option<u64>,
    consumed: u64,
    phantom: PhantomData<T>,
}

impl<T: ParseChunkTag> ChunksReader<T> {
    pub fn new(len: Option<u32>) -> Self {
        ChunksReader { len: len.map(u64::from), consumed: 0, phantom: PhantomData }
    }

    pub fn next<B: ReadBytes>(&mut self, reader: &mut B) -> Result<Option<T>> {
        loop {
            if let Some(len) = self.len {
                if self.consumed >= len {
                    return Ok(None);
                }
            }

            // Chunks are aligned to 2-byte boundaries.
            if self.consumed & 0x1 == 1 {
                reader.read_u8()?;
                self.consumed += 1;
            }

            if let Some(len) = self.len {
                if self.consumed + 8 > len {
                    return Ok(None);
                }
            }

            let tag = reader.read_quad_bytes()?;
            let chunk_len = reader.read_u32()?;

            self.consumed += 8;

            if let Some(len) = self.len {
                // chunk_len is untrusted, do not add to it.
                if len - self.consumed < u64::from(chunk_len) {
                    debug!("chunk length of {} exceeds parent chunk length", ascii(&tag));
                    return decode_error("riff: chunk length exceeds parent chunk length");
                }
            }

            self.consumed = self.consumed.saturating_add(u64::from(chunk_len));

            match T::parse_tag(tag, chunk_len) {
                Some(chunk) => return Ok(Some(chunk)),
                None => {
                    info!("ignoring unknown chunk: tag={}, len={}", ascii(&tag), chunk_len);
                    reader.ignore_bytes(u64::from(chunk_len))?
                }
            }
        }
    }

    /// Skip whatever remains of the parent chunk.
    pub fn finish<B: ReadBytes>(&mut self, reader: &mut B) -> Result<()> {
        if let Some(parent_len) = self.len {
            if self.consumed < parent_len {
                let remaining = parent_len - self.consumed;
                reader.ignore_bytes(remaining)?;
                self.consumed += remaining;
            }

            if parent_len & 0x1 == 1 {
                reader.read_u8()?;
            }
        }

        Ok(())
    }
}

/// Implemented by every chunk body a `ChunkParser` can produce.
pub trait ParseChunk: Sized {
    fn parse<B: ReadBytes>(reader: &mut B, tag: [u8; 4], len: u32) -> Result<Self>;
}

/// A recognized, but not yet read, chunk.
pub struct ChunkParser<P: ParseChunk> {
    tag: [u8; 4],
    pub len: u32,
    phantom: PhantomData<P>,
}

impl<P: ParseChunk> ChunkParser<P> {
    pub fn new(tag: [u8; 4], len: u32) -> Self {
        ChunkParser { tag, len, phantom: PhantomData }
    }

    pub fn parse<B: ReadBytes>(&self, reader: &mut B) -> Result<P> {
        P::parse(reader, self.tag, self.len)
    }

    /// Skip the chunk body without parsing it.
    pub fn skip<B: ReadBytes>(&self, reader: &mut B) -> Result<()> {
        Ok(reader.ignore_bytes(u64::from(self.len))?)
    }
}

macro_rules! parser {
    ($class:expr, $result:ty, $tag:expr, $len:expr) => {
        Some($class(ChunkParser::<$result>::new($tag, $len)))
    };
}

pub(crate) use parser;

/// A `LIST` chunk. Only the form is read, the children follow.
pub struct ListChunk {
    pub form: [u8; 4],
    /// The length of the children.
    pub len: u32,
}

impl ListChunk {
    pub fn skip<B: ReadBytes>(&self, reader: &mut B) -> Result<()> {
        ChunksReader::<NullChunks>::new(Some(self.len)).finish(reader)
    }
}

impl ParseChunk for ListChunk {
    fn parse<B: ReadBytes>(reader: &mut B, _tag: [u8; 4], len: u32) -> Result<Self> {
        // An empty list still carries its form.
        if len < 4 {
            return decode_error("riff: malformed list chunk");
        }

        Ok(ListChunk { form: reader.read_quad_bytes()?, len: len - 4 })
    }
}

/// The body of a chunk read whole into memory.
pub struct RawChunk {
    pub data: Box<[u8]>,
}

impl ParseChunk for RawChunk {
    fn parse<B: ReadBytes>(reader: &mut B, _tag: [u8; 4], len: u32) -> Result<Self> {
        Ok(RawChunk { data: reader.read_boxed_slice_exact(len as usize)? })
    }
}

// The definition of these format identifiers can be found in mmreg.h of the Microsoft Windows
// Platform SDK.
const WAVE_FORMAT_PCM: u16 = 0x0001;
const WAVE_FORMAT_ADPCM: u16 = 0x0002;
const WAVE_FORMAT_IEEE_FLOAT: u16 = 0x0003;
const WAVE_FORMAT_ALAW: u16 = 0x0006;
const WAVE_FORMAT_MULAW: u16 = 0x0007;
const WAVE_FORMAT_ADPCM_IMA: u16 = 0x0011;
const WAVE_FORMAT_MPEG: u16 = 0x0050;
const WAVE_FORMAT_MPEGLAYER3: u16 = 0x0055;
const WAVE_FORMAT_AAC: u16 = 0x00ff;
const WAVE_FORMAT_MPEG_HEAAC: u16 = 0x1610;
const WAVE_FORMAT_DOLBY_AC3: u16 = 0x2000;
const WAVE_FORMAT_VORBIS: u16 = 0x674f;
const WAVE_FORMAT_FLAC: u16 = 0xf1ac;
const WAVE_FORMAT_EXTENSIBLE: u16 = 0xfffe;

/// The tail shared by every `KSDATAFORMAT_SUBTYPE_*` GUID. The first two bytes are the format tag.
/// See ksmedia.h of the Microsoft Windows Platform SDK.
#[rustfmt::skip]
const KSDATAFORMAT_SUBTYPE_TAIL: [u8; 14] = [
    0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0xaa, 0x00, 0x38, 0x9b, 0x71,
];

/// Map a WAVE format tag to a codec. PCM and IEEE float select a codec by sample width.
pub fn codec_for_format_tag(tag: u16, bits_per_sample: u16) -> Option<CodecId> {
    let codec = match tag {
        WAVE_FORMAT_PCM => match bits_per_sample {
            8 => CodecId::PcmU8,
            16 => CodecId::PcmS16Le,
            24 => CodecId::PcmS24Le,
            32 => CodecId::PcmS32Le,
            _ => return None,
        },
        WAVE_FORMAT_IEEE_FLOAT => match bits_per_sample {
            32 => CodecId::PcmF32Le,
            64 => CodecId::PcmF64Le,
            _ => return None,
        },
        WAVE_FORMAT_ADPCM => CodecId::AdpcmMs,
        WAVE_FORMAT_ALAW => CodecId::PcmAlaw,
        WAVE_FORMAT_MULAW => CodecId::PcmMulaw,
        WAVE_FORMAT_ADPCM_IMA => CodecId::AdpcmIma,
        WAVE_FORMAT_MPEG => CodecId::Mp2,
        WAVE_FORMAT_MPEGLAYER3 => CodecId::Mp3,
        WAVE_FORMAT_AAC | WAVE_FORMAT_MPEG_HEAAC => CodecId::Aac,
        WAVE_FORMAT_DOLBY_AC3 => CodecId::Ac3,
        WAVE_FORMAT_VORBIS => CodecId::Vorbis,
        WAVE_FORMAT_FLAC => CodecId::Flac,
        _ => return None,
    };

    Some(codec)
}

/// A `WAVEFORMATEX` structure, as found in the `fmt ` chunk of a WAVE file and in the `strf`
/// chunk of an AVI audio stream.
pub struct WaveFormat {
    /// The format tag. For the extensible format, the tag of the sub-format.
    pub format_tag: u16,
    pub n_channels: u16,
    pub sample_rate: u32,
    pub avg_bytes_per_sec: u32,
    /// The size of one audio frame, or the codec block size.
    pub block_align: u16,
    /// The number of bits per sample as stored.
    pub bits_per_sample: u16,
    /// The codec, if the format tag is known.
    pub codec: Option<CodecId>,
    /// Codec specific data following the structure. Empty for the extensible format.
    pub extra: Box<[u8]>,
}

impl WaveFormat {
    /// Returns true if the data is a plain sequence of fixed size audio frames.
    pub fn is_frame_based(&self) -> bool {
        matches!(
            self.codec,
            Some(
                CodecId::PcmU8
                    | CodecId::PcmS16Le
                    | CodecId::PcmS24Le
                    | CodecId::PcmS32Le
                    | CodecId::PcmF32Le
                    | CodecId::PcmF64Le
                    | CodecId::PcmAlaw
                    | CodecId::PcmMulaw
            )
        )
    }

    fn read_ext_fmt(&mut self, extra: &[u8]) -> Result<()> {
        // The extension of the extensible format is exactly 22 bytes.
        if extra.len() < 22 {
            return decode_error("riff: malformed extensible format");
        }

        let valid_bits = u16::from_le_bytes([extra[0], extra[1]]);

        if valid_bits > self.bits_per_sample {
            return decode_error("riff: valid bits per sample exceed bits per coded sample");
        }

        let guid = &extra[6..22];

        if guid[2..] != KSDATAFORMAT_SUBTYPE_TAIL {
            return unsupported_error("riff: unsupported extensible sub-format");
        }

        self.format_tag = u16::from_le_bytes([guid[0], guid[1]]);
        self.codec = codec_for_format_tag(self.format_tag, self.bits_per_sample);

        Ok(())
    }
}

impl ParseChunk for WaveFormat {
    fn parse<B: ReadBytes>(reader: &mut B, _tag: [u8; 4], len: u32) -> Result<WaveFormat> {
        // The base structure is 16 bytes. The size of the extension follows, if present.
        if len < 16 {
            return decode_error("riff: malformed format chunk");
        }

        let format_tag = reader.read_u16()?;
        let n_channels = reader.read_u16()?;
        let sample_rate = reader.read_u32()?;
        let avg_bytes_per_sec = reader.read_u32()?;
        let block_align = reader.read_u16()?;
        let bits_per_sample = reader.read_u16()?;

        let mut remaining = len - 16;

        let extra = if remaining >= 2 {
            let extra_size = u32::from(reader.read_u16()?).min(remaining - 2);
            remaining -= 2 + extra_size;
            reader.read_boxed_slice_exact(extra_size as usize)?
        }
        else {
            Default::default()
        };

        reader.ignore_bytes(u64::from(remaining))?;

        if n_channels == 0 {
            return decode_error("riff: format has no channels");
        }

        let mut format = WaveFormat {
            format_tag,
            n_channels,
            sample_rate,
            avg_bytes_per_sec,
            block_align,
            bits_per_sample,
            codec: codec_for_format_tag(format_tag, bits_per_sample),
            extra: Default::default(),
        };

        if format_tag == WAVE_FORMAT_EXTENSIBLE {
            format.read_ext_fmt(&extra)?;
        }
        else {
            format.extra = extra;
        }

        Ok(format)
    }
}
