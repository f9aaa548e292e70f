// Polyplex
// Copyright (c) 2024-2026 The Project Polyplex Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use bitflags::bitflags;

use polyplex_core::codecs::{CodecId, CompressionFlags};
use polyplex_core::errors::{decode_error, limit_error, Result};
use polyplex_core::io::ReadBytes;

use crate::common::{parser, ChunkParser, ListChunk, ParseChunk, ParseChunkTag, RawChunk};

bitflags! {
    /// `AVIMAINHEADER` flags.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct AviFlags: u32 {
        const HAS_INDEX       = 0x0000_0010;
        const MUST_USE_INDEX  = 0x0000_0020;
        const IS_INTERLEAVED  = 0x0000_0100;
        const TRUST_CK_TYPE   = 0x0000_0800;
    }
}

/// The `avih` chunk.
pub struct MainHeaderChunk {
    pub micro_sec_per_frame: u32,
    pub flags: AviFlags,
    pub total_frames: u32,
    pub n_streams: u32,
    pub width: u32,
    pub height: u32,
}

impl ParseChunk for MainHeaderChunk {
    fn parse<B: ReadBytes>(reader: &mut B, _tag: [u8; 4], len: u32) -> Result<Self> {
        if len < 40 {
            return decode_error("avi: malformed avih chunk");
        }

        let micro_sec_per_frame = reader.read_u32()?;
        let _max_bytes_per_sec = reader.read_u32()?;
        let _padding_granularity = reader.read_u32()?;
        let flags = AviFlags::from_bits_truncate(reader.read_u32()?);
        let total_frames = reader.read_u32()?;
        let _initial_frames = reader.read_u32()?;
        let n_streams = reader.read_u32()?;
        let _suggested_buffer_size = reader.read_u32()?;
        let width = reader.read_u32()?;
        let height = reader.read_u32()?;

        // Reserved.
        reader.ignore_bytes(u64::from(len - 40))?;

        Ok(MainHeaderChunk { micro_sec_per_frame, flags, total_frames, n_streams, width, height })
    }
}

/// The `strh` chunk.
pub struct StreamHeaderChunk {
    /// `vids`, `auds`, `txts`, `mids`, ...
    pub fcc_type: [u8; 4],
    pub handler: [u8; 4],
    pub scale: u32,
    pub rate: u32,
    pub start: u32,
    pub length: u32,
    pub sample_size: u32,
}

impl ParseChunk for StreamHeaderChunk {
    fn parse<B: ReadBytes>(reader: &mut B, _tag: [u8; 4], len: u32) -> Result<Self> {
        // Older writers omit the frame rectangle.
        if len < 48 {
            return decode_error("avi: malformed strh chunk");
        }

        let fcc_type = reader.read_quad_bytes()?;
        let handler = reader.read_quad_bytes()?;
        let _flags = reader.read_u32()?;
        let _priority = reader.read_u16()?;
        let _language = reader.read_u16()?;
        let _initial_frames = reader.read_u32()?;
        let scale = reader.read_u32()?;
        let rate = reader.read_u32()?;
        let start = reader.read_u32()?;
        let length = reader.read_u32()?;
        let _suggested_buffer_size = reader.read_u32()?;
        let _quality = reader.read_u32()?;
        let sample_size = reader.read_u32()?;

        reader.ignore_bytes(u64::from(len - 48))?;

        Ok(StreamHeaderChunk {
            fcc_type,
            handler,
            scale,
            rate,
            start,
            length,
            sample_size,
        })
    }
}

/// The `strn` chunk: a NUL terminated stream name.
pub struct StreamNameChunk {
    pub name: String,
}

impl ParseChunk for StreamNameChunk {
    fn parse<B: ReadBytes>(reader: &mut B, _tag: [u8; 4], len: u32) -> Result<Self> {
        let buf = reader.read_boxed_slice_exact(len as usize)?;
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        Ok(StreamNameChunk { name: String::from_utf8_lossy(&buf[..end]).into_owned() })
    }
}

/// `AVIIF_KEYFRAME`.
pub const INDEX_FLAG_KEYFRAME: u32 = 0x10;

/// One `AVIINDEXENTRY`.
#[derive(Copy, Clone, Debug)]
pub struct IndexEntry {
    pub ckid: [u8; 4],
    pub flags: u32,
    /// The offset of the chunk header, relative to the `movi` list or absolute.
    pub offset: u32,
    pub size: u32,
}

/// The `idx1` chunk.
pub struct IndexChunk {
    pub entries: Vec<IndexEntry>,
}

/// No legitimate file comes close to this number of index entries.
const MAX_INDEX_ENTRIES: u32 = 1 << 24;

impl ParseChunk for IndexChunk {
    fn parse<B: ReadBytes>(reader: &mut B, _tag: [u8; 4], len: u32) -> Result<Self> {
        let count = len / 16;

        if count > MAX_INDEX_ENTRIES {
            return limit_error("avi: idx1 chunk has too many entries");
        }

        let mut entries = Vec::with_capacity(count as usize);

        for _ in 0..count {
            entries.push(IndexEntry {
                ckid: reader.read_quad_bytes()?,
                flags: reader.read_u32()?,
                offset: reader.read_u32()?,
                size: reader.read_u32()?,
            });
        }

        reader.ignore_bytes(u64::from(len % 16))?;

        Ok(IndexChunk { entries })
    }
}

/// A `BITMAPINFOHEADER` structure, the `strf` chunk of a video stream.
pub struct BitmapInfo {
    pub width: u32,
    pub height: u32,
    pub bit_count: u16,
    pub compression: [u8; 4],
    pub clr_used: u32,
    /// Codec specific data, or the palette, following the structure.
    pub extra: Box<[u8]>,
}

impl ParseChunk for BitmapInfo {
    fn parse<B: ReadBytes>(reader: &mut B, _tag: [u8; 4], len: u32) -> Result<Self> {
        if len < 40 {
            return decode_error("avi: malformed video strf chunk");
        }

        let size = reader.read_u32()?;
        let width = reader.read_i32()?;
        let height = reader.read_i32()?;
        let _planes = reader.read_u16()?;
        let bit_count = reader.read_u16()?;
        let compression = reader.read_quad_bytes()?;
        let _size_image = reader.read_u32()?;
        let _x_pels_per_meter = reader.read_i32()?;
        let _y_pels_per_meter = reader.read_i32()?;
        let clr_used = reader.read_u32()?;
        let _clr_important = reader.read_u32()?;

        // The structure may be extended beyond 40 bytes before the codec data begins.
        let skip = size.clamp(40, len) - 40;
        reader.ignore_bytes(u64::from(skip))?;

        let extra = reader.read_boxed_slice_exact((len - 40 - skip) as usize)?;

        Ok(BitmapInfo {
            width: width.unsigned_abs(),
            // Negative heights signal top-down bitmaps.
            height: height.unsigned_abs(),
            bit_count,
            compression,
            clr_used,
            extra,
        })
    }
}

/// Map a video FourCC to a codec.
pub fn codec_for_fourcc(fourcc: &[u8; 4]) -> Option<(CodecId, CompressionFlags)> {
    let inter = CompressionFlags::HAS_P_FRAMES;
    let bidir = CompressionFlags::HAS_P_FRAMES | CompressionFlags::HAS_B_FRAMES;

    let upper = fourcc.map(|b| b.to_ascii_uppercase());

    let mapping = match &upper {
        b"\0\0\0\0" | b"DIB " | b"RGB " | b"RAW " => (CodecId::RawVideo, CompressionFlags::empty()),
        b"MJPG" | b"AVRN" | b"LJPG" | b"DMB1" => (CodecId::Mjpeg, CompressionFlags::empty()),
        b"MPG1" | b"PIM1" => (CodecId::Mpeg1, bidir),
        b"MPG2" | b"MPEG" | b"MMES" => (CodecId::Mpeg2, bidir),
        b"DIVX" | b"DX50" | b"XVID" | b"FMP4" | b"MP4V" | b"DIV3" | b"MP43" => {
            (CodecId::Mpeg4, bidir)
        }
        b"H263" | b"U263" | b"S263" => (CodecId::H263, inter),
        b"H264" | b"X264" | b"AVC1" => (CodecId::H264, bidir),
        b"DVSD" | b"DV25" | b"DVHD" | b"CDVC" => (CodecId::Dv, CompressionFlags::empty()),
        b"HFYU" => (CodecId::HuffYuv, CompressionFlags::empty()),
        b"FFV1" => (CodecId::Ffv1, CompressionFlags::empty()),
        b"THEO" => (CodecId::Theora, inter),
        b"JPEG" => (CodecId::Jpeg, CompressionFlags::empty()),
        b"MPNG" | b"PNG1" => (CodecId::Png, CompressionFlags::empty()),
        _ => return None,
    };

    Some(mapping)
}

/// Chunks of the `RIFF AVI ` form.
pub enum RiffAviChunks {
    List(ChunkParser<ListChunk>),
    Index(ChunkParser<IndexChunk>),
}

impl ParseChunkTag for RiffAviChunks {
    fn parse_tag(tag: [u8; 4], len: u32) -> Option<Self> {
        match &tag {
            b"LIST" => parser!(RiffAviChunks::List, ListChunk, tag, len),
            b"idx1" => parser!(RiffAviChunks::Index, IndexChunk, tag, len),
            _ => None,
        }
    }
}

/// Chunks of the `LIST hdrl` list.
pub enum HeaderListChunks {
    MainHeader(ChunkParser<MainHeaderChunk>),
    List(ChunkParser<ListChunk>),
}

impl ParseChunkTag for HeaderListChunks {
    fn parse_tag(tag: [u8; 4], len: u32) -> Option<Self> {
        match &tag {
            b"avih" => parser!(HeaderListChunks::MainHeader, MainHeaderChunk, tag, len),
            b"LIST" => parser!(HeaderListChunks::List, ListChunk, tag, len),
            _ => None,
        }
    }
}

/// Chunks of a `LIST strl` list.
pub enum StreamListChunks {
    Header(ChunkParser<StreamHeaderChunk>),
    Format(ChunkParser<RawChunk>),
    Name(ChunkParser<StreamNameChunk>),
}

impl ParseChunkTag for StreamListChunks {
    fn parse_tag(tag: [u8; 4], len: u32) -> Option<Self> {
        match &tag {
            b"strh" => parser!(StreamListChunks::Header, StreamHeaderChunk, tag, len),
            b"strf" => parser!(StreamListChunks::Format, RawChunk, tag, len),
            b"strn" => parser!(StreamListChunks::Name, StreamNameChunk, tag, len),
            _ => None,
        }
    }
}

/// The kind of data chunk in a `movi` list, from the last two characters of its ID.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DataKind {
    Video,
    Audio,
    Text,
    PaletteChange,
}

/// Split a `movi` chunk ID such as `01wb` into its stream number and kind.
pub fn parse_chunk_id(ckid: &[u8; 4]) -> Option<(u32, DataKind)> {
    let digit = |b: u8| if b.is_ascii_digit() { Some(u32::from(b - b'0')) } else { None };

    let stream = 10 * digit(ckid[0])? + digit(ckid[1])?;

    let kind = match &ckid[2..4] {
        b"dc" | b"db" => DataKind::Video,
        b"wb" => DataKind::Audio,
        b"tx" | b"sb" => DataKind::Text,
        b"pc" => DataKind::PaletteChange,
        _ => return None,
    };

    Some((stream, kind))
}
