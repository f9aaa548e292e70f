// Polyplex
// Copyright (c) 2024-2026 The Project Polyplex Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use polyplex_core::errors::{decode_error, Result};
use polyplex_core::io::ReadBytes;

use crate::common::{parser, ChunkParser, ListChunk, ParseChunk, ParseChunkTag, WaveFormat};

pub struct FactChunk {
    pub n_frames: u32,
}

impl ParseChunk for FactChunk {
    fn parse<B: ReadBytes>(reader: &mut B, _tag: [u8; 4], len: u32) -> Result<Self> {
        if len < 4 {
            return decode_error("wav: malformed fact chunk");
        }

        let n_frames = reader.read_u32()?;
        reader.ignore_bytes(u64::from(len - 4))?;

        Ok(FactChunk { n_frames })
    }
}

/// The header of the `data` chunk. The body is the audio data itself.
pub struct DataChunk {
    /// The length of the data, `None` if the writer did not know it.
    pub len: Option<u32>,
}

impl ParseChunk for DataChunk {
    fn parse<B: ReadBytes>(_: &mut B, _: [u8; 4], len: u32) -> Result<DataChunk> {
        // Streaming writers set the length to (2^32)-1 or zero.
        let len = match len {
            0 | u32::MAX => None,
            len => Some(len),
        };
        Ok(DataChunk { len })
    }
}

pub enum RiffWaveChunks {
    Format(ChunkParser<WaveFormat>),
    List(ChunkParser<ListChunk>),
    Fact(ChunkParser<FactChunk>),
    Data(ChunkParser<DataChunk>),
}

impl ParseChunkTag for RiffWaveChunks {
    fn parse_tag(tag: [u8; 4], len: u32) -> Option<Self> {
        match &tag {
            b"fmt " => parser!(RiffWaveChunks::Format, WaveFormat, tag, len),
            b"LIST" => parser!(RiffWaveChunks::List, ListChunk, tag, len),
            b"fact" => parser!(RiffWaveChunks::Fact, FactChunk, tag, len),
            b"data" => parser!(RiffWaveChunks::Data, DataChunk, tag, len),
            _ => None,
        }
    }
}
