// Polyplex
// Copyright (c) 2024-2026 The Project Polyplex Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `codecs` module defines the compression descriptor attached to every stream.
//!
//! Polyplex never decodes. A [`CompressionInfo`] only carries what a downstream decoder needs to
//! be selected and initialized: the codec, a handful of stream-wide properties, and the global
//! header shared by all packets.

use std::fmt;

use bitflags::bitflags;

/// The first ID of the video and image codec range. Audio codec IDs are all below this value.
const VIDEO_CODEC_BASE: u32 = 0x1_0000;

/// A `CodecId` identifies a specific audio, video, or still image codec.
///
/// Audio and video codecs are numbered disjointly: every video or image codec has an ID at or
/// above `0x10000`.
#[repr(u32)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CodecId {
    /// Unknown or unsupported codec.
    #[default]
    None = 0x0,

    // Audio codecs.
    /// PCM signed 16-bit little-endian interleaved.
    PcmS16Le = 0x100,
    /// PCM signed 16-bit big-endian interleaved.
    PcmS16Be,
    /// PCM unsigned 8-bit.
    PcmU8,
    /// PCM signed 24-bit little-endian interleaved.
    PcmS24Le,
    /// PCM signed 32-bit little-endian interleaved.
    PcmS32Le,
    /// PCM 32-bit little-endian floating point interleaved.
    PcmF32Le,
    /// PCM 64-bit little-endian floating point interleaved.
    PcmF64Le,
    /// G.711 A-law.
    PcmAlaw,
    /// G.711 µ-law.
    PcmMulaw,
    /// Microsoft ADPCM.
    AdpcmMs = 0x200,
    /// IMA ADPCM.
    AdpcmIma,
    /// MPEG-1 Layer II.
    Mp2 = 0x1000,
    /// MPEG-1 Layer III.
    Mp3,
    /// Advanced Audio Coding.
    Aac,
    /// Dolby Digital.
    Ac3,
    /// Vorbis.
    Vorbis,
    /// Free Lossless Audio Codec.
    Flac,

    // Video and image codecs.
    /// Uncompressed video.
    RawVideo = VIDEO_CODEC_BASE,
    /// Motion JPEG.
    Mjpeg,
    /// MPEG-1 video.
    Mpeg1,
    /// MPEG-2 video.
    Mpeg2,
    /// MPEG-4 Part 2 (DivX, Xvid).
    Mpeg4,
    /// H.263.
    H263,
    /// H.264 / AVC.
    H264,
    /// DV.
    Dv,
    /// HuffYUV.
    HuffYuv,
    /// FFV1.
    Ffv1,
    /// Theora.
    Theora,
    /// JPEG still image.
    Jpeg = VIDEO_CODEC_BASE + 0x1000,
    /// PNG still image.
    Png,
    /// TIFF still image.
    Tiff,
    /// Truevision TGA still image.
    Tga,
}

impl CodecId {
    /// Returns true if the codec is an audio codec.
    pub fn is_audio(&self) -> bool {
        *self != CodecId::None && (*self as u32) < VIDEO_CODEC_BASE
    }

    /// Returns true if the codec is a video or still image codec.
    pub fn is_video(&self) -> bool {
        (*self as u32) >= VIDEO_CODEC_BASE
    }

    /// A short, human readable name for the codec.
    pub fn name(&self) -> &'static str {
        match self {
            CodecId::None => "none",
            CodecId::PcmS16Le => "pcm_s16le",
            CodecId::PcmS16Be => "pcm_s16be",
            CodecId::PcmU8 => "pcm_u8",
            CodecId::PcmS24Le => "pcm_s24le",
            CodecId::PcmS32Le => "pcm_s32le",
            CodecId::PcmF32Le => "pcm_f32le",
            CodecId::PcmF64Le => "pcm_f64le",
            CodecId::PcmAlaw => "pcm_alaw",
            CodecId::PcmMulaw => "pcm_mulaw",
            CodecId::AdpcmMs => "adpcm_ms",
            CodecId::AdpcmIma => "adpcm_ima",
            CodecId::Mp2 => "mp2",
            CodecId::Mp3 => "mp3",
            CodecId::Aac => "aac",
            CodecId::Ac3 => "ac3",
            CodecId::Vorbis => "vorbis",
            CodecId::Flac => "flac",
            CodecId::RawVideo => "rawvideo",
            CodecId::Mjpeg => "mjpeg",
            CodecId::Mpeg1 => "mpeg1video",
            CodecId::Mpeg2 => "mpeg2video",
            CodecId::Mpeg4 => "mpeg4",
            CodecId::H263 => "h263",
            CodecId::H264 => "h264",
            CodecId::Dv => "dv",
            CodecId::HuffYuv => "huffyuv",
            CodecId::Ffv1 => "ffv1",
            CodecId::Theora => "theora",
            CodecId::Jpeg => "jpeg",
            CodecId::Png => "png",
            CodecId::Tiff => "tiff",
            CodecId::Tga => "tga",
        }
    }

    /// The conventional file extension for a single packet of this codec written out on its own,
    /// if the codec has one.
    pub fn extension(&self) -> Option<&'static str> {
        let ext = match self {
            CodecId::Mp2 => "mp2",
            CodecId::Mp3 => "mp3",
            CodecId::Aac => "aac",
            CodecId::Ac3 => "ac3",
            CodecId::Flac => "flac",
            CodecId::Mjpeg | CodecId::Jpeg => "jpg",
            CodecId::Png => "png",
            CodecId::Tiff => "tif",
            CodecId::Tga => "tga",
            CodecId::Dv => "dv",
            _ => return None,
        };
        Some(ext)
    }

    /// Returns true if a decoder for this codec must be told the pixel format up front because
    /// the packets do not fully describe it.
    pub fn needs_pixel_format(&self) -> bool {
        matches!(self, CodecId::Png | CodecId::Tiff | CodecId::Tga)
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// Stream-wide properties of the compressed data.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct CompressionFlags: u32 {
        /// The stream contains non-key (predicted) frames.
        const HAS_P_FRAMES       = 1 << 0;
        /// The stream contains frames stored out of presentation order.
        const HAS_B_FRAMES       = 1 << 1;
        /// A packet may carry two interlaced fields.
        const HAS_FIELD_PICTURES = 1 << 2;
        /// The decoder doubles the sample rate (spectral band replication).
        const SBR                = 1 << 3;
    }
}

/// The bitrate of a stream.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Bitrate {
    #[default]
    Unknown,
    /// Variable bitrate.
    Variable,
    /// Constant bitrate in bits per second.
    Constant(u32),
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bitrate::Unknown => f.write_str("unknown"),
            Bitrate::Variable => f.write_str("variable"),
            Bitrate::Constant(bps) => write!(f, "{} kbps", bps / 1000),
        }
    }
}

/// `CompressionInfo` describes how the packets of a stream are compressed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompressionInfo {
    /// The codec.
    pub id: CodecId,
    /// Stream-wide properties.
    pub flags: CompressionFlags,
    /// An opaque header shared by all packets of the stream (e.g., codec private data).
    pub global_header: Option<Box<[u8]>>,
    /// The bitrate.
    pub bitrate: Bitrate,
    /// The number of palette entries for indexed-colour image codecs.
    pub palette_size: u32,
}

impl CompressionInfo {
    /// Create a descriptor for `id`.
    pub fn new(id: CodecId) -> Self {
        CompressionInfo { id, ..Default::default() }
    }

    /// Provide compression flags.
    pub fn with_flags(&mut self, flags: CompressionFlags) -> &mut Self {
        self.flags = flags;
        self
    }

    /// Provide the bitrate.
    pub fn with_bitrate(&mut self, bitrate: Bitrate) -> &mut Self {
        self.bitrate = bitrate;
        self
    }

    /// Provide the palette size.
    pub fn with_palette_size(&mut self, palette_size: u32) -> &mut Self {
        self.palette_size = palette_size;
        self
    }

    /// Replace the global header with a copy of `header`. An empty header clears it.
    pub fn set_global_header(&mut self, header: &[u8]) -> &mut Self {
        self.global_header = if header.is_empty() { None } else { Some(Box::from(header)) };
        self
    }

    /// Deep copy `src` into this descriptor, including the global header.
    pub fn copy_from(&mut self, src: &CompressionInfo) {
        self.clone_from(src);
    }

    /// Returns true if the stream has inter-frame dependencies.
    pub fn has_inter_frames(&self) -> bool {
        self.flags.intersects(CompressionFlags::HAS_P_FRAMES | CompressionFlags::HAS_B_FRAMES)
    }
}

impl fmt::Display for CompressionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Codec:          {} ({:#x})", self.id, self.id as u32)?;

        let mut flags = Vec::new();
        if self.flags.contains(CompressionFlags::HAS_P_FRAMES) {
            flags.push("P-frames");
        }
        if self.flags.contains(CompressionFlags::HAS_B_FRAMES) {
            flags.push("B-frames");
        }
        if self.flags.contains(CompressionFlags::HAS_FIELD_PICTURES) {
            flags.push("field-pictures");
        }
        if self.flags.contains(CompressionFlags::SBR) {
            flags.push("SBR");
        }
        if flags.is_empty() {
            flags.push("none");
        }
        writeln!(f, "Flags:          {}", flags.join(" "))?;

        match &self.global_header {
            Some(header) => writeln!(f, "Global header:  {} bytes", header.len())?,
            None => writeln!(f, "Global header:  none")?,
        }

        write!(f, "Bitrate:        {}", self.bitrate)?;

        if self.palette_size > 0 {
            write!(f, "\nPalette size:   {}", self.palette_size)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_codec_id_ranges() {
        assert!(CodecId::PcmS16Le.is_audio());
        assert!(CodecId::Flac.is_audio());
        assert!(!CodecId::Flac.is_video());
        assert!(CodecId::RawVideo.is_video());
        assert!(CodecId::Tga.is_video());
        assert!(!CodecId::H264.is_audio());
        assert!(!CodecId::None.is_audio());
        assert!(!CodecId::None.is_video());
    }

    #[test]
    fn verify_codec_lookups() {
        assert_eq!(CodecId::Png.extension(), Some("png"));
        assert_eq!(CodecId::Mjpeg.extension(), Some("jpg"));
        assert_eq!(CodecId::H264.extension(), None);

        assert!(CodecId::Png.needs_pixel_format());
        assert!(CodecId::Tiff.needs_pixel_format());
        assert!(CodecId::Tga.needs_pixel_format());
        assert!(!CodecId::Jpeg.needs_pixel_format());
        assert!(!CodecId::Mp3.needs_pixel_format());
    }

    #[test]
    fn verify_copy_is_deep() {
        let mut src = CompressionInfo::new(CodecId::H264);
        src.with_flags(CompressionFlags::HAS_P_FRAMES | CompressionFlags::HAS_B_FRAMES)
            .with_bitrate(Bitrate::Variable)
            .set_global_header(&[0, 0, 0, 1, 0x67]);

        let mut dst = CompressionInfo::default();
        dst.copy_from(&src);

        assert_eq!(dst, src);

        let src_hdr = src.global_header.as_ref().unwrap();
        let dst_hdr = dst.global_header.as_ref().unwrap();
        assert_ne!(src_hdr.as_ptr(), dst_hdr.as_ptr());
        assert!(dst.has_inter_frames());
    }

    #[test]
    fn verify_display() {
        let mut info = CompressionInfo::new(CodecId::Png);
        info.with_palette_size(16).with_bitrate(Bitrate::Constant(128_000));

        let text = info.to_string();
        assert!(text.contains("png"));
        assert!(text.contains("Flags:          none"));
        assert!(text.contains("128 kbps"));
        assert!(text.contains("Palette size:   16"));
    }
}
