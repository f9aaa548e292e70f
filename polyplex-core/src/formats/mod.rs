// Polyplex
// Copyright (c) 2024-2026 The Project Polyplex Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `formats` module provides the traits and support structures necessary to implement
//! container drivers.

use bitflags::bitflags;

use crate::codecs::CompressionInfo;
use crate::errors::Result;
use crate::io::MediaSourceStream;
use crate::packet::Packet;
use crate::units::{Duration, Time, TimeBase};

mod superindex;

pub use superindex::{StreamRange, Superindex, SuperindexEntry};

pub mod prelude {
    //! The `formats` module prelude.

    pub use crate::units::{Duration, Time, TimeBase, Timestamp};

    pub use super::{
        DriverCaps, FormatDriver, FormatInfo, FormatOptions, StreamInfo, StreamType, Superindex,
        SuperindexEntry,
    };
}

/// `FormatOptions` is a common set of options that all container drivers use.
#[derive(Copy, Clone, Debug)]
pub struct FormatOptions {
    /// If the container carries an index, build a superindex from it instead of delivering units
    /// sequentially. Default: `true`.
    pub prefer_superindex: bool,
    /// The maximum size in bytes of a single unit. Larger units are rejected as malformed.
    /// Default: 16 MiB.
    pub max_packet_size: u32,
    /// The number of frames per packet for containers of raw audio. Default: `1152`.
    pub wave_frames_per_packet: u32,
}

impl Default for FormatOptions {
    fn default() -> Self {
        FormatOptions {
            prefer_superindex: true,
            max_packet_size: 16 * 1024 * 1024,
            wave_frames_per_packet: 1152,
        }
    }
}

/// Basic information about a container format.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FormatInfo {
    /// A short ASCII-only string identifying the format.
    pub short_name: &'static str,
    /// A longer, more descriptive, string identifying the format.
    pub long_name: &'static str,
}

/// The kind of elementary stream.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum StreamType {
    Audio,
    Video,
    Text,
}

impl StreamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamType::Audio => "audio",
            StreamType::Video => "video",
            StreamType::Text => "text",
        }
    }
}

/// Audio stream parameters.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AudioFormat {
    /// The sample rate in Hz.
    pub sample_rate: u32,
    /// The number of channels.
    pub channels: u16,
    /// The number of bits per sample, if meaningful for the codec.
    pub bits_per_sample: u16,
    /// The size in bytes of one frame (one sample of every channel), or the codec block size.
    pub block_align: u16,
}

/// Video stream parameters.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    /// The nominal duration of one frame in the stream's time base.
    pub frame_duration: Duration,
}

/// Text (subtitle) stream parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TextFormat {
    /// The character encoding of the cues, if declared.
    pub encoding: Option<String>,
}

/// The type specific parameters of a stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamFormat {
    Audio(AudioFormat),
    Video(VideoFormat),
    Text(TextFormat),
}

bitflags! {
    /// Stream attributes.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct StreamFlags: u32 {
        /// The stream should be selected by default.
        const DEFAULT = 1 << 0;
        /// The stream is a still image, or a sequence of stills with irregular timing.
        const STILL   = 1 << 1;
    }
}

/// `StreamInfo` describes one elementary stream of a container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamInfo {
    /// A unique identifier for the stream. For most formats this is the zero-based index of the
    /// stream in the container.
    pub id: u32,
    /// How the stream is compressed.
    pub compression: CompressionInfo,
    /// The time base of all timestamps and durations of the stream.
    pub time_base: TimeBase,
    /// The type specific parameters.
    pub format: StreamFormat,
    /// The language of the stream. May be unknown or not set.
    pub language: Option<String>,
    /// The name of the stream, if the container carries one.
    pub name: Option<String>,
    /// The duration of the stream in time base units, if known.
    pub duration: Option<Duration>,
    /// Stream attributes.
    pub flags: StreamFlags,
}

impl StreamInfo {
    pub fn new(id: u32, time_base: TimeBase, format: StreamFormat) -> Self {
        StreamInfo {
            id,
            compression: Default::default(),
            time_base,
            format,
            language: None,
            name: None,
            duration: None,
            flags: StreamFlags::empty(),
        }
    }

    /// The kind of stream.
    pub fn stream_type(&self) -> StreamType {
        match self.format {
            StreamFormat::Audio(_) => StreamType::Audio,
            StreamFormat::Video(_) => StreamType::Video,
            StreamFormat::Text(_) => StreamType::Text,
        }
    }

    /// Returns true if the timing of the next unit of this stream cannot be extrapolated from the
    /// previous one: text cues and still images.
    pub fn is_discontinuous(&self) -> bool {
        self.stream_type() == StreamType::Text || self.flags.contains(StreamFlags::STILL)
    }

    /// The duration of the stream as a `Time`, if known.
    pub fn duration_time(&self) -> Option<Time> {
        self.duration.map(|dur| Time::from_ts(dur, self.time_base))
    }
}

bitflags! {
    /// Capabilities of a format driver.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct DriverCaps: u32 {
        /// The driver can seek without a superindex.
        const CAN_SEEK          = 1 << 0;
        /// The driver's seek only approximates the requested time. The demuxer refines it
        /// iteratively.
        const SEEKS_ITERATIVELY = 1 << 1;
    }
}

/// A `FormatDriver` understands the byte-level grammar of one container format.
///
/// A driver is opened on a [`MediaSourceStream`] and either produces a [`Superindex`] of every
/// unit in the container, or delivers units one at a time through
/// [`FormatDriver::next_unit`]. The demuxing engine owns the source and passes it to every call.
pub trait FormatDriver: Send + Sized {
    /// Returns true if the driver recognizes the container from the first bytes of the source.
    fn probe(header: &[u8]) -> bool;

    /// Parse the container header. The source is positioned at the start of the container.
    fn open(src: &mut MediaSourceStream, options: &FormatOptions) -> Result<Self>;

    /// Get basic information about the container format.
    fn format_info(&self) -> &FormatInfo;

    /// Gets the list of streams declared by the container.
    fn streams(&self) -> &[StreamInfo];

    /// Take the superindex built during open, if any. Subsequent calls return `None`.
    fn take_superindex(&mut self) -> Option<Superindex>;

    /// The capabilities of the driver.
    fn caps(&self) -> DriverCaps;

    /// Read the next unit in container order into `pkt`. Returns `Ok(false)` at the end of the
    /// container.
    fn next_unit(&mut self, src: &mut MediaSourceStream, pkt: &mut Packet) -> Result<bool>;

    /// Flush one unit held back inside the driver after `next_unit` reported the end of the
    /// container. Returns `false` once nothing is left.
    ///
    /// # For Implementations
    ///
    /// The default implementation holds nothing back.
    fn drain(&mut self, _pkt: &mut Packet) -> bool {
        false
    }

    /// Seek the source to the unit closest to `time` such that the next call to `next_unit`
    /// delivers units from there. Returns the time actually seeked to, which is exact unless the
    /// driver declares [`DriverCaps::SEEKS_ITERATIVELY`].
    fn seek(&mut self, src: &mut MediaSourceStream, time: Time) -> Result<Time>;

    /// Release any state held by the driver.
    fn close(&mut self) {}
}
