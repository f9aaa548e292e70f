// Polyplex
// Copyright (c) 2024-2026 The Project Polyplex Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Synthetic sources and format drivers shared by the unit tests.

use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex};

use crate::codecs::{CodecId, CompressionFlags, CompressionInfo};
use crate::errors::{unsupported_error, Result};
use crate::formats::{
    AudioFormat, DriverCaps, FormatDriver, FormatInfo, FormatOptions, StreamFormat, StreamInfo,
    Superindex, SuperindexEntry, TextFormat, VideoFormat,
};
use crate::io::{MediaSource, MediaSourceStream};
use crate::packet::{Packet, PacketFlags};
use crate::units::{Time, TimeBase};

pub const AUDIO: u32 = 0;
pub const VIDEO: u32 = 1;

/// Samples per audio unit. One unit of 48 kHz audio lasts as long as one frame at 25 fps.
pub const SAMPLES_PER_UNIT: i64 = 1920;

pub fn audio_stream(id: u32) -> StreamInfo {
    let format =
        AudioFormat { sample_rate: 48_000, channels: 2, bits_per_sample: 16, block_align: 4 };
    let mut info = StreamInfo::new(id, TimeBase::new(1, 48_000), StreamFormat::Audio(format));
    info.compression = CompressionInfo::new(CodecId::PcmS16Le);
    info
}

pub fn video_stream(id: u32) -> StreamInfo {
    let format = VideoFormat { width: 320, height: 240, frame_duration: 1 };
    let mut info = StreamInfo::new(id, TimeBase::new(1, 25), StreamFormat::Video(format));
    info.compression = CompressionInfo::new(CodecId::Mjpeg);
    info
}

/// A 25 fps video stream with predicted frames.
pub fn inter_video_stream(id: u32) -> StreamInfo {
    let mut info = video_stream(id);
    info.compression = CompressionInfo::new(CodecId::Mpeg4);
    info.compression.with_flags(CompressionFlags::HAS_P_FRAMES);
    info
}

pub fn text_stream(id: u32) -> StreamInfo {
    StreamInfo::new(id, TimeBase::new(1, 1000), StreamFormat::Text(TextFormat::default()))
}

pub fn av_streams() -> Vec<StreamInfo> {
    vec![audio_stream(AUDIO), video_stream(VIDEO)]
}

/// The byte stored at `offset` in every synthetic source: the number of the 100 byte entry
/// containing it.
pub fn payload_byte(entry: u64) -> u8 {
    entry as u8
}

fn source_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|pos| payload_byte(pos as u64 / 100)).collect()
}

/// Build a superindex of `per_stream` 100 byte units for each of an audio and a video stream.
/// Interleaved indexes alternate audio and video; otherwise all audio precedes all video.
pub fn av_index(per_stream: u64, interleaved: bool) -> Superindex {
    let mut index = Superindex::new();

    let audio = |k: u64, offset: u64| SuperindexEntry {
        stream_id: AUDIO,
        offset,
        size: 100,
        pts: SAMPLES_PER_UNIT * k as i64,
        duration: SAMPLES_PER_UNIT,
        keyframe: true,
        samples: SAMPLES_PER_UNIT as u32,
    };

    let video = |k: u64, offset: u64| SuperindexEntry {
        stream_id: VIDEO,
        offset,
        size: 100,
        pts: k as i64,
        duration: 1,
        keyframe: true,
        samples: 1,
    };

    if interleaved {
        for k in 0..per_stream {
            index.push(audio(k, 200 * k));
            index.push(video(k, 200 * k + 100));
        }
    }
    else {
        for k in 0..per_stream {
            index.push(audio(k, 100 * k));
        }
        for k in 0..per_stream {
            index.push(video(k, 100 * (per_stream + k)));
        }
    }

    index
}

/// Build alternating audio and video units covering `duration`, in container order.
pub fn av_units(duration: Time) -> Vec<Packet> {
    let count = duration.as_micros() / Time::from_millis(40).as_micros();

    let mut units = Vec::new();

    for k in 0..count {
        let mut audio = Packet::with_data(AUDIO, SAMPLES_PER_UNIT * k, SAMPLES_PER_UNIT, &[1; 16]);
        audio.flags = PacketFlags::KEYFRAME;
        units.push(audio);

        let mut video = Packet::with_data(VIDEO, k, 1, &[2; 64]);
        video.flags = PacketFlags::KEYFRAME;
        units.push(video);
    }

    units
}

pub fn source(len: usize) -> MediaSourceStream {
    MediaSourceStream::new(Box::new(Cursor::new(source_bytes(len))), Default::default())
}

/// Records every seek and read reaching a [`TrackingSource`].
#[derive(Clone, Default)]
pub struct ReadLog(Arc<Mutex<(Vec<u64>, Vec<(u64, usize)>)>>);

impl ReadLog {
    /// Absolute positions seeked to.
    pub fn seeks(&self) -> Vec<u64> {
        self.0.lock().unwrap().0.clone()
    }

    /// `(position, length)` of every read.
    pub fn reads(&self) -> Vec<(u64, usize)> {
        self.0.lock().unwrap().1.clone()
    }
}

struct TrackingSource {
    inner: Cursor<Vec<u8>>,
    log: ReadLog,
    seekable: bool,
    report_len: bool,
}

impl Read for TrackingSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let pos = self.inner.position();
        let len = self.inner.read(buf)?;
        if len > 0 {
            self.log.0.lock().unwrap().1.push((pos, len));
        }
        Ok(len)
    }
}

impl Seek for TrackingSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        if !self.seekable {
            return Err(io::Error::new(io::ErrorKind::Unsupported, "not seekable"));
        }
        let pos = self.inner.seek(pos)?;
        self.log.0.lock().unwrap().0.push(pos);
        Ok(pos)
    }
}

impl MediaSource for TrackingSource {
    fn is_seekable(&self) -> bool {
        self.seekable
    }

    fn byte_len(&self) -> Option<u64> {
        if self.report_len {
            Some(self.inner.get_ref().len() as u64)
        }
        else {
            None
        }
    }
}

/// A source of `len` bytes that logs its accesses.
pub fn tracking_source(len: usize, seekable: bool, log: &ReadLog) -> MediaSourceStream {
    let src = TrackingSource {
        inner: Cursor::new(source_bytes(len)),
        log: log.clone(),
        seekable,
        report_len: true,
    };
    MediaSourceStream::new(Box::new(src), Default::default())
}

/// A seekable source of `len` bytes that does not know its own length.
pub fn truncated_source(len: usize, log: &ReadLog) -> MediaSourceStream {
    let src = TrackingSource {
        inner: Cursor::new(source_bytes(len)),
        log: log.clone(),
        seekable: true,
        report_len: false,
    };
    MediaSourceStream::new(Box::new(src), Default::default())
}

const MOCK_FORMAT_INFO: FormatInfo = FormatInfo { short_name: "mock", long_name: "Synthetic" };

type Landing = Box<dyn FnMut(Time) -> Time + Send>;

/// A format driver over in-memory data.
///
/// An indexed driver only hands out its superindex. A sequential driver delivers `units` in
/// order, holding the last `hold_back` of them until drained, and seeks wherever its landing
/// function says.
pub struct MockDriver {
    streams: Vec<StreamInfo>,
    index: Option<Superindex>,
    units: Vec<Packet>,
    next: usize,
    hold_back: usize,
    caps: DriverCaps,
    landing: Landing,
    seeks: Arc<Mutex<Vec<(Time, Time)>>>,
}

impl MockDriver {
    pub fn indexed(streams: Vec<StreamInfo>, index: Superindex) -> Self {
        MockDriver {
            streams,
            index: Some(index),
            units: Vec::new(),
            next: 0,
            hold_back: 0,
            caps: DriverCaps::empty(),
            landing: Box::new(|time| time),
            seeks: Default::default(),
        }
    }

    pub fn sequential(streams: Vec<StreamInfo>, units: Vec<Packet>, hold_back: usize) -> Self {
        MockDriver {
            streams,
            index: None,
            units,
            next: 0,
            hold_back,
            caps: DriverCaps::CAN_SEEK,
            landing: Box::new(|time| time),
            seeks: Default::default(),
        }
    }

    /// Make seeks approximate: a seek to `t` lands on the first unit at or after `landing(t)`.
    pub fn iterative<F>(mut self, landing: F) -> Self
    where
        F: FnMut(Time) -> Time + Send + 'static,
    {
        self.caps |= DriverCaps::SEEKS_ITERATIVELY;
        self.landing = Box::new(landing);
        self
    }

    /// A handle to the list of `(requested, landed)` seeks performed.
    pub fn seek_log(&self) -> Arc<Mutex<Vec<(Time, Time)>>> {
        self.seeks.clone()
    }

    fn unit_time(&self, unit: &Packet) -> Time {
        let tb = self
            .streams
            .iter()
            .find(|info| info.id == unit.stream_id)
            .map_or(TimeBase::MICROS, |info| info.time_base);
        Time::from_ts(unit.pts.unwrap_or(0), tb)
    }
}

impl FormatDriver for MockDriver {
    fn probe(_: &[u8]) -> bool {
        false
    }

    fn open(_: &mut MediaSourceStream, _: &FormatOptions) -> Result<Self> {
        unsupported_error("mock: construct directly")
    }

    fn format_info(&self) -> &FormatInfo {
        &MOCK_FORMAT_INFO
    }

    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    fn take_superindex(&mut self) -> Option<Superindex> {
        self.index.take()
    }

    fn caps(&self) -> DriverCaps {
        self.caps
    }

    fn next_unit(&mut self, _: &mut MediaSourceStream, pkt: &mut Packet) -> Result<bool> {
        if self.next + self.hold_back >= self.units.len() {
            return Ok(false);
        }
        pkt.copy_from(&self.units[self.next]);
        self.next += 1;
        Ok(true)
    }

    fn drain(&mut self, pkt: &mut Packet) -> bool {
        match self.units.get(self.next) {
            Some(unit) => {
                pkt.copy_from(unit);
                self.next += 1;
                true
            }
            None => false,
        }
    }

    fn seek(&mut self, _: &mut MediaSourceStream, time: Time) -> Result<Time> {
        let landed = (self.landing)(time).max(Time::ZERO);

        self.next = self
            .units
            .iter()
            .position(|unit| self.unit_time(unit) >= landed)
            .unwrap_or(self.units.len());

        self.seeks.lock().unwrap().push((time, landed));
        Ok(landed)
    }
}
