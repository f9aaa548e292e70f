// Polyplex
// Copyright (c) 2024-2026 The Project Polyplex Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io::{self, Read};

use polyplex_core::codecs::{Bitrate, CompressionInfo};
use polyplex_core::errors::{decode_error, seek_error, unsupported_error, Result, SeekErrorKind};
use polyplex_core::formats::prelude::*;
use polyplex_core::formats::{AudioFormat, StreamFlags, StreamFormat};
use polyplex_core::io::{MediaSourceStream, ReadBytes};
use polyplex_core::packet::{Packet, PacketFlags};

use log::debug;

use crate::common::{probe_riff, read_riff_header, ChunksReader};

mod chunks;

use chunks::*;

/// The WAVE RIFF form.
const WAVE_RIFF_FORM: [u8; 4] = *b"WAVE";

const WAVE_FORMAT_INFO: FormatInfo =
    FormatInfo { short_name: "wave", long_name: "Waveform Audio File Format" };

/// Waveform Audio File Format (WAV) format driver.
///
/// WAVE is not packetized. Packets are simulated by reading a fixed number of audio frames at a
/// time, so the driver supplies no superindex and seeks by computing the byte position of a frame.
pub struct WavDriver {
    streams: Vec<StreamInfo>,
    data_start: u64,
    data_end: Option<u64>,
    /// The size in bytes of one audio frame.
    frame_len: u64,
    frames_per_packet: u64,
    n_frames: Option<u64>,
    caps: DriverCaps,
}

impl WavDriver {
    fn time_base(&self) -> TimeBase {
        self.streams[0].time_base
    }
}

impl FormatDriver for WavDriver {
    fn probe(header: &[u8]) -> bool {
        probe_riff(header, &WAVE_RIFF_FORM)
    }

    fn open(src: &mut MediaSourceStream, options: &FormatOptions) -> Result<Self> {
        let riff_len = read_riff_header(src, &WAVE_RIFF_FORM)?;

        let mut riff_chunks = ChunksReader::<RiffWaveChunks>::new(riff_len);

        let mut format = None;

        // The data chunk is the last chunk read, everything needed must precede it.
        let data = loop {
            let Some(chunk) = riff_chunks.next(src)?
            else {
                return unsupported_error("wav: missing data chunk");
            };

            match chunk {
                RiffWaveChunks::Format(fmt) => format = Some(fmt.parse(src)?),
                RiffWaveChunks::Fact(fct) => {
                    let fact = fct.parse(src)?;
                    debug!("wav: fact chunk declares {} frames", fact.n_frames);
                }
                RiffWaveChunks::List(lst) => lst.parse(src)?.skip(src)?,
                RiffWaveChunks::Data(dat) => break dat.parse(src)?,
            }
        };

        let Some(format) = format
        else {
            return decode_error("wav: missing format chunk");
        };

        let codec = match format.codec {
            Some(codec) if format.is_frame_based() => codec,
            _ => return unsupported_error("wav: unsupported wave format"),
        };

        if format.block_align == 0 {
            return decode_error("wav: invalid block align");
        }

        let Some(time_base) = TimeBase::from_rate(format.sample_rate)
        else {
            return decode_error("wav: invalid sample rate");
        };

        let data_start = src.pos();

        let mut data_end = data.len.map(|len| data_start + u64::from(len));

        // Truncated files declare more data than they hold.
        if let Some(byte_len) = src.byte_len() {
            data_end = Some(data_end.map_or(byte_len, |end| end.min(byte_len)));
        }

        let frame_len = u64::from(format.block_align);
        let n_frames = data_end.map(|end| end.saturating_sub(data_start) / frame_len);

        let mut compression = CompressionInfo::new(codec);

        if format.avg_bytes_per_sec > 0 {
            compression.with_bitrate(Bitrate::Constant(format.avg_bytes_per_sec.saturating_mul(8)));
        }

        let stream_format = StreamFormat::Audio(AudioFormat {
            sample_rate: format.sample_rate,
            channels: format.n_channels,
            bits_per_sample: format.bits_per_sample,
            block_align: format.block_align,
        });

        let mut info = StreamInfo::new(0, time_base, stream_format);
        info.compression = compression;
        info.duration = n_frames.map(|n| n as i64);
        info.flags = StreamFlags::DEFAULT;

        let caps = if src.is_seekable() { DriverCaps::CAN_SEEK } else { DriverCaps::empty() };

        debug!("wav: data={}..{:?}, frames={:?}", data_start, data_end, n_frames);

        Ok(WavDriver {
            streams: vec![info],
            data_start,
            data_end,
            frame_len,
            frames_per_packet: u64::from(options.wave_frames_per_packet.max(1)),
            n_frames,
            caps,
        })
    }

    fn format_info(&self) -> &FormatInfo {
        &WAVE_FORMAT_INFO
    }

    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    fn take_superindex(&mut self) -> Option<Superindex> {
        None
    }

    fn caps(&self) -> DriverCaps {
        self.caps
    }

    fn next_unit(&mut self, src: &mut MediaSourceStream, pkt: &mut Packet) -> Result<bool> {
        let pos = src.pos();

        if pos < self.data_start {
            return decode_error("wav: positioned before the data chunk");
        }

        let max_len = self.frames_per_packet * self.frame_len;

        let len = match self.data_end {
            Some(end) => max_len.min(end.saturating_sub(pos)),
            None => max_len,
        };

        let len = len - len % self.frame_len;

        if len == 0 {
            return Ok(false);
        }

        pkt.reset();

        if self.data_end.is_some() {
            pkt.read_from(src, len as usize)?;
        }
        else {
            read_partial(src, pkt.buf_mut(), len as usize)?;
        }

        let frames = pkt.data_len() as u64 / self.frame_len;

        if frames == 0 {
            return Ok(false);
        }

        pkt.buf_mut().truncate((frames * self.frame_len) as usize);

        pkt.stream_id = 0;
        pkt.pts = Some(((pos - self.data_start) / self.frame_len) as i64);
        pkt.duration = Some(frames as i64);
        pkt.samples = Some(frames as u32);
        pkt.position = Some(pos);
        pkt.flags = PacketFlags::KEYFRAME;

        let last = match self.data_end {
            Some(end) => src.pos() >= end,
            None => frames < self.frames_per_packet,
        };

        if last {
            pkt.flags |= PacketFlags::LAST;
        }

        Ok(true)
    }

    fn seek(&mut self, src: &mut MediaSourceStream, time: Time) -> Result<Time> {
        if time < Time::ZERO {
            return seek_error(SeekErrorKind::OutOfRange);
        }

        let tb = self.time_base();

        let mut frame = time.to_ts(tb).max(0) as u64;

        if let Some(n_frames) = self.n_frames {
            frame = frame.min(n_frames);
        }

        let pos = self.data_start + frame * self.frame_len;

        debug!("wav: seeking to frame {} at {}", frame, pos);

        src.seek_to(pos)?;

        Ok(Time::from_ts(frame as i64, tb))
    }
}

/// Read up to `len` bytes, stopping early at the end of the stream.
fn read_partial(src: &mut MediaSourceStream, buf: &mut Vec<u8>, len: usize) -> io::Result<()> {
    buf.resize(len, 0);

    let mut filled = 0;

    while filled < len {
        match src.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }

    buf.truncate(filled);
    Ok(())
}

#[cfg(test)]
mod tests {
    use polyplex_core::codecs::CodecId;
    use polyplex_core::demux::Demuxer;

    use super::*;
    use crate::testing::*;

    fn open(bytes: Vec<u8>, frames_per_packet: u32) -> (MediaSourceStream, WavDriver) {
        let options =
            FormatOptions { wave_frames_per_packet: frames_per_packet, ..Default::default() };
        let mut src = source(bytes);
        let driver = WavDriver::open(&mut src, &options).unwrap();
        (src, driver)
    }

    #[test]
    fn verify_open() {
        let (_, driver) = open(wav_file(2, 8000, 1000), 1152);

        let info = &driver.streams()[0];
        assert_eq!(info.time_base, TimeBase::new(1, 8000));
        assert_eq!(info.compression.id, CodecId::PcmS16Le);
        assert_eq!(info.duration, Some(1000));
        assert_eq!(info.compression.bitrate, Bitrate::Constant(256_000));
        assert!(driver.caps().contains(DriverCaps::CAN_SEEK));
        assert!(WavDriver::probe(&wav_file(1, 8000, 1)[..12]));
    }

    #[test]
    fn verify_packetization() {
        let (mut src, mut driver) = open(wav_file(2, 8000, 1000), 300);

        let mut pkt = Packet::new();
        let mut got = Vec::new();

        while driver.next_unit(&mut src, &mut pkt).unwrap() {
            let last = pkt.flags.contains(PacketFlags::LAST);
            got.push((pkt.pts.unwrap(), pkt.duration.unwrap(), last));
            // Every byte of a frame holds the frame number.
            assert_eq!(pkt.buf()[0], frame_byte(pkt.pts.unwrap() as u32));
        }

        assert_eq!(
            got,
            vec![(0, 300, false), (300, 300, false), (600, 300, false), (900, 100, true)]
        );
    }

    #[test]
    fn verify_exact_seek() {
        let (mut src, mut driver) = open(wav_file(2, 8000, 1000), 300);

        let time = driver.seek(&mut src, Time::from_millis(50)).unwrap();
        assert_eq!(time, Time::from_millis(50));

        let mut pkt = Packet::new();
        assert!(driver.next_unit(&mut src, &mut pkt).unwrap());
        assert_eq!(pkt.pts, Some(400));
        assert_eq!(pkt.buf()[0], frame_byte(400));

        // Past the end lands on the end.
        let time = driver.seek(&mut src, Time::from_secs(5)).unwrap();
        assert_eq!(time, Time::from_millis(125));
        assert!(!driver.next_unit(&mut src, &mut pkt).unwrap());
    }

    #[test]
    fn verify_streamed_file() {
        let mut src = unseekable_source(streamed_wav_file(1, 8000, 250));
        let options = FormatOptions { wave_frames_per_packet: 100, ..Default::default() };
        let mut driver = WavDriver::open(&mut src, &options).unwrap();

        assert_eq!(driver.streams()[0].duration, None);
        assert!(driver.caps().is_empty());

        let mut pkt = Packet::new();
        let mut got = Vec::new();

        while driver.next_unit(&mut src, &mut pkt).unwrap() {
            got.push((pkt.pts.unwrap(), pkt.flags.contains(PacketFlags::LAST)));
        }

        assert_eq!(got, vec![(0, false), (100, false), (200, true)]);
    }

    #[test]
    fn verify_compressed_format_rejected() {
        let mut src = source(riff(
            b"WAVE",
            &[
                Chunk::new(b"fmt ", &fmt_chunk_body(0x0055, 2, 44_100, 0, &[0; 12])),
                Chunk::new(b"data", &[0; 64]),
            ],
        ));
        assert!(WavDriver::open(&mut src, &Default::default()).is_err());
    }

    #[test]
    fn verify_demuxer_seek() {
        let mut src = source(wav_file(1, 8000, 8000));
        let driver = WavDriver::open(&mut src, &Default::default()).unwrap();

        let mut demux = Demuxer::new(src, driver, &Default::default()).unwrap();
        demux.start();

        let time = demux.seek(Time::from_millis(100), &Default::default()).unwrap();
        assert_eq!(time, Time::from_millis(100));

        let pkt = demux.get_packet(0).unwrap().unwrap();
        assert_eq!(pkt.pts, Some(800));
    }
}
