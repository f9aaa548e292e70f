// Polyplex
// Copyright (c) 2024-2026 The Project Polyplex Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `demux` module implements the packet retrieval engine.
//!
//! A [`Demuxer`] owns the byte source and a [`FormatDriver`]. If the driver built a
//! [`Superindex`], packets are located through it, either with one shared cursor (interleaved
//! containers) or with one cursor per stream (non-interleaved containers). Otherwise the driver
//! delivers units in container order and the demuxer routes each one to its stream.

use std::collections::VecDeque;
use std::mem;

use log::{debug, info, warn};

use crate::errors::{seek_error, stream_error, Result, SeekErrorKind};
use crate::formats::{
    DriverCaps, FormatDriver, FormatInfo, FormatOptions, StreamInfo, StreamType, Superindex,
    SuperindexEntry,
};
use crate::io::MediaSourceStream;
use crate::packet::{Packet, PacketFlags};
use crate::units::{Time, Timestamp};

/// `DemuxerOptions` controls the post-processing applied to a freshly built superindex.
#[derive(Copy, Clone, Debug)]
pub struct DemuxerOptions {
    /// Drop the entries of any stream whose timestamps decrease. Default: `true`.
    pub check_monotonic: bool,
    /// Remove streams that are declared by the container but have no entries. Default: `true`.
    pub drop_empty_streams: bool,
}

impl Default for DemuxerOptions {
    fn default() -> Self {
        DemuxerOptions { check_monotonic: true, drop_empty_streams: true }
    }
}

/// How packets are located in the container.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Layout {
    /// Packets of all streams are mixed in byte order and read through one shared cursor.
    Interleaved,
    /// Each stream is stored as a separate run and read with its own cursor. Requires a seekable
    /// source.
    NonInterleaved,
    /// There is no superindex. Units are delivered by the format driver in container order.
    Sequential,
}

impl Layout {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layout::Interleaved => "interleaved",
            Layout::NonInterleaved => "non-interleaved",
            Layout::Sequential => "sequential",
        }
    }
}

/// A snapshot of the retrieval state of one stream.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StreamCursor {
    /// The next superindex position that may hold a packet of the stream.
    pub index_position: usize,
    /// The presentation time at which the next delivered packet is expected to start.
    pub next_time: Option<Time>,
    /// The stream has delivered its last packet.
    pub eof: bool,
    /// The timing of the next packet cannot be predicted from the previous one.
    pub discontinuous: bool,
}

/// Retrieval state of one stream.
pub(crate) struct StreamState {
    pub(crate) id: u32,
    /// Packets are delivered to the consumer.
    pub(crate) selected: bool,
    /// Filled packets, in delivery order.
    pub(crate) queue: VecDeque<Packet>,
    /// Drained packets ready to be refilled.
    pool: Vec<Packet>,
    /// The packet most recently handed out by `get_packet`.
    current: Option<Packet>,
    /// The next superindex position that may hold a packet of this stream.
    pub(crate) index_pos: usize,
    /// Nothing more can be read for this stream.
    pub(crate) done: bool,
    /// Packets ending at or before this timestamp are skipped.
    pub(crate) skip_to: Option<Timestamp>,
    /// The stream has inter-frame dependencies.
    inter_frames: bool,
    /// The end time of the last delivered packet.
    pub(crate) next_time: Option<Time>,
}

impl StreamState {
    fn new(info: &StreamInfo) -> Self {
        StreamState {
            id: info.id,
            selected: true,
            queue: VecDeque::new(),
            pool: Vec::new(),
            current: None,
            index_pos: 0,
            done: false,
            skip_to: None,
            inter_frames: info.compression.has_inter_frames(),
            next_time: None,
        }
    }

    /// Get a packet to fill, recycling a drained one if possible.
    fn take_packet(&mut self) -> Packet {
        let mut pkt = self.pool.pop().unwrap_or_default();
        pkt.reset();
        pkt
    }

    /// Queue a filled packet, or drop it if it lies wholly before the skip point.
    pub(crate) fn admit(&mut self, mut pkt: Packet) {
        if let Some(skip_to) = self.skip_to {
            let before = match (pkt.pts, pkt.duration) {
                (Some(pts), Some(dur)) if dur > 0 => pts.saturating_add(dur) <= skip_to,
                (Some(pts), _) => pts < skip_to,
                _ => false,
            };

            if before {
                if self.inter_frames {
                    // Still needed by the decoder as a reference.
                    pkt.flags |= PacketFlags::NO_OUTPUT;
                    self.queue.push_back(pkt);
                }
                else {
                    self.pool.push(pkt);
                }
                return;
            }

            self.skip_to = None;
        }

        self.queue.push_back(pkt);
    }

    /// Return every buffered packet to the pool.
    pub(crate) fn flush(&mut self) {
        self.pool.extend(self.queue.drain(..));
        self.pool.extend(self.current.take());
        self.skip_to = None;
    }

    fn free(&mut self) {
        self.flush();
        for pkt in self.pool.iter_mut() {
            pkt.free();
        }
        self.pool.clear();
    }

    fn is_eof(&self) -> bool {
        self.done && self.queue.is_empty()
    }
}

/// A `Demuxer` turns a container into per-stream sequences of packets.
pub struct Demuxer<D: FormatDriver> {
    pub(crate) src: MediaSourceStream,
    pub(crate) driver: D,
    pub(crate) index: Option<Superindex>,
    pub(crate) layout: Layout,
    /// The shared superindex cursor of the interleaved layout.
    pub(crate) cursor: usize,
    pub(crate) infos: Vec<StreamInfo>,
    pub(crate) states: Vec<StreamState>,
    /// Scratch packet for sequential units not yet attributed to a stream.
    spare: Packet,
    pub(crate) driver_eof: bool,
    pub(crate) running: bool,
}

impl<D: FormatDriver> Demuxer<D> {
    /// Open the container on `src` with driver `D`.
    pub fn open(
        mut src: MediaSourceStream,
        format_opts: &FormatOptions,
        opts: &DemuxerOptions,
    ) -> Result<Self> {
        let driver = D::open(&mut src, format_opts)?;
        Demuxer::new(src, driver, opts)
    }

    /// Instantiate a demuxer over a driver that is already open on `src`.
    pub fn new(src: MediaSourceStream, mut driver: D, opts: &DemuxerOptions) -> Result<Self> {
        let mut index = driver.take_superindex();
        let mut infos = driver.streams().to_vec();

        if let Some(index) = index.as_mut() {
            prepare_index(index, &mut infos, src.byte_len(), opts)?;
        }

        let mut states: Vec<StreamState> = infos.iter().map(StreamState::new).collect();

        let layout = match &index {
            Some(index) => {
                let layout = classify(index, &infos);

                for state in states.iter_mut() {
                    if let Some(range) = index.stream_range(state.id) {
                        state.index_pos = range.first;
                    }
                }

                info!("container is {}", layout.as_str());

                if layout == Layout::NonInterleaved && !src.is_seekable() {
                    return seek_error(SeekErrorKind::NonInterleavedUnseekable);
                }

                layout
            }
            None => Layout::Sequential,
        };

        Ok(Demuxer {
            src,
            driver,
            index,
            layout,
            cursor: 0,
            infos,
            states,
            spare: Packet::new(),
            driver_eof: false,
            running: false,
        })
    }

    /// Get basic information about the container format.
    pub fn format_info(&self) -> &FormatInfo {
        self.driver.format_info()
    }

    /// Gets the list of active streams.
    pub fn streams(&self) -> &[StreamInfo] {
        &self.infos
    }

    /// Get an active stream by ID.
    pub fn stream(&self, id: u32) -> Option<&StreamInfo> {
        self.infos.iter().find(|info| info.id == id)
    }

    /// The superindex, if the driver built one.
    pub fn superindex(&self) -> Option<&Superindex> {
        self.index.as_ref()
    }

    /// How packets are located.
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Returns false if the container was classified as non-interleaved.
    pub fn is_interleaved(&self) -> bool {
        self.layout != Layout::NonInterleaved
    }

    /// The capabilities of the format driver.
    pub fn caps(&self) -> DriverCaps {
        self.driver.caps()
    }

    /// A snapshot of the retrieval state of a stream.
    pub fn stream_state(&self, id: u32) -> Option<StreamCursor> {
        let pos = self.position(id)?;
        let state = &self.states[pos];

        Some(StreamCursor {
            index_position: state.index_pos,
            next_time: state.next_time,
            eof: state.is_eof(),
            discontinuous: self.infos[pos].is_discontinuous(),
        })
    }

    /// Select or mute a stream. The packets of a muted stream are skipped without being read.
    pub fn select(&mut self, id: u32, selected: bool) -> Result<()> {
        let Some(pos) = self.position(id)
        else {
            return stream_error(id, "no such stream");
        };

        let state = &mut self.states[pos];
        state.selected = selected;

        if !selected {
            state.flush();
        }

        Ok(())
    }

    /// Start delivering packets.
    pub fn start(&mut self) {
        self.running = true;
    }

    /// Stop delivering packets. Takes effect between packets.
    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Returns true between `start` and `stop`.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Get the next packet of a stream. Returns `Ok(None)` at the end of the stream, if the
    /// stream is muted, or if the demuxer is stopped.
    ///
    /// The packet remains valid until the next call for the same stream.
    pub fn get_packet(&mut self, id: u32) -> Result<Option<&Packet>> {
        let pos = self.require(id)?;

        // The previous packet is recycled before reading so its buffer can be refilled.
        let state = &mut self.states[pos];
        state.pool.extend(state.current.take());

        if !self.fill(pos) {
            return Ok(None);
        }

        let state = &mut self.states[pos];
        state.current = state.queue.pop_front();

        if let Some(pkt) = &state.current {
            let tb = self.infos[pos].time_base;
            if let Some(end) = pkt.end_pts().or(pkt.pts) {
                state.next_time = Some(Time::from_ts(end, tb));
            }
        }

        Ok(state.current.as_ref())
    }

    /// Read the next packet of a stream into `pkt`. Returns `Ok(false)` when `get_packet` would
    /// return `Ok(None)`.
    pub fn read_packet(&mut self, id: u32, pkt: &mut Packet) -> Result<bool> {
        match self.get_packet(id)? {
            Some(next) => {
                pkt.copy_from(next);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Look at the next packet of a stream without consuming it. If nothing is buffered and
    /// `force` is true, packets are read until the stream has one or ends.
    pub fn peek_packet(&mut self, id: u32, force: bool) -> Result<Option<&Packet>> {
        let pos = self.require(id)?;

        if force {
            self.fill(pos);
        }

        Ok(self.states[pos].queue.front())
    }

    /// The presentation time of the next packet of a stream. If nothing is buffered, this is the
    /// end time of the last delivered packet.
    pub fn stream_time(&self, id: u32) -> Option<Time> {
        let pos = self.position(id)?;
        let state = &self.states[pos];

        match state.queue.front().and_then(|pkt| pkt.pts) {
            Some(pts) => Some(Time::from_ts(pts, self.infos[pos].time_base)),
            None => state.next_time,
        }
    }

    /// Stop, close the driver, and release every packet buffer.
    pub fn close(&mut self) {
        self.running = false;
        self.driver.close();

        for state in self.states.iter_mut() {
            state.free();
            state.done = true;
        }

        self.spare.free();
    }

    pub(crate) fn position(&self, id: u32) -> Option<usize> {
        self.states.iter().position(|state| state.id == id)
    }

    fn require(&self, id: u32) -> Result<usize> {
        match self.position(id) {
            Some(pos) => Ok(pos),
            None => stream_error(id, "no such stream"),
        }
    }

    /// Read until the stream at `pos` has a queued packet. Returns false if it has none.
    pub(crate) fn fill(&mut self, pos: usize) -> bool {
        if !self.running || !self.states[pos].selected {
            return false;
        }

        while self.states[pos].queue.is_empty() {
            if self.states[pos].done {
                return false;
            }

            match self.layout {
                Layout::Interleaved => self.read_interleaved(),
                Layout::NonInterleaved => self.read_non_interleaved(pos),
                Layout::Sequential => self.read_sequential(),
            }
        }

        true
    }

    /// Read the next selected entry at or after the shared cursor.
    fn read_interleaved(&mut self) {
        let Demuxer { src, index, states, cursor, .. } = self;

        let Some(index) = index.as_ref()
        else {
            return;
        };

        while let Some(entry) = index.get(*cursor) {
            let pos = *cursor;
            *cursor += 1;

            // The entry belongs to a dropped or muted stream, or precedes the stream's position.
            let Some(state) = states.iter_mut().find(|state| state.id == entry.stream_id)
            else {
                continue;
            };

            if !state.selected || state.done || pos < state.index_pos {
                continue;
            }

            state.index_pos = pos + 1;
            read_indexed(src, index, pos, entry, state);
            return;
        }

        debug!("end of superindex");

        for state in states.iter_mut() {
            state.done = true;
        }
    }

    /// Read the next entry of the stream at `pos` using its own cursor.
    fn read_non_interleaved(&mut self, pos: usize) {
        let Demuxer { src, index, states, .. } = self;
        let state = &mut states[pos];

        let Some(index) = index.as_ref()
        else {
            state.done = true;
            return;
        };

        match index.next_for_stream(state.id, state.index_pos) {
            Some(entry_pos) => {
                state.index_pos = entry_pos + 1;
                read_indexed(src, index, entry_pos, &index.entries()[entry_pos], state);
            }
            None => state.done = true,
        }
    }

    /// Pull the next unit from the driver and route it to its stream.
    fn read_sequential(&mut self) {
        let Demuxer { src, driver, states, spare, driver_eof, .. } = self;

        loop {
            spare.reset();

            let got = if *driver_eof {
                driver.drain(spare)
            }
            else {
                match driver.next_unit(src, spare) {
                    Ok(true) => true,
                    Ok(false) => {
                        *driver_eof = true;
                        continue;
                    }
                    Err(err) => {
                        if !err.is_end_of_stream() {
                            warn!("reading unit failed: {}", err);
                        }
                        *driver_eof = true;
                        continue;
                    }
                }
            };

            if !got {
                debug!("end of container");
                for state in states.iter_mut() {
                    state.done = true;
                }
                return;
            }

            let Some(state) = states.iter_mut().find(|state| state.id == spare.stream_id)
            else {
                continue;
            };

            if !state.selected || state.done {
                continue;
            }

            let mut pkt = state.take_packet();
            mem::swap(&mut pkt, spare);
            state.admit(pkt);
            return;
        }
    }
}

impl<D: FormatDriver> Drop for Demuxer<D> {
    fn drop(&mut self) {
        self.driver.close();
    }
}

/// Read the superindex entry at `pos` into a packet of `state`. A failed read ends the stream.
fn read_indexed(
    src: &mut MediaSourceStream,
    index: &Superindex,
    pos: usize,
    entry: &SuperindexEntry,
    state: &mut StreamState,
) {
    let mut pkt = state.take_packet();

    if let Err(err) = read_entry(src, entry, &mut pkt) {
        warn!("stream {}: failed to read packet at {:#x}: {}", state.id, entry.offset, err);
        state.pool.push(pkt);
        state.done = true;
        return;
    }

    if index.stream_range(entry.stream_id).is_some_and(|range| range.last == pos) {
        pkt.flags |= PacketFlags::LAST;
        state.done = true;
    }

    state.admit(pkt);
}

fn read_entry(
    src: &mut MediaSourceStream,
    entry: &SuperindexEntry,
    pkt: &mut Packet,
) -> Result<()> {
    src.seek_to(entry.offset)?;
    pkt.read_from(src, entry.size as usize)?;

    pkt.stream_id = entry.stream_id;
    pkt.pts = Some(entry.pts);
    pkt.duration = if entry.duration > 0 { Some(entry.duration) } else { None };
    pkt.samples = Some(entry.samples);
    pkt.position = Some(entry.offset);

    if entry.keyframe {
        pkt.flags |= PacketFlags::KEYFRAME;
    }

    Ok(())
}

/// Apply the post-pass to a freshly built superindex: drop entries past the end of the source,
/// fill durations, drop streams with decreasing timestamps, and eliminate streams without
/// entries.
fn prepare_index(
    index: &mut Superindex,
    infos: &mut Vec<StreamInfo>,
    byte_len: Option<u64>,
    opts: &DemuxerOptions,
) -> Result<()> {
    if let Some(byte_len) = byte_len {
        let removed = index.truncate_past(byte_len);
        if removed > 0 {
            warn!("superindex: dropped {} entries past the end of the source", removed);
        }
    }

    index.set_durations();

    if opts.check_monotonic {
        for id in index.check_monotonic() {
            warn!("stream {}: timestamps are not monotonic, dropping its entries", id);
            index.remove_stream(id);
        }
    }

    if opts.drop_empty_streams {
        let first = infos.first().map(|info| info.id);

        infos.retain(|info| {
            let keep = index.stream_range(info.id).is_some();
            if !keep {
                warn!("stream {}: declared but has no packets, dropping", info.id);
            }
            keep
        });

        if infos.is_empty() {
            return match first {
                Some(id) => stream_error(id, "no stream has any packets"),
                None => stream_error(0, "container declares no streams"),
            };
        }
    }

    Ok(())
}

/// Pick the two streams whose relative layout decides interleaving: the first audio and first
/// video stream, or else the first two streams.
pub(crate) fn primary_streams(infos: &[StreamInfo]) -> Option<(u32, u32)> {
    let first_of = |ty| infos.iter().find(|info| info.stream_type() == ty).map(|info| info.id);

    match (first_of(StreamType::Audio), first_of(StreamType::Video)) {
        (Some(a), Some(v)) => Some((a, v)),
        _ => match infos {
            [a, b, ..] => Some((a.id, b.id)),
            _ => None,
        },
    }
}

fn classify(index: &Superindex, infos: &[StreamInfo]) -> Layout {
    match primary_streams(infos) {
        Some((a, b)) if !index.is_interleaved(a, b) => Layout::NonInterleaved,
        _ => Layout::Interleaved,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use crate::testing::*;

    fn demuxer(driver: MockDriver, len: usize) -> Demuxer<MockDriver> {
        let mut demux = Demuxer::new(source(len), driver, &Default::default()).unwrap();
        demux.start();
        demux
    }

    #[test]
    fn verify_interleaved_retrieval() {
        let driver = MockDriver::indexed(av_streams(), av_index(10, true));
        let mut demux = demuxer(driver, 2000);

        assert_eq!(demux.layout(), Layout::Interleaved);

        for i in 0..10 {
            let pkt = demux.get_packet(VIDEO).unwrap().unwrap();
            assert_eq!(pkt.pts, Some(i));
            assert_eq!(pkt.duration, Some(1));
            assert_eq!(pkt.data_len(), 100);
            assert_eq!(pkt.buf()[0], payload_byte(2 * i as u64 + 1));
        }

        // Audio was queued while video was read.
        for i in 0..10 {
            let pkt = demux.get_packet(AUDIO).unwrap().unwrap();
            assert_eq!(pkt.pts, Some(1920 * i));
        }

        assert!(demux.get_packet(AUDIO).unwrap().is_none());
        assert!(demux.get_packet(VIDEO).unwrap().is_none());
        assert!(demux.stream_state(AUDIO).unwrap().eof);
    }

    #[test]
    fn verify_packets_are_recycled() {
        let driver = MockDriver::indexed(av_streams(), av_index(3, true));
        let mut demux = demuxer(driver, 600);

        let first = demux.get_packet(VIDEO).unwrap().unwrap().buf().as_ptr() as usize;
        let second = demux.get_packet(VIDEO).unwrap().unwrap().buf().as_ptr() as usize;
        assert_eq!(first, second);

        let last = demux.get_packet(VIDEO).unwrap().unwrap();
        assert!(last.flags.contains(PacketFlags::LAST));
        assert_eq!(last.buf().as_ptr() as usize, first);
        assert_eq!(last.position, Some(500));
    }

    #[test]
    fn verify_muted_stream_is_not_read() {
        let driver = MockDriver::indexed(av_streams(), av_index(10, true));

        let mut demux = Demuxer::new(source(2000), driver, &Default::default()).unwrap();
        demux.select(AUDIO, false).unwrap();
        demux.start();

        let mut count = 0;
        while demux.get_packet(VIDEO).unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 10);

        assert!(demux.peek_packet(AUDIO, true).unwrap().is_none());
        assert!(demux.get_packet(AUDIO).unwrap().is_none());
        assert_eq!(demux.stream_state(AUDIO).unwrap().index_position, 0);
    }

    #[test]
    fn verify_non_interleaved_retrieval() {
        let log = ReadLog::default();
        let driver = MockDriver::indexed(av_streams(), av_index(5, false));
        let src = tracking_source(1000, true, &log);

        let mut demux = Demuxer::new(src, driver, &Default::default()).unwrap();
        demux.start();

        assert_eq!(demux.layout(), Layout::NonInterleaved);
        assert!(!demux.is_interleaved());

        // Video entries are 5..10, stored at offsets 500..1000.
        let pkt = demux.get_packet(VIDEO).unwrap().unwrap();
        assert_eq!(pkt.position, Some(500));
        assert_eq!(pkt.pts, Some(0));

        // Nothing before the first video entry was touched.
        assert_eq!(log.seeks(), vec![500]);
        assert!(log.reads().iter().all(|&(pos, _)| pos >= 500));
        assert_eq!(demux.stream_state(AUDIO).unwrap().index_position, 0);

        // Audio is still available from its own cursor.
        let pkt = demux.get_packet(AUDIO).unwrap().unwrap();
        assert_eq!(pkt.position, Some(0));
        let pkt = demux.get_packet(VIDEO).unwrap().unwrap();
        assert_eq!(pkt.position, Some(600));
    }

    #[test]
    fn verify_non_interleaved_unseekable() {
        let log = ReadLog::default();
        let driver = MockDriver::indexed(av_streams(), av_index(5, false));
        let src = tracking_source(1000, false, &log);

        match Demuxer::new(src, driver, &Default::default()) {
            Err(Error::SeekError(SeekErrorKind::NonInterleavedUnseekable)) => (),
            _ => panic!("expected a seek error"),
        }
    }

    #[test]
    fn verify_interleaved_forward_only() {
        let log = ReadLog::default();
        let driver = MockDriver::indexed(av_streams(), av_index(4, true));
        let src = tracking_source(800, false, &log);

        let mut demux = Demuxer::new(src, driver, &Default::default()).unwrap();
        demux.start();

        let mut got = Vec::new();
        for _ in 0..4 {
            got.push(demux.get_packet(AUDIO).unwrap().unwrap().position);
            got.push(demux.get_packet(VIDEO).unwrap().unwrap().position);
        }
        assert_eq!(got, (0..8).map(|i| Some(100 * i)).collect::<Vec<_>>());
    }

    #[test]
    fn verify_classification_is_symmetric() {
        let index = av_index(5, false);

        let mut swapped = av_streams();
        swapped.reverse();

        assert_eq!(classify(&index, &av_streams()), Layout::NonInterleaved);
        assert_eq!(classify(&index, &swapped), Layout::NonInterleaved);

        let index = av_index(5, true);
        assert_eq!(classify(&index, &av_streams()), Layout::Interleaved);
        assert_eq!(classify(&index, &swapped), Layout::Interleaved);
    }

    #[test]
    fn verify_empty_stream_dropped() {
        let mut streams = av_streams();
        streams.push(text_stream(7));

        let driver = MockDriver::indexed(streams, av_index(4, true));
        let demux = demuxer(driver, 800);

        assert_eq!(demux.streams().len(), 2);
        assert!(demux.stream(7).is_none());
    }

    #[test]
    fn verify_entries_past_end_truncated() {
        let driver = MockDriver::indexed(av_streams(), av_index(5, true));

        // The final two entries do not fit.
        let mut demux = demuxer(driver, 850);
        assert_eq!(demux.superindex().unwrap().len(), 8);

        let mut count = 0;
        while demux.get_packet(VIDEO).unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 4);
    }

    #[test]
    fn verify_read_failure_ends_stream() {
        let driver = MockDriver::indexed(av_streams(), av_index(5, true));
        let log = ReadLog::default();
        // Superindex claims 1000 bytes but the source is unknown length and shorter.
        let src = truncated_source(450, &log);

        let mut demux = Demuxer::new(src, driver, &Default::default()).unwrap();
        demux.start();

        let mut count = 0;
        while demux.get_packet(AUDIO).unwrap().is_some() {
            count += 1;
        }
        // Audio entries at 0, 200 and 400; the last is short.
        assert_eq!(count, 2);
        assert!(demux.stream_state(AUDIO).unwrap().eof);
    }

    #[test]
    fn verify_sequential_retrieval() {
        let driver = MockDriver::sequential(av_streams(), av_units(Time::from_secs(1)), 0);
        let mut demux = demuxer(driver, 0);

        assert_eq!(demux.layout(), Layout::Sequential);

        let mut pkt = Packet::new();
        for i in 0..25 {
            assert!(demux.read_packet(VIDEO, &mut pkt).unwrap());
            assert_eq!(pkt.pts, Some(i));
        }
        assert!(!demux.read_packet(VIDEO, &mut pkt).unwrap());

        // The driver holds back the final video unit and flushes it at the end.
        let driver = MockDriver::sequential(av_streams(), av_units(Time::from_secs(1)), 1);
        let mut demux = demuxer(driver, 0);

        let mut count = 0;
        while demux.get_packet(VIDEO).unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 25);
    }

    #[test]
    fn verify_peek_and_stop() {
        let driver = MockDriver::indexed(av_streams(), av_index(3, true));
        let mut demux = Demuxer::new(source(600), driver, &Default::default()).unwrap();

        // Not started.
        assert!(demux.get_packet(AUDIO).unwrap().is_none());

        demux.start();
        assert!(demux.peek_packet(VIDEO, false).unwrap().is_none());
        assert_eq!(demux.peek_packet(VIDEO, true).unwrap().unwrap().pts, Some(0));
        assert_eq!(demux.stream_time(VIDEO), Some(Time::ZERO));

        // Peeking does not consume.
        assert_eq!(demux.get_packet(VIDEO).unwrap().unwrap().pts, Some(0));
        assert_eq!(demux.stream_time(VIDEO), Some(Time::from_millis(40)));

        demux.stop();
        assert!(demux.get_packet(VIDEO).unwrap().is_none());

        demux.close();
        assert!(demux.stream_state(VIDEO).unwrap().eof);
    }

    #[test]
    fn verify_unknown_stream() {
        let driver = MockDriver::indexed(av_streams(), av_index(3, true));
        let mut demux = demuxer(driver, 600);

        match demux.get_packet(42) {
            Err(Error::StreamError { stream_id: 42, .. }) => (),
            _ => panic!("expected a stream error"),
        }
    }
}
