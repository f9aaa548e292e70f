// Polyplex
// Copyright (c) 2024-2026 The Project Polyplex Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `sync` module schedules the consumption of several streams in presentation order.
//!
//! A [`Connector`] holds one cursor time per registered stream. Every
//! [`iteration`](Connector::iteration) advances the stream that is furthest behind by exactly one
//! packet, so that the packets of all streams reach their consumers in a globally time-ordered
//! interleaving, even though no stream is synchronized with the others in the container.

use log::{debug, warn};
use smallvec::SmallVec;

use crate::demux::{Demuxer, Layout};
use crate::errors::{stream_error, Result};
use crate::formats::FormatDriver;
use crate::packet::Packet;
use crate::seek::SeekOptions;
use crate::units::{Time, TimeBase, Timestamp};

/// A `StreamProcessor` consumes the packets of one stream, e.g. by decoding and rendering them.
pub trait StreamProcessor {
    /// The time base of the end timestamps returned by [`StreamProcessor::process`], negotiated
    /// with the output. `None` if the processor reports no timestamps of its own.
    fn time_base(&self) -> Option<TimeBase> {
        None
    }

    /// Process one packet. Returns the timestamp, in [`StreamProcessor::time_base`], at which the
    /// output produced so far ends, or `None` to use the end of the packet.
    fn process(&mut self, pkt: &Packet) -> Result<Option<Timestamp>>;
}

impl<F> StreamProcessor for F
where
    F: FnMut(&Packet) -> Result<()>,
{
    fn process(&mut self, pkt: &Packet) -> Result<Option<Timestamp>> {
        self(pkt)?;
        Ok(None)
    }
}

struct ConnectedStream<'a> {
    id: u32,
    processor: Box<dyn StreamProcessor + 'a>,
    /// The time base of the packets.
    stream_tb: TimeBase,
    /// The time base of the times returned by the processor.
    output_tb: Option<TimeBase>,
    discontinuous: bool,
    /// The time the stream has been processed up to. `None` until the first packet.
    cursor: Option<Time>,
    eof: bool,
}

impl ConnectedStream<'_> {
    /// Process one packet and advance the cursor to its end. Returns false if the stream ended
    /// instead.
    fn step<D: FormatDriver>(&mut self, demux: &mut Demuxer<D>) -> Result<bool> {
        let Some(pkt) = demux.get_packet(self.id)?
        else {
            debug!("stream {}: ended", self.id);
            self.eof = true;
            return Ok(false);
        };

        match self.processor.process(pkt) {
            Ok(end) => {
                let end = match (end, self.output_tb) {
                    (Some(ts), Some(tb)) => Some(Time::from_ts(ts, tb)),
                    _ => pkt.end_pts().or(pkt.pts).map(|ts| Time::from_ts(ts, self.stream_tb)),
                };

                self.cursor = end.or(self.cursor).or(Some(Time::ZERO));
                Ok(true)
            }
            Err(err) => {
                warn!("stream {}: processing failed: {}", self.id, err);
                self.eof = true;
                Ok(false)
            }
        }
    }
}

/// A `Connector` drives several streams of one [`Demuxer`] in presentation order.
#[derive(Default)]
pub struct Connector<'a> {
    streams: SmallVec<[ConnectedStream<'a>; 4]>,
    started: bool,
}

impl<'a> Connector<'a> {
    pub fn new() -> Self {
        Default::default()
    }

    /// Register a stream and the processor consuming it. Streams registered earlier win ties.
    pub fn add_stream<P>(&mut self, id: u32, processor: P)
    where
        P: StreamProcessor + 'a,
    {
        self.streams.push(ConnectedStream {
            id,
            processor: Box::new(processor),
            stream_tb: TimeBase::MICROS,
            output_tb: None,
            discontinuous: false,
            cursor: None,
            eof: false,
        });
    }

    /// Resolve the timing of every registered stream, mute every stream of `demux` that is not
    /// registered, and start the demuxer.
    pub fn start<D: FormatDriver>(&mut self, demux: &mut Demuxer<D>) -> Result<()> {
        for stream in self.streams.iter_mut() {
            let Some(info) = demux.stream(stream.id)
            else {
                return stream_error(stream.id, "not present in the container");
            };

            stream.stream_tb = info.time_base;
            stream.output_tb = stream.processor.time_base();
            stream.discontinuous = info.is_discontinuous();
            stream.cursor = None;
            stream.eof = false;
        }

        let ids: Vec<u32> = demux.streams().iter().map(|info| info.id).collect();

        for id in ids {
            let connected = self.streams.iter().any(|stream| stream.id == id);
            demux.select(id, connected)?;
        }

        demux.start();
        self.started = true;

        Ok(())
    }

    /// Advance by one unit of forward progress. Every discontinuous stream processes one packet,
    /// then the time-ordered stream furthest behind processes one packet.
    ///
    /// While a time-ordered stream is live, a discontinuous stream sharing the read cursor only
    /// processes a packet that is already buffered. Reading ahead for it would queue every other
    /// stream up to its next packet.
    ///
    /// Returns `Ok(false)` once every stream has ended.
    pub fn iteration<D: FormatDriver>(&mut self, demux: &mut Demuxer<D>) -> Result<bool> {
        if !self.started {
            self.start(demux)?;
        }

        let paced = self.streams.iter().any(|s| !s.discontinuous && !s.eof);
        let own_cursor = demux.layout() == Layout::NonInterleaved;

        let mut progressed = false;

        for stream in self.streams.iter_mut().filter(|s| s.discontinuous && !s.eof) {
            if paced && !own_cursor && demux.peek_packet(stream.id, false)?.is_none() {
                continue;
            }
            progressed |= stream.step(demux)?;
        }

        // A stream without a time sorts first. Ties go to the first registered stream. If the
        // chosen stream turns out to have ended, the next one is chosen.
        while let Some(stream) = self
            .streams
            .iter_mut()
            .filter(|s| !s.discontinuous && !s.eof)
            .min_by_key(|s| s.cursor)
        {
            if stream.step(demux)? {
                progressed = true;
                break;
            }
        }

        // The time-ordered streams ended during this iteration. Whatever remains of the
        // discontinuous streams can now be read.
        if !progressed {
            for stream in self.streams.iter_mut().filter(|s| s.discontinuous && !s.eof) {
                progressed |= stream.step(demux)?;
            }
        }

        Ok(progressed)
    }

    /// Run iterations until every stream has ended or the demuxer is stopped.
    pub fn run<D: FormatDriver>(&mut self, demux: &mut Demuxer<D>) -> Result<()> {
        while self.iteration(demux)? {
            if !demux.is_running() {
                break;
            }
        }
        Ok(())
    }

    /// Seek the demuxer and restart every stream cursor.
    pub fn seek<D: FormatDriver>(
        &mut self,
        demux: &mut Demuxer<D>,
        time: Time,
        opts: &SeekOptions,
    ) -> Result<Time> {
        let time = demux.seek(time, opts)?;

        for stream in self.streams.iter_mut() {
            stream.cursor = None;
            stream.eof = false;
        }

        Ok(time)
    }

    /// The time a stream has been processed up to.
    pub fn stream_time(&self, id: u32) -> Option<Time> {
        self.streams.iter().find(|s| s.id == id).and_then(|s| s.cursor)
    }

    /// Returns true once every registered stream has ended.
    pub fn is_done(&self) -> bool {
        self.streams.iter().all(|s| s.eof)
    }
}
