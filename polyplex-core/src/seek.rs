// Polyplex
// Copyright (c) 2024-2026 The Project Polyplex Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `seek` module converts a requested presentation time into stream positions.
//!
//! A seek backed by a superindex, or by a format driver that seeks exactly, completes in one
//! round. A format driver that only approximates the requested time is driven iteratively: after
//! each round the time actually reached is compared with the target and the request is corrected
//! until the result is close enough to skip forward from, or until the corrections start to
//! cycle.

use log::debug;

use crate::demux::Demuxer;
use crate::errors::{seek_error, Result, SeekErrorKind};
use crate::formats::{DriverCaps, FormatDriver, StreamFlags, StreamType};
use crate::units::Time;

/// `SeekOptions` tunes the iterative seek.
#[derive(Copy, Clone, Debug)]
pub struct SeekOptions {
    /// The fraction of a large undershoot added to the request. Default: `2/3`.
    pub undershoot_gain: f64,
    /// The multiple of an overshoot subtracted from the request. Default: `3/2`.
    pub overshoot_gain: f64,
    /// The furthest distance an iterative seek skips forward from the point reached to the
    /// target. Larger undershoots are corrected by seeking again. Default: 2 seconds.
    pub max_skip: Time,
    /// The largest overshoot accepted without correction. Default: 0.
    pub tolerance: Time,
    /// The maximum number of rounds. Default: `16`.
    pub max_rounds: u32,
}

impl Default for SeekOptions {
    fn default() -> Self {
        SeekOptions {
            undershoot_gain: 2.0 / 3.0,
            overshoot_gain: 3.0 / 2.0,
            max_skip: Time::from_secs(2),
            tolerance: Time::ZERO,
            max_rounds: 16,
        }
    }
}

/// Whether a seek completes in one round.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SeekMode {
    /// The position reached is trusted as is.
    Direct,
    /// The request is refined until the position reached is acceptable.
    Iterative,
}

/// One round of a seek.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SeekAttempt {
    pub requested: Time,
    pub achieved: Time,
}

/// The two most recent attempts of an iterative seek.
///
/// If a round reaches a time already reached by one of the remembered attempts, the corrections
/// are cycling.
#[derive(Clone, Debug, Default)]
pub struct SeekHistory {
    slots: [Option<SeekAttempt>; 2],
    next: usize,
}

impl SeekHistory {
    /// Remember an attempt, forgetting the oldest one.
    pub fn push(&mut self, attempt: SeekAttempt) {
        self.slots[self.next] = Some(attempt);
        self.next = (self.next + 1) % self.slots.len();
    }

    /// Returns true if a remembered attempt reached `achieved`.
    pub fn contains(&self, achieved: Time) -> bool {
        self.attempts().any(|attempt| attempt.achieved == achieved)
    }

    /// The remembered attempt that reached closest to, but not after, `target`. If every attempt
    /// overshot, the one that reached the earliest time.
    pub fn best(&self, target: Time) -> Option<SeekAttempt> {
        let before = self.attempts().filter(|a| a.achieved <= target).max_by_key(|a| a.achieved);
        before.or_else(|| self.attempts().min_by_key(|a| a.achieved))
    }

    fn attempts(&self) -> impl Iterator<Item = SeekAttempt> + '_ {
        self.slots.iter().flatten().copied()
    }
}

/// The decision taken after a round.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SeekStep {
    /// The position reached is final.
    Accept,
    /// Seek again, requesting the given time.
    Retry(Time),
}

/// Decide how to continue after a request for `requested` reached `achieved`.
pub fn correct(target: Time, requested: Time, achieved: Time, opts: &SeekOptions) -> SeekStep {
    if achieved > target {
        let over = achieved - target;

        if over <= opts.tolerance || requested <= Time::ZERO {
            return SeekStep::Accept;
        }

        SeekStep::Retry((requested - over.scale(opts.overshoot_gain)).max(Time::ZERO))
    }
    else {
        let gap = target - achieved;

        if gap > opts.max_skip {
            SeekStep::Retry(requested + gap.scale(opts.undershoot_gain))
        }
        else {
            SeekStep::Accept
        }
    }
}

/// The result of a seek.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SeekOutcome {
    /// The time requested in the final round.
    pub requested: Time,
    /// The time reached by the final round.
    pub achieved: Time,
    /// The time the next delivered output starts at. This is the target if the gap was skipped.
    pub time: Time,
    /// The number of rounds.
    pub rounds: u32,
}

/// Something that can be positioned approximately in time.
pub trait ApproximateSeek {
    /// Reposition at, or near, `requested`. Returns the time reached, or `None` if nothing
    /// remains to be delivered from there.
    fn seek_round(&mut self, requested: Time) -> Result<Option<Time>>;

    /// Discard everything before `target`.
    fn skip_to(&mut self, target: Time);
}

/// Seek `target` to `time`, refining the request until the rules of `opts` accept the position
/// reached, then skip forward to `time` if it is within reach.
pub fn converge<S>(target: &mut S, time: Time, opts: &SeekOptions) -> Result<SeekOutcome>
where
    S: ApproximateSeek + ?Sized,
{
    let mut history = SeekHistory::default();
    let mut requested = time;
    let mut rounds = 0;

    let achieved = loop {
        rounds += 1;

        let Some(achieved) = target.seek_round(requested)?
        else {
            debug!("seek round {}: nothing remains after {}", rounds, requested);

            // An earlier round reached something, return to it.
            match history.best(time) {
                Some(best) => {
                    target.seek_round(best.requested)?;
                    requested = best.requested;
                    break Some(best.achieved);
                }
                None => break None,
            }
        };

        if history.contains(achieved) {
            let best = history.best(time).unwrap_or(SeekAttempt { requested, achieved });

            debug!(
                "seek round {}: requested {}, achieved {} again, settling on {}",
                rounds, requested, achieved, best.achieved
            );

            if best.achieved != achieved {
                target.seek_round(best.requested)?;
            }

            requested = best.requested;
            break Some(best.achieved);
        }

        history.push(SeekAttempt { requested, achieved });

        let step = correct(time, requested, achieved, opts);

        debug!("seek round {}: requested {}, achieved {}, {:?}", rounds, requested, achieved, step);

        match step {
            SeekStep::Accept => break Some(achieved),
            SeekStep::Retry(_) if rounds >= opts.max_rounds => {
                let best = history.best(time).unwrap_or(SeekAttempt { requested, achieved });

                if best.achieved != achieved {
                    target.seek_round(best.requested)?;
                }

                requested = best.requested;
                break Some(best.achieved);
            }
            SeekStep::Retry(next) => requested = next,
        }
    };

    let outcome = match achieved {
        Some(achieved) if achieved <= time && time - achieved <= opts.max_skip => {
            target.skip_to(time);
            SeekOutcome { requested, achieved, time, rounds }
        }
        Some(achieved) => SeekOutcome { requested, achieved, time: achieved, rounds },
        None => SeekOutcome { requested, achieved: time, time, rounds },
    };

    Ok(outcome)
}

impl<D: FormatDriver> Demuxer<D> {
    /// Whether seeks on this demuxer complete in one round.
    pub fn seek_mode(&self) -> SeekMode {
        if self.index.is_none() && self.driver.caps().contains(DriverCaps::SEEKS_ITERATIVELY) {
            SeekMode::Iterative
        }
        else {
            SeekMode::Direct
        }
    }

    /// Seek every stream to `time`. Returns the time the next delivered output starts at.
    pub fn seek(&mut self, time: Time, opts: &SeekOptions) -> Result<Time> {
        Ok(self.seek_with_outcome(time, opts)?.time)
    }

    /// Seek every stream to `time`, returning the details of the seek.
    pub fn seek_with_outcome(&mut self, time: Time, opts: &SeekOptions) -> Result<SeekOutcome> {
        if time < Time::ZERO {
            return seek_error(SeekErrorKind::OutOfRange);
        }

        if self.index.is_some() {
            if !self.src.is_seekable() {
                return seek_error(SeekErrorKind::Unseekable);
            }
        }
        else if !self.driver.caps().contains(DriverCaps::CAN_SEEK) {
            return seek_error(SeekErrorKind::Unseekable);
        }

        let outcome = match self.seek_mode() {
            // The position reached is final, so the skip to the target is never capped.
            SeekMode::Direct => {
                let opts = SeekOptions { max_rounds: 1, max_skip: Time::MAX, ..*opts };
                converge(self, time, &opts)?
            }
            SeekMode::Iterative => converge(self, time, opts)?,
        };

        debug!(
            "seeked to {} (requested {}, reached {}, {} rounds)",
            outcome.time, outcome.requested, outcome.achieved, outcome.rounds
        );

        Ok(outcome)
    }

    /// Position every stream cursor at, or before, `time` using the superindex.
    ///
    /// The primary video stream is positioned at its last keyframe at or before `time`. Every
    /// other stream is positioned at its last entry at or before that keyframe.
    fn seek_index(&mut self, time: Time) {
        let Demuxer { index, infos, states, cursor, .. } = self;

        let Some(index) = index.as_ref()
        else {
            return;
        };

        let anchor = infos.iter().zip(states.iter()).position(|(info, state)| {
            state.selected
                && info.stream_type() == StreamType::Video
                && !info.flags.contains(StreamFlags::STILL)
        });

        let anchor_time = anchor
            .and_then(|pos| {
                let info = &infos[pos];
                let entry = index.seek_keyframe(info.id, time.to_ts(info.time_base), true)?;
                index.get(entry).map(|entry| Time::from_ts(entry.pts, info.time_base))
            })
            .unwrap_or(time);

        for (pos, (info, state)) in infos.iter().zip(states.iter_mut()).enumerate() {
            let keyframe = Some(pos) == anchor || info.compression.has_inter_frames();
            let ts = anchor_time.to_ts(info.time_base);

            match index.seek_keyframe(info.id, ts, keyframe) {
                Some(entry) => state.index_pos = entry,
                None => state.done = true,
            }
        }

        *cursor = states
            .iter()
            .filter(|state| state.selected && !state.done)
            .map(|state| state.index_pos)
            .min()
            .unwrap_or(0);
    }

    /// Read ahead on every time-ordered stream and return the earliest time any of them will
    /// deliver next.
    fn resync(&mut self) -> Option<Time> {
        let running = self.running;
        self.running = true;

        let mut achieved: Option<Time> = None;

        for pos in 0..self.states.len() {
            if !self.states[pos].selected || self.infos[pos].is_discontinuous() {
                continue;
            }

            if self.fill(pos) {
                let time = self.stream_time(self.states[pos].id);
                achieved = match (achieved, time) {
                    (Some(a), Some(t)) => Some(a.min(t)),
                    (a, t) => a.or(t),
                };
            }
        }

        self.running = running;
        achieved
    }
}

impl<D: FormatDriver> ApproximateSeek for Demuxer<D> {
    fn seek_round(&mut self, requested: Time) -> Result<Option<Time>> {
        for state in self.states.iter_mut() {
            state.flush();
            state.done = false;
            state.next_time = None;
        }

        self.driver_eof = false;

        if self.index.is_some() {
            self.seek_index(requested);
        }
        else {
            self.driver.seek(&mut self.src, requested)?;
        }

        Ok(self.resync())
    }

    fn skip_to(&mut self, target: Time) {
        for (info, state) in self.infos.iter().zip(self.states.iter_mut()) {
            if !state.selected {
                continue;
            }

            state.skip_to = Some(target.to_ts(info.time_base));

            let queued: Vec<_> = state.queue.drain(..).collect();
            for pkt in queued {
                state.admit(pkt);
            }
        }
    }
}
