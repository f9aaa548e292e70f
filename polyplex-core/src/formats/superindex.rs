// Polyplex
// Copyright (c) 2024-2026 The Project Polyplex Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeMap;

use crate::units::{Duration, Timestamp};

/// The location and timing of one unit in the container.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SuperindexEntry {
    /// The stream the unit belongs to.
    pub stream_id: u32,
    /// The absolute byte offset of the unit payload.
    pub offset: u64,
    /// The size of the unit payload in bytes.
    pub size: u32,
    /// The presentation timestamp in the stream's time base.
    pub pts: Timestamp,
    /// The duration in the stream's time base. Zero if unknown.
    pub duration: Duration,
    /// The unit is a keyframe.
    pub keyframe: bool,
    /// The number of samples in the unit for audio streams, else one.
    pub samples: u32,
}

impl SuperindexEntry {
    /// The byte offset one past the end of the unit.
    pub fn end(&self) -> u64 {
        self.offset + u64::from(self.size)
    }
}

/// The inclusive range of superindex positions holding the entries of one stream.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StreamRange {
    /// The position of the first entry of the stream.
    pub first: usize,
    /// The position of the last entry of the stream.
    pub last: usize,
    /// The number of entries of the stream.
    pub count: usize,
}

impl StreamRange {
    /// Returns true if two ranges share any position.
    pub fn overlaps(&self, other: &StreamRange) -> bool {
        self.first <= other.last && other.first <= self.last
    }
}

/// A `Superindex` is the file-global table of every unit of every stream, in byte offset order.
///
/// A format driver builds it once during open by pushing entries in the order they appear in the
/// container. Afterwards it is read-only: the demuxer keeps all cursors into the table outside of
/// it, so a superindex may be shared by reference.
///
/// For every stream, entries taken in table order have non-decreasing timestamps. Drivers that
/// cannot guarantee this should call [`Superindex::check_monotonic`].
#[derive(Clone, Debug, Default)]
pub struct Superindex {
    entries: Vec<SuperindexEntry>,
    ranges: BTreeMap<u32, StreamRange>,
}

impl Superindex {
    pub fn new() -> Self {
        Default::default()
    }

    /// Create a superindex with room for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Superindex { entries: Vec::with_capacity(capacity), ranges: BTreeMap::new() }
    }

    /// Append an entry.
    pub fn push(&mut self, entry: SuperindexEntry) {
        let pos = self.entries.len();

        self.ranges
            .entry(entry.stream_id)
            .and_modify(|range| {
                range.last = pos;
                range.count += 1;
            })
            .or_insert(StreamRange { first: pos, last: pos, count: 1 });

        self.entries.push(entry);
    }

    /// The number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in table order.
    pub fn entries(&self) -> &[SuperindexEntry] {
        &self.entries
    }

    /// Get the entry at `pos`.
    pub fn get(&self, pos: usize) -> Option<&SuperindexEntry> {
        self.entries.get(pos)
    }

    /// The range of positions occupied by a stream, or `None` if the stream has no entries.
    pub fn stream_range(&self, stream_id: u32) -> Option<StreamRange> {
        self.ranges.get(&stream_id).copied()
    }

    /// The IDs of every stream with at least one entry, in ascending order.
    pub fn stream_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.ranges.keys().copied()
    }

    /// Find the position of the first entry of `stream_id` at or after `from`.
    pub fn next_for_stream(&self, stream_id: u32, from: usize) -> Option<usize> {
        let range = self.ranges.get(&stream_id)?;

        let start = from.max(range.first);
        if start > range.last {
            return None;
        }

        self.entries[start..=range.last]
            .iter()
            .position(|entry| entry.stream_id == stream_id)
            .map(|offset| start + offset)
    }

    /// Fill in every zero duration from the timestamp of the next entry of the same stream. The
    /// last entry of a stream keeps its duration.
    pub fn set_durations(&mut self) {
        let mut next_pts: BTreeMap<u32, Timestamp> = BTreeMap::new();

        for entry in self.entries.iter_mut().rev() {
            if entry.duration == 0 {
                if let Some(&next) = next_pts.get(&entry.stream_id) {
                    entry.duration = (next - entry.pts).max(0);
                }
            }
            next_pts.insert(entry.stream_id, entry.pts);
        }
    }

    /// Returns the IDs of every stream whose timestamps decrease somewhere in table order.
    pub fn check_monotonic(&self) -> Vec<u32> {
        let mut last_pts: BTreeMap<u32, Timestamp> = BTreeMap::new();
        let mut bad = Vec::new();

        for entry in &self.entries {
            if let Some(last) = last_pts.insert(entry.stream_id, entry.pts) {
                if entry.pts < last && !bad.contains(&entry.stream_id) {
                    bad.push(entry.stream_id);
                }
            }
        }

        bad
    }

    /// Remove every entry whose payload extends past `byte_len`. Returns the number of entries
    /// removed.
    pub fn truncate_past(&mut self, byte_len: u64) -> usize {
        let before = self.entries.len();
        self.retain(|entry| entry.end() <= byte_len);
        before - self.entries.len()
    }

    /// Remove every entry of a stream.
    pub fn remove_stream(&mut self, stream_id: u32) {
        if self.ranges.contains_key(&stream_id) {
            self.retain(|entry| entry.stream_id != stream_id);
        }
    }

    fn retain<F: FnMut(&SuperindexEntry) -> bool>(&mut self, f: F) {
        self.entries.retain(f);

        let entries = std::mem::take(&mut self.entries);
        self.ranges.clear();

        self.entries.reserve_exact(entries.len());
        for entry in entries {
            self.push(entry);
        }
    }

    /// Returns false if the entries of the two streams occupy disjoint position ranges, that is,
    /// all units of one stream are stored before all units of the other. The result does not
    /// depend on the order of the arguments. A stream without entries is never considered
    /// disjoint.
    pub fn is_interleaved(&self, a: u32, b: u32) -> bool {
        match (self.ranges.get(&a), self.ranges.get(&b)) {
            (Some(ra), Some(rb)) => ra.overlaps(rb),
            _ => true,
        }
    }

    /// Find the position of the last entry of `stream_id` with a timestamp at or before `ts`. If
    /// `keyframe` is true, only keyframes are considered.
    ///
    /// If every candidate is after `ts`, the first candidate is returned. Returns `None` if the
    /// stream has no candidates at all.
    pub fn seek_keyframe(&self, stream_id: u32, ts: Timestamp, keyframe: bool) -> Option<usize> {
        let range = self.ranges.get(&stream_id)?;

        let mut first = None;
        let mut found = None;

        for (pos, entry) in self.entries[range.first..=range.last].iter().enumerate() {
            if entry.stream_id != stream_id || (keyframe && !entry.keyframe) {
                continue;
            }

            let pos = range.first + pos;

            if first.is_none() {
                first = Some(pos);
            }

            if entry.pts > ts {
                break;
            }

            found = Some(pos);
        }

        found.or(first)
    }
}
