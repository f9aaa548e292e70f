// Polyplex
// Copyright (c) 2024-2026 The Project Polyplex Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `packet` module defines the compressed packet structure.

use std::io;

use bitflags::bitflags;

use crate::io::ReadBytes;
use crate::units::{Duration, Timestamp};

bitflags! {
    /// Flags describing a packet.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
    pub struct PacketFlags: u32 {
        /// The packet can be decoded without reference to any other packet.
        const KEYFRAME  = 1 << 0;
        /// The packet is a forward predicted (P) frame.
        const P_FRAME   = 1 << 1;
        /// The packet is a bidirectionally predicted (B) frame.
        const B_FRAME   = 1 << 2;
        /// The packet is the last packet of its stream.
        const LAST      = 1 << 3;
        /// The packet carries extension data after the payload.
        const EXTENSION = 1 << 4;
        /// The packet must be decoded, but its output must not be presented. Set on packets
        /// preceding the target of a seek.
        const NO_OUTPUT = 1 << 5;
    }
}

/// How the two fields of a video frame are laid out.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum InterlaceMode {
    /// Unknown or not applicable.
    #[default]
    Unknown,
    /// Progressive frame.
    None,
    /// Interlaced frame, top field first.
    TopFirst,
    /// Interlaced frame, bottom field first.
    BottomFirst,
}

/// A SMPTE-style timecode, packed as frames since midnight plus a drop-frame marker.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Timecode {
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub frames: u8,
    pub drop_frame: bool,
}

/// A `Packet` contains one compressed, independently timestamped unit of a single elementary
/// stream.
///
/// # Buffer reuse
///
/// A packet owns a growable byte buffer whose capacity may exceed the payload length. Packets are
/// meant to be allocated once per logical slot and refilled many times: [`Packet::reset`] clears
/// the payload and all scalar fields but keeps the allocation, and [`Packet::alloc`] only ever
/// grows it. [`Packet::free`] releases the allocation at stream teardown.
///
/// # Timing
///
/// `pts` and `duration` are expressed in the stream's own time base. They are `None` until the
/// producer sets them.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Packet {
    /// The ID of the stream the packet belongs to.
    pub stream_id: u32,
    /// The payload.
    data: Vec<u8>,
    /// Packet flags.
    pub flags: PacketFlags,
    /// The presentation timestamp in the stream's time base.
    pub pts: Option<Timestamp>,
    /// The duration in the stream's time base.
    pub duration: Option<Duration>,
    /// The number of audio samples (or frames) carried, if known.
    pub samples: Option<u32>,
    /// Byte offset of the second field for packets carrying two interlaced fields.
    pub field2_offset: Option<u32>,
    /// Size of a repeated sequence header at the start of the payload.
    pub header_size: Option<u32>,
    /// Timecode, if the container carries one.
    pub timecode: Option<Timecode>,
    /// Interlace mode of the coded frame.
    pub interlace: InterlaceMode,
    /// Byte offset of the packet in the source, if known.
    pub position: Option<u64>,
}

impl Packet {
    /// Create an empty packet. No allocation is performed.
    pub fn new() -> Self {
        Default::default()
    }

    /// Create a packet holding a copy of `data`.
    pub fn with_data(stream_id: u32, pts: Timestamp, duration: Duration, data: &[u8]) -> Self {
        Packet {
            stream_id,
            data: data.to_vec(),
            pts: Some(pts),
            duration: Some(duration),
            ..Default::default()
        }
    }

    /// Ensure the buffer can hold at least `min_len` bytes. The buffer only ever grows and the
    /// existing payload is preserved.
    pub fn alloc(&mut self, min_len: usize) {
        if min_len > self.data.capacity() {
            self.data.reserve(min_len - self.data.len());
        }
    }

    /// Clear the payload, flags and timestamps. The allocation is kept.
    pub fn reset(&mut self) {
        let data = std::mem::take(&mut self.data);
        *self = Packet { data, ..Default::default() };
        self.data.clear();
    }

    /// Reset the packet and release its buffer.
    pub fn free(&mut self) {
        *self = Packet::new();
    }

    /// Deep copy `src` into this packet, reusing this packet's allocation where possible.
    pub fn copy_from(&mut self, src: &Packet) {
        self.clone_from(src);
    }

    /// The payload length.
    #[inline]
    pub fn data_len(&self) -> usize {
        self.data.len()
    }

    /// The allocated capacity of the payload buffer. Always `>= data_len()`.
    #[inline]
    pub fn data_alloc(&self) -> usize {
        self.data.capacity()
    }

    /// Get an immutable slice of the payload.
    #[inline]
    pub fn buf(&self) -> &[u8] {
        &self.data
    }

    /// Get a mutable reference to the payload buffer.
    #[inline]
    pub fn buf_mut(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }

    /// Replace the payload with `len` bytes read from `reader`.
    ///
    /// On failure the payload is left empty.
    pub fn read_from<R: ReadBytes>(&mut self, reader: &mut R, len: usize) -> io::Result<()> {
        self.alloc(len);
        self.data.resize(len, 0);

        if let Err(err) = reader.read_buf_exact(&mut self.data) {
            self.data.clear();
            return Err(err);
        }

        Ok(())
    }

    /// Returns true if the packet is a keyframe.
    #[inline]
    pub fn is_keyframe(&self) -> bool {
        self.flags.contains(PacketFlags::KEYFRAME)
    }

    /// The presentation end time (`pts + duration`), if both are known.
    pub fn end_pts(&self) -> Option<Timestamp> {
        Some(self.pts?.saturating_add(self.duration?))
    }
}
