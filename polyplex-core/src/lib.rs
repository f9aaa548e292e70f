// Polyplex
// Copyright (c) 2024-2026 The Project Polyplex Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared structs, traits, and the demultiplexing engine of Project Polyplex.
//!
//! The crate is organised leaves first:
//!
//! * [`packet`] and [`codecs`] define the compressed unit of a stream and the static codec
//!   parameters of a stream.
//! * [`formats`] defines the [`FormatDriver`](formats::FormatDriver) interface implemented by
//!   container drivers, the stream descriptors, and the file-global
//!   [`Superindex`](formats::Superindex).
//! * [`demux`] walks a superindex (or calls a driver directly) to hand out one packet per call.
//! * [`sync`] decides which of several live streams is advanced next.
//! * [`seek`] converts a requested time into stream positions.

pub mod codecs;
pub mod demux;
pub mod errors;
pub mod formats;
pub mod io;
pub mod packet;
pub mod seek;
pub mod sync;
pub mod units;

#[cfg(test)]
mod testing;
