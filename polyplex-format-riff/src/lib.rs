// Polyplex
// Copyright (c) 2024-2026 The Project Polyplex Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! RIFF container drivers: Audio Video Interleave (AVI) and Waveform Audio (WAVE).

mod common;

#[cfg(feature = "avi")]
mod avi;
#[cfg(feature = "wav")]
mod wave;

#[cfg(test)]
mod testing;

#[cfg(feature = "avi")]
pub use avi::AviDriver;
#[cfg(feature = "wav")]
pub use wave::WavDriver;
