// Polyplex
// Copyright (c) 2024-2026 The Project Polyplex Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

//! # Project Polyplex
//!
//! Polyplex is a pure Rust media demultiplexing framework. It splits a container file into the
//! compressed units of its elementary streams and hands them out in a presentation-ordered
//! interleaving, regardless of how the container stores them.
//!
//! # Support
//!
//! | Format   | Feature Flag | Default |
//! |----------|--------------|---------|
//! | AVI      | `avi`        | Yes     |
//! | Wave     | `wav`        | Yes     |
//!
//! # Usage
//!
//! 1.  Make sure the [`MediaSource`][core::io::MediaSource] trait is implemented for whatever
//!     source you are using. This trait is already implemented for `std::fs::File` and
//!     `std::io::Cursor`.
//! 2.  Call [`open`] with the source. The container format is detected from the first bytes of
//!     the source, and a [`Demuxer`][core::demux::Demuxer] driving the matching format driver is
//!     returned.
//! 3.  Examine the streams using [`streams`][core::demux::Demuxer::streams] and mute the ones
//!     that are not of interest with [`select`][core::demux::Demuxer::select].
//! 4.  Either pull packets per stream with [`get_packet`][core::demux::Demuxer::get_packet], or
//!     register a [`StreamProcessor`][core::sync::StreamProcessor] per stream on a
//!     [`Connector`][core::sync::Connector] and let it decide which stream to advance next.
//! 5.  Use [`seek`][core::demux::Demuxer::seek] to restart playback at any time.
//!
//! # Adding support for new formats
//!
//! Implement the [`FormatDriver`][core::formats::FormatDriver] trait and drive it with a
//! `Demuxer` directly, or add a variant to [`default::AnyDriver`].

#[cfg(not(any(feature = "avi", feature = "wav")))]
compile_error!("at least one container format feature must be enabled");

pub mod default {
    //! The `default` module selects a format driver among every enabled format.

    pub mod formats {
        //! The `formats` module re-exports all enabled Polyplex format drivers.

        #[cfg(feature = "avi")]
        pub use polyplex_format_riff::AviDriver;
        #[cfg(feature = "wav")]
        pub use polyplex_format_riff::WavDriver;
    }

    mod any;

    pub use any::AnyDriver;
}

pub use default::AnyDriver;
pub use polyplex_core as core;

use polyplex_core::demux::{Demuxer, DemuxerOptions};
use polyplex_core::errors::Result;
use polyplex_core::formats::FormatOptions;
use polyplex_core::io::{MediaSource, MediaSourceStream};

/// Detect the container format of `source` and open a demuxer over it.
pub fn open(
    source: Box<dyn MediaSource>,
    format_opts: &FormatOptions,
    demux_opts: &DemuxerOptions,
) -> Result<Demuxer<AnyDriver>> {
    let mss = MediaSourceStream::new(source, Default::default());
    Demuxer::open(mss, format_opts, demux_opts)
}

#[cfg(all(test, feature = "wav"))]
mod tests {
    use std::io::Cursor;

    use polyplex_core::errors::Error;

    use super::*;

    fn wav(frames: u32) -> Vec<u8> {
        let data_len = 2 * frames;

        let mut buf = b"RIFF".to_vec();
        buf.extend((36 + data_len).to_le_bytes());
        buf.extend(b"WAVEfmt ");
        buf.extend(16u32.to_le_bytes());
        // PCM, mono, 8 kHz, 16 kB/s, 2 byte frames, 16-bit.
        buf.extend(1u16.to_le_bytes());
        buf.extend(1u16.to_le_bytes());
        buf.extend(8000u32.to_le_bytes());
        buf.extend(16_000u32.to_le_bytes());
        buf.extend(2u16.to_le_bytes());
        buf.extend(16u16.to_le_bytes());
        buf.extend(b"data");
        buf.extend(data_len.to_le_bytes());
        buf.resize(buf.len() + data_len as usize, 0);
        buf
    }

    #[test]
    fn verify_open_detects_format() {
        let source = Box::new(Cursor::new(wav(100)));
        let demux = open(source, &Default::default(), &Default::default()).unwrap();

        assert_eq!(demux.format_info().short_name, "wave");
        assert_eq!(demux.streams().len(), 1);
    }

    #[test]
    fn verify_unknown_format() {
        for bytes in [b"this is not a media file".to_vec(), b"RIFF".to_vec()] {
            let res = open(Box::new(Cursor::new(bytes)), &Default::default(), &Default::default());

            match res {
                Err(Error::Unsupported(msg)) => assert_eq!(msg, "no suitable format driver found"),
                _ => panic!("expected an unsupported error"),
            }
        }
    }
}
