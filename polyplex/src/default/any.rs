// Polyplex
// Copyright (c) 2024-2026 The Project Polyplex Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io;

use polyplex_core::errors::{unsupported_error, Result};
use polyplex_core::formats::prelude::*;
use polyplex_core::io::{MediaSourceStream, ReadBytes};
use polyplex_core::packet::Packet;

use log::debug;

#[cfg(feature = "avi")]
use super::formats::AviDriver;
#[cfg(feature = "wav")]
use super::formats::WavDriver;

/// The number of bytes every format driver may inspect to recognize its format.
const PROBE_HEADER_LEN: usize = 12;

/// `AnyDriver` is a format driver for every enabled container format. The format is chosen once,
/// when the driver is opened.
pub enum AnyDriver {
    #[cfg(feature = "avi")]
    Avi(AviDriver),
    #[cfg(feature = "wav")]
    Wav(WavDriver),
}

macro_rules! dispatch {
    ($driver:expr, $inner:ident => $body:expr) => {
        match $driver {
            #[cfg(feature = "avi")]
            AnyDriver::Avi($inner) => $body,
            #[cfg(feature = "wav")]
            AnyDriver::Wav($inner) => $body,
        }
    };
}

impl AnyDriver {
    /// Read the probe header of `src`, rewind, and open the first driver accepting the header.
    pub fn probe_open(src: &mut MediaSourceStream, options: &FormatOptions) -> Result<AnyDriver> {
        let start = src.pos();

        let mut header = [0u8; PROBE_HEADER_LEN];

        match src.read_buf_exact(&mut header) {
            Ok(_) => (),
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                return unsupported_error("no suitable format driver found");
            }
            Err(err) => return Err(err.into()),
        }

        src.seek_to(start)?;

        #[cfg(feature = "avi")]
        if AviDriver::probe(&header) {
            debug!("probe: selected the avi driver");
            return Ok(AnyDriver::Avi(AviDriver::open(src, options)?));
        }

        #[cfg(feature = "wav")]
        if WavDriver::probe(&header) {
            debug!("probe: selected the wave driver");
            return Ok(AnyDriver::Wav(WavDriver::open(src, options)?));
        }

        unsupported_error("no suitable format driver found")
    }
}

impl FormatDriver for AnyDriver {
    fn probe(header: &[u8]) -> bool {
        #[cfg(feature = "avi")]
        if AviDriver::probe(header) {
            return true;
        }

        #[cfg(feature = "wav")]
        if WavDriver::probe(header) {
            return true;
        }

        false
    }

    fn open(src: &mut MediaSourceStream, options: &FormatOptions) -> Result<Self> {
        AnyDriver::probe_open(src, options)
    }

    fn format_info(&self) -> &FormatInfo {
        dispatch!(self, driver => driver.format_info())
    }

    fn streams(&self) -> &[StreamInfo] {
        dispatch!(self, driver => driver.streams())
    }

    fn take_superindex(&mut self) -> Option<Superindex> {
        dispatch!(self, driver => driver.take_superindex())
    }

    fn caps(&self) -> DriverCaps {
        dispatch!(self, driver => driver.caps())
    }

    fn next_unit(&mut self, src: &mut MediaSourceStream, pkt: &mut Packet) -> Result<bool> {
        dispatch!(self, driver => driver.next_unit(src, pkt))
    }

    fn drain(&mut self, pkt: &mut Packet) -> bool {
        dispatch!(self, driver => driver.drain(pkt))
    }

    fn seek(&mut self, src: &mut MediaSourceStream, time: Time) -> Result<Time> {
        dispatch!(self, driver => driver.seek(src, time))
    }

    fn close(&mut self) {
        dispatch!(self, driver => driver.close())
    }
}
