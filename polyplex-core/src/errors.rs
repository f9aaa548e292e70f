// Polyplex
// Copyright (c) 2024-2026 The Project Polyplex Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `errors` module defines the common error type.

use std::error;
use std::fmt;
use std::io;
use std::result;

/// Why a seek failed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SeekErrorKind {
    /// The source or the format driver is not seekable at all.
    Unseekable,
    /// The source can only be seeked forward.
    ForwardOnly,
    /// The time to seek to is out of range.
    OutOfRange,
    /// The stream ID provided is invalid.
    InvalidStream,
    /// The container is not interleaved and therefore requires random access, but the source
    /// cannot seek.
    NonInterleavedUnseekable,
}

impl SeekErrorKind {
    fn as_str(&self) -> &'static str {
        match *self {
            SeekErrorKind::Unseekable => "source is not seekable",
            SeekErrorKind::ForwardOnly => "source can only be seeked forward",
            SeekErrorKind::OutOfRange => "requested seek time is out-of-range",
            SeekErrorKind::InvalidStream => "invalid stream id",
            SeekErrorKind::NonInterleavedUnseekable => {
                "non-interleaved container requires a seekable source"
            }
        }
    }
}

/// `Error` provides an enumeration of all possible errors reported by Polyplex.
#[derive(Debug)]
pub enum Error {
    /// An IO error occured while reading or seeking the source.
    IoError(io::Error),
    /// The container contained malformed data and could not be demuxed.
    DecodeError(&'static str),
    /// The source could not be seeked.
    SeekError(SeekErrorKind),
    /// The container uses a feature that is not supported.
    Unsupported(&'static str),
    /// A default or user-defined limit was reached while demuxing. Limits are used to prevent
    /// malicious containers from requesting unbounded allocations.
    LimitError(&'static str),
    /// A stream failed an open-time consistency check.
    StreamError {
        /// The stream that failed the check.
        stream_id: u32,
        /// What was wrong with it.
        reason: &'static str,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::IoError(ref err) => err.fmt(f),
            Error::DecodeError(msg) => {
                write!(f, "malformed container: {}", msg)
            }
            Error::SeekError(ref kind) => {
                write!(f, "seek error: {}", kind.as_str())
            }
            Error::Unsupported(feature) => {
                write!(f, "unsupported feature: {}", feature)
            }
            Error::LimitError(constraint) => {
                write!(f, "limit reached: {}", constraint)
            }
            Error::StreamError { stream_id, reason } => {
                write!(f, "stream {}: {}", stream_id, reason)
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::IoError(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}

impl Error {
    /// Returns true if the error signals the end of the source rather than a failure.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Error::IoError(err) if err.kind() == io::ErrorKind::UnexpectedEof)
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Fail with a malformed container error.
pub fn decode_error<T>(desc: &'static str) -> Result<T> {
    Err(Error::DecodeError(desc))
}

/// Fail a seek.
pub fn seek_error<T>(kind: SeekErrorKind) -> Result<T> {
    Err(Error::SeekError(kind))
}

/// Fail on a container feature that is not implemented.
pub fn unsupported_error<T>(feature: &'static str) -> Result<T> {
    Err(Error::Unsupported(feature))
}

/// Fail because a resource limit was hit.
pub fn limit_error<T>(constraint: &'static str) -> Result<T> {
    Err(Error::LimitError(constraint))
}

/// Convenience function to create a stream error.
pub fn stream_error<T>(stream_id: u32, reason: &'static str) -> Result<T> {
    Err(Error::StreamError { stream_id, reason })
}

/// Fail with the I/O error reported at the end of the source.
pub fn end_of_stream_error<T>() -> Result<T> {
    Err(Error::IoError(io::Error::new(io::ErrorKind::UnexpectedEof, "end of stream")))
}
