// Polyplex
// Copyright (c) 2024-2026 The Project Polyplex Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `io` module implements the byte source the demuxing engine reads from.
//!
//! Any source implementing [`MediaSource`] (aka. [`std::io::Read`] + [`std::io::Seek`]) may be
//! wrapped in a [`MediaSourceStream`], which provides buffering, forward-only seek emulation, and
//! the [`ReadBytes`] trait used by format drivers to parse container headers.

use std::io;

mod media_source_stream;

pub use media_source_stream::{MediaSourceStream, MediaSourceStreamOptions};

/// A byte source a [`MediaSourceStream`] can read from.
///
/// Every source must implement [`std::io::Seek`], but only sources reporting
/// [`MediaSource::is_seekable`] are ever seeked.
pub trait MediaSource: io::Read + io::Seek + Send + Sync {
    /// Returns true if the source supports random access.
    fn is_seekable(&self) -> bool;

    /// The total length of the source in bytes, if known.
    fn byte_len(&self) -> Option<u64>;
}

impl MediaSource for std::fs::File {
    /// Pipes, sockets and devices are not seekable even though `File` implements `Seek`.
    fn is_seekable(&self) -> bool {
        self.metadata().map_or(false, |meta| meta.is_file())
    }

    fn byte_len(&self) -> Option<u64> {
        self.metadata().ok().map(|meta| meta.len())
    }
}

impl<T: AsRef<[u8]> + Send + Sync> MediaSource for io::Cursor<T> {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        Some(self.get_ref().as_ref().len() as u64)
    }
}

/// Wraps a plain reader, such as standard input, as a forward-only [`MediaSource`].
pub struct ReadOnlySource<R: io::Read> {
    inner: R,
}

impl<R: io::Read + Send> ReadOnlySource<R> {
    pub fn new(inner: R) -> Self {
        ReadOnlySource { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: io::Read + Send + Sync> MediaSource for ReadOnlySource<R> {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}

impl<R: io::Read> io::Read for ReadOnlySource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: io::Read> io::Seek for ReadOnlySource<R> {
    fn seek(&mut self, _: io::SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "source does not support seeking"))
    }
}

/// Byte-level reads used to parse container structures. Multi-byte integers are little-endian
/// unless the method name says otherwise.
pub trait ReadBytes {
    fn read_byte(&mut self) -> io::Result<u8>;

    /// Two bytes in stream order.
    fn read_double_bytes(&mut self) -> io::Result<[u8; 2]>;

    /// Four bytes in stream order, e.g. a four character code.
    fn read_quad_bytes(&mut self) -> io::Result<[u8; 4]>;

    /// Fill `buf` completely, failing with `UnexpectedEof` if the stream ends first.
    fn read_buf_exact(&mut self, buf: &mut [u8]) -> io::Result<()>;

    /// Skip `count` bytes.
    fn ignore_bytes(&mut self, count: u64) -> io::Result<()>;

    /// The absolute position of the next byte to be read.
    fn pos(&self) -> u64;

    #[inline(always)]
    fn read_u8(&mut self) -> io::Result<u8> {
        self.read_byte()
    }

    #[inline(always)]
    fn read_u16(&mut self) -> io::Result<u16> {
        self.read_double_bytes().map(u16::from_le_bytes)
    }

    #[inline(always)]
    fn read_u32(&mut self) -> io::Result<u32> {
        self.read_quad_bytes().map(u32::from_le_bytes)
    }

    #[inline(always)]
    fn read_i32(&mut self) -> io::Result<i32> {
        self.read_quad_bytes().map(i32::from_le_bytes)
    }

    #[inline(always)]
    fn read_be_u32(&mut self) -> io::Result<u32> {
        self.read_quad_bytes().map(u32::from_be_bytes)
    }

    /// Read `len` bytes into a new allocation.
    fn read_boxed_slice_exact(&mut self, len: usize) -> io::Result<Box<[u8]>> {
        let mut data = vec![0; len].into_boxed_slice();
        self.read_buf_exact(&mut data)?;
        Ok(data)
    }
}

impl<R: ReadBytes> ReadBytes for &mut R {
    #[inline(always)]
    fn read_byte(&mut self) -> io::Result<u8> {
        (*self).read_byte()
    }

    #[inline(always)]
    fn read_double_bytes(&mut self) -> io::Result<[u8; 2]> {
        (*self).read_double_bytes()
    }

    #[inline(always)]
    fn read_quad_bytes(&mut self) -> io::Result<[u8; 4]> {
        (*self).read_quad_bytes()
    }

    #[inline(always)]
    fn read_buf_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        (*self).read_buf_exact(buf)
    }

    #[inline(always)]
    fn ignore_bytes(&mut self, count: u64) -> io::Result<()> {
        (*self).ignore_bytes(count)
    }

    #[inline(always)]
    fn pos(&self) -> u64 {
        (**self).pos()
    }
}

/// A `BufReader` reads bytes from a byte buffer, e.g. a chunk body already read into memory.
pub struct BufReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> BufReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        BufReader { buf, pos: 0 }
    }

    fn bytes_available(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn underrun() -> io::Error {
        io::Error::new(io::ErrorKind::UnexpectedEof, "buffer underrun")
    }
}

impl ReadBytes for BufReader<'_> {
    fn read_byte(&mut self) -> io::Result<u8> {
        let byte = *self.buf.get(self.pos).ok_or_else(Self::underrun)?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_double_bytes(&mut self) -> io::Result<[u8; 2]> {
        let mut pair = [0; 2];
        self.read_buf_exact(&mut pair)?;
        Ok(pair)
    }

    fn read_quad_bytes(&mut self) -> io::Result<[u8; 4]> {
        let mut quad = [0; 4];
        self.read_buf_exact(&mut quad)?;
        Ok(quad)
    }

    fn read_buf_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        if self.bytes_available() < buf.len() {
            return Err(Self::underrun());
        }

        buf.copy_from_slice(&self.buf[self.pos..self.pos + buf.len()]);
        self.pos += buf.len();
        Ok(())
    }

    fn ignore_bytes(&mut self, count: u64) -> io::Result<()> {
        if (self.bytes_available() as u64) < count {
            return Err(Self::underrun());
        }

        self.pos += count as usize;
        Ok(())
    }

    fn pos(&self) -> u64 {
        self.pos as u64
    }
}
