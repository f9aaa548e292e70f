// Polyplex
// Copyright (c) 2024-2026 The Project Polyplex Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::cmp;
use std::io;
use std::io::{Read, Seek, SeekFrom};

use super::{MediaSource, ReadBytes};

const END_OF_STREAM_ERROR_STR: &str = "end of stream";
const FORWARD_ONLY_ERROR_STR: &str = "source can only be seeked forward";

/// Buffering options of a `MediaSourceStream`.
#[derive(Copy, Clone, Debug)]
pub struct MediaSourceStreamOptions {
    /// The size of the read-ahead buffer. A power of two larger than 32 KiB.
    pub buffer_len: usize,
}

impl Default for MediaSourceStreamOptions {
    fn default() -> Self {
        MediaSourceStreamOptions { buffer_len: 64 * 1024 }
    }
}

/// A `MediaSourceStream` is the byte source every format driver and the demuxing engine read
/// from. It wraps and hides the inner source behind dynamic dispatch so any typical reader can be
/// used, selectable at runtime.
///
/// To amortize the cost of system calls over many bytes, `MediaSourceStream` reads ahead into a
/// buffer. The read-ahead length starts at 1kB and doubles with every sequential refill until it
/// reaches 32kB, which keeps the excess data buffered on consecutive seeks small.
///
/// A source that cannot seek can still be "seeked" forwards: the bytes in between are read and
/// discarded. Seeking backwards on such a source fails unless the target is still buffered.
pub struct MediaSourceStream {
    inner: Box<dyn MediaSource>,
    /// The read-ahead buffer.
    buf: Box<[u8]>,
    /// The read position within the buffer.
    read_pos: usize,
    /// The number of valid bytes in the buffer.
    end_pos: usize,
    /// The number of bytes requested from the source by the next fetch.
    read_block_len: usize,
    /// Absolute position of the inner source, i.e., the position of `buf[end_pos]`.
    abs_pos: u64,
    /// Cached seekability of the inner source.
    seekable: bool,
    /// Cached length of the inner source.
    byte_len: Option<u64>,
}

impl MediaSourceStream {
    const MIN_BLOCK_LEN: usize = 1 * 1024;
    const MAX_BLOCK_LEN: usize = 32 * 1024;

    pub fn new(source: Box<dyn MediaSource>, options: MediaSourceStreamOptions) -> Self {
        assert!(options.buffer_len.count_ones() == 1);
        assert!(options.buffer_len > Self::MAX_BLOCK_LEN);

        let seekable = source.is_seekable();
        let byte_len = source.byte_len();

        MediaSourceStream {
            inner: source,
            buf: vec![0; options.buffer_len].into_boxed_slice(),
            read_pos: 0,
            end_pos: 0,
            read_block_len: Self::MIN_BLOCK_LEN,
            abs_pos: 0,
            seekable,
            byte_len,
        }
    }

    /// Returns if the inner source is seekable.
    pub fn is_seekable(&self) -> bool {
        self.seekable
    }

    /// Returns the length of the inner source in bytes, if known.
    pub fn byte_len(&self) -> Option<u64> {
        self.byte_len
    }

    /// The number of buffered bytes not yet consumed.
    pub fn unread_buffer_len(&self) -> usize {
        self.end_pos - self.read_pos
    }

    /// Position the stream at the absolute byte offset `pos`, seeking only if required.
    ///
    /// Positions already buffered are reached without touching the inner source. Forward
    /// positions on an unseekable source are reached by discarding bytes.
    pub fn seek_to(&mut self, pos: u64) -> io::Result<u64> {
        let cur = self.pos();

        if pos == cur {
            return Ok(pos);
        }

        // The start of the buffered region in absolute terms.
        let buf_start = self.abs_pos - self.end_pos as u64;

        if pos >= buf_start && pos <= self.abs_pos {
            self.read_pos = (pos - buf_start) as usize;
            return Ok(pos);
        }

        if self.seekable {
            let pos = self.inner.seek(SeekFrom::Start(pos))?;
            self.reset(pos);
            Ok(pos)
        }
        else if pos > cur {
            self.ignore_bytes(pos - cur)?;
            Ok(pos)
        }
        else {
            Err(io::Error::new(io::ErrorKind::Unsupported, FORWARD_ONLY_ERROR_STR))
        }
    }

    /// Returns if the buffer has been exhausted.
    #[inline(always)]
    fn is_buffer_exhausted(&self) -> bool {
        self.read_pos == self.end_pos
    }

    /// Refill an exhausted buffer with the next block of the source.
    fn fetch(&mut self) -> io::Result<()> {
        if self.is_buffer_exhausted() {
            let len = cmp::min(self.read_block_len, self.buf.len());

            let count = loop {
                match self.inner.read(&mut self.buf[..len]) {
                    Ok(count) => break count,
                    Err(ref e) if e.kind() == io::ErrorKind::Interrupted => (),
                    Err(e) => return Err(e),
                }
            };

            self.read_pos = 0;
            self.end_pos = count;
            self.abs_pos += count as u64;

            // Sequential reads earn larger blocks.
            self.read_block_len = cmp::min(self.read_block_len << 1, Self::MAX_BLOCK_LEN);
        }

        Ok(())
    }

    /// Like `fetch`, but an exhausted source is an `UnexpectedEof` error.
    fn fetch_or_eof(&mut self) -> io::Result<()> {
        self.fetch()?;

        if self.is_buffer_exhausted() {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, END_OF_STREAM_ERROR_STR));
        }

        Ok(())
    }

    #[inline(always)]
    fn buffered(&self) -> &[u8] {
        &self.buf[self.read_pos..self.end_pos]
    }

    /// Discard the buffer. The next byte read is at `pos`.
    fn reset(&mut self, pos: u64) {
        self.read_pos = 0;
        self.end_pos = 0;
        self.read_block_len = Self::MIN_BLOCK_LEN;
        self.abs_pos = pos;
    }
}

impl io::Read for MediaSourceStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // Large reads with nothing buffered bypass the read-ahead buffer entirely.
        if self.is_buffer_exhausted() && buf.len() >= self.buf.len() {
            let count = self.inner.read(buf)?;
            self.reset(self.abs_pos + count as u64);
            return Ok(count);
        }

        self.fetch()?;

        let count = cmp::min(buf.len(), self.unread_buffer_len());
        buf[..count].copy_from_slice(&self.buffered()[..count]);
        self.read_pos += count;

        Ok(count)
    }
}

impl io::Seek for MediaSourceStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match pos {
            SeekFrom::Start(pos) => self.seek_to(pos),
            SeekFrom::Current(delta) => {
                let pos = self.pos().checked_add_signed(delta).ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidInput, "seek to a negative position")
                })?;
                self.seek_to(pos)
            }
            SeekFrom::End(_) => {
                let pos = self.inner.seek(pos)?;
                self.reset(pos);
                Ok(pos)
            }
        }
    }
}

impl ReadBytes for MediaSourceStream {
    #[inline(always)]
    fn read_byte(&mut self) -> io::Result<u8> {
        if self.is_buffer_exhausted() {
            self.fetch_or_eof()?;
        }

        let value = self.buf[self.read_pos];
        self.read_pos += 1;

        Ok(value)
    }

    fn read_double_bytes(&mut self) -> io::Result<[u8; 2]> {
        let mut bytes = [0; 2];
        self.read_buf_exact(&mut bytes)?;
        Ok(bytes)
    }

    fn read_quad_bytes(&mut self) -> io::Result<[u8; 4]> {
        let mut bytes = [0; 4];

        if self.unread_buffer_len() >= 4 {
            bytes.copy_from_slice(&self.buffered()[..4]);
            self.read_pos += 4;
        }
        else {
            self.read_buf_exact(&mut bytes)?;
        }

        Ok(bytes)
    }

    fn read_buf_exact(&mut self, mut buf: &mut [u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.read(buf) {
                Ok(0) => break,
                Ok(count) => {
                    buf = &mut buf[count..];
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }

        if !buf.is_empty() {
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, END_OF_STREAM_ERROR_STR))
        }
        else {
            Ok(())
        }
    }

    fn ignore_bytes(&mut self, mut count: u64) -> io::Result<()> {
        // Skip what is buffered first.
        let buffered = cmp::min(self.unread_buffer_len() as u64, count);
        self.read_pos += buffered as usize;
        count -= buffered;

        if count == 0 {
            return Ok(());
        }

        if self.seekable {
            let pos = self.inner.seek(SeekFrom::Current(count as i64))?;
            self.reset(pos);
            return Ok(());
        }

        while count > 0 {
            self.fetch_or_eof()?;
            let discard = cmp::min(self.unread_buffer_len() as u64, count);
            self.read_pos += discard as usize;
            count -= discard;
        }

        Ok(())
    }

    fn pos(&self) -> u64 {
        self.abs_pos - self.unread_buffer_len() as u64
    }
}
