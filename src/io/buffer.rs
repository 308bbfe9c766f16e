//! Buffered reading over seekable readers
//!
//! Small reads against a file-backed cached stream each reach the cache
//! file; wrapping the stream in a [`BufferedReader`] batches them.

use std::io::{Read, Result, Seek, SeekFrom};

use crate::io::SeekableReader;

/// Default buffer size (8KB)
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// A buffered reader that wraps any [`SeekableReader`]
///
/// Seeking discards the buffer. Relative seeks account for the bytes
/// buffered but not yet consumed, so positions stay those of the caller.
pub struct BufferedReader<R: SeekableReader> {
    inner: R,
    buffer: Vec<u8>,
    pos: usize,
    cap: usize,
}

impl<R: SeekableReader> BufferedReader<R> {
    /// Creates a new buffered reader with default buffer size (8KB)
    pub fn new(inner: R) -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE, inner)
    }

    /// Creates a new buffered reader with specified buffer size
    pub fn with_capacity(capacity: usize, inner: R) -> Self {
        Self {
            inner,
            buffer: vec![0; capacity.max(1)],
            pos: 0,
            cap: 0,
        }
    }

    /// Returns a reference to the underlying reader
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Returns a mutable reference to the underlying reader
    ///
    /// Reading or seeking through it desynchronizes the buffer; call
    /// [`discard_buffer`](Self::discard_buffer) afterwards.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Consumes the buffered reader and returns the underlying reader
    ///
    /// Buffered but unread bytes are lost.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Returns the number of bytes currently buffered
    pub fn buffer_len(&self) -> usize {
        self.cap - self.pos
    }

    /// Drops any buffered bytes
    pub fn discard_buffer(&mut self) {
        self.pos = 0;
        self.cap = 0;
    }

    fn fill_buffer(&mut self) -> Result<()> {
        self.cap = self.inner.read(&mut self.buffer)?;
        self.pos = 0;
        Ok(())
    }

    /// Reads exactly `size` bytes
    ///
    /// Fails with `UnexpectedEof` if the reader ends first.
    pub fn read_chunk(&mut self, size: usize) -> Result<Vec<u8>> {
        let mut chunk = vec![0u8; size];
        self.read_exact(&mut chunk)?;
        Ok(chunk)
    }
}

impl<R: SeekableReader> Read for BufferedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.pos >= self.cap {
            if buf.len() >= self.buffer.len() {
                return self.inner.read(buf);
            }
            self.fill_buffer()?;
            if self.cap == 0 {
                return Ok(0);
            }
        }

        let to_read = self.buffer_len().min(buf.len());
        buf[..to_read].copy_from_slice(&self.buffer[self.pos..self.pos + to_read]);
        self.pos += to_read;
        Ok(to_read)
    }
}

impl<R: SeekableReader> Seek for BufferedReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let pos = match pos {
            SeekFrom::Current(offset) => {
                let buffered = self.buffer_len() as i64;
                SeekFrom::Current(offset - buffered)
            }
            other => other,
        };
        let result = self.inner.seek(pos)?;
        self.discard_buffer();
        Ok(result)
    }
}
