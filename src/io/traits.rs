//! Core I/O traits

use std::io::{self, Read, Seek};

/// Trait for readers that support both reading and seeking operations
///
/// This trait combines [`Read`] and [`Seek`] so that a cached stream can be
/// handed to consumers that need random access without naming its concrete
/// source and cache types. It is automatically implemented for any type
/// that implements both traits.
pub trait SeekableReader: Read + Seek {}

impl<T: Read + Seek> SeekableReader for T {}

/// A forward-only byte source
///
/// The source is never rewound or seeked. `read` follows the [`Read`]
/// contract: `Ok(0)` for a non-empty buffer means the source is exhausted,
/// and `ErrorKind::Interrupted` means no progress was made this time. A
/// count larger than `buf.len()` is rejected as `InvalidData`.
pub trait ByteSource {
    /// Reads up to `buf.len()` bytes, returning the count obtained
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Reads a single byte, `None` at end of data
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.read(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    /// Estimate of bytes readable without blocking
    fn available(&self) -> u64 {
        0
    }

    /// Releases the source
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        (**self).read_byte()
    }

    fn available(&self) -> u64 {
        (**self).available()
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

/// Adapts any [`Read`] into a [`ByteSource`]
///
/// A length hint, when known (e.g. from a `Content-Length` header), feeds
/// [`ByteSource::available`]; otherwise the estimate is zero.
pub struct ReadSource<R: Read> {
    inner: Option<R>,
    remaining_hint: Option<u64>,
}

impl<R: Read> ReadSource<R> {
    /// Wraps a reader with no length hint
    pub fn new(inner: R) -> Self {
        Self {
            inner: Some(inner),
            remaining_hint: None,
        }
    }

    /// Wraps a reader whose total length is known in advance
    pub fn with_length_hint(inner: R, length: u64) -> Self {
        Self {
            inner: Some(inner),
            remaining_hint: Some(length),
        }
    }

    /// Returns a reference to the underlying reader, `None` once closed
    pub fn get_ref(&self) -> Option<&R> {
        self.inner.as_ref()
    }
}

impl<R: Read> ByteSource for ReadSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let inner = self
            .inner
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "source closed"))?;
        let n = inner.read(buf)?;
        if let Some(remaining) = self.remaining_hint.as_mut() {
            *remaining = remaining.saturating_sub(n as u64);
        }
        Ok(n)
    }

    fn available(&self) -> u64 {
        self.remaining_hint.unwrap_or(0)
    }

    fn close(&mut self) -> io::Result<()> {
        self.inner = None;
        self.remaining_hint = None;
        Ok(())
    }
}
