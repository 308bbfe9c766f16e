//! Stream caches
//!
//! A stream cache is a sequential, position-addressable byte store that
//! records every byte a cached stream pulls from its source, so those bytes
//! can be read again after a backward seek.

pub mod memory;
pub mod file;

pub use memory::MemoryCache;
pub use file::FileCache;

use crate::error::Result;

/// Contract for the byte store behind a cached seekable stream
///
/// The cache has a single read/write cursor. Writes land at the cursor and
/// extend the written extent when they go past it. `flush` lets an
/// implementation drop data it will no longer be asked for.
pub trait StreamCache {
    /// Whether this cache keeps its data in memory
    const MEMORY_BACKED: bool;

    /// Whether this cache keeps its data in a file
    const FILE_BACKED: bool;

    /// Writes a single byte at the cursor and advances it by one
    fn write_byte(&mut self, byte: u8) -> Result<()>;

    /// Writes all of `buf` at the cursor and advances it by `buf.len()`
    ///
    /// This implementation calls [`write_byte`](Self::write_byte) once per
    /// byte. Caches backed by bulk I/O should override it.
    fn write(&mut self, buf: &[u8]) -> Result<()> {
        for &byte in buf {
            self.write_byte(byte)?;
        }
        Ok(())
    }

    /// Reads the byte at the cursor and advances it by one
    ///
    /// Returns `None` when the cursor is at or beyond the written extent.
    fn read_byte(&mut self) -> Result<Option<u8>>;

    /// Fills up to `buf.len()` bytes from the cursor
    ///
    /// Returns the number of bytes read; zero for a non-empty buffer means
    /// there is no more data. This implementation calls
    /// [`read_byte`](Self::read_byte) until the buffer is full or data runs out.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut count = 0;
        for slot in buf.iter_mut() {
            match self.read_byte()? {
                Some(byte) => {
                    *slot = byte;
                    count += 1;
                }
                None => break,
            }
        }
        Ok(count)
    }

    /// Moves the cursor to `position`
    ///
    /// Fails with [`Error::OutOfRange`](crate::Error::OutOfRange) when
    /// `position` is beyond the written extent.
    fn seek(&mut self, position: u64) -> Result<()>;

    /// Discards any retained data strictly before `position`
    ///
    /// Operating before a flushed position afterwards fails with
    /// [`Error::Flushed`](crate::Error::Flushed) in the caches of this crate.
    /// This implementation does nothing.
    fn flush(&mut self, _position: u64) {}

    /// Current cursor position
    fn position(&self) -> u64;

    /// Written extent, one past the furthest byte ever written
    fn len(&self) -> u64;

    /// Whether nothing has been written yet
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
