//! Temporary-file stream cache

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::debug;

use crate::cache::StreamCache;
use crate::error::{Error, Result};

/// Stream cache keeping its data in an anonymous temporary file
///
/// The file is unlinked on creation, so the operating system reclaims it
/// when the cache is dropped, even if the process dies. Flushing only
/// records the flushed position; disk space is not returned early.
///
/// A failed read or write may leave the file cursor anywhere inside the
/// transfer. The cache then seeks back to its own position before touching
/// the file again.
pub struct FileCache {
    file: File,
    position: u64,
    length: u64,
    flushed: u64,
    cursor_lost: bool,
}

impl FileCache {
    /// Creates a cache file in the system temporary directory
    pub fn new() -> Result<Self> {
        Ok(Self::from_file(tempfile::tempfile()?))
    }

    /// Creates a cache file inside `dir`
    pub fn new_in<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        debug!(dir = %dir.display(), "creating file cache");
        Ok(Self::from_file(tempfile::tempfile_in(dir)?))
    }

    fn from_file(file: File) -> Self {
        Self {
            file,
            position: 0,
            length: 0,
            flushed: 0,
            cursor_lost: false,
        }
    }

    /// Position before which data may no longer be accessed
    pub fn flushed_position(&self) -> u64 {
        self.flushed
    }

    fn check_flushed(&self, position: u64) -> Result<()> {
        if position < self.flushed {
            return Err(Error::Flushed { position, flushed: self.flushed });
        }
        Ok(())
    }

    fn restore_cursor(&mut self) -> Result<()> {
        if self.cursor_lost {
            debug!(position = self.position, "restoring file cache cursor");
            self.file.seek(SeekFrom::Start(self.position))?;
            self.cursor_lost = false;
        }
        Ok(())
    }

    fn track<T>(&mut self, result: std::io::Result<T>) -> Result<T> {
        if result.is_err() {
            self.cursor_lost = true;
        }
        Ok(result?)
    }
}

impl StreamCache for FileCache {
    const MEMORY_BACKED: bool = false;
    const FILE_BACKED: bool = true;

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.write(&[byte])
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.check_flushed(self.position)?;
        self.restore_cursor()?;
        let written = self.file.write_all(buf);
        self.track(written)?;
        self.position += buf.len() as u64;
        self.length = self.length.max(self.position);
        Ok(())
    }

    fn read_byte(&mut self) -> Result<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.read(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || self.position >= self.length {
            return Ok(0);
        }
        self.check_flushed(self.position)?;

        self.restore_cursor()?;

        let n = ((self.length - self.position) as usize).min(buf.len());
        let read = self.file.read_exact(&mut buf[..n]);
        self.track(read)?;
        self.position += n as u64;
        Ok(n)
    }

    fn seek(&mut self, position: u64) -> Result<()> {
        if position > self.length {
            return Err(Error::OutOfRange { position, extent: self.length });
        }
        self.check_flushed(position)?;
        let sought = self.file.seek(SeekFrom::Start(position));
        self.track(sought)?;
        self.position = position;
        self.cursor_lost = false;
        Ok(())
    }

    fn flush(&mut self, position: u64) {
        self.flushed = self.flushed.max(position.min(self.length));
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn len(&self) -> u64 {
        self.length
    }
}
