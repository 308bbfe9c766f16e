//! In-memory stream cache

use tracing::trace;

use crate::cache::StreamCache;
use crate::config::DEFAULT_BLOCK_SIZE;
use crate::error::{Error, Result};

/// Stream cache keeping its data in fixed-size heap blocks
///
/// Flushing releases every block lying entirely before the flushed
/// position, which bounds memory use for consumers that only ever seek
/// within a sliding window.
pub struct MemoryCache {
    blocks: Vec<Option<Box<[u8]>>>,
    block_size: usize,
    position: u64,
    length: u64,
    flushed: u64,
}

impl MemoryCache {
    /// Creates an empty cache with the default block size (2KB)
    pub fn new() -> Self {
        Self::with_block_size(DEFAULT_BLOCK_SIZE)
    }

    /// Creates an empty cache with the given block size
    ///
    /// A zero block size is treated as one.
    pub fn with_block_size(block_size: usize) -> Self {
        Self {
            blocks: Vec::new(),
            block_size: block_size.max(1),
            position: 0,
            length: 0,
            flushed: 0,
        }
    }

    /// Size of each storage block
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Position before which data has been discarded
    pub fn flushed_position(&self) -> u64 {
        self.flushed
    }

    /// Number of bytes currently held in memory
    pub fn retained_bytes(&self) -> usize {
        self.blocks.iter().flatten().count() * self.block_size
    }

    fn check_flushed(&self, position: u64) -> Result<()> {
        if position < self.flushed {
            return Err(Error::Flushed { position, flushed: self.flushed });
        }
        Ok(())
    }

    fn locate(&self, position: u64) -> (usize, usize) {
        let block_size = self.block_size as u64;
        ((position / block_size) as usize, (position % block_size) as usize)
    }

    fn block_mut(&mut self, index: usize) -> Result<&mut [u8]> {
        while self.blocks.len() <= index {
            self.blocks.push(Some(vec![0u8; self.block_size].into_boxed_slice()));
        }
        let flushed = self.flushed;
        let position = index as u64 * self.block_size as u64;
        self.blocks[index]
            .as_deref_mut()
            .ok_or(Error::Flushed { position, flushed })
    }

    fn block(&self, index: usize) -> Result<&[u8]> {
        let position = index as u64 * self.block_size as u64;
        self.blocks
            .get(index)
            .and_then(|block| block.as_deref())
            .ok_or(Error::Flushed { position, flushed: self.flushed })
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamCache for MemoryCache {
    const MEMORY_BACKED: bool = true;
    const FILE_BACKED: bool = false;

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.write(&[byte])
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.check_flushed(self.position)?;

        let mut written = 0;
        while written < buf.len() {
            let (index, offset) = self.locate(self.position);
            let block = self.block_mut(index)?;
            let n = (block.len() - offset).min(buf.len() - written);
            block[offset..offset + n].copy_from_slice(&buf[written..written + n]);

            written += n;
            self.position += n as u64;
        }
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

        let total = ((self.length - self.position) as usize).min(buf.len());
        let mut read = 0;
        while read < total {
            let (index, offset) = self.locate(self.position);
            let block = self.block(index)?;
            let n = (block.len() - offset).min(total - read);
            buf[read..read + n].copy_from_slice(&block[offset..offset + n]);

            read += n;
            self.position += n as u64;
        }
        Ok(read)
    }

    fn seek(&mut self, position: u64) -> Result<()> {
        if position > self.length {
            return Err(Error::OutOfRange { position, extent: self.length });
        }
        self.check_flushed(position)?;
        self.position = position;
        Ok(())
    }

    fn flush(&mut self, position: u64) {
        let position = position.min(self.length);
        if position <= self.flushed {
            return;
        }
        self.flushed = position;

        let (whole_blocks, _) = self.locate(position);
        let mut released = 0;
        for block in self.blocks.iter_mut().take(whole_blocks) {
            if block.take().is_some() {
                released += 1;
            }
        }
        trace!(position, released, "memory cache flushed");
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn len(&self) -> u64 {
        self.length
    }
}
