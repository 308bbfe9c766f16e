//! Cached seekable stream
//!
//! Turns a forward-only [`ByteSource`] into a randomly seekable stream by
//! recording every byte pulled from the source into a [`StreamCache`].
//!
//! The stream tracks three cursors:
//!
//! * the logical position seen by the caller,
//! * the stream position (high-water mark), the furthest offset ever
//!   consumed from the source,
//! * the cache position, owned by the cache.
//!
//! The logical position never exceeds the high-water mark. Reads at the
//! high-water mark (the frontier) pull from the source and append to the
//! cache; reads behind it are served from the cache, which is repositioned
//! first when its cursor has drifted from the logical position.

use std::io::{self, Read, Seek, SeekFrom};

use tracing::{debug, trace, warn};

use crate::cache::{FileCache, MemoryCache, StreamCache};
use crate::config::{Backing, StreamOptions};
use crate::error::{Error, Result};
use crate::io::{BufferedReader, ByteSource, ReadSource, SeekableReader};

/// Cached stream over a memory cache
pub type MemoryCacheSeekableStream<S> = CachedSeekableStream<S, MemoryCache>;

/// Cached stream over a temporary-file cache
pub type FileCacheSeekableStream<S> = CachedSeekableStream<S, FileCache>;

/// Seekable stream reading through a cache
pub struct CachedSeekableStream<S: ByteSource, C: StreamCache> {
    source: S,
    cache: Option<C>,
    position: u64,
    stream_position: u64,
    flushed_position: u64,
    marks: Vec<u64>,
    chunk: Vec<u8>,
    pending: Vec<u8>,
    max_stalled_reads: u32,
}

impl<S: ByteSource, C: StreamCache> CachedSeekableStream<S, C> {
    /// Creates a stream with default options
    pub fn new(source: S, cache: C) -> Self {
        Self::with_options(source, cache, &StreamOptions::default())
    }

    /// Creates a stream using the chunk size and stall cap from `options`
    ///
    /// The backing selected in `options` is ignored; the cache is given.
    pub fn with_options(source: S, cache: C, options: &StreamOptions) -> Self {
        Self {
            source,
            cache: Some(cache),
            position: 0,
            stream_position: 0,
            flushed_position: 0,
            marks: Vec::new(),
            chunk: vec![0; options.chunk_size.max(1)],
            pending: Vec::new(),
            max_stalled_reads: options.max_stalled_reads,
        }
    }

    /// Current logical read position
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Furthest offset consumed from the source
    pub fn high_water_mark(&self) -> u64 {
        self.stream_position
    }

    /// Position before which seeking is no longer allowed
    pub fn flushed_position(&self) -> u64 {
        self.flushed_position
    }

    /// The cache, `None` once closed
    pub fn cache(&self) -> Option<&C> {
        self.cache.as_ref()
    }

    /// Whether [`close`](Self::close) has been called
    pub fn is_closed(&self) -> bool {
        self.cache.is_none()
    }

    /// Always true, every byte read is cached
    pub fn is_cached(&self) -> bool {
        true
    }

    /// Whether the cache keeps its data in memory
    pub fn is_cached_memory(&self) -> bool {
        C::MEMORY_BACKED
    }

    /// Whether the cache keeps its data in a file
    pub fn is_cached_file(&self) -> bool {
        C::FILE_BACKED
    }

    /// Estimate of bytes readable without blocking
    ///
    /// Cached bytes ahead of the logical position plus the source's own
    /// estimate, saturating at `u64::MAX`. Bytes pulled from the source but
    /// not yet recorded in the cache count as cached.
    pub fn available(&self) -> Result<u64> {
        self.check_open()?;
        let cached = self.stream_position - self.position + self.pending.len() as u64;
        Ok(cached.saturating_add(self.source.available()))
    }

    /// Reads one byte, `None` at end of stream
    pub fn read_byte(&mut self) -> Result<Option<u8>> {
        let cache = self.cache.as_mut().ok_or(Error::Closed)?;
        commit_pending(cache, &mut self.pending, &mut self.stream_position)?;

        let byte = if self.position == self.stream_position {
            let byte = retry_stalled(self.max_stalled_reads, || self.source.read_byte())?;
            if let Some(byte) = byte {
                record(cache, &mut self.pending, &mut self.stream_position, &[byte])?;
            }
            byte
        } else {
            sync_position(cache, self.position)?;
            cache.read_byte()?
        };

        if byte.is_some() {
            self.position += 1;
        }
        self.debug_check_invariants();
        Ok(byte)
    }

    /// Reads up to `buf.len()` bytes, returning the count transferred
    ///
    /// Zero for a non-empty buffer means end of stream. Reads never span the
    /// frontier: a read behind it returns at most the cached bytes, the next
    /// read continues from the source.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize> {
        let cache = self.cache.as_mut().ok_or(Error::Closed)?;
        if buf.is_empty() {
            return Ok(0);
        }
        commit_pending(cache, &mut self.pending, &mut self.stream_position)?;

        let count = if self.position == self.stream_position {
            let count = pull(&mut self.source, buf, self.max_stalled_reads)?;
            if count > 0 {
                record(cache, &mut self.pending, &mut self.stream_position, &buf[..count])?;
            }
            count
        } else {
            sync_position(cache, self.position)?;
            cache.read(buf)?
        };

        self.position += count as u64;
        self.debug_check_invariants();
        Ok(count)
    }

    /// Moves the logical position to `target`, returning the new position
    ///
    /// Seeking past the high-water mark pulls the missing bytes from the
    /// source into the cache. When the source ends first, the stream is left
    /// at the end of the data and the returned position is short of `target`.
    pub fn seek_to(&mut self, target: u64) -> Result<u64> {
        self.check_open()?;
        if target < self.flushed_position {
            return Err(Error::Flushed { position: target, flushed: self.flushed_position });
        }

        if target > self.stream_position {
            self.fill_to(target)?;
        } else {
            self.cache_mut()?.seek(target)?;
        }

        self.position = target.min(self.stream_position);
        debug!(
            requested = target,
            position = self.position,
            high_water_mark = self.stream_position,
            "seek"
        );
        self.debug_check_invariants();
        Ok(self.position)
    }

    /// Skips `count` bytes forward, returning how many were skipped
    pub fn skip(&mut self, count: u64) -> Result<u64> {
        let start = self.position;
        let end = self.seek_to(start.saturating_add(count))?;
        Ok(end - start)
    }

    /// Reads the remainder of the source into the cache
    ///
    /// Returns the total length of the stream. The logical position is left
    /// untouched.
    pub fn drain_source(&mut self) -> Result<u64> {
        self.check_open()?;
        self.fill_to(u64::MAX)?;
        Ok(self.stream_position)
    }

    /// Marks data before `position` as no longer needed
    ///
    /// `position` must lie between the current flushed position and the
    /// logical position. The cache may release the data; seeking before
    /// `position` fails afterwards.
    pub fn flush_before(&mut self, position: u64) -> Result<()> {
        self.check_open()?;
        if position < self.flushed_position {
            return Err(Error::InvalidPosition {
                position,
                reason: "before flushed position",
            });
        }
        if position > self.position {
            return Err(Error::InvalidPosition {
                position,
                reason: "beyond current position",
            });
        }

        self.flushed_position = position;
        self.cache_mut()?.flush(position);
        debug!(position, "flushed");
        Ok(())
    }

    /// Flushes everything before the logical position
    pub fn flush(&mut self) -> Result<()> {
        self.flush_before(self.position)
    }

    /// Remembers the logical position for a later [`reset`](Self::reset)
    ///
    /// Marks nest; each reset returns to the most recent one.
    pub fn mark(&mut self) -> Result<()> {
        self.check_open()?;
        self.marks.push(self.position);
        Ok(())
    }

    /// Returns to the most recent mark
    pub fn reset(&mut self) -> Result<()> {
        self.check_open()?;
        let mark = self.marks.pop().ok_or(Error::NoMark)?;
        if mark < self.flushed_position {
            return Err(Error::Flushed { position: mark, flushed: self.flushed_position });
        }
        self.seek_to(mark)?;
        Ok(())
    }

    /// Closes the stream
    ///
    /// Flushes the cache up to the logical position, releases it and closes
    /// the source. Later operations fail with [`Error::Closed`]; closing
    /// again is a no-op.
    pub fn close(&mut self) -> Result<()> {
        let Some(mut cache) = self.cache.take() else {
            return Ok(());
        };
        cache.flush(self.position);
        drop(cache);
        self.marks.clear();
        self.pending.clear();

        debug!(position = self.position, high_water_mark = self.stream_position, "closing");
        self.source.close()?;
        Ok(())
    }

    /// Pulls chunks from the source into the cache until the high-water
    /// mark reaches `target` or the source ends
    fn fill_to(&mut self, target: u64) -> Result<()> {
        let cache = self.cache.as_mut().ok_or(Error::Closed)?;
        commit_pending(cache, &mut self.pending, &mut self.stream_position)?;
        sync_position(cache, self.stream_position)?;

        while self.stream_position < target {
            let left = target - self.stream_position;
            let len = (self.chunk.len() as u64).min(left) as usize;
            let chunk = &mut self.chunk[..len];

            let read = pull(&mut self.source, chunk, self.max_stalled_reads)?;
            if read == 0 {
                trace!(high_water_mark = self.stream_position, "source exhausted");
                break;
            }
            record(cache, &mut self.pending, &mut self.stream_position, &chunk[..read])?;
            trace!(read, high_water_mark = self.stream_position, "pulled chunk");
        }
        Ok(())
    }

    fn check_open(&self) -> Result<()> {
        if self.cache.is_none() {
            return Err(Error::Closed);
        }
        Ok(())
    }

    fn cache_mut(&mut self) -> Result<&mut C> {
        self.cache.as_mut().ok_or(Error::Closed)
    }

    fn debug_check_invariants(&self) {
        debug_assert!(self.position <= self.stream_position);
        debug_assert!(self.flushed_position <= self.position);
        debug_assert!(self.cache.as_ref().map_or(true, |cache| {
            cache.len() == self.stream_position || !self.pending.is_empty()
        }));
    }
}

impl<R: Read> CachedSeekableStream<ReadSource<R>, MemoryCache> {
    /// Wraps `reader` in a stream cached in memory
    pub fn in_memory(reader: R) -> Self {
        Self::new(ReadSource::new(reader), MemoryCache::new())
    }
}

impl<R: Read> CachedSeekableStream<ReadSource<R>, FileCache> {
    /// Wraps `reader` in a stream cached in a temporary file
    pub fn file_backed(reader: R) -> Result<Self> {
        Ok(Self::new(ReadSource::new(reader), FileCache::new()?))
    }
}

/// Moves the cache cursor to `position` if it is elsewhere
///
/// A cache seek past its written extent fails, which is how a read past the
/// end of cached data surfaces.
fn sync_position<C: StreamCache>(cache: &mut C, position: u64) -> Result<()> {
    if cache.position() != position {
        cache.seek(position)?;
    }
    Ok(())
}

/// Writes bytes left over from a failed cache write, ahead of anything new
///
/// The high-water mark only advances once the bytes are in the cache.
fn commit_pending<C: StreamCache>(
    cache: &mut C,
    pending: &mut Vec<u8>,
    stream_position: &mut u64,
) -> Result<()> {
    if pending.is_empty() {
        return Ok(());
    }
    sync_position(cache, *stream_position)?;
    cache.write(pending)?;
    *stream_position += pending.len() as u64;
    trace!(
        committed = pending.len(),
        high_water_mark = *stream_position,
        "committed pending bytes"
    );
    pending.clear();
    Ok(())
}

/// Appends bytes just pulled from the source to the cache
///
/// The source cannot give them back, so when the cache write fails they are
/// kept in `pending` and written first by the next operation that needs the
/// frontier. The cache error is returned unchanged.
fn record<C: StreamCache>(
    cache: &mut C,
    pending: &mut Vec<u8>,
    stream_position: &mut u64,
    bytes: &[u8],
) -> Result<()> {
    let written = sync_position(cache, *stream_position).and_then(|()| cache.write(bytes));
    match written {
        Ok(()) => {
            *stream_position += bytes.len() as u64;
            Ok(())
        }
        Err(e) => {
            warn!(bytes = bytes.len(), error = %e, "cache write failed, keeping bytes pending");
            pending.extend_from_slice(bytes);
            Err(e)
        }
    }
}

/// Bulk read from the source into `buf`
///
/// A count larger than `buf.len()` breaks the [`ByteSource`] contract and
/// fails with `InvalidData`.
fn pull<S: ByteSource>(source: &mut S, buf: &mut [u8], max_stalled: u32) -> Result<usize> {
    let len = buf.len();
    let count = retry_stalled(max_stalled, || source.read(buf))?;
    if count > len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("source reported {count} bytes read into a {len} byte buffer"),
        )
        .into());
    }
    Ok(count)
}

/// Runs a source read, retrying while it is interrupted
///
/// `Interrupted` is retried up to `max_stalled` times in a row, after which
/// [`Error::Stalled`] is returned. There is no backoff between attempts, so
/// `WouldBlock` from a non-blocking source is not retried here; it
/// propagates like any other error and leaves the stream unchanged.
fn retry_stalled<T>(max_stalled: u32, mut op: impl FnMut() -> io::Result<T>) -> Result<T> {
    let mut stalls = 0u32;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                stalls += 1;
                if stalls > max_stalled {
                    warn!(attempts = stalls, "source made no progress, giving up");
                    return Err(Error::Stalled { attempts: stalls });
                }
                trace!(attempts = stalls, "source made no progress, retrying");
            }
            Err(e) => return Err(e.into()),
        }
    }
}

impl<S: ByteSource, C: StreamCache> Read for CachedSeekableStream<S, C> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_bytes(buf)?)
    }
}

impl<S: ByteSource, C: StreamCache> Seek for CachedSeekableStream<S, C> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
            SeekFrom::End(delta) => {
                let length = self.drain_source()?;
                length.checked_add_signed(delta)
            }
        };
        let target = target.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )
        })?;
        Ok(self.seek_to(target)?)
    }
}

/// Opens `reader` as a seekable stream configured by `options`
///
/// File-backed streams are wrapped in a [`BufferedReader`], since every
/// small read would otherwise reach the cache file. Memory-backed streams
/// are returned as is.
pub fn open_cached<R: Read + 'static>(
    reader: R,
    options: &StreamOptions,
) -> Result<Box<dyn SeekableReader>> {
    options.validate()?;
    let source = ReadSource::new(reader);

    match &options.backing {
        Backing::Memory { block_size } => {
            let cache = MemoryCache::with_block_size(*block_size);
            Ok(into_reader(CachedSeekableStream::with_options(source, cache, options)))
        }
        Backing::File { dir } => {
            let cache = match dir {
                Some(dir) => FileCache::new_in(dir)?,
                None => FileCache::new()?,
            };
            Ok(into_reader(CachedSeekableStream::with_options(source, cache, options)))
        }
    }
}

fn into_reader<S, C>(stream: CachedSeekableStream<S, C>) -> Box<dyn SeekableReader>
where
    S: ByteSource + 'static,
    C: StreamCache + 'static,
{
    if stream.is_cached_file() {
        Box::new(BufferedReader::new(stream))
    } else {
        Box::new(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn bytes(len: u8) -> Vec<u8> {
        (0..len).collect()
    }

    /// Source failing with `kind` for the first `failures` reads
    struct FlakySource {
        data: Cursor<Vec<u8>>,
        failures: u32,
        kind: io::ErrorKind,
    }

    impl ByteSource for FlakySource {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(self.kind.into());
            }
            self.data.read(buf)
        }
    }

    fn flaky(failures: u32, kind: io::ErrorKind) -> FlakySource {
        FlakySource {
            data: Cursor::new(bytes(8)),
            failures,
            kind,
        }
    }

    #[test]
    fn test_read_byte_at_frontier() {
        let mut stream = CachedSeekableStream::in_memory(Cursor::new(vec![0x42u8]));

        assert_eq!(stream.read_byte().unwrap(), Some(0x42));
        assert_eq!(stream.position(), 1);
        assert_eq!(stream.high_water_mark(), 1);
        assert_eq!(stream.read_byte().unwrap(), None);
        assert_eq!(stream.position(), 1);
    }

    #[test]
    fn test_read_bytes_from_cache_after_seek() {
        let mut stream = CachedSeekableStream::in_memory(Cursor::new(bytes(8)));

        let mut buf = [0u8; 6];
        assert_eq!(stream.read_bytes(&mut buf).unwrap(), 6);

        stream.seek_to(2).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(stream.read_bytes(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], &[2, 3, 4, 5]);
        assert_eq!(stream.position(), 6);

        assert_eq!(stream.read_bytes(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[6, 7]);
        assert_eq!(stream.high_water_mark(), 8);
    }

    #[test]
    fn test_read_empty_buffer() {
        let mut stream = CachedSeekableStream::in_memory(Cursor::new(bytes(4)));
        assert_eq!(stream.read_bytes(&mut []).unwrap(), 0);
        assert_eq!(stream.high_water_mark(), 0);
    }

    #[test]
    fn test_seek_forward_pulls_in_chunks() {
        let options = StreamOptions::default().with_chunk_size(3);
        let source = ReadSource::new(Cursor::new(bytes(20)));
        let mut stream = CachedSeekableStream::with_options(source, MemoryCache::new(), &options);

        assert_eq!(stream.seek_to(10).unwrap(), 10);
        assert_eq!(stream.high_water_mark(), 10);
        assert_eq!(stream.read_byte().unwrap(), Some(10));
        assert_eq!(stream.high_water_mark(), 11);
    }

    #[test]
    fn test_seek_past_end_stops_at_end() {
        let mut stream = CachedSeekableStream::in_memory(Cursor::new(bytes(5)));

        assert_eq!(stream.seek_to(100).unwrap(), 5);
        assert_eq!(stream.position(), 5);
        assert_eq!(stream.high_water_mark(), 5);
        assert_eq!(stream.read_byte().unwrap(), None);
    }

    #[test]
    fn test_skip() {
        let mut stream = CachedSeekableStream::in_memory(Cursor::new(bytes(5)));
        assert_eq!(stream.skip(2).unwrap(), 2);
        assert_eq!(stream.read_byte().unwrap(), Some(2));
        assert_eq!(stream.skip(10).unwrap(), 2);
    }

    #[test]
    fn test_drain_source_keeps_position() {
        let mut stream = CachedSeekableStream::in_memory(Cursor::new(bytes(10)));
        stream.read_byte().unwrap();

        assert_eq!(stream.drain_source().unwrap(), 10);
        assert_eq!(stream.position(), 1);
        assert_eq!(stream.read_byte().unwrap(), Some(1));
    }

    #[test]
    fn test_available_counts_cached_and_hint() {
        let source = ReadSource::with_length_hint(Cursor::new(bytes(10)), 10);
        let mut stream = CachedSeekableStream::new(source, MemoryCache::new());

        stream.seek_to(6).unwrap();
        stream.seek_to(2).unwrap();
        assert_eq!(stream.available().unwrap(), 4 + 4);
    }

    #[test]
    fn test_available_saturates() {
        struct Endless;
        impl ByteSource for Endless {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                buf.fill(0);
                Ok(buf.len())
            }
            fn available(&self) -> u64 {
                u64::MAX
            }
        }

        let mut stream = CachedSeekableStream::new(Endless, MemoryCache::new());
        stream.seek_to(4).unwrap();
        stream.seek_to(0).unwrap();
        assert_eq!(stream.available().unwrap(), u64::MAX);
    }

    #[test]
    fn test_flush_before_validates_range() {
        let mut stream = CachedSeekableStream::in_memory(Cursor::new(bytes(10)));
        stream.seek_to(6).unwrap();

        assert!(matches!(stream.flush_before(7), Err(Error::InvalidPosition { position: 7, .. })));
        stream.flush_before(4).unwrap();
        assert!(matches!(stream.flush_before(3), Err(Error::InvalidPosition { position: 3, .. })));
        assert_eq!(stream.flushed_position(), 4);
    }

    #[test]
    fn test_seek_before_flushed_fails() {
        let mut stream = CachedSeekableStream::in_memory(Cursor::new(bytes(10)));
        stream.seek_to(8).unwrap();
        stream.flush_before(5).unwrap();

        let err = stream.seek_to(3).unwrap_err();
        assert!(matches!(err, Error::Flushed { position: 3, flushed: 5 }));
        assert_eq!(stream.position(), 8);

        stream.seek_to(6).unwrap();
        assert_eq!(stream.read_byte().unwrap(), Some(6));
    }

    #[test]
    fn test_flush_uses_current_position() {
        let mut stream = CachedSeekableStream::in_memory(Cursor::new(bytes(10)));
        stream.seek_to(3).unwrap();
        stream.flush().unwrap();
        assert_eq!(stream.flushed_position(), 3);
        assert_eq!(stream.cache().unwrap().flushed_position(), 3);
    }

    #[test]
    fn test_mark_and_reset() {
        let mut stream = CachedSeekableStream::in_memory(Cursor::new(bytes(10)));
        stream.seek_to(2).unwrap();
        stream.mark().unwrap();
        stream.seek_to(5).unwrap();
        stream.mark().unwrap();
        stream.seek_to(9).unwrap();

        stream.reset().unwrap();
        assert_eq!(stream.position(), 5);
        stream.reset().unwrap();
        assert_eq!(stream.position(), 2);
        assert!(matches!(stream.reset(), Err(Error::NoMark)));
    }

    #[test]
    fn test_reset_to_flushed_mark_fails() {
        let mut stream = CachedSeekableStream::in_memory(Cursor::new(bytes(10)));
        stream.mark().unwrap();
        stream.seek_to(6).unwrap();
        stream.flush_before(4).unwrap();

        assert!(matches!(stream.reset(), Err(Error::Flushed { position: 0, flushed: 4 })));
    }

    #[test]
    fn test_close_then_operations_fail() {
        let mut stream = CachedSeekableStream::in_memory(Cursor::new(bytes(4)));
        stream.read_byte().unwrap();
        stream.close().unwrap();

        assert!(stream.is_closed());
        assert!(stream.cache().is_none());
        assert!(matches!(stream.read_byte(), Err(Error::Closed)));
        assert!(matches!(stream.read_bytes(&mut [0u8; 2]), Err(Error::Closed)));
        assert!(matches!(stream.seek_to(0), Err(Error::Closed)));
        assert!(matches!(stream.flush_before(0), Err(Error::Closed)));
        assert!(matches!(stream.available(), Err(Error::Closed)));
        assert!(matches!(stream.mark(), Err(Error::Closed)));
        assert!(matches!(stream.reset(), Err(Error::Closed)));
        assert!(stream.close().is_ok());
    }

    #[test]
    fn test_close_closes_source() {
        let mut stream = CachedSeekableStream::in_memory(Cursor::new(bytes(4)));
        stream.close().unwrap();
        assert!(stream.source.get_ref().is_none());
    }

    #[test]
    fn test_closed_stream_through_io_traits() {
        let mut stream = CachedSeekableStream::in_memory(Cursor::new(bytes(4)));
        stream.close().unwrap();

        let err = Read::read(&mut stream, &mut [0u8; 1]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_capability_flags() {
        let memory = CachedSeekableStream::in_memory(Cursor::new(bytes(1)));
        assert!(memory.is_cached());
        assert!(memory.is_cached_memory());
        assert!(!memory.is_cached_file());

        let file = CachedSeekableStream::file_backed(Cursor::new(bytes(1))).unwrap();
        assert!(file.is_cached());
        assert!(file.is_cached_file());
        assert!(!file.is_cached_memory());
    }

    #[test]
    fn test_stalled_reads_are_retried() {
        let source = flaky(3, io::ErrorKind::Interrupted);
        let mut stream = CachedSeekableStream::new(source, MemoryCache::new());
        assert_eq!(stream.seek_to(4).unwrap(), 4);
        assert_eq!(stream.read_byte().unwrap(), Some(4));
    }

    #[test]
    fn test_stall_cap_gives_up() {
        let options = StreamOptions::default().with_max_stalled_reads(2);
        let source = flaky(5, io::ErrorKind::Interrupted);
        let mut stream = CachedSeekableStream::with_options(source, MemoryCache::new(), &options);

        assert!(matches!(stream.read_byte(), Err(Error::Stalled { attempts: 3 })));
        assert_eq!(stream.high_water_mark(), 0);
    }

    #[test]
    fn test_would_block_is_not_retried() {
        let source = flaky(1, io::ErrorKind::WouldBlock);
        let mut stream = CachedSeekableStream::new(source, MemoryCache::new());

        let err = stream.read_bytes(&mut [0u8; 4]).unwrap_err();
        assert!(matches!(&err, Error::Io(e) if e.kind() == io::ErrorKind::WouldBlock));
        assert_eq!(stream.position(), 0);
        assert_eq!(stream.high_water_mark(), 0);

        assert_eq!(stream.read_bytes(&mut [0u8; 4]).unwrap(), 4);
    }

    #[test]
    fn test_source_errors_propagate() {
        let source = flaky(1, io::ErrorKind::ConnectionReset);
        let mut stream = CachedSeekableStream::new(source, MemoryCache::new());

        let err = stream.read_bytes(&mut [0u8; 4]).unwrap_err();
        assert!(matches!(&err, Error::Io(e) if e.kind() == io::ErrorKind::ConnectionReset));
        assert_eq!(stream.position(), 0);

        assert_eq!(stream.read_byte().unwrap(), Some(0));
    }

    /// Source claiming to have read more bytes than the buffer holds
    struct OverreportingSource;

    impl ByteSource for OverreportingSource {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            buf.fill(0xAA);
            Ok(buf.len() + 1)
        }
    }

    #[test]
    fn test_overreported_count_is_invalid_data() {
        let mut stream = CachedSeekableStream::new(OverreportingSource, MemoryCache::new());

        let err = stream.read_bytes(&mut [0u8; 4]).unwrap_err();
        assert!(matches!(&err, Error::Io(e) if e.kind() == io::ErrorKind::InvalidData));
        assert_eq!(stream.high_water_mark(), 0);

        let err = stream.seek_to(10).unwrap_err();
        assert!(matches!(&err, Error::Io(e) if e.kind() == io::ErrorKind::InvalidData));
        assert_eq!(stream.position(), 0);
        assert_eq!(stream.high_water_mark(), 0);
    }

    /// Memory cache whose next operations of each kind can be made to fail
    #[derive(Default)]
    struct FailingCache {
        inner: MemoryCache,
        failing_writes: u32,
        failing_reads: u32,
        failing_seeks: u32,
    }

    fn trip(remaining: &mut u32) -> Result<()> {
        if *remaining == 0 {
            return Ok(());
        }
        *remaining -= 1;
        Err(io::Error::new(io::ErrorKind::Other, "cache device failed").into())
    }

    fn assert_cache_failure(err: &Error) {
        match err {
            Error::Io(e) => {
                assert_eq!(e.kind(), io::ErrorKind::Other);
                assert_eq!(e.to_string(), "cache device failed");
            }
            other => panic!("expected the cache error, got {other:?}"),
        }
    }

    impl StreamCache for FailingCache {
        const MEMORY_BACKED: bool = true;
        const FILE_BACKED: bool = false;

        fn write_byte(&mut self, byte: u8) -> Result<()> {
            self.write(&[byte])
        }

        fn write(&mut self, buf: &[u8]) -> Result<()> {
            trip(&mut self.failing_writes)?;
            self.inner.write(buf)
        }

        fn read_byte(&mut self) -> Result<Option<u8>> {
            trip(&mut self.failing_reads)?;
            self.inner.read_byte()
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            trip(&mut self.failing_reads)?;
            self.inner.read(buf)
        }

        fn seek(&mut self, position: u64) -> Result<()> {
            trip(&mut self.failing_seeks)?;
            self.inner.seek(position)
        }

        fn position(&self) -> u64 {
            self.inner.position()
        }

        fn len(&self) -> u64 {
            self.inner.len()
        }
    }

    fn failing(data: Vec<u8>) -> CachedSeekableStream<ReadSource<Cursor<Vec<u8>>>, FailingCache> {
        let options = StreamOptions::default().with_chunk_size(2);
        CachedSeekableStream::with_options(
            ReadSource::new(Cursor::new(data)),
            FailingCache::default(),
            &options,
        )
    }

    fn failing_cache(
        stream: &mut CachedSeekableStream<ReadSource<Cursor<Vec<u8>>>, FailingCache>,
    ) -> &mut FailingCache {
        stream.cache.as_mut().unwrap()
    }

    #[test]
    fn test_failed_cache_write_keeps_pulled_byte() {
        let mut stream = failing(vec![10, 11, 12, 13]);
        assert_eq!(stream.read_byte().unwrap(), Some(10));

        failing_cache(&mut stream).failing_writes = 1;
        assert_cache_failure(&stream.read_byte().unwrap_err());
        assert_eq!(stream.position(), 1);
        assert_eq!(stream.high_water_mark(), 1);
        assert_eq!(stream.available().unwrap(), 1);

        assert_eq!(stream.read_byte().unwrap(), Some(11));
        assert_eq!(stream.read_byte().unwrap(), Some(12));
        assert_eq!(stream.high_water_mark(), 3);

        stream.seek_to(0).unwrap();
        let mut all = [0u8; 4];
        stream.read_exact(&mut all).unwrap();
        assert_eq!(all, [10, 11, 12, 13]);
    }

    #[test]
    fn test_failed_cache_write_on_bulk_read() {
        let mut stream = failing(bytes(8));
        failing_cache(&mut stream).failing_writes = 1;

        let mut buf = [0u8; 3];
        assert_cache_failure(&stream.read_bytes(&mut buf).unwrap_err());
        assert_eq!(stream.position(), 0);
        assert_eq!(stream.high_water_mark(), 0);

        assert_eq!(stream.read_bytes(&mut buf).unwrap(), 3);
        assert_eq!(buf, [0, 1, 2]);
        assert_eq!(stream.read_bytes(&mut buf).unwrap(), 3);
        assert_eq!(buf, [3, 4, 5]);
        assert_eq!(stream.high_water_mark(), 6);
    }

    #[test]
    fn test_failing_cache_holds_back_source() {
        let mut stream = failing(bytes(8));
        failing_cache(&mut stream).failing_writes = 3;

        assert_cache_failure(&stream.read_byte().unwrap_err());
        assert_cache_failure(&stream.read_byte().unwrap_err());
        assert_cache_failure(&stream.seek_to(5).unwrap_err());
        assert_eq!(stream.position(), 0);
        assert_eq!(stream.high_water_mark(), 0);
        assert_eq!(stream.source.get_ref().unwrap().position(), 1);

        assert_eq!(stream.read_byte().unwrap(), Some(0));
        assert_eq!(stream.read_byte().unwrap(), Some(1));
    }

    #[test]
    fn test_failed_cache_write_during_forward_seek() {
        let mut stream = failing(bytes(8));
        assert_eq!(stream.read_byte().unwrap(), Some(0));

        failing_cache(&mut stream).failing_writes = 1;
        assert_cache_failure(&stream.seek_to(6).unwrap_err());
        assert_eq!(stream.position(), 1);
        assert_eq!(stream.high_water_mark(), 1);

        assert_eq!(stream.seek_to(6).unwrap(), 6);
        assert_eq!(stream.high_water_mark(), 6);
        assert_eq!(stream.read_byte().unwrap(), Some(6));

        stream.seek_to(0).unwrap();
        let mut all = [0u8; 8];
        stream.read_exact(&mut all).unwrap();
        assert_eq!(all.to_vec(), bytes(8));
    }

    #[test]
    fn test_failed_cache_reads_behind_frontier() {
        let mut stream = failing(bytes(8));
        stream.seek_to(6).unwrap();
        stream.seek_to(2).unwrap();

        failing_cache(&mut stream).failing_reads = 2;
        assert_cache_failure(&stream.read_byte().unwrap_err());
        assert_eq!(stream.position(), 2);
        assert_cache_failure(&stream.read_bytes(&mut [0u8; 2]).unwrap_err());
        assert_eq!(stream.position(), 2);

        assert_eq!(stream.read_byte().unwrap(), Some(2));
        let mut buf = [0u8; 2];
        assert_eq!(stream.read_bytes(&mut buf).unwrap(), 2);
        assert_eq!(buf, [3, 4]);
        assert_eq!(stream.high_water_mark(), 6);
    }

    #[test]
    fn test_failed_cache_seek_on_backward_seek() {
        let mut stream = failing(bytes(8));
        stream.seek_to(5).unwrap();

        failing_cache(&mut stream).failing_seeks = 1;
        assert_cache_failure(&stream.seek_to(1).unwrap_err());
        assert_eq!(stream.position(), 5);
        assert_eq!(stream.high_water_mark(), 5);

        assert_eq!(stream.seek_to(1).unwrap(), 1);
        assert_eq!(stream.read_byte().unwrap(), Some(1));
    }

    #[test]
    fn test_io_seek_variants() {
        let mut stream = CachedSeekableStream::in_memory(Cursor::new(bytes(10)));

        assert_eq!(Seek::seek(&mut stream, SeekFrom::Start(4)).unwrap(), 4);
        assert_eq!(Seek::seek(&mut stream, SeekFrom::Current(-2)).unwrap(), 2);
        assert_eq!(Seek::seek(&mut stream, SeekFrom::End(-1)).unwrap(), 9);
        assert_eq!(stream.read_byte().unwrap(), Some(9));
        assert_eq!(stream.high_water_mark(), 10);

        let err = Seek::seek(&mut stream, SeekFrom::Current(-20)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_read_exact_through_io_trait() {
        let mut stream = CachedSeekableStream::in_memory(Cursor::new(bytes(10)));
        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).unwrap();

        stream.rewind().unwrap();
        let mut all = Vec::new();
        stream.read_to_end(&mut all).unwrap();
        assert_eq!(all, bytes(10));
    }

    #[test]
    fn test_open_cached_memory() {
        let mut reader = open_cached(Cursor::new(bytes(10)), &StreamOptions::memory()).unwrap();
        reader.seek(SeekFrom::Start(7)).unwrap();
        let mut buf = [0u8; 3];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [7, 8, 9]);

        reader.seek(SeekFrom::Start(1)).unwrap();
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3]);
    }

    #[test]
    fn test_open_cached_file() {
        let dir = tempfile::tempdir().unwrap();
        let options = StreamOptions::default().with_backing(Backing::File {
            dir: Some(dir.path().to_path_buf()),
        });

        let mut reader = open_cached(Cursor::new(bytes(100)), &options).unwrap();
        reader.seek(SeekFrom::Start(50)).unwrap();
        let mut buf = [0u8; 2];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [50, 51]);

        reader.seek(SeekFrom::Current(-10)).unwrap();
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [42, 43]);
    }

    #[test]
    fn test_open_cached_rejects_invalid_options() {
        let options = StreamOptions::default().with_chunk_size(0);
        assert!(matches!(open_cached(Cursor::new(bytes(1)), &options), Err(Error::Config(_))));
    }
}
