//! seekcache - random access over forward-only streams
//!
//! seekcache wraps a non-seekable byte source (a pipe, a socket, a
//! decompressor) in a stream that can be read and seeked freely. Every byte
//! pulled from the source is recorded in a cache, in memory or in a
//! temporary file, so earlier positions can be revisited without touching
//! the source again.
//!
//! # Examples
//!
//! ## Seeking backwards over stdin
//!
//! ```no_run
//! use seekcache::CachedSeekableStream;
//!
//! let mut stream = CachedSeekableStream::in_memory(std::io::stdin());
//!
//! let mut header = [0u8; 16];
//! stream.read_bytes(&mut header)?;
//!
//! // Jump ahead, then come back to the header.
//! stream.seek_to(4096)?;
//! stream.seek_to(4)?;
//! let byte = stream.read_byte()?;
//! println!("byte 4: {:?}", byte);
//! # Ok::<(), seekcache::Error>(())
//! ```
//!
//! ## Handing the stream to a `Read + Seek` consumer
//!
//! ```no_run
//! use std::io::{Read, Seek, SeekFrom};
//! use seekcache::{open_cached, StreamOptions};
//!
//! let mut reader = open_cached(std::io::stdin(), &StreamOptions::file())?;
//! reader.seek(SeekFrom::End(-8))?;
//!
//! let mut trailer = [0u8; 8];
//! reader.read_exact(&mut trailer)?;
//! # Ok::<(), seekcache::Error>(())
//! ```

pub mod io;
pub mod error;
pub mod config;
pub mod cache;
pub mod stream;

pub use error::{Error, Result};
pub use config::{Backing, StreamOptions};
pub use cache::{FileCache, MemoryCache, StreamCache};
pub use stream::{
    open_cached, CachedSeekableStream, FileCacheSeekableStream, MemoryCacheSeekableStream,
};
pub use io::{BufferedReader, ByteSource, ReadSource, SeekableReader};
