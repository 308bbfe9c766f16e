//! Error types for seekcache

use std::io;

use thiserror::Error;

/// Result type for seekcache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while reading or seeking a cached stream
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the source or the cache backing
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Operation attempted after the stream was closed
    #[error("Stream closed")]
    Closed,

    /// Position lies beyond the data held by the cache
    #[error("Out of range: position {position} is beyond cached extent {extent}")]
    OutOfRange { position: u64, extent: u64 },

    /// Position lies in a range already discarded by a flush
    #[error("Flushed: position {position} is before flushed position {flushed}")]
    Flushed { position: u64, flushed: u64 },

    /// Position argument not acceptable for the operation
    #[error("Invalid position {position}: {reason}")]
    InvalidPosition { position: u64, reason: &'static str },

    /// `reset` called without a matching `mark`
    #[error("No mark set")]
    NoMark,

    /// Source kept reporting no progress
    #[error("Source stalled after {attempts} attempts without progress")]
    Stalled { attempts: u32 },

    /// Invalid stream configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// The [`io::ErrorKind`] this error surfaces as through `Read`/`Seek`
    pub fn io_kind(&self) -> io::ErrorKind {
        match self {
            Error::Io(e) => e.kind(),
            Error::Closed => io::ErrorKind::BrokenPipe,
            Error::OutOfRange { .. } => io::ErrorKind::UnexpectedEof,
            Error::Flushed { .. } | Error::InvalidPosition { .. } | Error::NoMark => {
                io::ErrorKind::InvalidInput
            }
            Error::Stalled { .. } => io::ErrorKind::TimedOut,
            Error::Config(_) => io::ErrorKind::InvalidData,
        }
    }
}

impl From<Error> for io::Error {
    fn from(error: Error) -> Self {
        match error {
            Error::Io(e) => e,
            other => io::Error::new(other.io_kind(), other),
        }
    }
}
