//! I/O primitives for seekcache
//!
//! The forward-only source contract consumed by cached streams, plus the
//! reader-side helpers handed back to consumers.

pub mod traits;
pub mod buffer;

pub use traits::{ByteSource, ReadSource, SeekableReader};
pub use buffer::BufferedReader;
