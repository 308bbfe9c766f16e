//! Stream configuration
//!
//! Options controlling how a cached stream pulls from its source and which
//! cache backing it records into. Options can be built in code or loaded
//! from JSON.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default number of bytes pulled from the source per chunk during a forward seek
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Default number of consecutive no-progress source reads tolerated
pub const DEFAULT_MAX_STALLED_READS: u32 = 8;

/// Default block size of the in-memory cache
pub const DEFAULT_BLOCK_SIZE: usize = 2048;

/// Where a cached stream keeps the bytes it has pulled from its source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backing {
    /// Fixed-size heap blocks
    Memory {
        #[serde(default = "default_block_size")]
        block_size: usize,
    },
    /// Anonymous temporary file, optionally created inside `dir`
    File {
        #[serde(default)]
        dir: Option<PathBuf>,
    },
}

impl Default for Backing {
    fn default() -> Self {
        Backing::Memory { block_size: DEFAULT_BLOCK_SIZE }
    }
}

fn default_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}

/// Configuration for a cached seekable stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamOptions {
    /// Size of the scratch buffer used when seeking past the frontier
    pub chunk_size: usize,
    /// Consecutive `Interrupted` source reads retried before giving up
    pub max_stalled_reads: u32,
    /// Cache backing
    pub backing: Backing,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_stalled_reads: DEFAULT_MAX_STALLED_READS,
            backing: Backing::default(),
        }
    }
}

impl StreamOptions {
    /// Options using an in-memory cache
    pub fn memory() -> Self {
        Self::default()
    }

    /// Options using a temporary-file cache in the system temp directory
    pub fn file() -> Self {
        Self {
            backing: Backing::File { dir: None },
            ..Self::default()
        }
    }

    /// Sets the forward-seek chunk size
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Sets the stalled-read cap
    pub fn with_max_stalled_reads(mut self, attempts: u32) -> Self {
        self.max_stalled_reads = attempts;
        self
    }

    /// Sets the cache backing
    pub fn with_backing(mut self, backing: Backing) -> Self {
        self.backing = backing;
        self
    }

    /// Parses and validates options from a JSON document
    ///
    /// Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Reads options from a JSON file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Checks that every size is usable
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be greater than zero".to_string()));
        }
        if let Backing::Memory { block_size: 0 } = self.backing {
            return Err(Error::Config("block_size must be greater than zero".to_string()));
        }
        Ok(())
    }
}
