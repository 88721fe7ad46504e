//! Configuration options for a seglog log.

use crate::index::ENTRY_WIDTH;

/// Configuration options for opening a log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Per-segment limits.
    pub segment: SegmentConfig,
}

/// Limits applied to every segment of a log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentConfig {
    /// Store size (in bytes) at which a segment stops accepting appends.
    /// Default: 1MB
    pub max_store_bytes: u64,

    /// Index size (in bytes) at which a segment stops accepting appends.
    /// The index file is pre-allocated to this length while open.
    /// Default: 1MB
    pub max_index_bytes: u64,

    /// Base offset of the first segment created in an empty directory.
    /// Default: 0
    pub initial_offset: u64,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            max_store_bytes: 1024 * 1024, // 1MB
            max_index_bytes: 1024 * 1024, // 1MB
            initial_offset: 0,
        }
    }
}

impl Config {
    /// Creates a new Config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum store size per segment.
    pub fn max_store_bytes(mut self, bytes: u64) -> Self {
        self.segment.max_store_bytes = bytes;
        self
    }

    /// Sets the maximum index size per segment.
    pub fn max_index_bytes(mut self, bytes: u64) -> Self {
        self.segment.max_index_bytes = bytes;
        self
    }

    /// Sets the offset the first segment starts at.
    pub fn initial_offset(mut self, offset: u64) -> Self {
        self.segment.initial_offset = offset;
        self
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.segment.max_store_bytes == 0 {
            return Err(crate::Error::invalid_argument("max_store_bytes must be > 0"));
        }
        if self.segment.max_index_bytes < ENTRY_WIDTH {
            return Err(crate::Error::invalid_argument(format!(
                "max_index_bytes must hold at least one entry ({} bytes)",
                ENTRY_WIDTH
            )));
        }
        Ok(())
    }
}
