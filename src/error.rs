//! Error types for the seglog record log.

use std::io;
use thiserror::Error as ThisError;

/// The result type used throughout seglog.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for seglog operations.
#[derive(Debug, ThisError)]
pub enum Error {
    /// An I/O error occurred, including a store file that is shorter than
    /// its frames claim.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The requested index entry has not been written.
    #[error("End of index")]
    EndOfIndex,

    /// The requested store position is at or past the end of the store.
    #[error("End of store: position {position}")]
    EndOfStore {
        /// The position that was requested.
        position: u64,
    },

    /// The index has no room for another entry.
    #[error("Index full")]
    IndexFull,

    /// The segment reached its store or index capacity.
    #[error("Segment {base_offset} is maxed")]
    SegmentMaxed {
        /// Base offset of the maxed segment.
        base_offset: u64,
    },

    /// The offset lies below the base offset of the segment it was sent to.
    #[error("Invalid offset {offset} for segment with base offset {base_offset}")]
    InvalidOffset {
        /// The offset that was requested.
        offset: u64,
        /// Base offset of the segment.
        base_offset: u64,
    },

    /// No retained segment covers the offset.
    #[error("Offset not found: {offset}")]
    OffsetNotFound {
        /// The offset that was requested.
        offset: u64,
    },

    /// A record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An invalid argument was provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Data corruption was detected.
    #[error("Data corruption: {0}")]
    Corruption(String),
}

impl Error {
    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Creates a new corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Returns true if the error means "nothing stored here".
    ///
    /// These are the errors a service layer reports to its clients as
    /// "not found" rather than as failures.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::EndOfIndex
                | Error::EndOfStore { .. }
                | Error::InvalidOffset { .. }
                | Error::OffsetNotFound { .. }
        )
    }

    /// Returns true if the error is a capacity signal rather than a failure.
    pub fn is_capacity(&self) -> bool {
        matches!(self, Error::IndexFull | Error::SegmentMaxed { .. })
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
