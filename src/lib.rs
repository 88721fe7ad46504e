//! # seglog - A Segmented Append-Only Record Log
//!
//! seglog is the durable storage layer of a log/streaming service. It
//! persists variable-length records in order, gives each a monotonically
//! increasing offset, and reads any record back by offset without scanning.
//!
//! ## Architecture
//!
//! The log is built from four layers:
//!
//! - **Store**: append-only file of length-prefixed record frames
//! - **Index**: memory-mapped array of `(relative offset, store position)` entries
//! - **Segment**: one store and one index covering a contiguous offset range
//! - **Log**: ordered segments, rotation to a new segment when the active one
//!   fills up, and routing of reads to the segment owning an offset
//!
//! ## On-disk Layout
//!
//! ```text
//! <dir>/0.store      <dir>/0.index
//! <dir>/1024.store   <dir>/1024.index
//! ...
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use seglog::{Config, Log};
//!
//! # fn main() -> Result<(), seglog::Error> {
//! let config = Config::new().max_store_bytes(64 * 1024).max_index_bytes(12 * 1024);
//! let log = Log::open("./data", config)?;
//!
//! let offset = log.append(b"hello")?;
//! let record = log.read(offset)?;
//! assert_eq!(record.value, b"hello".to_vec());
//!
//! log.close()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod commit_log;
pub mod config;
pub mod error;
pub mod index;
pub mod record;
pub mod segment;
pub mod store;

// Re-exports
pub use commit_log::{Log, LogReader};
pub use config::{Config, SegmentConfig};
pub use error::{Error, Result};
pub use index::Index;
pub use record::Record;
pub use segment::Segment;
pub use store::Store;
