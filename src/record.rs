//! Record type stored in the log.
//!
//! A record is an opaque payload plus the offset the log assigned to it.
//! The offset is stamped in by the segment at append time and travels with
//! the encoded record, so a frame read back from a store is self-describing.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// A single entry in the log.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Record {
    /// The payload bytes.
    pub value: Vec<u8>,
    /// Absolute offset, assigned on append.
    pub offset: u64,
}

impl Record {
    /// Create a record holding `value`. The offset is set when it is appended.
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self { value: value.into(), offset: 0 }
    }

    /// Encode the record into bytes
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode a record from bytes
    pub fn decode(data: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(data)?)
    }
}
