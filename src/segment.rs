//! Log segment: one store plus one index covering a contiguous offset range.
//!
//! Both files are named after the segment's base offset:
//!
//! ```text
//! {base_offset}.store   length-prefixed record frames
//! {base_offset}.index   relative offset -> store position
//! ```

use crate::config::SegmentConfig;
use crate::error::{Error, Result};
use crate::index::Index;
use crate::record::Record;
use crate::store::Store;
use std::path::Path;

/// Extension of store files
pub const STORE_SUFFIX: &str = ".store";
/// Extension of index files
pub const INDEX_SUFFIX: &str = ".index";

/// A store and its index, addressed by absolute offsets
pub struct Segment {
    store: Store,
    index: Index,
    base_offset: u64,
    next_offset: u64,
    config: SegmentConfig,
}

impl Segment {
    /// Open or create the segment starting at `base_offset` in `dir`
    ///
    /// The next offset is recovered from the last index entry, so opening an
    /// existing segment resumes exactly where it left off.
    pub fn open<P: AsRef<Path>>(dir: P, base_offset: u64, config: &SegmentConfig) -> Result<Self> {
        let dir = dir.as_ref();

        let store = Store::open(dir.join(store_filename(base_offset)))?;
        let index = Index::open(dir.join(index_filename(base_offset)), config.max_index_bytes)?;

        let mut segment = Self {
            store,
            index,
            base_offset,
            next_offset: base_offset,
            config: config.clone(),
        };
        segment.recover_tail()?;

        segment.next_offset = match segment.index.read_last() {
            Ok((relative, _)) => base_offset + u64::from(relative) + 1,
            Err(Error::EndOfIndex) => base_offset,
            Err(e) => return Err(e),
        };

        log::debug!(
            "Opened segment {} (next offset {}, store {} bytes, index {} entries)",
            base_offset,
            segment.next_offset,
            segment.store.size(),
            segment.index.len()
        );

        Ok(segment)
    }

    /// Drop trailing index entries whose frames are missing or torn, then cut
    /// any partial frame off the end of the store.
    ///
    /// Whole frames written after the last indexed one are kept.
    fn recover_tail(&mut self) -> Result<()> {
        let store_size = self.store.size();
        let mut keep = self.index.len();
        let mut end = 0;
        while keep > 0 {
            let (_, position) = self.index.read((keep - 1) as u32)?;
            if let Some(frame_end) = self.store.frame_end(position)? {
                end = frame_end;
                break;
            }
            keep -= 1;
        }

        if keep < self.index.len() {
            log::warn!(
                "Segment {}: discarding {} index entries without a whole store frame",
                self.base_offset,
                self.index.len() - keep
            );
            self.index.truncate(keep);
        }

        while let Some(frame_end) = self.store.frame_end(end)? {
            end = frame_end;
        }
        if end < store_size {
            log::warn!(
                "Segment {}: cutting {} torn bytes off the store",
                self.base_offset,
                store_size - end
            );
            self.store.truncate(end)?;
        }
        Ok(())
    }

    /// Append a record, stamping it with the next offset
    ///
    /// Returns the assigned offset. Fails with `SegmentMaxed` without
    /// touching either file when the index has no room left.
    pub fn append(&mut self, mut record: Record) -> Result<u64> {
        let offset = self.next_offset;
        let relative = u32::try_from(offset - self.base_offset)
            .map_err(|_| Error::SegmentMaxed { base_offset: self.base_offset })?;
        if self.index.is_maxed() {
            return Err(Error::SegmentMaxed { base_offset: self.base_offset });
        }

        record.offset = offset;
        let encoded = record.encode()?;

        let (_, position) = self.store.append(&encoded)?;
        self.index.write(relative, position)?;

        self.next_offset += 1;
        Ok(offset)
    }

    /// Read the record at absolute `offset`
    pub fn read(&mut self, offset: u64) -> Result<Record> {
        let relative = offset.checked_sub(self.base_offset).ok_or(Error::InvalidOffset {
            offset,
            base_offset: self.base_offset,
        })?;
        let relative = u32::try_from(relative).map_err(|_| Error::EndOfIndex)?;

        let (_, position) = self.index.read(relative)?;
        let data = self.store.read(position)?;
        Record::decode(&data)
    }

    /// Returns true once the store or the index reached its configured limit
    pub fn is_maxed(&self) -> bool {
        self.store.size() >= self.config.max_store_bytes
            || self.index.size() >= self.config.max_index_bytes
            || self.index.is_maxed()
            || self.next_offset - self.base_offset > u64::from(u32::MAX)
    }

    /// Returns true if `offset` was assigned by this segment
    pub fn contains(&self, offset: u64) -> bool {
        self.base_offset <= offset && offset < self.next_offset
    }

    /// Get the offset of the first record
    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    /// Get the offset the next record will receive
    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    /// Get the store size in bytes
    pub fn store_size(&self) -> u64 {
        self.store.size()
    }

    /// Get the used index size in bytes
    pub fn index_size(&self) -> u64 {
        self.index.size()
    }

    /// Get the path to the store file
    pub fn store_path(&self) -> &Path {
        self.store.path()
    }

    /// Flush buffered store frames without syncing
    pub(crate) fn flush(&mut self) -> Result<()> {
        self.store.flush()
    }

    /// Flush and fsync both files without closing
    pub fn sync(&mut self) -> Result<()> {
        self.store.sync()?;
        self.index.sync()
    }

    /// Close the segment and delete its files
    pub fn remove(self) -> Result<()> {
        let store_path = self.store.path().to_path_buf();
        let index_path = self.index.path().to_path_buf();
        let base_offset = self.base_offset;

        self.close()?;
        std::fs::remove_file(&index_path)?;
        std::fs::remove_file(&store_path)?;

        log::debug!("Removed segment {}", base_offset);
        Ok(())
    }

    /// Close the index and then the store
    ///
    /// Both are closed even if the first fails; the first error is returned.
    pub fn close(self) -> Result<()> {
        let index_result = self.index.close();
        let store_result = self.store.close();
        index_result.and(store_result)
    }
}

/// Generate the store filename for a segment
pub fn store_filename(base_offset: u64) -> String {
    format!("{}{}", base_offset, STORE_SUFFIX)
}

/// Generate the index filename for a segment
pub fn index_filename(base_offset: u64) -> String {
    format!("{}{}", base_offset, INDEX_SUFFIX)
}

/// Parse a store or index filename to extract the base offset
pub fn parse_segment_filename(filename: &str) -> Option<u64> {
    let name = filename
        .strip_suffix(STORE_SUFFIX)
        .or_else(|| filename.strip_suffix(INDEX_SUFFIX))?;
    name.parse().ok()
}
