//! Memory-mapped offset index.
//!
//! The index is a packed array of fixed-width entries:
//!
//! ```text
//! [relative offset: u32 BE][store position: u64 BE]   entry 0 at byte 0
//! [relative offset: u32 BE][store position: u64 BE]   entry 1 at byte 12
//! ...
//! ```
//!
//! A mapping cannot grow, so the file is extended to `max_index_bytes`
//! before it is mapped and truncated back to the written size on close.
//! An index that was never closed still carries that zero-filled tail;
//! opening it keeps only the prefix of entries that are in gapless order.

use crate::error::{Error, Result};
use bytes::{Buf, BufMut};
use memmap2::MmapMut;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Width of the relative offset field
pub const OFFSET_WIDTH: u64 = 4;
/// Width of the store position field
pub const POSITION_WIDTH: u64 = 8;
/// Width of a whole entry
pub const ENTRY_WIDTH: u64 = OFFSET_WIDTH + POSITION_WIDTH;

/// Fixed-capacity index mapping relative offsets to store positions
pub struct Index {
    /// Path to the index file
    path: PathBuf,
    /// Backing file, extended to the mapped capacity while open
    file: File,
    /// Writable shared mapping of the whole file. `None` once closed.
    mmap: Option<MmapMut>,
    /// Number of bytes holding written entries
    size: u64,
}

impl Index {
    /// Open or create an index file with room for `max_index_bytes`
    pub fn open<P: AsRef<Path>>(path: P, max_index_bytes: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        Self::from_file(file, path, max_index_bytes)
    }

    fn from_file(file: File, path: PathBuf, max_index_bytes: u64) -> Result<Self> {
        if max_index_bytes == 0 {
            return Err(Error::invalid_argument("max_index_bytes must be > 0"));
        }

        let file_len = file.metadata()?.len();
        if file_len > max_index_bytes {
            return Err(Error::invalid_argument(format!(
                "index {:?} holds {} bytes, more than max_index_bytes {}",
                path, file_len, max_index_bytes
            )));
        }

        file.set_len(max_index_bytes)?;

        // SAFETY: the file is owned by this index for the lifetime of the
        // mapping and is not resized until the mapping has been dropped.
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        let mut index = Self { path, file, mmap: Some(mmap), size: 0 };
        index.size = index.recover_size(file_len);
        Ok(index)
    }

    /// Work out how many bytes of the mapping hold real entries.
    fn recover_size(&self, file_len: u64) -> u64 {
        let whole = file_len - file_len % ENTRY_WIDTH;
        if whole != file_len {
            log::warn!(
                "Index {:?}: ignoring {} trailing bytes of a partial entry",
                self.path,
                file_len - whole
            );
        }

        let map = self.map();
        let mut prev_position = None;
        let mut entries = 0u64;
        while entries * ENTRY_WIDTH < whole {
            let (relative, position) = decode_entry(map, entries * ENTRY_WIDTH);
            if u64::from(relative) != entries {
                break;
            }
            if matches!(prev_position, Some(prev) if position <= prev) {
                break;
            }
            prev_position = Some(position);
            entries += 1;
        }

        let size = entries * ENTRY_WIDTH;
        if size < whole {
            log::warn!(
                "Index {:?}: discarded {} out-of-order entries after entry {}",
                self.path,
                (whole - size) / ENTRY_WIDTH,
                entries
            );
        }
        size
    }

    fn map(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }

    /// Read the entry at index `n`
    ///
    /// Returns the stored relative offset and store position.
    pub fn read(&self, n: u32) -> Result<(u32, u64)> {
        if self.size == 0 {
            return Err(Error::EndOfIndex);
        }

        let addr = u64::from(n) * ENTRY_WIDTH;
        if self.size < addr + ENTRY_WIDTH {
            return Err(Error::EndOfIndex);
        }

        Ok(decode_entry(self.map(), addr))
    }

    /// Read the last written entry
    pub fn read_last(&self) -> Result<(u32, u64)> {
        if self.size == 0 {
            return Err(Error::EndOfIndex);
        }
        self.read((self.size / ENTRY_WIDTH - 1) as u32)
    }

    /// Append an entry
    ///
    /// Callers must write relative offsets in order, starting at 0.
    pub fn write(&mut self, relative: u32, position: u64) -> Result<()> {
        if self.is_maxed() {
            return Err(Error::IndexFull);
        }

        let start = self.size as usize;
        let end = start + ENTRY_WIDTH as usize;
        let mmap = self.mmap.as_deref_mut().ok_or(Error::IndexFull)?;

        let mut slot = &mut mmap[start..end];
        slot.put_u32(relative);
        slot.put_u64(position);

        self.size += ENTRY_WIDTH;
        Ok(())
    }

    /// Returns true if there is no room for another entry
    pub fn is_maxed(&self) -> bool {
        self.capacity() < self.size + ENTRY_WIDTH
    }

    /// Drop every entry from index `entries` onward
    pub(crate) fn truncate(&mut self, entries: u64) {
        self.size = self.size.min(entries * ENTRY_WIDTH);
    }

    /// Flush the mapping and fsync the file without closing
    pub fn sync(&self) -> Result<()> {
        if let Some(mmap) = &self.mmap {
            mmap.flush()?;
        }
        self.file.sync_all()?;
        Ok(())
    }

    /// Get the number of bytes holding written entries
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Get the number of written entries
    pub fn len(&self) -> u64 {
        self.size / ENTRY_WIDTH
    }

    /// Returns true if no entry has been written
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Get the mapped capacity in bytes
    pub fn capacity(&self) -> u64 {
        self.map().len() as u64
    }

    /// Get the path to the index file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close the index: sync the mapping and the file, then truncate the
    /// file to the written entries
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    /// Runs every close step and reports the first failure.
    fn shutdown(&mut self) -> Result<()> {
        let Some(mmap) = self.mmap.take() else {
            return Ok(());
        };

        let mut first_err: Option<Error> = None;

        if let Err(e) = mmap.flush() {
            first_err.get_or_insert(e.into());
        }
        drop(mmap);

        if let Err(e) = self.file.sync_all() {
            first_err.get_or_insert(e.into());
        }

        if let Err(e) = self.file.set_len(self.size) {
            first_err.get_or_insert(e.into());
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for Index {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::warn!("Failed to close index {:?}: {}", self.path, e);
        }
    }
}

fn decode_entry(map: &[u8], addr: u64) -> (u32, u64) {
    let start = addr as usize;
    let mut entry = &map[start..start + ENTRY_WIDTH as usize];
    let relative = entry.get_u32();
    let position = entry.get_u64();
    (relative, position)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MAX_INDEX_BYTES: u64 = 1024;

    #[test]
    fn test_empty_index() {
        let dir = TempDir::new().unwrap();
        let index = Index::open(dir.path().join("0.index"), MAX_INDEX_BYTES).unwrap();

        assert_eq!(index.size(), 0);
        assert!(index.is_empty());
        assert_eq!(index.capacity(), MAX_INDEX_BYTES);
        assert!(matches!(index.read_last(), Err(Error::EndOfIndex)));
        assert!(matches!(index.read(0), Err(Error::EndOfIndex)));
    }

    #[test]
    fn test_write_and_read() {
        let dir = TempDir::new().unwrap();
        let mut index = Index::open(dir.path().join("0.index"), MAX_INDEX_BYTES).unwrap();

        let entries = [(0u32, 0u64), (1, 10), (2, 25)];
        for (relative, position) in entries {
            index.write(relative, position).unwrap();
        }

        assert_eq!(index.len(), 3);
        assert_eq!(index.size(), 3 * ENTRY_WIDTH);
        for (n, expected) in entries.iter().enumerate() {
            assert_eq!(index.read(n as u32).unwrap(), *expected);
        }
        assert_eq!(index.read_last().unwrap(), (2, 25));

        // Not yet written
        assert!(matches!(index.read(3), Err(Error::EndOfIndex)));
    }

    #[test]
    fn test_index_full() {
        let dir = TempDir::new().unwrap();
        let mut index = Index::open(dir.path().join("0.index"), ENTRY_WIDTH * 2).unwrap();

        index.write(0, 0).unwrap();
        assert!(!index.is_maxed());
        index.write(1, 16).unwrap();
        assert!(index.is_maxed());

        assert!(matches!(index.write(2, 32), Err(Error::IndexFull)));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_capacity_not_multiple_of_entry() {
        let dir = TempDir::new().unwrap();
        let mut index = Index::open(dir.path().join("0.index"), ENTRY_WIDTH + 5).unwrap();

        index.write(0, 0).unwrap();
        assert!(index.is_maxed());
        assert!(matches!(index.write(1, 9), Err(Error::IndexFull)));
    }

    #[test]
    fn test_close_truncates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0.index");

        let mut index = Index::open(&path, MAX_INDEX_BYTES).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), MAX_INDEX_BYTES);

        index.write(0, 0).unwrap();
        index.write(1, 20).unwrap();
        index.close().unwrap();

        let raw = std::fs::read(&path).unwrap();
        assert_eq!(raw.len() as u64, 2 * ENTRY_WIDTH);
        assert_eq!(u32::from_be_bytes(raw[12..16].try_into().unwrap()), 1);
        assert_eq!(u64::from_be_bytes(raw[16..24].try_into().unwrap()), 20);
    }

    #[test]
    fn test_reopen_recovers_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0.index");

        {
            let mut index = Index::open(&path, MAX_INDEX_BYTES).unwrap();
            for i in 0..5u32 {
                index.write(i, u64::from(i) * 100).unwrap();
            }
            index.close().unwrap();
        }

        let mut index = Index::open(&path, MAX_INDEX_BYTES).unwrap();
        assert_eq!(index.len(), 5);
        assert_eq!(index.read_last().unwrap(), (4, 400));

        index.write(5, 500).unwrap();
        assert_eq!(index.read(5).unwrap(), (5, 500));
    }

    #[test]
    fn test_unclosed_index_discards_zero_tail() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0.index");

        {
            let mut index = Index::open(&path, MAX_INDEX_BYTES).unwrap();
            index.write(0, 0).unwrap();
            index.write(1, 30).unwrap();
            index.sync().unwrap();
            // Skip the truncating close
            std::mem::forget(index);
        }
        assert_eq!(std::fs::metadata(&path).unwrap().len(), MAX_INDEX_BYTES);

        let index = Index::open(&path, MAX_INDEX_BYTES).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.read_last().unwrap(), (1, 30));
    }

    #[test]
    fn test_partial_trailing_entry_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0.index");

        {
            let mut index = Index::open(&path, MAX_INDEX_BYTES).unwrap();
            index.write(0, 0).unwrap();
            index.close().unwrap();
        }
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(ENTRY_WIDTH + 7).unwrap();
        drop(file);

        let index = Index::open(&path, MAX_INDEX_BYTES).unwrap();
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_oversized_file_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0.index");

        {
            let mut index = Index::open(&path, MAX_INDEX_BYTES).unwrap();
            for i in 0..4u32 {
                index.write(i, u64::from(i) * 10).unwrap();
            }
            index.close().unwrap();
        }

        let result = Index::open(&path, ENTRY_WIDTH * 2);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_drop_truncates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0.index");

        {
            let mut index = Index::open(&path, MAX_INDEX_BYTES).unwrap();
            index.write(0, 0).unwrap();
        }

        assert_eq!(std::fs::metadata(&path).unwrap().len(), ENTRY_WIDTH);
    }
}
