//! The log: an ordered sequence of segments presented as one offset range.
//!
//! ## Architecture
//!
//! - **Active segment**: the newest segment, the only one receiving appends
//! - **Rotation**: after an append leaves the active segment maxed, a new
//!   segment starting at its next offset becomes active
//! - **Retention**: `truncate` drops whole leading segments
//! - **Recovery**: on open, every segment in the directory is re-opened and
//!   recovers its next offset from its index
//!
//! All segment access goes through one mutex, so concurrent appends never
//! share an offset and readers never see a half-created segment.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::record::Record;
use crate::segment::{parse_segment_filename, Segment};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, Read, Take};
use std::path::{Path, PathBuf};

/// A segmented, append-only record log.
///
/// # Thread Safety
///
/// `Log` is safe to share across threads using `Arc<Log>`.
pub struct Log {
    /// Directory holding the segment files
    dir: PathBuf,

    /// Configuration options
    config: Config,

    /// Segments sorted by base offset; the last one is active
    segments: Mutex<Vec<Segment>>,
}

impl Log {
    /// Opens the log stored in `dir`, creating the directory if needed.
    ///
    /// Existing segments are re-opened in base offset order. An empty
    /// directory gets a single segment starting at
    /// `config.segment.initial_offset`.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use seglog::{Config, Log};
    ///
    /// # fn main() -> Result<(), seglog::Error> {
    /// let log = Log::open("./data", Config::default())?;
    /// let offset = log.append(b"hello")?;
    /// assert_eq!(log.read(offset)?.value, b"hello".to_vec());
    /// # Ok(())
    /// # }
    /// ```
    pub fn open<P: AsRef<Path>>(dir: P, config: Config) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        config.validate()?;

        std::fs::create_dir_all(&dir)?;

        let mut base_offsets = BTreeSet::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if let Some(base_offset) = entry.file_name().to_str().and_then(parse_segment_filename)
            {
                base_offsets.insert(base_offset);
            }
        }

        let mut segments = Vec::with_capacity(base_offsets.len().max(1));
        for base_offset in base_offsets {
            segments.push(Segment::open(&dir, base_offset, &config.segment)?);
        }

        let needs_segment = match segments.last() {
            None => Some(config.segment.initial_offset),
            Some(last) if last.is_maxed() => Some(last.next_offset()),
            Some(_) => None,
        };
        if let Some(base_offset) = needs_segment {
            segments.push(Segment::open(&dir, base_offset, &config.segment)?);
        }

        if let (Some(first), Some(last)) = (segments.first(), segments.last()) {
            log::info!(
                "Opened log {:?}: {} segments, offsets [{}, {})",
                dir,
                segments.len(),
                first.base_offset(),
                last.next_offset()
            );
        }

        Ok(Self { dir, config, segments: Mutex::new(segments) })
    }

    /// Appends `value` and returns the offset assigned to it.
    ///
    /// Rotation is checked after the write, so a segment may overshoot its
    /// store limit by one record.
    pub fn append(&self, value: &[u8]) -> Result<u64> {
        let mut segments = self.segments.lock();

        if active(&mut segments)?.is_maxed() {
            self.rotate(&mut segments)?;
        }

        let offset = active(&mut segments)?.append(Record::new(value))?;

        if active(&mut segments)?.is_maxed() {
            // The record is already stored; the next append retries the rotation.
            if let Err(e) = self.rotate(&mut segments) {
                log::warn!("Failed to rotate log {:?} after offset {}: {}", self.dir, offset, e);
            }
        }

        Ok(offset)
    }

    /// Starts a new active segment at the current active segment's next offset.
    fn rotate(&self, segments: &mut Vec<Segment>) -> Result<()> {
        let base_offset = active(segments)?.next_offset();
        let segment = Segment::open(&self.dir, base_offset, &self.config.segment)?;
        segments.push(segment);

        log::info!("Rotated log {:?} to new segment {}", self.dir, base_offset);
        Ok(())
    }

    /// Reads the record at `offset`.
    ///
    /// Fails with `OffsetNotFound` when no retained segment covers it.
    pub fn read(&self, offset: u64) -> Result<Record> {
        let mut segments = self.segments.lock();

        let idx = segments.partition_point(|s| s.base_offset() <= offset);
        match idx.checked_sub(1).and_then(|i| segments.get_mut(i)) {
            Some(segment) if segment.contains(offset) => segment.read(offset),
            _ => Err(Error::OffsetNotFound { offset }),
        }
    }

    /// Get the base offset of the oldest retained segment
    pub fn lowest_offset(&self) -> u64 {
        self.segments.lock().first().map_or(0, Segment::base_offset)
    }

    /// Get the last assigned offset, or `None` if nothing was ever appended
    ///
    /// Truncation does not lower it, even when no records remain.
    pub fn highest_offset(&self) -> Option<u64> {
        let segments = self.segments.lock();
        let first = segments.first()?;
        let last = segments.last()?;
        if last.next_offset() == first.base_offset()
            && first.base_offset() == self.config.segment.initial_offset
        {
            return None;
        }
        last.next_offset().checked_sub(1)
    }

    /// Removes every leading segment whose records all have offsets at or
    /// below `lowest`. The active segment is never removed.
    pub fn truncate(&self, lowest: u64) -> Result<()> {
        let mut segments = self.segments.lock();

        let mut removed = 0;
        while segments.len() > 1 && segments[0].next_offset() <= lowest.saturating_add(1) {
            segments.remove(0).remove()?;
            removed += 1;
        }

        if removed > 0 {
            log::info!(
                "Truncated log {:?}: removed {} segments up to offset {}",
                self.dir,
                removed,
                lowest
            );
        }
        Ok(())
    }

    /// Returns a reader over the raw store frames of every segment, oldest
    /// first.
    ///
    /// The reader covers the bytes present when it is created.
    pub fn reader(&self) -> Result<LogReader> {
        let mut segments = self.segments.lock();

        let mut stores = Vec::with_capacity(segments.len());
        for segment in segments.iter_mut() {
            segment.flush()?;
            let file = File::open(segment.store_path())?;
            stores.push(file.take(segment.store_size()));
        }

        Ok(LogReader { stores, current: 0 })
    }

    /// Flush and fsync every segment without closing the log
    pub fn sync(&self) -> Result<()> {
        let mut segments = self.segments.lock();
        for segment in segments.iter_mut() {
            segment.sync()?;
        }
        Ok(())
    }

    /// Get the base offsets of all retained segments, oldest first
    pub fn segment_base_offsets(&self) -> Vec<u64> {
        self.segments.lock().iter().map(Segment::base_offset).collect()
    }

    /// Get the log directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Get the configuration the log was opened with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Closes every segment.
    ///
    /// All segments are closed even if one fails; the first error is returned.
    pub fn close(self) -> Result<()> {
        let segments = self.segments.into_inner();
        let mut first_err = None;
        for segment in segments {
            if let Err(e) = segment.close() {
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Closes the log and deletes its directory
    pub fn remove(self) -> Result<()> {
        let dir = self.dir.clone();
        self.close()?;
        std::fs::remove_dir_all(&dir)?;

        log::info!("Removed log {:?}", dir);
        Ok(())
    }

    /// Removes the log and opens an empty one in the same directory
    pub fn reset(self) -> Result<Self> {
        let dir = self.dir.clone();
        let config = self.config.clone();
        self.remove()?;
        Self::open(dir, config)
    }
}

fn active(segments: &mut [Segment]) -> Result<&mut Segment> {
    segments
        .last_mut()
        .ok_or_else(|| Error::corruption("log has no active segment"))
}

/// Sequential reader over the store files of a log
///
/// Yields the raw `[length][record]` frames back to back, segment after
/// segment.
pub struct LogReader {
    stores: Vec<Take<File>>,
    current: usize,
}

impl Read for LogReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while let Some(store) = self.stores.get_mut(self.current) {
            let n = store.read(buf)?;
            if n > 0 || buf.is_empty() {
                return Ok(n);
            }
            self.current += 1;
        }
        Ok(0)
    }
}
