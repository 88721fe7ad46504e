//! Append-only store file.
//!
//! A store is a concatenation of length-prefixed frames:
//!
//! ```text
//! [length: u64 big-endian][payload: length bytes]
//! [length: u64 big-endian][payload: length bytes]
//! ...
//! ```
//!
//! Writes go through a buffered writer; every read flushes it first so a
//! frame is readable as soon as `append` returns.

use crate::error::{Error, Result};
use bytes::{BufMut, BytesMut};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Width of the length prefix in front of every frame
pub const LEN_WIDTH: u64 = 8;

/// Append-only file of length-prefixed frames
pub struct Store {
    /// Path to the store file
    path: PathBuf,
    /// Buffered writer over the file, opened in append mode
    writer: BufWriter<File>,
    /// Current file size, including bytes still buffered
    size: u64,
}

impl Store {
    /// Open or create a store file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new().read(true).create(true).append(true).open(&path)?;

        let size = file.metadata()?.len();
        let writer = BufWriter::new(file);

        Ok(Self { path, writer, size })
    }

    /// Append a frame holding `payload`
    ///
    /// Returns the number of bytes written and the position the frame
    /// starts at.
    pub fn append(&mut self, payload: &[u8]) -> Result<(u64, u64)> {
        let position = self.size;

        let mut frame = BytesMut::with_capacity(LEN_WIDTH as usize + payload.len());
        frame.put_u64(payload.len() as u64);
        frame.put_slice(payload);

        self.writer.write_all(&frame)?;

        let written = frame.len() as u64;
        self.size += written;
        Ok((written, position))
    }

    /// Read the payload of the frame starting at `position`
    pub fn read(&mut self, position: u64) -> Result<Vec<u8>> {
        if position >= self.size {
            return Err(Error::EndOfStore { position });
        }

        self.writer.flush()?;

        let mut file = self.writer.get_ref();
        file.seek(SeekFrom::Start(position))?;

        let mut len_buf = [0u8; LEN_WIDTH as usize];
        file.read_exact(&mut len_buf)?;
        let len = u64::from_be_bytes(len_buf);

        let available = self.size.saturating_sub(position + LEN_WIDTH);
        if len > available {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "frame at {} claims {} bytes but only {} remain in {:?}",
                    position, len, available, self.path
                ),
            )));
        }

        let mut payload = vec![0u8; len as usize];
        file.read_exact(&mut payload)?;
        Ok(payload)
    }

    /// Get the end of the frame starting at `position`
    ///
    /// Returns `None` when the frame's header or payload runs past the end
    /// of the store.
    pub fn frame_end(&mut self, position: u64) -> Result<Option<u64>> {
        match position.checked_add(LEN_WIDTH) {
            Some(header_end) if header_end <= self.size => {}
            _ => return Ok(None),
        }

        self.writer.flush()?;

        let mut file = self.writer.get_ref();
        file.seek(SeekFrom::Start(position))?;

        let mut len_buf = [0u8; LEN_WIDTH as usize];
        file.read_exact(&mut len_buf)?;
        let len = u64::from_be_bytes(len_buf);

        Ok((position + LEN_WIDTH)
            .checked_add(len)
            .filter(|end| *end <= self.size))
    }

    /// Cut the store back to `size` bytes
    pub fn truncate(&mut self, size: u64) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().set_len(size)?;
        self.size = size;
        Ok(())
    }

    /// Flush buffered frames to the file
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Flush and fsync the store to persistent storage
    pub fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Get the current store size, the position of the next frame
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Get the path to the store file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Close the store, flushing all data
    pub fn close(mut self) -> Result<()> {
        self.sync()
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        // Best effort flush on drop
        let _ = self.writer.flush();
    }
}
