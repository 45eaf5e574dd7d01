//! Disk file of slotted pages.
//!
//! A `SlottedPageFile` maps a gapless sequence of pages 0..N-1 onto one
//! random-access file: page `k` occupies bytes `[k * page_size,
//! (k + 1) * page_size)`. All I/O is synchronous and goes through a single
//! owned file handle.

use crate::error::{StorageError, StorageResult};
use crate::page::{PageId, SlottedPage};
use log::warn;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Counters for the I/O performed through one file handle. A seek is only
/// counted when the cursor actually moves; sequential access stays cheap.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IoStats {
    pub reads: u64,
    pub writes: u64,
    pub seeks: u64,
}

/// Sentinel for a cursor position that can no longer be trusted (a partial
/// read or write may have moved it). Never a valid page offset, so the next
/// access always performs a real seek.
const UNKNOWN_POS: u64 = u64::MAX;

/// One disk file holding slotted pages of a fixed size.
pub struct SlottedPageFile {
    path: PathBuf,
    file: File,
    page_size: usize,
    /// Tracked cursor position, so a seek to the current offset is elided.
    /// [`UNKNOWN_POS`] after a failed read, write, or seek.
    pos: u64,
    stats: IoStats,
}

impl SlottedPageFile {
    /// Opens the file at `path`, creating it if it does not exist. Existing
    /// contents are kept.
    pub fn open(path: impl AsRef<Path>, page_size: usize) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        Ok(Self {
            path,
            file,
            page_size,
            pos: 0,
            stats: IoStats::default(),
        })
    }

    /// The number of whole pages in the file.
    ///
    /// A file whose length is not a multiple of the page size is malformed;
    /// the trailing partial page is ignored and reported.
    pub fn page_count(&self) -> StorageResult<u32> {
        let len = self.file.metadata()?.len();
        if len % self.page_size as u64 != 0 {
            warn!(
                "{:?}: file length {} is not a multiple of page size {}",
                self.path, len, self.page_size
            );
        }
        Ok((len / self.page_size as u64) as u32)
    }

    /// Reads the page at `page_id`, or `None` if its byte range lies beyond
    /// the current end of the file.
    pub fn read_page(&mut self, page_id: PageId) -> StorageResult<Option<SlottedPage>> {
        let offset = self.page_offset(page_id);
        let len = self.file.metadata()?.len();
        if offset + self.page_size as u64 > len {
            return Ok(None);
        }
        self.seek_to(offset)?;
        let mut buf = vec![0u8; self.page_size];
        if let Err(e) = self.file.read_exact(&mut buf) {
            self.pos = UNKNOWN_POS;
            return Err(e.into());
        }
        self.pos = offset + self.page_size as u64;
        self.stats.reads += 1;
        SlottedPage::from_bytes(page_id, buf).map(Some)
    }

    /// Writes the page's full buffer at its fixed offset and syncs it to
    /// disk, growing the file if the page lies past the current end.
    pub fn write_page(&mut self, page: &SlottedPage) -> StorageResult<()> {
        if page.size() != self.page_size {
            return Err(StorageError::InvalidPageSize(page.size()));
        }
        let offset = self.page_offset(page.page_id());
        self.seek_to(offset)?;
        if let Err(e) = self.file.write_all(page.bytes()) {
            self.pos = UNKNOWN_POS;
            return Err(e.into());
        }
        self.pos = offset + self.page_size as u64;
        self.file.sync_all()?;
        self.stats.writes += 1;
        Ok(())
    }

    /// Truncates the file to zero length, keeping the handle open.
    pub fn clear(&mut self) -> StorageResult<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.pos = 0;
        Ok(())
    }

    /// Forces any buffered writes to disk.
    pub fn sync(&mut self) -> StorageResult<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Syncs and releases the file handle.
    pub fn close(mut self) -> StorageResult<()> {
        self.sync()
    }

    pub fn stats(&self) -> IoStats {
        self.stats
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn page_offset(&self, page_id: PageId) -> u64 {
        page_id.0 as u64 * self.page_size as u64
    }

    fn seek_to(&mut self, offset: u64) -> StorageResult<()> {
        if offset != self.pos {
            // Stays unknown if the seek itself fails.
            self.pos = UNKNOWN_POS;
            self.file.seek(SeekFrom::Start(offset))?;
            self.stats.seeks += 1;
            self.pos = offset;
        }
        Ok(())
    }
}

impl std::fmt::Debug for SlottedPageFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlottedPageFile")
            .field("path", &self.path)
            .field("page_size", &self.page_size)
            .field("stats", &self.stats)
            .finish()
    }
}
