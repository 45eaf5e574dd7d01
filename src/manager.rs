//! The file/location manager: one slotted page file per file id, with records
//! addressed by [`Location`].
//!
//! All operations are synchronous and take `&mut self`; the engine has no
//! internal concurrency, and callers running operations against the same
//! manager from several threads must serialize them (an external buffer pool
//! is the natural place for per-page locking).

use crate::buffer::PageBuffer;
use crate::disk::{IoStats, SlottedPageFile};
use crate::error::{StorageError, StorageResult};
use crate::location::Location;
use crate::page::{PageId, SlottedPage, MIN_PAGE_SIZE};
use bytes::Bytes;
use log::debug;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Owns every open slotted page file and dispatches record operations to the
/// right page. Files live under one directory, named `<file_id>.dat`, and are
/// opened lazily on first use; a handle stays open until [`FileManager::shutdown`].
pub struct FileManager {
    dir: PathBuf,
    page_size: usize,
    files: HashMap<u32, SlottedPageFile>,
}

impl FileManager {
    /// Opens a manager rooted at `dir` (created if missing) with the given
    /// page size.
    pub fn open(dir: impl AsRef<Path>, page_size: usize) -> StorageResult<Self> {
        if !(MIN_PAGE_SIZE..=i32::MAX as usize).contains(&page_size) {
            return Err(StorageError::InvalidPageSize(page_size));
        }
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            page_size,
            files: HashMap::new(),
        })
    }

    /// The first location in any file: page 0, slot 0.
    pub fn first_location(&self) -> Location {
        Location::FIRST
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Appends `record` at the end of the file, returning its location.
    ///
    /// The record goes into the last page; if it does not fit there even
    /// after compaction, a fresh page is allocated and the record lands at
    /// slot 0 of that page. The mutated page is persisted before returning.
    pub fn add(&mut self, file_id: u32, record: &[u8]) -> StorageResult<Location> {
        let page_size = self.page_size;
        let file = self.file(file_id)?;
        let page_count = file.page_count()?;

        let mut page = if page_count == 0 {
            SlottedPage::new(PageId(0), page_size)
        } else {
            let last = PageId(page_count - 1);
            file.read_page(last)?.ok_or_else(|| {
                StorageError::CorruptPage(format!("page {last} vanished from file {file_id}"))
            })?
        };
        let slot = match page.add(record) {
            Ok(slot) => slot,
            Err(StorageError::Overflow { .. }) => {
                let next = PageId(page.page_id().0 + 1);
                debug!("file {file_id}: page {} is full, allocating page {next}", page.page_id());
                page = SlottedPage::new(next, page_size);
                page.add(record)?
            }
            Err(e) => return Err(e),
        };
        file.write_page(&page)?;
        Ok(Location::new(page.page_id(), slot))
    }

    /// Returns the record at `location`, or `None` if it was removed.
    ///
    /// A location whose page does not exist, or whose slot index lies past
    /// the page's entry count, is an [`StorageError::InvalidLocation`]; only
    /// a genuinely tombstoned slot reads as absent.
    pub fn get(&mut self, file_id: u32, location: Location) -> StorageResult<Option<Bytes>> {
        self.validate(file_id, location)?;
        let file = self.file(file_id)?;
        let page = file
            .read_page(location.page_id())?
            .ok_or_else(|| invalid_location(file_id, location))?;
        match page.get(location.slot()) {
            Ok(Some(record)) => Ok(Some(Bytes::copy_from_slice(record))),
            Ok(None) => Ok(None),
            Err(StorageError::OutOfRange { .. }) => Err(invalid_location(file_id, location)),
            Err(e) => Err(e),
        }
    }

    /// Puts `record` at `location`, returning the previous record there.
    ///
    /// A put addressed at a page that does not exist yet creates that page;
    /// pages skipped over grow into the file as blanks. The mutated page is
    /// persisted before returning.
    pub fn put(
        &mut self,
        file_id: u32,
        location: Location,
        record: &[u8],
    ) -> StorageResult<Option<Bytes>> {
        self.validate(file_id, location)?;
        let page_size = self.page_size;
        let file = self.file(file_id)?;
        let mut page = match file.read_page(location.page_id())? {
            Some(page) => page,
            None => SlottedPage::new(location.page_id(), page_size),
        };
        let old = match page.put(location.slot(), record) {
            Ok(old) => old,
            Err(StorageError::OutOfRange { .. }) => {
                return Err(invalid_location(file_id, location))
            }
            Err(e) => return Err(e),
        };
        file.write_page(&page)?;
        Ok(old)
    }

    /// Removes the record at `location`, returning it. Removing an already
    /// absent record returns `None` and leaves the file untouched.
    pub fn remove(&mut self, file_id: u32, location: Location) -> StorageResult<Option<Bytes>> {
        self.validate(file_id, location)?;
        let file = self.file(file_id)?;
        let mut page = file
            .read_page(location.page_id())?
            .ok_or_else(|| invalid_location(file_id, location))?;
        match page.remove(location.slot()) {
            Ok(Some(old)) => {
                file.write_page(&page)?;
                Ok(Some(old))
            }
            Ok(None) => Ok(None),
            Err(StorageError::OutOfRange { .. }) => Err(invalid_location(file_id, location)),
            Err(e) => Err(e),
        }
    }

    /// Removes all data from the file.
    pub fn clear(&mut self, file_id: u32) -> StorageResult<()> {
        self.file(file_id)?.clear()
    }

    /// Iterates over every live record of the file in increasing page order,
    /// then increasing slot order within a page. Each call starts a fresh
    /// pass from page 0, slot 0.
    pub fn iter(&mut self, file_id: u32) -> StorageResult<FileIter<'_>> {
        let file = self.file(file_id)?;
        Ok(FileIter {
            file,
            page: None,
            next_page: 0,
            next_slot: 0,
            done: false,
        })
    }

    /// I/O counters for the file, if it has been opened.
    pub fn io_stats(&self, file_id: u32) -> Option<IoStats> {
        self.files.get(&file_id).map(|file| file.stats())
    }

    /// Syncs and closes every open file. Consuming `self` makes a second
    /// shutdown unrepresentable.
    pub fn shutdown(mut self) -> StorageResult<()> {
        for (_, file) in self.files.drain() {
            file.close()?;
        }
        Ok(())
    }

    fn file(&mut self, file_id: u32) -> StorageResult<&mut SlottedPageFile> {
        match self.files.entry(file_id) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let path = self.dir.join(format!("{file_id}.dat"));
                let file = SlottedPageFile::open(path, self.page_size)?;
                Ok(entry.insert(file))
            }
        }
    }

    /// A file id or location half with the high bit set is outside the
    /// addressable range and always rejected.
    fn validate(&self, file_id: u32, location: Location) -> StorageResult<()> {
        let high_bit = 1u32 << 31;
        if file_id & high_bit != 0
            || location.page_id().0 & high_bit != 0
            || location.slot() & high_bit != 0
        {
            return Err(invalid_location(file_id, location));
        }
        Ok(())
    }
}

fn invalid_location(file_id: u32, location: Location) -> StorageError {
    StorageError::InvalidLocation { file_id, location }
}

/// The write-through rendition of the cache collaborator interface: fetching
/// reads straight from disk and marking dirty writes straight back. An
/// external buffer pool implementing [`PageBuffer`] can replace this without
/// changing the manager's contract.
impl PageBuffer for FileManager {
    fn fetch(&mut self, file_id: u32, page_id: PageId) -> StorageResult<Option<SlottedPage>> {
        self.file(file_id)?.read_page(page_id)
    }

    fn mark_dirty(&mut self, file_id: u32, page: &SlottedPage) -> StorageResult<()> {
        self.file(file_id)?.write_page(page)
    }

    fn flush(&mut self, file_id: u32) -> StorageResult<()> {
        self.file(file_id)?.sync()
    }
}

/// Lazy iterator over all live records of one file, crossing page boundaries
/// transparently and stopping at the first page that does not exist.
pub struct FileIter<'a> {
    file: &'a mut SlottedPageFile,
    page: Option<SlottedPage>,
    next_page: u32,
    next_slot: u32,
    done: bool,
}

impl Iterator for FileIter<'_> {
    type Item = StorageResult<(Location, Bytes)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            if self.page.is_none() {
                match self.file.read_page(PageId(self.next_page)) {
                    Ok(Some(page)) => {
                        self.next_slot = 0;
                        self.page = Some(page);
                    }
                    Ok(None) => {
                        self.done = true;
                        return None;
                    }
                    Err(e) => {
                        self.done = true;
                        return Some(Err(e));
                    }
                }
            }
            if let Some(page) = &self.page {
                let count = match page.entry_count() {
                    Ok(count) => count,
                    Err(e) => {
                        self.done = true;
                        return Some(Err(e));
                    }
                };
                while self.next_slot < count {
                    let slot = self.next_slot;
                    self.next_slot += 1;
                    match page.get(slot) {
                        Ok(Some(record)) => {
                            let location = Location::new(page.page_id(), slot);
                            return Some(Ok((location, Bytes::copy_from_slice(record))));
                        }
                        Ok(None) => continue,
                        Err(e) => {
                            self.done = true;
                            return Some(Err(e));
                        }
                    }
                }
            }
            self.page = None;
            self.next_page += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    const PAGE_SIZE: usize = 128;

    #[test]
    fn test_add_and_get_roundtrip() -> Result<()> {
        let dir = tempdir()?;
        let mut manager = FileManager::open(dir.path(), PAGE_SIZE)?;

        let location = manager.add(0, b"hello")?;
        assert_eq!(location, Location::new(PageId(0), 0));
        assert_eq!(manager.get(0, location)?, Some(Bytes::from_static(b"hello")));
        Ok(())
    }

    #[test]
    fn test_first_location() -> Result<()> {
        let dir = tempdir()?;
        let manager = FileManager::open(dir.path(), PAGE_SIZE)?;
        assert_eq!(manager.first_location(), Location::new(PageId(0), 0));
        Ok(())
    }

    #[test]
    fn test_open_rejects_bad_page_size() -> Result<()> {
        let dir = tempdir()?;
        assert!(matches!(
            FileManager::open(dir.path(), 8),
            Err(StorageError::InvalidPageSize(8))
        ));
        Ok(())
    }

    #[test]
    fn test_overflow_allocates_next_page() -> Result<()> {
        let dir = tempdir()?;
        let mut manager = FileManager::open(dir.path(), PAGE_SIZE)?;

        // 128-byte pages: 120 usable, 58 per 50-byte record. Two fit.
        let record = [0x5A_u8; 50];
        assert_eq!(manager.add(0, &record)?, Location::new(PageId(0), 0));
        assert_eq!(manager.add(0, &record)?, Location::new(PageId(0), 1));

        // The third overflows page 0 and lands at slot 0 of page 1.
        assert_eq!(manager.add(0, &record)?, Location::new(PageId(1), 0));
        assert_eq!(manager.add(0, &record)?, Location::new(PageId(1), 1));
        Ok(())
    }

    #[test]
    fn test_record_larger_than_page_overflows() -> Result<()> {
        let dir = tempdir()?;
        let mut manager = FileManager::open(dir.path(), PAGE_SIZE)?;
        let oversized = vec![0u8; PAGE_SIZE];
        assert!(matches!(
            manager.add(0, &oversized),
            Err(StorageError::Overflow { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_remove_is_tombstone_stable() -> Result<()> {
        let dir = tempdir()?;
        let mut manager = FileManager::open(dir.path(), PAGE_SIZE)?;

        let location = manager.add(0, b"ephemeral")?;
        assert_eq!(
            manager.remove(0, location)?,
            Some(Bytes::from_static(b"ephemeral"))
        );

        // Absent, not an error; a second remove has no further effect.
        assert_eq!(manager.get(0, location)?, None);
        assert_eq!(manager.remove(0, location)?, None);
        Ok(())
    }

    #[test]
    fn test_put_returns_previous_record() -> Result<()> {
        let dir = tempdir()?;
        let mut manager = FileManager::open(dir.path(), PAGE_SIZE)?;

        let location = manager.add(0, b"before")?;
        let old = manager.put(0, location, b"after")?;
        assert_eq!(old, Some(Bytes::from_static(b"before")));
        assert_eq!(manager.get(0, location)?, Some(Bytes::from_static(b"after")));
        Ok(())
    }

    #[test]
    fn test_put_creates_missing_page() -> Result<()> {
        let dir = tempdir()?;
        let mut manager = FileManager::open(dir.path(), PAGE_SIZE)?;

        let location = Location::new(PageId(3), 0);
        assert_eq!(manager.put(0, location, b"far out")?, None);
        assert_eq!(
            manager.get(0, location)?,
            Some(Bytes::from_static(b"far out"))
        );

        // Appends keep going to the real last page.
        let appended = manager.add(0, b"appended")?;
        assert_eq!(appended.page_id(), PageId(3));
        Ok(())
    }

    #[test]
    fn test_put_overflow_surfaces_to_the_caller() -> Result<()> {
        let dir = tempdir()?;
        let mut manager = FileManager::open(dir.path(), PAGE_SIZE)?;

        let location = manager.add(0, b"small")?;
        let oversized = vec![0u8; PAGE_SIZE];
        assert!(matches!(
            manager.put(0, location, &oversized),
            Err(StorageError::Overflow { .. })
        ));
        // The record at that location is untouched by the failed put.
        assert_eq!(manager.get(0, location)?, Some(Bytes::from_static(b"small")));
        Ok(())
    }

    #[test]
    fn test_invalid_locations_are_rejected() -> Result<()> {
        let dir = tempdir()?;
        let mut manager = FileManager::open(dir.path(), PAGE_SIZE)?;
        manager.add(0, b"present")?;

        // High bit set in the file id, page half, or slot half.
        let bad_file = 1u32 << 31;
        let bad_page = Location::new(PageId(1 << 31), 0);
        let bad_slot = Location::from_raw(1u64 << 31);
        let good = Location::FIRST;

        for (file_id, location) in [(bad_file, good), (0, bad_page), (0, bad_slot)] {
            assert!(matches!(
                manager.get(file_id, location),
                Err(StorageError::InvalidLocation { .. })
            ));
            assert!(matches!(
                manager.remove(file_id, location),
                Err(StorageError::InvalidLocation { .. })
            ));
            assert!(matches!(
                manager.put(file_id, location, b"x"),
                Err(StorageError::InvalidLocation { .. })
            ));
        }
        Ok(())
    }

    #[test]
    fn test_missing_page_is_invalid_location() -> Result<()> {
        let dir = tempdir()?;
        let mut manager = FileManager::open(dir.path(), PAGE_SIZE)?;
        manager.add(0, b"page zero exists")?;

        let missing = Location::new(PageId(9), 0);
        assert!(matches!(
            manager.get(0, missing),
            Err(StorageError::InvalidLocation { .. })
        ));

        // A slot past the entry count on an existing page is also invalid.
        let bad_slot = Location::new(PageId(0), 42);
        assert!(matches!(
            manager.get(0, bad_slot),
            Err(StorageError::InvalidLocation { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_iter_crosses_page_boundaries_in_order() -> Result<()> {
        let dir = tempdir()?;
        let mut manager = FileManager::open(dir.path(), PAGE_SIZE)?;

        // 50-byte records, two per page; five spread over three pages.
        let mut added = Vec::new();
        for i in 0..5u8 {
            let record = [i; 50];
            added.push((manager.add(0, &record)?, Bytes::copy_from_slice(&record)));
        }
        assert_eq!(added[4].0.page_id(), PageId(2));

        let seen: Vec<(Location, Bytes)> = manager.iter(0)?.collect::<StorageResult<_>>()?;
        assert_eq!(seen, added);

        // Locations come out in increasing (page, slot) order.
        assert!(seen.windows(2).all(|pair| pair[0].0 < pair[1].0));
        Ok(())
    }

    #[test]
    fn test_iter_skips_removed_and_blank_pages() -> Result<()> {
        let dir = tempdir()?;
        let mut manager = FileManager::open(dir.path(), PAGE_SIZE)?;

        // A record on page 4 only: pages 0..4 grow in as blanks.
        let far = Location::new(PageId(4), 0);
        manager.put(0, far, b"lonely")?;

        let survivor = manager.add(0, b"survivor")?;
        let doomed = manager.add(0, b"doomed")?;
        manager.remove(0, doomed)?;

        let seen: Vec<(Location, Bytes)> = manager.iter(0)?.collect::<StorageResult<_>>()?;
        assert_eq!(
            seen,
            vec![
                (far, Bytes::from_static(b"lonely")),
                (survivor, Bytes::from_static(b"survivor")),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_iter_empty_file() -> Result<()> {
        let dir = tempdir()?;
        let mut manager = FileManager::open(dir.path(), PAGE_SIZE)?;
        assert_eq!(manager.iter(0)?.count(), 0);
        Ok(())
    }

    #[test]
    fn test_clear_empties_the_file() -> Result<()> {
        let dir = tempdir()?;
        let mut manager = FileManager::open(dir.path(), PAGE_SIZE)?;

        let location = manager.add(0, b"transient")?;
        manager.clear(0)?;

        assert!(matches!(
            manager.get(0, location),
            Err(StorageError::InvalidLocation { .. })
        ));
        assert_eq!(manager.iter(0)?.count(), 0);
        Ok(())
    }

    #[test]
    fn test_files_are_independent() -> Result<()> {
        let dir = tempdir()?;
        let mut manager = FileManager::open(dir.path(), PAGE_SIZE)?;

        let in_zero = manager.add(0, b"file zero")?;
        let in_nine = manager.add(9, b"file nine")?;
        assert_eq!(in_zero, in_nine); // same location, different namespaces

        assert_eq!(manager.get(0, in_zero)?, Some(Bytes::from_static(b"file zero")));
        assert_eq!(manager.get(9, in_nine)?, Some(Bytes::from_static(b"file nine")));

        assert!(dir.path().join("0.dat").exists());
        assert!(dir.path().join("9.dat").exists());
        Ok(())
    }

    #[test]
    fn test_shutdown_then_reopen() -> Result<()> {
        let dir = tempdir()?;
        let location;
        {
            let mut manager = FileManager::open(dir.path(), PAGE_SIZE)?;
            location = manager.add(0, b"outlives the manager")?;
            manager.shutdown()?;
        }

        let mut manager = FileManager::open(dir.path(), PAGE_SIZE)?;
        assert_eq!(
            manager.get(0, location)?,
            Some(Bytes::from_static(b"outlives the manager"))
        );
        Ok(())
    }

    #[test]
    fn test_io_stats_track_operations() -> Result<()> {
        let dir = tempdir()?;
        let mut manager = FileManager::open(dir.path(), PAGE_SIZE)?;

        assert_eq!(manager.io_stats(0), None);
        let location = manager.add(0, b"counted")?;
        manager.get(0, location)?;

        let stats = manager.io_stats(0).expect("file is open");
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.reads, 1);
        Ok(())
    }

    #[test]
    fn test_write_through_buffer_seam() -> Result<()> {
        let dir = tempdir()?;
        let mut manager = FileManager::open(dir.path(), PAGE_SIZE)?;
        let location = manager.add(0, b"via trait")?;

        let buffer: &mut dyn PageBuffer = &mut manager;
        let mut page = buffer
            .fetch(0, location.page_id())?
            .expect("page should exist");
        page.put(location.slot(), b"rewritten")?;
        buffer.mark_dirty(0, &page)?;
        buffer.flush(0)?;

        assert_eq!(
            manager.get(0, location)?,
            Some(Bytes::from_static(b"rewritten"))
        );
        Ok(())
    }
}
