//! Slotted page: variable-length records inside one fixed-size byte buffer.
//!
//! Layout (all integers big-endian, 4 bytes):
//!
//! ```text
//! [0, 4)              entry count
//! [4 + 8i, 4 + 8i+8)  slot i: record offset (i32, -1 = tombstone), record length (u32)
//! [header, start)     free space
//! [start, size - 4)   packed record bytes (data region, grows downward)
//! [size - 4, size)    start-of-data offset
//! ```
//!
//! Slot indices are permanent: removing a record tombstones its slot but never
//! renumbers any other slot, and the entry count never decreases.

use crate::error::{StorageError, StorageResult};
use crate::page::{codec, PageId};
use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;
use log::debug;

const ENTRY_COUNT_OFFSET: usize = 0;
const ENTRY_COUNT_SIZE: usize = 4;
const FOOTER_SIZE: usize = 4;

// Slot entry: 4-byte signed offset followed by 4-byte record length. Storing
// the length explicitly lets compaction reclaim dead space without decoding
// record contents.
const SLOT_SIZE: usize = 8;
const TOMBSTONE: i32 = -1;

/// The smallest buffer that can hold the entry count, one slot, and the footer.
pub const MIN_PAGE_SIZE: usize = ENTRY_COUNT_SIZE + SLOT_SIZE + FOOTER_SIZE;

/// The state of one slot in the header table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Occupied { offset: usize, len: usize },
    Tombstone,
}

/// A fixed-size page storing variable-length records with stable slot indices.
pub struct SlottedPage {
    page_id: PageId,
    data: Vec<u8>,
}

impl SlottedPage {
    /// Creates an empty page.
    ///
    /// `size` must be between [`MIN_PAGE_SIZE`] and `i32::MAX`; callers taking
    /// a size from the outside validate it first (see `FileManager::open`).
    pub fn new(page_id: PageId, size: usize) -> Self {
        assert!(
            (MIN_PAGE_SIZE..=i32::MAX as usize).contains(&size),
            "invalid page size {size}"
        );
        let mut data = vec![0u8; size];
        let footer = size - FOOTER_SIZE;
        BigEndian::write_i32(&mut data[footer..], footer as i32);
        Self { page_id, data }
    }

    /// Reconstructs a page from bytes read off disk, validating that the
    /// header and footer describe a coherent layout.
    ///
    /// An all-zero buffer is a page that was materialized by sparse file
    /// growth but never written; it is normalized to a fresh empty page.
    pub fn from_bytes(page_id: PageId, data: Vec<u8>) -> StorageResult<Self> {
        if !(MIN_PAGE_SIZE..=i32::MAX as usize).contains(&data.len()) {
            return Err(StorageError::CorruptPage(format!(
                "page {} has invalid size {}",
                page_id,
                data.len()
            )));
        }
        let mut page = Self { page_id, data };
        let count = page.entry_count()?;
        let start = page.start_of_data()?;
        if count == 0 && start == 0 {
            let footer = page.data.len() - FOOTER_SIZE;
            codec::write_i32(&mut page.data, footer, footer as i32)?;
            return Ok(page);
        }
        if start < page.header_size(count) || start > page.data.len() - FOOTER_SIZE {
            return Err(StorageError::CorruptPage(format!(
                "page {}: start of data {} outside [{}, {}]",
                page_id,
                start,
                page.header_size(count),
                page.data.len() - FOOTER_SIZE
            )));
        }
        Ok(page)
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// The raw page bytes, for writing back to disk.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// The number of slots in the header table, live and tombstoned alike.
    pub fn entry_count(&self) -> StorageResult<u32> {
        codec::read_u32(&self.data, ENTRY_COUNT_OFFSET)
    }

    /// Bytes available between the end of the slot table and the data region.
    pub fn free_space(&self) -> StorageResult<usize> {
        let count = self.entry_count()?;
        Ok(self.start_of_data()?.saturating_sub(self.header_size(count)))
    }

    /// Appends `record` as a new slot and returns its index.
    ///
    /// Compacts the page first if free space is short; fails with
    /// [`StorageError::Overflow`] if the record still does not fit.
    pub fn add(&mut self, record: &[u8]) -> StorageResult<u32> {
        let index = self.entry_count()?;
        let offset = self.save(record, SLOT_SIZE)?;
        self.set_entry_count(index + 1)?;
        self.write_slot(index, Slot::Occupied { offset, len: record.len() })?;
        Ok(index)
    }

    /// Returns the record at `index`, or `None` if that slot was removed.
    pub fn get(&self, index: u32) -> StorageResult<Option<&[u8]>> {
        match self.slot(index)? {
            Slot::Tombstone => Ok(None),
            Slot::Occupied { offset, len } => Ok(Some(&self.data[offset..offset + len])),
        }
    }

    /// Puts `record` at `index`, returning the record previously stored there.
    ///
    /// `index == entry_count` appends a new slot (like [`SlottedPage::add`])
    /// and returns `None`. A record no longer than the existing one is
    /// overwritten in place; otherwise the new bytes go into fresh free space
    /// and the old bytes become dead space for the next compaction. Putting at
    /// a tombstoned index resurrects that slot with a fresh offset.
    pub fn put(&mut self, index: u32, record: &[u8]) -> StorageResult<Option<Bytes>> {
        if index == self.entry_count()? {
            self.add(record)?;
            return Ok(None);
        }
        match self.slot(index)? {
            Slot::Occupied { offset, len } if record.len() <= len => {
                let old = Bytes::copy_from_slice(&self.data[offset..offset + len]);
                self.data[offset..offset + record.len()].copy_from_slice(record);
                self.write_slot(index, Slot::Occupied { offset, len: record.len() })?;
                Ok(Some(old))
            }
            slot => {
                let old = match slot {
                    Slot::Occupied { offset, len } => {
                        Some(Bytes::copy_from_slice(&self.data[offset..offset + len]))
                    }
                    Slot::Tombstone => None,
                };
                let offset = self.save(record, 0)?;
                self.write_slot(index, Slot::Occupied { offset, len: record.len() })?;
                Ok(old)
            }
        }
    }

    /// Removes the record at `index`, returning it. The slot is tombstoned
    /// lazily: its bytes stay in the data region until the next compaction,
    /// and its index is retired rather than reused. Removing an already
    /// tombstoned slot returns `None` with no side effect.
    pub fn remove(&mut self, index: u32) -> StorageResult<Option<Bytes>> {
        match self.slot(index)? {
            Slot::Tombstone => Ok(None),
            Slot::Occupied { offset, len } => {
                let old = Bytes::copy_from_slice(&self.data[offset..offset + len]);
                self.write_slot(index, Slot::Tombstone)?;
                Ok(Some(old))
            }
        }
    }

    /// Reclaims the space held by dead records.
    ///
    /// Live records are repacked against the footer in descending offset
    /// order, so every record moves toward the end of the buffer (or stays
    /// put) and no copy can clobber bytes that still need to move. Each moved
    /// slot keeps its index; only its stored offset changes. Running compact
    /// twice in a row is a no-op.
    pub fn compact(&mut self) -> StorageResult<()> {
        let count = self.entry_count()?;
        let mut live = Vec::new();
        for index in 0..count {
            if let Slot::Occupied { offset, len } = self.slot(index)? {
                live.push((index, offset, len));
            }
        }
        live.sort_by(|a, b| b.1.cmp(&a.1));

        let before = self.start_of_data()?;
        let mut write_pos = self.data.len() - FOOTER_SIZE;
        for (index, offset, len) in live {
            let new_offset = write_pos - len;
            if new_offset != offset {
                self.data.copy_within(offset..offset + len, new_offset);
                self.write_slot(index, Slot::Occupied { offset: new_offset, len })?;
            }
            write_pos = new_offset;
        }
        self.set_start_of_data(write_pos)?;
        if write_pos > before {
            debug!(
                "compacted page {}: reclaimed {} bytes",
                self.page_id,
                write_pos - before
            );
        }
        Ok(())
    }

    /// Iterates over `(slot index, record)` for every live slot, in slot
    /// order. Tombstoned slots are skipped. Each call starts a fresh pass.
    pub fn iter(&self) -> PageIter<'_> {
        PageIter { page: self, next_index: 0, done: false }
    }

    /// Reads and validates the slot entry at `index`.
    fn slot(&self, index: u32) -> StorageResult<Slot> {
        let count = self.entry_count()?;
        if index >= count {
            return Err(StorageError::OutOfRange { index, entry_count: count });
        }
        let entry = ENTRY_COUNT_SIZE + index as usize * SLOT_SIZE;
        let offset = codec::read_i32(&self.data, entry)?;
        if offset == TOMBSTONE {
            return Ok(Slot::Tombstone);
        }
        let len = codec::read_u32(&self.data, entry + 4)? as usize;
        let data_end = self.data.len() - FOOTER_SIZE;
        let in_bounds = offset >= 0
            && (offset as usize) >= self.start_of_data()?
            && (offset as usize).checked_add(len).is_some_and(|end| end <= data_end);
        if !in_bounds {
            return Err(StorageError::CorruptPage(format!(
                "page {}: slot {} points at [{}, +{}) outside the data region",
                self.page_id, index, offset, len
            )));
        }
        Ok(Slot::Occupied { offset: offset as usize, len })
    }

    fn write_slot(&mut self, index: u32, slot: Slot) -> StorageResult<()> {
        let entry = ENTRY_COUNT_SIZE + index as usize * SLOT_SIZE;
        match slot {
            Slot::Tombstone => {
                codec::write_i32(&mut self.data, entry, TOMBSTONE)?;
                codec::write_u32(&mut self.data, entry + 4, 0)
            }
            Slot::Occupied { offset, len } => {
                codec::write_i32(&mut self.data, entry, offset as i32)?;
                codec::write_u32(&mut self.data, entry + 4, len as u32)
            }
        }
    }

    /// Copies `record` into free space just below the data region, compacting
    /// first if needed. `header_growth` is the extra header room the caller is
    /// about to claim (one slot entry for an append, nothing for a relocate).
    fn save(&mut self, record: &[u8], header_growth: usize) -> StorageResult<usize> {
        let required = record.len() + header_growth;
        if self.free_space()? < required {
            self.compact()?;
            let available = self.free_space()?;
            if available < required {
                return Err(StorageError::Overflow { required, available });
            }
        }
        let offset = self.start_of_data()? - record.len();
        self.data[offset..offset + record.len()].copy_from_slice(record);
        self.set_start_of_data(offset)?;
        Ok(offset)
    }

    fn header_size(&self, entry_count: u32) -> usize {
        ENTRY_COUNT_SIZE + entry_count as usize * SLOT_SIZE
    }

    fn set_entry_count(&mut self, count: u32) -> StorageResult<()> {
        codec::write_u32(&mut self.data, ENTRY_COUNT_OFFSET, count)
    }

    fn start_of_data(&self) -> StorageResult<usize> {
        let footer = self.data.len() - FOOTER_SIZE;
        let start = codec::read_i32(&self.data, footer)?;
        if start < 0 || start as usize > footer {
            return Err(StorageError::CorruptPage(format!(
                "page {}: start of data {} outside the buffer",
                self.page_id, start
            )));
        }
        Ok(start as usize)
    }

    fn set_start_of_data(&mut self, start: usize) -> StorageResult<()> {
        let footer = self.data.len() - FOOTER_SIZE;
        codec::write_i32(&mut self.data, footer, start as i32)
    }
}

impl std::fmt::Debug for SlottedPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlottedPage")
            .field("page_id", &self.page_id)
            .field("size", &self.data.len())
            .field("entry_count", &self.entry_count().ok())
            .field("free_space", &self.free_space().ok())
            .finish()
    }
}

/// Forward iterator over the live records of one page.
pub struct PageIter<'a> {
    page: &'a SlottedPage,
    next_index: u32,
    done: bool,
}

impl<'a> Iterator for PageIter<'a> {
    type Item = StorageResult<(u32, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let count = match self.page.entry_count() {
                Ok(count) => count,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };
            if self.next_index >= count {
                self.done = true;
                return None;
            }
            let index = self.next_index;
            self.next_index += 1;
            match self.page.get(index) {
                Ok(Some(record)) => return Some(Ok((index, record))),
                Ok(None) => continue,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
