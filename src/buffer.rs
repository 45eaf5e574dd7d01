//! The seam for an external page-caching layer.

use crate::error::StorageResult;
use crate::page::{PageId, SlottedPage};

/// The interface a buffering/caching layer sits behind.
///
/// The core engine performs one disk round trip per operation; a cache
/// implementing this trait can interpose to keep hot pages in memory, defer
/// writes, and add per-page locking. [`crate::FileManager`] provides the
/// trivial write-through implementation: `fetch` reads from disk, `mark_dirty`
/// writes back immediately, and `flush` syncs the file.
///
/// A fetched page is owned by the caller for the duration of one operation
/// and handed back through `mark_dirty`; there is no shared page state in the
/// core. Eviction policy is left entirely to the implementor.
pub trait PageBuffer {
    /// Resolves a page, or `None` if the file does not reach that page yet.
    fn fetch(&mut self, file_id: u32, page_id: PageId) -> StorageResult<Option<SlottedPage>>;

    /// Accepts a mutated page back; it must reach disk no later than the next
    /// `flush` of its file.
    fn mark_dirty(&mut self, file_id: u32, page: &SlottedPage) -> StorageResult<()>;

    /// Forces every outstanding write for the file down to disk.
    fn flush(&mut self, file_id: u32) -> StorageResult<()>;
}
