pub mod codec;
pub mod slotted;

/// Identifier of one page within a slotted page file. Page `k` occupies byte
/// range `[k * page_size, (k + 1) * page_size)` of the backing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u32);

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub use slotted::{PageIter, Slot, SlottedPage, MIN_PAGE_SIZE};
