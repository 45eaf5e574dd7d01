//! The caller-visible handle for one record within one file.

use crate::page::PageId;
use std::fmt;

/// A (page id, slot index) pair packed into one opaque scalar: the page id in
/// the high 32 bits, the slot index in the low 32 bits.
///
/// Each half is semantically a non-negative signed 32-bit value, which caps a
/// file at 2^31 pages and a page at 2^31 slots. A half with its high bit set
/// never comes out of this engine; the manager rejects such locations with
/// `InvalidLocation`.
///
/// Ordering follows increasing page id, then increasing slot index, which for
/// this packing is plain numeric order on the raw scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location(u64);

impl Location {
    /// The first possible location in any file: page 0, slot 0.
    pub const FIRST: Location = Location(0);

    pub fn new(page_id: PageId, slot: u32) -> Self {
        Location(((page_id.0 as u64) << 32) | slot as u64)
    }

    /// Reinterprets a raw scalar as a location. The halves are not validated
    /// here; the manager checks them on use.
    pub fn from_raw(raw: u64) -> Self {
        Location(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }

    pub fn page_id(&self) -> PageId {
        PageId((self.0 >> 32) as u32)
    }

    pub fn slot(&self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.page_id(), self.slot())
    }
}
