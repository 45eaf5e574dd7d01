//! A single-machine storage engine for variable-length records, built on the
//! slotted-page layout used by relational database heap files.
//!
//! Key components:
//!
//! - **SlottedPage**: a fixed-size byte buffer holding a slot table that grows
//!   down from the top and a data region that grows up from the bottom
//! - **SlottedPageFile**: maps a gapless sequence of pages onto one disk file
//! - **FileManager**: owns one file per file id, assigns stable record
//!   locations, and dispatches add/get/put/remove to the right page
//! - **Location**: a (page id, slot index) pair packed into one opaque u64
//!
//! There is no caching layer: every operation reads and writes pages
//! synchronously. The [`PageBuffer`] trait is the seam where an external
//! buffer pool would plug in.

pub mod buffer;
pub mod disk;
pub mod error;
pub mod location;
pub mod manager;
pub mod page;
pub mod record;

pub use buffer::PageBuffer;
pub use disk::{IoStats, SlottedPageFile};
pub use error::{StorageError, StorageResult};
pub use location::Location;
pub use manager::FileManager;
pub use page::{PageId, Slot, SlottedPage, MIN_PAGE_SIZE};
pub use record::{BincodeCodec, RecordCodec};
