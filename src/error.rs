//! Storage layer error types.

use crate::location::Location;
use thiserror::Error;

/// Errors that can occur in the storage layer.
///
/// No operation is ever retried internally; every failure propagates to the
/// immediate caller.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("invalid location {location} in file {file_id}")]
    InvalidLocation { file_id: u32, location: Location },

    #[error("page overflow: requires {required} bytes but only {available} available after compaction")]
    Overflow { required: usize, available: usize },

    #[error("slot index out of range: {index} (entry count: {entry_count})")]
    OutOfRange { index: u32, entry_count: u32 },

    #[error("corrupt page: {0}")]
    CorruptPage(String),

    #[error("invalid page size: {0}")]
    InvalidPageSize(usize),

    #[error("record codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
