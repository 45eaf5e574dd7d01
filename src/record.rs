//! The record encoding contract.
//!
//! The engine treats every record as an opaque byte sequence; turning
//! application values into bytes and back is the codec's job. Because each
//! slot stores its record's exact length, `decode` always receives exactly
//! one record's bytes — the codec does not need to be self-terminating.

use crate::error::StorageResult;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

/// Encodes application values to record bytes and back.
pub trait RecordCodec {
    type Record;

    fn encode(&self, record: &Self::Record) -> StorageResult<Vec<u8>>;

    fn decode(&self, bytes: &[u8]) -> StorageResult<Self::Record>;
}

/// A [`RecordCodec`] for any serde-serializable type, backed by bincode.
pub struct BincodeCodec<T> {
    _marker: PhantomData<T>,
}

impl<T> BincodeCodec<T> {
    pub fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<T> Default for BincodeCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Serialize + DeserializeOwned> RecordCodec for BincodeCodec<T> {
    type Record = T;

    fn encode(&self, record: &T) -> StorageResult<Vec<u8>> {
        Ok(bincode::serialize(record)?)
    }

    fn decode(&self, bytes: &[u8]) -> StorageResult<T> {
        Ok(bincode::deserialize(bytes)?)
    }
}
