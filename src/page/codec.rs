//! Bounds-checked fixed-width integer access inside a page buffer.
//!
//! All in-page integers are big-endian and 4 bytes wide. Every read and write
//! validates its byte range against the buffer length first; a violation means
//! the header or footer describes a region outside the page and is reported as
//! [`StorageError::CorruptPage`].

use crate::error::{StorageError, StorageResult};
use byteorder::{BigEndian, ByteOrder};

const INT_SIZE: usize = 4;

fn checked_range(buf: &[u8], offset: usize) -> StorageResult<std::ops::Range<usize>> {
    let end = offset
        .checked_add(INT_SIZE)
        .filter(|&end| end <= buf.len())
        .ok_or_else(|| {
            StorageError::CorruptPage(format!(
                "integer access at offset {} exceeds page size {}",
                offset,
                buf.len()
            ))
        })?;
    Ok(offset..end)
}

pub fn read_i32(buf: &[u8], offset: usize) -> StorageResult<i32> {
    let range = checked_range(buf, offset)?;
    Ok(BigEndian::read_i32(&buf[range]))
}

pub fn write_i32(buf: &mut [u8], offset: usize, value: i32) -> StorageResult<()> {
    let range = checked_range(buf, offset)?;
    BigEndian::write_i32(&mut buf[range], value);
    Ok(())
}

pub fn read_u32(buf: &[u8], offset: usize) -> StorageResult<u32> {
    let range = checked_range(buf, offset)?;
    Ok(BigEndian::read_u32(&buf[range]))
}

pub fn write_u32(buf: &mut [u8], offset: usize, value: u32) -> StorageResult<()> {
    let range = checked_range(buf, offset)?;
    BigEndian::write_u32(&mut buf[range], value);
    Ok(())
}
