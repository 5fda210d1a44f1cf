//! Record Module
//!
//! Binary layout of one record and forward iteration over one page.
//!
//! ## Record Format
//! ```text
//! ┌──────────┬────────────┬──────────────┬─────────┬───────────┐
//! │ Mark (1) │ KeyLen (2) │ ValueLen (2) │   Key   │   Value   │
//! └──────────┴────────────┴──────────────┴─────────┴───────────┘
//! ```
//! Integers are big-endian. Records are packed from offset 0 of a page and
//! the first EMPTY mark terminates the page.
//!
//! ### Marks
//! - 0x00: EMPTY   - end of the page's records
//! - 0x01: PRESENT - live record
//! - 0x02: REMOVED - tombstone, skipped by readers

mod cursor;

use bytes::{Buf, BufMut, Bytes};

use crate::error::{HeapError, Result};

pub use cursor::{write_offset, PageCursor};

/// Header size: Mark (1) + KeyLen (2) + ValueLen (2) = 5 bytes
pub const HEADER_SIZE: usize = 5;

/// Largest key or value a record can frame
pub const MAX_FIELD_LEN: usize = u16::MAX as usize;

// =============================================================================
// Mark
// =============================================================================

/// One-byte record tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Mark {
    Empty = 0,
    Present = 1,
    Removed = 2,
}

impl Mark {
    /// Decode a mark byte. Unknown values terminate the page like EMPTY.
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            1 => Mark::Present,
            2 => Mark::Removed,
            _ => Mark::Empty,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

// =============================================================================
// Record
// =============================================================================

/// A key/value pair as framed on a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    mark: Mark,
    key: Bytes,
    value: Bytes,
}

impl Record {
    /// Create a live record.
    ///
    /// Fails with [`HeapError::FieldTooLong`] if the key or the value is
    /// longer than [`MAX_FIELD_LEN`] bytes.
    pub fn new(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Result<Self> {
        Self::with_mark(key, value, Mark::Present)
    }

    /// Create a record carrying an explicit mark
    pub fn with_mark(key: impl Into<Bytes>, value: impl Into<Bytes>, mark: Mark) -> Result<Self> {
        let key = key.into();
        let value = value.into();
        for field in [&key, &value] {
            if u16::try_from(field.len()).is_err() {
                return Err(HeapError::FieldTooLong {
                    len: field.len(),
                    max: MAX_FIELD_LEN,
                });
            }
        }
        Ok(Self { mark, key, value })
    }

    pub fn mark(&self) -> Mark {
        self.mark
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn into_value(self) -> Bytes {
        self.value
    }

    /// Encoded size: header + key + value
    pub fn size(&self) -> usize {
        Self::encoded_size(self.key.len(), self.value.len())
    }

    /// Encoded size of a record with the given field lengths
    pub fn encoded_size(key_len: usize, value_len: usize) -> usize {
        HEADER_SIZE + key_len + value_len
    }

    /// Append the record at the buffer's current position and advance it.
    ///
    /// The caller must have checked that `self.size()` bytes remain. Field
    /// lengths fit the u16 header, construction guarantees it.
    pub fn write<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.mark.as_byte());
        buf.put_u16(self.key.len() as u16);
        buf.put_u16(self.value.len() as u16);
        buf.put_slice(&self.key);
        buf.put_slice(&self.value);
    }

    /// Decode the record body that follows an already consumed PRESENT mark.
    ///
    /// The caller must have checked the body is complete (see
    /// [`Record::size_at`]); a truncated body panics inside `Buf`.
    pub(crate) fn read<B: Buf>(buf: &mut B) -> Self {
        let key_len = buf.get_u16() as usize;
        let value_len = buf.get_u16() as usize;
        let key = buf.copy_to_bytes(key_len);
        let value = buf.copy_to_bytes(value_len);
        Self {
            mark: Mark::Present,
            key,
            value,
        }
    }

    /// Skip the record body that follows an already consumed mark (same
    /// precondition as [`Record::read`])
    pub(crate) fn skip<B: Buf>(buf: &mut B) {
        let key_len = buf.get_u16() as usize;
        let value_len = buf.get_u16() as usize;
        buf.advance(key_len + value_len);
    }

    /// Full encoded size of the record whose mark sits at `offset`.
    ///
    /// Returns `None` if the header or body would run past the end of the
    /// page, which can only happen on a damaged page.
    pub fn size_at(page: &[u8], offset: usize) -> Option<usize> {
        let header = page.get(offset..offset + HEADER_SIZE)?;
        let key_len = u16::from_be_bytes([header[1], header[2]]) as usize;
        let value_len = u16::from_be_bytes([header[3], header[4]]) as usize;
        let size = Self::encoded_size(key_len, value_len);
        if offset + size > page.len() {
            return None;
        }
        Some(size)
    }
}
