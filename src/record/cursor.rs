//! Page Cursor
//!
//! Forward-only iteration over the live records of one page buffer, with
//! in-place tombstoning of the record last returned.

use crate::error::{HeapError, Result};

use super::{Mark, Record};

/// Stateful cursor over one page
///
/// - `has_next()` skips tombstones and stops at the first EMPTY mark;
///   calling it again without `next_record()` does not rescan.
/// - `next_record()` returns the pending live record and remembers its mark
///   offset.
/// - `remove()` tombstones the last returned record (needs a mutable page).
pub struct PageCursor<B> {
    page: B,
    /// Offset of the next mark byte to inspect
    position: usize,
    /// A PRESENT record sits at `position`
    pending: bool,
    /// Mark offset of the record last returned by `next_record()`
    last_mark: Option<usize>,
}

impl<B: AsRef<[u8]>> PageCursor<B> {
    /// Create a cursor positioned at the start of the page
    pub fn new(page: B) -> Self {
        Self {
            page,
            position: 0,
            pending: false,
            last_mark: None,
        }
    }

    /// Whether another live record follows
    pub fn has_next(&mut self) -> bool {
        if self.pending {
            return true;
        }

        let page = self.page.as_ref();
        while self.position < page.len() {
            let mark = Mark::from_byte(page[self.position]);
            if mark == Mark::Empty {
                break;
            }

            // A record running past the page end can't be trusted, nor
            // anything after it
            if Record::size_at(page, self.position).is_none() {
                break;
            }

            if mark == Mark::Present {
                self.pending = true;
                return true;
            }

            let mut body = &page[self.position + 1..];
            let before = body.len();
            Record::skip(&mut body);
            self.position += 1 + (before - body.len());
        }

        // EMPTY terminates the whole page
        self.position = page.len();
        false
    }

    /// Return the next live record
    pub fn next_record(&mut self) -> Result<Record> {
        if !self.has_next() {
            return Err(HeapError::IterationState("no record left on page"));
        }
        self.pending = false;

        let page = self.page.as_ref();
        let mut body = &page[self.position + 1..];
        let record = Record::read(&mut body);

        self.last_mark = Some(self.position);
        self.position += record.size();
        Ok(record)
    }

    /// Offset of the next mark byte the cursor will inspect
    pub fn position(&self) -> usize {
        self.position
    }

    /// Give the page buffer back
    pub fn into_inner(self) -> B {
        self.page
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> PageCursor<B> {
    /// Tombstone the record last returned by `next_record()`
    pub fn remove(&mut self) -> Result<()> {
        let offset = self
            .last_mark
            .take()
            .ok_or(HeapError::IterationState("remove() requires a preceding next()"))?;
        self.page.as_mut()[offset] = Mark::Removed.as_byte();
        Ok(())
    }
}

impl<B: AsRef<[u8]>> Iterator for PageCursor<B> {
    type Item = Record;

    fn next(&mut self) -> Option<Self::Item> {
        if self.has_next() {
            self.next_record().ok()
        } else {
            None
        }
    }
}

/// Offset of the first EMPTY mark, i.e. where the next record goes.
///
/// Walks live records and tombstones alike. A damaged tail makes the
/// page count as full.
pub fn write_offset(page: &[u8]) -> usize {
    let mut offset = 0;
    while offset < page.len() {
        if Mark::from_byte(page[offset]) == Mark::Empty {
            return offset;
        }
        match Record::size_at(page, offset) {
            Some(size) => offset += size,
            None => return page.len(),
        }
    }
    page.len()
}
