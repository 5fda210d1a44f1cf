//! Region definition

use std::fmt;

/// A byte range inside one page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    page_nr: u32,
    offset: usize,
    size: usize,
}

impl Region {
    pub fn new(page_nr: u32, offset: usize, size: usize) -> Self {
        Self {
            page_nr,
            offset,
            size,
        }
    }

    pub fn page_nr(&self) -> u32 {
        self.page_nr
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Linear address of the region's first byte in a file of
    /// `page_size`-byte pages
    pub fn address(&self, page_size: usize) -> u64 {
        self.page_nr as u64 * page_size as u64 + self.offset as u64
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Region [pageNr={}, offset={}, size={}]",
            self.page_nr, self.offset, self.size
        )
    }
}
