//! Storage Module
//!
//! Persistent storage layer: an append-only heap of fixed-size pages.
//!
//! ## Responsibilities
//! - Persist records in fixed-size pages at fixed file offsets
//! - Keep a key → page index as the lookup path
//! - Tombstone replaced and removed records in place
//! - Coordinate page locks, the page cache and file I/O
//!
//! ## File Format
//! ```text
//! offset 0              page_size            2*page_size
//! ┌─────────────────────┬─────────────────────┬──────────
//! │ Page 0              │ Page 1              │ ...
//! │ [rec][rec][rec][00] │ [rec][rec][00]      │
//! └─────────────────────┴─────────────────────┴──────────
//! ```
//! No file header, magic number or checksum. Every page write rewrites the
//! whole page.

mod file;
mod heap;

pub use file::PageFile;
pub use heap::{HeapFile, HeapIter};
