//! Error types for pageheap
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using HeapError
pub type Result<T> = std::result::Result<T, HeapError>;

/// Unified error type for pageheap operations
#[derive(Debug, Error)]
pub enum HeapError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A page read returned fewer bytes than a full page, without being
    /// a clean end of file
    #[error("Corrupt page {page_nr}: expected {expected} bytes, read {actual}")]
    CorruptPage {
        page_nr: u32,
        expected: usize,
        actual: usize,
    },

    // -------------------------------------------------------------------------
    // Store Errors
    // -------------------------------------------------------------------------
    #[error("Entry of {size} bytes does not fit in a page of {page_size} bytes")]
    EntryTooLarge { size: usize, page_size: usize },

    #[error("Record field of {len} bytes exceeds the {max} byte limit")]
    FieldTooLong { len: usize, max: usize },

    #[error("Store capacity exceeded: maximum of {max_nr_pages} pages reached")]
    CapacityExceeded { max_nr_pages: u32 },

    // -------------------------------------------------------------------------
    // Cursor Errors
    // -------------------------------------------------------------------------
    #[error("Illegal iteration state: {0}")]
    IterationState(&'static str),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for HeapError {
    fn from(err: bincode::Error) -> Self {
        HeapError::Serialization(err.to_string())
    }
}
