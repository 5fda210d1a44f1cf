//! # pageheap
//!
//! An embeddable key-value store on a heap file of fixed-size pages:
//! - Append-only pages with in-place tombstoning
//! - Key → page index as the lookup path
//! - Per-page read/write locks multiplexed over a bounded lock pool
//! - Bounded read-through page cache
//! - Safe to share between threads of one process
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Engine (Store)                           │
//! │              serde/bincode keys and values                   │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                      HeapFile                                │
//! │           key index · tail page · put/get/remove             │
//! └──────┬──────────────┬───────────────┬───────────────────────┘
//!        │              │               │
//!        ▼              ▼               ▼
//!  ┌───────────┐  ┌───────────┐  ┌─────────────┐
//!  │LockManager│  │ PageCache │  │  PageFile   │
//!  │ (per page)│  │   (LRU)   │  │ (fixed I/O) │
//!  └─────┬─────┘  └───────────┘  └─────────────┘
//!        ▼
//!  ┌───────────┐      ┌─────────────────┐    ┌─────────────────┐
//!  │ObjectPool │      │ Record / Cursor │    │ RegionAllocator │
//!  └───────────┘      └─────────────────┘    │  (standalone)   │
//!                                            └─────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod record;
pub mod pool;
pub mod cache;
pub mod alloc;
pub mod lock;
pub mod storage;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{HeapError, Result};
pub use config::{Config, ConsistencyLevel};
pub use engine::{Engine, Entry, Store};
pub use storage::HeapFile;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of pageheap
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
