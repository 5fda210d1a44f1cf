//! Lock Module
//!
//! Per-page read/write locking for the heap file.
//!
//! ## Design
//! The page-number space is unbounded, but only a handful of pages are
//! contended at any moment. The lock manager therefore hands out one
//! canonical [`PageLock`] handle per page, backed by a lock object borrowed
//! from a bounded [`ObjectPool`](crate::pool::ObjectPool):
//!
//! ```text
//!   lock_for_page(7) ──► handles[7] ──weak──► PageLock #42 ──► pooled RwLock
//!                                              ▲      ▲
//!                                   caller A ──┘      └── caller B (clone)
//! ```
//!
//! Handles are reference counted. When the last clone drops, the page's
//! entry is evicted by a background reclaimer thread and the lock object
//! goes back to the pool.

mod handle;
mod manager;

use std::sync::Arc;

use parking_lot::RwLock;

pub use handle::PageLock;
pub use manager::LockManager;

/// The pooled lock object behind a page lock handle
pub type LockObject = Arc<RwLock<()>>;
