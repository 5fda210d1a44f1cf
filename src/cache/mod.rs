//! Page Cache Module
//!
//! Bounded read-through cache of page buffers keyed by page number.
//!
//! ## Responsibilities
//! - Serve resident pages without touching the file
//! - Load missing pages through a caller-supplied loader, once per miss
//! - Never remember "no such page" answers (the file may grow)
//!
//! Page *content* is not protected here: callers hold the page's lock from
//! the lock manager while reading or mutating a buffer.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use dashmap::DashMap;
use lru::LruCache;
use parking_lot::{Mutex, RwLock};

use crate::error::Result;

/// A page buffer shared between the cache and its users
pub type SharedPage = Arc<RwLock<BytesMut>>;

/// Loads a page from backing storage; `Ok(None)` means no such page
pub type PageLoader = Box<dyn Fn(u32) -> Result<Option<SharedPage>> + Send + Sync>;

/// Wrap a buffer as a [`SharedPage`]
pub fn shared_page(buf: BytesMut) -> SharedPage {
    Arc::new(RwLock::new(buf))
}

/// Read-through LRU page cache
///
/// ## Concurrency:
/// - `pages`: LRU map behind a short-lived Mutex (never held during loads)
/// - `loading`: one gate per page number currently being loaded, so that
///   concurrent misses on the same page load it once while misses on other
///   pages proceed in parallel
pub struct PageCache {
    pages: Mutex<LruCache<u32, SharedPage>>,
    loading: DashMap<u32, Arc<Mutex<()>>>,
    loader: PageLoader,

    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Loader invocations
    pub loads: u64,
    pub size: usize,
    pub capacity: usize,
}

impl PageCache {
    /// Create a cache holding at most `capacity` pages
    pub fn new(capacity: usize, loader: PageLoader) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            pages: Mutex::new(LruCache::new(capacity)),
            loading: DashMap::new(),
            loader,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            loads: AtomicU64::new(0),
        }
    }

    /// Get a page, loading it on a miss
    ///
    /// Returns `Ok(None)` when the loader reports no such page; that answer
    /// is not cached.
    pub fn get(&self, page_nr: u32) -> Result<Option<SharedPage>> {
        if let Some(page) = self.lookup(page_nr) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(page));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        // Single flight: one gate per page number
        let gate = self
            .loading
            .entry(page_nr)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let result = {
            let _loading = gate.lock();

            // Whoever held the gate before us may have loaded it already
            if let Some(page) = self.lookup(page_nr) {
                Ok(Some(page))
            } else {
                self.load(page_nr)
            }
        };

        // Last one out drops the gate (map + our clone = 2)
        self.loading.remove_if(&page_nr, |_, current| {
            Arc::ptr_eq(current, &gate) && Arc::strong_count(current) <= 2
        });

        result
    }

    /// Install or replace a page
    pub fn put(&self, page_nr: u32, page: SharedPage) {
        self.pages.lock().put(page_nr, page);
    }

    /// Drop a page, forcing a reload on the next `get`
    pub fn invalidate(&self, page_nr: u32) {
        self.pages.lock().pop(&page_nr);
    }

    /// Number of resident pages
    pub fn len(&self) -> usize {
        self.pages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.pages.lock().cap().get()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let pages = self.pages.lock();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            size: pages.len(),
            capacity: pages.cap().get(),
        }
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn lookup(&self, page_nr: u32) -> Option<SharedPage> {
        self.pages.lock().get(&page_nr).cloned()
    }

    /// Invoke the loader and cache a found page (called with the gate held)
    fn load(&self, page_nr: u32) -> Result<Option<SharedPage>> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(page_nr, "loading page into cache");

        let page = (self.loader)(page_nr)?;
        if let Some(page) = &page {
            self.put(page_nr, Arc::clone(page));
        }
        Ok(page)
    }
}
