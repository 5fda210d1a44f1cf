//! Heap File Store
//!
//! Append-only page heap with a key → page index.
//!
//! ## Write Path (put)
//! ```text
//!   lock(last page, write)
//!     ├─ index says key lives on page P?  → tombstone it on P, flush P
//!     ├─ no room left?                    → start page last+1
//!     ├─ append record, flush page
//!     └─ index[key] = page
//! ```
//!
//! ## Read Path (get/remove)
//! The index is the only way to find a key: no index entry means not
//! found. The indexed page is scanned under its lock, so a stale index entry
//! can only ever produce a miss, never a wrong value.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::cache::{shared_page, PageCache, SharedPage};
use crate::config::{Config, ConsistencyLevel};
use crate::error::{HeapError, Result};
use crate::lock::LockManager;
use crate::record::{self, PageCursor, Record, MAX_FIELD_LEN};

use super::file::PageFile;

/// The page currently accepting appends
struct Tail {
    page_nr: u32,
    /// Where the next record goes
    offset: usize,
    /// Resident buffer of the tail page
    page: SharedPage,
}

/// Byte-level heap file store
///
/// ## Concurrency:
/// - Per-page locks from the `LockManager` guard page content
/// - `tail`: only changed by the holder of the tail page's write lock, so a
///   snapshot taken under that lock stays valid for the critical section
/// - `index`: concurrent map; entries for a new page are published under the
///   `tail` mutex together with the tail move
/// - All methods use `&self`; share the store across threads with an `Arc`
pub struct HeapFile {
    config: Config,
    file: Arc<PageFile>,
    cache: PageCache,
    locks: LockManager,
    index: DashMap<Vec<u8>, u32>,
    tail: Mutex<Tail>,
}

impl HeapFile {
    /// Open or create the heap file described by `config`
    ///
    /// On startup:
    /// 1. Validate the configuration
    /// 2. Open/create the backing file
    /// 3. Scan existing pages to rebuild the key index
    /// 4. Make the last page resident for appends
    pub fn open(config: Config) -> Result<Self> {
        // Step 1: Reject unusable settings
        config.validate()?;

        // Step 2: Backing file, and a cache that loads from it
        let file = Arc::new(PageFile::open(
            &config.path,
            config.page_size,
            config.sync_on_write,
        )?);
        let loader_file = Arc::clone(&file);
        let cache = PageCache::new(
            config.page_cache_capacity,
            Box::new(move |page_nr: u32| Ok(loader_file.read_page(page_nr)?.map(shared_page))),
        );
        let locks = LockManager::from_config(&config)?;

        let heap = Self {
            tail: Mutex::new(Tail {
                page_nr: 0,
                offset: 0,
                page: shared_page(BytesMut::zeroed(config.page_size)),
            }),
            config,
            file,
            cache,
            locks,
            index: DashMap::new(),
        };

        // Step 3 + 4: Index existing records, find the tail
        heap.recover()?;

        tracing::info!(
            path = %heap.config.path.display(),
            page_size = heap.config.page_size,
            pages = heap.last_page_nr() + 1,
            keys = heap.index.len(),
            "heap file opened"
        );
        Ok(heap)
    }

    /// Store `value` under `key`, replacing any previous value
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        // Step 1: Capacity
        if self.last_page_nr() >= self.config.max_nr_pages {
            return Err(HeapError::CapacityExceeded {
                max_nr_pages: self.config.max_nr_pages,
            });
        }

        // Step 2: The record has to fit an empty page
        let size = Record::encoded_size(key.len(), value.len());
        if key.len() > MAX_FIELD_LEN || value.len() > MAX_FIELD_LEN || size >= self.config.page_size {
            return Err(HeapError::EntryTooLarge {
                size,
                page_size: self.config.page_size,
            });
        }
        let record = Record::new(Bytes::copy_from_slice(key), Bytes::copy_from_slice(value))?;

        // Step 3: Serialize appenders on the last page. If another appender
        // moved the tail while we waited, follow it.
        loop {
            let page_nr = self.last_page_nr();
            let lock = self.locks.lock_for_page(page_nr);
            let appended = lock.in_write_operation(|| self.append(page_nr, &record))?;
            if appended {
                return Ok(());
            }
        }
    }

    /// Get the value stored under `key`
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        self.with_indexed_page(key, |page_nr| {
            self.locks
                .lock_for_page(page_nr)
                .in_read_operation(|| self.find_in(page_nr, key))
        })
    }

    /// Remove `key`, returning the value it had
    pub fn remove(&self, key: &[u8]) -> Result<Option<Bytes>> {
        self.with_indexed_page(key, |page_nr| {
            self.locks.lock_for_page(page_nr).in_write_operation(|| -> Result<_> {
                let removed = self.tombstone_in(page_nr, key)?;
                // Only forget the key if nobody re-indexed it elsewhere
                self.index.remove_if(key, |_, indexed| *indexed == page_nr);
                Ok(removed)
            })
        })
    }

    /// Iterate over every live record, page by page
    pub fn iter(&self) -> HeapIter<'_> {
        HeapIter {
            heap: self,
            page_nr: 0,
            records: Vec::new().into_iter(),
            done: false,
        }
    }

    /// Number of the page currently accepting appends
    pub fn last_page_nr(&self) -> u32 {
        self.tail.lock().page_nr
    }

    /// Number of indexed keys
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Page the index currently assigns to `key`
    pub fn indexed_page(&self, key: &[u8]) -> Option<u32> {
        self.index.get(key).map(|entry| *entry.value())
    }

    /// Force written pages to disk
    pub fn flush(&self) -> Result<()> {
        self.file.sync()
    }

    /// Flush and stop background maintenance
    pub fn close(self) -> Result<()> {
        self.file.sync()?;
        self.locks.shutdown();
        tracing::info!(path = %self.config.path.display(), "heap file closed");
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.locks
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Append `record` while holding the write lock of page `locked_nr`
    ///
    /// Returns `Ok(false)` if `locked_nr` is no longer the tail page.
    fn append(&self, locked_nr: u32, record: &Record) -> Result<bool> {
        let (tail_nr, tail_offset, tail_page) = {
            let tail = self.tail.lock();
            (tail.page_nr, tail.offset, Arc::clone(&tail.page))
        };
        if tail_nr != locked_nr {
            return Ok(false);
        }

        // Strictly less: a record never fills the last byte of a page
        let page_size = self.config.page_size;
        let fits = record.size() < page_size - tail_offset;
        if !fits && tail_nr + 1 >= self.config.max_nr_pages {
            return Err(HeapError::CapacityExceeded {
                max_nr_pages: self.config.max_nr_pages,
            });
        }

        // Upsert: at most one live record per key
        if let Some(previous) = self.indexed_page(record.key()) {
            if previous == tail_nr {
                self.tombstone_in(previous, record.key())?;
            } else {
                // Older page, locked after the tail page: always descending
                self.locks
                    .lock_for_page(previous)
                    .in_write_operation(|| self.tombstone_in(previous, record.key()))?;
            }
        }

        let (target_nr, target, offset) = if fits {
            (tail_nr, tail_page, tail_offset)
        } else {
            // Unreachable by others until the tail and index point at it
            let next = tail_nr + 1;
            tracing::debug!(page_nr = next, "allocating new page");
            (next, shared_page(BytesMut::zeroed(page_size)), 0)
        };

        {
            let mut buf = target.write();
            let mut slot = &mut buf[offset..];
            record.write(&mut slot);
            self.file.write_page(target_nr, &buf)?;
        }
        self.cache.put(target_nr, Arc::clone(&target));

        // Index and tail change together: whoever finds the key on a new page
        // must also find that page resident, and appenders that follow the
        // tail must already see the key there
        let mut tail = self.tail.lock();
        self.index.insert(record.key().to_vec(), target_nr);
        *tail = Tail {
            page_nr: target_nr,
            offset: offset + record.size(),
            page: target,
        };

        Ok(true)
    }

    /// Scan page `page_nr` for `key` (caller holds the page's read lock)
    fn find_in(&self, page_nr: u32, key: &[u8]) -> Result<Option<Bytes>> {
        let Some(page) = self.page(page_nr)? else {
            return Ok(None);
        };
        let buf = page.read();
        let found = PageCursor::new(&buf[..])
            .find(|record| record.key() == key)
            .map(Record::into_value);
        Ok(found)
    }

    /// Tombstone the live record of `key` on page `page_nr` and flush the
    /// page (caller holds the page's write lock)
    fn tombstone_in(&self, page_nr: u32, key: &[u8]) -> Result<Option<Bytes>> {
        let Some(page) = self.page(page_nr)? else {
            return Ok(None);
        };
        let mut buf = page.write();

        let mut cursor = PageCursor::new(&mut buf[..]);
        while cursor.has_next() {
            let record = cursor.next_record()?;
            if record.key() == key {
                cursor.remove()?;
                self.file.write_page(page_nr, &buf)?;
                tracing::debug!(page_nr, "tombstoned record");
                return Ok(Some(record.into_value()));
            }
        }
        Ok(None)
    }

    /// Resident tail buffer for the tail page, the cache for the others
    fn page(&self, page_nr: u32) -> Result<Option<SharedPage>> {
        {
            let tail = self.tail.lock();
            if tail.page_nr == page_nr {
                return Ok(Some(Arc::clone(&tail.page)));
            }
        }
        self.cache.get(page_nr)
    }

    /// Run `op` against the indexed page of `key`, honouring the
    /// configured consistency level on misses
    fn with_indexed_page<F>(&self, key: &[u8], op: F) -> Result<Option<Bytes>>
    where
        F: Fn(u32) -> Result<Option<Bytes>>,
    {
        let Some(mut page_nr) = self.indexed_page(key) else {
            return Ok(None);
        };

        loop {
            let found = op(page_nr)?;
            if found.is_some() || self.config.consistency == ConsistencyLevel::IndexOnly {
                return Ok(found);
            }
            match self.indexed_page(key) {
                Some(moved) if moved != page_nr => page_nr = moved,
                _ => return Ok(None),
            }
        }
    }

    /// Rebuild the index from the file and make its last page the tail
    fn recover(&self) -> Result<()> {
        let page_count = self.file.page_count()?;
        if page_count == 0 {
            return Ok(());
        }

        for page_nr in 0..page_count {
            let Some(page) = self.cache.get(page_nr)? else {
                break;
            };
            let buf = page.read();
            for record in PageCursor::new(&buf[..]) {
                // Later pages hold newer versions
                self.index.insert(record.key().to_vec(), page_nr);
            }
        }

        let last = page_count - 1;
        let page = self.cache.get(last)?.ok_or(HeapError::CorruptPage {
            page_nr: last,
            expected: self.config.page_size,
            actual: 0,
        })?;
        let offset = record::write_offset(&page.read());

        *self.tail.lock() = Tail {
            page_nr: last,
            offset,
            page,
        };
        tracing::debug!(page_nr = last, offset, "recovered tail page");
        Ok(())
    }
}

// =============================================================================
// Full-Store Iteration
// =============================================================================

/// Iterator over all live records, see [`HeapFile::iter`]
///
/// Each page is read under its read lock and loaded through the cache.
/// Iteration ends at the first page past the end of the file.
pub struct HeapIter<'a> {
    heap: &'a HeapFile,
    page_nr: u32,
    records: std::vec::IntoIter<Record>,
    done: bool,
}

impl HeapIter<'_> {
    fn load_next_page(&mut self) -> Result<bool> {
        let heap = self.heap;
        let page_nr = self.page_nr;

        let records = heap
            .locks
            .lock_for_page(page_nr)
            .in_read_operation(|| -> Result<Option<Vec<Record>>> {
                let Some(page) = heap.page(page_nr)? else {
                    return Ok(None);
                };
                let buf = page.read();
                Ok(Some(PageCursor::new(&buf[..]).collect()))
            })?;

        match records {
            Some(records) => {
                self.records = records.into_iter();
                self.page_nr += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl Iterator for HeapIter<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.records.next() {
                return Some(Ok(record));
            }
            if self.done {
                return None;
            }
            match self.load_next_page() {
                Ok(true) => continue,
                Ok(false) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
