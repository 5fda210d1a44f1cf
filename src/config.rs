//! Configuration for pageheap
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{HeapError, Result};
use crate::record::HEADER_SIZE;

/// Main configuration for a heap file store
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Backing heap file. Created if missing, never truncated.
    pub path: PathBuf,

    /// Fixed size of every page, in bytes
    pub page_size: usize,

    /// Maximum number of pages the file may grow to
    pub max_nr_pages: u32,

    /// fsync the file after every page write
    pub sync_on_write: bool,

    // -------------------------------------------------------------------------
    // Read Configuration
    // -------------------------------------------------------------------------
    /// How far `get` trusts the key index
    pub consistency: ConsistencyLevel,

    /// Max number of pages held by the page cache
    pub page_cache_capacity: usize,

    // -------------------------------------------------------------------------
    // Locking Configuration
    // -------------------------------------------------------------------------
    /// Max number of lock objects backing page lock handles
    pub lock_pool_size: usize,

    /// How long a borrower waits on an exhausted pool before polling again
    /// (milliseconds)
    pub pool_poll_interval_ms: u64,

    /// How long `LockManager::shutdown` waits for the reclaimer thread
    /// (milliseconds)
    pub shutdown_timeout_ms: u64,
}

/// How a read treats the key index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyLevel {
    /// Scan exactly the indexed page; a miss there is final.
    IndexOnly,

    /// After a miss, re-read the index and retry while it keeps pointing at
    /// a different page (closes the window where a concurrent upsert has
    /// tombstoned the old record but not yet published the new page).
    Revalidate,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./pageheap.db"),
            page_size: 4 * 1024,
            max_nr_pages: 5_000_000,
            sync_on_write: false,
            consistency: ConsistencyLevel::IndexOnly,
            page_cache_capacity: 1024,
            lock_pool_size: 25,
            pool_poll_interval_ms: 10,
            shutdown_timeout_ms: 1000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check that the values describe a usable store
    pub fn validate(&self) -> Result<()> {
        if self.page_size <= HEADER_SIZE {
            return Err(HeapError::Config(format!(
                "page_size must be larger than the {} byte record header, got {}",
                HEADER_SIZE, self.page_size
            )));
        }
        if self.max_nr_pages == 0 {
            return Err(HeapError::Config("max_nr_pages must be at least 1".to_string()));
        }
        // An upsert holds the tail page and the page of the old version
        if self.lock_pool_size < 2 {
            return Err(HeapError::Config(format!(
                "lock_pool_size must be at least 2, got {}",
                self.lock_pool_size
            )));
        }
        if self.page_cache_capacity == 0 {
            return Err(HeapError::Config(
                "page_cache_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn pool_poll_interval(&self) -> Duration {
        Duration::from_millis(self.pool_poll_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the backing heap file path
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.path = path.into();
        self
    }

    /// Set the page size (in bytes)
    pub fn page_size(mut self, size: usize) -> Self {
        self.config.page_size = size;
        self
    }

    /// Set the maximum number of pages
    pub fn max_nr_pages(mut self, count: u32) -> Self {
        self.config.max_nr_pages = count;
        self
    }

    /// fsync after every page write
    pub fn sync_on_write(mut self, sync: bool) -> Self {
        self.config.sync_on_write = sync;
        self
    }

    /// Set the read consistency level
    pub fn consistency(mut self, level: ConsistencyLevel) -> Self {
        self.config.consistency = level;
        self
    }

    /// Set the page cache capacity (in pages)
    pub fn page_cache_capacity(mut self, pages: usize) -> Self {
        self.config.page_cache_capacity = pages;
        self
    }

    /// Set the number of pooled lock objects
    pub fn lock_pool_size(mut self, size: usize) -> Self {
        self.config.lock_pool_size = size;
        self
    }

    /// Set the pool poll interval (in milliseconds)
    pub fn pool_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.pool_poll_interval_ms = ms;
        self
    }

    /// Set the lock manager shutdown timeout (in milliseconds)
    pub fn shutdown_timeout_ms(mut self, ms: u64) -> Self {
        self.config.shutdown_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
