//! Engine Module
//!
//! Typed facade over the heap file store.
//!
//! ## Responsibilities
//! - Encode keys and values with bincode before they reach the store
//! - Decode stored values back into caller types
//! - Expose the flat put/get/remove `Store` contract

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Result;
use crate::storage::HeapFile;

/// A key and a value, the unit callers store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry<K, V> {
    pub key: K,
    pub value: V,
}

impl<K, V> Entry<K, V> {
    pub fn new(key: K, value: V) -> Self {
        Self { key, value }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }
}

/// Flat key-value store contract
///
/// Identical logical keys must serialize to identical bytes; bincode
/// guarantees that for the same value of the same type.
pub trait Store {
    /// Store an entry, replacing any previous value of its key
    fn put<K, V>(&self, entry: &Entry<K, V>) -> Result<()>
    where
        K: Serialize,
        V: Serialize;

    /// Get the value stored under `key`
    fn get<K, V>(&self, key: &K) -> Result<Option<V>>
    where
        K: Serialize,
        V: DeserializeOwned;

    /// Remove `key`, returning its value
    fn remove<K, V>(&self, key: &K) -> Result<Option<V>>
    where
        K: Serialize,
        V: DeserializeOwned;
}

/// The storage engine: a heap file with serde-encoded keys and values
pub struct Engine {
    heap: HeapFile,
}

impl Engine {
    /// Open or create an engine with the given config
    pub fn open(config: Config) -> Result<Self> {
        Ok(Self {
            heap: HeapFile::open(config)?,
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified heap file
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().path(path).build())
    }

    /// Decode every live entry, page by page
    pub fn entries<K, V>(&self) -> impl Iterator<Item = Result<Entry<K, V>>> + '_
    where
        K: DeserializeOwned,
        V: DeserializeOwned,
    {
        self.heap.iter().map(|record| -> Result<Entry<K, V>> {
            let record = record?;
            Ok(Entry::new(
                bincode::deserialize(record.key())?,
                bincode::deserialize(record.value())?,
            ))
        })
    }

    /// Close the engine gracefully
    pub fn close(self) -> Result<()> {
        self.heap.close()
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// The underlying byte-level store
    pub fn heap(&self) -> &HeapFile {
        &self.heap
    }

    pub fn config(&self) -> &Config {
        self.heap.config()
    }
}

impl Store for Engine {
    fn put<K, V>(&self, entry: &Entry<K, V>) -> Result<()>
    where
        K: Serialize,
        V: Serialize,
    {
        let key = bincode::serialize(&entry.key)?;
        let value = bincode::serialize(&entry.value)?;
        self.heap.put(&key, &value)
    }

    fn get<K, V>(&self, key: &K) -> Result<Option<V>>
    where
        K: Serialize,
        V: DeserializeOwned,
    {
        let key = bincode::serialize(key)?;
        match self.heap.get(&key)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    fn remove<K, V>(&self, key: &K) -> Result<Option<V>>
    where
        K: Serialize,
        V: DeserializeOwned,
    {
        let key = bincode::serialize(key)?;
        match self.heap.remove(&key)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }
}
