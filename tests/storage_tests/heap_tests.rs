//! Tests for HeapFile
//!
//! These tests verify:
//! - Put/get/remove round trips
//! - Upserts leave exactly one live record per key
//! - Page-fit boundaries and oversized entries
//! - The page limit
//! - Reopening an existing heap file (index and tail recovery)
//! - End of file versus a partially written page
//! - Both consistency levels

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use pageheap::record::HEADER_SIZE;
use pageheap::storage::PageFile;
use pageheap::{Config, ConsistencyLevel, HeapError, HeapFile};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn setup_temp_heap() -> (TempDir, PathBuf) {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("heap.db");
    (temp_dir, path)
}

fn open_heap(path: &Path, page_size: usize, max_nr_pages: u32) -> HeapFile {
    let config = Config::builder()
        .path(path)
        .page_size(page_size)
        .max_nr_pages(max_nr_pages)
        .build();
    HeapFile::open(config).unwrap()
}

/// Value bytes so that the whole record is exactly `record_size` bytes
fn value_for(key: &[u8], record_size: usize) -> Vec<u8> {
    vec![b'v'; record_size - HEADER_SIZE - key.len()]
}

fn live_keys(heap: &HeapFile) -> Vec<Vec<u8>> {
    let mut keys: Vec<Vec<u8>> = heap.iter().map(|r| r.unwrap().key().to_vec()).collect();
    keys.sort();
    keys
}

// =============================================================================
// Round Trip Tests
// =============================================================================

#[test]
fn test_put_get_remove_scenario() {
    let (_temp, path) = setup_temp_heap();
    let heap = open_heap(&path, 4096, 100);

    let value = vec![7u8; 100];
    heap.put(b"a", &value).unwrap();
    assert_eq!(heap.get(b"a").unwrap().unwrap(), &value[..]);

    let new_value = vec![9u8; 100];
    heap.put(b"a", &new_value).unwrap();
    assert_eq!(heap.get(b"a").unwrap().unwrap(), &new_value[..]);

    assert_eq!(heap.remove(b"a").unwrap().unwrap(), &new_value[..]);
    assert!(heap.get(b"a").unwrap().is_none());
}

#[test]
fn test_get_missing_key() {
    let (_temp, path) = setup_temp_heap();
    let heap = open_heap(&path, 4096, 100);

    assert!(heap.get(b"nope").unwrap().is_none());
    assert!(heap.is_empty());
}

#[test]
fn test_remove_is_idempotent() {
    let (_temp, path) = setup_temp_heap();
    let heap = open_heap(&path, 4096, 100);

    heap.put(b"k", b"v").unwrap();
    assert!(heap.remove(b"k").unwrap().is_some());
    assert!(heap.remove(b"k").unwrap().is_none());
    assert!(heap.remove(b"never").unwrap().is_none());

    assert_eq!(heap.indexed_page(b"k"), None);
    assert!(heap.is_empty());
}

#[test]
fn test_empty_key_and_value() {
    let (_temp, path) = setup_temp_heap();
    let heap = open_heap(&path, 4096, 100);

    heap.put(b"", b"").unwrap();
    assert_eq!(heap.get(b"").unwrap().unwrap().len(), 0);
}

#[test]
fn test_many_keys_across_pages() {
    let (_temp, path) = setup_temp_heap();
    let heap = open_heap(&path, 256, 1000);

    for i in 0..200u32 {
        heap.put(&i.to_be_bytes(), format!("value-{i}").as_bytes()).unwrap();
    }

    assert!(heap.last_page_nr() > 0);
    assert_eq!(heap.len(), 200);
    for i in 0..200u32 {
        let value = heap.get(&i.to_be_bytes()).unwrap().unwrap();
        assert_eq!(value, format!("value-{i}").as_bytes());
    }
}

// =============================================================================
// Upsert Tests
// =============================================================================

#[test]
fn test_upsert_keeps_one_live_record() {
    let (_temp, path) = setup_temp_heap();
    let heap = open_heap(&path, 4096, 100);

    for round in 0..10u8 {
        heap.put(b"x", &[round; 16]).unwrap();
        heap.put(b"y", &[round; 16]).unwrap();
    }

    assert_eq!(live_keys(&heap), vec![b"x".to_vec(), b"y".to_vec()]);
    assert_eq!(heap.get(b"x").unwrap().unwrap(), &[9u8; 16][..]);
}

#[test]
fn test_upsert_across_pages_tombstones_old_page() {
    let (_temp, path) = setup_temp_heap();
    let heap = open_heap(&path, 64, 100);

    heap.put(b"k", &value_for(b"k", 40)).unwrap();
    assert_eq!(heap.indexed_page(b"k"), Some(0));

    // Doesn't fit behind the first record: goes to page 1
    heap.put(b"other", &value_for(b"other", 40)).unwrap();
    heap.put(b"k", &value_for(b"k", 20)).unwrap();
    assert_eq!(heap.indexed_page(b"k"), Some(1));

    let records: Vec<_> = heap.iter().map(|r| r.unwrap()).collect();
    assert_eq!(records.len(), 2);
    assert_eq!(records.iter().filter(|r| r.key() == b"k").count(), 1);
    assert_eq!(heap.get(b"k").unwrap().unwrap().len(), 20 - HEADER_SIZE - 1);
}

// =============================================================================
// Page Fit Tests
// =============================================================================

#[test]
fn test_record_one_byte_short_of_page_fits() {
    let (_temp, path) = setup_temp_heap();
    let heap = open_heap(&path, 64, 100);

    heap.put(b"a", &value_for(b"a", 63)).unwrap();
    assert_eq!(heap.last_page_nr(), 0);

    // Even a tiny record needs a new page now
    heap.put(b"b", b"").unwrap();
    assert_eq!(heap.last_page_nr(), 1);
    assert_eq!(heap.indexed_page(b"b"), Some(1));
}

#[test]
fn test_record_filling_remaining_space_moves_to_next_page() {
    let (_temp, path) = setup_temp_heap();
    let heap = open_heap(&path, 64, 100);

    heap.put(b"a", &value_for(b"a", 32)).unwrap();
    heap.put(b"b", &value_for(b"b", 32)).unwrap();

    assert_eq!(heap.indexed_page(b"a"), Some(0));
    assert_eq!(heap.indexed_page(b"b"), Some(1));
}

#[test]
fn test_record_as_large_as_page_is_rejected() {
    let (_temp, path) = setup_temp_heap();
    let heap = open_heap(&path, 64, 100);

    let result = heap.put(b"a", &value_for(b"a", 64));
    assert!(matches!(
        result,
        Err(HeapError::EntryTooLarge { size: 64, page_size: 64 })
    ));
    assert!(heap.is_empty());
}

#[test]
fn test_record_as_large_as_page_is_rejected_on_full_store() {
    let (_temp, path) = setup_temp_heap();
    let heap = open_heap(&path, 64, 100);

    for i in 0..5u8 {
        heap.put(&[i], &value_for(&[i], 40)).unwrap();
    }
    let last_page = heap.last_page_nr();
    let len = heap.len();
    assert_eq!(last_page, 4);

    let result = heap.put(b"big", &value_for(b"big", 64));
    assert!(matches!(
        result,
        Err(HeapError::EntryTooLarge { size: 64, page_size: 64 })
    ));

    // Nothing was written: no new page, no new key, old values intact
    assert_eq!(heap.last_page_nr(), last_page);
    assert_eq!(heap.len(), len);
    assert!(heap.get(b"big").unwrap().is_none());
    assert_eq!(live_keys(&heap).len(), 5);

    // Also when the key already exists
    assert!(heap.put(&[2], &value_for(&[2], 64)).is_err());
    assert_eq!(heap.get(&[2]).unwrap().unwrap().len(), 40 - HEADER_SIZE - 1);
    assert_eq!(heap.last_page_nr(), last_page);
}

#[test]
fn test_oversized_field_is_rejected() {
    let (_temp, path) = setup_temp_heap();
    let heap = open_heap(&path, 256 * 1024, 10);

    let value = vec![0u8; u16::MAX as usize + 1];
    assert!(matches!(
        heap.put(b"a", &value),
        Err(HeapError::EntryTooLarge { .. })
    ));
}

// =============================================================================
// Capacity Tests
// =============================================================================

#[test]
fn test_page_limit_is_enforced() {
    let (_temp, path) = setup_temp_heap();
    let heap = open_heap(&path, 64, 2);

    heap.put(b"a", &value_for(b"a", 40)).unwrap();
    heap.put(b"b", &value_for(b"b", 40)).unwrap();

    let result = heap.put(b"c", &value_for(b"c", 40));
    assert!(matches!(
        result,
        Err(HeapError::CapacityExceeded { max_nr_pages: 2 })
    ));

    // Small records still fit behind "b"
    heap.put(b"d", b"x").unwrap();
    assert_eq!(heap.last_page_nr(), 1);
}

#[test]
fn test_failed_put_leaves_old_value() {
    let (_temp, path) = setup_temp_heap();
    let heap = open_heap(&path, 64, 2);

    heap.put(b"a", &value_for(b"a", 40)).unwrap();
    heap.put(b"b", &value_for(b"b", 40)).unwrap();

    assert!(heap.put(b"b", &value_for(b"b", 40)).is_err());
    assert_eq!(heap.get(b"b").unwrap().unwrap().len(), 40 - HEADER_SIZE - 1);
}

// =============================================================================
// Config Tests
// =============================================================================

#[test]
fn test_invalid_config_is_rejected() {
    let (_temp, path) = setup_temp_heap();

    let tiny_pages = Config::builder().path(&path).page_size(HEADER_SIZE).build();
    assert!(matches!(HeapFile::open(tiny_pages), Err(HeapError::Config(_))));

    let no_pages = Config::builder().path(&path).max_nr_pages(0).build();
    assert!(matches!(HeapFile::open(no_pages), Err(HeapError::Config(_))));

    let one_lock = Config::builder().path(&path).lock_pool_size(1).build();
    assert!(matches!(HeapFile::open(one_lock), Err(HeapError::Config(_))));
}

#[test]
fn test_revalidate_consistency() {
    let (_temp, path) = setup_temp_heap();
    let config = Config::builder()
        .path(&path)
        .page_size(128)
        .consistency(ConsistencyLevel::Revalidate)
        .build();
    let heap = HeapFile::open(config).unwrap();

    for i in 0..20u8 {
        heap.put(b"moving", &[i; 60]).unwrap();
        assert_eq!(heap.get(b"moving").unwrap().unwrap(), &[i; 60][..]);
    }
    assert!(heap.remove(b"moving").unwrap().is_some());
    assert!(heap.get(b"moving").unwrap().is_none());
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_reopen_recovers_index() {
    let (_temp, path) = setup_temp_heap();

    {
        let heap = open_heap(&path, 128, 100);
        for i in 0..30u8 {
            heap.put(&[i], &[i; 20]).unwrap();
        }
        heap.put(&[3], b"updated").unwrap();
        heap.remove(&[5]).unwrap();
        heap.close().unwrap();
    }

    let heap = open_heap(&path, 128, 100);
    assert_eq!(heap.len(), 29);
    assert_eq!(heap.get(&[0]).unwrap().unwrap(), &[0u8; 20][..]);
    assert_eq!(heap.get(&[3]).unwrap().unwrap(), &b"updated"[..]);
    assert!(heap.get(&[5]).unwrap().is_none());
}

#[test]
fn test_reopen_appends_after_existing_records() {
    let (_temp, path) = setup_temp_heap();

    let last_page = {
        let heap = open_heap(&path, 128, 100);
        for i in 0..10u8 {
            heap.put(&[i], &[i; 20]).unwrap();
        }
        let last = heap.last_page_nr();
        heap.close().unwrap();
        last
    };

    let heap = open_heap(&path, 128, 100);
    assert_eq!(heap.last_page_nr(), last_page);

    heap.put(b"new", b"value").unwrap();
    heap.put(&[9], b"changed").unwrap();

    assert_eq!(live_keys(&heap).len(), 11);
    for i in 0..9u8 {
        assert_eq!(heap.get(&[i]).unwrap().unwrap(), &[i; 20][..]);
    }
    assert_eq!(heap.get(&[9]).unwrap().unwrap(), &b"changed"[..]);
}

#[test]
fn test_reopen_empty_file() {
    let (_temp, path) = setup_temp_heap();

    open_heap(&path, 128, 100).close().unwrap();
    let heap = open_heap(&path, 128, 100);

    assert!(heap.is_empty());
    assert_eq!(heap.last_page_nr(), 0);
    assert_eq!(heap.iter().count(), 0);
}

#[test]
fn test_reopen_with_partial_trailing_page_fails() {
    let (_temp, path) = setup_temp_heap();

    {
        let heap = open_heap(&path, 64, 100);
        heap.put(b"a", b"value").unwrap();
        heap.close().unwrap();
    }

    // Two stray bytes start a page that never got written in full
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&[1, 0]).unwrap();
    drop(file);

    let config = Config::builder().path(&path).page_size(64).build();
    assert!(matches!(
        HeapFile::open(config),
        Err(HeapError::CorruptPage {
            page_nr: 1,
            expected: 64,
            actual: 2
        })
    ));
}

#[test]
fn test_page_file_end_of_file_vs_short_page() {
    let (_temp, path) = setup_temp_heap();
    let file = PageFile::open(&path, 64, false).unwrap();

    assert!(file.read_page(0).unwrap().is_none());

    file.write_page(0, &[7u8; 64]).unwrap();
    assert_eq!(file.page_count().unwrap(), 1);
    assert_eq!(&file.read_page(0).unwrap().unwrap()[..], &[7u8; 64][..]);

    // Clean end of file: no such page
    assert!(file.read_page(1).unwrap().is_none());
    assert!(file.read_page(9).unwrap().is_none());

    let mut raw = OpenOptions::new().append(true).open(&path).unwrap();
    raw.write_all(&[1, 2, 3]).unwrap();
    drop(raw);

    // Short read inside a page: corrupt
    assert_eq!(file.page_count().unwrap(), 2);
    assert!(matches!(
        file.read_page(1),
        Err(HeapError::CorruptPage {
            page_nr: 1,
            expected: 64,
            actual: 3
        })
    ));
    assert!(file.read_page(2).unwrap().is_none());
}
