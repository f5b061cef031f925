//! Tests for SSTable implementation
//!
//! These tests verify:
//! - SSTable creation and writing
//! - Sparse index lookups
//! - Tombstone handling
//! - Iterator over all entries
//! - Min/max key range filtering
//! - File format and checksum validation

use std::path::{Path, PathBuf};

use spillkv::storage::{SSTable, SSTableBuilder, SSTableReader};
use spillkv::StorageError;
use tempfile::TempDir;

const INTERVAL: usize = 4;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_sstable() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("test.sst");
    (temp_dir, path)
}

/// Create an SSTable with numbered entries
fn create_sstable_with_entries(path: &Path, count: usize) -> SSTable {
    let mut builder = SSTableBuilder::new(path, INTERVAL).unwrap();
    // Keys must be added in sorted order
    for i in 0..count {
        let key = format!("key{:05}", i); // Zero-padded for lexicographic order
        let value = format!("value{}", i);
        builder.add(key.as_bytes(), value.as_bytes()).unwrap();
    }
    builder.finish().unwrap()
}

// =============================================================================
// SSTableBuilder Tests
// =============================================================================

#[test]
fn test_builder_creates_file() {
    let (_temp, path) = setup_temp_sstable();

    let sstable = create_sstable_with_entries(&path, 5);

    assert!(path.exists());
    assert_eq!(sstable.entry_count(), 5);
    assert!(sstable.file_size > 0);
}

#[test]
fn test_builder_empty_sstable() {
    let (_temp, path) = setup_temp_sstable();

    let builder = SSTableBuilder::new(&path, INTERVAL).unwrap();
    let sstable = builder.finish().unwrap();

    assert_eq!(sstable.entry_count(), 0);
    assert!(!sstable.might_contain(b"anything"));
    assert!(path.exists());
}

#[test]
fn test_builder_tracks_min_max_keys() {
    let (_temp, path) = setup_temp_sstable();

    let mut builder = SSTableBuilder::new(&path, INTERVAL).unwrap();
    builder.add(b"apple", b"1").unwrap();
    builder.add(b"banana", b"2").unwrap();
    builder.add(b"cherry", b"3").unwrap();
    let sstable = builder.finish().unwrap();

    assert_eq!(sstable.min_key, b"apple");
    assert_eq!(sstable.max_key, b"cherry");
}

#[test]
fn test_builder_rejects_unsorted_keys() {
    let (_temp, path) = setup_temp_sstable();

    let mut builder = SSTableBuilder::new(&path, INTERVAL).unwrap();
    builder.add(b"banana", b"1").unwrap();

    assert!(matches!(builder.add(b"apple", b"2"), Err(StorageError::Corruption(_))));
    assert!(matches!(builder.add_tombstone(b"banana"), Err(StorageError::Corruption(_))));
    assert_eq!(builder.entry_count(), 1);
}

// =============================================================================
// SSTableReader Tests - Lookups
// =============================================================================

#[test]
fn test_reader_opens_valid_sstable() {
    let (_temp, path) = setup_temp_sstable();
    create_sstable_with_entries(&path, 10);

    let reader = SSTableReader::open(&path).unwrap();
    assert_eq!(reader.entry_count(), 10);
    assert_eq!(reader.min_key(), Some(&b"key00000"[..]));
    assert_eq!(reader.max_key(), Some(&b"key00009"[..]));
}

#[test]
fn test_reader_index_is_sparse() {
    let (_temp, path) = setup_temp_sstable();
    create_sstable_with_entries(&path, 10);

    let reader = SSTableReader::open(&path).unwrap();

    // Samples at 0, 4, 8 plus the last key
    assert_eq!(reader.index_len(), 4);
}

#[test]
fn test_reader_get_nonexistent_key() {
    let (_temp, path) = setup_temp_sstable();
    create_sstable_with_entries(&path, 5);

    let reader = SSTableReader::open(&path).unwrap();

    // Inside the range but absent, and outside the range
    assert!(matches!(reader.get(b"key00002x"), Err(StorageError::KeyNotFound)));
    assert!(matches!(reader.get(b"aaa"), Err(StorageError::KeyNotFound)));
    assert!(matches!(reader.get(b"zzz"), Err(StorageError::KeyNotFound)));
}

#[test]
fn test_reader_get_tombstone() {
    let (_temp, path) = setup_temp_sstable();

    let mut builder = SSTableBuilder::new(&path, INTERVAL).unwrap();
    builder.add(b"key1", b"value1").unwrap();
    builder.add_tombstone(b"key2").unwrap();
    builder.add(b"key3", b"value3").unwrap();
    builder.finish().unwrap();

    let reader = SSTableReader::open(&path).unwrap();

    // Tombstone returns Ok(None), not an error
    assert_eq!(reader.get(b"key2").unwrap(), None);

    // Other keys work normally
    assert_eq!(reader.get(b"key1").unwrap(), Some(b"value1".to_vec()));
    assert_eq!(reader.get(b"key3").unwrap(), Some(b"value3".to_vec()));
}

#[test]
fn test_reader_random_access() {
    let (_temp, path) = setup_temp_sstable();
    create_sstable_with_entries(&path, 50);

    let reader = SSTableReader::open(&path).unwrap();

    // Out of order, including keys between index samples
    for i in [45, 10, 30, 5, 49, 0, 25, 47, 1] {
        let key = format!("key{:05}", i);
        let value = reader.get(key.as_bytes()).unwrap().unwrap();
        assert_eq!(value, format!("value{}", i).as_bytes());
    }
}

// =============================================================================
// SSTableReader Tests - Iterator
// =============================================================================

#[test]
fn test_iterator_empty_sstable() {
    let (_temp, path) = setup_temp_sstable();

    SSTableBuilder::new(&path, INTERVAL).unwrap().finish().unwrap();

    let reader = SSTableReader::open(&path).unwrap();
    assert_eq!(reader.iter().unwrap().count(), 0);
}

#[test]
fn test_iterator_returns_all_entries_in_order() {
    let (_temp, path) = setup_temp_sstable();
    create_sstable_with_entries(&path, 10);

    let reader = SSTableReader::open(&path).unwrap();
    let entries: Vec<_> = reader.iter().unwrap().map(|r| r.unwrap()).collect();

    assert_eq!(entries.len(), 10);
    for (i, (key, value)) in entries.iter().enumerate() {
        assert_eq!(key, format!("key{:05}", i).as_bytes());
        assert_eq!(value.as_deref(), Some(format!("value{}", i).as_bytes()));
    }
}

#[test]
fn test_iterator_includes_tombstones() {
    let (_temp, path) = setup_temp_sstable();

    let mut builder = SSTableBuilder::new(&path, INTERVAL).unwrap();
    builder.add(b"a", b"1").unwrap();
    builder.add_tombstone(b"b").unwrap();
    builder.add(b"c", b"3").unwrap();
    builder.finish().unwrap();

    let reader = SSTableReader::open(&path).unwrap();
    let entries: Vec<_> = reader.iter().unwrap().map(|r| r.unwrap()).collect();

    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0], (b"a".to_vec(), Some(b"1".to_vec())));
    assert_eq!(entries[1], (b"b".to_vec(), None)); // Tombstone
    assert_eq!(entries[2], (b"c".to_vec(), Some(b"3".to_vec())));
}

#[test]
fn test_iterator_survives_file_removal() {
    let (_temp, path) = setup_temp_sstable();
    create_sstable_with_entries(&path, 20);

    let reader = SSTableReader::open(&path).unwrap();
    let iter = reader.iter().unwrap();
    drop(reader);
    std::fs::remove_file(&path).unwrap();

    assert_eq!(iter.map(|r| r.unwrap()).count(), 20);
}

// =============================================================================
// Large Data Tests
// =============================================================================

#[test]
fn test_large_values() {
    let (_temp, path) = setup_temp_sstable();

    let large_value = vec![0xAB; 1024 * 100]; // 100 KB

    let mut builder = SSTableBuilder::new(&path, INTERVAL).unwrap();
    builder.add(b"big_key", &large_value).unwrap();
    builder.finish().unwrap();

    let reader = SSTableReader::open(&path).unwrap();
    assert_eq!(reader.get(b"big_key").unwrap().unwrap(), large_value);
}

#[test]
fn test_many_entries() {
    let (_temp, path) = setup_temp_sstable();
    let sstable = create_sstable_with_entries(&path, 10_000);

    assert_eq!(sstable.entry_count(), 10_000);

    let reader = SSTableReader::open(&path).unwrap();
    assert_eq!(reader.get(b"key05000").unwrap().unwrap(), b"value5000");
    assert_eq!(reader.get(b"key09999").unwrap().unwrap(), b"value9999");
}

// =============================================================================
// Error Handling Tests
// =============================================================================

#[test]
fn test_open_nonexistent_file() {
    let (_temp, path) = setup_temp_sstable();

    assert!(matches!(SSTableReader::open(&path), Err(StorageError::Io(_))));
}

#[test]
fn test_open_garbage_file() {
    let (_temp, path) = setup_temp_sstable();

    std::fs::write(&path, b"GARBAGE_DATA_NOT_SSTABLE").unwrap();
    assert!(matches!(SSTableReader::open(&path), Err(StorageError::Corruption(_))));

    std::fs::write(&path, vec![0x42; 256]).unwrap();
    assert!(matches!(SSTableReader::open(&path), Err(StorageError::Corruption(_))));
}

#[test]
fn test_open_detects_flipped_data_byte() {
    let (_temp, path) = setup_temp_sstable();
    create_sstable_with_entries(&path, 10);

    let mut bytes = std::fs::read(&path).unwrap();
    // First value byte of the first entry: header(14) + lens(8) + key(8)
    bytes[14 + 8 + 8] ^= 0xFF;
    std::fs::write(&path, bytes).unwrap();

    assert!(matches!(SSTableReader::open(&path), Err(StorageError::Corruption(_))));
}
