//! Tests for SpillableMap
//!
//! These tests verify:
//! - Memory-only behavior
//! - Spill events at the byte budget
//! - Reads, overwrites and deletes across both stages
//! - Every key lives in at most one stage
//! - Iteration yields each live key exactly once
//! - Close releases the spill partition

use std::collections::HashMap;
use std::sync::Arc;

use spillkv::map::SpillableMap;
use spillkv::{BincodeSerializer, EngineHandle, RawBytesSerializer, SpillConfig, SpillError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

type ByteMap = SpillableMap<u32, Vec<u8>>;

fn setup_engine() -> (TempDir, Arc<EngineHandle>) {
    let temp_dir = TempDir::new().unwrap();
    let engine = EngineHandle::open(temp_dir.path().join("engine")).unwrap();
    (temp_dir, Arc::new(engine))
}

fn setup_engine_with_small_buffer() -> (TempDir, Arc<EngineHandle>) {
    let temp_dir = TempDir::new().unwrap();
    let config = SpillConfig::builder()
        .write_buffer_bytes(256)
        .max_sstables(2)
        .build();
    let engine = EngineHandle::open_with_config(temp_dir.path().join("engine"), config).unwrap();
    (temp_dir, Arc::new(engine))
}

fn spillable(engine: &Arc<EngineHandle>, budget: u64, partition: &str) -> ByteMap {
    SpillableMap::spillable(
        budget,
        partition,
        Arc::clone(engine),
        BincodeSerializer::<u32>::new(),
        RawBytesSerializer,
    )
    .unwrap()
}

fn memory_only() -> ByteMap {
    SpillableMap::memory_only(BincodeSerializer::<u32>::new(), RawBytesSerializer)
}

/// 30-byte value tagged with its key
fn value30(key: u32, version: u8) -> Vec<u8> {
    let mut value = vec![version; 30];
    value[..4].copy_from_slice(&key.to_be_bytes());
    value
}

fn collect(map: &ByteMap) -> HashMap<u32, Vec<u8>> {
    let mut out = HashMap::new();
    for entry in map.iter().unwrap() {
        let (key, value) = entry.unwrap();
        assert!(out.insert(key, value).is_none(), "key {key} yielded twice");
    }
    out
}

fn assert_single_stage(map: &ByteMap, key: u32) {
    let in_memory = map.in_memory(&key).unwrap();
    let in_spill = map.in_spill(&key).unwrap();
    assert!(!(in_memory && in_spill), "key {key} is in both stages");
}

// =============================================================================
// Memory-only Tests
// =============================================================================

#[test]
fn test_memory_only_put_get_delete() {
    let mut map = memory_only();

    map.put(&1, &b"one".to_vec()).unwrap();
    map.put(&2, &b"two".to_vec()).unwrap();

    assert_eq!(map.get(&1).unwrap(), Some(b"one".to_vec()));
    assert_eq!(map.get(&3).unwrap(), None);
    assert!(map.contains_key(&2).unwrap());

    map.delete(&1).unwrap();
    assert_eq!(map.get(&1).unwrap(), None);
    assert!(!map.is_spillable());
    assert_eq!(map.partition_id(), None);
}

#[test]
fn test_memory_only_never_spills() {
    let mut map = memory_only();

    for i in 0..1000 {
        map.put(&i, &value30(i, 0)).unwrap();
    }

    assert_eq!(map.memory_len(), 1000);
    assert_eq!(map.memory_tally(), 30_000);
    assert!(!map.has_spilled());
    assert_eq!(map.spill_count(), 0);
    assert!(matches!(map.spill(), Err(SpillError::InvalidArgument(_))));
}

// =============================================================================
// Spill Tests
// =============================================================================

#[test]
fn test_spill_at_budget() {
    let (_temp, engine) = setup_engine();
    let mut map = spillable(&engine, 100, "budget");

    for i in 1..=3 {
        map.put(&i, &value30(i, 0)).unwrap();
    }
    assert!(!map.has_spilled());
    assert_eq!(map.memory_tally(), 90);
    assert!(!engine.has_partition("budget"));

    // 4th write: 120 bytes > 100
    map.put(&4, &value30(4, 0)).unwrap();
    assert!(map.has_spilled());
    assert_eq!(map.spill_count(), 1);
    assert_eq!(map.memory_len(), 0);
    assert_eq!(map.memory_tally(), 0);
    assert!(engine.has_partition("budget"));

    map.put(&5, &value30(5, 0)).unwrap();
    assert_eq!(map.memory_tally(), 30);
    assert_eq!(map.memory_len(), 1);

    for i in 1..=5 {
        assert_eq!(map.get(&i).unwrap(), Some(value30(i, 0)));
    }
    for i in 1..=4 {
        assert!(map.in_spill(&i).unwrap());
    }
    assert!(map.in_memory(&5).unwrap());
}

#[test]
fn test_tally_exactly_at_budget_does_not_spill() {
    let (_temp, engine) = setup_engine();
    let mut map = spillable(&engine, 90, "exact");

    for i in 1..=3 {
        map.put(&i, &value30(i, 0)).unwrap();
    }

    assert!(!map.has_spilled());
    map.put(&4, &value30(4, 0)).unwrap();
    assert!(map.has_spilled());
}

#[test]
fn test_repeated_spills() {
    let (_temp, engine) = setup_engine_with_small_buffer();
    let mut map = spillable(&engine, 100, "repeat");

    for i in 0..100 {
        map.put(&i, &value30(i, 0)).unwrap();
    }

    // One spill every 4 writes
    assert_eq!(map.spill_count(), 25);
    assert_eq!(map.memory_len(), 0);
    for i in 0..100 {
        assert_eq!(map.get(&i).unwrap(), Some(value30(i, 0)));
    }
}

#[test]
fn test_zero_budget_spills_every_write() {
    let (_temp, engine) = setup_engine();
    let mut map = spillable(&engine, 0, "zero");

    map.put(&1, &value30(1, 0)).unwrap();
    map.put(&2, &value30(2, 0)).unwrap();

    assert_eq!(map.spill_count(), 2);
    assert_eq!(map.memory_len(), 0);
    assert_eq!(map.get(&1).unwrap(), Some(value30(1, 0)));
}

#[test]
fn test_explicit_spill() {
    let (_temp, engine) = setup_engine();
    let mut map = spillable(&engine, 1_000_000, "manual");
    map.put(&1, &value30(1, 0)).unwrap();

    map.spill().unwrap();

    assert!(map.in_spill(&1).unwrap());
    assert!(!map.in_memory(&1).unwrap());
    assert_eq!(map.memory_tally(), 0);
}

// =============================================================================
// Overwrite / Delete Tests
// =============================================================================

#[test]
fn test_overwrite_before_spill() {
    let (_temp, engine) = setup_engine();
    let mut map = spillable(&engine, 1000, "overwrite");

    map.put(&7, &value30(7, 1)).unwrap();
    map.put(&7, &value30(7, 2)).unwrap();

    assert_eq!(map.get(&7).unwrap(), Some(value30(7, 2)));
    assert_eq!(map.memory_len(), 1);
    assert!(!map.in_spill(&7).unwrap());
    assert_eq!(collect(&map).len(), 1);
}

#[test]
fn test_tally_counts_overwrites() {
    let mut map = memory_only();

    map.put(&1, &value30(1, 1)).unwrap();
    map.put(&1, &value30(1, 2)).unwrap();
    map.delete(&1).unwrap();

    assert_eq!(map.memory_len(), 0);
    assert_eq!(map.memory_tally(), 60);
}

#[test]
fn test_overwrite_after_spill_stays_in_spill() {
    let (_temp, engine) = setup_engine();
    let mut map = spillable(&engine, 100, "respill");
    for i in 1..=4 {
        map.put(&i, &value30(i, 1)).unwrap();
    }
    assert!(map.has_spilled());

    map.put(&2, &value30(2, 9)).unwrap();

    assert_eq!(map.get(&2).unwrap(), Some(value30(2, 9)));
    assert!(map.in_spill(&2).unwrap());
    assert!(!map.in_memory(&2).unwrap());
    assert_eq!(map.memory_tally(), 0);
}

#[test]
fn test_delete_in_each_stage() {
    let (_temp, engine) = setup_engine();
    let mut map = spillable(&engine, 100, "delete");
    for i in 1..=5 {
        map.put(&i, &value30(i, 0)).unwrap();
    }

    // 1 is spilled, 5 is in memory
    map.delete(&1).unwrap();
    map.delete(&5).unwrap();

    assert_eq!(map.get(&1).unwrap(), None);
    assert_eq!(map.get(&5).unwrap(), None);
    assert!(!map.in_spill(&1).unwrap());
    assert!(!map.in_memory(&5).unwrap());
    assert_eq!(collect(&map).len(), 3);
}

#[test]
fn test_delete_never_written_key() {
    let (_temp, engine) = setup_engine();
    let mut map = spillable(&engine, 100, "ghost");

    map.delete(&42).unwrap();
    assert_eq!(map.get(&42).unwrap(), None);

    for i in 1..=4 {
        map.put(&i, &value30(i, 0)).unwrap();
    }
    map.delete(&42).unwrap();
    assert_eq!(map.get(&42).unwrap(), None);
}

#[test]
fn test_reinsert_after_spilled_delete() {
    let (_temp, engine) = setup_engine();
    let mut map = spillable(&engine, 100, "reinsert");
    for i in 1..=4 {
        map.put(&i, &value30(i, 1)).unwrap();
    }
    map.delete(&3).unwrap();

    map.put(&3, &value30(3, 2)).unwrap();

    assert!(map.in_memory(&3).unwrap());
    assert!(!map.in_spill(&3).unwrap());
    assert_eq!(map.get(&3).unwrap(), Some(value30(3, 2)));
}

// =============================================================================
// Stage Exclusivity / Iteration Tests
// =============================================================================

#[test]
fn test_mixed_workload_matches_model() {
    let (_temp, engine) = setup_engine_with_small_buffer();
    let mut map = spillable(&engine, 150, "model");
    let mut model: HashMap<u32, Vec<u8>> = HashMap::new();

    // Deterministic pseudo-random mix of puts and deletes
    let mut state = 0x2545_F491u32;
    for step in 0..2000u32 {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let key = state % 64;

        if state % 5 == 0 {
            map.delete(&key).unwrap();
            model.remove(&key);
        } else {
            let value = value30(key, (step % 251) as u8);
            map.put(&key, &value).unwrap();
            model.insert(key, value);
        }
    }

    assert!(map.spill_count() > 0);
    for key in 0..64 {
        assert_single_stage(&map, key);
        assert_eq!(map.get(&key).unwrap(), model.get(&key).cloned());
    }
    assert_eq!(collect(&map), model);
}

#[test]
fn test_iteration_memory_then_spill_in_key_order() {
    let (_temp, engine) = setup_engine();
    let mut map = SpillableMap::spillable(
        60,
        "ordered",
        Arc::clone(&engine),
        RawBytesSerializer,
        RawBytesSerializer,
    )
    .unwrap();

    // 80 bytes > 60 on the 4th write: all four spill
    for key in [b"c", b"a", b"d", b"b"] {
        map.put(&key.to_vec(), &vec![b'v'; 20]).unwrap();
    }
    map.put(&b"f".to_vec(), &vec![b'v'; 20]).unwrap();
    map.put(&b"e".to_vec(), &vec![b'v'; 20]).unwrap();

    let keys: Vec<Vec<u8>> = map.iter().unwrap().map(|r| r.unwrap().0).collect();
    let memory_keys = map.memory_len();

    assert_eq!(memory_keys, 2);
    let mut head: Vec<Vec<u8>> = keys[..memory_keys].to_vec();
    head.sort();
    assert_eq!(head, vec![b"e".to_vec(), b"f".to_vec()]);
    assert_eq!(
        keys[memory_keys..].to_vec(),
        vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec()]
    );
}

#[test]
fn test_iteration_is_restartable() {
    let (_temp, engine) = setup_engine();
    let mut map = spillable(&engine, 100, "restart");
    for i in 0..10 {
        map.put(&i, &value30(i, 0)).unwrap();
    }

    let first = collect(&map);
    let second = collect(&map);

    assert_eq!(first.len(), 10);
    assert_eq!(first, second);
}

// =============================================================================
// Validation / Lifecycle Tests
// =============================================================================

#[test]
fn test_empty_value_rejected() {
    let (_temp, engine) = setup_engine();
    let mut map = spillable(&engine, 100, "empty");

    let result = map.put(&1, &Vec::new());

    assert!(matches!(result, Err(SpillError::InvalidArgument(_))));
    assert_eq!(map.get(&1).unwrap(), None);
}

#[test]
fn test_invalid_partition_id_rejected() {
    let (_temp, engine) = setup_engine();

    let result = SpillableMap::<u32, Vec<u8>>::spillable(
        100,
        "../escape",
        Arc::clone(&engine),
        BincodeSerializer::<u32>::new(),
        RawBytesSerializer,
    );

    assert!(matches!(result, Err(SpillError::InvalidArgument(_))));
}

#[test]
fn test_close_drops_partition_and_is_idempotent() {
    let (_temp, engine) = setup_engine();
    let mut map = spillable(&engine, 100, "closing");
    for i in 1..=5 {
        map.put(&i, &value30(i, 0)).unwrap();
    }
    assert!(engine.has_partition("closing"));

    map.close();
    map.close();

    assert!(map.is_closed());
    assert!(!engine.has_partition("closing"));
    assert!(matches!(map.get(&1), Err(SpillError::InvalidArgument(_))));
    assert!(matches!(map.put(&1, &value30(1, 0)), Err(SpillError::InvalidArgument(_))));
    assert!(map.iter().is_err());
}

#[test]
fn test_drop_releases_partition() {
    let (_temp, engine) = setup_engine();
    {
        let mut map = spillable(&engine, 10, "scoped");
        map.put(&1, &value30(1, 0)).unwrap();
        assert!(engine.has_partition("scoped"));
    }

    assert!(!engine.has_partition("scoped"));
}

#[test]
fn test_maps_share_engine_with_distinct_partitions() {
    let (_temp, engine) = setup_engine();
    let mut a = spillable(&engine, 50, "map-a");
    let mut b = spillable(&engine, 50, "map-b");

    for i in 0..10 {
        a.put(&i, &value30(i, 1)).unwrap();
        b.put(&i, &value30(i, 2)).unwrap();
    }

    assert_eq!(engine.partition_names(), vec!["map-a".to_string(), "map-b".to_string()]);
    assert_eq!(a.get(&3).unwrap(), Some(value30(3, 1)));
    assert_eq!(b.get(&3).unwrap(), Some(value30(3, 2)));

    a.close();
    assert_eq!(b.get(&9).unwrap(), Some(value30(9, 2)));
}

#[test]
fn test_failed_spill_aborts_put() {
    let (_temp, engine) = setup_engine_with_small_buffer();
    let mut map = spillable(&engine, 100, "broken");
    map.put(&1, &vec![1; 200]).unwrap();
    assert_eq!(map.spill_count(), 1);

    // The second spill overflows the write buffer and has to flush
    let dir = engine.root().join("partitions").join("broken");
    std::fs::remove_dir_all(&dir).unwrap();
    let result = map.put(&2, &vec![2; 200]);

    assert!(matches!(result, Err(SpillError::EngineOpen { .. })));
    assert_eq!(map.spill_count(), 1);

    map.close();
    map.close();
    assert!(map.is_closed());
    assert!(!engine.has_partition("broken"));
}

#[test]
fn test_map_on_closed_engine_rejected() {
    let (_temp, engine) = setup_engine();
    engine.close();

    let result = SpillableMap::<u32, Vec<u8>>::spillable(
        100,
        "late",
        engine,
        BincodeSerializer::<u32>::new(),
        RawBytesSerializer,
    );

    assert!(matches!(result, Err(SpillError::InvalidArgument(_))));
}
