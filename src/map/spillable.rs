//! Hybrid Spillable Map
//!
//! A typed map that keeps entries in memory until a byte budget is exceeded,
//! then moves the whole memory stage into an engine partition and keeps
//! going with an empty memory stage.

use std::sync::Arc;

use crate::engine::{validate_partition_name, EngineHandle, PartitionScan};
use crate::error::{Result, SpillError};
use crate::serializer::Serializer;

use super::memory::MemoryStage;

/// Partition a spill-capable map overflows into
struct SpillStage {
    engine: Arc<EngineHandle>,
    partition_id: String,
    max_in_memory_bytes: u64,
    /// The partition is created on the first spill event
    created: bool,
    spill_count: u64,
}

impl SpillStage {
    /// The stage only holds entries once its partition exists
    fn live(&self) -> Option<&Self> {
        self.created.then_some(self)
    }
}

/// Map over typed keys and values with a bounded memory stage
///
/// Every key lives in exactly one stage. Keys are compared by their
/// serialized bytes. Mutation takes `&mut self`, so a map has a single owner;
/// share the [`EngineHandle`] instead, one partition per map.
///
/// ```
/// use spillkv::map::SpillableMap;
/// use spillkv::serializer::BincodeSerializer;
///
/// let mut map = SpillableMap::memory_only(
///     BincodeSerializer::<u64>::new(),
///     BincodeSerializer::<String>::new(),
/// );
/// map.put(&1, &"one".to_string()).unwrap();
/// assert_eq!(map.get(&1).unwrap(), Some("one".to_string()));
/// map.close();
/// ```
pub struct SpillableMap<K, V> {
    memory: MemoryStage,
    spill: Option<SpillStage>,
    key_serializer: Box<dyn Serializer<K>>,
    value_serializer: Box<dyn Serializer<V>>,
    closed: bool,
}

impl<K, V> SpillableMap<K, V> {
    /// A map that never spills
    pub fn memory_only<KS, VS>(key_serializer: KS, value_serializer: VS) -> Self
    where
        KS: Serializer<K> + 'static,
        VS: Serializer<V> + 'static,
    {
        Self {
            memory: MemoryStage::new(),
            spill: None,
            key_serializer: Box::new(key_serializer),
            value_serializer: Box::new(value_serializer),
            closed: false,
        }
    }

    /// A map that spills into partition `partition_id` of `engine` once more
    /// than `max_in_memory_bytes` of values have been written to memory
    ///
    /// The partition id must be unique among open maps on this engine.
    pub fn spillable<KS, VS>(
        max_in_memory_bytes: u64,
        partition_id: impl Into<String>,
        engine: Arc<EngineHandle>,
        key_serializer: KS,
        value_serializer: VS,
    ) -> Result<Self>
    where
        KS: Serializer<K> + 'static,
        VS: Serializer<V> + 'static,
    {
        let partition_id = partition_id.into();
        validate_partition_name(&partition_id)?;
        if engine.is_closed() {
            return Err(SpillError::InvalidArgument(format!(
                "cannot create map {partition_id} on a closed engine handle"
            )));
        }

        Ok(Self {
            memory: MemoryStage::new(),
            spill: Some(SpillStage {
                engine,
                partition_id,
                max_in_memory_bytes,
                created: false,
                spill_count: 0,
            }),
            key_serializer: Box::new(key_serializer),
            value_serializer: Box::new(value_serializer),
            closed: false,
        })
    }

    // =========================================================================
    // Map Operations
    // =========================================================================

    /// Insert or overwrite an entry
    ///
    /// A key already in the spill stage is overwritten there. Anything else
    /// goes to memory; if the memory tally then exceeds the budget, the whole
    /// memory stage is spilled. A failed spill aborts the put and the memory
    /// entries being moved are not guaranteed to be in either stage.
    pub fn put(&mut self, key: &K, value: &V) -> Result<()> {
        self.ensure_open()?;
        let key_bytes = self.key_serializer.serialize(key)?;
        let value_bytes = self.value_serializer.serialize(value)?;
        check_bytes(&key_bytes, "key")?;
        check_bytes(&value_bytes, "value")?;

        if !self.memory.contains(&key_bytes) {
            if let Some(stage) = self.spill.as_ref().and_then(SpillStage::live) {
                if stage.engine.get(&stage.partition_id, &key_bytes)?.is_some() {
                    stage
                        .engine
                        .put(&stage.partition_id, &key_bytes, &value_bytes)?;
                    return Ok(());
                }
            }
        }

        let tally = self.memory.insert(key_bytes, value_bytes);
        let over_budget = self
            .spill
            .as_ref()
            .is_some_and(|stage| tally > stage.max_in_memory_bytes);
        if over_budget {
            self.spill_memory()?;
        }
        Ok(())
    }

    /// Look up a key: memory first, then the spill stage
    pub fn get(&self, key: &K) -> Result<Option<V>> {
        self.ensure_open()?;
        let key_bytes = self.key_serializer.serialize(key)?;
        if key_bytes.is_empty() {
            return Ok(None);
        }

        if let Some(bytes) = self.memory.get(&key_bytes) {
            return self.value_serializer.deserialize(bytes).map(Some);
        }

        match self.spill.as_ref().and_then(SpillStage::live) {
            Some(stage) => match stage.engine.get(&stage.partition_id, &key_bytes)? {
                Some(bytes) => self.value_serializer.deserialize(&bytes).map(Some),
                None => Ok(None),
            },
            None => Ok(None),
        }
    }

    pub fn contains_key(&self, key: &K) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Remove a key from whichever stage holds it; no-op if absent
    pub fn delete(&mut self, key: &K) -> Result<()> {
        self.ensure_open()?;
        let key_bytes = self.key_serializer.serialize(key)?;
        if key_bytes.is_empty() || self.memory.remove(&key_bytes) {
            return Ok(());
        }

        if let Some(stage) = self.spill.as_ref().and_then(SpillStage::live) {
            if stage.engine.get(&stage.partition_id, &key_bytes)?.is_some() {
                stage.engine.delete(&stage.partition_id, &key_bytes)?;
            }
        }
        Ok(())
    }

    /// Fresh iterator: memory entries, then spilled entries in key-byte order
    ///
    /// Keys live in one stage only, so no key is yielded twice.
    pub fn iter(&self) -> Result<MapIter<'_, K, V>> {
        self.ensure_open()?;
        let spill = match self.spill.as_ref().and_then(SpillStage::live) {
            Some(stage) => Some(stage.engine.scan(&stage.partition_id)?),
            None => None,
        };

        Ok(MapIter {
            memory: self.memory.iter(),
            spill,
            key_serializer: self.key_serializer.as_ref(),
            value_serializer: self.value_serializer.as_ref(),
        })
    }

    /// Move every memory entry into the spill stage now
    pub fn spill(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.spill.is_none() {
            return Err(SpillError::InvalidArgument(
                "memory-only map cannot spill".to_string(),
            ));
        }
        self.spill_memory()
    }

    /// Release the spill partition; idempotent
    ///
    /// Failures while dropping the partition are logged, not returned: the
    /// map is unusable afterwards either way.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.memory.clear();

        if let Some(stage) = self.spill.as_mut() {
            if stage.created {
                stage.created = false;
                if let Err(e) = stage.engine.drop_partition(&stage.partition_id) {
                    tracing::warn!(
                        "Failed to release spill partition {}: {}",
                        stage.partition_id,
                        e
                    );
                }
            }
        }
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Number of entries in the memory stage
    pub fn memory_len(&self) -> usize {
        self.memory.len()
    }

    /// Value bytes written to memory since creation or the last spill
    pub fn memory_tally(&self) -> u64 {
        self.memory.tally()
    }

    pub fn is_spillable(&self) -> bool {
        self.spill.is_some()
    }

    /// True once at least one spill event has happened
    pub fn has_spilled(&self) -> bool {
        self.spill.as_ref().is_some_and(|stage| stage.created)
    }

    pub fn spill_count(&self) -> u64 {
        self.spill.as_ref().map_or(0, |stage| stage.spill_count)
    }

    pub fn partition_id(&self) -> Option<&str> {
        self.spill.as_ref().map(|stage| stage.partition_id.as_str())
    }

    pub fn max_in_memory_bytes(&self) -> Option<u64> {
        self.spill.as_ref().map(|stage| stage.max_in_memory_bytes)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// True if the key currently lives in the memory stage
    pub fn in_memory(&self, key: &K) -> Result<bool> {
        let key_bytes = self.key_serializer.serialize(key)?;
        Ok(self.memory.contains(&key_bytes))
    }

    /// True if the key currently lives in the spill stage
    pub fn in_spill(&self, key: &K) -> Result<bool> {
        self.ensure_open()?;
        let key_bytes = self.key_serializer.serialize(key)?;
        match self.spill.as_ref().and_then(SpillStage::live) {
            Some(stage) if !key_bytes.is_empty() => Ok(stage
                .engine
                .get(&stage.partition_id, &key_bytes)?
                .is_some()),
            _ => Ok(false),
        }
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(SpillError::InvalidArgument("map is closed".to_string()));
        }
        Ok(())
    }

    /// Spill event: flush all memory entries to the partition, clear memory
    fn spill_memory(&mut self) -> Result<()> {
        let Some(stage) = self.spill.as_mut() else {
            return Ok(());
        };

        if !stage.created {
            stage.engine.create_partition(&stage.partition_id)?;
            stage.created = true;
        }

        let tally = self.memory.tally();
        let entries = self.memory.take_all();
        let written = stage.engine.put_batch(&stage.partition_id, entries)?;
        stage.spill_count += 1;

        tracing::debug!(
            "Spilled {} entries ({} bytes) to partition {} (spill #{})",
            written,
            tally,
            stage.partition_id,
            stage.spill_count
        );
        Ok(())
    }
}

impl<K, V> Drop for SpillableMap<K, V> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<K, V> std::fmt::Debug for SpillableMap<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpillableMap")
            .field("memory_len", &self.memory.len())
            .field("memory_tally", &self.memory.tally())
            .field("partition_id", &self.partition_id())
            .field("has_spilled", &self.has_spilled())
            .field("closed", &self.closed)
            .finish()
    }
}

fn check_bytes(bytes: &[u8], what: &str) -> Result<()> {
    if bytes.is_empty() {
        return Err(SpillError::InvalidArgument(format!(
            "{what} can not be empty once serialized"
        )));
    }
    Ok(())
}

/// Iterator over a map's entries; see [`SpillableMap::iter`]
pub struct MapIter<'a, K, V> {
    memory: std::collections::hash_map::Iter<'a, Vec<u8>, Vec<u8>>,
    spill: Option<PartitionScan>,
    key_serializer: &'a dyn Serializer<K>,
    value_serializer: &'a dyn Serializer<V>,
}

impl<K, V> MapIter<'_, K, V> {
    fn decode(&self, key: &[u8], value: &[u8]) -> Result<(K, V)> {
        Ok((
            self.key_serializer.deserialize(key)?,
            self.value_serializer.deserialize(value)?,
        ))
    }
}

impl<K, V> Iterator for MapIter<'_, K, V> {
    type Item = Result<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some((key, value)) = self.memory.next() {
            return Some(self.decode(key, value));
        }

        let entry = self.spill.as_mut()?.next()?;
        Some(entry.and_then(|(key, value)| self.decode(&key, &value)))
    }
}
