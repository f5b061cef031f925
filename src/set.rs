//! Spillable Set
//!
//! A set is a [`SpillableMap`] whose values are a fixed one-byte sentinel.

use std::sync::Arc;

use crate::engine::EngineHandle;
use crate::error::Result;
use crate::map::{MapIter, SpillableMap};
use crate::serializer::{BincodeSerializer, Serializer};
use crate::struct_key::StructValue;

const SENTINEL: u8 = 0;

/// Set of keys with the same memory budget and spill behavior as the map
pub struct SpillableSet<K> {
    map: SpillableMap<K, u8>,
}

/// Set of struct-like records
pub type StructLikeSet = SpillableSet<StructValue>;

impl<K> SpillableSet<K> {
    pub fn memory_only<KS>(key_serializer: KS) -> Self
    where
        KS: Serializer<K> + 'static,
    {
        Self {
            map: SpillableMap::memory_only(key_serializer, BincodeSerializer::<u8>::new()),
        }
    }

    /// Each member costs one byte against `max_in_memory_bytes`
    pub fn spillable<KS>(
        max_in_memory_bytes: u64,
        partition_id: impl Into<String>,
        engine: Arc<EngineHandle>,
        key_serializer: KS,
    ) -> Result<Self>
    where
        KS: Serializer<K> + 'static,
    {
        Ok(Self {
            map: SpillableMap::spillable(
                max_in_memory_bytes,
                partition_id,
                engine,
                key_serializer,
                BincodeSerializer::<u8>::new(),
            )?,
        })
    }

    /// Add a member; re-adding is a no-op apart from the byte tally
    pub fn add(&mut self, key: &K) -> Result<()> {
        self.map.put(key, &SENTINEL)
    }

    pub fn contains(&self, key: &K) -> Result<bool> {
        self.map.contains_key(key)
    }

    pub fn remove(&mut self, key: &K) -> Result<()> {
        self.map.delete(key)
    }

    /// Members in unspecified order, each exactly once
    pub fn iter(&self) -> Result<SetIter<'_, K>> {
        Ok(SetIter {
            inner: self.map.iter()?,
        })
    }

    pub fn close(&mut self) {
        self.map.close();
    }

    /// The backing map, for inspection
    pub fn as_map(&self) -> &SpillableMap<K, u8> {
        &self.map
    }
}

impl<K> std::fmt::Debug for SpillableSet<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpillableSet").field("map", &self.map).finish()
    }
}

pub struct SetIter<'a, K> {
    inner: MapIter<'a, K, u8>,
}

impl<K> Iterator for SetIter<'_, K> {
    type Item = Result<K>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|entry| entry.map(|(key, _)| key))
    }
}
