//! Map/Set Factory
//!
//! One construction call for struct-keyed maps and sets. Whether the result
//! is memory-only or spill-capable depends on the budget and partition
//! identifier, so callers never branch on the representation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::SpillConfig;
use crate::engine::EngineHandle;
use crate::error::Result;
use crate::map::StructLikeMap;
use crate::serializer::BincodeSerializer;
use crate::set::StructLikeSet;
use crate::struct_key::{StructLikeSerializer, StructType};

/// Builds [`StructLikeMap`]s and [`StructLikeSet`]s
///
/// The default paths use the configured budget and identifier. Every map made
/// through them gets its own partition `"{identifier}-{n}"`, so one factory
/// can hand out many maps over a shared engine. The engine is either supplied
/// up front or opened lazily as a disposable temp handle the first time a
/// spill-capable map is requested.
pub struct StructLikeFactory {
    config: SpillConfig,
    engine: Mutex<Option<Arc<EngineHandle>>>,
    next_instance: AtomicU64,
}

impl StructLikeFactory {
    /// Factory whose default maps and sets are memory-only
    pub fn new() -> Self {
        Self::with_config(SpillConfig::default())
    }

    pub fn with_config(config: SpillConfig) -> Self {
        Self {
            config,
            engine: Mutex::new(None),
            next_instance: AtomicU64::new(0),
        }
    }

    /// Factory that spills into an existing engine handle
    pub fn with_engine(engine: Arc<EngineHandle>, config: SpillConfig) -> Self {
        Self {
            config,
            engine: Mutex::new(Some(engine)),
            next_instance: AtomicU64::new(0),
        }
    }

    /// Map with the factory's configured budget and identifier
    pub fn create_map<V>(&self, key_type: &StructType) -> Result<StructLikeMap<V>>
    where
        V: Serialize + DeserializeOwned + 'static,
    {
        match self.default_target() {
            Some((budget, partition_id)) => {
                self.create_map_with(key_type, Some(budget), Some(&partition_id))
            }
            None => self.create_map_with(key_type, None, None),
        }
    }

    /// Map with an explicit budget and partition id
    ///
    /// Memory-only when either is `None`. The partition id is used as given.
    pub fn create_map_with<V>(
        &self,
        key_type: &StructType,
        max_in_memory_bytes: Option<u64>,
        partition_id: Option<&str>,
    ) -> Result<StructLikeMap<V>>
    where
        V: Serialize + DeserializeOwned + 'static,
    {
        let key_serializer = StructLikeSerializer::new(key_type.clone());
        let value_serializer = BincodeSerializer::<V>::new();

        match (max_in_memory_bytes, partition_id) {
            (Some(budget), Some(partition_id)) => StructLikeMap::spillable(
                budget,
                partition_id,
                self.engine()?,
                key_serializer,
                value_serializer,
            ),
            _ => Ok(StructLikeMap::memory_only(key_serializer, value_serializer)),
        }
    }

    /// Set with the factory's configured budget and identifier
    pub fn create_set(&self, key_type: &StructType) -> Result<StructLikeSet> {
        let key_serializer = StructLikeSerializer::new(key_type.clone());
        match self.default_target() {
            Some((budget, partition_id)) => {
                StructLikeSet::spillable(budget, partition_id, self.engine()?, key_serializer)
            }
            None => Ok(StructLikeSet::memory_only(key_serializer)),
        }
    }

    /// Engine used for spill-capable maps, opened on first use
    pub fn engine(&self) -> Result<Arc<EngineHandle>> {
        let mut slot = self.engine.lock();
        if let Some(engine) = slot.as_ref() {
            return Ok(Arc::clone(engine));
        }

        let engine = Arc::new(EngineHandle::open_temp(&self.config)?);
        tracing::debug!("Factory opened spill engine at {}", engine.root().display());
        *slot = Some(Arc::clone(&engine));
        Ok(engine)
    }

    pub fn config(&self) -> &SpillConfig {
        &self.config
    }

    /// True when default maps and sets are spill-capable
    pub fn is_spillable(&self) -> bool {
        self.config.is_spillable()
    }

    /// Budget and a fresh partition id, or `None` for memory-only
    fn default_target(&self) -> Option<(u64, String)> {
        let budget = self.config.max_in_memory_bytes?;
        let identifier = self.config.map_identifier.as_deref()?;
        let n = self.next_instance.fetch_add(1, Ordering::Relaxed);
        Some((budget, format!("{identifier}-{n}")))
    }
}

impl Default for StructLikeFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StructLikeFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructLikeFactory")
            .field("config", &self.config)
            .field("engine", &self.engine.lock().as_ref().map(|e| e.root().to_path_buf()))
            .finish()
    }
}

