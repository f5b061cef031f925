//! Serializers
//!
//! Convert typed keys and values to bytes and back. A map holds one
//! serializer for its keys and one for its values; key equality and ordering
//! inside a map are defined by the serialized bytes, so a key serializer must
//! be deterministic.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, SpillError};

/// Typed value ⇄ bytes
pub trait Serializer<T>: Send + Sync {
    fn serialize(&self, value: &T) -> Result<Vec<u8>>;

    fn deserialize(&self, bytes: &[u8]) -> Result<T>;
}

/// Default serializer: serde object-graph encoding through bincode
///
/// Deterministic for a given value, but the byte order does not follow the
/// value order (integers are little-endian). Use a custom serializer such as
/// [`crate::struct_key::StructLikeSerializer`] when scans need meaningful
/// key order.
pub struct BincodeSerializer<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> BincodeSerializer<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for BincodeSerializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for BincodeSerializer<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for BincodeSerializer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BincodeSerializer")
    }
}

impl<T> Serializer<T> for BincodeSerializer<T>
where
    T: Serialize + DeserializeOwned,
{
    fn serialize(&self, value: &T) -> Result<Vec<u8>> {
        bincode::serialize(value).map_err(|e| SpillError::Serialization(e.to_string()))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<T> {
        bincode::deserialize(bytes).map_err(|e| SpillError::Serialization(e.to_string()))
    }
}

/// Identity serializer for values that already are bytes
#[derive(Debug, Clone, Copy, Default)]
pub struct RawBytesSerializer;

impl Serializer<Vec<u8>> for RawBytesSerializer {
    fn serialize(&self, value: &Vec<u8>) -> Result<Vec<u8>> {
        Ok(value.clone())
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}
