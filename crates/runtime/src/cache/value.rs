//! Tagged union for caches that hold heterogeneous values.

use std::any::type_name;
use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::error::Category;

use super::core::CacheEngine;
use super::error::{CacheError, CacheResult};
use crate::time::Clock;

/// A cached value of any serialisable type.
///
/// Scalars keep their own variant so typed accessors can report a
/// [`CacheError::TypeMismatch`]; anything structured is held as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CachedValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

impl CachedValue {
    /// Encodes `value` through `serde_json`.
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> CacheResult<Self> {
        let json =
            serde_json::to_value(value).map_err(|source| CacheError::Serialization { source })?;
        Ok(Self::from_json(json))
    }

    fn from_json(json: serde_json::Value) -> Self {
        use serde_json::Value;

        match json {
            Value::Null => Self::Null,
            Value::Bool(flag) => Self::Bool(flag),
            Value::Number(number) => match (number.as_i64(), number.as_f64()) {
                (Some(int), _) => Self::Integer(int),
                (None, Some(float)) if !number.is_u64() => Self::Float(float),
                _ => Self::Json(Value::Number(number)),
            },
            Value::String(text) => Self::Text(text),
            other => Self::Json(other),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;

        match self {
            Self::Null => Value::Null,
            Self::Bool(flag) => Value::Bool(*flag),
            Self::Integer(int) => Value::from(*int),
            Self::Float(float) => Value::from(*float),
            Self::Text(text) => Value::String(text.clone()),
            Self::Bytes(bytes) => Value::from(bytes.clone()),
            Self::Json(json) => json.clone(),
        }
    }

    /// Decodes into `T`.
    ///
    /// A value of the wrong shape yields [`CacheError::TypeMismatch`]; other
    /// decoding failures yield [`CacheError::Deserialization`].
    pub fn decode<T: DeserializeOwned>(&self) -> CacheResult<T> {
        serde_json::from_value(self.to_json()).map_err(|source| match source.classify() {
            Category::Data => {
                CacheError::TypeMismatch { expected: type_name::<T>(), found: self.kind() }
            }
            _ => CacheError::Deserialization { type_name: type_name::<T>(), source },
        })
    }

    /// Variant name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Json(_) => "json",
        }
    }

    pub fn as_text(&self) -> CacheResult<&str> {
        match self {
            Self::Text(text) => Ok(text),
            other => Err(CacheError::TypeMismatch { expected: "text", found: other.kind() }),
        }
    }

    pub fn as_integer(&self) -> CacheResult<i64> {
        match self {
            Self::Integer(int) => Ok(*int),
            other => Err(CacheError::TypeMismatch { expected: "integer", found: other.kind() }),
        }
    }

    pub fn as_bool(&self) -> CacheResult<bool> {
        match self {
            Self::Bool(flag) => Ok(*flag),
            other => Err(CacheError::TypeMismatch { expected: "bool", found: other.kind() }),
        }
    }

    pub fn as_bytes(&self) -> CacheResult<&[u8]> {
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            other => Err(CacheError::TypeMismatch { expected: "bytes", found: other.kind() }),
        }
    }

    /// Approximate heap plus inline size, used as the cache size estimator.
    pub fn estimated_size(&self) -> usize {
        let inline = std::mem::size_of::<Self>();
        match self {
            Self::Text(text) => inline + text.len(),
            Self::Bytes(bytes) => inline + bytes.len(),
            Self::Json(json) => inline + json.to_string().len(),
            _ => inline,
        }
    }
}

impl<K, C> CacheEngine<K, CachedValue, C>
where
    K: Eq + Hash + Clone,
    C: Clock,
{
    /// Reads `key` and decodes it as `T`.
    ///
    /// A decoding failure leaves the entry in place.
    pub fn get_as<T: DeserializeOwned>(&self, key: &K) -> CacheResult<Option<T>> {
        self.get(key).map(|value| value.decode()).transpose()
    }

    /// Encodes `value` and stores it under `key`. Nothing is stored on error.
    pub fn set_as<T: Serialize + ?Sized>(&self, key: K, value: &T) -> CacheResult<()> {
        let encoded = CachedValue::encode(value)?;
        self.set(key, encoded);
        Ok(())
    }
}
