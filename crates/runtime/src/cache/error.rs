//! Cache error types.
//!
//! These fail only the operation that raised them; cache state is never
//! touched on error.

use thiserror::Error;

/// Errors raised by key generation and cached-value conversion.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A method argument could not be rendered into a cache key.
    #[error("Failed to generate cache key for {method}: {message}")]
    KeyGeneration { method: String, message: String },

    /// A value could not be encoded for storage.
    #[error("Failed to serialize value for caching: {source}")]
    Serialization {
        #[source]
        source: serde_json::Error,
    },

    /// A stored value could not be decoded into the requested type.
    #[error("Failed to deserialize cached value as {type_name}: {source}")]
    Deserialization {
        type_name: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// A tagged value was read as the wrong kind.
    #[error("Cached value is {found}, expected {expected}")]
    TypeMismatch { expected: &'static str, found: &'static str },
}

/// Result type for cache conversions
pub type CacheResult<T> = Result<T, CacheError>;
