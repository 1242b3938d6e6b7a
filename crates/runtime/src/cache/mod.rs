//! TTL + eviction caches
//!
//! A [`CacheEngine`] is one named cache: a map of [`CacheEntry`] values with a
//! fixed TTL, an entry limit, and one of four [`EvictionPolicy`] orderings
//! (LRU, LFU, FIFO, or TTL-only). Each `get`/`set` reports a hit, miss or
//! write to the shared [`MetricsRegistry`](crate::metrics::MetricsRegistry).
//!
//! - **[`CacheRegistry`]**: creates named caches on first use
//! - **[`CacheKey`]**: deterministic keys from a method name plus serialisable
//!   arguments
//! - **[`CachedValue`]**: tagged union for caches holding mixed value types
//! - **[`spawn_maintenance`]**: periodic expiry sweep stopped by a
//!   `CancellationToken`
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use bulwark_runtime::cache::{CacheConfig, CacheEngine, EvictionPolicy};
//! use bulwark_runtime::metrics::MetricsRegistry;
//!
//! let config = CacheConfig::builder()
//!     .max_entries(500)
//!     .ttl(Duration::from_secs(1800))
//!     .eviction_policy(EvictionPolicy::Lfu)
//!     .build()
//!     .unwrap();
//!
//! let cache: CacheEngine<String, i32> =
//!     CacheEngine::new("Catalog.item", config, Arc::new(MetricsRegistry::new())).unwrap();
//! cache.set("key1".to_string(), 1);
//! let _ = cache.get(&"key1".to_string());
//!
//! let stats = cache.stats();
//! assert_eq!(stats.hits, 1);
//! assert_eq!(stats.max_entries, Some(500));
//! ```

mod config;
mod core;
mod entry;
mod error;
mod index;
mod key;
pub mod maintenance;
mod registry;
mod stats;
mod value;

// Re-export public API
pub use config::{CacheConfig, CacheConfigBuilder, EvictionPolicy};
pub use entry::CacheEntry;
pub use error::{CacheError, CacheResult};
pub use key::{CacheKey, CacheKeyBuilder};
pub use maintenance::spawn_maintenance;
pub use registry::{CacheRegistry, SharedCache};
pub use stats::CacheStats;
pub use value::CachedValue;

pub use self::core::{CacheEngine, SizeEstimator};
