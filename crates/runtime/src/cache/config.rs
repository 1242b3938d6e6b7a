//! Cache configuration types and builder patterns
//!
//! A cache instance is configured once, when its name is first used; the
//! eviction policy cannot change afterwards.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::utils::duration_millis;

/// Eviction policy applied when a new key arrives at a full cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Least Recently Used - evicts the entry read or written longest ago
    #[default]
    Lru,
    /// Least Frequently Used - evicts the entry with the fewest reads, oldest
    /// insertion first on ties
    Lfu,
    /// First In First Out - evicts the earliest inserted entry; overwrites keep
    /// their position
    Fifo,
    /// No size-based eviction; entries leave only through TTL expiry
    TimeOnly,
}

impl EvictionPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lru => "lru",
            Self::Lfu => "lfu",
            Self::Fifo => "fifo",
            Self::TimeOnly => "time_only",
        }
    }
}

/// Configuration for one named cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of an entry from its last write
    #[serde(with = "duration_millis")]
    pub ttl: Duration,

    /// Entry limit enforced on insert of a new key (ignored by `TimeOnly`)
    pub max_entries: usize,

    /// Eviction policy when `max_entries` is reached
    pub eviction_policy: EvictionPolicy,

    /// Sliding expiration: a hit pushes `expires_at` to `now + ttl`
    pub refresh_on_read: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            max_entries: 1000,
            eviction_policy: EvictionPolicy::Lru,
            refresh_on_read: false,
        }
    }
}

impl CacheConfig {
    /// Create a new configuration builder
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// LRU cache holding at most `max_entries` with the default TTL
    ///
    /// # Example
    /// ```
    /// use bulwark_runtime::cache::{CacheConfig, EvictionPolicy};
    ///
    /// let config = CacheConfig::lru(100);
    /// assert_eq!(config.eviction_policy, EvictionPolicy::Lru);
    /// ```
    pub fn lru(max_entries: usize) -> Self {
        Self { max_entries, ..Self::default() }
    }

    /// Unbounded cache whose entries expire after `ttl`
    pub fn time_only(ttl: Duration) -> Self {
        Self { ttl, eviction_policy: EvictionPolicy::TimeOnly, ..Self::default() }
    }

    /// Check the configuration before a cache is built from it.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.ttl.is_zero() {
            return Err(ConfigError::invalid("cache ttl must be greater than 0"));
        }
        if self.max_entries == 0 {
            return Err(ConfigError::invalid("cache max_entries must be greater than 0"));
        }
        Ok(())
    }
}

/// Builder for CacheConfig with fluent API
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl CacheConfigBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.config.ttl = ttl;
        self
    }

    pub fn max_entries(mut self, max_entries: usize) -> Self {
        self.config.max_entries = max_entries;
        self
    }

    pub fn eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.config.eviction_policy = policy;
        self
    }

    /// Enable sliding expiration
    pub fn refresh_on_read(mut self, enabled: bool) -> Self {
        self.config.refresh_on_read = enabled;
        self
    }

    /// Validate and return the configuration
    pub fn build(self) -> ConfigResult<CacheConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
