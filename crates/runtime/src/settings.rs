//! Runtime settings loader
//!
//! Aggregates engine defaults and per-key overrides into one document that
//! can be read from TOML or JSON and adjusted from the environment.
//!
//! ## Environment Variables
//! - `BULWARK_METRICS_CAPACITY`: records kept per metrics key
//! - `BULWARK_METRICS_MAX_KEYS`: distinct metrics keys tracked
//! - `BULWARK_CACHE_TTL_MS`: default cache TTL in milliseconds
//! - `BULWARK_CACHE_MAX_ENTRIES`: default cache entry limit
//!
//! ## Per-key overrides
//! Tables under `caches`, `circuit_breakers` and `retries` replace the
//! default for that one name. Lookups fall back to the default section.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::CacheConfig;
use crate::error::{ConfigError, ConfigResult};
use crate::metrics::MetricsConfig;
use crate::resilience::{CircuitBreakerConfig, RetryConfig};
use crate::utils::duration_millis;

pub const ENV_METRICS_CAPACITY: &str = "BULWARK_METRICS_CAPACITY";
pub const ENV_METRICS_MAX_KEYS: &str = "BULWARK_METRICS_MAX_KEYS";
pub const ENV_CACHE_TTL_MS: &str = "BULWARK_CACHE_TTL_MS";
pub const ENV_CACHE_MAX_ENTRIES: &str = "BULWARK_CACHE_MAX_ENTRIES";

/// Settings for every engine owned by a [`ReliabilityRuntime`](crate::runtime::ReliabilityRuntime)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    pub metrics: MetricsConfig,
    /// Default for caches without an override
    pub cache: CacheConfig,
    /// Default for breakers without an override
    pub circuit_breaker: CircuitBreakerConfig,
    /// Default for retry controllers without an override
    pub retry: RetryConfig,
    /// Period of the background cache sweep
    #[serde(with = "duration_millis")]
    pub maintenance_interval: Duration,
    pub caches: BTreeMap<String, CacheConfig>,
    pub circuit_breakers: BTreeMap<String, CircuitBreakerConfig>,
    pub retries: BTreeMap<String, RetryConfig>,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            metrics: MetricsConfig::default(),
            cache: CacheConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            retry: RetryConfig::default(),
            maintenance_interval: Duration::from_secs(60),
            caches: BTreeMap::new(),
            circuit_breakers: BTreeMap::new(),
            retries: BTreeMap::new(),
        }
    }
}

impl RuntimeSettings {
    /// Parse a TOML document and validate it.
    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        let settings: Self = toml::from_str(contents)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse a JSON document and validate it.
    pub fn from_json_str(contents: &str) -> ConfigResult<Self> {
        let settings: Self = serde_json::from_str(contents)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a file, picking the format from its extension
    /// (`.toml` or `.json`).
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the file cannot be read, the extension is
    /// not supported, or the contents fail to parse or validate.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        info!(path = %path.display(), format = extension, "settings_loading");

        match extension {
            "toml" => Self::from_toml_str(&contents),
            "json" => Self::from_json_str(&contents),
            other => Err(ConfigError::Parse {
                format: "settings",
                message: format!("unsupported settings file extension {other:?}"),
            }),
        }
    }

    /// Apply `BULWARK_*` environment overrides on top of the loaded values.
    pub fn apply_env_overrides(&mut self) -> ConfigResult<()> {
        self.apply_overrides_from(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(capacity) = parse_var::<usize>(&lookup, ENV_METRICS_CAPACITY)? {
            self.metrics.buffer_capacity = capacity;
        }
        if let Some(max_keys) = parse_var::<usize>(&lookup, ENV_METRICS_MAX_KEYS)? {
            self.metrics.max_keys = max_keys;
        }
        if let Some(ttl_ms) = parse_var::<u64>(&lookup, ENV_CACHE_TTL_MS)? {
            self.cache.ttl = Duration::from_millis(ttl_ms);
        }
        if let Some(max_entries) = parse_var::<usize>(&lookup, ENV_CACHE_MAX_ENTRIES)? {
            self.cache.max_entries = max_entries;
        }
        self.validate()
    }

    /// Validate every section and override.
    pub fn validate(&self) -> ConfigResult<()> {
        self.metrics.validate()?;
        self.cache.validate()?;
        self.circuit_breaker.validate()?;
        self.retry.validate()?;
        if self.maintenance_interval.is_zero() {
            return Err(ConfigError::invalid("maintenance_interval must be greater than 0"));
        }
        for (name, config) in &self.caches {
            config.validate().map_err(|e| scoped("caches", name, e))?;
        }
        for (key, config) in &self.circuit_breakers {
            config.validate().map_err(|e| scoped("circuit_breakers", key, e))?;
        }
        for (key, config) in &self.retries {
            config.validate().map_err(|e| scoped("retries", key, e))?;
        }
        Ok(())
    }

    /// Configuration for cache `name`
    pub fn cache_config(&self, name: &str) -> CacheConfig {
        self.caches.get(name).unwrap_or(&self.cache).clone()
    }

    /// Configuration for breaker `key`
    pub fn circuit_breaker_config(&self, key: &str) -> CircuitBreakerConfig {
        self.circuit_breakers.get(key).unwrap_or(&self.circuit_breaker).clone()
    }

    /// Configuration for retry controller `key`
    pub fn retry_config(&self, key: &str) -> RetryConfig {
        self.retries.get(key).unwrap_or(&self.retry).clone()
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &str,
) -> ConfigResult<Option<T>> {
    let Some(value) = lookup(var) else {
        return Ok(None);
    };
    match value.trim().parse::<T>() {
        Ok(parsed) => {
            debug!(var, "settings_env_override_applied");
            Ok(Some(parsed))
        }
        Err(_) => Err(ConfigError::EnvOverride { var: var.to_owned(), value }),
    }
}

fn scoped(section: &str, name: &str, err: ConfigError) -> ConfigError {
    match err {
        ConfigError::Invalid { message } => {
            ConfigError::invalid(format!("{section}.{name}: {message}"))
        }
        other => other,
    }
}
