//! Deterministic cache keys built from a method identity and its arguments.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{CacheError, CacheResult};

/// Cache key, conventionally `Type.method(arg,...)` with JSON-rendered
/// arguments.
///
/// ```rust
/// use bulwark_runtime::cache::CacheKey;
///
/// let key = CacheKey::for_method("UserService", "profile")
///     .arg(&42_u64)
///     .arg("en-GB")
///     .build()
///     .unwrap();
/// assert_eq!(key.as_str(), r#"UserService.profile(42,"en-GB")"#);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Wraps a caller-supplied key verbatim.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Starts a key for `type_name.method`.
    pub fn for_method(type_name: &str, method: &str) -> CacheKeyBuilder {
        CacheKeyBuilder { method: format!("{type_name}.{method}"), args: Vec::new(), error: None }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for CacheKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CacheKey {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for CacheKey {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

/// Accumulates serialised arguments; the first failure is reported by
/// [`build`](CacheKeyBuilder::build).
#[derive(Debug)]
pub struct CacheKeyBuilder {
    method: String,
    args: Vec<String>,
    error: Option<CacheError>,
}

impl CacheKeyBuilder {
    /// Appends one argument rendered as compact JSON.
    #[must_use]
    pub fn arg<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        if self.error.is_some() {
            return self;
        }
        match serde_json::to_string(value) {
            Ok(rendered) => self.args.push(rendered),
            Err(err) => {
                self.error = Some(CacheError::KeyGeneration {
                    method: self.method.clone(),
                    message: format!("argument {}: {err}", self.args.len()),
                });
            }
        }
        self
    }

    pub fn build(self) -> CacheResult<CacheKey> {
        if let Some(err) = self.error {
            return Err(err);
        }
        Ok(CacheKey(format!("{}({})", self.method, self.args.join(","))))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};

    use super::*;

    #[derive(Serialize)]
    struct Query {
        region: &'static str,
        limit: u32,
    }

    /// Validates `CacheKeyBuilder::build` determinism.
    ///
    /// Assertions:
    /// - Confirms equal arguments produce equal keys.
    /// - Confirms argument order is significant.
    /// - Confirms struct arguments render as JSON objects.
    #[test]
    fn keys_are_deterministic_and_order_sensitive() {
        let build = |a: u32, b: u32| {
            CacheKey::for_method("Geo", "distance").arg(&a).arg(&b).build().expect("key")
        };
        assert_eq!(build(1, 2), build(1, 2));
        assert_ne!(build(1, 2), build(2, 1));

        let key = CacheKey::for_method("Search", "run")
            .arg(&Query { region: "eu", limit: 10 })
            .build()
            .expect("key");
        assert_eq!(key.as_str(), r#"Search.run({"region":"eu","limit":10})"#);
    }

    #[test]
    fn no_arguments_renders_empty_parens() {
        let key = CacheKey::for_method("Clock", "now").build().expect("key");
        assert_eq!(key.to_string(), "Clock.now()");
    }

    /// Validates `CacheKeyBuilder::arg` failure handling.
    ///
    /// Assertions:
    /// - Confirms a map with non-string keys fails with `KeyGeneration`.
    /// - Confirms the error names the method and argument position.
    #[test]
    fn unserialisable_argument_fails_key_generation() {
        let mut bad = HashMap::new();
        bad.insert((1u8, 2u8), 3u8);

        let err = CacheKey::for_method("Matrix", "lookup")
            .arg(&"ok")
            .arg(&bad)
            .arg(&BTreeMap::<String, u8>::new())
            .build()
            .expect_err("tuple map keys are not valid JSON object keys");

        match err {
            CacheError::KeyGeneration { method, message } => {
                assert_eq!(method, "Matrix.lookup");
                assert!(message.starts_with("argument 1"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn raw_keys_round_trip_through_conversions() {
        let key: CacheKey = "custom:42".into();
        let borrowed: &str = key.borrow();
        assert_eq!(borrowed, "custom:42");
        assert_eq!(key.clone().into_string(), "custom:42");
        assert_eq!(CacheKey::from(String::from("custom:42")), key);
    }
}
