//! Serde helpers for configuration durations.
//!
//! Settings files express every duration as integer milliseconds
//! (`ttl = 300000`), so configs use `#[serde(with = "duration_millis")]` or,
//! for optional budgets, `option_duration_millis`.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

/// Serde serialization result type
type SerializeResult<S> = Result<<S as Serializer>::Ok, <S as Serializer>::Error>;

fn as_millis_u64(duration: &Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// `Duration` as milliseconds (u64).
///
/// ```rust
/// use std::time::Duration;
///
/// use bulwark_runtime::utils::duration_millis;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Example {
///     #[serde(with = "duration_millis")]
///     timeout: Duration,
/// }
///
/// let parsed: Example = serde_json::from_str(r#"{"timeout":1500}"#).unwrap();
/// assert_eq!(parsed.timeout, Duration::from_millis(1500));
/// ```
pub mod duration_millis {
    use super::*;

    /// Serialize a Duration as milliseconds (u64)
    pub fn serialize<S>(duration: &Duration, serializer: S) -> SerializeResult<S>
    where
        S: Serializer,
    {
        serializer.serialize_u64(as_millis_u64(duration))
    }

    /// Deserialize milliseconds (u64) into a Duration
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// `Option<Duration>` as optional milliseconds; absent or `null` means `None`.
///
/// Pair with `#[serde(default)]` so the field may be omitted.
pub mod option_duration_millis {
    use super::*;

    /// Serialize `Some` as milliseconds and `None` as a unit value.
    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> SerializeResult<S>
    where
        S: Serializer,
    {
        match duration {
            Some(duration) => serializer.serialize_some(&as_millis_u64(duration)),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize optional milliseconds.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for serialization utilities
    //!
    //! Tests cover millisecond encoding of required and optional durations
    //! in both JSON and TOML documents.

    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Timeouts {
        #[serde(with = "duration_millis")]
        timeout: Duration,
        #[serde(default, with = "option_duration_millis")]
        budget: Option<Duration>,
    }

    /// Tests that Duration serializes to milliseconds as u64
    #[test]
    fn test_duration_millis_serialize() {
        let data = Timeouts { timeout: Duration::from_millis(1500), budget: None };

        let json = serde_json::to_string(&data).expect("Should serialize valid struct");
        assert_eq!(json, r#"{"timeout":1500,"budget":null}"#);
    }

    /// Tests that an omitted optional budget deserializes as `None`
    #[test]
    fn test_option_duration_millis_defaults_to_none() {
        let data: Timeouts =
            serde_json::from_str(r#"{"timeout":2500}"#).expect("Should deserialize valid JSON");

        assert_eq!(data.timeout, Duration::from_millis(2500));
        assert_eq!(data.budget, None);
    }

    /// Validates millisecond durations in a TOML document.
    ///
    /// Assertions:
    /// - Confirms `timeout` equals 300 seconds.
    /// - Confirms `budget` equals `Some(10s)`.
    #[test]
    fn test_durations_from_toml() {
        let data: Timeouts =
            toml::from_str("timeout = 300000\nbudget = 10000\n").expect("Should parse TOML");

        assert_eq!(data.timeout, Duration::from_secs(300));
        assert_eq!(data.budget, Some(Duration::from_secs(10)));
    }

    /// Validates the duration millis deserialize invalid json scenario.
    ///
    /// Assertions:
    /// - Ensures `result.is_err()` evaluates to true.
    #[test]
    fn test_duration_millis_deserialize_invalid_json() {
        let invalid_json = r#"{"timeout":"not_a_number"}"#;
        let result: Result<Timeouts, _> = serde_json::from_str(invalid_json);
        assert!(result.is_err());
    }
}
