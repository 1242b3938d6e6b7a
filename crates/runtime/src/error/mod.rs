//! Shared error vocabulary.
//!
//! Each engine owns its own `thiserror` enum (`CacheError`, `RetryError`,
//! `CircuitBreakerError`). This module holds what they share:
//!
//! - [`ConfigError`]: rejected configuration, raised by every `validate()` and
//!   by settings loading
//! - [`ErrorClassification`]: lets operation errors describe themselves so the
//!   `Classified` retry policy can decide without a hand-written predicate
//! - [`ErrorSeverity`]: levels used when logging classified errors

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Configuration rejected during validation or loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value violates an engine constraint.
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    /// A settings file could not be read.
    #[error("Failed to read settings file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A settings document could not be parsed.
    #[error("Failed to parse {format} settings: {message}")]
    Parse { format: &'static str, message: String },

    /// An environment override held a value of the wrong shape.
    #[error("Invalid value {value:?} for environment variable {var}")]
    EnvOverride { var: String, value: String },
}

impl ConfigError {
    /// Shorthand for [`ConfigError::Invalid`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid { message: message.into() }
    }
}

/// Result alias for configuration checks.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Self-description of an error for retry and alerting decisions.
pub trait ErrorClassification {
    /// Whether repeating the failed operation might succeed.
    ///
    /// Transient conditions such as timeouts, throttling, or a briefly
    /// unavailable dependency are retryable; validation failures are not.
    fn is_retryable(&self) -> bool;

    /// Severity used for logging.
    fn severity(&self) -> ErrorSeverity;

    /// Whether the error needs immediate attention.
    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }

    /// Delay suggested by the failing dependency, e.g. a `Retry-After` hint.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational, typically for debugging
    Info,
    /// Warning, should be monitored but not critical
    Warning,
    /// Error, requires attention and action
    Error,
    /// Critical, immediate action required
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl ErrorClassification for ConfigError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Error
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        Self::Parse { format: "TOML", message: err.to_string() }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse { format: "JSON", message: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the shared error vocabulary.

    use super::*;

    #[derive(Debug)]
    struct Throttled;

    impl ErrorClassification for Throttled {
        fn is_retryable(&self) -> bool {
            true
        }

        fn severity(&self) -> ErrorSeverity {
            ErrorSeverity::Warning
        }

        fn retry_after(&self) -> Option<Duration> {
            Some(Duration::from_secs(2))
        }
    }

    /// Validates `ErrorClassification` default methods for a transient error.
    ///
    /// Assertions:
    /// - Confirms a warning-level error is not critical.
    /// - Confirms the overridden `retry_after` is returned.
    #[test]
    fn classification_defaults_follow_severity() {
        let err = Throttled;
        assert!(err.is_retryable());
        assert!(!err.is_critical());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn severity_display_and_ordering() {
        assert_eq!(ErrorSeverity::Warning.to_string(), "WARN");
        assert_eq!(ErrorSeverity::Critical.to_string(), "CRITICAL");
        assert!(ErrorSeverity::Info < ErrorSeverity::Critical);
    }

    /// Validates `ConfigError` conversions from parser errors.
    ///
    /// Assertions:
    /// - Confirms a malformed TOML document maps to `Parse { format: "TOML" }`.
    /// - Confirms malformed JSON maps to `Parse { format: "JSON" }`.
    /// - Confirms parse errors are not retryable.
    #[test]
    fn parser_errors_convert_to_parse_variant() {
        let toml_err = toml::from_str::<toml::Value>("not = [valid").err();
        let Some(toml_err) = toml_err else {
            panic!("malformed TOML must fail to parse");
        };
        let err = ConfigError::from(toml_err);
        assert!(matches!(err, ConfigError::Parse { format: "TOML", .. }));
        assert!(!err.is_retryable());

        let json_err = serde_json::from_str::<serde_json::Value>("{").err();
        let Some(json_err) = json_err else {
            panic!("malformed JSON must fail to parse");
        };
        assert!(matches!(ConfigError::from(json_err), ConfigError::Parse { format: "JSON", .. }));
    }

    #[test]
    fn invalid_message_is_rendered() {
        let err = ConfigError::invalid("failure_threshold must be greater than 0");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: failure_threshold must be greater than 0"
        );
        assert_eq!(err.severity(), ErrorSeverity::Error);
    }
}
