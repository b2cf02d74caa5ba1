//! Roster service configuration.
//!
//! Configuration is loaded from environment variables. All sensitive
//! fields are redacted in Debug output.

use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use thiserror::Error;

/// Default fan-out timeout in seconds (realtime publish / webhook POST).
pub const DEFAULT_FANOUT_TIMEOUT_SECONDS: u64 = 5;

/// Default realtime channel name prefix.
pub const DEFAULT_REALTIME_CHANNEL_PREFIX: &str = "session-timeline";

/// Default capacity of the in-memory backfill audit trail.
pub const DEFAULT_BACKFILL_TRAIL_CAPACITY: usize = 256;

/// Roster service configuration.
///
/// Loaded from environment variables with sensible defaults.
/// The database URL, JWT secret and webhook auth header are redacted in
/// Debug output to prevent credential leakage.
#[derive(Clone)]
pub struct Config {
    /// PostgreSQL connection URL for the backing store.
    pub database_url: String,

    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// HS256 secret for bearer token verification.
    pub jwt_secret: SecretString,

    /// JWT clock skew tolerance in seconds for token validation.
    pub jwt_clock_skew_seconds: i64,

    /// Redis URL for the realtime broadcast channel. Fan-out to realtime
    /// subscribers is skipped entirely when unset.
    pub realtime_url: Option<String>,

    /// Prefix for realtime channel names; the session id is appended.
    pub realtime_channel_prefix: String,

    /// External webhook URL for timeline notifications. Webhook fan-out is
    /// skipped entirely when unset.
    pub timeline_webhook_url: Option<String>,

    /// Value for the webhook's Authorization header.
    pub timeline_webhook_auth_header: Option<SecretString>,

    /// Per-delivery timeout for both fan-out paths, in seconds.
    pub fanout_timeout_seconds: u64,

    /// Capacity of the bounded backfill audit trail.
    pub backfill_trail_capacity: usize,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[REDACTED]")
            .field("bind_address", &self.bind_address)
            .field("jwt_secret", &"[REDACTED]")
            .field("jwt_clock_skew_seconds", &self.jwt_clock_skew_seconds)
            .field("realtime_url", &self.realtime_url)
            .field("realtime_channel_prefix", &self.realtime_channel_prefix)
            .field("timeline_webhook_url", &self.timeline_webhook_url)
            .field(
                "timeline_webhook_auth_header",
                &self.timeline_webhook_auth_header.as_ref().map(|_| "[REDACTED]"),
            )
            .field("fanout_timeout_seconds", &self.fanout_timeout_seconds)
            .field("backfill_trail_capacity", &self.backfill_trail_capacity)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid fan-out timeout configuration: {0}")]
    InvalidFanoutTimeout(String),

    #[error("Invalid backfill trail capacity configuration: {0}")]
    InvalidTrailCapacity(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_url = vars
            .get("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?
            .clone();

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| "0.0.0.0:8080".to_string());

        let jwt_secret = vars
            .get("JWT_SECRET")
            .map(|s| SecretString::from(s.clone()))
            .ok_or_else(|| ConfigError::MissingEnvVar("JWT_SECRET".to_string()))?;

        // Parse JWT clock skew tolerance with validation
        let jwt_clock_skew_seconds = if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
            let value: i64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a valid integer, got '{value_str}': {e}"
                ))
            })?;

            if value <= 0 {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be positive, got {value}"
                )));
            }

            if value > MAX_CLOCK_SKEW.as_secs() as i64 {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {value}",
                    MAX_CLOCK_SKEW.as_secs()
                )));
            }

            value
        } else {
            DEFAULT_CLOCK_SKEW.as_secs() as i64
        };

        let realtime_url = vars.get("REALTIME_URL").cloned().filter(|v| !v.is_empty());

        let realtime_channel_prefix = vars
            .get("REALTIME_CHANNEL_PREFIX")
            .cloned()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_REALTIME_CHANNEL_PREFIX.to_string());

        let timeline_webhook_url = vars
            .get("TIMELINE_WEBHOOK_URL")
            .cloned()
            .filter(|v| !v.is_empty());

        let timeline_webhook_auth_header = vars
            .get("TIMELINE_WEBHOOK_AUTH_HEADER")
            .filter(|v| !v.is_empty())
            .map(|s| SecretString::from(s.clone()));

        // Parse fan-out timeout with validation
        let fanout_timeout_seconds = if let Some(value_str) = vars.get("FANOUT_TIMEOUT_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidFanoutTimeout(format!(
                    "FANOUT_TIMEOUT_SECONDS must be a valid positive integer, got '{value_str}': {e}"
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidFanoutTimeout(
                    "FANOUT_TIMEOUT_SECONDS must be greater than 0".to_string(),
                ));
            }

            value
        } else {
            DEFAULT_FANOUT_TIMEOUT_SECONDS
        };

        // Parse trail capacity with validation
        let backfill_trail_capacity =
            if let Some(value_str) = vars.get("BACKFILL_TRAIL_CAPACITY") {
                let value: usize = value_str.parse().map_err(|e| {
                    ConfigError::InvalidTrailCapacity(format!(
                        "BACKFILL_TRAIL_CAPACITY must be a valid positive integer, got '{value_str}': {e}"
                    ))
                })?;

                if value == 0 {
                    return Err(ConfigError::InvalidTrailCapacity(
                        "BACKFILL_TRAIL_CAPACITY must be greater than 0".to_string(),
                    ));
                }

                value
            } else {
                DEFAULT_BACKFILL_TRAIL_CAPACITY
            };

        Ok(Config {
            database_url,
            bind_address,
            jwt_secret,
            jwt_clock_skew_seconds,
            realtime_url,
            realtime_channel_prefix,
            timeline_webhook_url,
            timeline_webhook_auth_header,
            fanout_timeout_seconds,
            backfill_trail_capacity,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([
            (
                "DATABASE_URL".to_string(),
                "postgresql://localhost/roster_test".to_string(),
            ),
            ("JWT_SECRET".to_string(), "test-secret".to_string()),
        ])
    }

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&base_vars()).expect("Config should load successfully");

        assert_eq!(config.database_url, "postgresql://localhost/roster_test");
        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert_eq!(
            config.jwt_clock_skew_seconds,
            DEFAULT_CLOCK_SKEW.as_secs() as i64
        );
        assert!(config.realtime_url.is_none());
        assert_eq!(
            config.realtime_channel_prefix,
            DEFAULT_REALTIME_CHANNEL_PREFIX
        );
        assert!(config.timeline_webhook_url.is_none());
        assert!(config.timeline_webhook_auth_header.is_none());
        assert_eq!(config.fanout_timeout_seconds, DEFAULT_FANOUT_TIMEOUT_SECONDS);
        assert_eq!(
            config.backfill_trail_capacity,
            DEFAULT_BACKFILL_TRAIL_CAPACITY
        );
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let mut vars = base_vars();
        vars.insert("BIND_ADDRESS".to_string(), "127.0.0.1:9000".to_string());
        vars.insert("JWT_CLOCK_SKEW_SECONDS".to_string(), "120".to_string());
        vars.insert(
            "REALTIME_URL".to_string(),
            "redis://localhost:6379".to_string(),
        );
        vars.insert(
            "REALTIME_CHANNEL_PREFIX".to_string(),
            "lobby-events".to_string(),
        );
        vars.insert(
            "TIMELINE_WEBHOOK_URL".to_string(),
            "https://hooks.example.com/timeline".to_string(),
        );
        vars.insert(
            "TIMELINE_WEBHOOK_AUTH_HEADER".to_string(),
            "Bearer hook-token".to_string(),
        );
        vars.insert("FANOUT_TIMEOUT_SECONDS".to_string(), "3".to_string());
        vars.insert("BACKFILL_TRAIL_CAPACITY".to_string(), "64".to_string());

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.jwt_clock_skew_seconds, 120);
        assert_eq!(
            config.realtime_url.as_deref(),
            Some("redis://localhost:6379")
        );
        assert_eq!(config.realtime_channel_prefix, "lobby-events");
        assert_eq!(
            config.timeline_webhook_url.as_deref(),
            Some("https://hooks.example.com/timeline")
        );
        assert!(config.timeline_webhook_auth_header.is_some());
        assert_eq!(config.fanout_timeout_seconds, 3);
        assert_eq!(config.backfill_trail_capacity, 64);
    }

    #[test]
    fn test_from_vars_missing_database_url() {
        let vars = HashMap::from([("JWT_SECRET".to_string(), "s".to_string())]);

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "DATABASE_URL"));
    }

    #[test]
    fn test_from_vars_missing_jwt_secret() {
        let vars = HashMap::from([(
            "DATABASE_URL".to_string(),
            "postgresql://localhost/x".to_string(),
        )]);

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::MissingEnvVar(v)) if v == "JWT_SECRET"));
    }

    #[test]
    fn test_jwt_clock_skew_rejects_zero() {
        let mut vars = base_vars();
        vars.insert("JWT_CLOCK_SKEW_SECONDS".to_string(), "0".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidJwtClockSkew(msg)) if msg.contains("must be positive"))
        );
    }

    #[test]
    fn test_jwt_clock_skew_rejects_too_large() {
        let mut vars = base_vars();
        vars.insert("JWT_CLOCK_SKEW_SECONDS".to_string(), "601".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidJwtClockSkew(msg)) if msg.contains("must not exceed 600"))
        );
    }

    #[test]
    fn test_fanout_timeout_rejects_zero() {
        let mut vars = base_vars();
        vars.insert("FANOUT_TIMEOUT_SECONDS".to_string(), "0".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidFanoutTimeout(msg)) if msg.contains("must be greater than 0"))
        );
    }

    #[test]
    fn test_trail_capacity_rejects_non_numeric() {
        let mut vars = base_vars();
        vars.insert("BACKFILL_TRAIL_CAPACITY".to_string(), "lots".to_string());

        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidTrailCapacity(msg)) if msg.contains("must be a valid positive integer"))
        );
    }

    #[test]
    fn test_empty_optional_urls_treated_as_unset() {
        let mut vars = base_vars();
        vars.insert("REALTIME_URL".to_string(), String::new());
        vars.insert("TIMELINE_WEBHOOK_URL".to_string(), String::new());

        let config = Config::from_vars(&vars).expect("Config should load successfully");
        assert!(config.realtime_url.is_none());
        assert!(config.timeline_webhook_url.is_none());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut vars = base_vars();
        vars.insert(
            "TIMELINE_WEBHOOK_AUTH_HEADER".to_string(),
            "Bearer hook-token".to_string(),
        );
        let config = Config::from_vars(&vars).expect("Config should load successfully");

        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("postgresql://"));
        assert!(!debug_output.contains("test-secret"));
        assert!(!debug_output.contains("hook-token"));
    }
}
