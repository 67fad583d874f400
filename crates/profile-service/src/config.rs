//! Profile service configuration.
//!
//! Loaded from environment variables. The database URL is redacted in
//! Debug output.

use common::events::{
    ACCOUNT_CREATED_ROUTING_KEY, DEFAULT_ACCOUNT_EVENTS_TOPIC, DEFAULT_CONSUMER_GROUP,
    DEFAULT_DEAD_LETTER_TOPIC,
};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8082";

pub const DEFAULT_IDENTITY_JWKS_URL: &str = "http://localhost:8081/.well-known/jwks.json";

/// Default JWT clock skew tolerance in seconds (5 minutes).
pub const DEFAULT_JWT_CLOCK_SKEW_SECONDS: i64 = 300;

/// Maximum allowed JWT clock skew in seconds (10 minutes).
pub const MAX_JWT_CLOCK_SKEW_SECONDS: i64 = 600;

pub const DEFAULT_KAFKA_BROKERS: &str = "localhost:9092";

pub const DEFAULT_CONSUMER_MAX_ATTEMPTS: u32 = 5;

pub const MAX_CONSUMER_MAX_ATTEMPTS: u32 = 20;

pub const DEFAULT_CONSUMER_INITIAL_BACKOFF_MS: u64 = 1000;

pub const DEFAULT_CONSUMER_BACKOFF_MULTIPLIER: f64 = 2.0;

pub const DEFAULT_CONSUMER_MAX_BACKOFF_MS: u64 = 10_000;

/// Broker side of the service: where facts come from and where they go
/// when they cannot be applied.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub kafka_brokers: String,
    pub account_events_topic: String,
    /// Only messages whose `event_type` header equals this are applied.
    pub account_created_routing_key: String,
    /// Consumer group; committed offsets make it the durable queue.
    pub group_id: String,
    pub dead_letter_topic: String,
    /// Total attempts per fact, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub backoff_multiplier: f64,
    pub max_backoff: Duration,
}

/// Profile service configuration.
#[derive(Clone)]
pub struct Config {
    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Server bind address (default: "0.0.0.0:8082").
    pub bind_address: String,

    /// Identity service key set used to verify bearer tokens.
    pub identity_jwks_url: String,

    /// Expected `iss` claim.
    pub jwt_issuer: String,

    /// Clock skew tolerance for JWT iat validation in seconds.
    pub jwt_clock_skew_seconds: i64,

    pub consumer: ConsumerConfig,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[REDACTED]")
            .field("bind_address", &self.bind_address)
            .field("identity_jwks_url", &self.identity_jwks_url)
            .field("jwt_issuer", &self.jwt_issuer)
            .field("jwt_clock_skew_seconds", &self.jwt_clock_skew_seconds)
            .field("consumer", &self.consumer)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid consumer configuration: {0}")]
    InvalidConsumer(String),
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    vars.get(name)
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn with_default(vars: &HashMap<String, String>, name: &str, default: &str) -> String {
    vars.get(name)
        .filter(|v| !v.is_empty())
        .cloned()
        .unwrap_or_else(|| default.to_string())
}

fn parse_or<T: std::str::FromStr>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: fmt::Display,
{
    match vars.get(name).filter(|v| !v.is_empty()) {
        Some(value_str) => value_str.parse().map_err(|e| {
            ConfigError::InvalidConsumer(format!("{name} must be a valid number, got '{value_str}': {e}"))
        }),
        None => Ok(default),
    }
}

impl ConsumerConfig {
    fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let max_attempts = parse_or(vars, "CONSUMER_MAX_ATTEMPTS", DEFAULT_CONSUMER_MAX_ATTEMPTS)?;
        if !(1..=MAX_CONSUMER_MAX_ATTEMPTS).contains(&max_attempts) {
            return Err(ConfigError::InvalidConsumer(format!(
                "CONSUMER_MAX_ATTEMPTS must be between 1 and {MAX_CONSUMER_MAX_ATTEMPTS}, got {max_attempts}"
            )));
        }

        let backoff_multiplier = parse_or(
            vars,
            "CONSUMER_BACKOFF_MULTIPLIER",
            DEFAULT_CONSUMER_BACKOFF_MULTIPLIER,
        )?;
        if !backoff_multiplier.is_finite() || backoff_multiplier < 1.0 {
            return Err(ConfigError::InvalidConsumer(format!(
                "CONSUMER_BACKOFF_MULTIPLIER must be at least 1.0, got {backoff_multiplier}"
            )));
        }

        let initial_backoff_ms = parse_or(
            vars,
            "CONSUMER_INITIAL_BACKOFF_MS",
            DEFAULT_CONSUMER_INITIAL_BACKOFF_MS,
        )?;
        let max_backoff_ms =
            parse_or(vars, "CONSUMER_MAX_BACKOFF_MS", DEFAULT_CONSUMER_MAX_BACKOFF_MS)?;
        if max_backoff_ms < initial_backoff_ms {
            return Err(ConfigError::InvalidConsumer(format!(
                "CONSUMER_MAX_BACKOFF_MS ({max_backoff_ms}) must not be below CONSUMER_INITIAL_BACKOFF_MS ({initial_backoff_ms})"
            )));
        }

        Ok(ConsumerConfig {
            kafka_brokers: with_default(vars, "KAFKA_BROKERS", DEFAULT_KAFKA_BROKERS),
            account_events_topic: with_default(
                vars,
                "ACCOUNT_EVENTS_TOPIC",
                DEFAULT_ACCOUNT_EVENTS_TOPIC,
            ),
            account_created_routing_key: with_default(
                vars,
                "ACCOUNT_CREATED_ROUTING_KEY",
                ACCOUNT_CREATED_ROUTING_KEY,
            ),
            group_id: with_default(vars, "CONSUMER_GROUP_ID", DEFAULT_CONSUMER_GROUP),
            dead_letter_topic: with_default(vars, "DEAD_LETTER_TOPIC", DEFAULT_DEAD_LETTER_TOPIC),
            max_attempts,
            initial_backoff: Duration::from_millis(initial_backoff_ms),
            backoff_multiplier,
            max_backoff: Duration::from_millis(max_backoff_ms),
        })
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_url = required(vars, "DATABASE_URL")?;
        let jwt_issuer = required(vars, "JWT_ISSUER")?
            .trim_end_matches('/')
            .to_string();

        // Parse JWT clock skew with validation
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

            if value > MAX_JWT_CLOCK_SKEW_SECONDS {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {MAX_JWT_CLOCK_SKEW_SECONDS} seconds (10 minutes), got {value}"
                )));
            }

            value
        } else {
            DEFAULT_JWT_CLOCK_SKEW_SECONDS
        };

        Ok(Config {
            database_url,
            bind_address: with_default(vars, "BIND_ADDRESS", DEFAULT_BIND_ADDRESS),
            identity_jwks_url: with_default(vars, "IDENTITY_JWKS_URL", DEFAULT_IDENTITY_JWKS_URL),
            jwt_issuer,
            jwt_clock_skew_seconds,
            consumer: ConsumerConfig::from_vars(vars)?,
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
                "postgresql://user:pw@localhost/profile".to_string(),
            ),
            (
                "JWT_ISSUER".to_string(),
                "https://id.example.test/".to_string(),
            ),
        ])
    }

    #[test]
    fn test_from_vars_defaults() {
        let config = Config::from_vars(&base_vars()).expect("config should load");

        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.identity_jwks_url, DEFAULT_IDENTITY_JWKS_URL);
        assert_eq!(config.jwt_issuer, "https://id.example.test");
        assert_eq!(config.jwt_clock_skew_seconds, 300);

        let consumer = &config.consumer;
        assert_eq!(consumer.kafka_brokers, "localhost:9092");
        assert_eq!(consumer.account_events_topic, "user.exchange");
        assert_eq!(consumer.account_created_routing_key, "user.created");
        assert_eq!(consumer.group_id, "user.created.q");
        assert_eq!(consumer.dead_letter_topic, "user.created.dlq");
        assert_eq!(consumer.max_attempts, 5);
        assert_eq!(consumer.initial_backoff, Duration::from_secs(1));
        assert!((consumer.backoff_multiplier - 2.0).abs() < f64::EPSILON);
        assert_eq!(consumer.max_backoff, Duration::from_secs(10));
    }

    #[test]
    fn test_missing_required_vars() {
        let mut vars = base_vars();
        vars.remove("JWT_ISSUER");
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::MissingEnvVar(name)) if name == "JWT_ISSUER"
        ));

        let mut vars = base_vars();
        vars.remove("DATABASE_URL");
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::MissingEnvVar(name)) if name == "DATABASE_URL"
        ));
    }

    #[test]
    fn test_clock_skew_bounds() {
        for (value, ok) in [("1", true), ("600", true), ("0", false), ("601", false), ("abc", false)] {
            let mut vars = base_vars();
            vars.insert("JWT_CLOCK_SKEW_SECONDS".to_string(), value.to_string());
            assert_eq!(Config::from_vars(&vars).is_ok(), ok, "skew {value}");
        }
    }

    #[test]
    fn test_consumer_overrides() {
        let mut vars = base_vars();
        vars.insert("CONSUMER_GROUP_ID".to_string(), "profiles".to_string());
        vars.insert("DEAD_LETTER_TOPIC".to_string(), "profiles.dlq".to_string());
        vars.insert("CONSUMER_MAX_ATTEMPTS".to_string(), "3".to_string());
        vars.insert("CONSUMER_INITIAL_BACKOFF_MS".to_string(), "50".to_string());
        vars.insert("CONSUMER_BACKOFF_MULTIPLIER".to_string(), "1.5".to_string());
        vars.insert("CONSUMER_MAX_BACKOFF_MS".to_string(), "400".to_string());

        let consumer = Config::from_vars(&vars).unwrap().consumer;
        assert_eq!(consumer.group_id, "profiles");
        assert_eq!(consumer.dead_letter_topic, "profiles.dlq");
        assert_eq!(consumer.max_attempts, 3);
        assert_eq!(consumer.initial_backoff, Duration::from_millis(50));
        assert_eq!(consumer.max_backoff, Duration::from_millis(400));
    }

    #[test]
    fn test_consumer_rejects_bad_values() {
        for (name, value) in [
            ("CONSUMER_MAX_ATTEMPTS", "0"),
            ("CONSUMER_MAX_ATTEMPTS", "21"),
            ("CONSUMER_BACKOFF_MULTIPLIER", "0.5"),
            ("CONSUMER_BACKOFF_MULTIPLIER", "NaN"),
            ("CONSUMER_INITIAL_BACKOFF_MS", "-1"),
            ("CONSUMER_MAX_BACKOFF_MS", "10"),
        ] {
            let mut vars = base_vars();
            vars.insert(name.to_string(), value.to_string());
            assert!(
                matches!(Config::from_vars(&vars), Err(ConfigError::InvalidConsumer(_))),
                "{name}={value}"
            );
        }
    }

    #[test]
    fn test_debug_redacts_database_url() {
        let config = Config::from_vars(&base_vars()).unwrap();
        let debug = format!("{config:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("user:pw"));
    }
}
