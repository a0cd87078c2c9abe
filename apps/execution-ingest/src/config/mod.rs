//! Configuration module for the ingestion service.
//!
//! Provides configuration loading, validation, and environment variable
//! interpolation for all components. Values are read once when components
//! are built; changing the file requires a restart.
//!
//! # Usage
//!
//! ```rust,ignore
//! use execution_ingest::config::{Config, load_config};
//!
//! // Load from default path (config.yaml)
//! let config = load_config(None)?;
//!
//! // Load from custom path
//! let config = load_config(Some("custom/config.yaml"))?;
//!
//! println!("HTTP port: {}", config.server.http_port);
//! ```

mod batch;
mod circuit_breaker;
mod observability;
mod persistence;
mod publisher;
mod server;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use batch::{AdaptiveBatchConfig, BatchConfig};
pub use circuit_breaker::CircuitBreakerConfig;
pub use observability::{LoggingConfig, ObservabilityConfig};
pub use persistence::PersistenceConfig;
pub use publisher::PublisherConfig;
pub use server::ServerConfig;

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "INGEST_CONFIG";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Batch intake and adaptive sizing.
    #[serde(default)]
    pub batch: BatchConfig,
    /// Connection pool and insert retries.
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Event publication.
    #[serde(default)]
    pub publisher: PublisherConfig,
    /// Circuit breaker guarding publication.
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ============================================
// Configuration Loading
// ============================================

/// Load configuration from a YAML file with environment variable interpolation.
///
/// # Arguments
///
/// * `path` - Optional path to the config file. Defaults to "config.yaml".
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or("config.yaml");

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_string(),
        source: e,
    })?;

    load_config_from_string(&contents)
}

/// Load configuration from a YAML string (useful for testing).
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    if interpolated.trim().is_empty() {
        return Ok(Config::default());
    }
    let config: Config = serde_yaml_bw::from_str(&interpolated)?;
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax.
#[allow(clippy::expect_used)] // Regex is compile-time constant
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    re.replace_all(input, |cap: &regex::Captures<'_>| {
        let default_value = cap.get(2).map_or("", |m| m.as_str());
        match std::env::var(&cap[1]) {
            Ok(v) if !v.is_empty() => v,
            _ => default_value.to_string(),
        }
    })
    .into_owned()
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

/// Validate configuration values.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.batch.max_items_per_request == 0 {
        return Err(invalid("batch.max_items_per_request must be positive"));
    }
    if config.batch.bulk_chunk_size == 0 {
        return Err(invalid("batch.bulk_chunk_size must be positive"));
    }

    let adaptive = &config.batch.adaptive;
    if adaptive.min_size == 0 {
        return Err(invalid("batch.adaptive.min_size must be positive"));
    }
    if adaptive.min_size > adaptive.max_size {
        return Err(invalid(
            "batch.adaptive.min_size must not exceed batch.adaptive.max_size",
        ));
    }
    for (name, value) in [
        ("critical_utilization", adaptive.critical_utilization),
        ("high_utilization", adaptive.high_utilization),
        ("low_utilization", adaptive.low_utilization),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(invalid(format!(
                "batch.adaptive.{name} must be between 0.0 and 1.0"
            )));
        }
    }
    if adaptive.low_utilization > adaptive.high_utilization
        || adaptive.high_utilization > adaptive.critical_utilization
    {
        return Err(invalid(
            "batch.adaptive thresholds must satisfy low <= high <= critical",
        ));
    }

    let persistence = &config.persistence;
    if persistence.pool_max_size == 0 {
        return Err(invalid("persistence.pool_max_size must be positive"));
    }
    if persistence.pool_min_size > persistence.pool_max_size {
        return Err(invalid(
            "persistence.pool_min_size must not exceed persistence.pool_max_size",
        ));
    }
    if persistence.max_retries == 0 {
        return Err(invalid("persistence.max_retries must be at least 1"));
    }
    if persistence.retry_multiplier < 1.0 {
        return Err(invalid("persistence.retry_multiplier must be at least 1.0"));
    }
    if !(0.0..=1.0).contains(&persistence.jitter_factor) {
        return Err(invalid("persistence.jitter_factor must be between 0.0 and 1.0"));
    }

    let publisher = &config.publisher;
    if publisher.max_attempts == 0 {
        return Err(invalid("publisher.max_attempts must be at least 1"));
    }
    if publisher.multiplier < 1.0 {
        return Err(invalid("publisher.multiplier must be at least 1.0"));
    }
    if publisher.worker_pool_size == 0 {
        return Err(invalid("publisher.worker_pool_size must be positive"));
    }
    if publisher.topic.trim().is_empty() {
        return Err(invalid("publisher.topic must not be empty"));
    }
    if publisher.dead_letter_enabled && publisher.dead_letter_topic.trim().is_empty() {
        return Err(invalid(
            "publisher.dead_letter_topic must be set when dead lettering is enabled",
        ));
    }

    if config.circuit_breaker.failure_threshold == 0 {
        return Err(invalid("circuit_breaker.failure_threshold must be at least 1"));
    }
    // A trial send must settle before the breaker could admit another.
    if publisher.send_timeout() >= config.circuit_breaker.to_resilience_config().recovery_timeout {
        return Err(invalid(
            "publisher.send_timeout_ms must be shorter than circuit_breaker.recovery_timeout_secs",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.http_port, 8080);
        assert_eq!(config.batch.max_items_per_request, 100);
        assert_eq!(config.batch.bulk_chunk_size, 500);
        assert!(config.batch.adaptive.enabled);
        assert_eq!(config.publisher.max_attempts, 3);
        assert_eq!(config.publisher.initial_delay_ms, 1000);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = match load_config_from_string("") {
            Ok(c) => c,
            Err(e) => panic!("empty config should load: {e}"),
        };
        assert_eq!(config.server.http_port, 8080);
    }

    #[test]
    fn test_load_minimal_config() {
        let yaml = r"
server:
  http_port: 9000
";

        let config = match load_config_from_string(yaml) {
            Ok(c) => c,
            Err(e) => panic!("should load minimal config: {e}"),
        };
        assert_eq!(config.server.http_port, 9000);
        assert_eq!(config.publisher.topic, "executions");
    }

    #[test]
    fn test_env_var_with_default_when_missing() {
        let input = "topic: ${INGEST_CONFIG_TEST_NONEXISTENT_VAR:-executions}";
        assert_eq!(interpolate_env_vars(input), "topic: executions");
    }

    #[test]
    #[expect(clippy::literal_string_with_formatting_args)] // ${...} is env var syntax, not format args
    fn test_env_var_with_default_uses_existing() {
        let input = "path: ${PATH:-default}";
        let result = interpolate_env_vars(input);
        assert_ne!(result, "path: default");
        assert!(result.starts_with("path: "));
    }

    #[test]
    fn test_env_var_without_default_becomes_empty() {
        let input = "broker_url: ${INGEST_CONFIG_TEST_UNLIKELY_TO_EXIST}";
        assert_eq!(interpolate_env_vars(input), "broker_url: ");
    }

    #[test]
    fn test_validation_min_exceeds_max() {
        let yaml = r"
batch:
  adaptive:
    min_size: 500
    max_size: 100
";
        let Err(err) = load_config_from_string(yaml) else {
            panic!("expected error for min_size > max_size");
        };
        assert!(err.to_string().contains("min_size"));
    }

    #[test]
    fn test_validation_zero_attempts() {
        let yaml = r"
publisher:
  max_attempts: 0
";
        let Err(err) = load_config_from_string(yaml) else {
            panic!("expected error for zero attempts");
        };
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn test_validation_threshold_out_of_range() {
        let yaml = r"
batch:
  adaptive:
    critical_utilization: 1.5
";
        let Err(err) = load_config_from_string(yaml) else {
            panic!("expected error for utilization > 1.0");
        };
        assert!(err.to_string().contains("critical_utilization"));
    }

    #[test]
    fn test_validation_send_timeout_outlasts_recovery() {
        let yaml = r"
publisher:
  send_timeout_ms: 10000
circuit_breaker:
  recovery_timeout_secs: 10
";
        let Err(err) = load_config_from_string(yaml) else {
            panic!("expected error for send timeout >= recovery timeout");
        };
        assert!(err.to_string().contains("send_timeout_ms"));

        let yaml = r"
publisher:
  send_timeout_ms: 9999
circuit_breaker:
  recovery_timeout_secs: 10
";
        assert!(load_config_from_string(yaml).is_ok());
    }

    #[test]
    fn test_validation_zero_failure_threshold() {
        let yaml = r"
circuit_breaker:
  failure_threshold: 0
";
        assert!(load_config_from_string(yaml).is_err());
    }

    #[test]
    fn test_full_config_parse() {
        let yaml = r#"
server:
  http_port: 8081
  bind_address: "127.0.0.1"
  metrics_enabled: false

batch:
  max_items_per_request: 250
  bulk_chunk_size: 400
  adaptive:
    enabled: false
    min_size: 10
    max_size: 800

persistence:
  pool_min_size: 2
  pool_max_size: 10
  max_retries: 4
  jitter_factor: 0.1

publisher:
  topic: "trade-executions"
  dead_letter_topic: "trade-executions.dlq"
  max_attempts: 5
  worker_pool_size: 4
  broker_url: "http://localhost:8082"

circuit_breaker:
  failure_threshold: 3
  recovery_timeout_secs: 10

observability:
  logging:
    level: "debug"
    format: "pretty"
"#;

        let config = match load_config_from_string(yaml) {
            Ok(c) => c,
            Err(e) => panic!("should load full config: {e}"),
        };

        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert!(!config.server.metrics_enabled);
        assert_eq!(config.batch.max_items_per_request, 250);
        assert!(!config.batch.adaptive.enabled);
        assert_eq!(config.persistence.max_retries, 4);
        assert_eq!(config.publisher.topic, "trade-executions");
        assert_eq!(
            config.publisher.broker_url.as_deref(),
            Some("http://localhost:8082")
        );
        assert_eq!(config.circuit_breaker.recovery_timeout_secs, 10);
        assert_eq!(config.observability.logging.level, "debug");

        let sizing = config.batch.to_sizing_config();
        assert_eq!(sizing.fixed_chunk_size, 400);
        let breaker = config.circuit_breaker.to_resilience_config();
        assert_eq!(breaker.failure_threshold, 3);
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config(Some("/nonexistent/ingest-config.yaml"));
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "server:\n  http_port: 7070\n").unwrap();

        let config = load_config(path.to_str()).unwrap();
        assert_eq!(config.server.http_port, 7070);
    }
}
