//! Configuration management for the rate limit engine.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Error, Result};

/// Prefix for environment variable overrides, e.g. `AGENTLIMIT__AGENT__URL`.
const ENV_PREFIX: &str = "AGENTLIMIT";

/// Main configuration for the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Use the agent-backed engine; `false` substitutes the no-op limiter
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Agent connection settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Local counter cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Forced-sync sampling settings
    #[serde(default)]
    pub sampling: SamplingConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            agent: AgentConfig::default(),
            cache: CacheConfig::default(),
            sampling: SamplingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// Agent connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent gRPC endpoint
    #[serde(default = "default_agent_url")]
    pub url: String,

    /// Bearer token sent with every call
    #[serde(default)]
    pub token: Option<String>,

    /// Extra attempts after the first failed call
    #[serde(default = "default_retries")]
    pub retries: usize,

    /// Upper bound for a single attempt in milliseconds
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_ms: u64,

    /// Connection establishment timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            url: default_agent_url(),
            token: None,
            retries: default_retries(),
            attempt_timeout_ms: default_attempt_timeout(),
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

impl AgentConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn default_agent_url() -> String {
    "http://127.0.0.1:8081".to_string()
}

fn default_retries() -> usize {
    3
}

fn default_attempt_timeout() -> u64 {
    250
}

fn default_connect_timeout() -> u64 {
    1000
}

/// Counter cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Soft maximum entry count before expired windows are pruned
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
        }
    }
}

fn default_cache_capacity() -> usize {
    10_000
}

/// Configuration for the forced-sync sampling gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Probability of forcing a sync call for an async request with no cached data
    #[serde(default = "default_sync_on_no_data")]
    pub sync_on_no_data: f64,

    /// Seconds after start before the sampling gate is evaluated
    #[serde(default = "default_warmup")]
    pub warmup_secs: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            sync_on_no_data: default_sync_on_no_data(),
            warmup_secs: default_warmup(),
        }
    }
}

impl SamplingConfig {
    /// The sampling probability clamped into `[0, 1]`.
    pub fn probability(&self) -> f64 {
        if self.sync_on_no_data.is_nan() {
            return 0.0;
        }
        self.sync_on_no_data.clamp(0.0, 1.0)
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_secs(self.warmup_secs)
    }
}

fn default_sync_on_no_data() -> f64 {
    0.1
}

fn default_warmup() -> u64 {
    60
}

/// Log output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl EngineConfig {
    /// Load configuration from a file, with `AGENTLIMIT__*` environment overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading engine configuration");

        if !path.exists() {
            return Err(Error::Config(format!(
                "configuration file not found: {}",
                path.display()
            )));
        }

        config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| Error::Config(e.to_string()))
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| Error::Config(format!("Failed to parse engine config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(config.enabled);
        assert_eq!(config.agent.retries, 3);
        assert_eq!(config.agent.attempt_timeout(), Duration::from_millis(250));
        assert_eq!(config.cache.capacity, 10_000);
        assert_eq!(config.sampling.warmup(), Duration::from_secs(60));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
agent:
  url: http://agent.internal:9000
  token: secret
cache:
  capacity: 500
"#;
        let config = EngineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.agent.url, "http://agent.internal:9000");
        assert_eq!(config.agent.token.as_deref(), Some("secret"));
        assert_eq!(config.agent.retries, 3);
        assert_eq!(config.cache.capacity, 500);
        assert!(config.enabled);
    }

    #[test]
    fn test_parse_disabled() {
        let config = EngineConfig::from_yaml("enabled: false").unwrap();
        assert!(!config.enabled);
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let err = EngineConfig::from_yaml("cache: [not, a, map]").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_sampling_probability_is_clamped() {
        let mut sampling = SamplingConfig::default();
        sampling.sync_on_no_data = 1.5;
        assert_eq!(sampling.probability(), 1.0);
        sampling.sync_on_no_data = -0.2;
        assert_eq!(sampling.probability(), 0.0);
        sampling.sync_on_no_data = f64::NAN;
        assert_eq!(sampling.probability(), 0.0);
    }

    #[test]
    fn test_missing_file() {
        let err = EngineConfig::from_file("/nonexistent/agentlimit.yaml").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
