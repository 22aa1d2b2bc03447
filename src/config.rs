//! Configuration management for Tollgate.
//!
//! Values are layered: built-in defaults, then an optional YAML file, then
//! `TOLLGATE__<SECTION>__<FIELD>` environment variables.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, TollgateError};
use crate::ratelimit::QuotaPolicy;

/// Prefix for environment variable overrides.
const ENV_PREFIX: &str = "TOLLGATE";

/// Main configuration for the Tollgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Counter store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// How a quota key is derived from a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategyKind {
    /// Method followed by the raw request path.
    #[default]
    MethodPath,
    /// Method followed by the matched route template.
    MatchedRoute,
}

/// What the middleware does when the counter store cannot answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Surface the store error as a server error; never call the handler.
    #[default]
    Closed,
    /// Log the store error and let the request through.
    Open,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Admissions allowed per key within one window
    #[serde(default = "default_limit")]
    pub limit: u64,

    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Namespace prepended to every key in the store
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    #[serde(default)]
    pub key_strategy: KeyStrategyKind,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Add `x-ratelimit-*` headers to decided responses
    #[serde(default)]
    pub expose_headers: bool,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            window_secs: default_window_secs(),
            key_prefix: default_key_prefix(),
            key_strategy: KeyStrategyKind::default(),
            failure_policy: FailurePolicy::default(),
            expose_headers: false,
        }
    }
}

impl RateLimitingConfig {
    /// The quota this configuration describes.
    pub fn policy(&self) -> QuotaPolicy {
        QuotaPolicy::new(self.limit, Duration::from_secs(self.window_secs))
    }
}

fn default_limit() -> u64 {
    10
}

fn default_window_secs() -> u64 {
    60
}

fn default_key_prefix() -> String {
    "rate:".to_string()
}

/// Which counter store backs the limiter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process store; only correct for a single instance.
    #[default]
    Memory,
    /// Shared Redis instance.
    Redis,
}

/// Counter store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Redis connection URL, required for the redis backend
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Upper bound on a single store round trip, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// How often the memory store drops expired windows, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            redis_url: None,
            timeout_ms: default_timeout_ms(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_timeout_ms() -> u64 {
    3000
}

fn default_sweep_interval() -> u64 {
    30
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,

    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TollgateConfig {
    /// Load configuration from an optional YAML file plus environment overrides.
    ///
    /// The result is not validated, so callers can apply further overrides
    /// first and then call [`validate`](Self::validate).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(true),
            );
        }

        let config: TollgateConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TollgateConfig = serde_yaml::from_str(yaml)
            .map_err(|e| TollgateError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the limiter cannot work with.
    pub fn validate(&self) -> Result<()> {
        let rl = &self.rate_limiting;
        if rl.limit == 0 {
            return Err(TollgateError::Config("rate_limiting.limit must be positive".into()));
        }
        if rl.window_secs == 0 {
            return Err(TollgateError::Config(
                "rate_limiting.window_secs must be positive".into(),
            ));
        }
        if self.store.timeout_ms == 0 {
            return Err(TollgateError::Config("store.timeout_ms must be positive".into()));
        }
        if self.store.backend == StoreBackend::Redis
            && self.store.redis_url.as_deref().map_or(true, str::is_empty)
        {
            return Err(TollgateError::Config(
                "store.redis_url is required for the redis backend".into(),
            ));
        }
        Ok(())
    }
}
