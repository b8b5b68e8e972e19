//! Server configuration.
//!
//! Every value can be overridden through `LOGTREE_*` environment variables:
//! - `LOGTREE_HOST`: bind host (default `0.0.0.0`)
//! - `LOGTREE_PORT`: bind port (default `52381`)
//! - `LOGTREE_AGGREGATION_FACTOR`: summary fan-in (default `5`, at least `2`)
//! - `LOGTREE_BROADCAST_CAPACITY`: push channel capacity (default `256`)
//! - `LOGTREE_LOG_LEVEL`: `trace|debug|info|warn|error`
//! - `LOGTREE_LOG_DIR`: absolute directory for rolling logs; stderr when unset

use logtree_core::{default_log_level, DEFAULT_AGGREGATION_FACTOR, MIN_AGGREGATION_FACTOR};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

pub const ENV_HOST: &str = "LOGTREE_HOST";
pub const ENV_PORT: &str = "LOGTREE_PORT";
pub const ENV_AGGREGATION_FACTOR: &str = "LOGTREE_AGGREGATION_FACTOR";
pub const ENV_BROADCAST_CAPACITY: &str = "LOGTREE_BROADCAST_CAPACITY";
pub const ENV_LOG_LEVEL: &str = "LOGTREE_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "LOGTREE_LOG_DIR";

/// Errors from configuration loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Variable is set but does not parse as the expected number.
    InvalidNumber { var: &'static str, value: String },
    /// Fan-in below the minimum tree-forming value.
    FactorTooSmall(usize),
    /// Push channel needs room for at least one message.
    ZeroBroadcastCapacity,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidNumber { var, value } => {
                write!(f, "{var} must be a non-negative integer, got `{value}`")
            }
            Self::FactorTooSmall(factor) => write!(
                f,
                "{ENV_AGGREGATION_FACTOR} must be at least {MIN_AGGREGATION_FACTOR}, got {factor}"
            ),
            Self::ZeroBroadcastCapacity => {
                write!(f, "{ENV_BROADCAST_CAPACITY} must be at least 1")
            }
        }
    }
}

impl Error for ConfigError {}

/// Server configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Server bind host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Number of same-level nodes folded into one summary
    pub aggregation_factor: usize,
    /// Push channel capacity; slower subscribers are resynchronized
    pub broadcast_capacity: usize,
    /// Log level name
    pub log_level: String,
    /// Rolling log directory, stderr when `None`
    pub log_dir: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 52381,
            aggregation_factor: DEFAULT_AGGREGATION_FACTOR,
            broadcast_capacity: 256,
            log_level: default_log_level().to_string(),
            log_dir: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables with defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(host) = read(ENV_HOST) {
            config.host = host.trim().to_string();
        }
        if let Some(port) = read(ENV_PORT) {
            config.port = parse_number(ENV_PORT, &port)?;
        }
        if let Some(factor) = read(ENV_AGGREGATION_FACTOR) {
            config.aggregation_factor = parse_number(ENV_AGGREGATION_FACTOR, &factor)?;
        }
        if let Some(capacity) = read(ENV_BROADCAST_CAPACITY) {
            config.broadcast_capacity = parse_number(ENV_BROADCAST_CAPACITY, &capacity)?;
        }
        if let Some(level) = read(ENV_LOG_LEVEL) {
            config.log_level = level;
        }
        config.log_dir = read(ENV_LOG_DIR);

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.aggregation_factor < MIN_AGGREGATION_FACTOR {
            return Err(ConfigError::FactorTooSmall(self.aggregation_factor));
        }
        if self.broadcast_capacity == 0 {
            return Err(ConfigError::ZeroBroadcastCapacity);
        }
        Ok(())
    }

    /// Get the full server bind address
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_number<T: FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidNumber {
            var,
            value: value.to_string(),
        })
}
