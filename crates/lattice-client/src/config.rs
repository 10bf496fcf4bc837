//! Client configuration.
//!
//! Centralized configuration management with support for:
//! - Default values (embedded in binary)
//! - Configuration files (TOML format)
//! - Environment variable overrides (prefix: `LATTICE__`)
//!
//! # Environment Variables
//!
//! - `LATTICE__RPC__TIMEOUT_MS=500`
//! - `LATTICE__RPC__MAX_RETRIES=5`
//! - `LATTICE__RPC__BACKOFF_MS=20`
//! - `LATTICE__BENCH__QUEUE_DEPTH=64`

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Root configuration for the client SDK.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// RPC controller configuration.
    pub rpc: RpcConfig,
    /// Benchmark harness configuration.
    pub bench: BenchConfig,
}

/// RPC controller knobs: per-attempt deadline and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RpcConfig {
    /// Per-attempt deadline in milliseconds.
    pub timeout_ms: u64,
    /// Maximum attempts per RPC (first try included).
    pub max_retries: u32,
    /// Initial backoff between attempts; doubles per retry.
    pub backoff_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 1_000,
            max_retries: 3,
            backoff_ms: 10,
        }
    }
}

impl RpcConfig {
    /// Per-attempt deadline as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Initial backoff as a [`Duration`].
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// Benchmark harness knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BenchConfig {
    /// Bounded queue depth between the dataset producer and the driver.
    pub queue_depth: usize,
    /// Vectors per produced batch.
    pub batch_size: usize,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            queue_depth: 32,
            batch_size: 512,
        }
    }
}

impl ClientConfig {
    /// Loads configuration from an optional file path with environment
    /// variable overrides.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (`LATTICE__*`)
    /// 2. Configuration file (if provided)
    /// 3. Built-in defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = path {
            let contents = std::fs::read_to_string(path)?;
            config = toml::from_str(&contents)?;
        }

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Applies `LATTICE__SECTION__FIELD` environment overrides.
    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_u64("LATTICE__RPC__TIMEOUT_MS") {
            self.rpc.timeout_ms = v;
        }
        if let Some(v) = env_u64("LATTICE__RPC__MAX_RETRIES") {
            self.rpc.max_retries = v as u32;
        }
        if let Some(v) = env_u64("LATTICE__RPC__BACKOFF_MS") {
            self.rpc.backoff_ms = v;
        }
        if let Some(v) = env_u64("LATTICE__BENCH__QUEUE_DEPTH") {
            self.bench.queue_depth = v as usize;
        }
        if let Some(v) = env_u64("LATTICE__BENCH__BATCH_SIZE") {
            self.bench.batch_size = v as usize;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.rpc.max_retries == 0 {
            return Err(ConfigError::Invalid("rpc.max_retries must be > 0".into()));
        }
        if self.rpc.timeout_ms == 0 {
            return Err(ConfigError::Invalid("rpc.timeout_ms must be > 0".into()));
        }
        if self.bench.queue_depth == 0 {
            return Err(ConfigError::Invalid("bench.queue_depth must be > 0".into()));
        }
        Ok(())
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
