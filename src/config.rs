//! Configuration management for Floodgate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Main configuration for the Floodgate rate limiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloodgateConfig {
    /// Backing store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Named rate limit rules (rule name -> period/limit)
    #[serde(default)]
    pub rules: HashMap<String, RuleConfig>,
}

impl Default for FloodgateConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            rules: HashMap::new(),
        }
    }
}

/// Backing store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store connection URL
    #[serde(default = "default_store_url")]
    pub url: String,

    /// Prefix under which every key this component creates is scoped
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Keys deleted per round-trip during a bulk reset sweep
    #[serde(default = "default_sweep_chunk")]
    pub sweep_chunk: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            key_prefix: default_key_prefix(),
            sweep_chunk: default_sweep_chunk(),
        }
    }
}

fn default_store_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_key_prefix() -> String {
    "floodgate:rl".to_string()
}

fn default_sweep_chunk() -> usize {
    2000
}

/// Configuration for a single named rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Window duration in seconds
    pub period_secs: u64,
    /// Maximum attempts admitted within the window
    pub limit: u64,
}

impl FloodgateConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &str) -> crate::error::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> crate::error::Result<Self> {
        let config: FloodgateConfig = serde_yaml::from_str(yaml)
            .map_err(|e| crate::error::FloodgateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject rules a limiter could never enforce.
    fn validate(&self) -> crate::error::Result<()> {
        for (name, rule) in &self.rules {
            if rule.limit == 0 {
                return Err(crate::error::FloodgateError::Config(format!(
                    "rule '{}' has limit 0; limits must be >= 1",
                    name
                )));
            }
            if rule.period_secs == 0 {
                return Err(crate::error::FloodgateError::Config(format!(
                    "rule '{}' has period 0; periods must be >= 1s",
                    name
                )));
            }
        }
        Ok(())
    }
}
