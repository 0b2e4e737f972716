//! Configuration Module
//!
//! This module defines all configuration structures for the ledger node.
//! Configuration is loaded from TOML files and parsed using serde.

use crate::validation::LockMode;
use serde::Deserialize;
use std::fs;

/// Main configuration structure
///
/// Contains all configuration sections for the node. Every section may be
/// omitted, in which case its defaults apply.
///
/// # Example TOML
/// ```toml
/// [validation]
/// lock_mode = "per_workflow"
///
/// [ledger]
/// max_block_size = 10
/// node_id = "node-1"
///
/// [logging]
/// level = "info"
///
/// [import]
/// path = "transactions.json"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub validation: ValidationConfig,
    pub ledger: LedgerConfig,
    pub logging: LoggingConfig,
    pub import: ImportConfig,
}

/// Validation configuration
///
/// # Fields
/// - `lock_mode`: `"global"` serializes every validation, `"per_workflow"`
///   only validations of the same workflow
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub lock_mode: LockMode,
}

/// Ledger configuration
///
/// # Fields
/// - `max_block_size`: Maximum number of transactions sealed into one block
/// - `node_id`: Identifier recorded as the creator of sealed blocks
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub max_block_size: usize,
    pub node_id: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_block_size: 10,
            node_id: "node-1".to_string(),
        }
    }
}

/// Logging configuration
///
/// `level` is an `EnvFilter` directive; `RUST_LOG` takes precedence.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Transaction import configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// JSON file replayed by the `import` command when no file is given
    pub path: Option<String>,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    /// * `path` - Path to the TOML configuration file
    ///
    /// # Returns
    /// * `Ok(Config)` if the file was successfully loaded and parsed
    /// * `Err` if the file couldn't be read or the TOML is invalid
    pub fn load(path: &str) -> anyhow::Result<Self> {
        // Read the file contents as a string
        let content = fs::read_to_string(path)?;

        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;

        if config.ledger.max_block_size == 0 {
            anyhow::bail!("ledger.max_block_size must be at least 1");
        }

        Ok(config)
    }
}
