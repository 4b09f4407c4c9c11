//! Restock configuration
//!
//! Resolution order:
//! 1. Explicit path (`--config`), which must exist
//! 2. Override in the config dir (~/.config/restock/config.toml)
//! 3. Embedded defaults (compiled into binary)
//!
//! `RESTOCK_LEDGER` and `RESTOCK_RECEIPTS_DIR` override the file afterwards.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::matcher::DEFAULT_FUZZY_THRESHOLD;

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/restock.toml");

/// Environment variable overriding the ledger snapshot path
pub const LEDGER_ENV: &str = "RESTOCK_LEDGER";

/// Environment variable overriding the receipt pictures directory
pub const RECEIPTS_DIR_ENV: &str = "RESTOCK_RECEIPTS_DIR";

/// Upper bound for `search.max_results`
pub const MAX_RESULTS_LIMIT: usize = 50;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ledger: LedgerConfig,
    pub receipts: ReceiptsConfig,
    pub search: SearchConfig,
    pub summary: SummaryConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiptsConfig {
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub max_results: usize,
    pub receipts_only: bool,
    pub fuzzy_threshold: u8,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: 3,
            receipts_only: true,
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    pub exclude_latest: bool,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            exclude_latest: true,
        }
    }
}

impl Config {
    /// Load configuration and apply environment overrides
    pub fn load(override_path: Option<&Path>) -> Result<Self> {
        let mut config = load_file(override_path)?;
        config.apply_overrides(
            std::env::var_os(LEDGER_ENV).map(PathBuf::from),
            std::env::var_os(RECEIPTS_DIR_ENV).map(PathBuf::from),
        );
        Ok(config)
    }

    /// Replace the ledger path and receipts dir when given
    pub fn apply_overrides(&mut self, ledger: Option<PathBuf>, receipts_dir: Option<PathBuf>) {
        if let Some(path) = ledger {
            self.ledger.path = Some(path);
        }
        if let Some(dir) = receipts_dir {
            self.receipts.dir = Some(dir);
        }
    }

    /// Ledger path, or an error telling the user how to set it
    pub fn ledger_path(&self) -> Result<&Path> {
        self.ledger.path.as_deref().ok_or_else(|| {
            Error::Config(format!(
                "No ledger snapshot configured. Set [ledger] path in the config file or {}",
                LEDGER_ENV
            ))
        })
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("restock").join("config.toml"))
}

fn load_file(override_path: Option<&Path>) -> Result<Config> {
    let content = match override_path {
        Some(path) => fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?,
        None => match default_config_path().filter(|p| p.exists()) {
            Some(path) => {
                debug!(path = %path.display(), "Using config override");
                fs::read_to_string(&path).map_err(|e| {
                    Error::Config(format!("Failed to read config {}: {}", path.display(), e))
                })?
            }
            None => DEFAULT_CONFIG.to_string(),
        },
    };

    parse_config(&content)
}

/// Parse config from TOML content, clamping out-of-range values
pub fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

    config.search.max_results = config.search.max_results.clamp(1, MAX_RESULTS_LIMIT);
    config.search.fuzzy_threshold = config.search.fuzzy_threshold.min(100);

    Ok(config)
}
