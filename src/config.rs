use anyhow::{anyhow, Context};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Result;
use crate::fx::UnknownCurrencyPolicy;
use crate::pricing::csv_store::DEFAULT_EXCHANGE_RATE_SYMBOL;

const CONFIG_FILENAME: &str = "config.toml";

/// Runtime settings, read from `config.toml`.
///
/// Every key is optional; command-line flags override whatever the file says.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlowConfig {
    /// Directory holding `<SYMBOL>.csv` price histories
    pub resources_dir: PathBuf,
    pub transactions_file: PathBuf,
    /// Price file whose closes are the EUR→USD rate
    pub exchange_rate_symbol: String,
    pub unknown_currency: UnknownCurrencyPolicy,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            resources_dir: PathBuf::from("resources"),
            transactions_file: PathBuf::from("transactions.csv"),
            exchange_rate_symbol: DEFAULT_EXCHANGE_RATE_SYMBOL.to_string(),
            unknown_currency: UnknownCurrencyPolicy::default(),
        }
    }
}

pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(dir_spec::config_home)
        .ok_or_else(|| anyhow!("Could not determine config directory"))?;
    Ok(config_dir.join("fundflow"))
}

impl FlowConfig {
    /// Load the explicit file when given (it must exist), otherwise the user
    /// config file when present, otherwise defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        match get_config_dir() {
            Ok(dir) => {
                let path = dir.join(CONFIG_FILENAME);
                if path.exists() {
                    Self::from_file(&path)
                } else {
                    debug!("No config at {}, using defaults", path.display());
                    Ok(Self::default())
                }
            }
            Err(e) => {
                debug!("{}; using defaults", e);
                Ok(Self::default())
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::parse(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}
