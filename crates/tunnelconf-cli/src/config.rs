use std::{
    fs,
    path::{Path, PathBuf},
};

use color_eyre::Result;
use dirs::config_dir;
use serde::{Deserialize, Serialize};

/// Default contention budget for `migrate`.
pub const DEFAULT_MIGRATION_BUDGET: u32 = 3;

/// User-level configuration loaded from `<config dir>/tunnelconf/config.toml`.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Override for the tunnel configuration directory.
    pub configurations_dir: Option<PathBuf>,
    /// Contention budget used by `migrate` when none is given.
    pub migration_budget: Option<u32>,
    /// Where the sealing key lives in the OS keyring.
    pub keyring: Option<KeyringConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct KeyringConfig {
    pub service: String,
    pub account: String,
}

impl Default for KeyringConfig {
    fn default() -> Self {
        Self {
            service: "tunnelconf".to_string(),
            account: "config-key".to_string(),
        }
    }
}

impl Config {
    pub fn migration_budget(&self) -> u32 {
        self.migration_budget.unwrap_or(DEFAULT_MIGRATION_BUDGET)
    }

    pub fn keyring(&self) -> KeyringConfig {
        self.keyring.clone().unwrap_or_default()
    }
}

/// Load config from the default path; if missing, return defaults.
pub fn load() -> Result<Config> {
    load_from_path(default_path()?)
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    Ok(toml::from_str(&contents)?)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| color_eyre::eyre::eyre!("no config dir available"))?;
    Ok(base.join("tunnelconf").join("config.toml"))
}

/// Write `config` to the default path unless a file is already there.
pub fn write_default_if_missing(config: &Config) -> Result<PathBuf> {
    let path = default_path()?;
    write_if_missing(config, &path)?;
    Ok(path)
}

/// Returns `false` without touching the file when `path` already exists.
pub fn write_if_missing(config: &Config, path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, toml::to_string_pretty(config)?)?;
    Ok(true)
}
