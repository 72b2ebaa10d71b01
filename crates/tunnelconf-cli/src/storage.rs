use std::{fs, path::PathBuf, sync::Arc};

use color_eyre::Result;
use dirs::data_dir;
use tracing::debug;
use tunnelconf_storage::{
    key_provider::KeyringProvider, AesGcmSealer, ConfigStore, MigrationCoordinator,
    MigrationEngine,
};

use crate::config::Config;

pub type ProductionStore = ConfigStore<AesGcmSealer<KeyringProvider>>;

/// Resolve the default tunnel configuration directory.
pub fn default_configurations_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("tunnelconf").join("Configurations"))
}

/// Configuration directory from config overrides, created owner-only if missing.
pub fn configurations_dir(config: &Config) -> Result<PathBuf> {
    let dir = match &config.configurations_dir {
        Some(dir) => dir.clone(),
        None => default_configurations_dir()?,
    };
    ensure_private_dir(&dir)?;
    Ok(dir)
}

/// Build the keyring-backed store described by `config`.
pub fn store_from_config(config: &Config) -> Result<ProductionStore> {
    let dir = configurations_dir(config)?;
    let keyring = config.keyring();
    debug!(?dir, service = %keyring.service, "initializing configuration store");
    Ok(ConfigStore::new(
        dir,
        AesGcmSealer::new(KeyringProvider::new(keyring.service, keyring.account)),
    ))
}

/// Migration engine over the store described by `config`.
pub fn migration_engine(
    config: &Config,
) -> Result<MigrationEngine<AesGcmSealer<KeyringProvider>>> {
    let store = store_from_config(config)?;
    Ok(MigrationEngine::new(
        Arc::new(store),
        MigrationCoordinator::new(),
    ))
}

fn ensure_private_dir(dir: &std::path::Path) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}
