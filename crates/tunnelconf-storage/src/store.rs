use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::{debug, instrument};
use tunnelconf_core::{ConfError, Config, ConfigFormat, NameValidator, Sealer, WgQuickFormat};

use crate::{
    names::{self, NameCodec},
    record_io,
};

/// Sealed tunnel configurations, one file per tunnel, in a single directory.
///
/// There is no in-memory index: every call goes back to the filesystem, so
/// several stores (or processes) may share a directory.
pub struct ConfigStore<S: Sealer, F: ConfigFormat = WgQuickFormat> {
    names: NameCodec,
    sealer: S,
    format: F,
}

impl<S: Sealer> ConfigStore<S, WgQuickFormat> {
    /// Store in `dir` using the default text format and name rule.
    pub fn new(dir: impl Into<PathBuf>, sealer: S) -> Self {
        Self::with_format(NameCodec::new(dir), sealer, WgQuickFormat)
    }
}

impl<S: Sealer, F: ConfigFormat> ConfigStore<S, F> {
    pub fn with_format(names: NameCodec, sealer: S, format: F) -> Self {
        Self {
            names,
            sealer,
            format,
        }
    }

    /// Replace the tunnel name rule.
    pub fn with_validator(self, validator: Arc<dyn NameValidator>) -> Self {
        let dir = self.names.dir().to_path_buf();
        Self {
            names: NameCodec::with_validator(dir, validator),
            ..self
        }
    }

    pub fn directory(&self) -> &Path {
        self.names.dir()
    }

    pub fn names(&self) -> &NameCodec {
        &self.names
    }

    pub fn format(&self) -> &F {
        &self.format
    }

    pub fn sealer(&self) -> &S {
        &self.sealer
    }

    /// Names of all valid sealed configurations, in directory order.
    #[instrument(skip_all)]
    pub fn list_names(&self) -> Result<Vec<String>, ConfError> {
        let dir = self.names.dir();
        let entries = fs::read_dir(dir).map_err(|err| ConfError::io(dir, err))?;
        let names = self.names.names_from_listing(entries);
        debug!(count = names.len(), "listed configurations");
        Ok(names)
    }

    pub async fn load_by_name(&self, name: &str) -> Result<Config, ConfError> {
        self.load_by_path(&self.names.path_for(name, true)).await
    }

    /// Loads a sealed (`.conf.dpapi`) or legacy (`.conf`) file from any location.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn load_by_path(&self, path: &Path) -> Result<Config, ConfError> {
        let name = self.names.name_from_path(path)?;
        let mut bytes = record_io::read(path)?;
        if names::is_encrypted_path(path) {
            bytes = self.sealer.unseal(&bytes, &name).await?;
        }
        self.format.decode(&bytes, &name)
    }

    /// Encodes, seals and writes `config`. With `overwrite == false` an
    /// existing record is never replaced and `AlreadyExists` is returned.
    #[instrument(skip_all, fields(name = %config.name, overwrite = overwrite))]
    pub async fn save(&self, config: &Config, overwrite: bool) -> Result<(), ConfError> {
        self.names.check(&config.name)?;
        let path = self.names.path_for(&config.name, true);
        let plaintext = self.format.encode(config);
        let sealed = self.sealer.seal(&plaintext, &config.name).await?;
        record_io::write_atomic(&path, overwrite, &sealed)?;
        debug!("saved configuration");
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn delete_by_name(&self, name: &str) -> Result<(), ConfError> {
        self.names.check(name)?;
        record_io::remove(&self.names.path_for(name, true))
    }

    pub fn delete(&self, config: &Config) -> Result<(), ConfError> {
        self.delete_by_name(&config.name)
    }

    /// Sealed file path of `config`.
    pub fn path_for(&self, config: &Config) -> Result<PathBuf, ConfError> {
        self.path_for_name(&config.name)
    }

    /// Sealed file path of the tunnel called `name`.
    pub fn path_for_name(&self, name: &str) -> Result<PathBuf, ConfError> {
        self.names.check(name)?;
        Ok(self.names.path_for(name, true))
    }

    pub fn is_encrypted_path(&self, path: &Path) -> bool {
        names::is_encrypted_path(path)
    }
}
