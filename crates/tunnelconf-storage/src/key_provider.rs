use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use tracing::debug;

/// Symmetric key protecting sealed tunnel configurations.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    /// Identifier for logging and rotation (never log key bytes).
    pub id: String,
    /// 256-bit AES key.
    pub bytes: [u8; 32],
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("keyring error: {0}")]
    Keyring(String),
    #[error("stored key is malformed: {0}")]
    Decode(String),
    #[error("key cache unavailable: {0}")]
    Cache(String),
}

/// Supplies the sealing key (OS keyring in production, memory in tests).
#[async_trait]
pub trait KeyProvider: Send + Sync {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError>;
}

/// Key held in the OS keyring under `service`/`account`, generated on first use.
///
/// The key is cached after the first lookup so that sealing every record does
/// not go back to the keyring.
pub struct KeyringProvider {
    service: String,
    account: String,
    cached: Mutex<Option<KeyMaterial>>,
}

impl KeyringProvider {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
            cached: Mutex::new(None),
        }
    }

    fn fetch(&self) -> Result<KeyMaterial, KeyError> {
        let entry = keyring::Entry::new(&self.service, &self.account)
            .map_err(|e| KeyError::Keyring(e.to_string()))?;
        match entry.get_password() {
            Ok(secret) => decode_key(&self.account, &secret),
            Err(keyring::Error::NoEntry) => {
                debug!(service = %self.service, "generating tunnel configuration key");
                let material = generate_key(&self.account);
                entry
                    .set_password(&encode_key(&material))
                    .map_err(|e| KeyError::Keyring(e.to_string()))?;
                Ok(material)
            }
            Err(err) => Err(KeyError::Keyring(err.to_string())),
        }
    }
}

#[async_trait]
impl KeyProvider for KeyringProvider {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError> {
        let mut cached = self
            .cached
            .lock()
            .map_err(|err| KeyError::Cache(format!("lock poisoned: {err}")))?;
        if let Some(existing) = cached.as_ref() {
            return Ok(existing.clone());
        }
        // Keyring calls are synchronous; they are short and happen once per provider.
        let material = self.fetch()?;
        *cached = Some(material.clone());
        Ok(material)
    }
}

/// Process-local key for tests and ephemeral stores. Clones share the key.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKeyProvider {
    inner: Arc<Mutex<Option<KeyMaterial>>>,
}

#[async_trait]
impl KeyProvider for InMemoryKeyProvider {
    async fn get_or_create(&self) -> Result<KeyMaterial, KeyError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|err| KeyError::Cache(format!("lock poisoned: {err}")))?;
        Ok(guard.get_or_insert_with(|| generate_key("memory")).clone())
    }
}

fn generate_key(id: &str) -> KeyMaterial {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    KeyMaterial {
        id: id.to_string(),
        bytes,
    }
}

fn encode_key(material: &KeyMaterial) -> String {
    general_purpose::STANDARD.encode(material.bytes)
}

fn decode_key(id: &str, secret: &str) -> Result<KeyMaterial, KeyError> {
    let bytes = general_purpose::STANDARD
        .decode(secret.trim())
        .map_err(|e| KeyError::Decode(e.to_string()))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|raw: Vec<u8>| KeyError::Decode(format!("expected 32 bytes, got {}", raw.len())))?;
    Ok(KeyMaterial {
        id: id.to_string(),
        bytes,
    })
}
