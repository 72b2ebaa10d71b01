use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use tunnelconf_core::{ConfError, Sealer};

use crate::key_provider::{KeyMaterial, KeyProvider};

const ENVELOPE_VERSION: u8 = 1;

/// AES-256-GCM sealer. The tunnel name is bound as associated data, so a
/// sealed file renamed on disk no longer opens under its new name.
pub struct AesGcmSealer<P: KeyProvider> {
    key_provider: P,
}

impl<P: KeyProvider> AesGcmSealer<P> {
    pub fn new(key_provider: P) -> Self {
        Self { key_provider }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    v: u8,
    nonce: String,
    ciphertext: String,
}

#[async_trait]
impl<P: KeyProvider> Sealer for AesGcmSealer<P> {
    #[instrument(skip_all, fields(name = %name))]
    async fn seal(&self, plaintext: &[u8], name: &str) -> Result<Vec<u8>, ConfError> {
        let key_material = self
            .key_provider
            .get_or_create()
            .await
            .map_err(|e| ConfError::encryption(name, format!("key provider: {e}")))?;
        let cipher = build_cipher(&key_material).map_err(|e| ConfError::encryption(name, e))?;

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext,
                    aad: name.as_bytes(),
                },
            )
            .map_err(|e| ConfError::encryption(name, format!("encrypt failed: {e}")))?;

        let envelope = Envelope {
            v: ENVELOPE_VERSION,
            nonce: URL_SAFE_NO_PAD.encode(nonce.as_slice()),
            ciphertext: URL_SAFE_NO_PAD.encode(ciphertext),
        };
        serde_json::to_vec(&envelope).map_err(|e| ConfError::encryption(name, e))
    }

    #[instrument(skip_all, fields(name = %name))]
    async fn unseal(&self, sealed: &[u8], name: &str) -> Result<Vec<u8>, ConfError> {
        let envelope: Envelope = serde_json::from_slice(sealed)
            .map_err(|e| ConfError::decryption(name, format!("malformed envelope: {e}")))?;
        if envelope.v != ENVELOPE_VERSION {
            return Err(ConfError::decryption(
                name,
                format!("unsupported envelope version {}", envelope.v),
            ));
        }

        let nonce_bytes = URL_SAFE_NO_PAD
            .decode(envelope.nonce)
            .map_err(|e| ConfError::decryption(name, format!("nonce decode failed: {e}")))?;
        if nonce_bytes.len() != 12 {
            return Err(ConfError::decryption(name, "nonce has wrong length"));
        }
        let ciphertext = URL_SAFE_NO_PAD
            .decode(envelope.ciphertext)
            .map_err(|e| ConfError::decryption(name, format!("ciphertext decode failed: {e}")))?;

        let key_material = self
            .key_provider
            .get_or_create()
            .await
            .map_err(|e| ConfError::decryption(name, format!("key provider: {e}")))?;
        let cipher = build_cipher(&key_material).map_err(|e| ConfError::decryption(name, e))?;

        cipher
            .decrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: &ciphertext,
                    aad: name.as_bytes(),
                },
            )
            .map_err(|e| ConfError::decryption(name, format!("decrypt failed: {e}")))
    }
}

fn build_cipher(material: &KeyMaterial) -> Result<Aes256Gcm, String> {
    Aes256Gcm::new_from_slice(&material.bytes).map_err(|e| format!("cipher init failed: {e}"))
}
