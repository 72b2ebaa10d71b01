use async_trait::async_trait;

use crate::error::ConfError;

/// At-rest protection for configuration bytes, bound to the tunnel name.
///
/// `unseal(seal(bytes, name), name) == bytes` must hold; unsealing under a
/// different name must fail.
#[async_trait]
pub trait Sealer: Send + Sync {
    async fn seal(&self, plaintext: &[u8], name: &str) -> Result<Vec<u8>, ConfError>;

    async fn unseal(&self, sealed: &[u8], name: &str) -> Result<Vec<u8>, ConfError>;
}

/// Name-binding sealer that only masks bytes. For tests and smoke runs.
/// This is not cryptographically secure; production code must use a real
/// cipher such as the AES-GCM sealer in the storage crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct MaskingSealer;

const MASK_BYTE: u8 = 0xA5;
const NAME_TERMINATOR: u8 = 0;

#[async_trait]
impl Sealer for MaskingSealer {
    async fn seal(&self, plaintext: &[u8], name: &str) -> Result<Vec<u8>, ConfError> {
        if name.as_bytes().contains(&NAME_TERMINATOR) {
            return Err(ConfError::encryption(name, "name contains NUL"));
        }
        let mut framed = Vec::with_capacity(name.len() + 1 + plaintext.len());
        framed.extend_from_slice(name.as_bytes());
        framed.push(NAME_TERMINATOR);
        framed.extend_from_slice(plaintext);
        Ok(mask(&framed))
    }

    async fn unseal(&self, sealed: &[u8], name: &str) -> Result<Vec<u8>, ConfError> {
        let framed = mask(sealed); // XOR twice restores original.
        let split = framed
            .iter()
            .position(|b| *b == NAME_TERMINATOR)
            .ok_or_else(|| ConfError::decryption(name, "missing name frame"))?;
        if &framed[..split] != name.as_bytes() {
            return Err(ConfError::decryption(name, "sealed under a different name"));
        }
        Ok(framed[split + 1..].to_vec())
    }
}

fn mask(input: &[u8]) -> Vec<u8> {
    input.iter().map(|b| b ^ MASK_BYTE).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trip_masks_and_unmasks() {
        let secret = b"[Interface]\nPrivateKey = abc\n";
        let sealed = MaskingSealer.seal(secret, "home").await.expect("seal");
        assert!(!sealed.windows(secret.len()).any(|w| w == secret));

        let opened = MaskingSealer.unseal(&sealed, "home").await.expect("unseal");
        assert_eq!(opened, secret);
    }

    #[tokio::test]
    async fn unseal_under_other_name_fails() {
        let sealed = MaskingSealer.seal(b"data", "home").await.expect("seal");
        let err = MaskingSealer
            .unseal(&sealed, "office")
            .await
            .expect_err("name mismatch");
        assert!(matches!(err, ConfError::DecryptionFailed { .. }));
    }
}
