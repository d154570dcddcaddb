use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::error::{Error, Result};

const NONCE_SIZE: usize = 12;
const FORMAT_PREFIX: &str = "v1:";

/// Reversible encryption for engine login passwords (AES-256-GCM with a
/// server-held key). Stored values look like `v1:<base64(nonce || ciphertext)>`.
pub struct CredentialCipher {
    cipher: Aes256Gcm,
}

impl CredentialCipher {
    pub fn new(key: &[u8]) -> Result<Self> {
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| {
            Error::Config("credential encryption key must be 32 bytes".to_string())
        })?;
        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| Error::Internal("credential encryption failed".to_string()))?;

        let mut payload = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        payload.extend_from_slice(&nonce);
        payload.extend_from_slice(&ciphertext);
        Ok(format!("{FORMAT_PREFIX}{}", STANDARD.encode(payload)))
    }

    pub fn decrypt(&self, stored: &str) -> Result<String> {
        let encoded = stored
            .strip_prefix(FORMAT_PREFIX)
            .ok_or_else(|| Error::Internal("unknown credential encoding".to_string()))?;
        let payload = STANDARD
            .decode(encoded)
            .map_err(|_| Error::Internal("corrupt credential payload".to_string()))?;
        if payload.len() <= NONCE_SIZE {
            return Err(Error::Internal("corrupt credential payload".to_string()));
        }

        let (nonce, ciphertext) = payload.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| Error::Internal("credential decryption failed".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|_| Error::Internal("credential is not valid UTF-8".to_string()))
    }
}
