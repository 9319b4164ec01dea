//! AES-256-GCM encryption for directory bind passwords at rest.
//!
//! Uses AES-256-GCM with random 12-byte nonces (prepended to ciphertext).
//! Output is base64-encoded for storage in TEXT columns.
//!
//! Key derivation: the configured secret's UTF-8 bytes, zero-padded on the
//! right when shorter than 32 bytes, or cut to the first 32 bytes when longer.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use base64::Engine;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};

use super::CodecError;

/// Nonce size for AES-256-GCM (12 bytes).
const NONCE_SIZE: usize = 12;
/// AES-256 key size (32 bytes).
pub const KEY_SIZE: usize = 32;
/// GCM tag size (16 bytes).
const TAG_SIZE: usize = 16;

/// Pad or truncate `secret` to an AES-256 key.
pub fn derive_key(secret: &str) -> [u8; KEY_SIZE] {
    let bytes = secret.as_bytes();
    let mut key = [0u8; KEY_SIZE];
    let n = bytes.len().min(KEY_SIZE);
    key[..n].copy_from_slice(&bytes[..n]);
    key
}

/// Symmetric codec holding the process-wide encryption key.
pub struct SecretCodec {
    cipher: Aes256Gcm,
}

impl SecretCodec {
    /// Build a codec from the configured encryption secret.
    pub fn new(secret: &SecretString) -> Self {
        let key = derive_key(secret.expose_secret());
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)),
        }
    }

    /// Encrypt plaintext.
    ///
    /// Returns base64-encoded `nonce || ciphertext || tag`, or the empty
    /// string for empty input.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CodecError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CodecError::EncryptionFailed)?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(base64::engine::general_purpose::STANDARD.encode(&combined))
    }

    /// Decrypt base64-encoded `nonce || ciphertext || tag`.
    ///
    /// Empty input yields the empty string. Every other failure collapses
    /// into [`CodecError::DecryptionFailed`].
    pub fn decrypt(&self, encrypted_b64: &str) -> Result<String, CodecError> {
        if encrypted_b64.is_empty() {
            return Ok(String::new());
        }

        let combined = base64::engine::general_purpose::STANDARD
            .decode(encrypted_b64)
            .map_err(|_| CodecError::DecryptionFailed)?;

        if combined.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CodecError::DecryptionFailed);
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CodecError::DecryptionFailed)?;

        String::from_utf8(plaintext).map_err(|_| CodecError::DecryptionFailed)
    }
}

impl std::fmt::Debug for SecretCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCodec").finish_non_exhaustive()
    }
}
