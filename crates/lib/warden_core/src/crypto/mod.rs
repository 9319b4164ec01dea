//! Symmetric encryption of credentials stored at rest.

pub mod secrets;

pub use secrets::SecretCodec;

use thiserror::Error;

/// Secret codec errors. Messages never carry plaintext or key material.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed")]
    DecryptionFailed,
}
