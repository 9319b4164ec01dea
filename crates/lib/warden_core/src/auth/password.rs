//! Password hashing via bcrypt.

use thiserror::Error;

/// bcrypt cost factor.
pub const BCRYPT_COST: u32 = 10;

/// Hashing failures. A wrong password is `Ok(false)`, not an error.
#[derive(Debug, Error)]
#[error("bcrypt: {0}")]
pub struct PasswordError(#[from] bcrypt::BcryptError);

/// Hash a password with bcrypt (cost 10).
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    Ok(bcrypt::hash(password, BCRYPT_COST)?)
}

/// Verify a password against a bcrypt hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    Ok(bcrypt::verify(password, hash)?)
}
