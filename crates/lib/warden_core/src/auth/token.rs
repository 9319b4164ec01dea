//! Session token issuance and verification (HS256).

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::models::auth::TokenClaims;

/// Default session lifetime: 24 hours.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::hours(24);

/// Default minimum signing key length in bytes.
pub const DEFAULT_MIN_SECRET_LEN: usize = 32;

/// Placeholder keys shipped in sample configurations.
const WELL_KNOWN_SECRETS: &[&str] = &[
    "your-secret-key-change-this-in-production-min-256-bits",
    "your-secret-key",
    "change-me",
    "changeme",
    "secret",
    "jwt-secret",
];

/// Claim names owned by the token service.
const RESERVED_CLAIMS: &[&str] = &["sub", "iat", "exp"];

/// Token errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Malformed token")]
    Malformed,

    #[error("Token signature mismatch")]
    BadSignature,

    #[error("Token expired")]
    Expired,

    #[error("Token subject mismatch")]
    SubjectMismatch,

    #[error("Token signing failed: {0}")]
    Signing(String),
}

/// Startup rejection of the configured signing key.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SigningKeyError {
    #[error("signing key is not set")]
    Empty,

    #[error("signing key is a well-known default")]
    WellKnown,

    #[error("signing key is {len} bytes, at least {min} required")]
    TooShort { len: usize, min: usize },
}

/// Check the signing key before the service starts.
///
/// With `allow_insecure`, well-known and short keys are accepted with a
/// warning. An empty key is always rejected.
pub fn validate_signing_secret(
    secret: &SecretString,
    min_len: usize,
    allow_insecure: bool,
) -> Result<(), SigningKeyError> {
    let secret = secret.expose_secret();
    if secret.trim().is_empty() {
        error!("signing key is not set");
        return Err(SigningKeyError::Empty);
    }

    let problem = if WELL_KNOWN_SECRETS.contains(&secret) {
        Some(SigningKeyError::WellKnown)
    } else if secret.len() < min_len {
        Some(SigningKeyError::TooShort {
            len: secret.len(),
            min: min_len,
        })
    } else {
        None
    };

    match problem {
        None => {
            info!(len = secret.len(), "signing key validation passed");
            Ok(())
        }
        Some(problem) if allow_insecure => {
            warn!("==============================================================");
            warn!("INSECURE SIGNING KEY IN USE: {problem}");
            warn!("Tokens can be forged. Never run this configuration in production.");
            warn!("Generate a key with: openssl rand -base64 32");
            warn!("==============================================================");
            Ok(())
        }
        Some(problem) => {
            error!("refusing signing key: {problem}");
            Err(problem)
        }
    }
}

/// Token service settings.
#[derive(Debug, Clone, Copy)]
pub struct TokenConfig {
    pub ttl: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TOKEN_TTL,
        }
    }
}

/// Claims of a token that passed verification.
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    pub subject: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub claims: Map<String, Value>,
}

/// Key fingerprint placed in the `kid` header.
fn key_id(secret: &[u8]) -> String {
    let digest = Sha256::digest(secret);
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..16].to_string()
}

/// Issues and verifies HS256 session tokens.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    kid: String,
    config: TokenConfig,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn new(secret: &SecretString, config: TokenConfig, clock: Arc<dyn Clock>) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
            kid: key_id(bytes),
            config,
            clock,
        }
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Token lifetime in seconds.
    pub fn expires_in(&self) -> i64 {
        self.config.ttl.num_seconds()
    }

    /// Sign a token for `subject` carrying `extra` claims.
    ///
    /// `sub`, `iat` and `exp` in `extra` are ignored.
    pub fn issue(&self, subject: &str, extra: Map<String, Value>) -> Result<String, TokenError> {
        let now = self.clock.now();
        let mut extra = extra;
        for reserved in RESERVED_CLAIMS {
            extra.remove(*reserved);
        }
        let claims = TokenClaims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: (now + self.config.ttl).timestamp(),
            extra,
        };
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(self.kid.clone());
        encode(&header, &claims, &self.encoding).map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Check signature, structure, and expiry.
    pub fn verify(&self, token: &str) -> Result<VerifiedToken, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked below against the injected clock.
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;

        let data = decode::<TokenClaims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature => TokenError::BadSignature,
                _ => TokenError::Malformed,
            }
        })?;
        let claims = data.claims;

        if self.clock.now().timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }
        let issued_at = DateTime::from_timestamp(claims.iat, 0).ok_or(TokenError::Malformed)?;
        let expires_at = DateTime::from_timestamp(claims.exp, 0).ok_or(TokenError::Malformed)?;

        Ok(VerifiedToken {
            subject: claims.sub,
            issued_at,
            expires_at,
            claims: claims.extra,
        })
    }

    /// [`verify`](Self::verify) and require the subject to match.
    pub fn verify_subject(
        &self,
        token: &str,
        expected_subject: &str,
    ) -> Result<VerifiedToken, TokenError> {
        let verified = self.verify(token)?;
        if verified.subject != expected_subject {
            return Err(TokenError::SubjectMismatch);
        }
        Ok(verified)
    }
}
