//! Authentication: password hashing, session tokens, audit, and the
//! credential resolver that ties them to the directory and the ledger.

pub mod audit;
pub mod password;
pub mod resolver;
pub mod token;

pub use audit::{AuditSink, AuthEvent, TracingAuditSink};
pub use resolver::{
    CredentialResolver, ErrorCode, FailureReason, LoginError, LoginMode, LoginRequest,
    LoginSuccess,
};
pub use token::{
    SigningKeyError, TokenConfig, TokenError, TokenService, VerifiedToken,
    validate_signing_secret,
};
