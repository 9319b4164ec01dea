//! Authentication audit trail.
//!
//! Sinks are fire-and-forget: a sink that cannot record an event logs the
//! problem itself and the login proceeds.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

/// Which credential check accepted a login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Directory,
    Local,
}

/// Why a login was refused. Never exposed to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    UserNotFound,
    Inactive,
    NoLocalCredential,
    InvalidPassword,
    DirectoryRejected,
    DirectoryUnavailable,
}

impl FailureReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureReason::UserNotFound => "user_not_found",
            FailureReason::Inactive => "inactive",
            FailureReason::NoLocalCredential => "no_local_credential",
            FailureReason::InvalidPassword => "invalid_password",
            FailureReason::DirectoryRejected => "directory_rejected",
            FailureReason::DirectoryUnavailable => "directory_unavailable",
        }
    }
}

/// One security-relevant authentication event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuthEvent {
    LoginSucceeded {
        username: String,
        ip: String,
        method: AuthMethod,
    },
    LoginFailed {
        username: String,
        ip: String,
        reason: FailureReason,
    },
    RateLimited {
        username: String,
        ip: String,
    },
    AccountLocked {
        username: String,
        ip: String,
    },
}

/// Receives authentication events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &AuthEvent);

    /// Sink identifier for logging.
    fn name(&self) -> &str;
}

/// Writes events as structured `tracing` records under the `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: &AuthEvent) {
        match event {
            AuthEvent::LoginSucceeded {
                username,
                ip,
                method,
            } => info!(target: "audit", %username, %ip, ?method, "login succeeded"),
            AuthEvent::LoginFailed {
                username,
                ip,
                reason,
            } => warn!(target: "audit", %username, %ip, reason = reason.as_str(), "login failed"),
            AuthEvent::RateLimited { username, ip } => {
                warn!(target: "audit", %username, %ip, "login rate limited")
            }
            AuthEvent::AccountLocked { username, ip } => {
                warn!(target: "audit", %username, %ip, "login refused, account locked")
            }
        }
    }

    fn name(&self) -> &str {
        "TracingAuditSink"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_tag() {
        let event = AuthEvent::LoginFailed {
            username: "ada".into(),
            ip: "10.0.0.1".into(),
            reason: FailureReason::NoLocalCredential,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "login_failed");
        assert_eq!(json["reason"], FailureReason::NoLocalCredential.as_str());
    }

    #[tokio::test]
    async fn tracing_sink_never_fails() {
        let sink = TracingAuditSink;
        sink.record(&AuthEvent::RateLimited {
            username: "ada".into(),
            ip: "10.0.0.1".into(),
        })
        .await;
        assert_eq!(sink.name(), "TracingAuditSink");
    }
}
