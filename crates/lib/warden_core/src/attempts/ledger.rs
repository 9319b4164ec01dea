//! Sliding-window abuse control over recorded login attempts.
//!
//! Two independent counters:
//! - per IP: failures in the last `ip_window` >= `max_attempts` => blocked;
//! - per username: failures in the last `lockout_window` >= `max_failed` => locked.
//!
//! Blocked and locked requests are themselves recorded as failures, so
//! continued hammering keeps the window full.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{AttemptStore, LoginAttempt};
use crate::clock::Clock;
use crate::store::StoreError;

/// Default sweep period for [`spawn_sweeper`].
pub const DEFAULT_SWEEP_INTERVAL: StdDuration = StdDuration::from_secs(60 * 60);

/// Thresholds and windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerPolicy {
    pub max_attempts: u32,
    pub ip_window: Duration,
    pub max_failed: u32,
    pub lockout_window: Duration,
    pub retention: Duration,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            ip_window: Duration::minutes(15),
            max_failed: 10,
            lockout_window: Duration::minutes(30),
            retention: Duration::hours(24),
        }
    }
}

impl LedgerPolicy {
    /// Retention actually applied: never shorter than either window.
    pub fn effective_retention(&self) -> Duration {
        self.retention.max(self.ip_window).max(self.lockout_window)
    }
}

/// Records attempts and answers rate/lockout queries.
#[derive(Clone)]
pub struct AttemptLedger {
    store: Arc<dyn AttemptStore>,
    clock: Arc<dyn Clock>,
    policy: LedgerPolicy,
}

impl AttemptLedger {
    pub fn new(store: Arc<dyn AttemptStore>, clock: Arc<dyn Clock>, policy: LedgerPolicy) -> Self {
        if policy.retention < policy.ip_window.max(policy.lockout_window) {
            warn!(
                retention_minutes = policy.retention.num_minutes(),
                "attempt retention shorter than a lockout window, extending it"
            );
        }
        Self {
            store,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &LedgerPolicy {
        &self.policy
    }

    /// Append an attempt. Returns once the row is visible to later checks.
    pub async fn record(
        &self,
        username: &str,
        ip_address: &str,
        success: bool,
    ) -> Result<(), StoreError> {
        let attempt = LoginAttempt {
            username: username.to_string(),
            ip_address: ip_address.to_string(),
            attempted_at: self.clock.now(),
            success,
        };
        self.store.insert(&attempt).await?;
        debug!(username, ip = ip_address, success, "recorded login attempt");
        Ok(())
    }

    pub async fn is_ip_blocked(&self, ip_address: &str) -> Result<bool, StoreError> {
        let since = self.clock.now() - self.policy.ip_window;
        let failed = self.store.count_failed_by_ip_since(ip_address, since).await?;
        let blocked = failed >= u64::from(self.policy.max_attempts);
        debug!(
            ip = ip_address,
            failed,
            max_attempts = self.policy.max_attempts,
            blocked,
            "ip rate limit check"
        );
        Ok(blocked)
    }

    pub async fn is_account_locked(&self, username: &str) -> Result<bool, StoreError> {
        let failed = self.failed_for_username(username).await?;
        let locked = failed >= u64::from(self.policy.max_failed);
        debug!(
            username,
            failed,
            max_failed = self.policy.max_failed,
            locked,
            "account lockout check"
        );
        Ok(locked)
    }

    /// `max(0, max_failed - failures in the lockout window)`. Hinting only.
    pub async fn remaining_attempts(&self, username: &str) -> Result<u32, StoreError> {
        let failed = self.failed_for_username(username).await?;
        let max = u64::from(self.policy.max_failed);
        Ok(u32::try_from(max.saturating_sub(failed)).unwrap_or(0))
    }

    /// Delete attempts older than the effective retention horizon.
    pub async fn sweep(&self) -> Result<u64, StoreError> {
        let cutoff = self.clock.now() - self.policy.effective_retention();
        let removed = self.store.delete_before(cutoff).await?;
        if removed > 0 {
            info!(removed, %cutoff, "swept expired login attempts");
        }
        Ok(removed)
    }

    async fn failed_for_username(&self, username: &str) -> Result<u64, StoreError> {
        let since = self.clock.now() - self.policy.lockout_window;
        self.store
            .count_failed_by_username_since(username, since)
            .await
    }
}

/// Run [`AttemptLedger::sweep`] every `interval` until `cancel` fires.
pub fn spawn_sweeper(
    ledger: AttemptLedger,
    interval: StdDuration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("attempt sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = ledger.sweep().await {
                        warn!("attempt sweep failed: {e}");
                    }
                }
            }
        }
    })
}
