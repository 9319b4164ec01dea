//! API server configuration.

use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use warden_core::attempts::LedgerPolicy;
use warden_core::auth::token::{DEFAULT_MIN_SECRET_LEN, DEFAULT_TOKEN_TTL};
use warden_core::directory::client::DEFAULT_DIRECTORY_TIMEOUT;
use warden_core::identity::SyncPolicy;

/// Upper bound for attempt thresholds.
const MAX_THRESHOLD: u32 = 10_000;
/// Upper bound for the rate-limit and lockout windows (one week).
const MAX_WINDOW_MINUTES: u32 = 7 * 24 * 60;
/// Upper bound for attempt retention (one year).
const MAX_RETENTION_HOURS: u32 = 365 * 24;
/// Upper bound for the token lifetime (one year).
const MAX_TOKEN_TTL_SECS: u32 = 365 * 24 * 60 * 60;

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var}: invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Configuration for the API server.
#[derive(Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub pg_connection_url: String,
    /// Session token signing key.
    pub jwt_secret: SecretString,
    pub jwt_min_secret_len: usize,
    /// Accept weak signing keys with a warning. Development only.
    pub allow_insecure_secret: bool,
    pub token_ttl: chrono::Duration,
    pub directory_timeout: Duration,
    pub ledger: LedgerPolicy,
    /// Key for the directory bind password at rest.
    pub encryption_key: SecretString,
    /// Honor `X-Forwarded-For` / `X-Real-IP` when resolving the client IP.
    pub trust_proxy_headers: bool,
    pub sync: SyncPolicy,
    /// Local admin created at startup when absent, with its password.
    pub bootstrap_admin: Option<(String, SecretString)>,
}

fn parse<T>(value: Option<String>, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(v) => v.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value: v.clone(),
            reason: e.to_string(),
        }),
    }
}

/// [`parse`] plus a range check.
fn parse_in<T>(
    value: Option<String>,
    var: &'static str,
    default: T,
    range: RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    let parsed = parse(value, var, default)?;
    if !range.contains(&parsed) {
        return Err(ConfigError::Invalid {
            var,
            value: parsed.to_string(),
            reason: format!("must be between {} and {}", range.start(), range.end()),
        });
    }
    Ok(parsed)
}

fn parse_bool(value: Option<String>, var: &'static str, default: bool) -> Result<bool, ConfigError> {
    match value.as_deref().map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                var,
                value: v,
                reason: "expected true or false".into(),
            }),
        },
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl ApiConfig {
    /// Reads configuration from environment variables.
    ///
    /// | Variable                            | Default                              |
    /// |-------------------------------------|--------------------------------------|
    /// | `BIND_ADDR`                         | `127.0.0.1:3100`                     |
    /// | `DATABASE_URL`                      | `postgres://localhost:5432/warden`   |
    /// | `WARDEN_JWT_SECRET` / `JWT_SECRET`  | required                             |
    /// | `WARDEN_JWT_MIN_SECRET_LEN`         | `32`                                 |
    /// | `WARDEN_ALLOW_INSECURE_SECRET`      | `false`                              |
    /// | `WARDEN_TOKEN_TTL_SECS`             | `86400`                              |
    /// | `WARDEN_DIRECTORY_TIMEOUT_MS`       | `5000`                               |
    /// | `WARDEN_RATE_LIMIT_MAX_ATTEMPTS`    | `5`                                  |
    /// | `WARDEN_RATE_LIMIT_WINDOW_MINUTES`  | `15`                                 |
    /// | `WARDEN_LOCKOUT_MAX_FAILED`         | `10`                                 |
    /// | `WARDEN_LOCKOUT_WINDOW_MINUTES`     | `30`                                 |
    /// | `WARDEN_ATTEMPT_RETENTION_HOURS`    | `24`                                 |
    /// | `WARDEN_ENCRYPTION_KEY`             | required                             |
    /// | `WARDEN_TRUST_PROXY_HEADERS`        | `false`                              |
    /// | `WARDEN_DEFAULT_ROLE`               | `developer`                          |
    /// | `WARDEN_PLACEHOLDER_EMAIL_DOMAIN`   | `example.com`                        |
    /// | `WARDEN_BOOTSTRAP_ADMIN`            | unset                                |
    /// | `WARDEN_BOOTSTRAP_ADMIN_PASSWORD`   | required with `WARDEN_BOOTSTRAP_ADMIN` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = LedgerPolicy::default();
        let sync_defaults = SyncPolicy::default();

        let jwt_secret = non_empty(lookup("WARDEN_JWT_SECRET"))
            .or_else(|| lookup("JWT_SECRET"))
            .ok_or(ConfigError::Missing("WARDEN_JWT_SECRET"))?;
        let encryption_key = non_empty(lookup("WARDEN_ENCRYPTION_KEY"))
            .ok_or(ConfigError::Missing("WARDEN_ENCRYPTION_KEY"))?;

        let ttl_secs: u32 = parse_in(
            lookup("WARDEN_TOKEN_TTL_SECS"),
            "WARDEN_TOKEN_TTL_SECS",
            DEFAULT_TOKEN_TTL.num_seconds() as u32,
            1..=MAX_TOKEN_TTL_SECS,
        )?;
        let timeout_ms: u64 = parse(
            lookup("WARDEN_DIRECTORY_TIMEOUT_MS"),
            "WARDEN_DIRECTORY_TIMEOUT_MS",
            DEFAULT_DIRECTORY_TIMEOUT.as_millis() as u64,
        )?;

        let ledger = LedgerPolicy {
            max_attempts: parse_in(
                lookup("WARDEN_RATE_LIMIT_MAX_ATTEMPTS"),
                "WARDEN_RATE_LIMIT_MAX_ATTEMPTS",
                defaults.max_attempts,
                1..=MAX_THRESHOLD,
            )?,
            ip_window: chrono::Duration::minutes(i64::from(parse_in(
                lookup("WARDEN_RATE_LIMIT_WINDOW_MINUTES"),
                "WARDEN_RATE_LIMIT_WINDOW_MINUTES",
                defaults.ip_window.num_minutes() as u32,
                1..=MAX_WINDOW_MINUTES,
            )?)),
            max_failed: parse_in(
                lookup("WARDEN_LOCKOUT_MAX_FAILED"),
                "WARDEN_LOCKOUT_MAX_FAILED",
                defaults.max_failed,
                1..=MAX_THRESHOLD,
            )?,
            lockout_window: chrono::Duration::minutes(i64::from(parse_in(
                lookup("WARDEN_LOCKOUT_WINDOW_MINUTES"),
                "WARDEN_LOCKOUT_WINDOW_MINUTES",
                defaults.lockout_window.num_minutes() as u32,
                1..=MAX_WINDOW_MINUTES,
            )?)),
            retention: chrono::Duration::hours(i64::from(parse_in(
                lookup("WARDEN_ATTEMPT_RETENTION_HOURS"),
                "WARDEN_ATTEMPT_RETENTION_HOURS",
                defaults.retention.num_hours() as u32,
                1..=MAX_RETENTION_HOURS,
            )?)),
        };

        let bootstrap_admin = match non_empty(lookup("WARDEN_BOOTSTRAP_ADMIN")) {
            None => None,
            Some(username) => {
                let password = non_empty(lookup("WARDEN_BOOTSTRAP_ADMIN_PASSWORD"))
                    .ok_or(ConfigError::Missing("WARDEN_BOOTSTRAP_ADMIN_PASSWORD"))?;
                Some((username.trim().to_string(), SecretString::from(password)))
            }
        };

        Ok(Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "127.0.0.1:3100".into()),
            pg_connection_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| "postgres://localhost:5432/warden".into()),
            jwt_secret: SecretString::from(jwt_secret),
            jwt_min_secret_len: parse(
                lookup("WARDEN_JWT_MIN_SECRET_LEN"),
                "WARDEN_JWT_MIN_SECRET_LEN",
                DEFAULT_MIN_SECRET_LEN,
            )?,
            allow_insecure_secret: parse_bool(
                lookup("WARDEN_ALLOW_INSECURE_SECRET"),
                "WARDEN_ALLOW_INSECURE_SECRET",
                false,
            )?,
            token_ttl: chrono::Duration::seconds(i64::from(ttl_secs)),
            directory_timeout: Duration::from_millis(timeout_ms),
            ledger,
            encryption_key: SecretString::from(encryption_key),
            trust_proxy_headers: parse_bool(
                lookup("WARDEN_TRUST_PROXY_HEADERS"),
                "WARDEN_TRUST_PROXY_HEADERS",
                false,
            )?,
            sync: SyncPolicy {
                default_role: non_empty(lookup("WARDEN_DEFAULT_ROLE"))
                    .unwrap_or(sync_defaults.default_role),
                placeholder_email_domain: non_empty(lookup("WARDEN_PLACEHOLDER_EMAIL_DOMAIN"))
                    .unwrap_or(sync_defaults.placeholder_email_domain),
            },
            bootstrap_admin,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<ApiConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ApiConfig::from_lookup(|k| map.get(k).cloned())
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("WARDEN_JWT_SECRET", "a-signing-key-that-is-long-enough!!"),
        ("WARDEN_ENCRYPTION_KEY", "enc-key"),
    ];

    #[test]
    fn defaults_apply() {
        let cfg = config(&REQUIRED).unwrap();
        assert_eq!(cfg.bind_addr, "127.0.0.1:3100");
        assert_eq!(cfg.token_ttl, chrono::Duration::hours(24));
        assert_eq!(cfg.directory_timeout, Duration::from_secs(5));
        assert_eq!(cfg.ledger, LedgerPolicy::default());
        assert_eq!(cfg.sync, SyncPolicy::default());
        assert!(!cfg.trust_proxy_headers);
        assert!(!cfg.allow_insecure_secret);
    }

    #[test]
    fn secrets_are_required() {
        assert_eq!(
            config(&[("WARDEN_ENCRYPTION_KEY", "k")]).unwrap_err(),
            ConfigError::Missing("WARDEN_JWT_SECRET")
        );
        assert_eq!(
            config(&[("WARDEN_JWT_SECRET", "k")]).unwrap_err(),
            ConfigError::Missing("WARDEN_ENCRYPTION_KEY")
        );
    }

    #[test]
    fn jwt_secret_alias() {
        let cfg = config(&[("JWT_SECRET", "legacy"), ("WARDEN_ENCRYPTION_KEY", "k")]).unwrap();
        assert_eq!(cfg.jwt_secret.expose_secret(), "legacy");
    }

    #[test]
    fn overrides_are_parsed() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("WARDEN_RATE_LIMIT_MAX_ATTEMPTS", "3"),
            ("WARDEN_LOCKOUT_WINDOW_MINUTES", "60"),
            ("WARDEN_TRUST_PROXY_HEADERS", "TRUE"),
            ("WARDEN_DEFAULT_ROLE", "viewer"),
        ]);
        let cfg = config(&vars).unwrap();
        assert_eq!(cfg.ledger.max_attempts, 3);
        assert_eq!(cfg.ledger.lockout_window, chrono::Duration::minutes(60));
        assert!(cfg.trust_proxy_headers);
        assert_eq!(cfg.sync.default_role, "viewer");
    }

    #[test]
    fn bootstrap_admin_needs_password() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("WARDEN_BOOTSTRAP_ADMIN", "root"));
        assert_eq!(
            config(&vars).unwrap_err(),
            ConfigError::Missing("WARDEN_BOOTSTRAP_ADMIN_PASSWORD")
        );

        vars.push(("WARDEN_BOOTSTRAP_ADMIN_PASSWORD", "root-password"));
        let (user, password) = config(&vars).unwrap().bootstrap_admin.unwrap();
        assert_eq!(user, "root");
        assert_eq!(password.expose_secret(), "root-password");
    }

    #[test]
    fn malformed_values_are_errors() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("WARDEN_LOCKOUT_MAX_FAILED", "ten"));
        assert!(matches!(
            config(&vars),
            Err(ConfigError::Invalid {
                var: "WARDEN_LOCKOUT_MAX_FAILED",
                ..
            })
        ));

        let mut vars = REQUIRED.to_vec();
        vars.push(("WARDEN_ALLOW_INSECURE_SECRET", "maybe"));
        assert!(config(&vars).is_err());

        let mut vars = REQUIRED.to_vec();
        vars.push(("WARDEN_TOKEN_TTL_SECS", "0"));
        assert!(config(&vars).is_err());
    }

    fn invalid_var(vars: &[(&str, &str)]) -> Option<&'static str> {
        let mut all = REQUIRED.to_vec();
        all.extend_from_slice(vars);
        match config(&all) {
            Err(ConfigError::Invalid { var, .. }) => Some(var),
            _ => None,
        }
    }

    #[test]
    fn windows_must_be_positive() {
        for var in [
            "WARDEN_RATE_LIMIT_WINDOW_MINUTES",
            "WARDEN_LOCKOUT_WINDOW_MINUTES",
            "WARDEN_ATTEMPT_RETENTION_HOURS",
        ] {
            assert_eq!(invalid_var(&[(var, "-30")]), Some(var), "{var} negative");
            assert_eq!(invalid_var(&[(var, "0")]), Some(var), "{var} zero");
        }
    }

    #[test]
    fn oversized_values_are_errors_not_panics() {
        let huge = i64::MAX.to_string();
        for var in [
            "WARDEN_RATE_LIMIT_WINDOW_MINUTES",
            "WARDEN_LOCKOUT_WINDOW_MINUTES",
            "WARDEN_ATTEMPT_RETENTION_HOURS",
            "WARDEN_TOKEN_TTL_SECS",
        ] {
            assert_eq!(invalid_var(&[(var, huge.as_str())]), Some(var), "{var} i64::MAX");
        }
        assert_eq!(
            invalid_var(&[("WARDEN_LOCKOUT_WINDOW_MINUTES", "10081")]),
            Some("WARDEN_LOCKOUT_WINDOW_MINUTES")
        );
        assert_eq!(
            invalid_var(&[("WARDEN_ATTEMPT_RETENTION_HOURS", "8761")]),
            Some("WARDEN_ATTEMPT_RETENTION_HOURS")
        );
    }

    #[test]
    fn thresholds_must_be_positive() {
        assert_eq!(
            invalid_var(&[("WARDEN_RATE_LIMIT_MAX_ATTEMPTS", "0")]),
            Some("WARDEN_RATE_LIMIT_MAX_ATTEMPTS")
        );
        assert_eq!(
            invalid_var(&[("WARDEN_LOCKOUT_MAX_FAILED", "0")]),
            Some("WARDEN_LOCKOUT_MAX_FAILED")
        );
        assert_eq!(
            invalid_var(&[("WARDEN_LOCKOUT_MAX_FAILED", "-1")]),
            Some("WARDEN_LOCKOUT_MAX_FAILED")
        );
    }

    #[test]
    fn bounds_are_inclusive() {
        let cfg = config(&[
            REQUIRED[0],
            REQUIRED[1],
            ("WARDEN_LOCKOUT_WINDOW_MINUTES", "10080"),
            ("WARDEN_RATE_LIMIT_WINDOW_MINUTES", "1"),
            ("WARDEN_ATTEMPT_RETENTION_HOURS", "1"),
        ])
        .unwrap();
        assert_eq!(cfg.ledger.lockout_window, chrono::Duration::weeks(1));
        assert_eq!(cfg.ledger.ip_window, chrono::Duration::minutes(1));
        assert_eq!(cfg.ledger.retention, chrono::Duration::hours(1));
    }
}
