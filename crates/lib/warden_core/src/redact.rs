//! Masking of secret-shaped substrings before text reaches a log sink.

use std::sync::LazyLock;

use regex::Regex;

/// Replacement written in place of a masked value.
pub const MASKED_VALUE: &str = "***REDACTED***";

const SECRET_KEYS: &str = r"password|passwd|pwd|pass|secret|token|jwt|api[_-]?key|auth[_-]?token";

static JSON_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r#"(?i)("(?:{SECRET_KEYS})"\s*:\s*")[^"]*(")"#))
        .expect("static regex")
});

static BEARER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bBearer\s+[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+")
        .expect("static regex")
});

static KEY_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b({SECRET_KEYS})\s*=\s*[^\s,;&]+")).expect("static regex")
});

static MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?i)({SECRET_KEYS})")).expect("static regex"));

/// Mask JSON secret fields, `key=value` secret pairs, and bearer JWTs.
pub fn mask_sensitive(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let masked = JSON_FIELD.replace_all(text, format!("${{1}}{MASKED_VALUE}${{2}}"));
    let masked = BEARER.replace_all(&masked, format!("Bearer {MASKED_VALUE}"));
    let masked = KEY_VALUE.replace_all(&masked, format!("${{1}}={MASKED_VALUE}"));
    masked.into_owned()
}

/// Whether `text` mentions a secret-looking key at all.
pub fn contains_sensitive(text: &str) -> bool {
    MARKER.is_match(text)
}
