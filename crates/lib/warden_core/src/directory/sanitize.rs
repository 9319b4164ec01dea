//! Username sanitization and filter escaping for directory queries.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

use super::DirectoryError;

/// Maximum accepted username length.
pub const MAX_USERNAME_LEN: usize = 100;

static VALID_USERNAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9._-]{1,100}$").expect("static regex"));

/// Characters with meaning inside an LDAP search filter.
const FILTER_METACHARS: [char; 5] = ['*', '(', ')', '\\', '\0'];

/// Validate and normalize a submitted username.
///
/// Leading/trailing whitespace is trimmed and the result is lowercased:
/// directory `uid` matching ignores case, so every variant maps to one
/// ledger key and one identity. Empty names, names containing filter
/// metacharacters, and names outside `[a-zA-Z0-9._-]{1,100}` are rejected.
pub fn sanitize_username(username: &str) -> Result<String, DirectoryError> {
    let trimmed = username.trim();
    if trimmed.is_empty() {
        return Err(DirectoryError::InvalidUsername("username is empty".into()));
    }
    if trimmed.contains(FILTER_METACHARS) {
        return Err(DirectoryError::InvalidUsername(
            "username contains invalid characters".into(),
        ));
    }
    if !VALID_USERNAME.is_match(trimmed) {
        return Err(DirectoryError::InvalidUsername(
            "only letters, digits, '.', '_' and '-' are allowed (max 100)".into(),
        ));
    }
    Ok(trimmed.to_ascii_lowercase())
}

/// RFC 4515 escaping of a filter assertion value.
pub fn escape_filter_value(value: &str) -> Cow<'_, str> {
    ldap3::ldap_escape(value)
}

/// Substitute the escaped username into a `{0}` filter template.
///
/// The result must be a single parenthesized filter.
pub fn build_user_filter(template: &str, username: &str) -> Result<String, DirectoryError> {
    if !template.contains("{0}") {
        return Err(DirectoryError::InvalidFilter(
            "user search filter has no {0} placeholder".into(),
        ));
    }
    let filter = template.replace("{0}", &escape_filter_value(username));
    if !(filter.starts_with('(') && filter.ends_with(')')) {
        return Err(DirectoryError::InvalidFilter(
            "user search filter must be parenthesized".into(),
        ));
    }
    Ok(filter)
}
