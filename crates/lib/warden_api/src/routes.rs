//! Route paths.

pub const GET_HEALTH: &str = "/health";
pub const POST_AUTH_LOGIN: &str = "/auth/login";
pub const GET_AUTH_ME: &str = "/auth/me";
pub const POST_AUTH_REGISTER: &str = "/auth/register";
pub const POST_AUTH_PASSWORD: &str = "/auth/password";
pub const AUTH_DIRECTORY_SETTINGS: &str = "/auth/directory-settings";
pub const POST_AUTH_DIRECTORY_SETTINGS_TEST: &str = "/auth/directory-settings/test";
pub const POST_AUTH_DIRECTORY_SETTINGS_TEST_SAVED: &str = "/auth/directory-settings/test/saved";
pub const POST_AUTH_DIRECTORY_SEARCH: &str = "/auth/directory/search";
pub const POST_AUTH_DIRECTORY_IMPORT: &str = "/auth/directory/import";
