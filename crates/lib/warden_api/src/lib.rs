//! # warden_api
//!
//! HTTP API library for Warden.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use warden_core::attempts::{AttemptLedger, AttemptStore};
use warden_core::auth::{AuditSink, CredentialResolver, TokenConfig, TokenService};
use warden_core::clock::Clock;
use warden_core::crypto::SecretCodec;
use warden_core::directory::admin::DirectoryAdmin;
use warden_core::directory::settings::DirectorySettingsService;
use warden_core::directory::{Directory, DirectorySettingsStore};
use warden_core::identity::{IdentityStore, IdentitySynchronizer, LocalAccounts};

use crate::config::ApiConfig;
use crate::handlers::{auth, directory, health};

/// Storage backends behind the API.
#[derive(Clone)]
pub struct Stores {
    pub identities: Arc<dyn IdentityStore>,
    pub attempts: Arc<dyn AttemptStore>,
    pub directory_settings: Arc<dyn DirectorySettingsStore>,
}

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// API configuration.
    pub config: Arc<ApiConfig>,
    pub ledger: AttemptLedger,
    pub resolver: Arc<CredentialResolver>,
    pub tokens: Arc<TokenService>,
    pub identities: Arc<dyn IdentityStore>,
    pub accounts: Arc<LocalAccounts>,
    pub directory_settings: Arc<DirectorySettingsService>,
    pub directory_admin: Arc<DirectoryAdmin>,
}

impl AppState {
    /// Wire the services over the given stores and directory client.
    pub fn new(
        config: ApiConfig,
        stores: Stores,
        directory: Arc<dyn Directory>,
        codec: Arc<SecretCodec>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ledger = AttemptLedger::new(stores.attempts.clone(), clock.clone(), config.ledger);
        let tokens = Arc::new(TokenService::new(
            &config.jwt_secret,
            TokenConfig {
                ttl: config.token_ttl,
            },
            clock.clone(),
        ));
        let synchronizer = Arc::new(IdentitySynchronizer::new(
            stores.identities.clone(),
            clock.clone(),
            config.sync.clone(),
        ));
        let resolver = Arc::new(CredentialResolver::new(
            ledger.clone(),
            stores.identities.clone(),
            synchronizer.clone(),
            directory.clone(),
            stores.directory_settings.clone(),
            tokens.clone(),
            audit,
        ));
        let accounts = Arc::new(LocalAccounts::new(stores.identities.clone(), clock.clone()));
        let directory_settings = Arc::new(DirectorySettingsService::new(
            stores.directory_settings,
            codec,
            clock,
        ));
        let directory_admin = Arc::new(DirectoryAdmin::new(
            directory,
            directory_settings.clone(),
            synchronizer,
        ));

        Self {
            config: Arc::new(config),
            ledger,
            resolver,
            tokens,
            identities: stores.identities,
            accounts,
            directory_settings,
            directory_admin,
        }
    }
}

/// Run embedded database migrations.
///
/// Delegates to `warden_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    warden_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route(routes::GET_HEALTH, get(health::health_handler))
        .route(routes::POST_AUTH_LOGIN, post(auth::login_handler));

    // Protected routes (require auth)
    let protected = Router::new()
        .route(routes::GET_AUTH_ME, get(auth::me_handler))
        .route(routes::POST_AUTH_REGISTER, post(auth::register_handler))
        .route(routes::POST_AUTH_PASSWORD, post(auth::change_password_handler))
        .route(
            routes::AUTH_DIRECTORY_SETTINGS,
            get(directory::get_settings_handler).put(directory::update_settings_handler),
        )
        .route(
            routes::POST_AUTH_DIRECTORY_SETTINGS_TEST,
            post(directory::test_settings_handler),
        )
        .route(
            routes::POST_AUTH_DIRECTORY_SETTINGS_TEST_SAVED,
            post(directory::test_saved_settings_handler),
        )
        .route(routes::POST_AUTH_DIRECTORY_SEARCH, post(directory::search_handler))
        .route(routes::POST_AUTH_DIRECTORY_IMPORT, post(directory::import_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
