//! Warden HTTP server binary.
//!
//! Reads its configuration from the environment (and `.env`), migrates the
//! database, and serves the login API until interrupted.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use warden_api::config::ApiConfig;
use warden_api::{AppState, Stores};
use warden_core::attempts::ledger::DEFAULT_SWEEP_INTERVAL;
use warden_core::attempts::queries::PgAttemptStore;
use warden_core::attempts::spawn_sweeper;
use warden_core::auth::{TracingAuditSink, validate_signing_secret};
use warden_core::clock::SystemClock;
use warden_core::crypto::SecretCodec;
use warden_core::directory::client::LdapDirectory;
use warden_core::directory::queries::PgDirectorySettingsStore;
use warden_core::identity::queries::PgIdentityStore;

/// CLI arguments. Everything else comes from `WARDEN_*` variables.
#[derive(Parser, Debug)]
#[command(name = "warden_server", about = "Warden identity and session server")]
struct Args {
    /// Address to listen on. Overrides `BIND_ADDR`.
    #[arg(long, env = "BIND_ADDR")]
    bind: Option<String>,

    /// PostgreSQL connection URL. Overrides `DATABASE_URL`.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,

    /// Seconds between sweeps of expired login attempts.
    #[arg(long, default_value_t = DEFAULT_SWEEP_INTERVAL.as_secs())]
    sweep_interval_secs: u64,
}

async fn shutdown_signal(cancel: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {e}");
    }
    info!("shutdown requested");
    cancel.cancel();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,warden_api=debug,warden_core=debug".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = ApiConfig::from_env()?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(url) = args.database_url {
        config.pg_connection_url = url;
    }

    if let Err(e) = validate_signing_secret(
        &config.jwt_secret,
        config.jwt_min_secret_len,
        config.allow_insecure_secret,
    ) {
        error!("refusing to start: {e}");
        return Err(e.into());
    }

    info!(
        bind = %config.bind_addr,
        max_connections = args.max_connections,
        trust_proxy_headers = config.trust_proxy_headers,
        "starting warden_server"
    );

    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(&config.pg_connection_url)
        .await?;

    info!("running database migrations");
    warden_api::migrate(&pool).await?;

    let codec = Arc::new(SecretCodec::new(&config.encryption_key));
    let directory = Arc::new(LdapDirectory::new(codec.clone(), config.directory_timeout));
    let stores = Stores {
        identities: Arc::new(PgIdentityStore::new(pool.clone())),
        attempts: Arc::new(PgAttemptStore::new(pool.clone())),
        directory_settings: Arc::new(PgDirectorySettingsStore::new(pool)),
    };

    let bootstrap_admin = config.bootstrap_admin.take();
    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(
        config,
        stores,
        directory,
        codec,
        Arc::new(TracingAuditSink),
        Arc::new(SystemClock),
    );

    if let Some((username, password)) = bootstrap_admin {
        match warden_api::services::bootstrap::ensure_admin(&state, &username, password).await {
            Ok(true) => info!(username = %username, "bootstrap admin created"),
            Ok(false) => info!(username = %username, "bootstrap admin already present"),
            Err(e) => return Err(e.into()),
        }
    }

    let cancel = CancellationToken::new();
    let sweeper = spawn_sweeper(
        state.ledger.clone(),
        std::time::Duration::from_secs(args.sweep_interval_secs.max(1)),
        cancel.clone(),
    );

    let app = warden_api::router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    let result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(cancel.clone()))
    .await;

    cancel.cancel();
    let _ = sweeper.await;

    result?;
    Ok(())
}
