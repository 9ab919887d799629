//! # PMBoard API Server
//!
//! Loads configuration, connects to PostgreSQL, applies pending migrations
//! and serves the HTTP API until Ctrl-C.
//!
//! ```bash
//! DATABASE_URL=postgresql://localhost/pmboard JWT_SECRET=... cargo run -p pmboard-api
//! ```

use anyhow::Context;
use pmboard_api::{
    app::{self, AppState},
    config::{Config, LogFormat},
};
use pmboard_shared::db::{
    migrations,
    pool::{self, PoolConfig},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "pmboard_api=debug,pmboard_shared=debug,tower_http=debug";

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.logging.format);

    tracing::info!(
        "PMBoard API Server v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let db = pool::create_pool(&PoolConfig {
        url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        ..Default::default()
    })
    .await
    .context("Failed to connect to the database")?;

    migrations::run_migrations(&db)
        .await
        .context("Failed to apply migrations")?;

    let mailer = app::mailer_from_config(&config)?;
    let address = config.bind_address();
    let state = AppState::new(db.clone(), config, mailer);
    let router = app::build_router(state);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    tracing::info!("Server listening on http://{}", address);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool::close_pool(db).await;
    tracing::info!("Server stopped");

    Ok(())
}
