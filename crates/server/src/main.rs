// crates/server/src/main.rs
//! scrape-hub server binary.

use std::time::Duration;

use anyhow::{Context, Result};
use scrape_hub_db::Database;
use scrape_hub_server::{create_app, AppState, ServerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// How often expired job records are swept.
const REAPER_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,scrape_hub=info".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;
    if config.api_secret.is_none() {
        tracing::warn!("API_SECRET is not set; every route is open");
    }

    let db = Database::new(&config.db_path)
        .await
        .with_context(|| format!("opening database at {}", config.db_path.display()))?;
    let state = AppState::new(db, &config)?;
    let _reaper = state.jobs.spawn_reaper(REAPER_INTERVAL);

    let app = create_app(state, &config.cors_origins);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("scrape-hub server listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
