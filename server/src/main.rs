//! Daybook Sync Server - remote store of record for Daybook clients.
//!
//! Clients upload their local changes to `POST /sync` and fetch everything
//! they own from `POST /sync/download`. Conflicts are settled with
//! last-write-wins using the engine's reconciliation rules.

mod auth;
mod config;
mod db;
mod error;
mod handlers;
mod rate_limit;
mod routes;

use crate::config::Config;
use crate::db::Pool;
use crate::rate_limit::RateLimiter;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub config: Arc<Config>,
    pub rate_limiter: Arc<RateLimiter>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "daybook_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Arc::new(Config::from_env()?);
    tracing::info!(
        max_items = config.sync_max_items,
        rate_limit = config.sync_rate_limit_per_minute,
        "Starting Daybook Sync Server on {}:{}",
        config.host,
        config.port
    );

    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    tracing::info!("Running database migrations...");
    db::run_migrations(&pool).await?;

    let rate_limiter = Arc::new(RateLimiter::per_minute(config.sync_rate_limit_per_minute));
    tokio::spawn(prune_rate_windows(Arc::clone(&rate_limiter)));

    let app = Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(AppState {
            pool: pool.clone(),
            config: Arc::clone(&config),
            rate_limiter,
        });

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    tracing::info!("Server stopped");
    Ok(())
}

/// Drop stale rate-limit windows once per window length.
async fn prune_rate_windows(limiter: Arc<RateLimiter>) {
    let mut ticker = tokio::time::interval(limiter.window());
    loop {
        ticker.tick().await;
        let pruned = limiter.prune_expired();
        if pruned > 0 {
            tracing::debug!(pruned, "pruned rate limit windows");
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
