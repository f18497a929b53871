//! Adloom - campaign briefs to published social content

use anyhow::Result;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use adloom::{
    api::{self, AppState},
    config::Config,
    db,
};

/// Interval of the session and rate limiter cleanup task
const CLEANUP_INTERVAL_SECS: u64 = 300;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "adloom=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Adloom...");

    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    let applied = db::migrations::run_migrations(&pool).await?;
    tracing::info!(applied, "Database migrations completed");

    tokio::fs::create_dir_all(&config.media.dir).await?;
    if config.publishing.simulate_only {
        tracing::warn!("Publishing runs in simulate-only mode");
    }

    let state = AppState::from_config(pool.clone(), &config)?;

    {
        let users = state.user_service.clone();
        let login_limiter = state.login_limiter.clone();
        let generation_limiter = state.generation_limiter.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(tokio::time::Duration::from_secs(CLEANUP_INTERVAL_SECS));
            loop {
                interval.tick().await;
                match users.cleanup_expired_sessions().await {
                    Ok(0) => {}
                    Ok(removed) => tracing::info!(removed, "Removed expired sessions"),
                    Err(e) => tracing::warn!("Session cleanup failed: {}", e),
                }
                login_limiter.cleanup().await;
                generation_limiter.cleanup().await;
            }
        });
    }

    let app = api::build_router(state, &config.server.cors_origin)?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    pool.close().await;
    Ok(())
}
