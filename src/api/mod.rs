//! API layer - HTTP handlers and routing
//!
//! All endpoints live under `/api/v1`:
//! - Auth, campaigns and prompt library
//! - AI generation and credits
//! - Hosted assets (files served under the media prefix)
//! - Social account connections and publishing
//! - Performance analytics
//! - Stripe billing

pub mod analytics;
pub mod assets;
pub mod auth;
pub mod billing;
pub mod campaigns;
pub mod common;
pub mod credits;
pub mod generate;
pub mod middleware;
pub mod oauth;
pub mod prompts;
pub mod publishing;
pub mod responses;


use anyhow::Context;
use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::models::GenerationKind;
use crate::providers::ProviderKind;

pub use middleware::{AppState, AuthenticatedUser};
pub use responses::ApiError;

#[derive(Debug, Serialize)]
pub struct ProviderStatus {
    pub provider: ProviderKind,
    pub supports: Vec<GenerationKind>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub providers: Vec<ProviderStatus>,
}

/// Build the `/api/v1` router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .merge(campaigns::router())
        .merge(generate::router())
        .merge(credits::router())
        .merge(assets::router())
        .merge(oauth::router())
        .merge(publishing::router())
        .merge(analytics::router())
        .merge(billing::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_auth,
        ));

    Router::new()
        .route("/health", get(health))
        .nest("/auth", auth::public_router())
        .merge(prompts::router())
        .merge(oauth::public_router())
        .merge(billing::public_router())
        .merge(protected_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> anyhow::Result<Router> {
    let origin = cors_origin
        .parse::<HeaderValue>()
        .with_context(|| format!("Invalid CORS origin: {}", cors_origin))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);

    let media = state.asset_service.config();
    let media_prefix = format!("/{}", media.public_prefix.trim_matches('/'));
    let media_files = ServeDir::new(&media.dir);

    Ok(Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .nest_service(&media_prefix, media_files)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// GET /api/v1/health
async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    state.pool.ping().await.map_err(|e| {
        tracing::error!(error = ?e, "Database ping failed");
        ApiError::internal_error("Database unavailable")
    })?;

    let providers = state
        .providers
        .capabilities()
        .into_iter()
        .map(|(provider, supports)| ProviderStatus { provider, supports })
        .collect();

    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        providers,
    }))
}
