//! Analytics API endpoints
//!
//! - POST /api/v1/campaigns/{id}/performance - Report metrics
//! - GET /api/v1/campaigns/{id}/performance - Snapshots and totals
//! - GET /api/v1/analytics/insights - Learned patterns, best first

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::api::common::LimitQuery;
use crate::api::middleware::{AppState, AuthenticatedUser};
use crate::api::responses::ApiError;
use crate::models::{ContentMetrics, LearningPattern};
use crate::services::CampaignPerformance;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/campaigns/{id}/performance",
            get(get_performance).post(record_performance),
        )
        .route("/analytics/insights", get(insights))
}

async fn record_performance(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(metrics): Json<ContentMetrics>,
) -> Result<impl IntoResponse, ApiError> {
    let row = state
        .analytics_service
        .record_performance(user.0.id, id, metrics)
        .await?;
    Ok((StatusCode::CREATED, Json(row)))
}

async fn get_performance(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<CampaignPerformance>, ApiError> {
    Ok(Json(
        state
            .analytics_service
            .campaign_performance(user.0.id, id)
            .await?,
    ))
}

async fn insights(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<LearningPattern>>, ApiError> {
    Ok(Json(
        state
            .analytics_service
            .insights(user.0.id, query.limit.unwrap_or(0))
            .await?,
    ))
}
