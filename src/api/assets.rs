//! Asset API endpoints
//!
//! - GET /api/v1/assets?campaign_id= - List generated media
//! - GET/DELETE /api/v1/assets/{id}
//! - POST /api/v1/assets/rehost - Retry hosting of failed downloads

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{AppState, AuthenticatedUser};
use crate::api::responses::ApiError;
use crate::models::Asset;
use crate::services::RehostSummary;

#[derive(Debug, Deserialize)]
pub struct ListAssetsQuery {
    #[serde(default)]
    pub campaign_id: Option<i64>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/assets", get(list_assets))
        .route("/assets/rehost", post(rehost_assets))
        .route("/assets/{id}", get(get_asset).delete(delete_asset))
}

async fn list_assets(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ListAssetsQuery>,
) -> Result<Json<Vec<Asset>>, ApiError> {
    Ok(Json(
        state
            .asset_service
            .list(user.0.id, query.campaign_id)
            .await?,
    ))
}

async fn get_asset(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Asset>, ApiError> {
    Ok(Json(state.asset_service.get(user.0.id, id).await?))
}

async fn delete_asset(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.asset_service.delete(user.0.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn rehost_assets(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<RehostSummary>, ApiError> {
    Ok(Json(state.asset_service.rehost_failed(user.0.id).await?))
}
