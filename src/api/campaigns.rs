//! Campaign API endpoints
//!
//! - GET /api/v1/campaigns - List the user's campaigns
//! - POST /api/v1/campaigns - Create a draft
//! - GET/PUT/DELETE /api/v1/campaigns/{id}
//! - POST /api/v1/campaigns/{id}/archive
//! - POST /api/v1/campaigns/{id}/restore

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::api::common::{default_page, default_per_page, PaginatedResponse};
use crate::api::middleware::{AppState, AuthenticatedUser};
use crate::api::responses::ApiError;
use crate::models::{
    Campaign, CampaignStatus, CreateCampaignInput, ListCampaignsParams, Platform,
    UpdateCampaignInput,
};

/// Query parameters for listing campaigns
#[derive(Debug, Deserialize)]
pub struct ListCampaignsQuery {
    #[serde(default)]
    pub status: Option<CampaignStatus>,
    #[serde(default)]
    pub platform: Option<Platform>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/campaigns", get(list_campaigns).post(create_campaign))
        .route(
            "/campaigns/{id}",
            get(get_campaign).put(update_campaign).delete(delete_campaign),
        )
        .route("/campaigns/{id}/archive", post(archive_campaign))
        .route("/campaigns/{id}/restore", post(restore_campaign))
}

async fn list_campaigns(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<ListCampaignsQuery>,
) -> Result<Json<PaginatedResponse<Campaign>>, ApiError> {
    let params = ListCampaignsParams {
        status: query.status,
        platform: query.platform,
        page: query.page,
        per_page: query.per_page,
    };
    let result = state.campaign_service.list(user.0.id, params).await?;
    Ok(Json(result.into()))
}

async fn create_campaign(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateCampaignInput>,
) -> Result<impl IntoResponse, ApiError> {
    let campaign = state.campaign_service.create(user.0.id, body).await?;
    Ok((StatusCode::CREATED, Json(campaign)))
}

async fn get_campaign(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Campaign>, ApiError> {
    Ok(Json(state.campaign_service.get(user.0.id, id).await?))
}

async fn update_campaign(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateCampaignInput>,
) -> Result<Json<Campaign>, ApiError> {
    Ok(Json(state.campaign_service.update(user.0.id, id, body).await?))
}

/// Deleting a campaign also removes its hosted media files
async fn delete_campaign(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let campaign = state.campaign_service.get(user.0.id, id).await?;
    state
        .asset_service
        .remove_campaign_files(user.0.id, campaign.id)
        .await?;
    state.campaign_service.delete(user.0.id, campaign.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn archive_campaign(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Campaign>, ApiError> {
    Ok(Json(state.campaign_service.archive(user.0.id, id).await?))
}

async fn restore_campaign(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Campaign>, ApiError> {
    Ok(Json(state.campaign_service.restore(user.0.id, id).await?))
}
