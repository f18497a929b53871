//! Generation API endpoints
//!
//! - POST /api/v1/campaigns/{id}/generate/copy
//! - POST /api/v1/campaigns/{id}/generate/image
//! - POST /api/v1/campaigns/{id}/generate/video
//!
//! Each call is paid for in credits; the response carries the balance left.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{AppState, AuthenticatedUser};
use crate::api::responses::ApiError;
use crate::models::{AssetKind, Campaign};
use crate::providers::ProviderKind;
use crate::services::Generated;

#[derive(Debug, Default, Deserialize)]
pub struct GenerateCopyRequest {
    #[serde(default)]
    pub provider: Option<ProviderKind>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerateMediaRequest {
    #[serde(default)]
    pub provider: Option<ProviderKind>,
    /// Replaces the prompt derived from the brief
    #[serde(default)]
    pub prompt: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/campaigns/{id}/generate/copy", post(generate_copy))
        .route("/campaigns/{id}/generate/image", post(generate_image))
        .route("/campaigns/{id}/generate/video", post(generate_video))
}

async fn generate_copy(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    body: Option<Json<GenerateCopyRequest>>,
) -> Result<Json<Generated<Campaign>>, ApiError> {
    let Json(body) = body.unwrap_or_default();
    let generated = state
        .generation_service
        .generate_copy(user.0.id, id, body.provider)
        .await?;
    Ok(Json(generated))
}

async fn generate_image(
    state: State<AppState>,
    user: AuthenticatedUser,
    id: Path<i64>,
    body: Option<Json<GenerateMediaRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    generate_media(state, user, id, AssetKind::Image, body).await
}

async fn generate_video(
    state: State<AppState>,
    user: AuthenticatedUser,
    id: Path<i64>,
    body: Option<Json<GenerateMediaRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    generate_media(state, user, id, AssetKind::Video, body).await
}

async fn generate_media(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    kind: AssetKind,
    body: Option<Json<GenerateMediaRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body.unwrap_or_default();
    let prompt = body.prompt.filter(|p| !p.trim().is_empty());
    let generated = state
        .generation_service
        .generate_media(user.0.id, id, kind, body.provider, prompt)
        .await?;
    Ok((StatusCode::CREATED, Json(generated)))
}
