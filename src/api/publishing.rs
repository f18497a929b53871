//! Publishing API endpoints
//!
//! - POST /api/v1/campaigns/{id}/publish - Publish, or simulate with `simulate: true`
//! - GET /api/v1/campaigns/{id}/publications
//! - GET /api/v1/campaigns/{id}/simulations

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};

use crate::api::middleware::{AppState, AuthenticatedUser};
use crate::api::responses::ApiError;
use crate::models::{Publication, PublishingSimulation};
use crate::services::{PublishInput, PublishOutcome};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/campaigns/{id}/publish", post(publish))
        .route("/campaigns/{id}/publications", get(list_publications))
        .route("/campaigns/{id}/simulations", get(list_simulations))
}

async fn publish(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    body: Option<Json<PublishInput>>,
) -> Result<Json<PublishOutcome>, ApiError> {
    let Json(input) = body.unwrap_or_default();
    Ok(Json(
        state
            .publishing_service
            .publish(user.0.id, id, input)
            .await?,
    ))
}

async fn list_publications(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Publication>>, ApiError> {
    Ok(Json(
        state
            .publishing_service
            .list_publications(user.0.id, id)
            .await?,
    ))
}

async fn list_simulations(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Vec<PublishingSimulation>>, ApiError> {
    Ok(Json(
        state
            .publishing_service
            .list_simulations(user.0.id, id)
            .await?,
    ))
}
