//! Prompt library API endpoints
//!
//! - GET /api/v1/prompts/templates - Every template in the library
//! - POST /api/v1/prompts/match - Rank templates for a brief and preview the prompt

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::AppState;
use crate::api::responses::ApiError;
use crate::models::{CampaignBrief, Platform};
use crate::services::{PromptTemplate, ScoredTemplate};

const DEFAULT_MATCH_LIMIT: usize = 5;
const MAX_MATCH_LIMIT: usize = 20;

#[derive(Debug, Deserialize)]
pub struct MatchRequest {
    pub brief: CampaignBrief,
    pub platform: Platform,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct MatchResponse {
    pub matches: Vec<ScoredTemplate>,
    /// Template the prompt was rendered from
    pub template_id: String,
    pub prompt: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/prompts/templates", get(list_templates))
        .route("/prompts/match", post(match_brief))
}

async fn list_templates(State(state): State<AppState>) -> Json<Vec<PromptTemplate>> {
    Json(state.prompt_library.all().to_vec())
}

async fn match_brief(
    State(state): State<AppState>,
    Json(body): Json<MatchRequest>,
) -> Result<Json<MatchResponse>, ApiError> {
    if body.brief.product_name.trim().is_empty() {
        return Err(ApiError::validation_error("Product name is required"));
    }
    let limit = body
        .limit
        .unwrap_or(DEFAULT_MATCH_LIMIT)
        .clamp(1, MAX_MATCH_LIMIT);

    let matches = state
        .prompt_library
        .match_brief(&body.brief, body.platform, limit);
    let built = state
        .prompt_library
        .build_prompt(&body.brief, body.platform)
        .map_err(|e| {
            tracing::error!(error = ?e, "Failed to render prompt");
            ApiError::internal_error("Failed to render prompt")
        })?;

    Ok(Json(MatchResponse {
        matches,
        template_id: built.template_id,
        prompt: built.prompt,
    }))
}
