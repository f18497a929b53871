//! Credit API endpoints
//!
//! - GET /api/v1/credits - Balance, plan allowance and per-generation costs
//! - GET /api/v1/credits/history - Ledger, newest first

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::api::common::LimitQuery;
use crate::api::middleware::{AppState, AuthenticatedUser};
use crate::api::responses::ApiError;
use crate::models::{CreditUsage, GenerationKind, SubscriptionTier};

const DEFAULT_HISTORY_LIMIT: i64 = 50;

#[derive(Debug, Serialize)]
pub struct CreditCosts {
    pub text: i64,
    pub image: i64,
    pub video: i64,
}

#[derive(Debug, Serialize)]
pub struct CreditSummary {
    pub balance: i64,
    pub tier: SubscriptionTier,
    pub allowance: i64,
    pub costs: CreditCosts,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/credits", get(get_credits))
        .route("/credits/history", get(get_history))
}

async fn get_credits(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<CreditSummary>, ApiError> {
    let credits = &state.credit_service;
    Ok(Json(CreditSummary {
        balance: credits.balance(user.0.id).await?,
        tier: user.0.tier,
        allowance: credits.allowance(user.0.tier),
        costs: CreditCosts {
            text: credits.cost(GenerationKind::Text),
            image: credits.cost(GenerationKind::Image),
            video: credits.cost(GenerationKind::Video),
        },
    }))
}

async fn get_history(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<CreditUsage>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    Ok(Json(state.credit_service.history(user.0.id, limit).await?))
}
