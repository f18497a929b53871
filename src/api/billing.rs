//! Billing API endpoints
//!
//! - POST /api/v1/billing/checkout - Start a Stripe checkout for a plan
//! - POST /api/v1/billing/webhook - Stripe events (public, signed)

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{AppState, AuthenticatedUser};
use crate::api::responses::ApiError;
use crate::models::SubscriptionTier;
use crate::services::{CheckoutSession, EventOutcome};

pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub tier: SubscriptionTier,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub received: bool,
    pub outcome: EventOutcome,
}

/// Routes behind `require_auth`
pub fn router() -> Router<AppState> {
    Router::new().route("/billing/checkout", post(checkout))
}

/// Stripe authenticates with the signature header, not a session
pub fn public_router() -> Router<AppState> {
    Router::new().route("/billing/webhook", post(webhook))
}

async fn checkout(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CheckoutRequest>,
) -> Result<Json<CheckoutSession>, ApiError> {
    Ok(Json(
        state
            .billing_service
            .create_checkout(user.0.id, body.tier)
            .await?,
    ))
}

/// The body must stay byte-exact for signature verification
async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::validation_error("Missing Stripe-Signature header"))?;

    let outcome = state
        .billing_service
        .handle_webhook(&body, signature)
        .await
        .inspect_err(|e| tracing::warn!(error = %e, "Rejected billing webhook"))?;

    Ok(Json(WebhookResponse {
        received: true,
        outcome,
    }))
}
