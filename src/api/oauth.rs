//! Social account connection endpoints
//!
//! - GET /api/v1/oauth/connections - Connected accounts
//! - GET /api/v1/oauth/{platform}/authorize - Start the OAuth flow
//! - GET /api/v1/oauth/{platform}/callback - Provider redirect target (public)
//! - DELETE /api/v1/oauth/{platform} - Disconnect

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Redirect,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{AppState, AuthenticatedUser};
use crate::api::responses::ApiError;
use crate::models::{OAuthConnection, Platform};
use crate::services::AuthorizeRedirect;

/// Query the platform appends to the redirect URI
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Routes behind `require_auth`
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/oauth/connections", get(list_connections))
        .route("/oauth/{platform}/authorize", get(authorize))
        .route("/oauth/{platform}", axum::routing::delete(disconnect))
}

/// The callback is reached by a browser redirect without our session header
pub fn public_router() -> Router<AppState> {
    Router::new().route("/oauth/{platform}/callback", get(callback))
}

async fn list_connections(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<OAuthConnection>>, ApiError> {
    Ok(Json(state.oauth_service.list(user.0.id).await?))
}

async fn authorize(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(platform): Path<Platform>,
) -> Result<Json<AuthorizeRedirect>, ApiError> {
    Ok(Json(state.oauth_service.begin(user.0.id, platform).await?))
}

/// Finish the flow and send the browser back to the app
async fn callback(
    State(state): State<AppState>,
    Path(platform): Path<Platform>,
    Query(query): Query<CallbackQuery>,
) -> Redirect {
    let back = |outcome: &str| {
        Redirect::to(&format!(
            "{}/connections?platform={}&{}",
            state.app_url, platform, outcome
        ))
    };

    let (code, oauth_state) = match (query.error, query.code, query.state) {
        (None, Some(code), Some(oauth_state)) => (code, oauth_state),
        (error, _, oauth_state) => {
            // A denied or malformed callback still uses up its state
            if let Some(oauth_state) = oauth_state {
                state.oauth_service.cancel(platform, &oauth_state).await;
            }
            let Some(error) = error else {
                return back("error=missing_code");
            };
            let reason = query.error_description.unwrap_or(error);
            tracing::warn!(%platform, reason = %reason, "OAuth authorization denied");
            return back(&format!("error={}", urlencoding::encode(&reason)));
        }
    };

    match state
        .oauth_service
        .complete(platform, &code, &oauth_state)
        .await
    {
        Ok(connection) => {
            tracing::info!(user_id = connection.user_id, %platform, "Account connected");
            back("connected=1")
        }
        Err(e) => {
            tracing::error!(%platform, error = %e, "OAuth callback failed");
            back(&format!("error={}", urlencoding::encode(&e.to_string())))
        }
    }
}

async fn disconnect(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(platform): Path<Platform>,
) -> Result<StatusCode, ApiError> {
    state.oauth_service.disconnect(user.0.id, platform).await?;
    Ok(StatusCode::NO_CONTENT)
}
