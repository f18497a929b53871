//! Authentication API endpoints
//!
//! - POST /api/v1/auth/register - Create an account and sign in
//! - POST /api/v1/auth/login - Sign in
//! - POST /api/v1/auth/logout - Sign out
//! - GET /api/v1/auth/me - Current user

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::{client_ip, session_cookie};
use crate::api::middleware::{extract_session_token, AppState, AuthenticatedUser};
use crate::api::responses::ApiError;
use crate::models::{SubscriptionTier, User};
use crate::services::{LoginInput, RegisterInput};

/// Request body for user registration
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Request body for user login
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username_or_email: String,
    pub password: String,
}

/// Response for successful authentication
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub token: String,
}

/// Response for user info
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub tier: SubscriptionTier,
    pub credits: i64,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            tier: user.tier,
            credits: user.credits,
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

/// Routes reachable without a session
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

/// Routes behind `require_auth`
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(get_current_user))
}

/// POST /api/v1/auth/register
async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let password = body.password.clone();
    let user = state
        .user_service
        .register(RegisterInput::new(body.username, body.email, body.password))
        .await?;

    let (session, user) = state
        .user_service
        .login(LoginInput::new(&user.username, password))
        .await?;

    Ok((
        StatusCode::CREATED,
        session_cookie(Some(&session.id)),
        Json(AuthResponse {
            user: user.into(),
            token: session.id,
        }),
    ))
}

/// POST /api/v1/auth/login
///
/// Limited per client IP and per failed username.
async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(ip) = client_ip(&headers) {
        if state.login_limiter.is_ip_limited(ip).await {
            tracing::warn!(%ip, "Login rate limit exceeded for IP");
            return Err(ApiError::rate_limited("Too many requests, try again later", 60));
        }
        state.login_limiter.record_ip_request(ip).await;
    }

    let username = body.username_or_email.trim().to_string();
    if state.login_limiter.is_username_limited(&username).await {
        tracing::warn!(username = %username, "Login rate limit exceeded for account");
        return Err(ApiError::rate_limited(
            "Too many failed logins, try again in 15 minutes",
            900,
        ));
    }

    let (session, user) = match state
        .user_service
        .login(LoginInput::new(&username, body.password))
        .await
    {
        Ok(pair) => pair,
        Err(e) => {
            state.login_limiter.record_failed_attempt(&username).await;
            return Err(e.into());
        }
    };
    state.login_limiter.clear_username_attempts(&username).await;

    Ok((
        session_cookie(Some(&session.id)),
        Json(AuthResponse {
            user: user.into(),
            token: session.id,
        }),
    ))
}

/// POST /api/v1/auth/logout
async fn logout(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = extract_session_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;
    state.user_service.logout(&token).await?;

    Ok((StatusCode::NO_CONTENT, session_cookie(None)))
}

/// GET /api/v1/auth/me
async fn get_current_user(user: AuthenticatedUser) -> Json<UserResponse> {
    Json(user.0.into())
}
