//! API middleware and shared state
//!
//! Contains:
//! - `AppState`, the services shared by every handler
//! - Authentication (Bearer token or `session` cookie)
//! - The `AuthenticatedUser` extractor

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Duration;

use crate::api::responses::ApiError;
use crate::config::Config;
use crate::db::repositories::{
    SqlxAnalyticsRepository, SqlxAssetRepository, SqlxBillingEventRepository,
    SqlxCampaignRepository, SqlxCreditRepository, SqlxOAuthConnectionRepository,
    SqlxPublishingRepository, SqlxSessionRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::{SubscriptionTier, User};
use crate::platforms::PlatformRegistry;
use crate::providers::{http_client, ProviderRegistry};
use crate::services::{
    AnalyticsService, AssetHostingService, BillingService, CampaignService, CreditService,
    GenerationRateLimiter, GenerationService, LoginRateLimiter, OAuthService, PromptLibrary,
    PublishingService, UserService,
};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    /// Where the browser app lives; OAuth callbacks redirect back here
    pub app_url: String,
    pub user_service: Arc<UserService>,
    pub login_limiter: Arc<LoginRateLimiter>,
    pub generation_limiter: Arc<GenerationRateLimiter>,
    pub campaign_service: Arc<CampaignService>,
    pub prompt_library: Arc<PromptLibrary>,
    pub providers: Arc<ProviderRegistry>,
    pub credit_service: Arc<CreditService>,
    pub generation_service: Arc<GenerationService>,
    pub asset_service: Arc<AssetHostingService>,
    pub oauth_service: Arc<OAuthService>,
    pub publishing_service: Arc<PublishingService>,
    pub analytics_service: Arc<AnalyticsService>,
    pub billing_service: Arc<BillingService>,
}

impl AppState {
    /// Wire every service from configuration
    pub fn from_config(pool: DynDatabasePool, config: &Config) -> anyhow::Result<Self> {
        let client = http_client(Duration::from_secs(config.providers.timeout_seconds))?;
        let providers = Arc::new(ProviderRegistry::from_config(&config.providers)?);
        let platforms = Arc::new(PlatformRegistry::from_config(
            &config.platforms,
            client.clone(),
        ));
        Self::build(pool, config, providers, platforms, client)
    }

    /// Wire every service around the given provider and platform registries
    pub fn build(
        pool: DynDatabasePool,
        config: &Config,
        providers: Arc<ProviderRegistry>,
        platforms: Arc<PlatformRegistry>,
        client: reqwest::Client,
    ) -> anyhow::Result<Self> {
        let public_url = config.server.public_url.trim_end_matches('/');

        let user_service = Arc::new(UserService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool.clone()),
            config.credits.allowance(SubscriptionTier::Free),
        ));
        let campaign_service = Arc::new(CampaignService::new(SqlxCampaignRepository::boxed(
            pool.clone(),
        )));
        let prompt_library = Arc::new(PromptLibrary::embedded()?);
        let credit_service = Arc::new(CreditService::new(
            SqlxCreditRepository::boxed(pool.clone()),
            config.credits.clone(),
        ));
        let asset_service = Arc::new(AssetHostingService::new(
            SqlxAssetRepository::boxed(pool.clone()),
            client.clone(),
            config.media.clone(),
        ));
        let generation_limiter = Arc::new(GenerationRateLimiter::new(
            config.server.generation_per_minute,
        ));
        let generation_service = Arc::new(GenerationService::new(
            campaign_service.clone(),
            credit_service.clone(),
            providers.clone(),
            prompt_library.clone(),
            asset_service.clone(),
            generation_limiter.clone(),
        ));
        let oauth_service = Arc::new(OAuthService::new(
            SqlxOAuthConnectionRepository::boxed(pool.clone()),
            platforms.clone(),
            config.platforms.clone(),
            public_url,
            client.clone(),
        ));
        let analytics_service = Arc::new(AnalyticsService::new(
            SqlxAnalyticsRepository::boxed(pool.clone()),
            campaign_service.clone(),
        ));
        let publishing_service = Arc::new(PublishingService::new(
            SqlxPublishingRepository::boxed(pool.clone()),
            campaign_service.clone(),
            asset_service.clone(),
            oauth_service.clone(),
            platforms,
            analytics_service.clone(),
            public_url,
            config.publishing.simulate_only,
        ));
        let billing_service = Arc::new(BillingService::new(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxBillingEventRepository::boxed(pool.clone()),
            credit_service.clone(),
            config.billing.clone(),
            client,
        ));

        Ok(Self {
            pool,
            app_url: config.server.cors_origin.trim_end_matches('/').to_string(),
            user_service,
            login_limiter: Arc::new(LoginRateLimiter::new()),
            generation_limiter,
            campaign_service,
            prompt_library,
            providers,
            credit_service,
            generation_service,
            asset_service,
            oauth_service,
            publishing_service,
            analytics_service,
            billing_service,
        })
    }
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// Session token from `Authorization: Bearer` or the `session` cookie
pub fn extract_session_token(headers: &axum::http::HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }

    if let Some(cookie_header) = headers.get(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                if let Some(token) = cookie.trim().strip_prefix("session=") {
                    return Some(token.to_string());
                }
            }
        }
    }

    None
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_session_token(request.headers())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let user = state
        .user_service
        .validate_session(&token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};

    fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_extract_session_token_from_bearer() {
        let map = headers(&[(header::AUTHORIZATION, "Bearer test-token-123")]);
        assert_eq!(extract_session_token(&map), Some("test-token-123".to_string()));
    }

    #[test]
    fn test_extract_session_token_from_cookie() {
        let map = headers(&[(header::COOKIE, "theme=dark; session=test-token-456")]);
        assert_eq!(extract_session_token(&map), Some("test-token-456".to_string()));
    }

    #[test]
    fn test_extract_session_token_bearer_priority() {
        let map = headers(&[
            (header::AUTHORIZATION, "Bearer bearer-token"),
            (header::COOKIE, "session=cookie-token"),
        ]);
        assert_eq!(extract_session_token(&map), Some("bearer-token".to_string()));
    }

    #[test]
    fn test_extract_session_token_none() {
        assert!(extract_session_token(&HeaderMap::new()).is_none());
        let map = headers(&[(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")]);
        assert!(extract_session_token(&map).is_none());
    }
}
