//! Social account connections
//!
//! Runs the authorization-code flow for each platform and keeps the stored
//! tokens usable for publishing. Pending authorizations live in a short-lived
//! in-memory cache keyed by the random `state` parameter.

use crate::config::PlatformsConfig;
use crate::db::repositories::OAuthConnectionRepository;
use crate::models::{OAuthConnection, Platform};
use crate::platforms::{ensure_success, PlatformError, PlatformRegistry};
use anyhow::Context;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// How long an authorization may take before its state is rejected
pub const STATE_TTL: Duration = Duration::from_secs(10 * 60);
const MAX_PENDING_STATES: u64 = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("OAuth app for {0} is not configured")]
    NotConfigured(Platform),

    #[error("OAuth state is invalid or expired")]
    InvalidState,

    #[error("No {0} account is connected")]
    NotConnected(Platform),

    #[error("The {0} connection has expired, reconnect the account")]
    ReconnectRequired(Platform),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
struct PendingAuthorization {
    user_id: i64,
    platform: Platform,
    issued_at: DateTime<Utc>,
}

/// Where to send the user to grant access
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizeRedirect {
    pub url: String,
    pub state: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// A usable token set
struct Tokens {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
    scope: Option<String>,
}

impl TryFrom<TokenResponse> for Tokens {
    type Error = PlatformError;

    fn try_from(response: TokenResponse) -> Result<Self, Self::Error> {
        let access_token = response.access_token.filter(|t| !t.is_empty()).ok_or_else(|| {
            PlatformError::Api {
                status: 400,
                message: response
                    .error_description
                    .or(response.error)
                    .unwrap_or_else(|| "token response has no access_token".to_string()),
            }
        })?;
        Ok(Self {
            access_token,
            refresh_token: response.refresh_token.filter(|t| !t.is_empty()),
            expires_at: response
                .expires_in
                .filter(|s| *s > 0)
                .map(|s| Utc::now() + ChronoDuration::seconds(s)),
            scope: response.scope,
        })
    }
}

pub struct OAuthService {
    repo: Arc<dyn OAuthConnectionRepository>,
    platforms: Arc<PlatformRegistry>,
    config: PlatformsConfig,
    public_url: String,
    client: reqwest::Client,
    states: Cache<String, PendingAuthorization>,
}

impl OAuthService {
    pub fn new(
        repo: Arc<dyn OAuthConnectionRepository>,
        platforms: Arc<PlatformRegistry>,
        config: PlatformsConfig,
        public_url: &str,
        client: reqwest::Client,
    ) -> Self {
        let states = Cache::builder()
            .max_capacity(MAX_PENDING_STATES)
            .time_to_live(STATE_TTL)
            .build();
        Self {
            repo,
            platforms,
            config,
            public_url: public_url.trim_end_matches('/').to_string(),
            client,
            states,
        }
    }

    pub fn redirect_uri(&self, platform: Platform) -> String {
        format!("{}/api/v1/oauth/{}/callback", self.public_url, platform)
    }

    /// Start an authorization for `user_id`
    pub async fn begin(&self, user_id: i64, platform: Platform) -> Result<AuthorizeRedirect, OAuthError> {
        let app = self.config.get(platform);
        if !app.is_configured() {
            return Err(OAuthError::NotConfigured(platform));
        }
        let endpoints = self.platforms.endpoints(platform);

        let state = Uuid::new_v4().simple().to_string();
        self.states
            .insert(
                state.clone(),
                PendingAuthorization {
                    user_id,
                    platform,
                    issued_at: Utc::now(),
                },
            )
            .await;

        let redirect_uri = self.redirect_uri(platform);
        let scope = endpoints.scope();
        let mut params: Vec<(&str, &str)> = vec![
            (endpoints.client_id_param, app.client_id.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", scope.as_str()),
            ("state", state.as_str()),
        ];
        params.extend(endpoints.extra_authorize_params.iter().copied());

        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let separator = if endpoints.authorize_url.contains('?') { '&' } else { '?' };

        Ok(AuthorizeRedirect {
            url: format!("{}{}{}", endpoints.authorize_url, separator, query),
            state,
        })
    }

    /// Drop a pending authorization the user declined.
    ///
    /// Returns false when the state was unknown or already used.
    pub async fn cancel(&self, platform: Platform, state: &str) -> bool {
        match self.states.remove(state).await {
            Some(pending) => {
                info!(user_id = pending.user_id, %platform, "Authorization cancelled");
                true
            }
            None => false,
        }
    }

    /// Finish an authorization from the platform's callback
    pub async fn complete(
        &self,
        platform: Platform,
        code: &str,
        state: &str,
    ) -> Result<OAuthConnection, OAuthError> {
        let pending = self
            .states
            .remove(state)
            .await
            .ok_or(OAuthError::InvalidState)?;
        let age = Utc::now() - pending.issued_at;
        if pending.platform != platform || age.to_std().map_or(false, |a| a > STATE_TTL) {
            return Err(OAuthError::InvalidState);
        }

        let redirect_uri = self.redirect_uri(platform);
        let mut tokens = self
            .request_tokens(
                platform,
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code),
                    ("redirect_uri", redirect_uri.as_str()),
                ],
            )
            .await?;
        if matches!(platform, Platform::Facebook | Platform::Instagram) {
            tokens = self.long_lived_token(platform, tokens).await?;
        }

        let account = self
            .platforms
            .publisher(platform)
            .resolve_account(&tokens.access_token)
            .await?;

        // A page token replaces the user token and does not expire
        let (access_token, expires_at) = match account.access_token {
            Some(page_token) => (page_token, None),
            None => (tokens.access_token, tokens.expires_at),
        };
        let now = Utc::now();
        let connection = OAuthConnection {
            id: 0,
            user_id: pending.user_id,
            platform,
            account_id: account.account_id,
            account_name: account.account_name,
            access_token,
            refresh_token: tokens.refresh_token,
            scopes: tokens
                .scope
                .unwrap_or_else(|| self.platforms.endpoints(platform).scope()),
            expires_at,
            created_at: now,
            updated_at: now,
        };

        let stored = self
            .repo
            .upsert(&connection)
            .await
            .context("Failed to store OAuth connection")?;
        info!(user_id = stored.user_id, %platform, account_id = %stored.account_id, "Connected account");
        Ok(stored)
    }

    /// The user's connection with a token that is valid right now
    pub async fn connection_for_publish(
        &self,
        user_id: i64,
        platform: Platform,
    ) -> Result<OAuthConnection, OAuthError> {
        let mut connection = self
            .repo
            .get(user_id, platform)
            .await
            .context("Failed to get OAuth connection")?
            .ok_or(OAuthError::NotConnected(platform))?;

        if !connection.is_expired(Utc::now()) {
            return Ok(connection);
        }
        let Some(refresh_token) = connection.refresh_token.clone().filter(|t| !t.is_empty()) else {
            return Err(OAuthError::ReconnectRequired(platform));
        };

        let tokens = match self
            .request_tokens(
                platform,
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token.as_str()),
                ],
            )
            .await
        {
            Ok(tokens) => tokens,
            Err(OAuthError::Platform(e)) => {
                warn!(user_id, %platform, error = %e, "Token refresh rejected");
                return Err(OAuthError::ReconnectRequired(platform));
            }
            Err(e) => return Err(e),
        };

        self.repo
            .update_tokens(
                connection.id,
                &tokens.access_token,
                tokens.refresh_token.as_deref(),
                tokens.expires_at,
            )
            .await
            .context("Failed to store refreshed tokens")?;
        info!(user_id, %platform, "Refreshed access token");

        connection.access_token = tokens.access_token;
        if tokens.refresh_token.is_some() {
            connection.refresh_token = tokens.refresh_token;
        }
        connection.expires_at = tokens.expires_at;
        Ok(connection)
    }

    pub async fn list(&self, user_id: i64) -> Result<Vec<OAuthConnection>, OAuthError> {
        let connections = self
            .repo
            .list_by_user(user_id)
            .await
            .context("Failed to list OAuth connections")?;
        Ok(connections)
    }

    pub async fn disconnect(&self, user_id: i64, platform: Platform) -> Result<(), OAuthError> {
        if !self
            .repo
            .delete(user_id, platform)
            .await
            .context("Failed to delete OAuth connection")?
        {
            return Err(OAuthError::NotConnected(platform));
        }
        info!(user_id, %platform, "Disconnected account");
        Ok(())
    }

    /// Form POST to the token endpoint with the app credentials added
    async fn request_tokens(
        &self,
        platform: Platform,
        grant: &[(&str, &str)],
    ) -> Result<Tokens, OAuthError> {
        let app = self.config.get(platform);
        if !app.is_configured() {
            return Err(OAuthError::NotConfigured(platform));
        }
        let endpoints = self.platforms.endpoints(platform);

        let mut form: Vec<(&str, &str)> = vec![
            (endpoints.client_id_param, app.client_id.as_str()),
            ("client_secret", app.client_secret.as_str()),
        ];
        form.extend_from_slice(grant);

        let response = self
            .client
            .post(&endpoints.token_url)
            .form(&form)
            .send()
            .await
            .map_err(PlatformError::from)?;
        let response = ensure_success(platform, response).await?;
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| PlatformError::Parse(e.to_string()))?;
        Ok(Tokens::try_from(body)?)
    }

    /// Trade a short-lived Facebook login token for a 60-day one
    async fn long_lived_token(&self, platform: Platform, short: Tokens) -> Result<Tokens, OAuthError> {
        let app = self.config.get(platform);
        let endpoints = self.platforms.endpoints(platform);

        let response = self
            .client
            .get(&endpoints.token_url)
            .query(&[
                ("grant_type", "fb_exchange_token"),
                ("client_id", app.client_id.as_str()),
                ("client_secret", app.client_secret.as_str()),
                ("fb_exchange_token", short.access_token.as_str()),
            ])
            .send()
            .await
            .map_err(PlatformError::from)?;
        let response = ensure_success(platform, response).await?;
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| PlatformError::Parse(e.to_string()))?;

        let mut long = Tokens::try_from(body)?;
        if long.scope.is_none() {
            long.scope = short.scope;
        }
        Ok(long)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlatformConfig;
    use crate::db::repositories::SqlxOAuthConnectionRepository;
    use crate::test_support::{insert_user, migrated_pool, spawn_fake};
    use axum::extract::Query;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::{Form, Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;

    fn fake() -> Router {
        Router::new()
            .route(
                "/google/token",
                axum::routing::post(|Form(f): Form<HashMap<String, String>>| async move {
                    assert_eq!(f["client_id"], "yt-client");
                    assert_eq!(f["client_secret"], "yt-secret");
                    let body: (StatusCode, Value) = match (f["grant_type"].as_str(), f.get("code"), f.get("refresh_token")) {
                        ("authorization_code", Some(code), _) if code == "good-code" => (
                            StatusCode::OK,
                            json!({"access_token": "yt-access", "refresh_token": "yt-refresh", "expires_in": 3600, "scope": "youtube.upload"}),
                        ),
                        ("refresh_token", _, Some(token)) if token == "yt-refresh" => {
                            (StatusCode::OK, json!({"access_token": "yt-access-2", "expires_in": 3600}))
                        }
                        _ => (
                            StatusCode::BAD_REQUEST,
                            json!({"error": "invalid_grant", "error_description": "Bad grant"}),
                        ),
                    };
                    (body.0, Json(body.1))
                }),
            )
            .route(
                "/channels",
                get(|headers: HeaderMap| async move {
                    assert_eq!(headers["authorization"], "Bearer yt-access");
                    Json(json!({"items": [{"id": "UC1", "snippet": {"title": "Night Owl"}}]}))
                }),
            )
            .route(
                "/fb/token",
                get(|Query(q): Query<HashMap<String, String>>| async move {
                    assert_eq!(q["grant_type"], "fb_exchange_token");
                    assert_eq!(q["fb_exchange_token"], "fb-short");
                    Json(json!({"access_token": "fb-long", "expires_in": 5184000}))
                })
                .post(|Form(f): Form<HashMap<String, String>>| async move {
                    assert_eq!(f["code"], "fb-code");
                    Json(json!({"access_token": "fb-short", "expires_in": 3600}))
                }),
            )
            .route(
                "/me/accounts",
                get(|Query(q): Query<HashMap<String, String>>| async move {
                    assert_eq!(q["access_token"], "fb-long");
                    Json(json!({"data": [{"id": "page-1", "name": "Night Owl", "access_token": "page-token"}]}))
                }),
            )
    }

    fn app(client_id: &str, secret: &str, base: &str, token_path: &str) -> PlatformConfig {
        PlatformConfig {
            client_id: client_id.into(),
            client_secret: secret.into(),
            token_url: Some(format!("{}{}", base, token_path)),
            api_base: Some(base.to_string()),
            ..Default::default()
        }
    }

    async fn setup() -> (OAuthService, i64) {
        let pool = migrated_pool().await;
        let user_id = insert_user(&pool, "marketer", 0).await;
        let base = spawn_fake(fake()).await;

        let config = PlatformsConfig {
            facebook: app("fb-client", "fb-secret", &base, "/fb/token"),
            youtube: app("yt-client", "yt-secret", &base, "/google/token"),
            tiktok: PlatformConfig {
                client_id: "tt-key".into(),
                client_secret: "tt-secret".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        let client = reqwest::Client::new();
        let registry = Arc::new(PlatformRegistry::from_config(&config, client.clone()));
        let service = OAuthService::new(
            SqlxOAuthConnectionRepository::boxed(pool),
            registry,
            config,
            "https://app.example.com/",
            client,
        );
        (service, user_id)
    }

    fn query_of(url: &str) -> HashMap<String, String> {
        let query = url.split_once('?').map(|(_, q)| q).unwrap_or_default();
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .map(|(k, v)| {
                (
                    k.to_string(),
                    urlencoding::decode(v).map(|d| d.into_owned()).unwrap_or_default(),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_begin_builds_authorize_url() {
        let (service, user_id) = setup().await;
        let redirect = service.begin(user_id, Platform::YouTube).await.unwrap();

        assert!(redirect.url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        let params = query_of(&redirect.url);
        assert_eq!(params["client_id"], "yt-client");
        assert_eq!(
            params["redirect_uri"],
            "https://app.example.com/api/v1/oauth/youtube/callback"
        );
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["state"], redirect.state);
        assert_eq!(params["access_type"], "offline");
    }

    #[tokio::test]
    async fn test_tiktok_uses_client_key() {
        let (service, user_id) = setup().await;
        let redirect = service.begin(user_id, Platform::TikTok).await.unwrap();
        let params = query_of(&redirect.url);
        assert_eq!(params["client_key"], "tt-key");
        assert!(!params.contains_key("client_id"));
    }

    #[tokio::test]
    async fn test_unconfigured_platform() {
        let (service, user_id) = setup().await;
        assert!(matches!(
            service.begin(user_id, Platform::Instagram).await,
            Err(OAuthError::NotConfigured(Platform::Instagram))
        ));
    }

    #[tokio::test]
    async fn test_complete_stores_connection_and_consumes_state() {
        let (service, user_id) = setup().await;
        let redirect = service.begin(user_id, Platform::YouTube).await.unwrap();

        let connection = service
            .complete(Platform::YouTube, "good-code", &redirect.state)
            .await
            .unwrap();
        assert_eq!(connection.user_id, user_id);
        assert_eq!(connection.account_id, "UC1");
        assert_eq!(connection.account_name.as_deref(), Some("Night Owl"));
        assert_eq!(connection.access_token, "yt-access");
        assert_eq!(connection.refresh_token.as_deref(), Some("yt-refresh"));
        assert!(connection.expires_at.is_some());

        let replay = service
            .complete(Platform::YouTube, "good-code", &redirect.state)
            .await;
        assert!(matches!(replay, Err(OAuthError::InvalidState)));
        assert_eq!(service.list(user_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_state_is_bound_to_platform() {
        let (service, user_id) = setup().await;
        let redirect = service.begin(user_id, Platform::YouTube).await.unwrap();

        let result = service
            .complete(Platform::Facebook, "fb-code", &redirect.state)
            .await;
        assert!(matches!(result, Err(OAuthError::InvalidState)));
        assert!(matches!(
            service.complete(Platform::YouTube, "good-code", "made-up").await,
            Err(OAuthError::InvalidState)
        ));
    }

    #[tokio::test]
    async fn test_cancel_consumes_state() {
        let (service, user_id) = setup().await;
        let redirect = service.begin(user_id, Platform::YouTube).await.unwrap();

        assert!(service.cancel(Platform::YouTube, &redirect.state).await);
        assert!(!service.cancel(Platform::YouTube, &redirect.state).await);
        assert!(matches!(
            service
                .complete(Platform::YouTube, "good-code", &redirect.state)
                .await,
            Err(OAuthError::InvalidState)
        ));
        assert!(service.list(user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_code_surfaces_platform_error() {
        let (service, user_id) = setup().await;
        let redirect = service.begin(user_id, Platform::YouTube).await.unwrap();

        match service.complete(Platform::YouTube, "bad-code", &redirect.state).await {
            Err(OAuthError::Platform(PlatformError::Api { status, message })) => {
                assert_eq!(status, 400);
                assert_eq!(message, "Bad grant");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_facebook_stores_page_token() {
        let (service, user_id) = setup().await;
        let redirect = service.begin(user_id, Platform::Facebook).await.unwrap();

        let connection = service
            .complete(Platform::Facebook, "fb-code", &redirect.state)
            .await
            .unwrap();
        assert_eq!(connection.account_id, "page-1");
        assert_eq!(connection.access_token, "page-token");
        assert!(connection.expires_at.is_none());
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed() {
        let (service, user_id) = setup().await;
        let now = Utc::now();
        let mut connection = OAuthConnection {
            id: 0,
            user_id,
            platform: Platform::YouTube,
            account_id: "UC1".into(),
            account_name: None,
            access_token: "old".into(),
            refresh_token: Some("yt-refresh".into()),
            scopes: String::new(),
            expires_at: Some(now - ChronoDuration::hours(1)),
            created_at: now,
            updated_at: now,
        };
        service.repo.upsert(&connection).await.unwrap();

        let fresh = service
            .connection_for_publish(user_id, Platform::YouTube)
            .await
            .unwrap();
        assert_eq!(fresh.access_token, "yt-access-2");
        assert_eq!(fresh.refresh_token.as_deref(), Some("yt-refresh"));
        assert!(!fresh.is_expired(Utc::now()));

        let stored = service.list(user_id).await.unwrap().remove(0);
        assert_eq!(stored.access_token, "yt-access-2");

        connection.refresh_token = None;
        service.repo.upsert(&connection).await.unwrap();
        assert!(matches!(
            service.connection_for_publish(user_id, Platform::YouTube).await,
            Err(OAuthError::ReconnectRequired(Platform::YouTube))
        ));
    }

    #[tokio::test]
    async fn test_disconnect() {
        let (service, user_id) = setup().await;
        assert!(matches!(
            service.disconnect(user_id, Platform::TikTok).await,
            Err(OAuthError::NotConnected(Platform::TikTok))
        ));
        assert!(matches!(
            service.connection_for_publish(user_id, Platform::TikTok).await,
            Err(OAuthError::NotConnected(Platform::TikTok))
        ));
    }
}
