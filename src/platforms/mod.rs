//! Social platform integrations
//!
//! Each platform provides its OAuth endpoints and a `Publisher` that resolves
//! the account behind a token and posts content with it.

pub mod facebook;
pub mod instagram;
pub mod tiktok;
pub mod youtube;

pub use facebook::FacebookPublisher;
pub use instagram::InstagramPublisher;
pub use tiktok::TikTokPublisher;
pub use youtube::YouTubePublisher;

use crate::config::{PlatformConfig, PlatformsConfig};
use crate::models::{AssetKind, OAuthConnection, Platform};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

const GRAPH_API: &str = "https://graph.facebook.com/v19.0";
const FACEBOOK_DIALOG: &str = "https://www.facebook.com/v19.0/dialog/oauth";
const FACEBOOK_TOKEN: &str = "https://graph.facebook.com/v19.0/oauth/access_token";

/// OAuth and API locations for one platform
#[derive(Debug, Clone, Serialize)]
pub struct PlatformEndpoints {
    pub authorize_url: String,
    pub token_url: String,
    pub api_base: String,
    pub upload_base: String,
    pub scopes: Vec<&'static str>,
    pub scope_separator: &'static str,
    /// Name of the client id parameter in authorize and token requests
    pub client_id_param: &'static str,
    /// Extra authorize parameters (offline access for refresh tokens)
    pub extra_authorize_params: Vec<(&'static str, &'static str)>,
}

impl PlatformEndpoints {
    /// Defaults for `platform`, with any overrides from config applied
    pub fn for_platform(platform: Platform, config: &PlatformConfig) -> Self {
        let mut endpoints = match platform {
            Platform::Facebook => Self {
                authorize_url: FACEBOOK_DIALOG.into(),
                token_url: FACEBOOK_TOKEN.into(),
                api_base: GRAPH_API.into(),
                upload_base: GRAPH_API.into(),
                scopes: vec!["pages_show_list", "pages_manage_posts", "pages_read_engagement"],
                scope_separator: ",",
                client_id_param: "client_id",
                extra_authorize_params: vec![],
            },
            Platform::Instagram => Self {
                authorize_url: FACEBOOK_DIALOG.into(),
                token_url: FACEBOOK_TOKEN.into(),
                api_base: GRAPH_API.into(),
                upload_base: GRAPH_API.into(),
                scopes: vec![
                    "instagram_basic",
                    "instagram_content_publish",
                    "pages_show_list",
                    "pages_read_engagement",
                ],
                scope_separator: ",",
                client_id_param: "client_id",
                extra_authorize_params: vec![],
            },
            Platform::TikTok => Self {
                authorize_url: "https://www.tiktok.com/v2/auth/authorize/".into(),
                token_url: "https://open.tiktokapis.com/v2/oauth/token/".into(),
                api_base: "https://open.tiktokapis.com".into(),
                upload_base: "https://open.tiktokapis.com".into(),
                scopes: vec!["user.info.basic", "video.publish"],
                scope_separator: ",",
                client_id_param: "client_key",
                extra_authorize_params: vec![],
            },
            Platform::YouTube => Self {
                authorize_url: "https://accounts.google.com/o/oauth2/v2/auth".into(),
                token_url: "https://oauth2.googleapis.com/token".into(),
                api_base: "https://www.googleapis.com/youtube/v3".into(),
                upload_base: "https://www.googleapis.com".into(),
                scopes: vec![
                    "https://www.googleapis.com/auth/youtube.upload",
                    "https://www.googleapis.com/auth/youtube.readonly",
                ],
                scope_separator: " ",
                client_id_param: "client_id",
                extra_authorize_params: vec![("access_type", "offline"), ("prompt", "consent")],
            },
        };

        if let Some(url) = &config.authorize_url {
            endpoints.authorize_url = url.clone();
        }
        if let Some(url) = &config.token_url {
            endpoints.token_url = url.clone();
        }
        if let Some(url) = &config.api_base {
            endpoints.api_base = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = &config.upload_base {
            endpoints.upload_base = url.trim_end_matches('/').to_string();
        }
        endpoints
    }

    pub fn scope(&self) -> String {
        self.scopes.join(self.scope_separator)
    }
}

/// The account an access token acts as
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAccount {
    pub account_id: String,
    pub account_name: Option<String>,
    /// Token to store instead of the user token (Facebook page token)
    pub access_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PublishMedia {
    pub kind: AssetKind,
    /// Absolute, publicly reachable URL
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub title: String,
    pub caption: String,
    pub hashtags: Vec<String>,
    pub media: Option<PublishMedia>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishResult {
    pub external_id: String,
    pub url: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("Platform API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Platform request failed: {0}")]
    Http(String),

    #[error("Failed to parse platform response: {0}")]
    Parse(String),

    #[error("{0}")]
    MediaRequired(String),

    #[error("No publishable account: {0}")]
    NoAccount(String),

    #[error("Timed out waiting for {0}")]
    Timeout(String),
}

impl From<reqwest::Error> for PlatformError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

#[async_trait]
pub trait Publisher: Send + Sync {
    fn platform(&self) -> Platform;

    /// Which account a freshly issued token belongs to
    async fn resolve_account(&self, access_token: &str) -> Result<ResolvedAccount, PlatformError>;

    async fn publish(
        &self,
        connection: &OAuthConnection,
        request: &PublishRequest,
    ) -> Result<PublishResult, PlatformError>;
}

/// Media rules checked before any platform call or simulation
pub fn check_media(platform: Platform, media: Option<&PublishMedia>) -> Result<(), PlatformError> {
    match (platform, media.map(|m| m.kind)) {
        (Platform::Instagram, None) => Err(PlatformError::MediaRequired(
            "Instagram posts require an image or video".into(),
        )),
        (Platform::TikTok, Some(AssetKind::Video)) | (Platform::YouTube, Some(AssetKind::Video)) => {
            Ok(())
        }
        (Platform::TikTok, _) => Err(PlatformError::MediaRequired(
            "TikTok posts require a video".into(),
        )),
        (Platform::YouTube, _) => Err(PlatformError::MediaRequired(
            "YouTube uploads require a video".into(),
        )),
        _ => Ok(()),
    }
}

/// Publishers and endpoints for every platform
pub struct PlatformRegistry {
    endpoints: HashMap<Platform, PlatformEndpoints>,
    publishers: HashMap<Platform, Arc<dyn Publisher>>,
}

impl PlatformRegistry {
    pub fn from_config(config: &PlatformsConfig, client: reqwest::Client) -> Self {
        let endpoints: HashMap<Platform, PlatformEndpoints> = Platform::ALL
            .into_iter()
            .map(|p| (p, PlatformEndpoints::for_platform(p, config.get(p))))
            .collect();

        let mut publishers: HashMap<Platform, Arc<dyn Publisher>> = HashMap::new();
        for (platform, e) in &endpoints {
            let publisher: Arc<dyn Publisher> = match platform {
                Platform::Facebook => Arc::new(FacebookPublisher::new(client.clone(), &e.api_base)),
                Platform::Instagram => {
                    Arc::new(InstagramPublisher::new(client.clone(), &e.api_base))
                }
                Platform::TikTok => Arc::new(TikTokPublisher::new(client.clone(), &e.api_base)),
                Platform::YouTube => Arc::new(YouTubePublisher::new(
                    client.clone(),
                    &e.api_base,
                    &e.upload_base,
                )),
            };
            publishers.insert(*platform, publisher);
        }

        Self {
            endpoints,
            publishers,
        }
    }

    /// Replace one platform's publisher
    pub fn with_publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publishers.insert(publisher.platform(), publisher);
        self
    }

    pub fn endpoints(&self, platform: Platform) -> &PlatformEndpoints {
        &self.endpoints[&platform]
    }

    pub fn publisher(&self, platform: Platform) -> Arc<dyn Publisher> {
        Arc::clone(&self.publishers[&platform])
    }
}

/// Turn a non-2xx response into `PlatformError::Api`, logging the body
pub(crate) async fn ensure_success(
    platform: Platform,
    response: reqwest::Response,
) -> Result<reqwest::Response, PlatformError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::error!(%platform, status = %status, body = %body, "Platform API returned error");
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .or_else(|| v.get("error_description"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or(body);
    Err(PlatformError::Api {
        status: status.as_u16(),
        message,
    })
}

pub(crate) async fn parse_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, PlatformError> {
    response
        .json()
        .await
        .map_err(|e| PlatformError::Parse(e.to_string()))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_apply() {
        let config = PlatformConfig {
            token_url: Some("http://127.0.0.1:9/token".into()),
            api_base: Some("http://127.0.0.1:9/api/".into()),
            ..Default::default()
        };
        let endpoints = PlatformEndpoints::for_platform(Platform::YouTube, &config);
        assert_eq!(endpoints.token_url, "http://127.0.0.1:9/token");
        assert_eq!(endpoints.api_base, "http://127.0.0.1:9/api");
        assert_eq!(
            endpoints.authorize_url,
            "https://accounts.google.com/o/oauth2/v2/auth"
        );
    }

    #[test]
    fn test_scope_separator() {
        let tiktok = PlatformEndpoints::for_platform(Platform::TikTok, &PlatformConfig::default());
        assert_eq!(tiktok.scope(), "user.info.basic,video.publish");
        assert_eq!(tiktok.client_id_param, "client_key");

        let youtube = PlatformEndpoints::for_platform(Platform::YouTube, &PlatformConfig::default());
        assert!(youtube.scope().contains(' '));
    }

    #[test]
    fn test_media_requirements() {
        let image = PublishMedia {
            kind: AssetKind::Image,
            url: "https://x/a.png".into(),
        };
        let video = PublishMedia {
            kind: AssetKind::Video,
            url: "https://x/a.mp4".into(),
        };

        assert!(check_media(Platform::Facebook, None).is_ok());
        assert!(check_media(Platform::Instagram, None).is_err());
        assert!(check_media(Platform::Instagram, Some(&image)).is_ok());
        assert!(check_media(Platform::TikTok, Some(&image)).is_err());
        assert!(check_media(Platform::TikTok, Some(&video)).is_ok());
        assert!(check_media(Platform::YouTube, None).is_err());
        assert!(check_media(Platform::YouTube, Some(&video)).is_ok());
    }

    #[test]
    fn test_registry_has_every_platform() {
        let registry =
            PlatformRegistry::from_config(&PlatformsConfig::default(), reqwest::Client::new());
        for platform in Platform::ALL {
            assert_eq!(registry.publisher(platform).platform(), platform);
            registry.endpoints(platform);
        }
    }
}
