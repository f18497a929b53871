//! TikTok Content Posting API
//!
//! Videos are pulled by TikTok from our hosted URL, so the domain serving
//! media must be verified in the TikTok developer portal.

use super::{
    ensure_success, parse_json, PlatformError, PublishRequest, PublishResult, Publisher,
    ResolvedAccount,
};
use crate::models::{truncate_chars, AssetKind, OAuthConnection, Platform};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

/// TikTok titles are capped at 2200 UTF-16 units; chars is close enough
const MAX_TITLE_CHARS: usize = 2200;

#[derive(Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    error: Option<TikTokError>,
}

#[derive(Deserialize)]
struct TikTokError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct UserData {
    user: UserInfo,
}

#[derive(Deserialize)]
struct UserInfo {
    open_id: String,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Deserialize)]
struct InitData {
    publish_id: String,
}

/// TikTok reports failures inside a 200 body as well
fn unwrap_envelope<T>(envelope: Envelope<T>) -> Result<T, PlatformError> {
    if let Some(error) = envelope.error.filter(|e| !e.code.is_empty() && e.code != "ok") {
        return Err(PlatformError::Api {
            status: 400,
            message: format!("{}: {}", error.code, error.message),
        });
    }
    envelope
        .data
        .ok_or_else(|| PlatformError::Parse("TikTok response has no data".into()))
}

pub struct TikTokPublisher {
    client: reqwest::Client,
    api_base: String,
}

impl TikTokPublisher {
    pub fn new(client: reqwest::Client, api_base: &str) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Publisher for TikTokPublisher {
    fn platform(&self) -> Platform {
        Platform::TikTok
    }

    async fn resolve_account(&self, access_token: &str) -> Result<ResolvedAccount, PlatformError> {
        let response = self
            .client
            .get(format!("{}/v2/user/info/", self.api_base))
            .query(&[("fields", "open_id,display_name")])
            .bearer_auth(access_token)
            .send()
            .await?;
        let envelope: Envelope<UserData> =
            parse_json(ensure_success(Platform::TikTok, response).await?).await?;
        let user = unwrap_envelope(envelope)?.user;

        Ok(ResolvedAccount {
            account_id: user.open_id,
            account_name: user.display_name,
            access_token: None,
        })
    }

    #[instrument(skip(self, connection, request), fields(account = %connection.account_id))]
    async fn publish(
        &self,
        connection: &OAuthConnection,
        request: &PublishRequest,
    ) -> Result<PublishResult, PlatformError> {
        let video = request
            .media
            .as_ref()
            .filter(|m| m.kind == AssetKind::Video)
            .ok_or_else(|| PlatformError::MediaRequired("TikTok posts require a video".into()))?;

        let body = json!({
            "post_info": {
                "title": truncate_chars(&request.caption, MAX_TITLE_CHARS),
                "privacy_level": "PUBLIC_TO_EVERYONE",
            },
            "source_info": {
                "source": "PULL_FROM_URL",
                "video_url": video.url,
            },
        });

        let response = self
            .client
            .post(format!("{}/v2/post/publish/video/init/", self.api_base))
            .bearer_auth(&connection.access_token)
            .json(&body)
            .send()
            .await?;
        let envelope: Envelope<InitData> =
            parse_json(ensure_success(Platform::TikTok, response).await?).await?;
        let init = unwrap_envelope(envelope)?;

        // The post URL is only known after TikTok finishes processing
        Ok(PublishResult {
            external_id: init.publish_id,
            url: None,
        })
    }
}
