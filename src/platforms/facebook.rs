//! Facebook Page publishing through the Graph API

use super::{
    ensure_success, parse_json, PlatformError, PublishRequest, PublishResult, Publisher,
    ResolvedAccount,
};
use crate::models::{AssetKind, OAuthConnection, Platform};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

#[derive(Deserialize)]
struct Pages {
    #[serde(default)]
    data: Vec<Page>,
}

#[derive(Deserialize)]
struct Page {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

#[derive(Deserialize)]
struct PostResponse {
    id: String,
    /// Photo uploads return the photo id plus the feed post id
    #[serde(default)]
    post_id: Option<String>,
}

pub struct FacebookPublisher {
    client: reqwest::Client,
    api_base: String,
}

impl FacebookPublisher {
    pub fn new(client: reqwest::Client, api_base: &str) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Publisher for FacebookPublisher {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    /// Posts go out as the first managed page, with its page token
    async fn resolve_account(&self, access_token: &str) -> Result<ResolvedAccount, PlatformError> {
        let response = self
            .client
            .get(format!("{}/me/accounts", self.api_base))
            .query(&[("fields", "id,name,access_token"), ("access_token", access_token)])
            .send()
            .await?;
        let pages: Pages = parse_json(ensure_success(Platform::Facebook, response).await?).await?;

        let page = pages
            .data
            .into_iter()
            .next()
            .ok_or_else(|| PlatformError::NoAccount("no Facebook page is managed by this account".into()))?;

        Ok(ResolvedAccount {
            account_id: page.id,
            account_name: page.name,
            access_token: page.access_token,
        })
    }

    #[instrument(skip(self, connection, request), fields(page = %connection.account_id))]
    async fn publish(
        &self,
        connection: &OAuthConnection,
        request: &PublishRequest,
    ) -> Result<PublishResult, PlatformError> {
        let page = &connection.account_id;
        let token = connection.access_token.as_str();

        let builder = match &request.media {
            Some(media) if media.kind == AssetKind::Image => self
                .client
                .post(format!("{}/{}/photos", self.api_base, page))
                .form(&[
                    ("url", media.url.as_str()),
                    ("caption", request.caption.as_str()),
                    ("access_token", token),
                ]),
            Some(media) => self
                .client
                .post(format!("{}/{}/videos", self.api_base, page))
                .form(&[
                    ("file_url", media.url.as_str()),
                    ("description", request.caption.as_str()),
                    ("access_token", token),
                ]),
            None => self
                .client
                .post(format!("{}/{}/feed", self.api_base, page))
                .form(&[("message", request.caption.as_str()), ("access_token", token)]),
        };

        let response = ensure_success(Platform::Facebook, builder.send().await?).await?;
        let post: PostResponse = parse_json(response).await?;
        let external_id = post.post_id.unwrap_or(post.id);
        debug!(external_id = %external_id, "Facebook post created");

        Ok(PublishResult {
            url: Some(format!("https://www.facebook.com/{}", external_id)),
            external_id,
        })
    }
}
