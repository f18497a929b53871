//! Instagram business account publishing
//!
//! Publishing is two calls: create a media container from a public URL, then
//! publish the container. Video containers are processed asynchronously, so
//! their status is polled until Instagram reports them finished.

use super::{
    ensure_success, parse_json, PlatformError, PublishRequest, PublishResult, Publisher,
    ResolvedAccount,
};
use crate::models::{AssetKind, OAuthConnection, Platform};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

const CONTAINER_POLL_INTERVAL: Duration = Duration::from_secs(3);
const CONTAINER_MAX_POLLS: u32 = 40;

#[derive(Deserialize)]
struct Pages {
    #[serde(default)]
    data: Vec<Page>,
}

#[derive(Deserialize)]
struct Page {
    #[serde(default)]
    instagram_business_account: Option<BusinessAccount>,
}

#[derive(Deserialize)]
struct BusinessAccount {
    id: String,
    #[serde(default)]
    username: Option<String>,
}

#[derive(Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Deserialize)]
struct ContainerStatus {
    #[serde(default)]
    status_code: Option<String>,
}

pub struct InstagramPublisher {
    client: reqwest::Client,
    api_base: String,
    poll_interval: Duration,
    max_polls: u32,
}

impl InstagramPublisher {
    pub fn new(client: reqwest::Client, api_base: &str) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            poll_interval: CONTAINER_POLL_INTERVAL,
            max_polls: CONTAINER_MAX_POLLS,
        }
    }

    pub fn with_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }

    async fn wait_until_ready(&self, container_id: &str, token: &str) -> Result<(), PlatformError> {
        for _ in 0..self.max_polls {
            let response = self
                .client
                .get(format!("{}/{}", self.api_base, container_id))
                .query(&[("fields", "status_code"), ("access_token", token)])
                .send()
                .await?;
            let status: ContainerStatus =
                parse_json(ensure_success(Platform::Instagram, response).await?).await?;

            match status.status_code.as_deref() {
                Some("FINISHED") | None => return Ok(()),
                Some("ERROR") | Some("EXPIRED") => {
                    return Err(PlatformError::Api {
                        status: 422,
                        message: format!("Instagram could not process media container {}", container_id),
                    })
                }
                Some(other) => debug!(container_id, status = other, "Container not ready"),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        Err(PlatformError::Timeout(format!("Instagram container {}", container_id)))
    }
}

#[async_trait]
impl Publisher for InstagramPublisher {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    /// The business account linked to the first page that has one
    async fn resolve_account(&self, access_token: &str) -> Result<ResolvedAccount, PlatformError> {
        let response = self
            .client
            .get(format!("{}/me/accounts", self.api_base))
            .query(&[
                ("fields", "id,name,instagram_business_account{id,username}"),
                ("access_token", access_token),
            ])
            .send()
            .await?;
        let pages: Pages = parse_json(ensure_success(Platform::Instagram, response).await?).await?;

        let account = pages
            .data
            .into_iter()
            .find_map(|p| p.instagram_business_account)
            .ok_or_else(|| {
                PlatformError::NoAccount("no Instagram business account is linked to a page".into())
            })?;

        Ok(ResolvedAccount {
            account_id: account.id,
            account_name: account.username,
            access_token: None,
        })
    }

    #[instrument(skip(self, connection, request), fields(account = %connection.account_id))]
    async fn publish(
        &self,
        connection: &OAuthConnection,
        request: &PublishRequest,
    ) -> Result<PublishResult, PlatformError> {
        let media = request.media.as_ref().ok_or_else(|| {
            PlatformError::MediaRequired("Instagram posts require an image or video".into())
        })?;
        let account = &connection.account_id;
        let token = connection.access_token.as_str();

        let mut form = vec![("caption", request.caption.as_str()), ("access_token", token)];
        match media.kind {
            AssetKind::Image => form.push(("image_url", media.url.as_str())),
            AssetKind::Video => {
                form.push(("video_url", media.url.as_str()));
                form.push(("media_type", "REELS"));
            }
        }

        let response = self
            .client
            .post(format!("{}/{}/media", self.api_base, account))
            .form(&form)
            .send()
            .await?;
        let container: IdResponse =
            parse_json(ensure_success(Platform::Instagram, response).await?).await?;
        debug!(container_id = %container.id, "Instagram container created");

        if media.kind == AssetKind::Video {
            self.wait_until_ready(&container.id, token).await?;
        }

        let response = self
            .client
            .post(format!("{}/{}/media_publish", self.api_base, account))
            .form(&[("creation_id", container.id.as_str()), ("access_token", token)])
            .send()
            .await?;
        let published: IdResponse =
            parse_json(ensure_success(Platform::Instagram, response).await?).await?;

        Ok(PublishResult {
            external_id: published.id,
            url: None,
        })
    }
}
