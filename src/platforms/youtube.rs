//! YouTube Data API v3 uploads
//!
//! Uses the resumable upload protocol: open a session with the metadata, then
//! PUT the video bytes to the session URL returned in `Location`.

use super::{
    ensure_success, parse_json, PlatformError, PublishRequest, PublishResult, Publisher,
    ResolvedAccount,
};
use crate::models::{truncate_chars, AssetKind, OAuthConnection, Platform};
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

const MAX_TITLE_CHARS: usize = 100;
const MAX_DESCRIPTION_CHARS: usize = 5000;
const DEFAULT_VIDEO_TYPE: &str = "video/mp4";

#[derive(Deserialize)]
struct Channels {
    #[serde(default)]
    items: Vec<Channel>,
}

#[derive(Deserialize)]
struct Channel {
    id: String,
    #[serde(default)]
    snippet: Option<ChannelSnippet>,
}

#[derive(Deserialize)]
struct ChannelSnippet {
    #[serde(default)]
    title: Option<String>,
}

#[derive(Deserialize)]
struct Video {
    id: String,
}

pub struct YouTubePublisher {
    client: reqwest::Client,
    api_base: String,
    upload_base: String,
}

impl YouTubePublisher {
    pub fn new(client: reqwest::Client, api_base: &str, upload_base: &str) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            upload_base: upload_base.trim_end_matches('/').to_string(),
        }
    }

    async fn open_session(
        &self,
        token: &str,
        request: &PublishRequest,
        content_type: &str,
    ) -> Result<String, PlatformError> {
        let tags: Vec<&str> = request
            .hashtags
            .iter()
            .map(|t| t.trim_start_matches('#'))
            .filter(|t| !t.is_empty())
            .collect();
        let metadata = json!({
            "snippet": {
                "title": truncate_chars(&request.title, MAX_TITLE_CHARS),
                "description": truncate_chars(&request.caption, MAX_DESCRIPTION_CHARS),
                "tags": tags,
            },
            "status": { "privacyStatus": "public" },
        });

        let response = self
            .client
            .post(format!("{}/upload/youtube/v3/videos", self.upload_base))
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .bearer_auth(token)
            .header("X-Upload-Content-Type", content_type)
            .json(&metadata)
            .send()
            .await?;
        let response = ensure_success(Platform::YouTube, response).await?;

        response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| PlatformError::Parse("upload session has no Location header".into()))
    }
}

#[async_trait]
impl Publisher for YouTubePublisher {
    fn platform(&self) -> Platform {
        Platform::YouTube
    }

    async fn resolve_account(&self, access_token: &str) -> Result<ResolvedAccount, PlatformError> {
        let response = self
            .client
            .get(format!("{}/channels", self.api_base))
            .query(&[("part", "snippet"), ("mine", "true")])
            .bearer_auth(access_token)
            .send()
            .await?;
        let channels: Channels = parse_json(ensure_success(Platform::YouTube, response).await?).await?;

        let channel = channels
            .items
            .into_iter()
            .next()
            .ok_or_else(|| PlatformError::NoAccount("this Google account has no YouTube channel".into()))?;

        Ok(ResolvedAccount {
            account_id: channel.id,
            account_name: channel.snippet.and_then(|s| s.title),
            access_token: None,
        })
    }

    #[instrument(skip(self, connection, request), fields(channel = %connection.account_id))]
    async fn publish(
        &self,
        connection: &OAuthConnection,
        request: &PublishRequest,
    ) -> Result<PublishResult, PlatformError> {
        let video = request
            .media
            .as_ref()
            .filter(|m| m.kind == AssetKind::Video)
            .ok_or_else(|| PlatformError::MediaRequired("YouTube uploads require a video".into()))?;

        let download = self.client.get(&video.url).send().await?;
        let download = ensure_success(Platform::YouTube, download).await?;
        let content_type = download
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|ct| ct.starts_with("video/"))
            .unwrap_or(DEFAULT_VIDEO_TYPE)
            .to_string();
        let bytes = download.bytes().await?;

        let session_url = self
            .open_session(&connection.access_token, request, &content_type)
            .await?;
        debug!(size = bytes.len(), "Uploading video to YouTube");

        let response = self
            .client
            .put(&session_url)
            .bearer_auth(&connection.access_token)
            .header(CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;
        let uploaded: Video = parse_json(ensure_success(Platform::YouTube, response).await?).await?;

        Ok(PublishResult {
            url: Some(format!("https://www.youtube.com/watch?v={}", uploaded.id)),
            external_id: uploaded.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::test_support::{connection, request};
    use crate::test_support::spawn_fake;
    use axum::body::Bytes;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::{get, post, put};
    use axum::{Json, Router};
    use serde_json::Value;

    const VIDEO: &[u8] = b"\x00\x00\x00\x18ftypmp42 fake video";

    fn fake() -> Router {
        Router::new()
            .route(
                "/channels",
                get(|| async {
                    Json(json!({"items": [{"id": "UC123", "snippet": {"title": "Night Owl"}}]}))
                }),
            )
            .route(
                "/media/clip.mp4",
                get(|| async { ([(CONTENT_TYPE, "video/mp4")], VIDEO) }),
            )
            .route(
                "/upload/youtube/v3/videos",
                post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                    assert_eq!(headers["x-upload-content-type"], "video/mp4");
                    assert_eq!(body["snippet"]["tags"][0], "coffee");
                    assert_eq!(body["status"]["privacyStatus"], "public");
                    let host = headers["host"].to_str().unwrap_or_default().to_string();
                    let location = format!("http://{}/upload-session/s1", host);
                    (StatusCode::OK, [(LOCATION, location)]).into_response()
                }),
            )
            .route(
                "/upload-session/s1",
                put(|body: Bytes| async move {
                    assert_eq!(&body[..], VIDEO);
                    Json(json!({"id": "vid-9"}))
                }),
            )
    }

    #[tokio::test]
    async fn test_resolve_channel() {
        let base = spawn_fake(fake()).await;
        let publisher = YouTubePublisher::new(reqwest::Client::new(), &base, &base);

        let account = publisher.resolve_account("yt-token").await.unwrap();
        assert_eq!(account.account_id, "UC123");
        assert_eq!(account.account_name.as_deref(), Some("Night Owl"));
    }

    #[tokio::test]
    async fn test_resumable_upload() {
        let base = spawn_fake(fake()).await;
        let publisher = YouTubePublisher::new(reqwest::Client::new(), &base, &base);
        let video_url = format!("{}/media/clip.mp4", base);

        let result = publisher
            .publish(
                &connection(Platform::YouTube, "UC123"),
                &request(Some((AssetKind::Video, video_url.as_str()))),
            )
            .await
            .unwrap();
        assert_eq!(result.external_id, "vid-9");
        assert_eq!(result.url.as_deref(), Some("https://www.youtube.com/watch?v=vid-9"));
    }

    #[tokio::test]
    async fn test_missing_video_is_rejected() {
        let publisher =
            YouTubePublisher::new(reqwest::Client::new(), "http://127.0.0.1:9", "http://127.0.0.1:9");
        let err = publisher
            .publish(&connection(Platform::YouTube, "UC123"), &request(None))
            .await
            .unwrap_err();
        assert!(matches!(err, PlatformError::MediaRequired(_)));
    }
}
