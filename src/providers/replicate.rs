//! Replicate predictions (images and video)
//!
//! A prediction is created and then polled until it reaches a terminal
//! status. Polling stops after `max_polls` attempts.

use super::{ensure_success, GenerationProvider, MediaOutput, ProviderError, ProviderKind};
use crate::config::ProviderConfig;
use crate::models::GenerationKind;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument, warn};

const DEFAULT_BASE_URL: &str = "https://api.replicate.com";
const DEFAULT_IMAGE_MODEL: &str =
    "stability-ai/sdxl:39ed52f2a78e934b3ba6e2a89f5b1c712de7dfea535525255b1aa35c5565e08b";
const DEFAULT_VIDEO_MODEL: &str =
    "anotherjesse/zeroscope-v2-xl:9f747673945c62801b13b84701c783929c0ee784e4748ec062204894dda1a351";

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Value,
    #[serde(default)]
    error: Value,
}

impl Prediction {
    fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "succeeded" | "failed" | "canceled")
    }

    /// Output is a URL string or a list whose first element is one
    fn output_url(&self) -> Option<String> {
        match &self.output {
            Value::String(url) => Some(url.clone()),
            Value::Array(items) => items.first().and_then(|v| v.as_str()).map(str::to_string),
            _ => None,
        }
        .filter(|url| !url.is_empty())
    }

    fn error_message(&self) -> String {
        match &self.error {
            Value::String(message) => message.clone(),
            Value::Null => format!("prediction {}", self.status),
            other => other.to_string(),
        }
    }
}

pub struct ReplicateProvider {
    client: reqwest::Client,
    api_token: String,
    base_url: String,
    image_model: String,
    video_model: String,
    poll_interval: Duration,
    max_polls: u32,
}

impl ReplicateProvider {
    pub fn new(
        client: reqwest::Client,
        config: &ProviderConfig,
        poll_interval: Duration,
        max_polls: u32,
    ) -> Self {
        Self {
            client,
            api_token: config.api_key.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            image_model: config
                .image_model
                .clone()
                .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
            video_model: config
                .video_model
                .clone()
                .unwrap_or_else(|| DEFAULT_VIDEO_MODEL.to_string()),
            poll_interval,
            max_polls,
        }
    }

    #[instrument(skip(self, prompt))]
    async fn run(&self, model: &str, prompt: &str) -> Result<MediaOutput, ProviderError> {
        debug!("Creating prediction");
        let response = self
            .client
            .post(format!("{}/v1/predictions", self.base_url))
            .bearer_auth(&self.api_token)
            .json(&json!({ "version": model, "input": { "prompt": prompt } }))
            .send()
            .await?;
        let mut prediction = parse_prediction(ensure_success(self.kind(), response).await?).await?;

        let mut polls = 0;
        while !prediction.is_terminal() {
            if polls >= self.max_polls {
                warn!(prediction_id = %prediction.id, polls, "Prediction did not finish in time");
                return Err(ProviderError::Timeout);
            }
            polls += 1;
            tokio::time::sleep(self.poll_interval).await;

            let response = self
                .client
                .get(format!("{}/v1/predictions/{}", self.base_url, prediction.id))
                .bearer_auth(&self.api_token)
                .send()
                .await?;
            prediction = parse_prediction(ensure_success(self.kind(), response).await?).await?;
            debug!(prediction_id = %prediction.id, status = %prediction.status, "Polled prediction");
        }

        if prediction.status != "succeeded" {
            return Err(ProviderError::PredictionFailed(prediction.error_message()));
        }

        let url = prediction.output_url().ok_or(ProviderError::EmptyResponse)?;
        Ok(MediaOutput {
            url,
            model: model.to_string(),
        })
    }
}

async fn parse_prediction(response: reqwest::Response) -> Result<Prediction, ProviderError> {
    response
        .json()
        .await
        .map_err(|e| ProviderError::Parse(e.to_string()))
}

#[async_trait]
impl GenerationProvider for ReplicateProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Replicate
    }

    fn supports(&self, kind: GenerationKind) -> bool {
        matches!(kind, GenerationKind::Image | GenerationKind::Video)
    }

    async fn generate_image(&self, prompt: &str) -> Result<MediaOutput, ProviderError> {
        self.run(&self.image_model, prompt).await
    }

    async fn generate_video(&self, prompt: &str) -> Result<MediaOutput, ProviderError> {
        self.run(&self.video_model, prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::spawn_fake;
    use axum::extract::{Path, State};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn provider(base_url: String, max_polls: u32) -> ReplicateProvider {
        ReplicateProvider::new(
            reqwest::Client::new(),
            &ProviderConfig {
                api_key: "r8_test".into(),
                base_url: Some(base_url),
                video_model: Some("owner/video:v1".into()),
                ..Default::default()
            },
            Duration::from_millis(5),
            max_polls,
        )
    }

    /// Fake that reports `processing` until polled `finish_after` times
    fn fake(finish_after: u32, terminal: Value) -> Router {
        let polls = Arc::new(AtomicU32::new(0));
        Router::new()
            .route(
                "/v1/predictions",
                post(|Json(body): Json<Value>| async move {
                    assert_eq!(body["input"]["prompt"], "A sunrise");
                    Json(json!({"id": "p1", "status": "starting", "output": null}))
                }),
            )
            .route(
                "/v1/predictions/{id}",
                get(
                    move |State(polls): State<Arc<AtomicU32>>, Path(id): Path<String>| {
                        let terminal = terminal.clone();
                        async move {
                            assert_eq!(id, "p1");
                            if polls.fetch_add(1, Ordering::SeqCst) + 1 < finish_after {
                                Json(json!({"id": "p1", "status": "processing"}))
                            } else {
                                Json(terminal)
                            }
                        }
                    },
                ),
            )
            .with_state(polls)
    }

    #[tokio::test]
    async fn test_polls_until_succeeded() {
        let base = spawn_fake(fake(
            3,
            json!({"id": "p1", "status": "succeeded", "output": ["https://replicate.delivery/v.mp4"]}),
        ))
        .await;

        let output = provider(base, 10).generate_video("A sunrise").await.unwrap();
        assert_eq!(output.url, "https://replicate.delivery/v.mp4");
        assert_eq!(output.model, "owner/video:v1");
    }

    #[tokio::test]
    async fn test_failed_prediction() {
        let base = spawn_fake(fake(
            1,
            json!({"id": "p1", "status": "failed", "error": "NSFW content detected"}),
        ))
        .await;

        match provider(base, 10).generate_image("A sunrise").await {
            Err(ProviderError::PredictionFailed(message)) => {
                assert_eq!(message, "NSFW content detected")
            }
            other => panic!("unexpected result: {:?}", other.map(|o| o.url)),
        }
    }

    #[tokio::test]
    async fn test_gives_up_after_max_polls() {
        let base = spawn_fake(fake(100, json!({"id": "p1", "status": "succeeded"}))).await;

        assert!(matches!(
            provider(base, 2).generate_image("A sunrise").await,
            Err(ProviderError::Timeout)
        ));
    }

    #[test]
    fn test_output_url_shapes() {
        let prediction = |output: Value| Prediction {
            id: "p".into(),
            status: "succeeded".into(),
            output,
            error: Value::Null,
        };
        assert_eq!(
            prediction(json!("https://a/x.png")).output_url().as_deref(),
            Some("https://a/x.png")
        );
        assert_eq!(
            prediction(json!(["https://a/1.png", "https://a/2.png"]))
                .output_url()
                .as_deref(),
            Some("https://a/1.png")
        );
        assert!(prediction(json!({"weird": true})).output_url().is_none());
        assert!(prediction(Value::Null).output_url().is_none());
    }
}
