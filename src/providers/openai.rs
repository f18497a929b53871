//! OpenAI chat completions (copy) and image generation

use super::{ensure_success, GenerationProvider, MediaOutput, ProviderError, ProviderKind, TextOutput};
use crate::config::ProviderConfig;
use crate::models::GenerationKind;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_TEXT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";
const IMAGE_SIZE: &str = "1024x1024";

const SYSTEM_PROMPT: &str =
    "You are a senior social media copywriter. Follow the requested output format exactly.";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'a str,
}

#[derive(Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    #[serde(default)]
    url: Option<String>,
}

pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    text_model: String,
    image_model: String,
}

impl OpenAiProvider {
    pub fn new(client: reqwest::Client, config: &ProviderConfig) -> Self {
        Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            text_model: config
                .text_model
                .clone()
                .unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string()),
            image_model: config
                .image_model
                .clone()
                .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
        }
    }
}

#[async_trait]
impl GenerationProvider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn supports(&self, kind: GenerationKind) -> bool {
        matches!(kind, GenerationKind::Text | GenerationKind::Image)
    }

    #[instrument(skip(self, prompt), fields(model = %self.text_model))]
    async fn generate_text(&self, prompt: &str) -> Result<TextOutput, ProviderError> {
        debug!("Sending chat completion request");
        let request = ChatRequest {
            model: &self.text_model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let response = ensure_success(self.kind(), response).await?;

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or(ProviderError::EmptyResponse)?;

        Ok(TextOutput {
            text,
            model: self.text_model.clone(),
        })
    }

    #[instrument(skip(self, prompt), fields(model = %self.image_model))]
    async fn generate_image(&self, prompt: &str) -> Result<MediaOutput, ProviderError> {
        debug!("Sending image generation request");
        let request = ImageRequest {
            model: &self.image_model,
            prompt,
            n: 1,
            size: IMAGE_SIZE,
        };

        let response = self
            .client
            .post(format!("{}/v1/images/generations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let response = ensure_success(self.kind(), response).await?;

        let body: ImageResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let url = body
            .data
            .into_iter()
            .find_map(|d| d.url)
            .ok_or(ProviderError::EmptyResponse)?;

        Ok(MediaOutput {
            url,
            model: self.image_model.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::spawn_fake;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    fn provider(base_url: String) -> OpenAiProvider {
        OpenAiProvider::new(
            reqwest::Client::new(),
            &ProviderConfig {
                api_key: "sk-test".into(),
                base_url: Some(base_url),
                ..Default::default()
            },
        )
    }

    async fn chat(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer sk-test") {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": {"message": "Incorrect API key"}})),
            );
        }
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][1]["content"], "Write copy");
        (
            StatusCode::OK,
            Json(json!({"choices": [{"message": {"role": "assistant", "content": "{\"headline\":\"Hi\"}"}}]})),
        )
    }

    #[tokio::test]
    async fn test_generate_text() {
        let base = spawn_fake(Router::new().route("/v1/chat/completions", post(chat))).await;

        let output = provider(base).generate_text("Write copy").await.unwrap();
        assert_eq!(output.text, "{\"headline\":\"Hi\"}");
        assert_eq!(output.model, "gpt-4o-mini");
    }

    #[tokio::test]
    async fn test_api_error_carries_status_and_message() {
        let base = spawn_fake(Router::new().route("/v1/chat/completions", post(chat))).await;
        let mut bad = provider(base);
        bad.api_key = "wrong".into();

        match bad.generate_text("Write copy").await {
            Err(ProviderError::Api { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "Incorrect API key");
            }
            other => panic!("unexpected result: {:?}", other.map(|o| o.text)),
        }
    }

    #[tokio::test]
    async fn test_generate_image() {
        let router = Router::new().route(
            "/v1/images/generations",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["model"], "dall-e-3");
                Json(json!({"data": [{"url": "https://images.example.com/1.png"}]}))
            }),
        );
        let base = spawn_fake(router).await;

        let output = provider(base).generate_image("A mug").await.unwrap();
        assert_eq!(output.url, "https://images.example.com/1.png");
    }

    #[tokio::test]
    async fn test_empty_and_malformed_responses() {
        let router = Router::new()
            .route(
                "/v1/chat/completions",
                post(|| async { Json(json!({"choices": []})) }),
            )
            .route("/v1/images/generations", post(|| async { "not json" }));
        let base = spawn_fake(router).await;
        let provider = provider(base);

        assert!(matches!(
            provider.generate_text("x").await,
            Err(ProviderError::EmptyResponse)
        ));
        assert!(matches!(
            provider.generate_image("x").await,
            Err(ProviderError::Parse(_))
        ));
        assert!(provider.supports(GenerationKind::Image));
        assert!(!provider.supports(GenerationKind::Video));
    }
}
