//! AI generation providers
//!
//! Each provider wraps one vendor API behind `GenerationProvider`. The
//! `ProviderRegistry` holds the providers that have credentials and picks
//! one per request.

mod copy;
pub mod gemini;
pub mod openai;
pub mod replicate;

pub use copy::parse_generated_copy;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
pub use replicate::ReplicateProvider;

use crate::config::ProvidersConfig;
use crate::models::{AssetKind, GenerationKind};
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Gemini,
    Replicate,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::Replicate => "replicate",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "gemini" => Ok(Self::Gemini),
            "replicate" => Ok(Self::Replicate),
            _ => Err(anyhow::anyhow!("Invalid provider: {}", s)),
        }
    }
}

/// Text returned by a provider
#[derive(Debug, Clone, PartialEq)]
pub struct TextOutput {
    pub text: String,
    pub model: String,
}

/// Location of media produced by a provider
#[derive(Debug, Clone, PartialEq)]
pub struct MediaOutput {
    pub url: String,
    pub model: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{provider} does not support {kind} generation")]
    Unsupported {
        provider: ProviderKind,
        kind: GenerationKind,
    },

    #[error("Provider API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse provider response: {0}")]
    Parse(String),

    #[error("Provider returned no output")]
    EmptyResponse,

    #[error("Provider request failed: {0}")]
    Http(String),

    #[error("Provider request timed out")]
    Timeout,

    #[error("Prediction failed: {0}")]
    PredictionFailed(String),

    #[error("No provider configured for {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(e.to_string())
        }
    }
}

/// A vendor that can produce copy and/or media
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn supports(&self, kind: GenerationKind) -> bool;

    async fn generate_text(&self, _prompt: &str) -> Result<TextOutput, ProviderError> {
        Err(ProviderError::Unsupported {
            provider: self.kind(),
            kind: GenerationKind::Text,
        })
    }

    async fn generate_image(&self, _prompt: &str) -> Result<MediaOutput, ProviderError> {
        Err(ProviderError::Unsupported {
            provider: self.kind(),
            kind: GenerationKind::Image,
        })
    }

    async fn generate_video(&self, _prompt: &str) -> Result<MediaOutput, ProviderError> {
        Err(ProviderError::Unsupported {
            provider: self.kind(),
            kind: GenerationKind::Video,
        })
    }
}

/// Configured providers, in order of preference
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn GenerationProvider>>,
}

impl ProviderRegistry {
    /// Build every provider that has an API key
    pub fn from_config(config: &ProvidersConfig) -> anyhow::Result<Self> {
        let client = http_client(Duration::from_secs(config.timeout_seconds))?;
        let mut providers: Vec<Arc<dyn GenerationProvider>> = Vec::new();

        if config.openai.is_configured() {
            providers.push(Arc::new(OpenAiProvider::new(client.clone(), &config.openai)));
        }
        if config.gemini.is_configured() {
            providers.push(Arc::new(GeminiProvider::new(client.clone(), &config.gemini)));
        }
        if config.replicate.is_configured() {
            providers.push(Arc::new(ReplicateProvider::new(
                client,
                &config.replicate,
                Duration::from_millis(config.poll_interval_ms),
                config.max_polls,
            )));
        }

        let names: Vec<&str> = providers.iter().map(|p| p.kind().as_str()).collect();
        tracing::info!("AI providers configured: {:?}", names);

        Ok(Self { providers })
    }

    pub fn with_providers(providers: Vec<Arc<dyn GenerationProvider>>) -> Self {
        Self { providers }
    }

    /// Provider kinds with the generation kinds each supports
    pub fn capabilities(&self) -> Vec<(ProviderKind, Vec<GenerationKind>)> {
        const ALL: [GenerationKind; 3] = [
            GenerationKind::Text,
            GenerationKind::Image,
            GenerationKind::Video,
        ];
        self.providers
            .iter()
            .map(|p| {
                let kinds = ALL.into_iter().filter(|k| p.supports(*k)).collect();
                (p.kind(), kinds)
            })
            .collect()
    }

    pub fn text_provider(
        &self,
        preferred: Option<ProviderKind>,
    ) -> Result<Arc<dyn GenerationProvider>, ProviderError> {
        self.select(GenerationKind::Text, preferred)
    }

    pub fn media_provider(
        &self,
        kind: AssetKind,
        preferred: Option<ProviderKind>,
    ) -> Result<Arc<dyn GenerationProvider>, ProviderError> {
        self.select(kind.into(), preferred)
    }

    /// The preferred provider if it can do `kind`, else the first that can
    fn select(
        &self,
        kind: GenerationKind,
        preferred: Option<ProviderKind>,
    ) -> Result<Arc<dyn GenerationProvider>, ProviderError> {
        let capable: Vec<&Arc<dyn GenerationProvider>> = self
            .providers
            .iter()
            .filter(|p| p.supports(kind))
            .collect();

        preferred
            .and_then(|want| capable.iter().find(|p| p.kind() == want))
            .or_else(|| capable.first())
            .map(|p| Arc::clone(*p))
            .ok_or_else(|| ProviderError::NotConfigured(format!("{} generation", kind)))
    }
}

/// Shared outbound client for provider calls
pub(crate) fn http_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("adloom/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")
}

/// Turn a non-2xx response into `ProviderError::Api`, logging the body
pub(crate) async fn ensure_success(
    provider: ProviderKind,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::error!(%provider, status = %status, body = %body, "Provider API returned error");
    Err(ProviderError::Api {
        status: status.as_u16(),
        message: api_error_message(&body),
    })
}

/// Vendor error bodies nest the message differently; fall back to the raw body
fn api_error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.to_string();
    };
    value
        .pointer("/error/message")
        .or_else(|| value.get("detail"))
        .or_else(|| value.get("error"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scripted provider for service tests

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub struct FakeProvider {
        pub kind: ProviderKind,
        pub supports: Vec<GenerationKind>,
        pub text: Result<String, u16>,
        pub media_url: Result<String, u16>,
        pub calls: AtomicUsize,
    }

    impl FakeProvider {
        pub fn text(text: &str) -> Self {
            Self {
                kind: ProviderKind::OpenAi,
                supports: vec![GenerationKind::Text],
                text: Ok(text.to_string()),
                media_url: Err(500),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn media(url: &str) -> Self {
            Self {
                kind: ProviderKind::Replicate,
                supports: vec![GenerationKind::Image, GenerationKind::Video],
                text: Err(500),
                media_url: Ok(url.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing(kind: ProviderKind, supports: Vec<GenerationKind>) -> Self {
            Self {
                kind,
                supports,
                text: Err(503),
                media_url: Err(503),
                calls: AtomicUsize::new(0),
            }
        }

        fn fail(status: u16) -> ProviderError {
            ProviderError::Api {
                status,
                message: "scripted failure".into(),
            }
        }
    }

    #[async_trait]
    impl GenerationProvider for FakeProvider {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        fn supports(&self, kind: GenerationKind) -> bool {
            self.supports.contains(&kind)
        }

        async fn generate_text(&self, _prompt: &str) -> Result<TextOutput, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.text {
                Ok(text) => Ok(TextOutput {
                    text: text.clone(),
                    model: "fake-text".into(),
                }),
                Err(status) => Err(Self::fail(*status)),
            }
        }

        async fn generate_image(&self, _prompt: &str) -> Result<MediaOutput, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.media_url {
                Ok(url) => Ok(MediaOutput {
                    url: url.clone(),
                    model: "fake-image".into(),
                }),
                Err(status) => Err(Self::fail(*status)),
            }
        }

        async fn generate_video(&self, _prompt: &str) -> Result<MediaOutput, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.media_url {
                Ok(url) => Ok(MediaOutput {
                    url: url.clone(),
                    model: "fake-video".into(),
                }),
                Err(status) => Err(Self::fail(*status)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeProvider;
    use super::*;

    fn registry() -> ProviderRegistry {
        ProviderRegistry::with_providers(vec![
            Arc::new(FakeProvider::text("copy")),
            Arc::new(FakeProvider::failing(
                ProviderKind::Gemini,
                vec![GenerationKind::Text],
            )),
            Arc::new(FakeProvider::media("https://cdn.example.com/a.png")),
        ])
    }

    #[test]
    fn test_select_prefers_requested_provider() {
        let registry = registry();
        assert_eq!(
            registry.text_provider(Some(ProviderKind::Gemini)).unwrap().kind(),
            ProviderKind::Gemini
        );
        assert_eq!(registry.text_provider(None).unwrap().kind(), ProviderKind::OpenAi);
    }

    #[test]
    fn test_select_falls_back_when_preferred_cannot() {
        let registry = registry();
        let provider = registry
            .media_provider(AssetKind::Video, Some(ProviderKind::OpenAi))
            .unwrap();
        assert_eq!(provider.kind(), ProviderKind::Replicate);
    }

    #[test]
    fn test_nothing_configured() {
        let registry = ProviderRegistry::with_providers(vec![]);
        assert!(matches!(
            registry.text_provider(None),
            Err(ProviderError::NotConfigured(_))
        ));
        assert!(ProviderRegistry::from_config(&ProvidersConfig::default())
            .unwrap()
            .capabilities()
            .is_empty());
    }

    #[tokio::test]
    async fn test_default_methods_are_unsupported() {
        let provider = FakeProvider::text("copy");
        struct TextOnly(FakeProvider);
        #[async_trait]
        impl GenerationProvider for TextOnly {
            fn kind(&self) -> ProviderKind {
                self.0.kind
            }
            fn supports(&self, kind: GenerationKind) -> bool {
                self.0.supports(kind)
            }
        }

        let result = TextOnly(provider).generate_video("a video").await;
        assert!(matches!(
            result,
            Err(ProviderError::Unsupported {
                provider: ProviderKind::OpenAi,
                kind: GenerationKind::Video
            })
        ));
    }

    #[test]
    fn test_api_error_message_extraction() {
        assert_eq!(
            api_error_message(r#"{"error":{"message":"bad key"}}"#),
            "bad key"
        );
        assert_eq!(api_error_message(r#"{"detail":"not found"}"#), "not found");
        assert_eq!(api_error_message("plain text"), "plain text");
    }

    #[test]
    fn test_provider_kind_names() {
        assert_eq!("OpenAI".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!(serde_json::to_string(&ProviderKind::OpenAi).unwrap(), "\"openai\"");
    }
}
