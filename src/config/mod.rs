//! Configuration management
//!
//! This module handles loading and parsing configuration for Adloom.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults. Third-party
//! credentials are usually supplied through the environment only.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::models::{GenerationKind, Platform, SubscriptionTier};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Generated media hosting
    #[serde(default)]
    pub media: MediaConfig,
    /// AI providers
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// Social platform OAuth apps
    #[serde(default)]
    pub platforms: PlatformsConfig,
    /// Stripe billing
    #[serde(default)]
    pub billing: BillingConfig,
    /// Credit metering
    #[serde(default)]
    pub credits: CreditsConfig,
    /// Publishing behaviour
    #[serde(default)]
    pub publishing: PublishingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (the SPA)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
    /// Externally reachable base URL, used for OAuth redirect URIs
    #[serde(default = "default_public_url")]
    pub public_url: String,
    /// Generation requests allowed per user per minute
    #[serde(default = "default_generation_per_minute")]
    pub generation_per_minute: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
            public_url: default_public_url(),
            generation_per_minute: default_generation_per_minute(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:5173".to_string()
}

fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_generation_per_minute() -> usize {
    10
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Maximum pool connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_database_url() -> String {
    "data/adloom.db".to_string()
}

fn default_max_connections() -> u32 {
    20
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
}

/// Media hosting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Directory hosted media is written to
    #[serde(default = "default_media_dir")]
    pub dir: PathBuf,
    /// URL prefix the media directory is served under
    #[serde(default = "default_media_prefix")]
    pub public_prefix: String,
    /// Maximum size of a single downloaded asset in bytes (default: 200MB)
    #[serde(default = "default_max_download_bytes")]
    pub max_download_bytes: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            dir: default_media_dir(),
            public_prefix: default_media_prefix(),
            max_download_bytes: default_max_download_bytes(),
        }
    }
}

fn default_media_dir() -> PathBuf {
    PathBuf::from("data/media")
}

fn default_media_prefix() -> String {
    "/media".to_string()
}

fn default_max_download_bytes() -> u64 {
    200 * 1024 * 1024
}

impl MediaConfig {
    /// File extension for a content type
    pub fn extension_for(content_type: &str) -> &'static str {
        match content_type.split(';').next().unwrap_or("").trim() {
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            "video/mp4" => "mp4",
            "video/quicktime" => "mov",
            "video/webm" => "webm",
            _ => "bin",
        }
    }
}

/// A single AI provider account
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key or token
    #[serde(default)]
    pub api_key: String,
    /// Base URL override (tests, proxies)
    #[serde(default)]
    pub base_url: Option<String>,
    /// Text model
    #[serde(default)]
    pub text_model: Option<String>,
    /// Image model (or Replicate model version)
    #[serde(default)]
    pub image_model: Option<String>,
    /// Video model (Replicate model version)
    #[serde(default)]
    pub video_model: Option<String>,
}

impl ProviderConfig {
    /// Whether credentials are present
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

/// AI providers configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openai: ProviderConfig,
    #[serde(default)]
    pub gemini: ProviderConfig,
    #[serde(default)]
    pub replicate: ProviderConfig,
    /// Delay between Replicate prediction polls in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Maximum Replicate polls before giving up
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
    /// Outbound request timeout in seconds
    #[serde(default = "default_provider_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            openai: ProviderConfig::default(),
            gemini: ProviderConfig::default(),
            replicate: ProviderConfig::default(),
            poll_interval_ms: default_poll_interval_ms(),
            max_polls: default_max_polls(),
            timeout_seconds: default_provider_timeout(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_max_polls() -> u32 {
    150
}

fn default_provider_timeout() -> u64 {
    120
}

/// A single social platform OAuth app
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    /// OAuth authorize endpoint override
    #[serde(default)]
    pub authorize_url: Option<String>,
    /// OAuth token endpoint override
    #[serde(default)]
    pub token_url: Option<String>,
    /// API base URL override
    #[serde(default)]
    pub api_base: Option<String>,
    /// Upload base URL override (YouTube)
    #[serde(default)]
    pub upload_base: Option<String>,
}

impl PlatformConfig {
    /// Whether the OAuth app has credentials
    pub fn is_configured(&self) -> bool {
        !self.client_id.trim().is_empty() && !self.client_secret.trim().is_empty()
    }
}

/// Social platforms configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformsConfig {
    #[serde(default)]
    pub facebook: PlatformConfig,
    #[serde(default)]
    pub instagram: PlatformConfig,
    #[serde(default)]
    pub tiktok: PlatformConfig,
    #[serde(default)]
    pub youtube: PlatformConfig,
}

impl PlatformsConfig {
    /// OAuth app for a platform
    pub fn get(&self, platform: Platform) -> &PlatformConfig {
        match platform {
            Platform::Facebook => &self.facebook,
            Platform::Instagram => &self.instagram,
            Platform::TikTok => &self.tiktok,
            Platform::YouTube => &self.youtube,
        }
    }

    fn get_mut(&mut self, platform: Platform) -> &mut PlatformConfig {
        match platform {
            Platform::Facebook => &mut self.facebook,
            Platform::Instagram => &mut self.instagram,
            Platform::TikTok => &mut self.tiktok,
            Platform::YouTube => &mut self.youtube,
        }
    }
}

/// Stripe billing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    #[serde(default)]
    pub stripe_secret_key: String,
    #[serde(default)]
    pub stripe_webhook_secret: String,
    #[serde(default = "default_stripe_api_base")]
    pub api_base: String,
    #[serde(default = "default_success_url")]
    pub success_url: String,
    #[serde(default = "default_cancel_url")]
    pub cancel_url: String,
    /// Stripe price id per paid tier
    #[serde(default)]
    pub prices: HashMap<SubscriptionTier, String>,
    /// Accepted webhook timestamp skew in seconds
    #[serde(default = "default_webhook_tolerance")]
    pub webhook_tolerance_seconds: i64,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            stripe_secret_key: String::new(),
            stripe_webhook_secret: String::new(),
            api_base: default_stripe_api_base(),
            success_url: default_success_url(),
            cancel_url: default_cancel_url(),
            prices: HashMap::new(),
            webhook_tolerance_seconds: default_webhook_tolerance(),
        }
    }
}

fn default_stripe_api_base() -> String {
    "https://api.stripe.com".to_string()
}

fn default_success_url() -> String {
    "http://localhost:5173/billing/success".to_string()
}

fn default_cancel_url() -> String {
    "http://localhost:5173/billing/cancel".to_string()
}

fn default_webhook_tolerance() -> i64 {
    300
}

impl BillingConfig {
    /// Reverse lookup of a Stripe price id
    pub fn tier_for_price(&self, price_id: &str) -> Option<SubscriptionTier> {
        self.prices
            .iter()
            .find(|(_, p)| p.as_str() == price_id)
            .map(|(tier, _)| *tier)
    }
}

/// Credit metering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditsConfig {
    #[serde(default = "default_text_cost")]
    pub text_cost: i64,
    #[serde(default = "default_image_cost")]
    pub image_cost: i64,
    #[serde(default = "default_video_cost")]
    pub video_cost: i64,
    /// Monthly allowance per tier
    #[serde(default = "default_allowances")]
    pub allowances: HashMap<SubscriptionTier, i64>,
}

impl Default for CreditsConfig {
    fn default() -> Self {
        Self {
            text_cost: default_text_cost(),
            image_cost: default_image_cost(),
            video_cost: default_video_cost(),
            allowances: default_allowances(),
        }
    }
}

fn default_text_cost() -> i64 {
    1
}

fn default_image_cost() -> i64 {
    5
}

fn default_video_cost() -> i64 {
    20
}

fn default_allowances() -> HashMap<SubscriptionTier, i64> {
    HashMap::from([
        (SubscriptionTier::Free, 20),
        (SubscriptionTier::Starter, 200),
        (SubscriptionTier::Pro, 1000),
        (SubscriptionTier::Agency, 5000),
    ])
}

impl CreditsConfig {
    /// Credit cost of one generation
    pub fn cost(&self, kind: GenerationKind) -> i64 {
        match kind {
            GenerationKind::Text => self.text_cost,
            GenerationKind::Image => self.image_cost,
            GenerationKind::Video => self.video_cost,
        }
    }

    /// Monthly allowance of a tier (tiers absent from the map get nothing)
    pub fn allowance(&self, tier: SubscriptionTier) -> i64 {
        self.allowances.get(&tier).copied().unwrap_or(0)
    }
}

/// Publishing configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishingConfig {
    /// Never call platform APIs; every publish becomes a simulation
    #[serde(default)]
    pub simulate_only: bool,
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - ADLOOM_SERVER_HOST / ADLOOM_SERVER_PORT / ADLOOM_SERVER_CORS_ORIGIN
    /// - ADLOOM_PUBLIC_URL
    /// - ADLOOM_DATABASE_URL
    /// - ADLOOM_MEDIA_DIR
    /// - ADLOOM_OPENAI_API_KEY, ADLOOM_GEMINI_API_KEY, ADLOOM_REPLICATE_API_TOKEN
    /// - ADLOOM_STRIPE_SECRET_KEY, ADLOOM_STRIPE_WEBHOOK_SECRET
    /// - ADLOOM_{FACEBOOK,INSTAGRAM,TIKTOK,YOUTUBE}_CLIENT_ID / _CLIENT_SECRET
    /// - ADLOOM_SIMULATE_ONLY
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("ADLOOM_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("ADLOOM_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(cors_origin) = std::env::var("ADLOOM_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }
        if let Ok(public_url) = std::env::var("ADLOOM_PUBLIC_URL") {
            self.server.public_url = public_url;
        }

        if let Ok(url) = std::env::var("ADLOOM_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(dir) = std::env::var("ADLOOM_MEDIA_DIR") {
            self.media.dir = PathBuf::from(dir);
        }

        if let Ok(key) = std::env::var("ADLOOM_OPENAI_API_KEY") {
            self.providers.openai.api_key = key;
        }
        if let Ok(key) = std::env::var("ADLOOM_GEMINI_API_KEY") {
            self.providers.gemini.api_key = key;
        }
        if let Ok(token) = std::env::var("ADLOOM_REPLICATE_API_TOKEN") {
            self.providers.replicate.api_key = token;
        }

        if let Ok(key) = std::env::var("ADLOOM_STRIPE_SECRET_KEY") {
            self.billing.stripe_secret_key = key;
        }
        if let Ok(secret) = std::env::var("ADLOOM_STRIPE_WEBHOOK_SECRET") {
            self.billing.stripe_webhook_secret = secret;
        }

        for platform in Platform::ALL {
            let prefix = format!("ADLOOM_{}", platform.as_str().to_uppercase());
            let app = self.platforms.get_mut(platform);
            if let Ok(id) = std::env::var(format!("{}_CLIENT_ID", prefix)) {
                app.client_id = id;
            }
            if let Ok(secret) = std::env::var(format!("{}_CLIENT_SECRET", prefix)) {
                app.client_secret = secret;
            }
        }

        if let Ok(simulate) = std::env::var("ADLOOM_SIMULATE_ONLY") {
            match simulate.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.publishing.simulate_only = true,
                "0" | "false" | "no" => self.publishing.simulate_only = false,
                _ => {}
            }
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
