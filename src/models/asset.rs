//! Asset model for generated images and videos

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of generated media
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Video,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            _ => Err(anyhow::anyhow!("Invalid asset kind: {}", s)),
        }
    }
}

/// Whether the provider's media has been copied to our own storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HostingStatus {
    #[default]
    Pending,
    Hosted,
    Failed,
}

impl HostingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Hosted => "hosted",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for HostingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HostingStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "hosted" => Ok(Self::Hosted),
            "failed" => Ok(Self::Failed),
            _ => Err(anyhow::anyhow!("Invalid hosting status: {}", s)),
        }
    }
}

/// Generated media file tracked in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: i64,
    pub user_id: i64,
    pub campaign_id: i64,
    pub kind: AssetKind,
    pub provider: String,
    pub prompt: String,
    /// Provider URL (often short-lived)
    pub source_url: String,
    /// Our URL, once hosted
    pub hosted_url: Option<String>,
    /// File name inside the media directory
    #[serde(skip_serializing)]
    pub file_name: Option<String>,
    pub hosting_status: HostingStatus,
    pub content_type: Option<String>,
    pub size_bytes: Option<i64>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Asset {
    pub fn new(
        user_id: i64,
        campaign_id: i64,
        kind: AssetKind,
        provider: String,
        prompt: String,
        source_url: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            user_id,
            campaign_id,
            kind,
            provider,
            prompt,
            source_url,
            hosted_url: None,
            file_name: None,
            hosting_status: HostingStatus::Pending,
            content_type: None,
            size_bytes: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_hosted(&self) -> bool {
        self.hosting_status == HostingStatus::Hosted && self.hosted_url.is_some()
    }
}
