//! Campaign model
//!
//! A campaign is a user's brief for one target platform, moving through a
//! small status machine as content is generated and published.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Social platform a campaign targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Facebook,
    Instagram,
    TikTok,
    YouTube,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Facebook,
        Platform::Instagram,
        Platform::TikTok,
        Platform::YouTube,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Facebook => "facebook",
            Self::Instagram => "instagram",
            Self::TikTok => "tiktok",
            Self::YouTube => "youtube",
        }
    }

    /// Caption length limit enforced when publishing
    pub fn caption_limit(&self) -> usize {
        match self {
            Self::Facebook => 63_206,
            Self::Instagram | Self::TikTok => 2_200,
            Self::YouTube => 5_000,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "facebook" => Ok(Self::Facebook),
            "instagram" => Ok(Self::Instagram),
            "tiktok" => Ok(Self::TikTok),
            "youtube" => Ok(Self::YouTube),
            _ => Err(anyhow::anyhow!("Invalid platform: {}", s)),
        }
    }
}

/// Campaign lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    #[default]
    Draft,
    Generating,
    Generated,
    Published,
    Failed,
    Archived,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Generating => "generating",
            Self::Generated => "generated",
            Self::Published => "published",
            Self::Failed => "failed",
            Self::Archived => "archived",
        }
    }

    /// Allowed lifecycle moves
    pub fn can_transition_to(&self, next: CampaignStatus) -> bool {
        use CampaignStatus::*;
        matches!(
            (self, next),
            (Draft, Generating)
                | (Draft, Archived)
                | (Generating, Generated)
                | (Generating, Failed)
                | (Generated, Generating)
                | (Generated, Published)
                | (Generated, Archived)
                | (Failed, Generating)
                | (Failed, Archived)
                | (Published, Archived)
                | (Archived, Draft)
        )
    }

    /// Whether the brief may still be edited
    pub fn is_editable(&self) -> bool {
        matches!(self, Self::Draft | Self::Generated | Self::Failed)
    }

    /// Whether a new generation may start
    pub fn can_generate(&self) -> bool {
        matches!(self, Self::Draft | Self::Generated | Self::Failed)
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CampaignStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "generating" => Ok(Self::Generating),
            "generated" => Ok(Self::Generated),
            "published" => Ok(Self::Published),
            "failed" => Ok(Self::Failed),
            "archived" => Ok(Self::Archived),
            _ => Err(anyhow::anyhow!("Invalid campaign status: {}", s)),
        }
    }
}

/// Brand identity used to augment generation prompts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrandConcept {
    pub name: String,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default)]
    pub visual_style: Option<String>,
    #[serde(default)]
    pub tagline: Option<String>,
}

/// User-supplied product description seeding the AI prompt
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CampaignBrief {
    pub product_name: String,
    pub description: String,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub target_audience: Option<String>,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub brand: Option<BrandConcept>,
}

/// Social copy produced by a text provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedContent {
    pub headline: String,
    pub body: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
    #[serde(default)]
    pub call_to_action: Option<String>,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub model: String,
}

impl GeneratedContent {
    /// Headline, body and hashtags, truncated to what the platform accepts.
    /// The call to action is kept out of captions.
    pub fn caption(&self, platform: Platform) -> String {
        let mut parts = Vec::new();
        if !self.headline.is_empty() {
            parts.push(self.headline.clone());
        }
        if !self.body.is_empty() {
            parts.push(self.body.clone());
        }
        if !self.hashtags.is_empty() {
            let tags: Vec<String> = self
                .hashtags
                .iter()
                .map(|t| {
                    if t.starts_with('#') {
                        t.clone()
                    } else {
                        format!("#{}", t)
                    }
                })
                .collect();
            parts.push(tags.join(" "));
        }
        truncate_chars(&parts.join("\n\n"), platform.caption_limit())
    }
}

/// Truncate on a char boundary
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Campaign entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub brief: CampaignBrief,
    pub platform: Platform,
    pub status: CampaignStatus,
    pub generated_content: Option<GeneratedContent>,
    pub prompt_template_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    pub fn new(user_id: i64, name: String, brief: CampaignBrief, platform: Platform) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            user_id,
            name,
            brief,
            platform,
            status: CampaignStatus::Draft,
            generated_content: None,
            prompt_template_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Input for creating a campaign
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCampaignInput {
    pub name: String,
    pub platform: Platform,
    pub brief: CampaignBrief,
}

/// Input for updating a campaign
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCampaignInput {
    pub name: Option<String>,
    pub platform: Option<Platform>,
    pub brief: Option<CampaignBrief>,
}

/// Campaign list filters
#[derive(Debug, Clone, Default)]
pub struct ListCampaignsParams {
    pub status: Option<CampaignStatus>,
    pub platform: Option<Platform>,
    pub page: i64,
    pub per_page: i64,
}

impl ListCampaignsParams {
    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1) * self.per_page
    }
}

/// Paginated result
#[derive(Debug, Clone, Serialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

impl<T> PagedResult<T> {
    pub fn total_pages(&self) -> i64 {
        if self.per_page <= 0 {
            return 0;
        }
        (self.total + self.per_page - 1) / self.per_page
    }
}
