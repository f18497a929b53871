//! Publishing campaigns to social platforms
//!
//! A generated campaign is either posted through the user's connected
//! account or, in simulate mode, turned into a reach estimate. Real posts are
//! recorded as publications and move the campaign to Published.

use super::analytics::{AnalyticsError, AnalyticsService};
use super::asset_hosting::{AssetError, AssetHostingService};
use super::campaign::{CampaignService, CampaignServiceError};
use super::oauth::{OAuthError, OAuthService};
use super::simulation::{self, SimulationInput};
use crate::db::repositories::PublishingRepository;
use crate::models::{
    truncate_chars, Campaign, CampaignStatus, GeneratedContent, Platform, Publication,
    PublishingSimulation,
};
use crate::platforms::{check_media, PlatformError, PlatformRegistry, PublishMedia, PublishRequest};
use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

const MAX_TITLE_CHARS: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error(transparent)]
    Campaign(#[from] CampaignServiceError),

    #[error(transparent)]
    OAuth(#[from] OAuthError),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error("Campaign must have generated content to publish (status is {0})")]
    NotPublishable(CampaignStatus),

    #[error("Asset {0} is not hosted yet")]
    AssetNotHosted(i64),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<AnalyticsError> for PublishError {
    fn from(e: AnalyticsError) -> Self {
        match e {
            AnalyticsError::Campaign(e) => Self::Campaign(e),
            AnalyticsError::ValidationError(m) => Self::ValidationError(m),
            AnalyticsError::InternalError(e) => Self::InternalError(e),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublishInput {
    /// Defaults to the campaign's platform
    #[serde(default)]
    pub platform: Option<Platform>,
    #[serde(default)]
    pub asset_id: Option<i64>,
    #[serde(default)]
    pub simulate: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum PublishOutcome {
    Published(Publication),
    Simulated(PublishingSimulation),
}

pub struct PublishingService {
    repo: Arc<dyn PublishingRepository>,
    campaigns: Arc<CampaignService>,
    assets: Arc<AssetHostingService>,
    oauth: Arc<OAuthService>,
    platforms: Arc<PlatformRegistry>,
    analytics: Arc<AnalyticsService>,
    public_url: String,
    simulate_only: bool,
}

impl PublishingService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repo: Arc<dyn PublishingRepository>,
        campaigns: Arc<CampaignService>,
        assets: Arc<AssetHostingService>,
        oauth: Arc<OAuthService>,
        platforms: Arc<PlatformRegistry>,
        analytics: Arc<AnalyticsService>,
        public_url: &str,
        simulate_only: bool,
    ) -> Self {
        Self {
            repo,
            campaigns,
            assets,
            oauth,
            platforms,
            analytics,
            public_url: public_url.trim_end_matches('/').to_string(),
            simulate_only,
        }
    }

    #[instrument(skip(self, input), fields(simulate = input.simulate))]
    pub async fn publish(
        &self,
        user_id: i64,
        campaign_id: i64,
        input: PublishInput,
    ) -> Result<PublishOutcome, PublishError> {
        let campaign = self.campaigns.get(user_id, campaign_id).await?;
        let content = publishable_content(&campaign)?;
        let platform = input.platform.unwrap_or(campaign.platform);

        let media = match input.asset_id {
            Some(asset_id) => Some(self.hosted_media(user_id, &campaign, asset_id).await?),
            None => None,
        };
        check_media(platform, media.as_ref())?;

        let request = PublishRequest {
            title: truncate_chars(
                if content.headline.is_empty() {
                    &campaign.brief.product_name
                } else {
                    &content.headline
                },
                MAX_TITLE_CHARS,
            ),
            caption: content.caption(platform),
            hashtags: content.hashtags.clone(),
            media,
        };

        if input.simulate || self.simulate_only {
            let simulation = self
                .simulate(user_id, &campaign, platform, input.asset_id, &request)
                .await?;
            return Ok(PublishOutcome::Simulated(simulation));
        }

        let connection = self.oauth.connection_for_publish(user_id, platform).await?;
        let result = self
            .platforms
            .publisher(platform)
            .publish(&connection, &request)
            .await?;

        let publication = self
            .repo
            .create_publication(&Publication {
                id: 0,
                campaign_id: campaign.id,
                platform,
                asset_id: input.asset_id,
                external_id: result.external_id,
                url: result.url,
                created_at: Utc::now(),
            })
            .await
            .context("Failed to record publication")?;

        if campaign.status == CampaignStatus::Generated {
            // The post is live; a lost status race must not fail the request
            if let Err(e) = self
                .campaigns
                .move_status(&campaign, CampaignStatus::Published)
                .await
            {
                warn!(campaign_id, error = %e, "Published but could not update campaign status");
            }
        }

        info!(campaign_id, %platform, external_id = %publication.external_id, "Published campaign");
        Ok(PublishOutcome::Published(publication))
    }

    pub async fn list_publications(
        &self,
        user_id: i64,
        campaign_id: i64,
    ) -> Result<Vec<Publication>, PublishError> {
        let campaign = self.campaigns.get(user_id, campaign_id).await?;
        let rows = self
            .repo
            .list_publications(campaign.id)
            .await
            .context("Failed to list publications")?;
        Ok(rows)
    }

    pub async fn list_simulations(
        &self,
        user_id: i64,
        campaign_id: i64,
    ) -> Result<Vec<PublishingSimulation>, PublishError> {
        let campaign = self.campaigns.get(user_id, campaign_id).await?;
        let rows = self
            .repo
            .list_simulations(campaign.id)
            .await
            .context("Failed to list simulations")?;
        Ok(rows)
    }

    async fn simulate(
        &self,
        user_id: i64,
        campaign: &Campaign,
        platform: Platform,
        asset_id: Option<i64>,
        request: &PublishRequest,
    ) -> Result<PublishingSimulation, PublishError> {
        let learned_score = self.analytics.learned_score(user_id, platform).await?;
        let estimate = simulation::estimate(SimulationInput {
            platform,
            media: request.media.as_ref().map(|m| m.kind),
            hashtag_count: request.hashtags.len(),
            learned_score,
        });

        let stored = self
            .repo
            .create_simulation(&PublishingSimulation {
                id: 0,
                campaign_id: campaign.id,
                platform,
                asset_id,
                caption: request.caption.clone(),
                estimated_reach: estimate.estimated_reach,
                estimated_engagement: estimate.estimated_engagement,
                best_time: estimate.best_time.to_string(),
                notes: estimate.notes,
                created_at: Utc::now(),
            })
            .await
            .context("Failed to record simulation")?;

        info!(
            campaign_id = campaign.id,
            %platform,
            reach = stored.estimated_reach,
            "Simulated publishing"
        );
        Ok(stored)
    }

    /// The asset as platform-reachable media
    async fn hosted_media(
        &self,
        user_id: i64,
        campaign: &Campaign,
        asset_id: i64,
    ) -> Result<PublishMedia, PublishError> {
        let asset = self.assets.get(user_id, asset_id).await?;
        if asset.campaign_id != campaign.id {
            return Err(PublishError::ValidationError(format!(
                "Asset {} does not belong to campaign {}",
                asset_id, campaign.id
            )));
        }
        let hosted_url = match (&asset.hosted_url, asset.is_hosted()) {
            (Some(url), true) => url,
            _ => return Err(PublishError::AssetNotHosted(asset_id)),
        };

        Ok(PublishMedia {
            kind: asset.kind,
            url: self.absolute_url(hosted_url),
        })
    }

    fn absolute_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}/{}", self.public_url, url.trim_start_matches('/'))
        }
    }
}

fn publishable_content(campaign: &Campaign) -> Result<&GeneratedContent, PublishError> {
    match (&campaign.generated_content, campaign.status) {
        (Some(content), CampaignStatus::Generated | CampaignStatus::Published) => Ok(content),
        _ => Err(PublishError::NotPublishable(campaign.status)),
    }
}
