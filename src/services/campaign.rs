//! Campaign service
//!
//! Ownership checks, brief validation and the campaign status machine.
//! Campaigns owned by other users are reported as not found.

use crate::db::repositories::CampaignRepository;
use crate::models::{
    Campaign, CampaignBrief, CampaignStatus, CreateCampaignInput, GeneratedContent,
    ListCampaignsParams, PagedResult, UpdateCampaignInput,
};
use anyhow::Context;
use std::sync::Arc;

pub const MAX_DESCRIPTION_CHARS: usize = 4000;
pub const MAX_NAME_CHARS: usize = 255;
pub const DEFAULT_PER_PAGE: i64 = 20;
pub const MAX_PER_PAGE: i64 = 100;

#[derive(Debug, thiserror::Error)]
pub enum CampaignServiceError {
    #[error("Campaign not found: {0}")]
    NotFound(i64),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Campaign cannot be edited while {0}")]
    NotEditable(CampaignStatus),

    #[error("Campaign {0} changed status while it was being edited")]
    Conflict(i64),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: CampaignStatus,
        to: CampaignStatus,
    },

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct CampaignService {
    repo: Arc<dyn CampaignRepository>,
}

impl CampaignService {
    pub fn new(repo: Arc<dyn CampaignRepository>) -> Self {
        Self { repo }
    }

    /// Create a draft campaign
    pub async fn create(
        &self,
        user_id: i64,
        input: CreateCampaignInput,
    ) -> Result<Campaign, CampaignServiceError> {
        let name = validate_name(&input.name)?;
        let brief = normalize_brief(input.brief)?;

        let campaign = Campaign::new(user_id, name, brief, input.platform);
        let created = self
            .repo
            .create(&campaign)
            .await
            .context("Failed to create campaign")?;

        tracing::info!(campaign_id = created.id, user_id, "Created campaign");
        Ok(created)
    }

    /// Get a campaign owned by `user_id`
    pub async fn get(&self, user_id: i64, id: i64) -> Result<Campaign, CampaignServiceError> {
        let campaign = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get campaign")?;

        match campaign {
            Some(c) if c.user_id == user_id => Ok(c),
            _ => Err(CampaignServiceError::NotFound(id)),
        }
    }

    pub async fn list(
        &self,
        user_id: i64,
        mut params: ListCampaignsParams,
    ) -> Result<PagedResult<Campaign>, CampaignServiceError> {
        params.page = params.page.max(1);
        params.per_page = match params.per_page {
            n if n <= 0 => DEFAULT_PER_PAGE,
            n => n.min(MAX_PER_PAGE),
        };

        let (items, total) = self
            .repo
            .list(user_id, &params)
            .await
            .context("Failed to list campaigns")?;

        Ok(PagedResult {
            items,
            total,
            page: params.page,
            per_page: params.per_page,
        })
    }

    /// Edit name, platform or brief while the campaign is editable
    pub async fn update(
        &self,
        user_id: i64,
        id: i64,
        input: UpdateCampaignInput,
    ) -> Result<Campaign, CampaignServiceError> {
        let mut campaign = self.get(user_id, id).await?;
        if !campaign.status.is_editable() {
            return Err(CampaignServiceError::NotEditable(campaign.status));
        }

        if let Some(name) = input.name {
            campaign.name = validate_name(&name)?;
        }
        if let Some(platform) = input.platform {
            campaign.platform = platform;
        }
        if let Some(brief) = input.brief {
            campaign.brief = normalize_brief(brief)?;
        }

        self.repo
            .update(&campaign)
            .await
            .context("Failed to update campaign")?
            .ok_or(CampaignServiceError::Conflict(id))
    }

    /// Move the campaign to `next`, enforcing the allowed transitions
    pub async fn transition(
        &self,
        user_id: i64,
        id: i64,
        next: CampaignStatus,
    ) -> Result<Campaign, CampaignServiceError> {
        let campaign = self.get(user_id, id).await?;
        self.move_status(&campaign, next).await?;
        self.get(user_id, id).await
    }

    pub async fn archive(&self, user_id: i64, id: i64) -> Result<Campaign, CampaignServiceError> {
        self.transition(user_id, id, CampaignStatus::Archived).await
    }

    /// Archived campaigns come back as drafts
    pub async fn restore(&self, user_id: i64, id: i64) -> Result<Campaign, CampaignServiceError> {
        self.transition(user_id, id, CampaignStatus::Draft).await
    }

    pub async fn delete(&self, user_id: i64, id: i64) -> Result<(), CampaignServiceError> {
        self.get(user_id, id).await?;
        if !self
            .repo
            .delete(id)
            .await
            .context("Failed to delete campaign")?
        {
            return Err(CampaignServiceError::NotFound(id));
        }
        tracing::info!(campaign_id = id, user_id, "Deleted campaign");
        Ok(())
    }

    /// Conditional status change from the campaign's current status.
    ///
    /// Fails with `InvalidTransition` if the move is not allowed or the row
    /// changed status since it was read.
    pub async fn move_status(
        &self,
        campaign: &Campaign,
        next: CampaignStatus,
    ) -> Result<(), CampaignServiceError> {
        let invalid = CampaignServiceError::InvalidTransition {
            from: campaign.status,
            to: next,
        };
        if !campaign.status.can_transition_to(next) {
            return Err(invalid);
        }

        let moved = self
            .repo
            .set_status(campaign.id, campaign.status, next)
            .await
            .context("Failed to update campaign status")?;
        if !moved {
            return Err(invalid);
        }
        Ok(())
    }

    /// Store generated copy and move a Generating campaign to Generated
    pub async fn store_generated(
        &self,
        campaign: &Campaign,
        content: GeneratedContent,
        template_id: Option<String>,
    ) -> Result<Campaign, CampaignServiceError> {
        let stored = self
            .repo
            .store_generated(campaign.id, &content, template_id.as_deref())
            .await
            .context("Failed to store generated content")?;
        if let Some(stored) = stored {
            return Ok(stored);
        }

        let current = self
            .repo
            .get_by_id(campaign.id)
            .await
            .context("Failed to get campaign")?
            .ok_or(CampaignServiceError::NotFound(campaign.id))?;
        Err(CampaignServiceError::InvalidTransition {
            from: current.status,
            to: CampaignStatus::Generated,
        })
    }
}

fn validate_name(name: &str) -> Result<String, CampaignServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CampaignServiceError::ValidationError(
            "Campaign name cannot be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(CampaignServiceError::ValidationError(format!(
            "Campaign name cannot exceed {} characters",
            MAX_NAME_CHARS
        )));
    }
    Ok(name.to_string())
}

fn normalize_brief(mut brief: CampaignBrief) -> Result<CampaignBrief, CampaignServiceError> {
    brief.product_name = brief.product_name.trim().to_string();
    if brief.product_name.is_empty() {
        return Err(CampaignServiceError::ValidationError(
            "Product name cannot be empty".to_string(),
        ));
    }
    if brief.description.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(CampaignServiceError::ValidationError(format!(
            "Description cannot exceed {} characters",
            MAX_DESCRIPTION_CHARS
        )));
    }

    brief.keywords = brief
        .keywords
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect();
    for field in [&mut brief.industry, &mut brief.target_audience, &mut brief.tone] {
        if field.as_deref().is_some_and(|v| v.trim().is_empty()) {
            *field = None;
        }
    }

    Ok(brief)
}
