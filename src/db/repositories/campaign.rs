//! Campaign repository
//!
//! Briefs and generated copy are stored as JSON text columns.

use crate::db::{pool::sqlite, DynDatabasePool};
use crate::models::{Campaign, CampaignStatus, GeneratedContent, ListCampaignsParams, Platform};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

const CAMPAIGN_COLUMNS: &str = "id, user_id, name, brief, platform, status, generated_content, prompt_template_id, created_at, updated_at";

/// Campaign repository trait
#[async_trait]
pub trait CampaignRepository: Send + Sync {
    /// Create a new campaign
    async fn create(&self, campaign: &Campaign) -> Result<Campaign>;

    /// Get campaign by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Campaign>>;

    /// List a user's campaigns, newest first, with the unpaginated total
    async fn list(&self, user_id: i64, params: &ListCampaignsParams) -> Result<(Vec<Campaign>, i64)>;

    /// Persist name, brief and platform if the row is still in `campaign.status`.
    ///
    /// Returns `None` when the status changed since the campaign was read.
    /// The status column is never written here.
    async fn update(&self, campaign: &Campaign) -> Result<Option<Campaign>>;

    /// Store generated copy and move Generating -> Generated.
    ///
    /// Returns `None` when the row is no longer Generating.
    async fn store_generated(
        &self,
        id: i64,
        content: &GeneratedContent,
        template_id: Option<&str>,
    ) -> Result<Option<Campaign>>;

    /// Move `from` -> `to` only if the row is still in `from`
    async fn set_status(&self, id: i64, from: CampaignStatus, to: CampaignStatus) -> Result<bool>;

    /// Delete a campaign (assets and performance rows cascade)
    async fn delete(&self, id: i64) -> Result<bool>;
}

/// SQLx-based campaign repository implementation
pub struct SqlxCampaignRepository {
    pool: DynDatabasePool,
}

impl SqlxCampaignRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CampaignRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CampaignRepository for SqlxCampaignRepository {
    async fn create(&self, campaign: &Campaign) -> Result<Campaign> {
        create_campaign(sqlite(&self.pool)?, campaign).await
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Campaign>> {
        get_campaign_by_id(sqlite(&self.pool)?, id).await
    }

    async fn list(&self, user_id: i64, params: &ListCampaignsParams) -> Result<(Vec<Campaign>, i64)> {
        list_campaigns(sqlite(&self.pool)?, user_id, params).await
    }

    async fn update(&self, campaign: &Campaign) -> Result<Option<Campaign>> {
        let pool = sqlite(&self.pool)?;
        if !update_campaign(pool, campaign).await? {
            return Ok(None);
        }
        get_campaign_by_id(pool, campaign.id).await
    }

    async fn store_generated(
        &self,
        id: i64,
        content: &GeneratedContent,
        template_id: Option<&str>,
    ) -> Result<Option<Campaign>> {
        let pool = sqlite(&self.pool)?;
        let content = serde_json::to_string(content).context("Failed to encode generated content")?;

        let result = sqlx::query(
            r#"
            UPDATE campaigns
            SET generated_content = ?, prompt_template_id = ?, status = ?, updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(content)
        .bind(template_id)
        .bind(CampaignStatus::Generated.as_str())
        .bind(Utc::now())
        .bind(id)
        .bind(CampaignStatus::Generating.as_str())
        .execute(pool)
        .await
        .context("Failed to store generated content")?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        get_campaign_by_id(pool, id).await
    }

    async fn set_status(&self, id: i64, from: CampaignStatus, to: CampaignStatus) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE campaigns SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(to.as_str())
        .bind(Utc::now())
        .bind(id)
        .bind(from.as_str())
        .execute(sqlite(&self.pool)?)
        .await
        .context("Failed to update campaign status")?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM campaigns WHERE id = ?")
            .bind(id)
            .execute(sqlite(&self.pool)?)
            .await
            .context("Failed to delete campaign")?;
        Ok(result.rows_affected() > 0)
    }
}

async fn create_campaign(pool: &SqlitePool, campaign: &Campaign) -> Result<Campaign> {
    let now = Utc::now();
    let brief = serde_json::to_string(&campaign.brief).context("Failed to encode brief")?;
    let content = campaign
        .generated_content
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .context("Failed to encode generated content")?;

    let result = sqlx::query(
        r#"
        INSERT INTO campaigns (user_id, name, brief, platform, status, generated_content, prompt_template_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(campaign.user_id)
    .bind(&campaign.name)
    .bind(brief)
    .bind(campaign.platform.as_str())
    .bind(campaign.status.as_str())
    .bind(content)
    .bind(&campaign.prompt_template_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create campaign")?;

    Ok(Campaign {
        id: result.last_insert_rowid(),
        created_at: now,
        updated_at: now,
        ..campaign.clone()
    })
}

async fn get_campaign_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Campaign>> {
    let sql = format!("SELECT {} FROM campaigns WHERE id = ?", CAMPAIGN_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get campaign by ID")?;

    row.as_ref().map(row_to_campaign).transpose()
}

async fn list_campaigns(
    pool: &SqlitePool,
    user_id: i64,
    params: &ListCampaignsParams,
) -> Result<(Vec<Campaign>, i64)> {
    let mut filter = String::from("WHERE user_id = ?");
    if params.status.is_some() {
        filter.push_str(" AND status = ?");
    }
    if params.platform.is_some() {
        filter.push_str(" AND platform = ?");
    }

    let sql = format!(
        "SELECT {} FROM campaigns {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        CAMPAIGN_COLUMNS, filter
    );
    let mut query = sqlx::query(&sql).bind(user_id);
    if let Some(status) = params.status {
        query = query.bind(status.as_str());
    }
    if let Some(platform) = params.platform {
        query = query.bind(platform.as_str());
    }
    let rows = query
        .bind(params.per_page)
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list campaigns")?;

    let count_sql = format!("SELECT COUNT(*) as count FROM campaigns {}", filter);
    let mut count_query = sqlx::query(&count_sql).bind(user_id);
    if let Some(status) = params.status {
        count_query = count_query.bind(status.as_str());
    }
    if let Some(platform) = params.platform {
        count_query = count_query.bind(platform.as_str());
    }
    let total: i64 = count_query
        .fetch_one(pool)
        .await
        .context("Failed to count campaigns")?
        .get("count");

    let campaigns = rows.iter().map(row_to_campaign).collect::<Result<Vec<_>>>()?;
    Ok((campaigns, total))
}

async fn update_campaign(pool: &SqlitePool, campaign: &Campaign) -> Result<bool> {
    let brief = serde_json::to_string(&campaign.brief).context("Failed to encode brief")?;

    let result = sqlx::query(
        r#"
        UPDATE campaigns
        SET name = ?, brief = ?, platform = ?, updated_at = ?
        WHERE id = ? AND status = ?
        "#,
    )
    .bind(&campaign.name)
    .bind(brief)
    .bind(campaign.platform.as_str())
    .bind(Utc::now())
    .bind(campaign.id)
    .bind(campaign.status.as_str())
    .execute(pool)
    .await
    .context("Failed to update campaign")?;
    Ok(result.rows_affected() == 1)
}

fn row_to_campaign(row: &sqlx::sqlite::SqliteRow) -> Result<Campaign> {
    let brief: String = row.get("brief");
    let platform: String = row.get("platform");
    let status: String = row.get("status");
    let content: Option<String> = row.get("generated_content");

    Ok(Campaign {
        id: row.get("id"),
        user_id: row.get("user_id"),
        name: row.get("name"),
        brief: serde_json::from_str(&brief).context("Invalid brief JSON in database")?,
        platform: Platform::from_str(&platform)?,
        status: CampaignStatus::from_str(&status)?,
        generated_content: content
            .map(|c| serde_json::from_str(&c))
            .transpose()
            .context("Invalid generated content JSON in database")?,
        prompt_template_id: row.get("prompt_template_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
