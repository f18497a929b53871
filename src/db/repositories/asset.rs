//! Asset repository

use crate::db::{pool::sqlite, DynDatabasePool};
use crate::models::{Asset, AssetKind, HostingStatus};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

const ASSET_COLUMNS: &str = "id, user_id, campaign_id, kind, provider, prompt, source_url, hosted_url, file_name, hosting_status, content_type, size_bytes, error, created_at, updated_at";

/// Asset repository trait
#[async_trait]
pub trait AssetRepository: Send + Sync {
    async fn create(&self, asset: &Asset) -> Result<Asset>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Asset>>;

    /// A user's assets, optionally limited to one campaign, newest first
    async fn list(&self, user_id: i64, campaign_id: Option<i64>) -> Result<Vec<Asset>>;

    /// A user's assets that are not hosted yet
    async fn list_unhosted(&self, user_id: i64) -> Result<Vec<Asset>>;

    /// Persist hosting fields
    async fn update(&self, asset: &Asset) -> Result<Asset>;

    async fn delete(&self, id: i64) -> Result<bool>;
}

/// SQLx-based asset repository implementation
pub struct SqlxAssetRepository {
    pool: DynDatabasePool,
}

impl SqlxAssetRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AssetRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl AssetRepository for SqlxAssetRepository {
    async fn create(&self, asset: &Asset) -> Result<Asset> {
        create_asset(sqlite(&self.pool)?, asset).await
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Asset>> {
        get_asset_by_id(sqlite(&self.pool)?, id).await
    }

    async fn list(&self, user_id: i64, campaign_id: Option<i64>) -> Result<Vec<Asset>> {
        let pool = sqlite(&self.pool)?;
        let rows = match campaign_id {
            Some(campaign_id) => {
                let sql = format!(
                    "SELECT {} FROM assets WHERE user_id = ? AND campaign_id = ? ORDER BY id DESC",
                    ASSET_COLUMNS
                );
                sqlx::query(&sql)
                    .bind(user_id)
                    .bind(campaign_id)
                    .fetch_all(pool)
                    .await
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM assets WHERE user_id = ? ORDER BY id DESC",
                    ASSET_COLUMNS
                );
                sqlx::query(&sql).bind(user_id).fetch_all(pool).await
            }
        }
        .context("Failed to list assets")?;

        rows.iter().map(row_to_asset).collect()
    }

    async fn list_unhosted(&self, user_id: i64) -> Result<Vec<Asset>> {
        let sql = format!(
            "SELECT {} FROM assets WHERE user_id = ? AND hosting_status != ? ORDER BY id",
            ASSET_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(HostingStatus::Hosted.as_str())
            .fetch_all(sqlite(&self.pool)?)
            .await
            .context("Failed to list unhosted assets")?;

        rows.iter().map(row_to_asset).collect()
    }

    async fn update(&self, asset: &Asset) -> Result<Asset> {
        let pool = sqlite(&self.pool)?;
        sqlx::query(
            r#"
            UPDATE assets
            SET hosted_url = ?, file_name = ?, hosting_status = ?, content_type = ?, size_bytes = ?, error = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&asset.hosted_url)
        .bind(&asset.file_name)
        .bind(asset.hosting_status.as_str())
        .bind(&asset.content_type)
        .bind(asset.size_bytes)
        .bind(&asset.error)
        .bind(Utc::now())
        .bind(asset.id)
        .execute(pool)
        .await
        .context("Failed to update asset")?;

        get_asset_by_id(pool, asset.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Asset not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM assets WHERE id = ?")
            .bind(id)
            .execute(sqlite(&self.pool)?)
            .await
            .context("Failed to delete asset")?;
        Ok(result.rows_affected() > 0)
    }
}

async fn create_asset(pool: &SqlitePool, asset: &Asset) -> Result<Asset> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO assets (user_id, campaign_id, kind, provider, prompt, source_url, hosted_url, file_name,
                            hosting_status, content_type, size_bytes, error, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(asset.user_id)
    .bind(asset.campaign_id)
    .bind(asset.kind.as_str())
    .bind(&asset.provider)
    .bind(&asset.prompt)
    .bind(&asset.source_url)
    .bind(&asset.hosted_url)
    .bind(&asset.file_name)
    .bind(asset.hosting_status.as_str())
    .bind(&asset.content_type)
    .bind(asset.size_bytes)
    .bind(&asset.error)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create asset")?;

    Ok(Asset {
        id: result.last_insert_rowid(),
        created_at: now,
        updated_at: now,
        ..asset.clone()
    })
}

async fn get_asset_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Asset>> {
    let sql = format!("SELECT {} FROM assets WHERE id = ?", ASSET_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get asset by ID")?;
    row.as_ref().map(row_to_asset).transpose()
}

fn row_to_asset(row: &sqlx::sqlite::SqliteRow) -> Result<Asset> {
    let kind: String = row.get("kind");
    let status: String = row.get("hosting_status");

    Ok(Asset {
        id: row.get("id"),
        user_id: row.get("user_id"),
        campaign_id: row.get("campaign_id"),
        kind: AssetKind::from_str(&kind)?,
        provider: row.get("provider"),
        prompt: row.get("prompt"),
        source_url: row.get("source_url"),
        hosted_url: row.get("hosted_url"),
        file_name: row.get("file_name"),
        hosting_status: HostingStatus::from_str(&status)?,
        content_type: row.get("content_type"),
        size_bytes: row.get("size_bytes"),
        error: row.get("error"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
