//! Publishing repository
//!
//! Records of real publications and of simulated ones.

use crate::db::{pool::sqlite, DynDatabasePool};
use crate::models::{Platform, Publication, PublishingSimulation};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::str::FromStr;
use std::sync::Arc;

const PUBLICATION_COLUMNS: &str = "id, campaign_id, platform, asset_id, external_id, url, created_at";

const SIMULATION_COLUMNS: &str = "id, campaign_id, platform, asset_id, caption, estimated_reach, estimated_engagement, best_time, notes, created_at";

#[async_trait]
pub trait PublishingRepository: Send + Sync {
    async fn create_publication(&self, publication: &Publication) -> Result<Publication>;

    async fn list_publications(&self, campaign_id: i64) -> Result<Vec<Publication>>;

    async fn create_simulation(
        &self,
        simulation: &PublishingSimulation,
    ) -> Result<PublishingSimulation>;

    async fn list_simulations(&self, campaign_id: i64) -> Result<Vec<PublishingSimulation>>;
}

pub struct SqlxPublishingRepository {
    pool: DynDatabasePool,
}

impl SqlxPublishingRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PublishingRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl PublishingRepository for SqlxPublishingRepository {
    async fn create_publication(&self, publication: &Publication) -> Result<Publication> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO publications (campaign_id, platform, asset_id, external_id, url, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(publication.campaign_id)
        .bind(publication.platform.as_str())
        .bind(publication.asset_id)
        .bind(&publication.external_id)
        .bind(&publication.url)
        .bind(now)
        .execute(sqlite(&self.pool)?)
        .await
        .context("Failed to record publication")?;

        Ok(Publication {
            id: result.last_insert_rowid(),
            created_at: now,
            ..publication.clone()
        })
    }

    async fn list_publications(&self, campaign_id: i64) -> Result<Vec<Publication>> {
        let sql = format!(
            "SELECT {} FROM publications WHERE campaign_id = ? ORDER BY id DESC",
            PUBLICATION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(campaign_id)
            .fetch_all(sqlite(&self.pool)?)
            .await
            .context("Failed to list publications")?;
        rows.iter().map(row_to_publication).collect()
    }

    async fn create_simulation(
        &self,
        simulation: &PublishingSimulation,
    ) -> Result<PublishingSimulation> {
        let now = Utc::now();
        let result = sqlx::query(
            r#"
            INSERT INTO publishing_simulations (campaign_id, platform, asset_id, caption, estimated_reach, estimated_engagement, best_time, notes, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(simulation.campaign_id)
        .bind(simulation.platform.as_str())
        .bind(simulation.asset_id)
        .bind(&simulation.caption)
        .bind(simulation.estimated_reach)
        .bind(simulation.estimated_engagement)
        .bind(&simulation.best_time)
        .bind(&simulation.notes)
        .bind(now)
        .execute(sqlite(&self.pool)?)
        .await
        .context("Failed to record publishing simulation")?;

        Ok(PublishingSimulation {
            id: result.last_insert_rowid(),
            created_at: now,
            ..simulation.clone()
        })
    }

    async fn list_simulations(&self, campaign_id: i64) -> Result<Vec<PublishingSimulation>> {
        let sql = format!(
            "SELECT {} FROM publishing_simulations WHERE campaign_id = ? ORDER BY id DESC",
            SIMULATION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(campaign_id)
            .fetch_all(sqlite(&self.pool)?)
            .await
            .context("Failed to list publishing simulations")?;
        rows.iter().map(row_to_simulation).collect()
    }
}

fn row_to_publication(row: &sqlx::sqlite::SqliteRow) -> Result<Publication> {
    let platform: String = row.get("platform");
    Ok(Publication {
        id: row.get("id"),
        campaign_id: row.get("campaign_id"),
        platform: Platform::from_str(&platform)?,
        asset_id: row.get("asset_id"),
        external_id: row.get("external_id"),
        url: row.get("url"),
        created_at: row.get("created_at"),
    })
}

fn row_to_simulation(row: &sqlx::sqlite::SqliteRow) -> Result<PublishingSimulation> {
    let platform: String = row.get("platform");
    Ok(PublishingSimulation {
        id: row.get("id"),
        campaign_id: row.get("campaign_id"),
        platform: Platform::from_str(&platform)?,
        asset_id: row.get("asset_id"),
        caption: row.get("caption"),
        estimated_reach: row.get("estimated_reach"),
        estimated_engagement: row.get("estimated_engagement"),
        best_time: row.get("best_time"),
        notes: row.get("notes"),
        created_at: row.get("created_at"),
    })
}
