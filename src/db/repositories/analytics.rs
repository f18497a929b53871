//! Analytics repository
//!
//! Performance snapshots per campaign and the per-user learning patterns
//! derived from them.

use crate::db::{pool::sqlite, DynDatabasePool};
use crate::models::{ContentMetrics, ContentPerformance, LearningPattern, PatternType, Platform};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

const PERFORMANCE_COLUMNS: &str =
    "id, campaign_id, platform, impressions, clicks, likes, shares, comments, recorded_at";

const PATTERN_COLUMNS: &str =
    "id, user_id, pattern_type, pattern_value, platform, success_score, sample_count, updated_at";

#[async_trait]
pub trait AnalyticsRepository: Send + Sync {
    async fn insert_performance(
        &self,
        campaign_id: i64,
        platform: Platform,
        metrics: &ContentMetrics,
    ) -> Result<ContentPerformance>;

    /// Snapshots for a campaign, oldest first
    async fn list_performance(&self, campaign_id: i64) -> Result<Vec<ContentPerformance>>;

    async fn get_pattern(
        &self,
        user_id: i64,
        pattern_type: PatternType,
        pattern_value: &str,
        platform: Option<Platform>,
    ) -> Result<Option<LearningPattern>>;

    /// Insert or overwrite the pattern keyed by (user, type, value, platform)
    async fn save_pattern(&self, pattern: &LearningPattern) -> Result<()>;

    /// Patterns with at least `min_samples`, best score first
    async fn list_patterns(
        &self,
        user_id: i64,
        min_samples: i64,
        limit: i64,
    ) -> Result<Vec<LearningPattern>>;
}

pub struct SqlxAnalyticsRepository {
    pool: DynDatabasePool,
}

impl SqlxAnalyticsRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AnalyticsRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl AnalyticsRepository for SqlxAnalyticsRepository {
    async fn insert_performance(
        &self,
        campaign_id: i64,
        platform: Platform,
        metrics: &ContentMetrics,
    ) -> Result<ContentPerformance> {
        let pool = sqlite(&self.pool)?;
        let result = sqlx::query(
            r#"
            INSERT INTO content_performance (campaign_id, platform, impressions, clicks, likes, shares, comments, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(campaign_id)
        .bind(platform.as_str())
        .bind(metrics.impressions)
        .bind(metrics.clicks)
        .bind(metrics.likes)
        .bind(metrics.shares)
        .bind(metrics.comments)
        .bind(Utc::now())
        .execute(pool)
        .await
        .context("Failed to record content performance")?;

        get_performance(pool, result.last_insert_rowid())
            .await?
            .ok_or_else(|| anyhow::anyhow!("Performance row not found after insert"))
    }

    async fn list_performance(&self, campaign_id: i64) -> Result<Vec<ContentPerformance>> {
        let sql = format!(
            "SELECT {} FROM content_performance WHERE campaign_id = ? ORDER BY id",
            PERFORMANCE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(campaign_id)
            .fetch_all(sqlite(&self.pool)?)
            .await
            .context("Failed to list content performance")?;
        rows.iter().map(row_to_performance).collect()
    }

    async fn get_pattern(
        &self,
        user_id: i64,
        pattern_type: PatternType,
        pattern_value: &str,
        platform: Option<Platform>,
    ) -> Result<Option<LearningPattern>> {
        let sql = format!(
            "SELECT {} FROM learning_patterns WHERE user_id = ? AND pattern_type = ? AND pattern_value = ? AND platform = ?",
            PATTERN_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(pattern_type.as_str())
            .bind(pattern_value)
            .bind(platform_key(platform))
            .fetch_optional(sqlite(&self.pool)?)
            .await
            .context("Failed to get learning pattern")?;
        row.as_ref().map(row_to_pattern).transpose()
    }

    async fn save_pattern(&self, pattern: &LearningPattern) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO learning_patterns (user_id, pattern_type, pattern_value, platform, success_score, sample_count, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, pattern_type, pattern_value, platform) DO UPDATE SET
                success_score = excluded.success_score,
                sample_count = excluded.sample_count,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(pattern.user_id)
        .bind(pattern.pattern_type.as_str())
        .bind(&pattern.pattern_value)
        .bind(platform_key(pattern.platform))
        .bind(pattern.success_score)
        .bind(pattern.sample_count)
        .bind(Utc::now())
        .execute(sqlite(&self.pool)?)
        .await
        .context("Failed to save learning pattern")?;
        Ok(())
    }

    async fn list_patterns(
        &self,
        user_id: i64,
        min_samples: i64,
        limit: i64,
    ) -> Result<Vec<LearningPattern>> {
        let sql = format!(
            "SELECT {} FROM learning_patterns WHERE user_id = ? AND sample_count >= ? ORDER BY success_score DESC, id ASC LIMIT ?",
            PATTERN_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(min_samples)
            .bind(limit)
            .fetch_all(sqlite(&self.pool)?)
            .await
            .context("Failed to list learning patterns")?;
        rows.iter().map(row_to_pattern).collect()
    }
}

/// Platform-agnostic patterns are stored with an empty platform so the
/// unique key still applies to them.
fn platform_key(platform: Option<Platform>) -> &'static str {
    platform.map(|p| p.as_str()).unwrap_or("")
}

async fn get_performance(pool: &SqlitePool, id: i64) -> Result<Option<ContentPerformance>> {
    let sql = format!(
        "SELECT {} FROM content_performance WHERE id = ?",
        PERFORMANCE_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get content performance")?;
    row.as_ref().map(row_to_performance).transpose()
}

fn row_to_performance(row: &sqlx::sqlite::SqliteRow) -> Result<ContentPerformance> {
    let platform: String = row.get("platform");
    Ok(ContentPerformance {
        id: row.get("id"),
        campaign_id: row.get("campaign_id"),
        platform: Platform::from_str(&platform)?,
        metrics: ContentMetrics {
            impressions: row.get("impressions"),
            clicks: row.get("clicks"),
            likes: row.get("likes"),
            shares: row.get("shares"),
            comments: row.get("comments"),
        },
        recorded_at: row.get("recorded_at"),
    })
}

fn row_to_pattern(row: &sqlx::sqlite::SqliteRow) -> Result<LearningPattern> {
    let pattern_type: String = row.get("pattern_type");
    let platform: String = row.get("platform");
    let platform = if platform.is_empty() {
        None
    } else {
        Some(Platform::from_str(&platform)?)
    };
    Ok(LearningPattern {
        id: row.get("id"),
        user_id: row.get("user_id"),
        pattern_type: PatternType::from_str(&pattern_type)?,
        pattern_value: row.get("pattern_value"),
        platform,
        success_score: row.get("success_score"),
        sample_count: row.get("sample_count"),
        updated_at: row.get("updated_at"),
    })
}
