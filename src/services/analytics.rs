//! Performance analytics and learning
//!
//! Every reported snapshot updates a running mean of engagement for the
//! campaign's platform, tone, industry and prompt template. Those means feed
//! back into publishing simulations.

use super::campaign::{CampaignService, CampaignServiceError};
use super::simulation;
use crate::db::repositories::AnalyticsRepository;
use crate::models::{
    Campaign, ContentMetrics, ContentPerformance, LearningPattern, PatternType, Platform,
};
use anyhow::Context;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

pub const DEFAULT_INSIGHTS_LIMIT: i64 = 20;
pub const MAX_INSIGHTS_LIMIT: i64 = 100;

#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    #[error(transparent)]
    Campaign(#[from] CampaignServiceError),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct CampaignPerformance {
    pub campaign_id: i64,
    pub snapshots: Vec<ContentPerformance>,
    pub totals: ContentMetrics,
    pub engagement_rate: f64,
}

pub struct AnalyticsService {
    repo: Arc<dyn AnalyticsRepository>,
    campaigns: Arc<CampaignService>,
}

impl AnalyticsService {
    pub fn new(repo: Arc<dyn AnalyticsRepository>, campaigns: Arc<CampaignService>) -> Self {
        Self { repo, campaigns }
    }

    /// Store a snapshot and fold its engagement rate into the user's patterns
    pub async fn record_performance(
        &self,
        user_id: i64,
        campaign_id: i64,
        metrics: ContentMetrics,
    ) -> Result<ContentPerformance, AnalyticsError> {
        validate_metrics(&metrics)?;
        let campaign = self.campaigns.get(user_id, campaign_id).await?;

        let row = self
            .repo
            .insert_performance(campaign.id, campaign.platform, &metrics)
            .await
            .context("Failed to record performance")?;

        let rate = metrics.engagement_rate();
        for (pattern_type, value, platform) in pattern_keys(&campaign) {
            self.observe(user_id, pattern_type, &value, platform, rate)
                .await?;
        }

        tracing::info!(campaign_id, user_id, rate, "Recorded performance");
        Ok(row)
    }

    pub async fn campaign_performance(
        &self,
        user_id: i64,
        campaign_id: i64,
    ) -> Result<CampaignPerformance, AnalyticsError> {
        let campaign = self.campaigns.get(user_id, campaign_id).await?;
        let snapshots = self
            .repo
            .list_performance(campaign.id)
            .await
            .context("Failed to list performance")?;

        let mut totals = ContentMetrics::default();
        for snapshot in &snapshots {
            totals.add(&snapshot.metrics);
        }

        Ok(CampaignPerformance {
            campaign_id: campaign.id,
            engagement_rate: totals.engagement_rate(),
            totals,
            snapshots,
        })
    }

    /// Learned patterns, best score first
    pub async fn insights(&self, user_id: i64, limit: i64) -> Result<Vec<LearningPattern>, AnalyticsError> {
        let limit = match limit {
            n if n <= 0 => DEFAULT_INSIGHTS_LIMIT,
            n => n.min(MAX_INSIGHTS_LIMIT),
        };
        let patterns = self
            .repo
            .list_patterns(user_id, 1, limit)
            .await
            .context("Failed to list learning patterns")?;
        Ok(patterns)
    }

    /// Reach multiplier from the user's history on `platform`
    pub async fn learned_multiplier(&self, user_id: i64, platform: Platform) -> Result<f64, AnalyticsError> {
        Ok(simulation::learned_multiplier(
            self.learned_score(user_id, platform).await?,
        ))
    }

    /// Mean engagement rate on `platform`, 0 without history
    pub async fn learned_score(&self, user_id: i64, platform: Platform) -> Result<f64, AnalyticsError> {
        let pattern = self
            .repo
            .get_pattern(user_id, PatternType::Platform, platform.as_str(), None)
            .await
            .context("Failed to read learning pattern")?;
        Ok(pattern.map(|p| p.success_score).unwrap_or(0.0))
    }

    async fn observe(
        &self,
        user_id: i64,
        pattern_type: PatternType,
        value: &str,
        platform: Option<Platform>,
        rate: f64,
    ) -> Result<(), AnalyticsError> {
        let mut pattern = self
            .repo
            .get_pattern(user_id, pattern_type, value, platform)
            .await
            .context("Failed to read learning pattern")?
            .unwrap_or_else(|| LearningPattern {
                id: 0,
                user_id,
                pattern_type,
                pattern_value: value.to_string(),
                platform,
                success_score: 0.0,
                sample_count: 0,
                updated_at: Utc::now(),
            });

        pattern.observe(rate);
        pattern.updated_at = Utc::now();
        self.repo
            .save_pattern(&pattern)
            .await
            .context("Failed to save learning pattern")?;
        Ok(())
    }
}

/// Attributes of a campaign that patterns are learned for
fn pattern_keys(campaign: &Campaign) -> Vec<(PatternType, String, Option<Platform>)> {
    let platform = Some(campaign.platform);
    let mut keys = vec![(
        PatternType::Platform,
        campaign.platform.as_str().to_string(),
        None,
    )];

    let normalized = |v: &Option<String>| {
        v.as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
    };
    if let Some(tone) = normalized(&campaign.brief.tone) {
        keys.push((PatternType::Tone, tone, platform));
    }
    if let Some(industry) = normalized(&campaign.brief.industry) {
        keys.push((PatternType::Industry, industry, platform));
    }
    if let Some(template) = &campaign.prompt_template_id {
        keys.push((PatternType::Template, template.clone(), platform));
    }
    keys
}

fn validate_metrics(metrics: &ContentMetrics) -> Result<(), AnalyticsError> {
    let fields = [
        ("impressions", metrics.impressions),
        ("clicks", metrics.clicks),
        ("likes", metrics.likes),
        ("shares", metrics.shares),
        ("comments", metrics.comments),
    ];
    if let Some((name, _)) = fields.iter().find(|(_, v)| *v < 0) {
        return Err(AnalyticsError::ValidationError(format!(
            "{} cannot be negative",
            name
        )));
    }
    let Some(interactions) = metrics.checked_interactions() else {
        return Err(AnalyticsError::ValidationError(
            "Interaction counts are too large".to_string(),
        ));
    };
    if metrics.impressions == 0 && interactions > 0 {
        return Err(AnalyticsError::ValidationError(
            "Interactions require at least one impression".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxAnalyticsRepository, SqlxCampaignRepository};
    use crate::db::DynDatabasePool;
    use crate::test_support::{insert_campaign, insert_user, migrated_pool};

    async fn setup() -> (AnalyticsService, DynDatabasePool, i64) {
        let pool = migrated_pool().await;
        let user_id = insert_user(&pool, "marketer", 0).await;
        let campaigns = Arc::new(CampaignService::new(SqlxCampaignRepository::boxed(pool.clone())));
        (
            AnalyticsService::new(SqlxAnalyticsRepository::boxed(pool.clone()), campaigns),
            pool,
            user_id,
        )
    }

    fn metrics(impressions: i64, likes: i64) -> ContentMetrics {
        ContentMetrics {
            impressions,
            likes,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_record_updates_patterns() {
        let (service, pool, user_id) = setup().await;
        let id = insert_campaign(&pool, user_id, Platform::Instagram, "published").await;

        service.record_performance(user_id, id, metrics(1000, 100)).await.unwrap();
        service.record_performance(user_id, id, metrics(1000, 300)).await.unwrap();

        let score = service.learned_score(user_id, Platform::Instagram).await.unwrap();
        assert!((score - 0.2).abs() < 1e-9);
        assert!((service.learned_multiplier(user_id, Platform::Instagram).await.unwrap() - 1.2).abs() < 1e-9);
        assert_eq!(service.learned_score(user_id, Platform::TikTok).await.unwrap(), 0.0);

        let insights = service.insights(user_id, 0).await.unwrap();
        let kinds: Vec<PatternType> = insights.iter().map(|p| p.pattern_type).collect();
        assert!(kinds.contains(&PatternType::Platform));
        assert!(kinds.contains(&PatternType::Tone));
        assert!(kinds.contains(&PatternType::Industry));
        let tone = insights
            .iter()
            .find(|p| p.pattern_type == PatternType::Tone)
            .unwrap();
        assert_eq!(tone.pattern_value, "playful");
        assert_eq!(tone.platform, Some(Platform::Instagram));
        assert_eq!(tone.sample_count, 2);
    }

    #[tokio::test]
    async fn test_campaign_performance_totals() {
        let (service, pool, user_id) = setup().await;
        let id = insert_campaign(&pool, user_id, Platform::Facebook, "published").await;

        service.record_performance(user_id, id, metrics(400, 10)).await.unwrap();
        service.record_performance(user_id, id, metrics(600, 40)).await.unwrap();

        let performance = service.campaign_performance(user_id, id).await.unwrap();
        assert_eq!(performance.snapshots.len(), 2);
        assert_eq!(performance.totals.impressions, 1000);
        assert_eq!(performance.totals.likes, 50);
        assert!((performance.engagement_rate - 0.05).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_metric_validation() {
        let (service, pool, user_id) = setup().await;
        let id = insert_campaign(&pool, user_id, Platform::Facebook, "published").await;

        let negative = service.record_performance(user_id, id, metrics(-1, 0)).await;
        assert!(matches!(negative, Err(AnalyticsError::ValidationError(_))));

        let no_impressions = service.record_performance(user_id, id, metrics(0, 5)).await;
        assert!(matches!(no_impressions, Err(AnalyticsError::ValidationError(_))));

        assert!(service.record_performance(user_id, id, metrics(0, 0)).await.is_ok());
    }

    #[tokio::test]
    async fn test_overflowing_metrics_are_rejected() {
        let (service, pool, user_id) = setup().await;
        let id = insert_campaign(&pool, user_id, Platform::Facebook, "published").await;

        let huge = ContentMetrics {
            impressions: 10,
            clicks: i64::MAX,
            likes: 1,
            ..Default::default()
        };
        let result = service.record_performance(user_id, id, huge).await;
        assert!(matches!(result, Err(AnalyticsError::ValidationError(_))));
        assert!(service.insights(user_id, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_other_users_campaign_is_not_found() {
        let (service, pool, user_id) = setup().await;
        let other = insert_user(&pool, "rival", 0).await;
        let id = insert_campaign(&pool, other, Platform::Facebook, "published").await;

        let result = service.record_performance(user_id, id, metrics(10, 1)).await;
        assert!(matches!(
            result,
            Err(AnalyticsError::Campaign(CampaignServiceError::NotFound(_)))
        ));
    }
}
