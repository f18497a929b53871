//! Content performance and learned patterns

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Platform;

/// Metrics reported for a published campaign
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentMetrics {
    #[serde(default)]
    pub impressions: i64,
    #[serde(default)]
    pub clicks: i64,
    #[serde(default)]
    pub likes: i64,
    #[serde(default)]
    pub shares: i64,
    #[serde(default)]
    pub comments: i64,
}

impl ContentMetrics {
    /// Sum of all interactions, `None` on overflow
    pub fn checked_interactions(&self) -> Option<i64> {
        self.clicks
            .checked_add(self.likes)?
            .checked_add(self.shares)?
            .checked_add(self.comments)
    }

    pub fn interactions(&self) -> i64 {
        self.clicks
            .saturating_add(self.likes)
            .saturating_add(self.shares)
            .saturating_add(self.comments)
    }

    /// Interactions per impression, 0 when nothing was shown
    pub fn engagement_rate(&self) -> f64 {
        if self.impressions <= 0 {
            return 0.0;
        }
        self.interactions() as f64 / self.impressions as f64
    }

    /// Accumulate another snapshot, saturating at `i64::MAX`
    pub fn add(&mut self, other: &ContentMetrics) {
        self.impressions = self.impressions.saturating_add(other.impressions);
        self.clicks = self.clicks.saturating_add(other.clicks);
        self.likes = self.likes.saturating_add(other.likes);
        self.shares = self.shares.saturating_add(other.shares);
        self.comments = self.comments.saturating_add(other.comments);
    }
}

/// One performance snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentPerformance {
    pub id: i64,
    pub campaign_id: i64,
    pub platform: Platform,
    #[serde(flatten)]
    pub metrics: ContentMetrics,
    pub recorded_at: DateTime<Utc>,
}

/// What a learning pattern is keyed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternType {
    Platform,
    Tone,
    Industry,
    Template,
}

impl PatternType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Platform => "platform",
            Self::Tone => "tone",
            Self::Industry => "industry",
            Self::Template => "template",
        }
    }
}

impl std::str::FromStr for PatternType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "platform" => Ok(Self::Platform),
            "tone" => Ok(Self::Tone),
            "industry" => Ok(Self::Industry),
            "template" => Ok(Self::Template),
            _ => Err(anyhow::anyhow!("Invalid pattern type: {}", s)),
        }
    }
}

/// Running mean of engagement for one attribute of a user's campaigns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningPattern {
    pub id: i64,
    pub user_id: i64,
    pub pattern_type: PatternType,
    pub pattern_value: String,
    pub platform: Option<Platform>,
    pub success_score: f64,
    pub sample_count: i64,
    pub updated_at: DateTime<Utc>,
}

impl LearningPattern {
    /// Fold one observation into the running mean
    pub fn observe(&mut self, rate: f64) {
        let n = self.sample_count as f64;
        self.success_score = (self.success_score * n + rate) / (n + 1.0);
        self.sample_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engagement_rate() {
        let metrics = ContentMetrics {
            impressions: 1000,
            clicks: 10,
            likes: 30,
            shares: 5,
            comments: 5,
        };
        assert!((metrics.engagement_rate() - 0.05).abs() < 1e-9);
        assert_eq!(ContentMetrics::default().engagement_rate(), 0.0);
    }

    #[test]
    fn test_large_counts_do_not_overflow() {
        let metrics = ContentMetrics {
            impressions: 10,
            clicks: i64::MAX,
            likes: 1,
            ..Default::default()
        };
        assert_eq!(metrics.checked_interactions(), None);
        assert_eq!(metrics.interactions(), i64::MAX);
        assert!(metrics.engagement_rate() > 0.0);

        let mut totals = metrics;
        totals.add(&metrics);
        assert_eq!(totals.clicks, i64::MAX);
        assert_eq!(totals.impressions, 20);
    }

    #[test]
    fn test_running_mean() {
        let mut pattern = LearningPattern {
            id: 0,
            user_id: 1,
            pattern_type: PatternType::Tone,
            pattern_value: "playful".into(),
            platform: None,
            success_score: 0.0,
            sample_count: 0,
            updated_at: Utc::now(),
        };
        pattern.observe(0.1);
        pattern.observe(0.3);
        assert_eq!(pattern.sample_count, 2);
        assert!((pattern.success_score - 0.2).abs() < 1e-9);
    }
}
