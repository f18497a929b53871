//! Publishing simulation
//!
//! Deterministic reach and engagement estimates used when a campaign is
//! published in simulate mode.

use crate::models::{AssetKind, Platform};
use serde::Serialize;

/// Hashtags beyond this count add nothing
pub const MAX_COUNTED_HASHTAGS: usize = 10;
const HASHTAG_BOOST: f64 = 0.05;
/// Ceiling on the learned performance multiplier
pub const MAX_LEARNED_MULTIPLIER: f64 = 2.0;

/// What the estimate is computed from
#[derive(Debug, Clone, Copy)]
pub struct SimulationInput {
    pub platform: Platform,
    pub media: Option<AssetKind>,
    pub hashtag_count: usize,
    /// The user's learned success score for the platform
    pub learned_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Estimate {
    pub estimated_reach: i64,
    pub estimated_engagement: i64,
    pub best_time: &'static str,
    pub notes: String,
}

pub fn base_reach(platform: Platform) -> f64 {
    match platform {
        Platform::Facebook => 1200.0,
        Platform::Instagram => 1500.0,
        Platform::TikTok => 2500.0,
        Platform::YouTube => 900.0,
    }
}

pub fn engagement_rate(platform: Platform) -> f64 {
    match platform {
        Platform::Facebook => 0.02,
        Platform::Instagram => 0.035,
        Platform::TikTok => 0.05,
        Platform::YouTube => 0.03,
    }
}

pub fn best_time(platform: Platform) -> &'static str {
    match platform {
        Platform::Facebook => "Wednesday 11:00-13:00",
        Platform::Instagram => "Tuesday 11:00-14:00",
        Platform::TikTok => "Thursday 19:00-21:00",
        Platform::YouTube => "Friday 15:00-17:00",
    }
}

pub fn media_factor(media: Option<AssetKind>) -> f64 {
    match media {
        Some(AssetKind::Video) => 1.6,
        Some(AssetKind::Image) => 1.3,
        None => 1.0,
    }
}

pub fn hashtag_factor(count: usize) -> f64 {
    1.0 + HASHTAG_BOOST * count.min(MAX_COUNTED_HASHTAGS) as f64
}

/// `1 + score`, never below 1 and capped at `MAX_LEARNED_MULTIPLIER`
pub fn learned_multiplier(score: f64) -> f64 {
    if !score.is_finite() {
        return 1.0;
    }
    (1.0 + score.max(0.0)).min(MAX_LEARNED_MULTIPLIER)
}

pub fn estimate(input: SimulationInput) -> Estimate {
    let media = media_factor(input.media);
    let hashtags = hashtag_factor(input.hashtag_count);
    let learned = learned_multiplier(input.learned_score);

    let reach = base_reach(input.platform) * media * hashtags * learned;
    let engagement = reach * engagement_rate(input.platform);

    let media_label = match input.media {
        Some(kind) => kind.as_str(),
        None => "text only",
    };
    let notes = format!(
        "Base reach {:.0} on {}; {} x{:.2}; {} hashtags x{:.2}; learned performance x{:.2}",
        base_reach(input.platform),
        input.platform,
        media_label,
        media,
        input.hashtag_count.min(MAX_COUNTED_HASHTAGS),
        hashtags,
        learned,
    );

    Estimate {
        estimated_reach: reach.round() as i64,
        estimated_engagement: engagement.round() as i64,
        best_time: best_time(input.platform),
        notes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn input(platform: Platform, media: Option<AssetKind>, hashtags: usize, score: f64) -> SimulationInput {
        SimulationInput {
            platform,
            media,
            hashtag_count: hashtags,
            learned_score: score,
        }
    }

    #[test]
    fn test_text_only_baseline() {
        let estimate = estimate(input(Platform::Facebook, None, 0, 0.0));
        assert_eq!(estimate.estimated_reach, 1200);
        assert_eq!(estimate.estimated_engagement, 24);
        assert_eq!(estimate.best_time, "Wednesday 11:00-13:00");
    }

    #[test]
    fn test_factors_multiply() {
        // 1500 * 1.3 * 1.15 * 1.1
        let estimate = estimate(input(Platform::Instagram, Some(AssetKind::Image), 3, 0.1));
        assert_eq!(estimate.estimated_reach, 2467);
        assert_eq!(estimate.estimated_engagement, 86);
        assert!(estimate.notes.contains("image x1.30"));
    }

    #[test]
    fn test_hashtags_cap_at_ten() {
        let ten = estimate(input(Platform::TikTok, Some(AssetKind::Video), 10, 0.0));
        let thirty = estimate(input(Platform::TikTok, Some(AssetKind::Video), 30, 0.0));
        assert_eq!(ten, thirty);
        assert_eq!(ten.estimated_reach, 6000);
    }

    #[test]
    fn test_learned_multiplier_bounds() {
        assert_eq!(learned_multiplier(0.25), 1.25);
        assert_eq!(learned_multiplier(5.0), MAX_LEARNED_MULTIPLIER);
        assert_eq!(learned_multiplier(-1.0), 1.0);
        assert_eq!(learned_multiplier(f64::NAN), 1.0);
    }

    proptest! {
        #[test]
        fn prop_estimate_is_deterministic_and_bounded(
            idx in 0usize..4,
            media in prop::option::of(prop_oneof![Just(AssetKind::Image), Just(AssetKind::Video)]),
            hashtags in 0usize..50,
            score in -1.0f64..10.0,
        ) {
            let platform = Platform::ALL[idx];
            let a = estimate(input(platform, media, hashtags, score));
            let b = estimate(input(platform, media, hashtags, score));
            prop_assert_eq!(&a, &b);

            let base = base_reach(platform);
            let max = base * 1.6 * 1.5 * MAX_LEARNED_MULTIPLIER;
            prop_assert!(a.estimated_reach as f64 >= base.round());
            prop_assert!(a.estimated_reach as f64 <= max.round());
            prop_assert!(a.estimated_engagement <= a.estimated_reach);
        }
    }
}
