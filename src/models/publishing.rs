//! Publications and simulated publishing results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Platform;

/// A post that went out to a platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Publication {
    pub id: i64,
    pub campaign_id: i64,
    pub platform: Platform,
    pub asset_id: Option<i64>,
    pub external_id: String,
    pub url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Estimated outcome of publishing, recorded instead of calling a platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishingSimulation {
    pub id: i64,
    pub campaign_id: i64,
    pub platform: Platform,
    pub asset_id: Option<i64>,
    pub caption: String,
    pub estimated_reach: i64,
    pub estimated_engagement: i64,
    pub best_time: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}
