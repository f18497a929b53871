//! Credit ledger model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::AssetKind;

/// A metered generation operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationKind {
    Text,
    Image,
    Video,
}

impl GenerationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for GenerationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<AssetKind> for GenerationKind {
    fn from(kind: AssetKind) -> Self {
        match kind {
            AssetKind::Image => Self::Image,
            AssetKind::Video => Self::Video,
        }
    }
}

/// Ledger entry kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageKind {
    Text,
    Image,
    Video,
    Refund,
    Grant,
    Reset,
}

impl From<GenerationKind> for UsageKind {
    fn from(kind: GenerationKind) -> Self {
        match kind {
            GenerationKind::Text => Self::Text,
            GenerationKind::Image => Self::Image,
            GenerationKind::Video => Self::Video,
        }
    }
}

impl UsageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::Refund => "refund",
            Self::Grant => "grant",
            Self::Reset => "reset",
        }
    }
}

impl fmt::Display for UsageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UsageKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "refund" => Ok(Self::Refund),
            "grant" => Ok(Self::Grant),
            "reset" => Ok(Self::Reset),
            _ => Err(anyhow::anyhow!("Invalid usage kind: {}", s)),
        }
    }
}

/// One credit ledger row. Debits are negative amounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditUsage {
    pub id: i64,
    pub user_id: i64,
    pub kind: UsageKind,
    pub amount: i64,
    pub balance_after: i64,
    pub campaign_id: Option<i64>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}
