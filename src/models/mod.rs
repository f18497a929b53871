//! Data models
//!
//! This module contains all data structures used throughout Adloom.
//! Models represent:
//! - Database entities (User, Session, Campaign, Asset, OAuthConnection,
//!   CreditUsage, ContentPerformance, LearningPattern, Publication,
//!   PublishingSimulation)
//! - API request inputs
//! - Status enumerations stored as lowercase text

mod analytics;
mod asset;
mod campaign;
mod credit;
mod oauth_connection;
mod publishing;
mod session;
mod user;

pub use analytics::{ContentMetrics, ContentPerformance, LearningPattern, PatternType};
pub use asset::{Asset, AssetKind, HostingStatus};
pub use campaign::{
    truncate_chars, BrandConcept, Campaign, CampaignBrief, CampaignStatus, CreateCampaignInput,
    GeneratedContent, ListCampaignsParams, PagedResult, Platform, UpdateCampaignInput,
};
pub use credit::{CreditUsage, GenerationKind, UsageKind};
pub use oauth_connection::OAuthConnection;
pub use publishing::{Publication, PublishingSimulation};
pub use session::Session;
pub use user::{SubscriptionTier, User};
