//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the operations for a specific entity.

pub mod analytics;
pub mod asset;
pub mod billing_event;
pub mod campaign;
pub mod credit;
pub mod oauth_connection;
pub mod publishing;
pub mod session;
pub mod user;

pub use analytics::{AnalyticsRepository, SqlxAnalyticsRepository};
pub use asset::{AssetRepository, SqlxAssetRepository};
pub use billing_event::{BillingEventRepository, SqlxBillingEventRepository};
pub use campaign::{CampaignRepository, SqlxCampaignRepository};
pub use credit::{CreditRepository, LedgerEntry, SqlxCreditRepository};
pub use oauth_connection::{OAuthConnectionRepository, SqlxOAuthConnectionRepository};
pub use publishing::{PublishingRepository, SqlxPublishingRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use user::{SqlxUserRepository, UserRepository};
