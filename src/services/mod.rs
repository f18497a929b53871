//! Services layer - Business logic
//!
//! This module contains the business logic of Adloom. Services are
//! responsible for:
//! - Implementing business rules (status transitions, credit metering)
//! - Coordinating repositories, AI providers and social platforms
//! - Handling validation and error cases

pub mod analytics;
pub mod asset_hosting;
pub mod billing;
pub mod brand;
pub mod campaign;
pub mod credits;
pub mod generation;
pub mod oauth;
pub mod password;
pub mod prompt_library;
pub mod publishing;
pub mod rate_limiter;
pub mod simulation;
pub mod user;

pub use analytics::{AnalyticsError, AnalyticsService, CampaignPerformance};
pub use asset_hosting::{AssetError, AssetHostingService, RehostSummary};
pub use billing::{BillingError, BillingService, CheckoutSession, EventOutcome};
pub use brand::augment_prompt;
pub use campaign::{CampaignService, CampaignServiceError};
pub use credits::{CreditError, CreditService};
pub use generation::{Generated, GenerationError, GenerationService};
pub use oauth::{AuthorizeRedirect, OAuthError, OAuthService};
pub use password::{hash_password, verify_password};
pub use prompt_library::{BuiltPrompt, PromptLibrary, PromptTemplate, ScoredTemplate};
pub use publishing::{PublishError, PublishInput, PublishOutcome, PublishingService};
pub use rate_limiter::{GenerationRateLimiter, LoginRateLimiter};
pub use simulation::{estimate, Estimate, SimulationInput};
pub use user::{LoginInput, RegisterInput, UserService, UserServiceError};
