//! Credit metering
//!
//! Generation is paid for up front. A debit either covers the full cost or
//! changes nothing; failed generations are refunded.

use crate::config::CreditsConfig;
use crate::db::repositories::{CreditRepository, LedgerEntry};
use crate::models::{CreditUsage, GenerationKind, SubscriptionTier, UsageKind};
use anyhow::Context;
use std::sync::Arc;

pub const MAX_HISTORY: i64 = 200;

#[derive(Debug, thiserror::Error)]
pub enum CreditError {
    #[error("Insufficient credits: {required} required, {available} available")]
    InsufficientCredits { required: i64, available: i64 },

    #[error("User not found: {0}")]
    UserNotFound(i64),

    #[error("Invalid credit amount: {0}")]
    InvalidAmount(i64),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct CreditService {
    repo: Arc<dyn CreditRepository>,
    config: CreditsConfig,
}

impl CreditService {
    pub fn new(repo: Arc<dyn CreditRepository>, config: CreditsConfig) -> Self {
        Self { repo, config }
    }

    pub fn cost(&self, kind: GenerationKind) -> i64 {
        self.config.cost(kind)
    }

    pub fn allowance(&self, tier: SubscriptionTier) -> i64 {
        self.config.allowance(tier)
    }

    pub async fn balance(&self, user_id: i64) -> Result<i64, CreditError> {
        self.repo
            .balance(user_id)
            .await
            .context("Failed to read balance")?
            .ok_or(CreditError::UserNotFound(user_id))
    }

    /// Charge the cost of one generation, returning the new balance
    pub async fn debit(
        &self,
        user_id: i64,
        kind: GenerationKind,
        campaign_id: Option<i64>,
        description: &str,
    ) -> Result<i64, CreditError> {
        let required = self.cost(kind);
        let entry = LedgerEntry {
            user_id,
            kind: kind.into(),
            campaign_id,
            description,
        };

        match self
            .repo
            .debit(entry, required)
            .await
            .context("Failed to debit credits")?
        {
            Some(balance) => {
                tracing::debug!(user_id, required, balance, "Debited credits");
                Ok(balance)
            }
            None => {
                let available = self.balance(user_id).await?;
                Err(CreditError::InsufficientCredits {
                    required,
                    available,
                })
            }
        }
    }

    /// Return credits for a generation that did not produce anything
    pub async fn refund(
        &self,
        user_id: i64,
        amount: i64,
        campaign_id: Option<i64>,
        reason: &str,
    ) -> Result<i64, CreditError> {
        self.add(user_id, amount, UsageKind::Refund, campaign_id, reason)
            .await
    }

    pub async fn grant(&self, user_id: i64, amount: i64, reason: &str) -> Result<i64, CreditError> {
        self.add(user_id, amount, UsageKind::Grant, None, reason).await
    }

    /// Set the balance to the tier's allowance
    pub async fn reset_to_allowance(
        &self,
        user_id: i64,
        tier: SubscriptionTier,
    ) -> Result<i64, CreditError> {
        let allowance = self.allowance(tier);
        let description = format!("{} plan allowance", tier);
        let entry = LedgerEntry {
            user_id,
            kind: UsageKind::Reset,
            campaign_id: None,
            description: &description,
        };

        self.repo
            .set_balance(entry, allowance)
            .await
            .context("Failed to reset credits")?
            .ok_or(CreditError::UserNotFound(user_id))
    }

    /// Most recent ledger rows, capped at `MAX_HISTORY`
    pub async fn history(&self, user_id: i64, limit: i64) -> Result<Vec<CreditUsage>, CreditError> {
        let limit = limit.clamp(1, MAX_HISTORY);
        let rows = self
            .repo
            .history(user_id, limit)
            .await
            .context("Failed to read credit history")?;
        Ok(rows)
    }

    async fn add(
        &self,
        user_id: i64,
        amount: i64,
        kind: UsageKind,
        campaign_id: Option<i64>,
        description: &str,
    ) -> Result<i64, CreditError> {
        if amount <= 0 {
            return Err(CreditError::InvalidAmount(amount));
        }
        let entry = LedgerEntry {
            user_id,
            kind,
            campaign_id,
            description,
        };
        self.repo
            .credit(entry, amount)
            .await
            .context("Failed to add credits")?
            .ok_or(CreditError::UserNotFound(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxCreditRepository;
    use crate::models::Platform;
    use crate::test_support::{credits_of, insert_campaign, insert_user, migrated_pool};

    async fn setup(credits: i64) -> (CreditService, i64, crate::db::DynDatabasePool) {
        let pool = migrated_pool().await;
        let user_id = insert_user(&pool, "metered", credits).await;
        let service = CreditService::new(
            SqlxCreditRepository::boxed(pool.clone()),
            CreditsConfig::default(),
        );
        (service, user_id, pool)
    }

    #[tokio::test]
    async fn test_debit_uses_configured_cost() {
        let (service, user_id, pool) = setup(20).await;

        assert_eq!(
            service.debit(user_id, GenerationKind::Image, None, "image").await.unwrap(),
            15
        );
        assert_eq!(credits_of(&pool, user_id).await, 15);
    }

    #[tokio::test]
    async fn test_insufficient_credits_reports_balance() {
        let (service, user_id, pool) = setup(4).await;

        let result = service.debit(user_id, GenerationKind::Video, None, "video").await;
        assert!(matches!(
            result,
            Err(CreditError::InsufficientCredits {
                required: 20,
                available: 4
            })
        ));
        assert_eq!(credits_of(&pool, user_id).await, 4);
        assert!(service.history(user_id, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_debits_never_overdraw() {
        let (service, user_id, pool) = setup(10).await;
        let service = Arc::new(service);

        let mut handles = Vec::new();
        for _ in 0..5 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service.debit(user_id, GenerationKind::Image, None, "image").await
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }
        assert_eq!(succeeded, 2);
        assert_eq!(credits_of(&pool, user_id).await, 0);
    }

    #[tokio::test]
    async fn test_refund_grant_and_reset() {
        let (service, user_id, pool) = setup(10).await;
        let campaign_id = insert_campaign(&pool, user_id, Platform::Instagram, "draft").await;

        assert_eq!(
            service
                .debit(user_id, GenerationKind::Image, Some(campaign_id), "image")
                .await
                .unwrap(),
            5
        );
        assert_eq!(
            service
                .refund(user_id, 5, Some(campaign_id), "provider failed")
                .await
                .unwrap(),
            10
        );
        assert_eq!(service.grant(user_id, 3, "support").await.unwrap(), 13);
        assert_eq!(
            service.reset_to_allowance(user_id, SubscriptionTier::Pro).await.unwrap(),
            1000
        );

        let kinds: Vec<UsageKind> = service
            .history(user_id, 10)
            .await
            .unwrap()
            .iter()
            .map(|u| u.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![UsageKind::Reset, UsageKind::Grant, UsageKind::Refund, UsageKind::Image]
        );
    }

    #[tokio::test]
    async fn test_invalid_amounts_and_missing_user() {
        let (service, user_id, _) = setup(10).await;

        assert!(matches!(
            service.grant(user_id, 0, "nothing").await,
            Err(CreditError::InvalidAmount(0))
        ));
        assert!(matches!(
            service.balance(9999).await,
            Err(CreditError::UserNotFound(9999))
        ));
        assert!(matches!(
            service.debit(9999, GenerationKind::Text, None, "text").await,
            Err(CreditError::UserNotFound(9999))
        ));
    }
}
