//! Processed billing webhook events

use crate::db::{pool::sqlite, DynDatabasePool};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

#[async_trait]
pub trait BillingEventRepository: Send + Sync {
    /// Claim an event id before processing it.
    ///
    /// Returns false when the event id was already claimed.
    async fn record(&self, event_id: &str, event_type: &str) -> Result<bool>;

    /// Drop a claim so a redelivery can process the event
    async fn release(&self, event_id: &str) -> Result<()>;
}

pub struct SqlxBillingEventRepository {
    pool: DynDatabasePool,
}

impl SqlxBillingEventRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn BillingEventRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl BillingEventRepository for SqlxBillingEventRepository {
    async fn record(&self, event_id: &str, event_type: &str) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO billing_events (id, event_type, processed_at) VALUES (?, ?, ?) ON CONFLICT (id) DO NOTHING",
        )
        .bind(event_id)
        .bind(event_type)
        .bind(Utc::now())
        .execute(sqlite(&self.pool)?)
        .await
        .context("Failed to record billing event")?;
        Ok(result.rows_affected() > 0)
    }

    async fn release(&self, event_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM billing_events WHERE id = ?")
            .bind(event_id)
            .execute(sqlite(&self.pool)?)
            .await
            .context("Failed to release billing event")?;
        Ok(())
    }
}
