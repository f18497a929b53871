//! Credit repository
//!
//! Owns the `users.credits` column and the `credit_usage` ledger. Every
//! balance change and its ledger row are written in one transaction.

use crate::db::{pool::sqlite, DynDatabasePool};
use crate::models::{CreditUsage, UsageKind};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, Sqlite, Transaction};
use std::str::FromStr;
use std::sync::Arc;

/// A balance change to apply
#[derive(Debug, Clone)]
pub struct LedgerEntry<'a> {
    pub user_id: i64,
    pub kind: UsageKind,
    pub campaign_id: Option<i64>,
    pub description: &'a str,
}

#[async_trait]
pub trait CreditRepository: Send + Sync {
    /// Current balance, None if the user does not exist
    async fn balance(&self, user_id: i64) -> Result<Option<i64>>;

    /// Subtract `amount` only if the balance covers it.
    ///
    /// Returns the new balance, or None when the balance was insufficient
    /// (or the user is missing). Nothing is written in that case.
    async fn debit(&self, entry: LedgerEntry<'_>, amount: i64) -> Result<Option<i64>>;

    /// Add `amount`; returns the new balance, None if the user is missing
    async fn credit(&self, entry: LedgerEntry<'_>, amount: i64) -> Result<Option<i64>>;

    /// Overwrite the balance; the ledger records the difference
    async fn set_balance(&self, entry: LedgerEntry<'_>, balance: i64) -> Result<Option<i64>>;

    /// Most recent ledger rows first
    async fn history(&self, user_id: i64, limit: i64) -> Result<Vec<CreditUsage>>;
}

pub struct SqlxCreditRepository {
    pool: DynDatabasePool,
}

impl SqlxCreditRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CreditRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CreditRepository for SqlxCreditRepository {
    async fn balance(&self, user_id: i64) -> Result<Option<i64>> {
        let row = sqlx::query("SELECT credits FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(sqlite(&self.pool)?)
            .await
            .context("Failed to read credit balance")?;
        Ok(row.map(|r| r.get("credits")))
    }

    async fn debit(&self, entry: LedgerEntry<'_>, amount: i64) -> Result<Option<i64>> {
        let mut tx = sqlite(&self.pool)?.begin().await?;

        let row = sqlx::query(
            "UPDATE users SET credits = credits - ?, updated_at = ? WHERE id = ? AND credits >= ? RETURNING credits",
        )
        .bind(amount)
        .bind(Utc::now())
        .bind(entry.user_id)
        .bind(amount)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to debit credits")?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };
        let balance: i64 = row.get("credits");

        insert_usage(&mut tx, &entry, -amount, balance).await?;
        tx.commit().await?;
        Ok(Some(balance))
    }

    async fn credit(&self, entry: LedgerEntry<'_>, amount: i64) -> Result<Option<i64>> {
        let mut tx = sqlite(&self.pool)?.begin().await?;

        let row = sqlx::query(
            "UPDATE users SET credits = credits + ?, updated_at = ? WHERE id = ? RETURNING credits",
        )
        .bind(amount)
        .bind(Utc::now())
        .bind(entry.user_id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to add credits")?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };
        let balance: i64 = row.get("credits");

        insert_usage(&mut tx, &entry, amount, balance).await?;
        tx.commit().await?;
        Ok(Some(balance))
    }

    async fn set_balance(&self, entry: LedgerEntry<'_>, balance: i64) -> Result<Option<i64>> {
        let mut tx = sqlite(&self.pool)?.begin().await?;

        let previous = sqlx::query("SELECT credits FROM users WHERE id = ?")
            .bind(entry.user_id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to read credit balance")?;
        let Some(previous) = previous else {
            tx.rollback().await?;
            return Ok(None);
        };
        let previous: i64 = previous.get("credits");

        sqlx::query("UPDATE users SET credits = ?, updated_at = ? WHERE id = ?")
            .bind(balance)
            .bind(Utc::now())
            .bind(entry.user_id)
            .execute(&mut *tx)
            .await
            .context("Failed to set credit balance")?;

        insert_usage(&mut tx, &entry, balance - previous, balance).await?;
        tx.commit().await?;
        Ok(Some(balance))
    }

    async fn history(&self, user_id: i64, limit: i64) -> Result<Vec<CreditUsage>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, kind, amount, balance_after, campaign_id, description, created_at
            FROM credit_usage
            WHERE user_id = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(sqlite(&self.pool)?)
        .await
        .context("Failed to list credit history")?;
        rows.iter().map(row_to_usage).collect()
    }
}

async fn insert_usage(
    tx: &mut Transaction<'_, Sqlite>,
    entry: &LedgerEntry<'_>,
    amount: i64,
    balance_after: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO credit_usage (user_id, kind, amount, balance_after, campaign_id, description, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.user_id)
    .bind(entry.kind.as_str())
    .bind(amount)
    .bind(balance_after)
    .bind(entry.campaign_id)
    .bind(entry.description)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await
    .context("Failed to record credit usage")?;
    Ok(())
}

fn row_to_usage(row: &sqlx::sqlite::SqliteRow) -> Result<CreditUsage> {
    let kind: String = row.get("kind");
    Ok(CreditUsage {
        id: row.get("id"),
        user_id: row.get("user_id"),
        kind: UsageKind::from_str(&kind)?,
        amount: row.get("amount"),
        balance_after: row.get("balance_after"),
        campaign_id: row.get("campaign_id"),
        description: row.get("description"),
        created_at: row.get("created_at"),
    })
}
