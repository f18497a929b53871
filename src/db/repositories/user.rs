//! User repository
//!
//! Database operations for users.
//!
//! This module provides:
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait on the configured pool
//!
//! The credit balance column is owned by the credit ledger
//! (`CreditRepository`); `update` never writes it.

use crate::db::{pool::sqlite, DynDatabasePool};
use crate::models::{SubscriptionTier, User};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

const USER_COLUMNS: &str =
    "id, username, email, password_hash, tier, credits, stripe_customer_id, created_at, updated_at";

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user
    async fn create(&self, user: &User) -> Result<User>;

    /// Get user by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Get user by username
    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Get user by email
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Get user by Stripe customer id
    async fn get_by_stripe_customer(&self, customer_id: &str) -> Result<Option<User>>;

    /// Update profile, tier and billing fields
    async fn update(&self, user: &User) -> Result<User>;

    /// Delete a user
    async fn delete(&self, id: i64) -> Result<()>;

    /// Count total users
    async fn count(&self) -> Result<i64>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    /// Create a new SQLx user repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        create_user(sqlite(&self.pool)?, user).await
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(sqlite(&self.pool)?)
            .await
            .context("Failed to get user by ID")?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE username = ?", USER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(username)
            .fetch_optional(sqlite(&self.pool)?)
            .await
            .context("Failed to get user by username")?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE email = ?", USER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(email)
            .fetch_optional(sqlite(&self.pool)?)
            .await
            .context("Failed to get user by email")?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn get_by_stripe_customer(&self, customer_id: &str) -> Result<Option<User>> {
        let sql = format!(
            "SELECT {} FROM users WHERE stripe_customer_id = ?",
            USER_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(customer_id)
            .fetch_optional(sqlite(&self.pool)?)
            .await
            .context("Failed to get user by Stripe customer")?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn update(&self, user: &User) -> Result<User> {
        update_user(sqlite(&self.pool)?, user).await?;
        self.get_by_id(user.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(sqlite(&self.pool)?)
            .await
            .context("Failed to delete user")?;
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM users")
            .fetch_one(sqlite(&self.pool)?)
            .await
            .context("Failed to count users")?;
        Ok(row.get("count"))
    }
}

async fn create_user(pool: &SqlitePool, user: &User) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (username, email, password_hash, tier, credits, stripe_customer_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.tier.as_str())
    .bind(user.credits)
    .bind(&user.stripe_customer_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_rowid(),
        created_at: now,
        updated_at: now,
        ..user.clone()
    })
}

async fn update_user(pool: &SqlitePool, user: &User) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE users
        SET username = ?, email = ?, password_hash = ?, tier = ?, stripe_customer_id = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.tier.as_str())
    .bind(&user.stripe_customer_id)
    .bind(Utc::now())
    .bind(user.id)
    .execute(pool)
    .await
    .context("Failed to update user")?;
    Ok(())
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    let tier_str: String = row.get("tier");
    let tier = SubscriptionTier::from_str(&tier_str)
        .with_context(|| format!("Invalid tier in database: {}", tier_str))?;

    Ok(User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        tier,
        credits: row.get("credits"),
        stripe_customer_id: row.get("stripe_customer_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::password::hash_password;
    use crate::test_support::migrated_pool;

    async fn setup_test_repo() -> SqlxUserRepository {
        SqlxUserRepository::new(migrated_pool().await)
    }

    fn create_test_user(username: &str, email: &str) -> User {
        User::new(
            username.to_string(),
            email.to_string(),
            hash_password("test_password").expect("Failed to hash password"),
            20,
        )
    }

    #[tokio::test]
    async fn test_create_user() {
        let repo = setup_test_repo().await;
        let created = repo
            .create(&create_test_user("testuser", "test@example.com"))
            .await
            .expect("Failed to create user");

        assert!(created.id > 0);
        assert_eq!(created.username, "testuser");
        assert_eq!(created.tier, SubscriptionTier::Free);
        assert_eq!(created.credits, 20);
    }

    #[tokio::test]
    async fn test_lookups() {
        let repo = setup_test_repo().await;
        let created = repo
            .create(&create_test_user("findme", "findme@example.com"))
            .await
            .unwrap();

        assert_eq!(repo.get_by_id(created.id).await.unwrap().unwrap().username, "findme");
        assert!(repo.get_by_username("findme").await.unwrap().is_some());
        assert!(repo.get_by_email("findme@example.com").await.unwrap().is_some());
        assert!(repo.get_by_id(999).await.unwrap().is_none());
        assert!(repo.get_by_username("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_tier_and_customer_keeps_credits() {
        let repo = setup_test_repo().await;
        let mut user = repo
            .create(&create_test_user("payer", "payer@example.com"))
            .await
            .unwrap();

        user.tier = SubscriptionTier::Pro;
        user.stripe_customer_id = Some("cus_123".to_string());
        user.credits = 99_999;

        let updated = repo.update(&user).await.unwrap();
        assert_eq!(updated.tier, SubscriptionTier::Pro);
        assert_eq!(updated.credits, 20);

        let by_customer = repo.get_by_stripe_customer("cus_123").await.unwrap().unwrap();
        assert_eq!(by_customer.id, user.id);
    }

    #[tokio::test]
    async fn test_unique_constraints() {
        let repo = setup_test_repo().await;
        repo.create(&create_test_user("dup", "one@example.com")).await.unwrap();

        assert!(repo.create(&create_test_user("dup", "two@example.com")).await.is_err());
        assert!(repo.create(&create_test_user("other", "one@example.com")).await.is_err());
    }

    #[tokio::test]
    async fn test_count_and_delete() {
        let repo = setup_test_repo().await;
        assert_eq!(repo.count().await.unwrap(), 0);

        let user = repo.create(&create_test_user("u1", "u1@example.com")).await.unwrap();
        repo.create(&create_test_user("u2", "u2@example.com")).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 2);

        repo.delete(user.id).await.unwrap();
        assert!(repo.get_by_id(user.id).await.unwrap().is_none());
    }
}
