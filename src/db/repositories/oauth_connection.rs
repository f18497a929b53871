//! OAuth connection repository
//!
//! One connection per user and platform; reconnecting replaces the tokens.

use crate::db::{pool::sqlite, DynDatabasePool};
use crate::models::{OAuthConnection, Platform};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

const CONNECTION_COLUMNS: &str = "id, user_id, platform, account_id, account_name, access_token, refresh_token, scopes, expires_at, created_at, updated_at";

#[async_trait]
pub trait OAuthConnectionRepository: Send + Sync {
    /// Insert or replace the connection for (user, platform)
    async fn upsert(&self, connection: &OAuthConnection) -> Result<OAuthConnection>;

    async fn get(&self, user_id: i64, platform: Platform) -> Result<Option<OAuthConnection>>;

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<OAuthConnection>>;

    /// Store refreshed tokens
    async fn update_tokens(
        &self,
        id: i64,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    async fn delete(&self, user_id: i64, platform: Platform) -> Result<bool>;
}

pub struct SqlxOAuthConnectionRepository {
    pool: DynDatabasePool,
}

impl SqlxOAuthConnectionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn OAuthConnectionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl OAuthConnectionRepository for SqlxOAuthConnectionRepository {
    async fn upsert(&self, connection: &OAuthConnection) -> Result<OAuthConnection> {
        let pool = sqlite(&self.pool)?;
        upsert_connection(pool, connection).await?;
        get_connection(pool, connection.user_id, connection.platform)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Connection not found after upsert"))
    }

    async fn get(&self, user_id: i64, platform: Platform) -> Result<Option<OAuthConnection>> {
        get_connection(sqlite(&self.pool)?, user_id, platform).await
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<OAuthConnection>> {
        let sql = format!(
            "SELECT {} FROM oauth_connections WHERE user_id = ? ORDER BY platform",
            CONNECTION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(sqlite(&self.pool)?)
            .await
            .context("Failed to list OAuth connections")?;
        rows.iter().map(row_to_connection).collect()
    }

    async fn update_tokens(
        &self,
        id: i64,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        // A refresh response without a new refresh token keeps the old one
        sqlx::query(
            r#"
            UPDATE oauth_connections
            SET access_token = ?, refresh_token = COALESCE(?, refresh_token), expires_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(access_token)
        .bind(refresh_token)
        .bind(expires_at)
        .bind(Utc::now())
        .bind(id)
        .execute(sqlite(&self.pool)?)
        .await
        .context("Failed to update OAuth tokens")?;
        Ok(())
    }

    async fn delete(&self, user_id: i64, platform: Platform) -> Result<bool> {
        let result = sqlx::query("DELETE FROM oauth_connections WHERE user_id = ? AND platform = ?")
            .bind(user_id)
            .bind(platform.as_str())
            .execute(sqlite(&self.pool)?)
            .await
            .context("Failed to delete OAuth connection")?;
        Ok(result.rows_affected() > 0)
    }
}

async fn upsert_connection(pool: &SqlitePool, connection: &OAuthConnection) -> Result<()> {
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO oauth_connections (user_id, platform, account_id, account_name, access_token, refresh_token, scopes, expires_at, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (user_id, platform) DO UPDATE SET
            account_id = excluded.account_id,
            account_name = excluded.account_name,
            access_token = excluded.access_token,
            refresh_token = excluded.refresh_token,
            scopes = excluded.scopes,
            expires_at = excluded.expires_at,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(connection.user_id)
    .bind(connection.platform.as_str())
    .bind(&connection.account_id)
    .bind(&connection.account_name)
    .bind(&connection.access_token)
    .bind(&connection.refresh_token)
    .bind(&connection.scopes)
    .bind(connection.expires_at)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to upsert OAuth connection")?;
    Ok(())
}

async fn get_connection(
    pool: &SqlitePool,
    user_id: i64,
    platform: Platform,
) -> Result<Option<OAuthConnection>> {
    let sql = format!(
        "SELECT {} FROM oauth_connections WHERE user_id = ? AND platform = ?",
        CONNECTION_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(user_id)
        .bind(platform.as_str())
        .fetch_optional(pool)
        .await
        .context("Failed to get OAuth connection")?;
    row.as_ref().map(row_to_connection).transpose()
}

fn row_to_connection(row: &sqlx::sqlite::SqliteRow) -> Result<OAuthConnection> {
    let platform: String = row.get("platform");
    Ok(OAuthConnection {
        id: row.get("id"),
        user_id: row.get("user_id"),
        platform: Platform::from_str(&platform)?,
        account_id: row.get("account_id"),
        account_name: row.get("account_name"),
        access_token: row.get("access_token"),
        refresh_token: row.get("refresh_token"),
        scopes: row.get("scopes"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{insert_user, migrated_pool};

    fn connection(user_id: i64, account_id: &str, token: &str) -> OAuthConnection {
        let now = Utc::now();
        OAuthConnection {
            id: 0,
            user_id,
            platform: Platform::Facebook,
            account_id: account_id.into(),
            account_name: Some("Page".into()),
            access_token: token.into(),
            refresh_token: Some("refresh-1".into()),
            scopes: "pages_manage_posts".into(),
            expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_connection() {
        let pool = migrated_pool().await;
        let user_id = insert_user(&pool, "owner", 0).await;
        let repo = SqlxOAuthConnectionRepository::new(pool);

        let first = repo.upsert(&connection(user_id, "page-1", "tok-1")).await.unwrap();
        let second = repo.upsert(&connection(user_id, "page-2", "tok-2")).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.account_id, "page-2");
        assert_eq!(second.access_token, "tok-2");
        assert_eq!(repo.list_by_user(user_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_tokens_keeps_refresh_token_when_absent() {
        let pool = migrated_pool().await;
        let user_id = insert_user(&pool, "owner", 0).await;
        let repo = SqlxOAuthConnectionRepository::new(pool);

        let stored = repo.upsert(&connection(user_id, "page-1", "tok-1")).await.unwrap();
        repo.update_tokens(stored.id, "tok-2", None, None).await.unwrap();

        let found = repo.get(user_id, Platform::Facebook).await.unwrap().unwrap();
        assert_eq!(found.access_token, "tok-2");
        assert_eq!(found.refresh_token.as_deref(), Some("refresh-1"));
    }

    #[tokio::test]
    async fn test_delete() {
        let pool = migrated_pool().await;
        let user_id = insert_user(&pool, "owner", 0).await;
        let repo = SqlxOAuthConnectionRepository::new(pool);

        repo.upsert(&connection(user_id, "page-1", "tok-1")).await.unwrap();
        assert!(repo.delete(user_id, Platform::Facebook).await.unwrap());
        assert!(!repo.delete(user_id, Platform::Facebook).await.unwrap());
        assert!(repo.get(user_id, Platform::Facebook).await.unwrap().is_none());
    }
}
