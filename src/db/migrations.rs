//! Database migrations module
//!
//! Code-based migrations embedded directly in the binary as SQL strings.
//!
//! # Usage
//!
//! ```ignore
//! use adloom::db::{create_pool, migrations};
//!
//! let pool = create_pool(&config).await?;
//! migrations::run_migrations(&pool).await?;
//! ```
//!
//! Each migration is a `Migration` with a unique, sequential `version`, a
//! human-readable `name` and its SQL. Applied versions are tracked in the
//! `_migrations` table so running migrations twice is a no-op.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use super::{pool::sqlite, DynDatabasePool};

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (must be unique and sequential)
    pub version: i32,
    /// Human-readable migration name
    pub name: &'static str,
    /// SQL statements (SQLite dialect)
    pub up: &'static str,
}

/// Migration record stored in the database
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// All migrations, in order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users",
        up: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username VARCHAR(50) NOT NULL UNIQUE,
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                tier VARCHAR(20) NOT NULL DEFAULT 'free',
                credits INTEGER NOT NULL DEFAULT 0,
                stripe_customer_id VARCHAR(255),
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                CHECK (credits >= 0)
            );
            CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);
            CREATE INDEX IF NOT EXISTS idx_users_stripe_customer ON users(stripe_customer_id);
        "#,
    },
    Migration {
        version: 2,
        name: "create_sessions",
        up: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id INTEGER NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);
        "#,
    },
    Migration {
        version: 3,
        name: "create_campaigns",
        up: r#"
            CREATE TABLE IF NOT EXISTS campaigns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                name VARCHAR(255) NOT NULL,
                brief TEXT NOT NULL,
                platform VARCHAR(20) NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                generated_content TEXT,
                prompt_template_id VARCHAR(100),
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_campaigns_user_id ON campaigns(user_id);
            CREATE INDEX IF NOT EXISTS idx_campaigns_status ON campaigns(status);
        "#,
    },
    Migration {
        version: 4,
        name: "create_assets",
        up: r#"
            CREATE TABLE IF NOT EXISTS assets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                campaign_id INTEGER NOT NULL,
                kind VARCHAR(10) NOT NULL,
                provider VARCHAR(30) NOT NULL,
                prompt TEXT NOT NULL,
                source_url TEXT NOT NULL,
                hosted_url TEXT,
                file_name VARCHAR(255),
                hosting_status VARCHAR(20) NOT NULL DEFAULT 'pending',
                content_type VARCHAR(100),
                size_bytes INTEGER,
                error TEXT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (campaign_id) REFERENCES campaigns(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_assets_campaign_id ON assets(campaign_id);
            CREATE INDEX IF NOT EXISTS idx_assets_hosting_status ON assets(hosting_status);
        "#,
    },
    Migration {
        version: 5,
        name: "create_oauth_connections",
        up: r#"
            CREATE TABLE IF NOT EXISTS oauth_connections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                platform VARCHAR(20) NOT NULL,
                account_id VARCHAR(255) NOT NULL,
                account_name VARCHAR(255),
                access_token TEXT NOT NULL,
                refresh_token TEXT,
                scopes TEXT NOT NULL DEFAULT '',
                expires_at TIMESTAMP,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (user_id, platform),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
        "#,
    },
    Migration {
        version: 6,
        name: "create_credit_usage",
        up: r#"
            CREATE TABLE IF NOT EXISTS credit_usage (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                kind VARCHAR(20) NOT NULL,
                amount INTEGER NOT NULL,
                balance_after INTEGER NOT NULL,
                campaign_id INTEGER,
                description TEXT NOT NULL DEFAULT '',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (campaign_id) REFERENCES campaigns(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_credit_usage_user_id ON credit_usage(user_id);
        "#,
    },
    Migration {
        version: 7,
        name: "create_analytics",
        up: r#"
            CREATE TABLE IF NOT EXISTS content_performance (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                campaign_id INTEGER NOT NULL,
                platform VARCHAR(20) NOT NULL,
                impressions INTEGER NOT NULL DEFAULT 0,
                clicks INTEGER NOT NULL DEFAULT 0,
                likes INTEGER NOT NULL DEFAULT 0,
                shares INTEGER NOT NULL DEFAULT 0,
                comments INTEGER NOT NULL DEFAULT 0,
                recorded_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (campaign_id) REFERENCES campaigns(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_content_performance_campaign ON content_performance(campaign_id);
            CREATE TABLE IF NOT EXISTS learning_patterns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                pattern_type VARCHAR(20) NOT NULL,
                pattern_value VARCHAR(255) NOT NULL,
                platform VARCHAR(20) NOT NULL DEFAULT '',
                success_score REAL NOT NULL DEFAULT 0,
                sample_count INTEGER NOT NULL DEFAULT 0,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (user_id, pattern_type, pattern_value, platform),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
        "#,
    },
    Migration {
        version: 8,
        name: "create_publishing",
        up: r#"
            CREATE TABLE IF NOT EXISTS publications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                campaign_id INTEGER NOT NULL,
                platform VARCHAR(20) NOT NULL,
                asset_id INTEGER,
                external_id VARCHAR(255) NOT NULL,
                url TEXT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (campaign_id) REFERENCES campaigns(id) ON DELETE CASCADE,
                FOREIGN KEY (asset_id) REFERENCES assets(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_publications_campaign ON publications(campaign_id);
            CREATE TABLE IF NOT EXISTS publishing_simulations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                campaign_id INTEGER NOT NULL,
                platform VARCHAR(20) NOT NULL,
                asset_id INTEGER,
                caption TEXT NOT NULL,
                estimated_reach INTEGER NOT NULL,
                estimated_engagement INTEGER NOT NULL,
                best_time VARCHAR(100) NOT NULL,
                notes TEXT NOT NULL DEFAULT '',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (campaign_id) REFERENCES campaigns(id) ON DELETE CASCADE,
                FOREIGN KEY (asset_id) REFERENCES assets(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_simulations_campaign ON publishing_simulations(campaign_id);
        "#,
    },
    Migration {
        version: 9,
        name: "create_billing_events",
        up: r#"
            CREATE TABLE IF NOT EXISTS billing_events (
                id VARCHAR(255) PRIMARY KEY,
                event_type VARCHAR(100) NOT NULL,
                processed_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
    },
];

/// Run all pending migrations
///
/// Returns the number of migrations applied.
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    let db = sqlite(pool)?;
    create_migrations_table(db).await?;

    let applied = get_applied_migrations(db).await?;
    let applied_versions: Vec<i32> = applied.iter().map(|m| m.version as i32).collect();

    let mut count = 0;

    for migration in MIGRATIONS {
        if !applied_versions.contains(&migration.version) {
            tracing::info!(
                "Applying migration {}: {}",
                migration.version,
                migration.name
            );
            apply_migration(db, migration)
                .await
                .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

async fn create_migrations_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name VARCHAR(255) NOT NULL UNIQUE,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create migrations table")?;
    Ok(())
}

async fn get_applied_migrations(pool: &SqlitePool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| MigrationRecord {
            version: row.get("version"),
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        })
        .collect())
}

async fn apply_migration(pool: &SqlitePool, migration: &Migration) -> Result<()> {
    let mut tx = pool.begin().await?;

    for statement in split_sql_statements(migration.up) {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name, applied_at) VALUES (?, ?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

fn truncate_sql(sql: &str) -> String {
    crate::models::truncate_chars(sql, 100)
}

/// Split SQL into individual statements, dropping comment-only fragments
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !is_comment_only(stmt))
        .collect()
}

fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

/// Check if migrations are up to date
pub async fn is_up_to_date(pool: &DynDatabasePool) -> Result<bool> {
    Ok(pending_count(pool).await? == 0)
}

/// Get pending migrations count
pub async fn pending_count(pool: &DynDatabasePool) -> Result<usize> {
    let db = sqlite(pool)?;
    create_migrations_table(db).await?;
    let applied = get_applied_migrations(db).await?;
    Ok(MIGRATIONS.len().saturating_sub(applied.len()))
}

/// Get the total number of migrations defined
pub fn total_migrations() -> usize {
    MIGRATIONS.len()
}

/// Get migration by version
pub fn get_migration(version: i32) -> Option<&'static Migration> {
    MIGRATIONS.iter().find(|m| m.version == version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    async fn migrated() -> DynDatabasePool {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        pool
    }

    async fn insert_user(pool: &SqlitePool, username: &str) -> i64 {
        sqlx::query("INSERT INTO users (username, email, password_hash) VALUES (?, ?, ?)")
            .bind(username)
            .bind(format!("{}@example.com", username))
            .bind("hash")
            .execute(pool)
            .await
            .expect("Failed to create user")
            .last_insert_rowid()
    }

    #[tokio::test]
    async fn test_run_migrations_is_idempotent() {
        let pool = create_test_pool().await.unwrap();
        assert_eq!(pending_count(&pool).await.unwrap(), total_migrations());

        let applied = run_migrations(&pool).await.unwrap();
        assert_eq!(applied, total_migrations());
        assert!(is_up_to_date(&pool).await.unwrap());

        let again = run_migrations(&pool).await.unwrap();
        assert_eq!(again, 0);
    }

    #[tokio::test]
    async fn test_credits_cannot_go_negative() {
        let pool = migrated().await;
        let db = pool.as_sqlite().unwrap();
        let id = insert_user(db, "spender").await;

        let result = sqlx::query("UPDATE users SET credits = -1 WHERE id = ?")
            .bind(id)
            .execute(db)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_one_connection_per_platform() {
        let pool = migrated().await;
        let db = pool.as_sqlite().unwrap();
        let id = insert_user(db, "poster").await;

        let insert = "INSERT INTO oauth_connections (user_id, platform, account_id, access_token) VALUES (?, 'tiktok', 'open-1', 'tok')";
        sqlx::query(insert).bind(id).execute(db).await.unwrap();
        assert!(sqlx::query(insert).bind(id).execute(db).await.is_err());
    }

    #[tokio::test]
    async fn test_deleting_user_cascades_to_campaigns() {
        let pool = migrated().await;
        let db = pool.as_sqlite().unwrap();
        let id = insert_user(db, "leaver").await;

        sqlx::query("INSERT INTO campaigns (user_id, name, brief, platform) VALUES (?, 'c', '{}', 'facebook')")
            .bind(id)
            .execute(db)
            .await
            .unwrap();
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(db)
            .await
            .unwrap();

        let row = sqlx::query("SELECT COUNT(*) AS count FROM campaigns")
            .fetch_one(db)
            .await
            .unwrap();
        assert_eq!(row.get::<i64, _>("count"), 0);
    }

    #[tokio::test]
    async fn test_foreign_key_constraints() {
        let pool = migrated().await;
        let db = pool.as_sqlite().unwrap();

        let result = sqlx::query(
            "INSERT INTO sessions (id, user_id, expires_at) VALUES ('s', 999, datetime('now', '+1 day'))",
        )
        .execute(db)
        .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_get_migration() {
        assert_eq!(get_migration(1).unwrap().name, "create_users");
        assert!(get_migration(999).is_none());
    }

    #[test]
    fn test_split_sql_statements() {
        let statements = split_sql_statements("CREATE TABLE a (id INT); CREATE TABLE b (id INT);");
        assert_eq!(statements.len(), 2);

        let statements = split_sql_statements("-- Comment\nCREATE TABLE a (id INT);\n-- trailing");
        assert_eq!(statements.len(), 1);
    }

    #[test]
    fn test_is_comment_only() {
        assert!(is_comment_only("-- Line 1\n-- Line 2"));
        assert!(!is_comment_only("-- Comment\nCREATE TABLE test"));
    }
}
