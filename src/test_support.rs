//! Fixtures shared by unit tests across modules

use axum::Router;
use sqlx::Row;

use crate::db::{create_test_pool, migrations, DynDatabasePool};
use crate::models::{CampaignBrief, Platform};

/// In-memory database with every migration applied
pub async fn migrated_pool() -> DynDatabasePool {
    let pool = create_test_pool().await.expect("Failed to create test pool");
    migrations::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

/// Insert a user row directly and return its id
pub async fn insert_user(pool: &DynDatabasePool, username: &str, credits: i64) -> i64 {
    sqlx::query(
        "INSERT INTO users (username, email, password_hash, credits) VALUES (?, ?, 'hash', ?)",
    )
    .bind(username)
    .bind(format!("{}@example.com", username))
    .bind(credits)
    .execute(pool.as_sqlite().unwrap())
    .await
    .expect("Failed to create test user")
    .last_insert_rowid()
}

/// Current credit balance straight from the users table
pub async fn credits_of(pool: &DynDatabasePool, user_id: i64) -> i64 {
    sqlx::query("SELECT credits FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_one(pool.as_sqlite().unwrap())
        .await
        .expect("Failed to read credits")
        .get("credits")
}

/// A coffee brand brief used across tests
pub fn coffee_brief() -> CampaignBrief {
    CampaignBrief {
        product_name: "Night Owl Cold Brew".to_string(),
        description: "Small batch cold brew coffee, steeped for twenty hours".to_string(),
        industry: Some("Food & Beverage".to_string()),
        target_audience: Some("young professionals and students".to_string()),
        tone: Some("playful".to_string()),
        keywords: vec!["coffee".to_string(), "energy".to_string()],
        brand: None,
    }
}

/// Insert a campaign row directly and return its id
pub async fn insert_campaign(
    pool: &DynDatabasePool,
    user_id: i64,
    platform: Platform,
    status: &str,
) -> i64 {
    let brief = serde_json::to_string(&coffee_brief()).unwrap();
    sqlx::query(
        "INSERT INTO campaigns (user_id, name, brief, platform, status) VALUES (?, 'Launch', ?, ?, ?)",
    )
    .bind(user_id)
    .bind(brief)
    .bind(platform.as_str())
    .bind(status)
    .execute(pool.as_sqlite().unwrap())
    .await
    .expect("Failed to create test campaign")
    .last_insert_rowid()
}

/// Serve a router on an ephemeral local port, returning its base URL
pub async fn spawn_fake(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind fake server");
    let addr = listener.local_addr().expect("Fake server has no address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    format!("http://{}", addr)
}
