//! Database layer
//!
//! This module provides database access for Adloom: a pool abstraction
//! selected from configuration, embedded migrations and one repository per
//! entity.
//!
//! # Usage
//!
//! ```ignore
//! use adloom::config::DatabaseConfig;
//! use adloom::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, create_test_pool, DatabasePool, DynDatabasePool, SqliteDatabase};
