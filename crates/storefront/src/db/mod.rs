//! Database operations for the storefront `PostgreSQL` database.
//!
//! ## Tables
//!
//! - `products` - Administrator-managed catalog
//! - `discount_codes` / `discount_code_products` - Codes and applicability
//! - `users` - Created lazily at fulfillment; email is the identity
//! - `orders` - One per (user, product), unique-constrained
//! - `download_verifications` - 24-hour download grants
//! - `webhook_events` - Processed provider event ids, written in the same
//!   transaction as the order so redelivery dedup and fulfillment are atomic
//!
//! Queries use the runtime-checked sqlx API; repositories borrow the shared
//! pool and live for a single request.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run on
//! startup via [`run_migrations`].

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub mod discount_codes;
pub mod downloads;
pub mod orders;
pub mod products;

pub use discount_codes::DiscountCodeRepository;
pub use downloads::DownloadRepository;
pub use orders::{FulfillmentOutcome, OrderRepository};
pub use products::ProductRepository;

/// Errors from repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Run embedded migrations against the pool.
///
/// # Errors
///
/// Returns `sqlx::migrate::MigrateError` if a migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
