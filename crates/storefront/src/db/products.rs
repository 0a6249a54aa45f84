//! Product repository for database operations.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};

use digistore_core::ProductId;

use super::RepositoryError;
use crate::models::Product;

/// Repository for product database operations.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a product by its ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, name, description, price_in_cents, image_path, file_path,
                   is_available, created_at, updated_at
            FROM products
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(|r| product_from_row(&r)).transpose()
    }

    /// List products currently available for purchase, name ascending.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_available(&self) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, description, price_in_cents, image_path, file_path,
                   is_available, created_at, updated_at
            FROM products
            WHERE is_available
            ORDER BY name ASC
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        rows.iter().map(product_from_row).collect()
    }
}

pub(crate) fn product_from_row(row: &PgRow) -> Result<Product, RepositoryError> {
    Ok(Product {
        id: row.try_get::<ProductId, _>("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        price_in_cents: row.try_get("price_in_cents")?,
        image_path: row.try_get("image_path")?,
        file_path: row.try_get("file_path")?,
        is_available: row.try_get("is_available")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}
