//! Download verification repository for database operations.

use chrono::{DateTime, TimeDelta, Utc};
use sqlx::{PgPool, Row};

use digistore_core::{DownloadVerificationId, ProductId};

use super::{RepositoryError, products::product_from_row};
use crate::models::{DownloadVerification, Product};

/// Repository for download verification database operations.
pub struct DownloadRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> DownloadRepository<'a> {
    /// Create a new download repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Mint a fresh verification for a product, expiring 24 hours from `now`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create(
        &self,
        product_id: ProductId,
        now: DateTime<Utc>,
    ) -> Result<DownloadVerification, RepositoryError> {
        let id = DownloadVerificationId::generate();
        let expires_at = now + TimeDelta::hours(DownloadVerification::VALIDITY_HOURS);

        let row = sqlx::query(
            r#"
            INSERT INTO download_verifications (id, product_id, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id, product_id, expires_at, created_at
            "#,
        )
        .bind(id)
        .bind(product_id)
        .bind(expires_at)
        .fetch_one(self.pool)
        .await?;

        Ok(DownloadVerification {
            id: row.try_get("id")?,
            product_id: row.try_get("product_id")?,
            expires_at: row.try_get::<DateTime<Utc>, _>("expires_at")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        })
    }

    /// Redeem a verification: return its product if the grant is unexpired.
    ///
    /// Returns `None` for unknown or expired ids; expired rows stay in
    /// place, expiry is only ever checked here.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn redeem(
        &self,
        id: DownloadVerificationId,
        now: DateTime<Utc>,
    ) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT p.id, p.name, p.description, p.price_in_cents, p.image_path,
                   p.file_path, p.is_available, p.created_at, p.updated_at
            FROM download_verifications dv
            JOIN products p ON p.id = dv.product_id
            WHERE dv.id = $1 AND dv.expires_at > $2
            "#,
        )
        .bind(id)
        .bind(now)
        .fetch_optional(self.pool)
        .await?;

        row.map(|r| product_from_row(&r)).transpose()
    }
}
