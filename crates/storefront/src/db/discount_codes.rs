//! Discount code repository for database operations.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use digistore_core::{DiscountCode, DiscountCodeId, DiscountType, ProductId};

use super::RepositoryError;

/// Repository for discount code database operations.
pub struct DiscountCodeRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> DiscountCodeRepository<'a> {
    /// Create a new discount code repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a discount code with its applicability set.
    ///
    /// Usability (active, unexpired, under limit, applicable) is decided by
    /// the caller via [`DiscountCode::is_usable`]; this only fetches state.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    /// Returns `RepositoryError::DataCorruption` if the stored discount type
    /// is not a known value.
    pub async fn get(
        &self,
        id: DiscountCodeId,
    ) -> Result<Option<DiscountCode>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, code, discount_type, discount_amount, expires_at,
                   usage_limit, uses, is_active, all_products
            FROM discount_codes
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let discount_type = row
            .try_get::<String, _>("discount_type")?
            .parse::<DiscountType>()
            .map_err(|e| RepositoryError::DataCorruption(e.to_string()))?;

        let product_rows = sqlx::query(
            r#"
            SELECT product_id
            FROM discount_code_products
            WHERE discount_code_id = $1
            "#,
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        let product_ids = product_rows
            .iter()
            .map(|r| r.try_get::<ProductId, _>("product_id"))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(DiscountCode {
            id: row.try_get("id")?,
            code: row.try_get("code")?,
            discount_type,
            discount_amount: row.try_get("discount_amount")?,
            expires_at: row.try_get::<Option<DateTime<Utc>>, _>("expires_at")?,
            usage_limit: row.try_get("usage_limit")?,
            uses: row.try_get("uses")?,
            is_active: row.try_get("is_active")?,
            all_products: row.try_get("all_products")?,
            product_ids,
        }))
    }

    /// Atomically count one more use of a code, respecting its limit.
    ///
    /// The conditional update makes concurrent fulfillments safe: once the
    /// limit is reached no further increments land. Returns `true` if the
    /// counter moved.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn increment_usage(&self, id: DiscountCodeId) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE discount_codes
            SET uses = uses + 1
            WHERE id = $1
              AND (usage_limit IS NULL OR uses < usage_limit)
            "#,
        )
        .bind(id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
