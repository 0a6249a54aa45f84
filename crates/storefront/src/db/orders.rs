//! User and order repository for database operations.
//!
//! Users and orders share a repository because users only come into being
//! as a side effect of order fulfillment: the webhook upserts the user by
//! billing email and attaches the order in the same transaction.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};

use digistore_core::{DiscountCodeId, Email, OrderId, ProductId, UserId};

use super::{RepositoryError, products::product_from_row};
use crate::models::{Order, OrderWithProduct, User};

/// Result of attempting to fulfill a charge event.
#[derive(Debug)]
pub enum FulfillmentOutcome {
    /// A new order was recorded.
    Created(Order),
    /// The provider redelivered an event we already processed.
    EventAlreadyProcessed,
    /// An order for this (user, product) pair already exists.
    AlreadyFulfilled,
}

/// Repository for user and order database operations.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    /// Create a new order repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Find an existing order for an email/product pair.
    ///
    /// Used by the payment-intent pre-check; the unique constraint on
    /// (user, product) backstops the race this check leaves open.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_email_and_product(
        &self,
        email: &Email,
        product_id: ProductId,
    ) -> Result<Option<OrderId>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT o.id
            FROM orders o
            JOIN users u ON u.id = o.user_id
            WHERE u.email = $1 AND o.product_id = $2
            "#,
        )
        .bind(email.as_str())
        .bind(product_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|r| r.try_get::<OrderId, _>("id")).transpose()?)
    }

    /// Fulfill a verified charge event: record the event id, upsert the
    /// user by billing email, and attach the order, all in one transaction.
    ///
    /// Running dedup and order creation atomically means a redelivered
    /// event either sees its id already recorded or hits the (user,
    /// product) unique constraint; both roll back without partial writes.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` for database errors.
    pub async fn fulfill_charge(
        &self,
        event_id: &str,
        email: &Email,
        product_id: ProductId,
        price_paid_in_cents: i64,
        discount_code_id: Option<DiscountCodeId>,
    ) -> Result<FulfillmentOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let dedup = sqlx::query(
            r#"
            INSERT INTO webhook_events (id)
            VALUES ($1)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .execute(&mut *tx)
        .await?;

        if dedup.rows_affected() == 0 {
            return Ok(FulfillmentOutcome::EventAlreadyProcessed);
        }

        let user_row = sqlx::query(
            r#"
            INSERT INTO users (email)
            VALUES ($1)
            ON CONFLICT (email) DO UPDATE SET updated_at = now()
            RETURNING id
            "#,
        )
        .bind(email.as_str())
        .fetch_one(&mut *tx)
        .await?;

        let user_id = user_row.try_get::<UserId, _>("id")?;

        let order_row = sqlx::query(
            r#"
            INSERT INTO orders (user_id, product_id, price_paid_in_cents, discount_code_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, product_id, price_paid_in_cents, discount_code_id,
                      created_at
            "#,
        )
        .bind(user_id)
        .bind(product_id)
        .bind(price_paid_in_cents)
        .bind(discount_code_id)
        .fetch_one(&mut *tx)
        .await;

        let order_row = match order_row {
            Ok(row) => row,
            Err(sqlx::Error::Database(ref db_err)) if db_err.is_unique_violation() => {
                // Already fulfilled under a different event id (e.g. a near
                // duplicate charge); roll back, nothing to do.
                return Ok(FulfillmentOutcome::AlreadyFulfilled);
            }
            Err(e) => return Err(RepositoryError::Database(e)),
        };

        let order = order_from_row(&order_row)?;

        tx.commit().await?;

        Ok(FulfillmentOutcome::Created(order))
    }

    /// Get a user by email together with all their orders and products.
    ///
    /// Returns `None` if no user exists for the email.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    /// Returns `RepositoryError::DataCorruption` if the stored email is invalid.
    pub async fn get_user_with_orders(
        &self,
        email: &Email,
    ) -> Result<Option<(User, Vec<OrderWithProduct>)>, RepositoryError> {
        let user_row = sqlx::query(
            r#"
            SELECT id, email, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email.as_str())
        .fetch_optional(self.pool)
        .await?;

        let Some(user_row) = user_row else {
            return Ok(None);
        };

        let stored_email = Email::parse(&user_row.try_get::<String, _>("email")?)
            .map_err(|e| RepositoryError::DataCorruption(format!("invalid email in database: {e}")))?;

        let user = User {
            id: user_row.try_get("id")?,
            email: stored_email,
            created_at: user_row.try_get::<DateTime<Utc>, _>("created_at")?,
            updated_at: user_row.try_get::<DateTime<Utc>, _>("updated_at")?,
        };

        let rows = sqlx::query(
            r#"
            SELECT o.id AS order_id, o.user_id, o.product_id AS order_product_id,
                   o.price_paid_in_cents, o.discount_code_id, o.created_at AS order_created_at,
                   p.id, p.name, p.description, p.price_in_cents, p.image_path,
                   p.file_path, p.is_available, p.created_at, p.updated_at
            FROM orders o
            JOIN products p ON p.id = o.product_id
            WHERE o.user_id = $1
            ORDER BY o.created_at DESC
            "#,
        )
        .bind(user.id)
        .fetch_all(self.pool)
        .await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in &rows {
            orders.push(OrderWithProduct {
                order: Order {
                    id: row.try_get("order_id")?,
                    user_id: row.try_get("user_id")?,
                    product_id: row.try_get("order_product_id")?,
                    price_paid_in_cents: row.try_get("price_paid_in_cents")?,
                    discount_code_id: row.try_get("discount_code_id")?,
                    created_at: row.try_get::<DateTime<Utc>, _>("order_created_at")?,
                },
                product: product_from_row(row)?,
            });
        }

        Ok(Some((user, orders)))
    }
}

fn order_from_row(row: &PgRow) -> Result<Order, RepositoryError> {
    Ok(Order {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        product_id: row.try_get("product_id")?,
        price_paid_in_cents: row.try_get("price_paid_in_cents")?,
        discount_code_id: row.try_get("discount_code_id")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}
