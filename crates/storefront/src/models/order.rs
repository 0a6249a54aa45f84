//! User and order models.

use chrono::{DateTime, Utc};
use serde::Serialize;

use digistore_core::{DiscountCodeId, Email, OrderId, ProductId, UserId};

use super::product::Product;

/// A storefront user.
///
/// Created lazily from the billing email of the first fulfilled charge.
/// There is no password: email ownership is the whole identity, a trust
/// boundary the order-history export inherits.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: UserId,
    pub email: Email,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A fulfilled purchase.
///
/// At most one order exists per (user, product) pair, enforced by a unique
/// constraint rather than only the duplicate-purchase pre-check.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub product_id: ProductId,
    /// What was actually charged, after any discount.
    pub price_paid_in_cents: i64,
    pub discount_code_id: Option<DiscountCodeId>,
    pub created_at: DateTime<Utc>,
}

/// An order joined with its product, as needed by the history export.
#[derive(Debug, Clone)]
pub struct OrderWithProduct {
    pub order: Order,
    pub product: Product,
}
