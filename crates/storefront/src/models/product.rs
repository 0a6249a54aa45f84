//! Product model.

use chrono::{DateTime, Utc};
use serde::Serialize;

use digistore_core::ProductId;

/// A digital product.
///
/// Immutable after creation except for availability and price edits by an
/// administrator; the storefront only reads these rows.
#[derive(Debug, Clone, Serialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    /// Price in minor currency units (cents).
    pub price_in_cents: i64,
    /// Reference to the listing image.
    pub image_path: String,
    /// The downloadable artifact, served on a valid download verification.
    #[serde(skip)]
    pub file_path: String,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
