//! Product catalog route handlers.

use axum::{
    Json,
    extract::{Path, State},
};
use tracing::instrument;

use digistore_core::ProductId;

use crate::db::ProductRepository;
use crate::error::{AppError, Result};
use crate::models::Product;
use crate::state::AppState;

/// List products available for purchase.
#[instrument(skip(state))]
pub async fn index(State(state): State<AppState>) -> Result<Json<Vec<Product>>> {
    let products = ProductRepository::new(state.pool())
        .list_available()
        .await?;
    Ok(Json(products))
}

/// Show a single product.
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<Product>> {
    let product = ProductRepository::new(state.pool())
        .get(id)
        .await?
        .filter(|p| p.is_available)
        .ok_or_else(|| AppError::NotFound(format!("product {id}")))?;

    Ok(Json(product))
}
