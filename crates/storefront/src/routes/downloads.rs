//! Download-link redemption.

use axum::{Json, extract::Path, extract::State};
use chrono::Utc;
use serde::Serialize;
use tracing::instrument;

use digistore_core::DownloadVerificationId;

use crate::db::DownloadRepository;
use crate::error::{AppError, Result};
use crate::state::AppState;

/// What a redeemed download grant resolves to.
#[derive(Debug, Serialize)]
pub struct DownloadGrant {
    pub product_name: String,
    pub file_path: String,
}

/// Redeem a download verification id for the product's file.
///
/// Expired and unknown ids are indistinguishable to the caller; both get
/// a 404 so the id space stays unprobeable.
#[instrument(skip(state))]
pub async fn redeem(
    State(state): State<AppState>,
    Path(id): Path<DownloadVerificationId>,
) -> Result<Json<DownloadGrant>> {
    let product = DownloadRepository::new(state.pool())
        .redeem(id, Utc::now())
        .await?
        .ok_or_else(|| AppError::NotFound("download link invalid or expired".to_owned()))?;

    tracing::info!(product_id = %product.id, "download link redeemed");

    Ok(Json(DownloadGrant {
        product_name: product.name,
        file_path: product.file_path,
    }))
}
