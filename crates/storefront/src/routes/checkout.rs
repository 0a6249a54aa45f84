//! Checkout route handlers.
//!
//! Checkout does not create any storefront state: it validates the request
//! against the catalog and discount rules, then asks Stripe for a payment
//! intent. The order itself only comes into existence when the charge
//! succeeds and the webhook delivers the event.

use axum::{Json, extract::State};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use digistore_core::{DiscountCode, DiscountCodeId, Email, ProductId};

use crate::db::{DiscountCodeRepository, OrderRepository, ProductRepository};
use crate::error::{AppError, Result};
use crate::state::AppState;

/// Payment intent request body.
#[derive(Debug, Deserialize)]
pub struct PaymentIntentRequest {
    pub email: String,
    pub product_id: ProductId,
    pub discount_code_id: Option<DiscountCodeId>,
}

/// Payment intent response body.
#[derive(Debug, Serialize)]
pub struct PaymentIntentResponse {
    /// Client-usable secret for completing the payment in the browser.
    pub client_secret: String,
    /// Final amount in minor currency units, after any discount.
    pub amount: i64,
}

/// Validate a checkout request and create a Stripe payment intent.
///
/// The duplicate-purchase check here is advisory: checkout and fulfillment
/// are not atomic, so the unique constraint on (user, product) is what
/// actually prevents a concurrent double purchase from landing twice.
#[instrument(skip(state, body), fields(product_id = %body.product_id))]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    Json(body): Json<PaymentIntentRequest>,
) -> Result<Json<PaymentIntentResponse>> {
    let email = Email::parse(body.email.trim())
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let product = ProductRepository::new(state.pool())
        .get(body.product_id)
        .await?
        .filter(|p| p.is_available)
        .ok_or_else(|| AppError::NotFound(format!("product {}", body.product_id)))?;

    // A supplied discount id must resolve to a currently usable code
    let discount = match body.discount_code_id {
        Some(id) => Some(fetch_usable_discount(&state, id, product.id).await?),
        None => None,
    };

    let existing = OrderRepository::new(state.pool())
        .find_by_email_and_product(&email, product.id)
        .await?;
    if existing.is_some() {
        return Err(AppError::AlreadyPurchased);
    }

    let amount = match &discount {
        Some(code) => code.apply(product.price_in_cents),
        None => product.price_in_cents,
    };

    let intent = state
        .stripe()
        .create_payment_intent(amount, product.id, discount.as_ref().map(|c| c.id))
        .await?;

    let client_secret = intent
        .client_secret
        .ok_or_else(|| AppError::Internal("payment intent missing client secret".to_owned()))?;

    tracing::info!(
        product_id = %product.id,
        amount,
        discounted = discount.is_some(),
        "payment intent created"
    );

    Ok(Json(PaymentIntentResponse {
        client_secret,
        amount,
    }))
}

async fn fetch_usable_discount(
    state: &AppState,
    id: DiscountCodeId,
    product_id: ProductId,
) -> Result<DiscountCode> {
    DiscountCodeRepository::new(state.pool())
        .get(id)
        .await?
        .filter(|code| code.is_usable(product_id, Utc::now()))
        .ok_or(AppError::InvalidDiscount)
}
