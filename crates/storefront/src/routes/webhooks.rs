//! Stripe webhook handler.
//!
//! This is the only place orders come into existence. The handler trusts
//! nothing about the request until the signature checks out, then
//! reconciles the charge into an order idempotently: a replayed event or
//! an already-fulfilled (user, product) pair is acknowledged without side
//! effects so Stripe stops retrying.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use chrono::Utc;
use tracing::instrument;

use digistore_core::{DiscountCodeId, Email, ProductId};

use crate::db::{
    DiscountCodeRepository, DownloadRepository, FulfillmentOutcome, OrderRepository,
    ProductRepository,
};
use crate::error::{AppError, Result};
use crate::services::{Charge, ChargeMetadata, StripeError, WebhookEvent};
use crate::state::AppState;

/// Resolve the correlation metadata echoed back on a charge.
///
/// The product id is mandatory. The discount id is optional, but a value
/// that is present and unparseable is rejected rather than dropped: a
/// silently dropped id would record the order without its discount
/// reference and the code's usage would never be counted.
fn parse_charge_metadata(
    metadata: &ChargeMetadata,
) -> Result<(ProductId, Option<DiscountCodeId>)> {
    let product_id: ProductId = metadata
        .product_id
        .as_deref()
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| AppError::BadRequest("charge missing product metadata".to_owned()))?;

    let discount_code_id = match metadata.discount_code_id.as_deref() {
        None => None,
        Some(id) => Some(id.parse::<DiscountCodeId>().map_err(|_| {
            AppError::BadRequest(format!("malformed discount metadata: {id:?}"))
        })?),
    };

    Ok((product_id, discount_code_id))
}

/// Handle an incoming Stripe webhook event.
///
/// Only `charge.succeeded` is acted on; every other event type is
/// acknowledged and ignored. Receipt email delivery is best-effort: the
/// order is already committed, so a mailer failure is logged rather than
/// surfaced as an error that would make Stripe redeliver the event.
#[instrument(skip_all)]
pub async fn stripe(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Signature)?;

    let verified = state
        .stripe()
        .verify_webhook_signature(&body, signature)
        .map_err(|e| match e {
            StripeError::MalformedSignature => AppError::Signature,
            other => AppError::Stripe(other),
        })?;
    if !verified {
        return Err(AppError::Signature);
    }

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("unparseable event: {e}")))?;

    if event.event_type != "charge.succeeded" {
        tracing::debug!(event_type = %event.event_type, "ignoring event");
        return Ok("ignored");
    }

    let charge: Charge = serde_json::from_value(event.data.object)
        .map_err(|e| AppError::BadRequest(format!("unparseable charge: {e}")))?;

    let email_str = charge
        .billing_details
        .email
        .ok_or_else(|| AppError::BadRequest("charge has no billing email".to_owned()))?;
    let email = Email::parse(&email_str)
        .map_err(|e| AppError::BadRequest(format!("invalid billing email: {e}")))?;

    let (product_id, discount_code_id) = parse_charge_metadata(&charge.metadata)?;

    let product = ProductRepository::new(state.pool())
        .get(product_id)
        .await?
        .ok_or_else(|| {
            AppError::BadRequest(format!("charge references unknown product {product_id}"))
        })?;

    let outcome = OrderRepository::new(state.pool())
        .fulfill_charge(&event.id, &email, product.id, charge.amount, discount_code_id)
        .await?;

    let order = match outcome {
        FulfillmentOutcome::Created(order) => order,
        FulfillmentOutcome::EventAlreadyProcessed => {
            tracing::info!(event_id = %event.id, "event already processed, acknowledging");
            return Ok("ok");
        }
        FulfillmentOutcome::AlreadyFulfilled => {
            tracing::info!(
                event_id = %event.id,
                product_id = %product.id,
                "order already exists for this purchaser, acknowledging"
            );
            return Ok("ok");
        }
    };

    tracing::info!(
        order_id = %order.id,
        product_id = %product.id,
        price_paid_in_cents = order.price_paid_in_cents,
        "order fulfilled"
    );

    // The redemption counter is kept inside the usage limit by the
    // conditional update, but a failure here must not fail fulfillment:
    // the customer has paid and the order is committed.
    if let Some(code_id) = discount_code_id {
        match DiscountCodeRepository::new(state.pool())
            .increment_usage(code_id)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(
                    discount_code_id = %code_id,
                    "discount usage not recorded: code missing or limit reached"
                );
            }
            Err(e) => {
                tracing::warn!(
                    discount_code_id = %code_id,
                    error = %e,
                    "failed to record discount usage"
                );
            }
        }
    }

    let verification = DownloadRepository::new(state.pool())
        .create(product.id, Utc::now())
        .await?;

    if let Err(e) = state
        .mailer()
        .send_purchase_receipt(email.as_str(), &order, &product, verification.id)
        .await
    {
        tracing::error!(order_id = %order.id, error = %e, "failed to send purchase receipt");
    }

    Ok("ok")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(product_id: Option<&str>, discount_code_id: Option<&str>) -> ChargeMetadata {
        ChargeMetadata {
            product_id: product_id.map(str::to_owned),
            discount_code_id: discount_code_id.map(str::to_owned),
        }
    }

    #[test]
    fn test_metadata_with_discount_parses() {
        let (product_id, discount_code_id) =
            parse_charge_metadata(&metadata(Some("3"), Some("7"))).expect("valid metadata");
        assert_eq!(product_id, ProductId::new(3));
        assert_eq!(discount_code_id, Some(DiscountCodeId::new(7)));
    }

    #[test]
    fn test_metadata_without_discount_parses() {
        let (product_id, discount_code_id) =
            parse_charge_metadata(&metadata(Some("3"), None)).expect("valid metadata");
        assert_eq!(product_id, ProductId::new(3));
        assert_eq!(discount_code_id, None);
    }

    #[test]
    fn test_missing_or_malformed_product_rejected() {
        assert!(matches!(
            parse_charge_metadata(&metadata(None, None)),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            parse_charge_metadata(&metadata(Some("not-a-number"), None)),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_malformed_discount_rejected_not_dropped() {
        assert!(matches!(
            parse_charge_metadata(&metadata(Some("3"), Some("not-a-number"))),
            Err(AppError::BadRequest(_))
        ));
    }
}
