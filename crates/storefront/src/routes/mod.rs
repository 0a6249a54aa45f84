//! HTTP route handlers for the storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                       - Liveness check
//! GET  /health/ready                 - Readiness check (database ping)
//!
//! # Catalog
//! GET  /api/products                 - Available products, name ascending
//! GET  /api/products/{id}            - Product detail
//!
//! # Checkout
//! POST /api/checkout/payment-intent  - Validate and create a payment intent
//!
//! # Fulfillment
//! POST /webhooks/stripe              - Signed charge events from Stripe
//!
//! # Orders
//! POST /api/orders/email-history     - Email order history with download links
//!
//! # Downloads
//! GET  /download/{id}                - Redeem a download verification
//! ```

pub mod checkout;
pub mod downloads;
pub mod orders;
pub mod products;
pub mod webhooks;

use axum::{
    Router,
    routing::{get, post},
};

use crate::state::AppState;

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/products", get(products::index))
        .route("/api/products/{id}", get(products::show))
        .route(
            "/api/checkout/payment-intent",
            post(checkout::create_payment_intent),
        )
        .route("/api/orders/email-history", post(orders::email_history))
        .route("/webhooks/stripe", post(webhooks::stripe))
        .route("/download/{id}", get(downloads::redeem))
}
