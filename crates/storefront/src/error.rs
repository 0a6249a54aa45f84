//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server errors to Sentry
//! before responding to the client. All route handlers return
//! `Result<T, AppError>`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::{EmailError, StripeError};

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Stripe API operation failed.
    #[error("Stripe error: {0}")]
    Stripe(#[from] StripeError),

    /// Email dispatch failed.
    #[error("Email error: {0}")]
    Email(#[from] EmailError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Supplied discount code is expired, inactive, exhausted, or does not
    /// apply to the product (or matches nothing at all).
    #[error("Invalid discount code")]
    InvalidDiscount,

    /// The requester already owns this product.
    #[error("Already purchased")]
    AlreadyPurchased,

    /// Malformed client input (e.g. a bad email address).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Bad request from client (or a webhook payload missing required
    /// fields).
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Webhook authenticity check failed. Fatal, never retried, and raised
    /// before any state mutation.
    #[error("Invalid webhook signature")]
    Signature,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if matches!(
            self,
            Self::Database(_) | Self::Internal(_) | Self::Stripe(_) | Self::Email(_)
        ) {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let status = match &self {
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Stripe(_) | Self::Email(_) => StatusCode::BAD_GATEWAY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidDiscount | Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::AlreadyPurchased => StatusCode::CONFLICT,
            Self::Signature | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        };

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Database(_) | Self::Internal(_) => "Internal server error".to_string(),
            Self::Stripe(_) => "Payment provider error".to_string(),
            Self::Email(_) => {
                "There was an error sending your email, please try again".to_string()
            }
            Self::InvalidDiscount => "Coupon is invalid or has expired".to_string(),
            Self::AlreadyPurchased => {
                "You have already purchased this product. Use the order history email to download it again".to_string()
            }
            _ => self.to_string(),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("product 123".to_string());
        assert_eq!(err.to_string(), "Not found: product 123");

        let err = AppError::Validation("invalid email".to_string());
        assert_eq!(err.to_string(), "Validation error: invalid email");
    }

    #[test]
    fn test_app_error_status_codes() {
        fn get_status(err: AppError) -> StatusCode {
            let response = err.into_response();
            response.status()
        }

        assert_eq!(
            get_status(AppError::NotFound("test".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            get_status(AppError::InvalidDiscount),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            get_status(AppError::AlreadyPurchased),
            StatusCode::CONFLICT
        );
        assert_eq!(get_status(AppError::Signature), StatusCode::BAD_REQUEST);
        assert_eq!(
            get_status(AppError::Validation("test".to_string())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            get_status(AppError::Internal("test".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
