//! Stripe API client.
//!
//! Two touchpoints with Stripe: creating payment intents at checkout, and
//! verifying the authenticity of inbound webhook events. The client is
//! constructed once from config and injected through application state;
//! there are no ambient provider singletons.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use digistore_core::{DiscountCodeId, ProductId};

use crate::config::StripeConfig;

type HmacSha256 = Hmac<Sha256>;

const API_BASE_URL: &str = "https://api.stripe.com/v1";

/// Maximum age of a webhook timestamp before it is rejected (in seconds).
/// Stripe recommends 300 seconds (5 minutes).
const WEBHOOK_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

/// Clock skew tolerance for timestamps from the future (in seconds).
const WEBHOOK_FUTURE_SKEW_SECS: i64 = 60;

/// Errors from the Stripe client.
#[derive(Debug, thiserror::Error)]
pub enum StripeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The intent came back without a client secret.
    #[error("payment intent has no client secret")]
    MissingClientSecret,

    /// The signature header is not in the expected `t=...,v1=...` form.
    #[error("malformed signature header")]
    MalformedSignature,

    /// The configured webhook secret cannot key an HMAC.
    #[error("invalid webhook secret")]
    InvalidWebhookSecret,
}

/// A created payment intent, reduced to what checkout needs.
#[derive(Debug, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub amount: i64,
}

/// Stripe API client.
#[derive(Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    secret_key: SecretString,
    webhook_secret: SecretString,
}

impl StripeClient {
    /// Create a new Stripe client from configuration.
    #[must_use]
    pub fn new(config: &StripeConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            secret_key: config.secret_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
        }
    }

    /// Create a payment intent for a charge.
    ///
    /// The product and discount code ids ride along as opaque correlation
    /// metadata; the webhook echoes them back so fulfillment knows what
    /// was bought.
    ///
    /// # Errors
    ///
    /// Returns `StripeError::Api` if Stripe rejects the request, or
    /// `StripeError::MissingClientSecret` if the intent comes back without
    /// a client-usable secret.
    pub async fn create_payment_intent(
        &self,
        amount_in_cents: i64,
        product_id: ProductId,
        discount_code_id: Option<DiscountCodeId>,
    ) -> Result<PaymentIntent, StripeError> {
        let amount = amount_in_cents.to_string();
        let product_id = product_id.to_string();

        let mut form: Vec<(&str, &str)> = vec![
            ("amount", &amount),
            ("currency", "usd"),
            ("metadata[product_id]", &product_id),
        ];

        let discount_code_id = discount_code_id.map(|id| id.to_string());
        if let Some(ref id) = discount_code_id {
            form.push(("metadata[discount_code_id]", id));
        }

        let response = self
            .client
            .post(format!("{API_BASE_URL}/payment_intents"))
            .basic_auth(self.secret_key.expose_secret(), None::<&str>)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StripeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let intent: PaymentIntent = response.json().await?;

        if intent.client_secret.is_none() {
            return Err(StripeError::MissingClientSecret);
        }

        Ok(intent)
    }

    /// Verify a webhook payload against its `stripe-signature` header.
    ///
    /// The signature format is `t=timestamp,v1=hex-hmac`. Stale timestamps
    /// are rejected to bound replay, and the comparison is constant-time.
    /// Returns `Ok(false)` for a well-formed but wrong signature.
    ///
    /// # Errors
    ///
    /// Returns `StripeError::MalformedSignature` if the header cannot be
    /// parsed at all.
    pub fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<bool, StripeError> {
        let mut timestamp = None;
        let mut sig_v1 = None;

        for part in signature.split(',') {
            if let Some(t) = part.strip_prefix("t=") {
                timestamp = Some(t);
            } else if let Some(s) = part.strip_prefix("v1=") {
                sig_v1 = Some(s);
            }
        }

        let timestamp_str = timestamp.ok_or(StripeError::MalformedSignature)?;
        let sig_v1 = sig_v1.ok_or(StripeError::MalformedSignature)?;

        let timestamp: i64 = timestamp_str
            .parse()
            .map_err(|_| StripeError::MalformedSignature)?;

        let now = chrono::Utc::now().timestamp();
        let age = now - timestamp;

        if age > WEBHOOK_TIMESTAMP_TOLERANCE_SECS {
            tracing::warn!(
                age_secs = age,
                max_secs = WEBHOOK_TIMESTAMP_TOLERANCE_SECS,
                "webhook rejected: timestamp too old"
            );
            return Ok(false);
        }

        if age < -WEBHOOK_FUTURE_SKEW_SECS {
            tracing::warn!(age_secs = age, "webhook rejected: timestamp in the future");
            return Ok(false);
        }

        let mut mac =
            HmacSha256::new_from_slice(self.webhook_secret.expose_secret().as_bytes())
                .map_err(|_| StripeError::InvalidWebhookSecret)?;
        mac.update(timestamp_str.as_bytes());
        mac.update(b".");
        mac.update(payload);
        let expected = hex::encode(mac.finalize().into_bytes());

        let expected_bytes = expected.as_bytes();
        let provided_bytes = sig_v1.as_bytes();

        // Length is not secret (always 64 hex chars for SHA-256), so a
        // non-constant-time length check is fine.
        if expected_bytes.len() != provided_bytes.len() {
            return Ok(false);
        }

        Ok(expected_bytes.ct_eq(provided_bytes).into())
    }
}

/// A webhook event envelope; `data.object` is parsed per event type.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEventData {
    pub object: serde_json::Value,
}

/// The charge object inside a `charge.succeeded` event.
#[derive(Debug, Deserialize)]
pub struct Charge {
    /// Amount actually charged, in minor currency units.
    pub amount: i64,
    pub billing_details: BillingDetails,
    #[serde(default)]
    pub metadata: ChargeMetadata,
}

#[derive(Debug, Deserialize)]
pub struct BillingDetails {
    pub email: Option<String>,
}

/// Correlation metadata echoed back from payment-intent creation.
#[derive(Debug, Default, Deserialize)]
pub struct ChargeMetadata {
    pub product_id: Option<String>,
    pub discount_code_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(webhook_secret: &str) -> StripeClient {
        StripeClient::new(&StripeConfig {
            secret_key: SecretString::from("sk_test_abc123"),
            webhook_secret: SecretString::from(webhook_secret.to_owned()),
        })
    }

    fn sign(secret: &str, timestamp: i64, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac key");
        mac.update(format!("{timestamp}.").as_bytes());
        mac.update(payload);
        let sig = hex::encode(mac.finalize().into_bytes());
        format!("t={timestamp},v1={sig}")
    }

    #[test]
    fn test_valid_signature_accepted() {
        let secret = "whsec_9f8e7d6c";
        let payload = br#"{"id":"evt_1","type":"charge.succeeded"}"#;
        let header = sign(secret, chrono::Utc::now().timestamp(), payload);

        let verified = client(secret)
            .verify_webhook_signature(payload, &header)
            .expect("well-formed header");
        assert!(verified);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let payload = br#"{"id":"evt_1"}"#;
        let header = sign("whsec_other", chrono::Utc::now().timestamp(), payload);

        let verified = client("whsec_9f8e7d6c")
            .verify_webhook_signature(payload, &header)
            .expect("well-formed header");
        assert!(!verified);
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let secret = "whsec_9f8e7d6c";
        let header = sign(secret, chrono::Utc::now().timestamp(), b"original");

        let verified = client(secret)
            .verify_webhook_signature(b"tampered", &header)
            .expect("well-formed header");
        assert!(!verified);
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let secret = "whsec_9f8e7d6c";
        let payload = b"payload";
        let stale = chrono::Utc::now().timestamp() - WEBHOOK_TIMESTAMP_TOLERANCE_SECS - 10;
        let header = sign(secret, stale, payload);

        let verified = client(secret)
            .verify_webhook_signature(payload, &header)
            .expect("well-formed header");
        assert!(!verified);
    }

    #[test]
    fn test_malformed_header_is_an_error() {
        let result = client("whsec_9f8e7d6c").verify_webhook_signature(b"payload", "garbage");
        assert!(matches!(result, Err(StripeError::MalformedSignature)));

        let result =
            client("whsec_9f8e7d6c").verify_webhook_signature(b"payload", "t=notanumber,v1=aa");
        assert!(matches!(result, Err(StripeError::MalformedSignature)));
    }

    #[test]
    fn test_charge_event_parses() {
        let event: WebhookEvent = serde_json::from_str(
            r#"{
                "id": "evt_123",
                "type": "charge.succeeded",
                "data": {
                    "object": {
                        "amount": 8000,
                        "billing_details": {"email": "a@example.com"},
                        "metadata": {"product_id": "1", "discount_code_id": "2"}
                    }
                }
            }"#,
        )
        .expect("valid event");

        assert_eq!(event.id, "evt_123");
        assert_eq!(event.event_type, "charge.succeeded");

        let charge: Charge = serde_json::from_value(event.data.object).expect("valid charge");
        assert_eq!(charge.amount, 8000);
        assert_eq!(charge.billing_details.email.as_deref(), Some("a@example.com"));
        assert_eq!(charge.metadata.product_id.as_deref(), Some("1"));
        assert_eq!(charge.metadata.discount_code_id.as_deref(), Some("2"));
    }

    #[test]
    fn test_charge_without_metadata_parses() {
        let charge: Charge = serde_json::from_str(
            r#"{"amount": 500, "billing_details": {"email": null}}"#,
        )
        .expect("valid charge");

        assert_eq!(charge.amount, 500);
        assert!(charge.billing_details.email.is_none());
        assert!(charge.metadata.product_id.is_none());
    }
}
