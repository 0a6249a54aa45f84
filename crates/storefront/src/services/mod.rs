//! External service clients (Stripe, Resend).

pub mod email;
pub mod stripe;

pub use email::{EmailClient, EmailError, HistoryEntry};
pub use stripe::{Charge, ChargeMetadata, StripeClient, StripeError, WebhookEvent};
