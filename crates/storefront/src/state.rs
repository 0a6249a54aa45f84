//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::StoreConfig;
use crate::services::{EmailClient, StripeClient};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// database pool, configuration, and the provider clients. Clients are
/// constructed once here and injected into handlers through the state;
/// there are no module-level provider singletons.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StoreConfig,
    pool: PgPool,
    stripe: StripeClient,
    mailer: EmailClient,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(config: StoreConfig, pool: PgPool) -> Self {
        let stripe = StripeClient::new(&config.stripe);
        let mailer = EmailClient::new(&config.email, &config.base_url);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                stripe,
                mailer,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get a reference to the Stripe client.
    #[must_use]
    pub fn stripe(&self) -> &StripeClient {
        &self.inner.stripe
    }

    /// Get a reference to the email client.
    #[must_use]
    pub fn mailer(&self) -> &EmailClient {
        &self.inner.mailer
    }
}
