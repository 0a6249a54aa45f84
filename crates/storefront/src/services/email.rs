//! Resend email client and message rendering.
//!
//! Two messages leave this storefront: a purchase receipt after a charge is
//! fulfilled, and an order-history export with one download link per order.
//! Rendering is separated from dispatch so the bodies can be tested without
//! a network.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use digistore_core::DownloadVerificationId;

use crate::config::EmailConfig;
use crate::models::{Order, Product};

const RESEND_API_URL: &str = "https://api.resend.com/emails";

/// Errors from the email client.
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
}

/// Resend API request body.
#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    from: String,
    to: Vec<&'a str>,
    subject: &'a str,
    text: &'a str,
    html: &'a str,
}

/// Resend API response.
#[derive(Debug, Deserialize)]
struct SendEmailResponse {
    #[allow(dead_code)]
    id: String,
}

/// Email client using the Resend API.
#[derive(Clone)]
pub struct EmailClient {
    client: reqwest::Client,
    api_key: SecretString,
    sender: String,
    /// Public base URL used to build download links.
    base_url: String,
}

impl EmailClient {
    /// Create a new email client from configuration.
    #[must_use]
    pub fn new(config: &EmailConfig, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            sender: config.sender.clone(),
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    /// Send a purchase receipt for a fulfilled order.
    ///
    /// # Errors
    ///
    /// Returns `EmailError` if dispatch fails; the caller decides whether
    /// that failure is fatal (it is not, after the order is committed).
    pub async fn send_purchase_receipt(
        &self,
        to: &str,
        order: &Order,
        product: &Product,
        verification_id: DownloadVerificationId,
    ) -> Result<(), EmailError> {
        let subject = "Order confirmation";
        let download_url = self.download_url(verification_id);
        let text = render_receipt_text(order, product, &download_url);
        let html = render_receipt_html(order, product, &download_url);

        self.send(to, subject, &text, &html).await
    }

    /// Send an order-history export: every order with a fresh download link.
    ///
    /// # Errors
    ///
    /// Returns `EmailError` if dispatch fails.
    pub async fn send_order_history(
        &self,
        to: &str,
        entries: &[HistoryEntry<'_>],
    ) -> Result<(), EmailError> {
        let subject = "Your order history";
        let text = render_history_text(self, entries);
        let html = render_history_html(self, entries);

        self.send(to, subject, &text, &html).await
    }

    /// Build the public download link for a verification id.
    #[must_use]
    pub fn download_url(&self, verification_id: DownloadVerificationId) -> String {
        format!("{}/download/{verification_id}", self.base_url)
    }

    async fn send(
        &self,
        to: &str,
        subject: &str,
        text: &str,
        html: &str,
    ) -> Result<(), EmailError> {
        let body = SendEmailRequest {
            from: format!("Support <{}>", self.sender),
            to: vec![to],
            subject,
            text,
            html,
        };

        let response = self
            .client
            .post(RESEND_API_URL)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EmailError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let _: SendEmailResponse = response.json().await?;
        Ok(())
    }
}

/// One order in a history export, paired with its fresh download grant.
pub struct HistoryEntry<'a> {
    pub order: &'a Order,
    pub product: &'a Product,
    pub verification_id: DownloadVerificationId,
}

/// Format cents as a dollar amount (e.g. 8000 -> "$80.00").
fn format_price(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.abs();
    format!("{sign}${}.{:02}", cents / 100, cents % 100)
}

/// Format a timestamp for email display (e.g. "Jan 15, 2026").
fn format_date(at: DateTime<Utc>) -> String {
    at.format("%b %d, %Y").to_string()
}

fn render_receipt_text(order: &Order, product: &Product, download_url: &str) -> String {
    format!(
        "Purchase receipt\n\n\
         {name}\n{description}\n\n\
         Order #{order_id} placed {date}\n\
         Amount paid: {price}\n\n\
         Download your purchase (link valid for 24 hours):\n{download_url}\n",
        name = product.name,
        description = product.description,
        order_id = order.id,
        date = format_date(order.created_at),
        price = format_price(order.price_paid_in_cents),
    )
}

fn render_receipt_html(order: &Order, product: &Product, download_url: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
<h1>Purchase receipt</h1>
<h2>{name}</h2>
<p>{description}</p>
<p>Order <strong>#{order_id}</strong> placed {date}<br>
Amount paid: <strong>{price}</strong></p>
<p><a href="{download_url}">Download</a> (link valid for 24 hours)</p>
</body>
</html>"#,
        name = product.name,
        description = product.description,
        order_id = order.id,
        date = format_date(order.created_at),
        price = format_price(order.price_paid_in_cents),
    )
}

fn render_history_text(client: &EmailClient, entries: &[HistoryEntry<'_>]) -> String {
    let mut body = String::from(
        "Order history\n\nEach order below has a fresh download link, valid for 24 hours.\n",
    );
    for entry in entries {
        body.push_str(&format!(
            "\n{name}\nOrder #{order_id} placed {date}\nAmount paid: {price}\nDownload: {url}\n",
            name = entry.product.name,
            order_id = entry.order.id,
            date = format_date(entry.order.created_at),
            price = format_price(entry.order.price_paid_in_cents),
            url = client.download_url(entry.verification_id),
        ));
    }
    body
}

fn render_history_html(client: &EmailClient, entries: &[HistoryEntry<'_>]) -> String {
    let mut items = String::new();
    for (i, entry) in entries.iter().enumerate() {
        if i > 0 {
            items.push_str("<hr>\n");
        }
        items.push_str(&format!(
            r#"<h2>{name}</h2>
<p>Order <strong>#{order_id}</strong> placed {date}<br>
Amount paid: <strong>{price}</strong></p>
<p><a href="{url}">Download</a></p>
"#,
            name = entry.product.name,
            order_id = entry.order.id,
            date = format_date(entry.order.created_at),
            price = format_price(entry.order.price_paid_in_cents),
            url = client.download_url(entry.verification_id),
        ));
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"></head>
<body style="font-family: sans-serif; max-width: 600px; margin: 0 auto; padding: 20px;">
<h1>Order history</h1>
<p>Each order below has a fresh download link, valid for 24 hours.</p>
{items}</body>
</html>"#
    )
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use digistore_core::{OrderId, ProductId, UserId};

    use super::*;

    fn test_client() -> EmailClient {
        EmailClient::new(
            &EmailConfig {
                api_key: SecretString::from("re_test_key"),
                sender: "support@store.test".to_string(),
            },
            "https://store.test/",
        )
    }

    fn test_product(name: &str) -> Product {
        let at = Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).single().expect("valid date");
        Product {
            id: ProductId::new(1),
            name: name.to_string(),
            description: "A useful thing".to_string(),
            price_in_cents: 10_000,
            image_path: "/products/thing.png".to_string(),
            file_path: "/files/thing.zip".to_string(),
            is_available: true,
            created_at: at,
            updated_at: at,
        }
    }

    fn test_order(id: i32, price: i64) -> Order {
        Order {
            id: OrderId::new(id),
            user_id: UserId::new(1),
            product_id: ProductId::new(1),
            price_paid_in_cents: price,
            discount_code_id: None,
            created_at: Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).single().expect("valid date"),
        }
    }

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(8000), "$80.00");
        assert_eq!(format_price(9), "$0.09");
        assert_eq!(format_price(0), "$0.00");
        assert_eq!(format_price(123_456), "$1234.56");
    }

    #[test]
    fn test_download_url_strips_trailing_slash() {
        let client = test_client();
        let id = DownloadVerificationId::generate();
        assert_eq!(
            client.download_url(id),
            format!("https://store.test/download/{id}")
        );
    }

    #[test]
    fn test_receipt_contains_download_link_and_price() {
        let order = test_order(7, 8000);
        let product = test_product("Course");
        let url = "https://store.test/download/abc";

        let text = render_receipt_text(&order, &product, url);
        assert!(text.contains("Course"));
        assert!(text.contains("$80.00"));
        assert!(text.contains(url));
        assert!(text.contains("Jan 15, 2026"));

        let html = render_receipt_html(&order, &product, url);
        assert!(html.contains("Course"));
        assert!(html.contains(&format!(r#"href="{url}""#)));
    }

    #[test]
    fn test_history_has_one_entry_and_link_per_order() {
        let client = test_client();
        let order_a = test_order(1, 8000);
        let order_b = test_order(2, 143_000);
        let product_a = test_product("Course");
        let product_b = test_product("Ebook");
        let id_a = DownloadVerificationId::generate();
        let id_b = DownloadVerificationId::generate();

        let entries = [
            HistoryEntry {
                order: &order_a,
                product: &product_a,
                verification_id: id_a,
            },
            HistoryEntry {
                order: &order_b,
                product: &product_b,
                verification_id: id_b,
            },
        ];

        let text = render_history_text(&client, &entries);
        assert!(text.contains("Course"));
        assert!(text.contains("Ebook"));
        assert!(text.contains(&id_a.to_string()));
        assert!(text.contains(&id_b.to_string()));
        assert!(text.contains("$1430.00"));

        let html = render_history_html(&client, &entries);
        assert_eq!(html.matches("<hr>").count(), 1);
        assert_eq!(html.matches("href=").count(), 2);
    }
}
