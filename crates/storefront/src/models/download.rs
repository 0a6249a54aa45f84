//! Download verification model.

use chrono::{DateTime, Utc};
use serde::Serialize;

use digistore_core::{DownloadVerificationId, ProductId};

/// A time-limited download grant for a product.
///
/// Scoped to a product and an expiry only: anyone holding the id can
/// download until it expires. Rows are never purged; expiry is checked
/// when the download is redeemed.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadVerification {
    pub id: DownloadVerificationId,
    pub product_id: ProductId,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl DownloadVerification {
    /// How long a verification stays redeemable.
    pub const VALIDITY_HOURS: i64 = 24;

    /// Whether this verification can still be redeemed at `now`.
    #[must_use]
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    #[test]
    fn test_validity_window() {
        let now = Utc::now();
        let verification = DownloadVerification {
            id: DownloadVerificationId::generate(),
            product_id: ProductId::new(1),
            expires_at: now + TimeDelta::hours(DownloadVerification::VALIDITY_HOURS),
            created_at: now,
        };

        assert!(verification.is_valid(now));
        assert!(verification.is_valid(now + TimeDelta::hours(23)));
        assert!(!verification.is_valid(now + TimeDelta::hours(25)));
    }
}
