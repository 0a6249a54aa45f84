//! Discount codes and the pure price evaluator.
//!
//! The evaluator answers two questions with no I/O at all:
//!
//! - is this code usable for this product right now?
//! - what does this code do to a price in minor currency units?
//!
//! Fetching the code record and updating its usage counter are the
//! storefront's job; everything here is a pure function, so the pricing
//! rules are testable without a database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{DiscountCodeId, ProductId};

/// How a discount code reduces a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    /// Percentage off the base price (amount is 0-100).
    Percentage,
    /// Fixed amount off in minor currency units.
    Fixed,
}

/// Error parsing a [`DiscountType`] from its database representation.
#[derive(thiserror::Error, Debug, Clone)]
#[error("unknown discount type: {0}")]
pub struct ParseDiscountTypeError(String);

impl std::str::FromStr for DiscountType {
    type Err = ParseDiscountTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percentage" => Ok(Self::Percentage),
            "fixed" => Ok(Self::Fixed),
            other => Err(ParseDiscountTypeError(other.to_owned())),
        }
    }
}

impl core::fmt::Display for DiscountType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Percentage => write!(f, "percentage"),
            Self::Fixed => write!(f, "fixed"),
        }
    }
}

/// A redeemable discount code.
///
/// Administrator-managed; the storefront only reads these records and
/// increments `uses` when a charge using the code is fulfilled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountCode {
    pub id: DiscountCodeId,
    /// The human-entered code string (unique).
    pub code: String,
    pub discount_type: DiscountType,
    /// Percentage (0-100) or minor currency units, per `discount_type`.
    pub discount_amount: i64,
    /// Codes without an expiry never expire.
    pub expires_at: Option<DateTime<Utc>>,
    /// Codes without a limit can be used any number of times.
    pub usage_limit: Option<i64>,
    /// Number of fulfilled charges that used this code.
    pub uses: i64,
    pub is_active: bool,
    /// Applies to every product, or only to `product_ids`.
    pub all_products: bool,
    /// Explicit applicability set; ignored when `all_products` is true.
    pub product_ids: Vec<ProductId>,
}

impl DiscountCode {
    /// Whether this code can be applied to `product_id` at `now`.
    ///
    /// A code is usable only if it is active, not expired, below its usage
    /// limit (when one is set), and applicable to the target product. At
    /// `uses == usage_limit` the code is exhausted.
    #[must_use]
    pub fn is_usable(&self, product_id: ProductId, now: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        if self.expires_at.is_some_and(|expires_at| expires_at <= now) {
            return false;
        }
        if self.usage_limit.is_some_and(|limit| self.uses >= limit) {
            return false;
        }
        self.all_products || self.product_ids.contains(&product_id)
    }

    /// Apply this code to a price in minor currency units.
    ///
    /// Percentage discounts round down; fixed discounts floor at zero.
    /// The result is always `0 <= result <= price_in_cents`.
    #[must_use]
    pub fn apply(&self, price_in_cents: i64) -> i64 {
        let discounted = match self.discount_type {
            DiscountType::Percentage => {
                price_in_cents - price_in_cents * self.discount_amount / 100
            }
            DiscountType::Fixed => price_in_cents - self.discount_amount,
        };
        discounted.clamp(0, price_in_cents)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    fn code(discount_type: DiscountType, amount: i64) -> DiscountCode {
        DiscountCode {
            id: DiscountCodeId::new(1),
            code: "SAVE".to_owned(),
            discount_type,
            discount_amount: amount,
            expires_at: None,
            usage_limit: None,
            uses: 0,
            is_active: true,
            all_products: true,
            product_ids: Vec::new(),
        }
    }

    #[test]
    fn test_fixed_discount_subtracts() {
        assert_eq!(code(DiscountType::Fixed, 2000).apply(10_000), 8000);
    }

    #[test]
    fn test_percentage_discount_rounds_down() {
        assert_eq!(code(DiscountType::Percentage, 10).apply(10_000), 9000);
        // 33% off 999 = 669.33, rounds down
        assert_eq!(code(DiscountType::Percentage, 33).apply(999), 669);
    }

    #[test]
    fn test_fixed_discount_floors_at_zero() {
        assert_eq!(code(DiscountType::Fixed, 15_000).apply(10_000), 0);
    }

    #[test]
    fn test_apply_is_monotonic_and_non_negative() {
        for price in [0, 1, 99, 10_000, 1_000_000] {
            for amount in [0, 1, 50, 100, 200] {
                for discount_type in [DiscountType::Percentage, DiscountType::Fixed] {
                    let result = code(discount_type, amount).apply(price);
                    assert!(result >= 0, "negative price for {discount_type:?} {amount}");
                    assert!(result <= price, "markup for {discount_type:?} {amount}");
                }
            }
        }
    }

    #[test]
    fn test_inactive_code_not_usable() {
        let mut c = code(DiscountType::Fixed, 100);
        c.is_active = false;
        assert!(!c.is_usable(ProductId::new(1), Utc::now()));
    }

    #[test]
    fn test_expired_code_not_usable_regardless_of_other_flags() {
        let mut c = code(DiscountType::Fixed, 100);
        c.expires_at = Some(Utc::now() - TimeDelta::hours(1));
        assert!(!c.is_usable(ProductId::new(1), Utc::now()));

        // Still unusable with no limit and active flag set
        c.usage_limit = None;
        c.is_active = true;
        assert!(!c.is_usable(ProductId::new(1), Utc::now()));
    }

    #[test]
    fn test_future_expiry_is_usable() {
        let mut c = code(DiscountType::Fixed, 100);
        c.expires_at = Some(Utc::now() + TimeDelta::hours(1));
        assert!(c.is_usable(ProductId::new(1), Utc::now()));
    }

    #[test]
    fn test_usage_limit_boundary() {
        let mut c = code(DiscountType::Fixed, 100);
        c.usage_limit = Some(5);

        c.uses = 4;
        assert!(c.is_usable(ProductId::new(1), Utc::now()));

        // At uses == limit the code is exhausted
        c.uses = 5;
        assert!(!c.is_usable(ProductId::new(1), Utc::now()));
    }

    #[test]
    fn test_product_applicability() {
        let mut c = code(DiscountType::Fixed, 100);
        c.all_products = false;
        c.product_ids = vec![ProductId::new(2), ProductId::new(3)];

        assert!(c.is_usable(ProductId::new(2), Utc::now()));
        assert!(!c.is_usable(ProductId::new(1), Utc::now()));
    }

    #[test]
    fn test_discount_type_parse_roundtrip() {
        for dt in [DiscountType::Percentage, DiscountType::Fixed] {
            let parsed: DiscountType = dt.to_string().parse().expect("roundtrip");
            assert_eq!(parsed, dt);
        }
        assert!("bogus".parse::<DiscountType>().is_err());
    }
}
