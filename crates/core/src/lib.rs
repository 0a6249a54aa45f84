//! Digistore Core - Shared domain types.
//!
//! This crate provides the types shared between the storefront binary and
//! its tests:
//!
//! - [`types`] - Newtype wrappers for type-safe IDs and email addresses
//! - [`discount`] - Discount codes and the pure price evaluator
//!
//! # Architecture
//!
//! The core crate contains only types and pure logic - no I/O, no database
//! access, no HTTP clients. The discount evaluator in particular is a pure
//! function of a code record, a product and a price, which keeps the
//! pricing rules testable without a database.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod discount;
pub mod types;

pub use discount::{DiscountCode, DiscountType};
pub use types::*;
