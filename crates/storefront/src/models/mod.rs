//! Domain models for the storefront.

pub mod download;
pub mod order;
pub mod product;

pub use download::DownloadVerification;
pub use order::{Order, OrderWithProduct, User};
pub use product::Product;
