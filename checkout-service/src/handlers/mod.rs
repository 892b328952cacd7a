//! HTTP handlers for checkout-service.

pub mod admin;
pub mod checkout;
pub mod health;
pub mod payments;
pub mod receipts;
pub mod transactions;

pub use health::{health_check, metrics_handler, readiness_check};
