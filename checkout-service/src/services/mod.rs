//! Services module for checkout-service.

pub mod admin;
pub mod checkout;
pub mod fees;
pub mod gateway;
pub mod metrics;
pub mod notifier;
pub mod payments;
pub mod receipts;
pub mod store;
pub mod sweeper;
pub mod transactions;
pub mod vouchers;

pub use admin::AdminService;
pub use checkout::CheckoutOrchestrator;
pub use gateway::{HttpPaymentGateway, PaymentGateway};
pub use metrics::{get_metrics, init_metrics};
pub use notifier::{LogNotifier, Notifier, WebhookNotifier};
pub use payments::PaymentService;
pub use receipts::ReceiptProjector;
pub use store::{MemoryStore, PgStore, Store, UnitOfWork};
pub use sweeper::{ExpirationSweeper, SweepReport};
pub use transactions::TransactionService;
pub use vouchers::VoucherEngine;
