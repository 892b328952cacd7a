//! Domain models for checkout-service.

pub mod catalog;
pub mod line_item;
pub mod money;
pub mod payment;
pub mod payment_method;
pub mod transaction;
pub mod voucher;

pub use catalog::{Addon, WhatsappPackage};
pub use line_item::{AddonItem, LineItem, WhatsappSubscriptionItem};
pub use money::Currency;
pub use payment::{Payment, PaymentStatus};
pub use payment_method::{BankDetail, FeeType, PaymentChannel, PaymentMethod, PaymentMethodRow};
pub use transaction::{Transaction, TransactionStatus, TransactionType};
pub use voucher::{Voucher, VoucherDiscount, VoucherRow};
