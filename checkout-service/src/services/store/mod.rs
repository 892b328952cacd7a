//! Persistence boundary.
//!
//! Every multi-row mutation goes through a [`UnitOfWork`]: changes become
//! visible on [`UnitOfWork::commit`] and are discarded when the unit is
//! dropped without committing.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::error::Result;
use crate::models::{
    Addon, BankDetail, LineItem, Payment, PaymentMethod, Transaction, Voucher, WhatsappPackage,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Factory for units of work.
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;

    async fn health_check(&self) -> Result<()>;
}

/// A transactional view of the store.
///
/// Methods taking `lock: bool` acquire a row lock held until the unit ends
/// when `lock` is true.
#[async_trait]
pub trait UnitOfWork: Send {
    // Catalog
    async fn insert_package(&mut self, package: &WhatsappPackage) -> Result<()>;
    async fn get_package(&mut self, id: Uuid) -> Result<Option<WhatsappPackage>>;
    async fn insert_addon(&mut self, addon: &Addon) -> Result<()>;
    async fn get_addon(&mut self, id: Uuid) -> Result<Option<Addon>>;

    // Payment methods
    async fn insert_bank_detail(&mut self, detail: &BankDetail) -> Result<()>;
    async fn get_bank_detail(&mut self, id: Uuid) -> Result<Option<BankDetail>>;
    async fn insert_payment_method(&mut self, method: &PaymentMethod) -> Result<()>;
    async fn update_payment_method(&mut self, method: &PaymentMethod) -> Result<()>;
    async fn get_payment_method(&mut self, id: Uuid, lock: bool) -> Result<Option<PaymentMethod>>;
    async fn find_payment_method(&mut self, code: &str) -> Result<Option<PaymentMethod>>;
    async fn list_payment_methods(&mut self, active_only: bool) -> Result<Vec<PaymentMethod>>;

    // Vouchers
    async fn insert_voucher(&mut self, voucher: &Voucher) -> Result<()>;
    async fn get_voucher(&mut self, id: Uuid) -> Result<Option<Voucher>>;
    /// Case-insensitive lookup.
    async fn find_voucher_by_code(&mut self, code: &str) -> Result<Option<Voucher>>;
    async fn list_vouchers(&mut self) -> Result<Vec<Voucher>>;
    async fn increment_voucher_usage(&mut self, id: Uuid, now: DateTime<Utc>) -> Result<()>;

    // Transactions
    async fn insert_transaction(&mut self, transaction: &Transaction) -> Result<()>;
    async fn update_transaction(&mut self, transaction: &Transaction) -> Result<()>;
    async fn get_transaction(&mut self, id: Uuid, lock: bool) -> Result<Option<Transaction>>;
    /// Newest first.
    async fn list_transactions_for_user(&mut self, user_id: Uuid) -> Result<Vec<Transaction>>;
    /// Open transactions past their deadline, locked. Rows locked by a
    /// concurrent sweep are skipped.
    async fn find_expirable_transactions(&mut self, now: DateTime<Utc>)
        -> Result<Vec<Transaction>>;

    // Line items
    async fn insert_line_item(&mut self, item: &LineItem) -> Result<()>;
    async fn update_line_item(&mut self, item: &LineItem) -> Result<()>;
    async fn line_items(&mut self, transaction_id: Uuid) -> Result<Vec<LineItem>>;

    // Payments
    async fn insert_payment(&mut self, payment: &Payment) -> Result<()>;
    async fn update_payment(&mut self, payment: &Payment) -> Result<()>;
    async fn get_payment(&mut self, id: Uuid, lock: bool) -> Result<Option<Payment>>;
    /// Unlocked lookup by the gateway's reference. Writers lock the owning
    /// transaction first, then re-read the payment with `get_payment`.
    async fn find_payment_by_external_id(&mut self, external_id: &str)
        -> Result<Option<Payment>>;
    /// Newest first.
    async fn payments_for_transaction(&mut self, transaction_id: Uuid) -> Result<Vec<Payment>>;
    /// Pending payments past their own deadline whose transaction is still
    /// open or `in_progress`. Both rows are locked; rows held by a concurrent
    /// sweep are skipped.
    async fn find_expirable_payments(&mut self, now: DateTime<Utc>) -> Result<Vec<Payment>>;

    async fn commit(self: Box<Self>) -> Result<()>;
}
