use super::{Store, UnitOfWork};
use crate::error::{CheckoutError, Result};
use crate::models::{
    Addon, BankDetail, LineItem, Payment, PaymentMethod, PaymentStatus, Transaction,
    TransactionStatus, Voucher, WhatsappPackage,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Default, Clone)]
struct MemoryState {
    packages: HashMap<Uuid, WhatsappPackage>,
    addons: HashMap<Uuid, Addon>,
    bank_details: HashMap<Uuid, BankDetail>,
    payment_methods: HashMap<Uuid, PaymentMethod>,
    vouchers: HashMap<Uuid, Voucher>,
    transactions: HashMap<Uuid, Transaction>,
    line_items: HashMap<Uuid, LineItem>,
    payments: HashMap<Uuid, Payment>,
}

/// Process-local store for tests and database-less runs.
///
/// Units of work are serialized: each holds the state lock for its whole
/// lifetime and edits a staged copy that replaces the state on commit.
#[derive(Default, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryUnitOfWork { guard, staged }))
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

fn missing(what: &str, id: Uuid) -> CheckoutError {
    CheckoutError::Database(anyhow::anyhow!("{} {} does not exist", what, id))
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn insert_package(&mut self, package: &WhatsappPackage) -> Result<()> {
        self.staged.packages.insert(package.id, package.clone());
        Ok(())
    }

    async fn get_package(&mut self, id: Uuid) -> Result<Option<WhatsappPackage>> {
        Ok(self.staged.packages.get(&id).cloned())
    }

    async fn insert_addon(&mut self, addon: &Addon) -> Result<()> {
        self.staged.addons.insert(addon.id, addon.clone());
        Ok(())
    }

    async fn get_addon(&mut self, id: Uuid) -> Result<Option<Addon>> {
        Ok(self.staged.addons.get(&id).cloned())
    }

    async fn insert_bank_detail(&mut self, detail: &BankDetail) -> Result<()> {
        self.staged.bank_details.insert(detail.id, detail.clone());
        Ok(())
    }

    async fn get_bank_detail(&mut self, id: Uuid) -> Result<Option<BankDetail>> {
        Ok(self.staged.bank_details.get(&id).cloned())
    }

    async fn insert_payment_method(&mut self, method: &PaymentMethod) -> Result<()> {
        if self
            .staged
            .payment_methods
            .values()
            .any(|m| m.code == method.code)
        {
            return Err(CheckoutError::Conflict(format!(
                "Payment method {} already exists",
                method.code
            )));
        }
        self.staged
            .payment_methods
            .insert(method.id, method.clone());
        Ok(())
    }

    async fn update_payment_method(&mut self, method: &PaymentMethod) -> Result<()> {
        let slot = self
            .staged
            .payment_methods
            .get_mut(&method.id)
            .ok_or_else(|| missing("payment method", method.id))?;
        *slot = method.clone();
        Ok(())
    }

    async fn get_payment_method(&mut self, id: Uuid, _lock: bool) -> Result<Option<PaymentMethod>> {
        Ok(self.staged.payment_methods.get(&id).cloned())
    }

    async fn find_payment_method(&mut self, code: &str) -> Result<Option<PaymentMethod>> {
        let code = PaymentMethod::normalize_code(code);
        Ok(self
            .staged
            .payment_methods
            .values()
            .find(|m| m.code == code)
            .cloned())
    }

    async fn list_payment_methods(&mut self, active_only: bool) -> Result<Vec<PaymentMethod>> {
        let mut methods: Vec<PaymentMethod> = self
            .staged
            .payment_methods
            .values()
            .filter(|m| !active_only || m.is_active)
            .cloned()
            .collect();
        methods.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(methods)
    }

    async fn insert_voucher(&mut self, voucher: &Voucher) -> Result<()> {
        if self
            .staged
            .vouchers
            .values()
            .any(|v| v.code.eq_ignore_ascii_case(&voucher.code))
        {
            return Err(CheckoutError::Conflict(format!(
                "Voucher {} already exists",
                voucher.code
            )));
        }
        self.staged.vouchers.insert(voucher.id, voucher.clone());
        Ok(())
    }

    async fn get_voucher(&mut self, id: Uuid) -> Result<Option<Voucher>> {
        Ok(self.staged.vouchers.get(&id).cloned())
    }

    async fn find_voucher_by_code(&mut self, code: &str) -> Result<Option<Voucher>> {
        let code = Voucher::normalize_code(code);
        Ok(self
            .staged
            .vouchers
            .values()
            .find(|v| v.code == code)
            .cloned())
    }

    async fn list_vouchers(&mut self) -> Result<Vec<Voucher>> {
        let mut vouchers: Vec<Voucher> = self.staged.vouchers.values().cloned().collect();
        vouchers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(vouchers)
    }

    async fn increment_voucher_usage(&mut self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let voucher = self
            .staged
            .vouchers
            .get_mut(&id)
            .ok_or_else(|| missing("voucher", id))?;
        voucher.usage_count += 1;
        voucher.updated_at = now;
        Ok(())
    }

    async fn insert_transaction(&mut self, transaction: &Transaction) -> Result<()> {
        self.staged
            .transactions
            .insert(transaction.id, transaction.clone());
        Ok(())
    }

    async fn update_transaction(&mut self, transaction: &Transaction) -> Result<()> {
        let slot = self
            .staged
            .transactions
            .get_mut(&transaction.id)
            .ok_or_else(|| missing("transaction", transaction.id))?;
        *slot = transaction.clone();
        Ok(())
    }

    async fn get_transaction(&mut self, id: Uuid, _lock: bool) -> Result<Option<Transaction>> {
        Ok(self.staged.transactions.get(&id).cloned())
    }

    async fn list_transactions_for_user(&mut self, user_id: Uuid) -> Result<Vec<Transaction>> {
        let mut transactions: Vec<Transaction> = self
            .staged
            .transactions
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        transactions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(transactions)
    }

    async fn find_expirable_transactions(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Transaction>> {
        Ok(self
            .staged
            .transactions
            .values()
            .filter(|t| t.status.is_open() && t.is_past_deadline(now))
            .cloned()
            .collect())
    }

    async fn insert_line_item(&mut self, item: &LineItem) -> Result<()> {
        self.staged.line_items.insert(item.id(), item.clone());
        Ok(())
    }

    async fn update_line_item(&mut self, item: &LineItem) -> Result<()> {
        let slot = self
            .staged
            .line_items
            .get_mut(&item.id())
            .ok_or_else(|| missing("line item", item.id()))?;
        *slot = item.clone();
        Ok(())
    }

    async fn line_items(&mut self, transaction_id: Uuid) -> Result<Vec<LineItem>> {
        let mut items: Vec<LineItem> = self
            .staged
            .line_items
            .values()
            .filter(|i| i.transaction_id() == transaction_id)
            .cloned()
            .collect();
        items.sort_by_key(|i| i.id());
        Ok(items)
    }

    async fn insert_payment(&mut self, payment: &Payment) -> Result<()> {
        self.staged.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn update_payment(&mut self, payment: &Payment) -> Result<()> {
        let slot = self
            .staged
            .payments
            .get_mut(&payment.id)
            .ok_or_else(|| missing("payment", payment.id))?;
        *slot = payment.clone();
        Ok(())
    }

    async fn get_payment(&mut self, id: Uuid, _lock: bool) -> Result<Option<Payment>> {
        Ok(self.staged.payments.get(&id).cloned())
    }

    async fn find_payment_by_external_id(
        &mut self,
        external_id: &str,
    ) -> Result<Option<Payment>> {
        Ok(self
            .staged
            .payments
            .values()
            .find(|p| p.external_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn payments_for_transaction(&mut self, transaction_id: Uuid) -> Result<Vec<Payment>> {
        let mut payments: Vec<Payment> = self
            .staged
            .payments
            .values()
            .filter(|p| p.transaction_id == transaction_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payments)
    }

    async fn find_expirable_payments(&mut self, now: DateTime<Utc>) -> Result<Vec<Payment>> {
        let transactions = &self.staged.transactions;
        Ok(self
            .staged
            .payments
            .values()
            .filter(|p| p.status == PaymentStatus::Pending && p.is_past_deadline(now))
            .filter(|p| {
                transactions
                    .get(&p.transaction_id)
                    .is_some_and(|t| {
                        t.status.is_open() || t.status == TransactionStatus::InProgress
                    })
            })
            .cloned()
            .collect())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryUnitOfWork { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }
}
