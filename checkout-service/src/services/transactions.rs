//! Caller-facing transaction reads and cancellation.

use crate::dtos::{PaymentMethodView, TransactionSummary, TransactionView, VoucherSummary};
use crate::error::{CheckoutError, Result};
use crate::models::{Currency, PaymentStatus, Transaction, TransactionStatus};
use crate::services::payments::load_owned;
use crate::services::store::{Store, UnitOfWork};
use crate::services::sweeper::ExpirationSweeper;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Clone)]
pub struct TransactionService {
    store: Arc<dyn Store>,
    sweeper: ExpirationSweeper,
}

impl TransactionService {
    pub fn new(store: Arc<dyn Store>, sweeper: ExpirationSweeper) -> Self {
        Self { store, sweeper }
    }

    /// Full transaction graph. Transactions of other users are reported as
    /// missing.
    #[instrument(skip(self))]
    pub async fn get(&self, user_id: Uuid, transaction_id: Uuid) -> Result<TransactionView> {
        self.sweeper.sweep_lazily().await;

        let mut uow = self.store.begin().await?;
        let transaction = load_owned(uow.as_mut(), user_id, transaction_id, false).await?;
        view(uow.as_mut(), transaction).await
    }

    #[instrument(skip(self))]
    pub async fn list(&self, user_id: Uuid) -> Result<Vec<TransactionSummary>> {
        self.sweeper.sweep_lazily().await;

        let mut uow = self.store.begin().await?;
        let transactions = uow.list_transactions_for_user(user_id).await?;
        Ok(transactions.into_iter().map(TransactionSummary::from).collect())
    }

    /// Cancel a `created` or `pending` transaction together with its
    /// pending payment.
    #[instrument(skip(self))]
    pub async fn cancel(&self, user_id: Uuid, transaction_id: Uuid) -> Result<TransactionView> {
        self.sweeper.sweep_lazily().await;
        let now = Utc::now();

        let mut uow = self.store.begin().await?;
        let mut transaction = load_owned(uow.as_mut(), user_id, transaction_id, true).await?;
        transaction
            .transition(TransactionStatus::Cancelled, now)
            .map_err(|e| CheckoutError::InvalidState(e.to_string()))?;
        transaction.reset_service_fee(now);

        for mut payment in uow.payments_for_transaction(transaction_id).await? {
            if payment.finish(PaymentStatus::Cancelled, now) {
                uow.update_payment(&payment).await?;
            }
        }
        uow.update_transaction(&transaction).await?;

        let view = view(uow.as_mut(), transaction).await?;
        uow.commit().await?;

        info!(transaction_id = %transaction_id, "Transaction cancelled");
        Ok(view)
    }

    /// Active methods, optionally narrowed to one currency.
    pub async fn payment_methods(&self, currency: Option<Currency>) -> Result<Vec<PaymentMethodView>> {
        let mut uow = self.store.begin().await?;
        let methods = uow.list_payment_methods(true).await?;
        Ok(methods
            .into_iter()
            .filter(|m| currency.map_or(true, |c| m.currency == c))
            .map(PaymentMethodView::from)
            .collect())
    }
}

async fn view(uow: &mut dyn UnitOfWork, transaction: Transaction) -> Result<TransactionView> {
    let line_items = uow.line_items(transaction.id).await?;
    let payments = uow.payments_for_transaction(transaction.id).await?;
    let voucher = match transaction.voucher_id {
        Some(id) => uow.get_voucher(id).await?.map(|v| VoucherSummary {
            id: v.id,
            code: v.code,
            discount_type: v.discount.kind().to_string(),
        }),
        None => None,
    };
    Ok(TransactionView::assemble(transaction, line_items, voucher, payments))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Payment, TransactionType};
    use crate::services::store::MemoryStore;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn transaction(user_id: Uuid, status: TransactionStatus) -> Transaction {
        let now = Utc::now();
        Transaction {
            id: Uuid::new_v4(),
            user_id,
            amount: dec!(50000),
            discount_amount: dec!(0),
            service_fee_amount: dec!(1000),
            final_amount: dec!(51000),
            currency: Currency::Idr,
            status,
            transaction_type: TransactionType::Addon,
            voucher_id: None,
            expires_at: now + Duration::days(7),
            created_at: now,
            updated_at: now,
        }
    }

    fn pending_payment(transaction_id: Uuid) -> Payment {
        let now = Utc::now();
        Payment {
            id: Uuid::new_v4(),
            transaction_id,
            method_code: "VA_BCA".to_string(),
            amount: dec!(51000),
            service_fee: dec!(1000),
            status: PaymentStatus::Pending,
            external_id: Some("ext-1".to_string()),
            payment_url: None,
            expires_at: now + Duration::hours(24),
            payment_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    async fn service_with(tx: &Transaction, payment: Option<&Payment>) -> (MemoryStore, TransactionService) {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        uow.insert_transaction(tx).await.unwrap();
        if let Some(p) = payment {
            uow.insert_payment(p).await.unwrap();
        }
        uow.commit().await.unwrap();
        let shared: Arc<dyn Store> = Arc::new(store.clone());
        (store, TransactionService::new(shared.clone(), ExpirationSweeper::new(shared)))
    }

    #[tokio::test]
    async fn other_users_transactions_are_not_found() {
        let owner = Uuid::new_v4();
        let tx = transaction(owner, TransactionStatus::Created);
        let (_, service) = service_with(&tx, None).await;

        assert!(service.get(owner, tx.id).await.is_ok());
        let err = service.get(Uuid::new_v4(), tx.id).await.unwrap_err();
        assert!(matches!(err, CheckoutError::NotFound(_)));
    }

    #[tokio::test]
    async fn cancel_closes_pending_payment_and_resets_fee() {
        let owner = Uuid::new_v4();
        let tx = transaction(owner, TransactionStatus::Pending);
        let payment = pending_payment(tx.id);
        let (store, service) = service_with(&tx, Some(&payment)).await;

        let view = service.cancel(owner, tx.id).await.unwrap();
        assert_eq!(view.status, TransactionStatus::Cancelled);
        assert_eq!(view.service_fee_amount, dec!(0));
        assert_eq!(view.final_amount, dec!(50000));

        let mut uow = store.begin().await.unwrap();
        let stored = uow.get_payment(payment.id, false).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_rejects_terminal_transactions() {
        let owner = Uuid::new_v4();
        let tx = transaction(owner, TransactionStatus::Success);
        let (_, service) = service_with(&tx, None).await;

        let err = service.cancel(owner, tx.id).await.unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidState(_)));
    }
}
