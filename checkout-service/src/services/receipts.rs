//! Receipts for settled payments, rebuilt from the stored transaction graph.

use crate::dtos::{ReceiptLine, ReceiptView};
use crate::error::{CheckoutError, Result};
use crate::models::{LineItem, PaymentStatus};
use crate::services::store::Store;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

#[derive(Clone)]
pub struct ReceiptProjector {
    store: Arc<dyn Store>,
}

impl ReceiptProjector {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    #[instrument(skip(self))]
    pub async fn receipt(&self, user_id: Uuid, payment_id: Uuid) -> Result<ReceiptView> {
        let mut uow = self.store.begin().await?;

        let payment = uow
            .get_payment(payment_id, false)
            .await?
            .ok_or_else(|| CheckoutError::not_found("Payment"))?;
        let transaction = uow
            .get_transaction(payment.transaction_id, false)
            .await?
            .filter(|t| t.user_id == user_id)
            .ok_or_else(|| CheckoutError::not_found("Payment"))?;

        let paid_at = match (payment.status, payment.payment_date) {
            (PaymentStatus::Paid, Some(paid_at)) => paid_at,
            (status, _) => {
                return Err(CheckoutError::InvalidState(format!(
                    "Receipt is only available for paid payments, this one is {status}"
                )))
            }
        };

        let line_items = uow.line_items(transaction.id).await?;
        let voucher_code = match transaction.voucher_id {
            Some(id) => uow.get_voucher(id).await?.map(|v| v.code),
            None => None,
        };

        let mut names = HashMap::new();
        for item in &line_items {
            let (id, name) = match item {
                LineItem::WhatsappSubscription(s) => {
                    (s.package_id, uow.get_package(s.package_id).await?.map(|p| p.name))
                }
                LineItem::Addon(a) => (a.addon_id, uow.get_addon(a.addon_id).await?.map(|a| a.name)),
            };
            if let Some(name) = name {
                names.insert(id, name);
            }
        }

        let currency = transaction.currency;
        let items: Vec<ReceiptLine> = line_items
            .iter()
            .map(|item| match item {
                LineItem::WhatsappSubscription(s) => ReceiptLine {
                    description: names
                        .get(&s.package_id)
                        .map(|name| format!("WhatsApp {name} ({} mo)", s.duration_months))
                        .unwrap_or_else(|| "WhatsApp subscription".to_string()),
                    quantity: s.duration_months,
                    unit_price: s.unit_price,
                    subtotal: currency.round(s.unit_price * Decimal::from(s.duration_months)),
                    starts_at: s.starts_at,
                    ends_at: s.ends_at,
                },
                LineItem::Addon(a) => ReceiptLine {
                    description: names
                        .get(&a.addon_id)
                        .cloned()
                        .unwrap_or_else(|| "Addon".to_string()),
                    quantity: a.quantity,
                    unit_price: a.unit_price,
                    subtotal: currency.round(a.unit_price * Decimal::from(a.quantity)),
                    starts_at: None,
                    ends_at: None,
                },
            })
            .collect();

        let subtotal: Decimal = items.iter().map(|line| line.subtotal).sum();
        let discount = transaction.discount_amount.min(subtotal);
        let service_fee = payment.service_fee;

        Ok(ReceiptView {
            payment_id: payment.id,
            transaction_id: transaction.id,
            paid_at,
            payment_method: payment.method_code,
            currency,
            items,
            subtotal,
            voucher_code,
            discount,
            service_fee,
            total: subtotal - discount + service_fee,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Currency, Payment, Transaction, TransactionStatus, TransactionType, WhatsappPackage,
        WhatsappSubscriptionItem,
    };
    use crate::services::store::MemoryStore;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    async fn seed(status: PaymentStatus) -> (MemoryStore, Uuid, Uuid) {
        let store = MemoryStore::new();
        let now = Utc::now();
        let user_id = Uuid::new_v4();
        let package = WhatsappPackage {
            id: Uuid::new_v4(),
            name: "Pro".to_string(),
            monthly_price_idr: dec!(100000),
            monthly_price_usd: None,
            is_active: true,
            created_at: now,
        };
        let transaction = Transaction {
            id: Uuid::new_v4(),
            user_id,
            amount: dec!(200000),
            discount_amount: dec!(20000),
            service_fee_amount: dec!(2000),
            final_amount: dec!(182000),
            currency: Currency::Idr,
            status: TransactionStatus::Success,
            transaction_type: TransactionType::WhatsappSubscription,
            voucher_id: None,
            expires_at: now + Duration::days(7),
            created_at: now,
            updated_at: now,
        };
        let payment = Payment {
            id: Uuid::new_v4(),
            transaction_id: transaction.id,
            method_code: "VA_BCA".to_string(),
            amount: dec!(182000),
            service_fee: dec!(2000),
            status,
            external_id: Some("ext-9".to_string()),
            payment_url: None,
            expires_at: now + Duration::hours(24),
            payment_date: (status == PaymentStatus::Paid).then_some(now),
            created_at: now,
            updated_at: now,
        };

        let mut uow = store.begin().await.unwrap();
        uow.insert_package(&package).await.unwrap();
        uow.insert_transaction(&transaction).await.unwrap();
        uow.insert_line_item(&LineItem::WhatsappSubscription(WhatsappSubscriptionItem {
            id: Uuid::new_v4(),
            transaction_id: transaction.id,
            package_id: package.id,
            duration_months: 2,
            unit_price: dec!(100000),
            subtotal: dec!(200000),
            starts_at: Some(now),
            ends_at: None,
        }))
        .await
        .unwrap();
        uow.insert_payment(&payment).await.unwrap();
        uow.commit().await.unwrap();

        (store, user_id, payment.id)
    }

    #[tokio::test]
    async fn paid_receipt_recomputes_totals() {
        let (store, user_id, payment_id) = seed(PaymentStatus::Paid).await;
        let receipt = ReceiptProjector::new(Arc::new(store))
            .receipt(user_id, payment_id)
            .await
            .unwrap();

        assert_eq!(receipt.items.len(), 1);
        assert_eq!(receipt.items[0].description, "WhatsApp Pro (2 mo)");
        assert_eq!(receipt.subtotal, dec!(200000));
        assert_eq!(receipt.discount, dec!(20000));
        assert_eq!(receipt.service_fee, dec!(2000));
        assert_eq!(receipt.total, dec!(182000));
    }

    #[tokio::test]
    async fn unpaid_payment_has_no_receipt() {
        let (store, user_id, payment_id) = seed(PaymentStatus::Pending).await;
        let err = ReceiptProjector::new(Arc::new(store))
            .receipt(user_id, payment_id)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidState(_)));
    }

    #[tokio::test]
    async fn foreign_payment_is_not_found() {
        let (store, _, payment_id) = seed(PaymentStatus::Paid).await;
        let err = ReceiptProjector::new(Arc::new(store))
            .receipt(Uuid::new_v4(), payment_id)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::NotFound(_)));
    }
}
