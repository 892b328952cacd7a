//! Checkout: turns a cart into a priced, discounted transaction.

use crate::config::CheckoutRules;
use crate::dtos::{CheckoutItemRequest, CheckoutRequest, CheckoutResponse, TransactionView, VoucherSummary};
use crate::error::{CheckoutError, Result};
use crate::models::{
    AddonItem, Currency, LineItem, Transaction, TransactionStatus, TransactionType,
    WhatsappSubscriptionItem,
};
use crate::services::fees;
use crate::services::metrics::CHECKOUTS_TOTAL;
use crate::services::store::{Store, UnitOfWork};
use crate::services::sweeper::ExpirationSweeper;
use crate::services::vouchers::VoucherEngine;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

pub const DURATION_MONTHS: RangeInclusive<i32> = 1..=36;
pub const ADDON_QUANTITY: RangeInclusive<i32> = 1..=100;

#[derive(Clone)]
pub struct CheckoutOrchestrator {
    store: Arc<dyn Store>,
    sweeper: ExpirationSweeper,
    vouchers: VoucherEngine,
    rules: CheckoutRules,
}

impl CheckoutOrchestrator {
    pub fn new(store: Arc<dyn Store>, sweeper: ExpirationSweeper, rules: CheckoutRules) -> Self {
        Self {
            store,
            sweeper,
            vouchers: VoucherEngine::new(),
            rules,
        }
    }

    /// Price the cart, apply the voucher, and persist a `created`
    /// transaction with its line items. Nothing is written on rejection.
    #[instrument(skip(self, request), fields(currency = %request.currency, items = request.items.len()))]
    pub async fn checkout(&self, user_id: Uuid, request: CheckoutRequest) -> Result<CheckoutResponse> {
        self.sweeper.sweep_lazily().await;

        let result = self.create(user_id, request, Utc::now()).await;
        let label = match &result {
            Ok(_) => "created",
            Err(CheckoutError::VoucherRejected(_)) => "rejected",
            Err(CheckoutError::Validation(_)) | Err(CheckoutError::NotFound(_)) => "invalid",
            Err(_) => "error",
        };
        CHECKOUTS_TOTAL.with_label_values(&[label]).inc();
        result
    }

    async fn create(
        &self,
        user_id: Uuid,
        request: CheckoutRequest,
        now: DateTime<Utc>,
    ) -> Result<CheckoutResponse> {
        let transaction_type = cart_type(&request.items)?;
        let currency = request.currency;
        let transaction_id = Uuid::new_v4();

        let mut uow = self.store.begin().await?;

        let mut line_items = Vec::with_capacity(request.items.len());
        for item in &request.items {
            line_items.push(price_item(uow.as_mut(), transaction_id, item, currency).await?);
        }
        let subtotal: Decimal = line_items.iter().map(LineItem::subtotal).sum();

        let applied = match request.voucher_code.as_deref() {
            Some(code) if !code.trim().is_empty() => Some(
                self.vouchers
                    .apply(uow.as_mut(), code, subtotal, currency, now)
                    .await?,
            ),
            _ => None,
        };
        let discount_amount = applied
            .as_ref()
            .map(|a| a.discount_amount)
            .unwrap_or(Decimal::ZERO);

        let transaction = Transaction {
            id: transaction_id,
            user_id,
            amount: subtotal,
            discount_amount,
            service_fee_amount: Decimal::ZERO,
            final_amount: subtotal - discount_amount,
            currency,
            status: TransactionStatus::Created,
            transaction_type,
            voucher_id: applied.as_ref().map(|a| a.voucher_id),
            expires_at: now + self.rules.checkout_window(),
            created_at: now,
            updated_at: now,
        };

        uow.insert_transaction(&transaction).await?;
        for item in &line_items {
            uow.insert_line_item(item).await?;
        }
        let methods = uow.list_payment_methods(true).await?;
        uow.commit().await?;

        info!(
            transaction_id = %transaction.id,
            user_id = %user_id,
            amount = %transaction.amount,
            discount = %transaction.discount_amount,
            "Transaction created"
        );

        let fee_preview = fees::preview(&methods, transaction.net_amount(), currency);
        let voucher = applied.map(|a| VoucherSummary {
            id: a.voucher_id,
            code: a.code,
            discount_type: a.discount_type.to_string(),
        });

        Ok(CheckoutResponse {
            transaction: TransactionView::assemble(transaction, line_items, voucher, Vec::new()),
            fee_preview,
        })
    }
}

/// All items must share one line-item table.
fn cart_type(items: &[CheckoutItemRequest]) -> Result<TransactionType> {
    let mut kinds = items.iter().map(|item| match item {
        CheckoutItemRequest::WhatsappSubscription { .. } => TransactionType::WhatsappSubscription,
        CheckoutItemRequest::Addon { .. } => TransactionType::Addon,
    });
    let first = kinds
        .next()
        .ok_or_else(|| CheckoutError::Validation("At least one item is required".into()))?;
    if kinds.any(|k| k != first) {
        return Err(CheckoutError::Validation(
            "Subscriptions and addons must be checked out separately".into(),
        ));
    }
    Ok(first)
}

async fn price_item(
    uow: &mut dyn UnitOfWork,
    transaction_id: Uuid,
    item: &CheckoutItemRequest,
    currency: Currency,
) -> Result<LineItem> {
    match *item {
        CheckoutItemRequest::WhatsappSubscription {
            package_id,
            duration_months,
        } => {
            if !DURATION_MONTHS.contains(&duration_months) {
                return Err(CheckoutError::Validation(format!(
                    "duration_months must be between {} and {}",
                    DURATION_MONTHS.start(),
                    DURATION_MONTHS.end()
                )));
            }
            let package = uow
                .get_package(package_id)
                .await?
                .filter(|p| p.is_active)
                .ok_or_else(|| CheckoutError::not_found("Package"))?;
            let unit_price = package.monthly_price(currency).ok_or_else(|| {
                CheckoutError::Validation(format!(
                    "Package {} is not available in {}",
                    package.name, currency
                ))
            })?;

            Ok(LineItem::WhatsappSubscription(WhatsappSubscriptionItem {
                id: Uuid::new_v4(),
                transaction_id,
                package_id,
                duration_months,
                unit_price,
                subtotal: currency.round(unit_price * Decimal::from(duration_months)),
                starts_at: None,
                ends_at: None,
            }))
        }
        CheckoutItemRequest::Addon { addon_id, quantity } => {
            if !ADDON_QUANTITY.contains(&quantity) {
                return Err(CheckoutError::Validation(format!(
                    "quantity must be between {} and {}",
                    ADDON_QUANTITY.start(),
                    ADDON_QUANTITY.end()
                )));
            }
            let addon = uow
                .get_addon(addon_id)
                .await?
                .filter(|a| a.is_active)
                .ok_or_else(|| CheckoutError::not_found("Addon"))?;
            let unit_price = addon.unit_price(currency).ok_or_else(|| {
                CheckoutError::Validation(format!(
                    "Addon {} is not available in {}",
                    addon.name, currency
                ))
            })?;

            Ok(LineItem::Addon(AddonItem {
                id: Uuid::new_v4(),
                transaction_id,
                addon_id,
                quantity,
                unit_price,
                subtotal: currency.round(unit_price * Decimal::from(quantity)),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VoucherRejection;
    use crate::models::{Voucher, VoucherDiscount, WhatsappPackage};
    use crate::services::store::MemoryStore;
    use rust_decimal_macros::dec;

    fn rules() -> CheckoutRules {
        CheckoutRules {
            checkout_window_days: 7,
            payment_window_minutes: 1440,
            sweep_interval_secs: 0,
        }
    }

    async fn setup() -> (MemoryStore, CheckoutOrchestrator, WhatsappPackage) {
        let store = MemoryStore::new();
        let shared: Arc<dyn Store> = Arc::new(store.clone());
        let orchestrator =
            CheckoutOrchestrator::new(shared.clone(), ExpirationSweeper::new(shared), rules());
        let package = WhatsappPackage {
            id: Uuid::new_v4(),
            name: "Basic".to_string(),
            monthly_price_idr: dec!(100000),
            monthly_price_usd: None,
            is_active: true,
            created_at: Utc::now(),
        };
        let mut uow = store.begin().await.unwrap();
        uow.insert_package(&package).await.unwrap();
        uow.commit().await.unwrap();
        (store, orchestrator, package)
    }

    fn request(package_id: Uuid, months: i32, voucher: Option<&str>) -> CheckoutRequest {
        CheckoutRequest {
            currency: Currency::Idr,
            items: vec![CheckoutItemRequest::WhatsappSubscription {
                package_id,
                duration_months: months,
            }],
            voucher_code: voucher.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn prices_come_from_catalog() {
        let (_, orchestrator, package) = setup().await;
        let response = orchestrator
            .checkout(Uuid::new_v4(), request(package.id, 3, None))
            .await
            .unwrap();

        let tx = response.transaction;
        assert_eq!(tx.amount, dec!(300000));
        assert_eq!(tx.final_amount, dec!(300000));
        assert_eq!(tx.status, TransactionStatus::Created);
        assert_eq!(tx.line_items.len(), 1);
        assert!(tx.expires_at > Utc::now() + chrono::Duration::days(6));
    }

    #[tokio::test]
    async fn exhausted_voucher_creates_nothing() {
        let (store, orchestrator, package) = setup().await;
        let now = Utc::now();
        let mut uow = store.begin().await.unwrap();
        uow.insert_voucher(&Voucher {
            id: Uuid::new_v4(),
            code: "ONCE".to_string(),
            discount: VoucherDiscount::Fixed {
                amount: dec!(5000),
            },
            usage_limit: Some(1),
            usage_count: 1,
            expires_at: None,
            min_purchase: None,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();
        uow.commit().await.unwrap();

        let user = Uuid::new_v4();
        let err = orchestrator
            .checkout(user, request(package.id, 1, Some("once")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::VoucherRejected(VoucherRejection::UsageExceeded)
        ));

        let mut uow = store.begin().await.unwrap();
        assert!(uow.list_transactions_for_user(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_bad_carts() {
        let (_, orchestrator, package) = setup().await;
        let user = Uuid::new_v4();

        let err = orchestrator
            .checkout(user, request(package.id, 0, None))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Validation(_)));

        let err = orchestrator
            .checkout(user, request(Uuid::new_v4(), 1, None))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::NotFound(_)));

        let mut usd = request(package.id, 1, None);
        usd.currency = Currency::Usd;
        let err = orchestrator.checkout(user, usd).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Validation(_)));

        let mut mixed = request(package.id, 1, None);
        mixed.items.push(CheckoutItemRequest::Addon {
            addon_id: Uuid::new_v4(),
            quantity: 1,
        });
        let err = orchestrator.checkout(user, mixed).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Validation(_)));
    }
}
