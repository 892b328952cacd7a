//! Request and response bodies.

use crate::models::{
    BankDetail, Currency, FeeType, LineItem, Payment, PaymentStatus, Transaction,
    TransactionStatus, TransactionType, VoucherDiscount,
};
use crate::services::fees::FeePreview;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

// =============================================================================
// Checkout
// =============================================================================

/// One selection in a cart. Prices are always resolved server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckoutItemRequest {
    WhatsappSubscription { package_id: Uuid, duration_months: i32 },
    Addon { addon_id: Uuid, quantity: i32 },
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CheckoutRequest {
    pub currency: Currency,
    #[validate(length(min = 1, max = 20, message = "between 1 and 20 items required"))]
    pub items: Vec<CheckoutItemRequest>,
    #[validate(length(min = 1, max = 64))]
    pub voucher_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResponse {
    pub transaction: TransactionView,
    pub fee_preview: Vec<FeePreview>,
}

// =============================================================================
// Transactions and payments
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct VoucherSummary {
    pub id: Uuid,
    pub code: String,
    pub discount_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BankInstructions {
    pub bank_name: String,
    pub account_number: String,
    pub account_holder: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub pay_before: DateTime<Utc>,
}

impl BankInstructions {
    pub fn new(detail: BankDetail, payment: &Payment, currency: Currency) -> Self {
        Self {
            bank_name: detail.bank_name,
            account_number: detail.account_number,
            account_holder: detail.account_holder,
            amount: payment.amount,
            currency,
            pay_before: payment.expires_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentView {
    pub id: Uuid,
    pub method: String,
    pub amount: Decimal,
    pub service_fee: Decimal,
    pub status: PaymentStatus,
    pub payment_url: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub payment_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Payment> for PaymentView {
    fn from(p: Payment) -> Self {
        Self {
            id: p.id,
            method: p.method_code,
            amount: p.amount,
            service_fee: p.service_fee,
            status: p.status,
            payment_url: p.payment_url,
            expires_at: p.expires_at,
            payment_date: p.payment_date,
            created_at: p.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TransactionView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: TransactionStatus,
    pub transaction_type: TransactionType,
    pub currency: Currency,
    pub amount: Decimal,
    pub discount_amount: Decimal,
    pub service_fee_amount: Decimal,
    pub final_amount: Decimal,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub voucher: Option<VoucherSummary>,
    pub line_items: Vec<LineItem>,
    /// Most recent payment attempt.
    pub payment: Option<PaymentView>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub payment_history: Vec<PaymentView>,
}

impl TransactionView {
    pub fn assemble(
        transaction: Transaction,
        line_items: Vec<LineItem>,
        voucher: Option<VoucherSummary>,
        mut payments: Vec<Payment>,
    ) -> Self {
        let latest = if payments.is_empty() {
            None
        } else {
            Some(payments.remove(0))
        };
        Self {
            id: transaction.id,
            user_id: transaction.user_id,
            status: transaction.status,
            transaction_type: transaction.transaction_type,
            currency: transaction.currency,
            amount: transaction.amount,
            discount_amount: transaction.discount_amount,
            service_fee_amount: transaction.service_fee_amount,
            final_amount: transaction.final_amount,
            expires_at: transaction.expires_at,
            created_at: transaction.created_at,
            updated_at: transaction.updated_at,
            voucher,
            line_items,
            payment: latest.map(PaymentView::from),
            payment_history: payments.into_iter().map(PaymentView::from).collect(),
        }
    }
}

/// Row in a transaction listing.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionSummary {
    pub id: Uuid,
    pub status: TransactionStatus,
    pub transaction_type: TransactionType,
    pub currency: Currency,
    pub final_amount: Decimal,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<Transaction> for TransactionSummary {
    fn from(t: Transaction) -> Self {
        Self {
            id: t.id,
            status: t.status,
            transaction_type: t.transaction_type,
            currency: t.currency,
            final_amount: t.final_amount,
            expires_at: t.expires_at,
            created_at: t.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct InitiatePaymentRequest {
    #[validate(length(min = 1, max = 50, message = "payment method code required"))]
    pub method: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitiatePaymentResponse {
    pub transaction_id: Uuid,
    pub transaction_status: TransactionStatus,
    pub final_amount: Decimal,
    pub payment: PaymentView,
    /// Hosted payment page for gateway methods.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    /// Transfer instructions for bank-backed methods.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_instructions: Option<BankInstructions>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallbackAck {
    pub received: bool,
    pub result: &'static str,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentMethodsQuery {
    pub currency: Option<Currency>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentMethodView {
    pub code: String,
    pub name: String,
    pub currency: Currency,
    pub fee: FeeType,
    pub min_fee: Option<Decimal>,
    pub max_fee: Option<Decimal>,
    pub channel: &'static str,
}

impl From<crate::models::PaymentMethod> for PaymentMethodView {
    fn from(m: crate::models::PaymentMethod) -> Self {
        let channel = if m.is_bank_transfer() {
            "bank_transfer"
        } else {
            "gateway"
        };
        Self {
            code: m.code,
            name: m.name,
            currency: m.currency,
            fee: m.fee,
            min_fee: m.min_fee,
            max_fee: m.max_fee,
            channel,
        }
    }
}

// =============================================================================
// Receipts
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ReceiptLine {
    pub description: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReceiptView {
    pub payment_id: Uuid,
    pub transaction_id: Uuid,
    pub paid_at: DateTime<Utc>,
    pub payment_method: String,
    pub currency: Currency,
    pub items: Vec<ReceiptLine>,
    pub subtotal: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voucher_code: Option<String>,
    pub discount: Decimal,
    pub service_fee: Decimal,
    pub total: Decimal,
}

// =============================================================================
// Admin
// =============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePackageRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub monthly_price_idr: Decimal,
    pub monthly_price_usd: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateAddonRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub price_idr: Decimal,
    pub price_usd: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateBankDetailRequest {
    #[validate(length(min = 1, max = 100))]
    pub bank_name: String,
    #[validate(length(min = 4, max = 34))]
    pub account_number: String,
    #[validate(length(min = 1, max = 100))]
    pub account_holder: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePaymentMethodRequest {
    #[validate(length(min = 1, max = 50))]
    pub code: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub currency: Currency,
    pub fee: FeeType,
    pub min_fee: Option<Decimal>,
    pub max_fee: Option<Decimal>,
    pub bank_detail_id: Option<Uuid>,
    pub gateway_code: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Deactivate any other active bank-backed method.
    #[serde(default)]
    pub force: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SetActiveRequest {
    pub is_active: bool,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateVoucherRequest {
    #[validate(length(min = 3, max = 32))]
    pub code: String,
    pub discount: VoucherDiscount,
    #[validate(range(min = 1))]
    pub usage_limit: Option<i32>,
    pub expires_at: Option<DateTime<Utc>>,
    pub min_purchase: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_request_parses_tagged_items() {
        let body = serde_json::json!({
            "currency": "idr",
            "voucher_code": "save10",
            "items": [
                { "type": "whatsapp_subscription", "package_id": Uuid::nil(), "duration_months": 3 }
            ]
        });
        let req: CheckoutRequest = serde_json::from_value(body).unwrap();
        assert_eq!(req.currency, Currency::Idr);
        assert!(matches!(
            req.items[0],
            CheckoutItemRequest::WhatsappSubscription {
                duration_months: 3,
                ..
            }
        ));
        assert!(req.validate().is_ok());
    }

    #[test]
    fn empty_cart_fails_validation() {
        let req = CheckoutRequest {
            currency: Currency::Usd,
            items: vec![],
            voucher_code: None,
        };
        assert!(req.validate().is_err());
    }
}
