//! Voucher validation and discount computation.

use crate::error::{Result, VoucherRejection};
use crate::models::{Currency, Voucher, VoucherDiscount};
use crate::services::metrics::VOUCHER_APPLICATIONS_TOTAL;
use crate::services::store::UnitOfWork;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, instrument};
use uuid::Uuid;

/// Outcome of a successful voucher application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedVoucher {
    pub voucher_id: Uuid,
    pub code: String,
    pub discount_type: &'static str,
    pub discount_amount: Decimal,
}

/// Check a voucher against a subtotal. Checks run in order: expiry, usage
/// limit, minimum purchase. The discount is rounded to the currency and
/// never exceeds the subtotal.
pub fn evaluate(
    voucher: &Voucher,
    subtotal: Decimal,
    currency: Currency,
    now: DateTime<Utc>,
) -> Result<AppliedVoucher, VoucherRejection> {
    if voucher.expires_at.is_some_and(|expires_at| expires_at <= now) {
        return Err(VoucherRejection::Expired);
    }
    if voucher
        .usage_limit
        .is_some_and(|limit| voucher.usage_count >= limit)
    {
        return Err(VoucherRejection::UsageExceeded);
    }
    if voucher.min_purchase.is_some_and(|min| subtotal < min) {
        return Err(VoucherRejection::BelowMinimum);
    }

    let raw = match voucher.discount {
        VoucherDiscount::Percentage { rate, max_discount } => {
            let discount = subtotal * rate / Decimal::ONE_HUNDRED;
            match max_discount {
                Some(cap) => discount.min(cap),
                None => discount,
            }
        }
        VoucherDiscount::Fixed { amount } => amount,
    };
    let discount_amount = currency.round(raw).clamp(Decimal::ZERO, subtotal);

    Ok(AppliedVoucher {
        voucher_id: voucher.id,
        code: voucher.code.clone(),
        discount_type: voucher.discount.kind(),
        discount_amount,
    })
}

/// Resolves voucher codes inside a unit of work.
#[derive(Debug, Default, Clone, Copy)]
pub struct VoucherEngine;

impl VoucherEngine {
    pub fn new() -> Self {
        Self
    }

    /// Look up `code` and evaluate it. Usage is not consumed here.
    #[instrument(skip(self, uow))]
    pub async fn apply(
        &self,
        uow: &mut dyn UnitOfWork,
        code: &str,
        subtotal: Decimal,
        currency: Currency,
        now: DateTime<Utc>,
    ) -> Result<AppliedVoucher> {
        let outcome = match uow.find_voucher_by_code(code).await? {
            Some(voucher) => evaluate(&voucher, subtotal, currency, now),
            None => Err(VoucherRejection::NotFound),
        };

        match outcome {
            Ok(applied) => {
                VOUCHER_APPLICATIONS_TOTAL
                    .with_label_values(&["applied"])
                    .inc();
                debug!(voucher_id = %applied.voucher_id, discount = %applied.discount_amount, "Voucher applied");
                Ok(applied)
            }
            Err(rejection) => {
                VOUCHER_APPLICATIONS_TOTAL
                    .with_label_values(&[rejection.code()])
                    .inc();
                Err(rejection.into())
            }
        }
    }
}
