//! Service fee calculation.

use crate::models::{Currency, FeeType, PaymentMethod};
use rust_decimal::Decimal;
use serde::Serialize;

const ONE_HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Fee owed on `subtotal` under a method's schedule, clamped to
/// `[min_fee, max_fee]` when either bound is set. Unrounded.
pub fn compute_fee(
    subtotal: Decimal,
    fee: &FeeType,
    min_fee: Option<Decimal>,
    max_fee: Option<Decimal>,
) -> Decimal {
    let mut amount = match fee {
        FeeType::Fixed(value) => *value,
        FeeType::Percentage(rate) => subtotal * *rate / ONE_HUNDRED,
    };
    if let Some(min) = min_fee {
        amount = amount.max(min);
    }
    if let Some(max) = max_fee {
        amount = amount.min(max);
    }
    amount.max(Decimal::ZERO)
}

/// Fee owed for a method, rounded to the currency's minor unit.
pub fn fee_for_method(method: &PaymentMethod, net_subtotal: Decimal, currency: Currency) -> Decimal {
    currency.round(compute_fee(
        net_subtotal,
        &method.fee,
        method.min_fee,
        method.max_fee,
    ))
}

/// What the caller would pay with one method.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeePreview {
    pub method: String,
    pub name: String,
    pub service_fee: Decimal,
    pub final_amount: Decimal,
}

/// Preview fees for every method in `methods` that settles in `currency`.
pub fn preview(methods: &[PaymentMethod], net_subtotal: Decimal, currency: Currency) -> Vec<FeePreview> {
    methods
        .iter()
        .filter(|m| m.is_active && m.currency == currency)
        .map(|m| {
            let service_fee = fee_for_method(m, net_subtotal, currency);
            FeePreview {
                method: m.code.clone(),
                name: m.name.clone(),
                service_fee,
                final_amount: net_subtotal + service_fee,
            }
        })
        .collect()
}
