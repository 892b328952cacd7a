//! Payment methods, their fee schedules, and bank transfer details.

use super::money::Currency;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Service fee schedule of a payment method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum FeeType {
    /// Flat amount in the method's currency.
    Fixed(Decimal),
    /// Percent of the subtotal, e.g. `2.5` for 2.5%.
    Percentage(Decimal),
}

impl FeeType {
    pub fn kind(&self) -> &'static str {
        match self {
            FeeType::Fixed(_) => "fixed",
            FeeType::Percentage(_) => "percentage",
        }
    }

    pub fn value(&self) -> Decimal {
        match self {
            FeeType::Fixed(v) | FeeType::Percentage(v) => *v,
        }
    }

    pub fn from_parts(kind: &str, value: Decimal) -> anyhow::Result<Self> {
        match kind {
            "fixed" => Ok(FeeType::Fixed(value)),
            "percentage" => Ok(FeeType::Percentage(value)),
            other => Err(anyhow::anyhow!("Unknown fee type: {}", other)),
        }
    }
}

/// How a method collects money.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentChannel<'a> {
    /// Manual transfer to a bank account; no gateway call.
    BankTransfer(Uuid),
    /// Automated charge through the payment gateway.
    Gateway(&'a str),
}

/// Payment method offered at checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub currency: Currency,
    pub fee: FeeType,
    pub min_fee: Option<Decimal>,
    pub max_fee: Option<Decimal>,
    pub is_active: bool,
    pub bank_detail_id: Option<Uuid>,
    pub gateway_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentMethod {
    /// Codes are stored upper-case and matched case-insensitively.
    pub fn normalize_code(code: &str) -> String {
        code.trim().to_uppercase()
    }

    pub fn channel(&self) -> Option<PaymentChannel<'_>> {
        match (&self.bank_detail_id, &self.gateway_code) {
            (Some(bank), None) => Some(PaymentChannel::BankTransfer(*bank)),
            (None, Some(code)) => Some(PaymentChannel::Gateway(code.as_str())),
            _ => None,
        }
    }

    pub fn is_bank_transfer(&self) -> bool {
        self.bank_detail_id.is_some()
    }
}

/// Database representation of [`PaymentMethod`].
#[derive(Debug, Clone, FromRow)]
pub struct PaymentMethodRow {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub currency: Currency,
    pub fee_type: String,
    pub fee_value: Decimal,
    pub min_fee: Option<Decimal>,
    pub max_fee: Option<Decimal>,
    pub is_active: bool,
    pub bank_detail_id: Option<Uuid>,
    pub gateway_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentMethodRow> for PaymentMethod {
    type Error = anyhow::Error;

    fn try_from(row: PaymentMethodRow) -> Result<Self, Self::Error> {
        Ok(Self {
            fee: FeeType::from_parts(&row.fee_type, row.fee_value)?,
            id: row.id,
            code: row.code,
            name: row.name,
            currency: row.currency,
            min_fee: row.min_fee,
            max_fee: row.max_fee,
            is_active: row.is_active,
            bank_detail_id: row.bank_detail_id,
            gateway_code: row.gateway_code,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Destination account for manual bank transfers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct BankDetail {
    pub id: Uuid,
    pub bank_name: String,
    pub account_number: String,
    pub account_holder: String,
    pub created_at: DateTime<Utc>,
}
