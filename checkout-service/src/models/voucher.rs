//! Voucher model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Discount granted by a voucher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum VoucherDiscount {
    /// Percent of the subtotal, optionally capped.
    Percentage {
        rate: Decimal,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_discount: Option<Decimal>,
    },
    /// Flat amount off, never more than the subtotal.
    Fixed { amount: Decimal },
}

impl VoucherDiscount {
    pub fn kind(&self) -> &'static str {
        match self {
            VoucherDiscount::Percentage { .. } => "percentage",
            VoucherDiscount::Fixed { .. } => "fixed",
        }
    }

    pub fn value(&self) -> Decimal {
        match self {
            VoucherDiscount::Percentage { rate, .. } => *rate,
            VoucherDiscount::Fixed { amount } => *amount,
        }
    }

    pub fn cap(&self) -> Option<Decimal> {
        match self {
            VoucherDiscount::Percentage { max_discount, .. } => *max_discount,
            VoucherDiscount::Fixed { .. } => None,
        }
    }
}

/// Voucher definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voucher {
    pub id: Uuid,
    /// Stored upper-case; lookups are case-insensitive.
    pub code: String,
    pub discount: VoucherDiscount,
    pub usage_limit: Option<i32>,
    pub usage_count: i32,
    pub expires_at: Option<DateTime<Utc>>,
    pub min_purchase: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Voucher {
    pub fn normalize_code(code: &str) -> String {
        code.trim().to_uppercase()
    }
}

/// Database representation of [`Voucher`].
#[derive(Debug, Clone, FromRow)]
pub struct VoucherRow {
    pub id: Uuid,
    pub code: String,
    pub discount_type: String,
    pub discount_value: Decimal,
    pub max_discount: Option<Decimal>,
    pub usage_limit: Option<i32>,
    pub usage_count: i32,
    pub expires_at: Option<DateTime<Utc>>,
    pub min_purchase: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<VoucherRow> for Voucher {
    type Error = anyhow::Error;

    fn try_from(row: VoucherRow) -> Result<Self, Self::Error> {
        let discount = match row.discount_type.as_str() {
            "percentage" => VoucherDiscount::Percentage {
                rate: row.discount_value,
                max_discount: row.max_discount,
            },
            "fixed" => VoucherDiscount::Fixed {
                amount: row.discount_value,
            },
            other => return Err(anyhow::anyhow!("Unknown voucher type: {}", other)),
        };

        Ok(Self {
            id: row.id,
            code: row.code,
            discount,
            usage_limit: row.usage_limit,
            usage_count: row.usage_count,
            expires_at: row.expires_at,
            min_purchase: row.min_purchase,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
