//! Catalog entries that can be purchased.

use super::money::Currency;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// WhatsApp subscription package, priced per month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct WhatsappPackage {
    pub id: Uuid,
    pub name: String,
    pub monthly_price_idr: Decimal,
    pub monthly_price_usd: Option<Decimal>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl WhatsappPackage {
    pub fn monthly_price(&self, currency: Currency) -> Option<Decimal> {
        match currency {
            Currency::Idr => Some(self.monthly_price_idr),
            Currency::Usd => self.monthly_price_usd,
        }
    }
}

/// One-off addon, priced per unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Addon {
    pub id: Uuid,
    pub name: String,
    pub price_idr: Decimal,
    pub price_usd: Option<Decimal>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Addon {
    pub fn unit_price(&self, currency: Currency) -> Option<Decimal> {
        match currency {
            Currency::Idr => Some(self.price_idr),
            Currency::Usd => self.price_usd,
        }
    }
}
