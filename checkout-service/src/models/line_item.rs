//! Typed line-item rows owned by a transaction.

use chrono::{DateTime, Months, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// WhatsApp subscription purchase. The subscription period is only known
/// once payment succeeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct WhatsappSubscriptionItem {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub package_id: Uuid,
    pub duration_months: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

impl WhatsappSubscriptionItem {
    /// Fix the subscription period. Only the first call has an effect.
    pub fn activate(&mut self, now: DateTime<Utc>) {
        if self.starts_at.is_some() {
            return;
        }
        let months = Months::new(self.duration_months.max(0) as u32);
        self.starts_at = Some(now);
        self.ends_at = now.checked_add_months(months);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AddonItem {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub addon_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}

/// Any line item, tagged by table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LineItem {
    WhatsappSubscription(WhatsappSubscriptionItem),
    Addon(AddonItem),
}

impl LineItem {
    pub fn id(&self) -> Uuid {
        match self {
            LineItem::WhatsappSubscription(item) => item.id,
            LineItem::Addon(item) => item.id,
        }
    }

    pub fn transaction_id(&self) -> Uuid {
        match self {
            LineItem::WhatsappSubscription(item) => item.transaction_id,
            LineItem::Addon(item) => item.transaction_id,
        }
    }

    pub fn subtotal(&self) -> Decimal {
        match self {
            LineItem::WhatsappSubscription(item) => item.subtotal,
            LineItem::Addon(item) => item.subtotal,
        }
    }
}
