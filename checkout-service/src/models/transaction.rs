//! Transaction aggregate: the purchase intent that owns line items and
//! at most one active payment.

use super::money::Currency;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Transaction lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Created,
    Pending,
    InProgress,
    Success,
    Cancelled,
    Expired,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Created => "created",
            TransactionStatus::Pending => "pending",
            TransactionStatus::InProgress => "in_progress",
            TransactionStatus::Success => "success",
            TransactionStatus::Cancelled => "cancelled",
            TransactionStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Success | TransactionStatus::Cancelled | TransactionStatus::Expired
        )
    }

    /// Open for a new payment attempt, cancellation, or expiry.
    pub fn is_open(&self) -> bool {
        matches!(self, TransactionStatus::Created | TransactionStatus::Pending)
    }

    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Created, Pending)
                | (Created, Cancelled)
                | (Created, Expired)
                | (Pending, Pending)
                | (Pending, InProgress)
                | (Pending, Success)
                | (Pending, Cancelled)
                | (Pending, Expired)
                | (InProgress, Pending)
                | (InProgress, Success)
        )
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which line-item table a transaction owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    WhatsappSubscription,
    Addon,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::WhatsappSubscription => "whatsapp_subscription",
            TransactionType::Addon => "addon",
        }
    }
}

/// Transaction row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Subtotal of all line items; never changes after creation.
    pub amount: Decimal,
    pub discount_amount: Decimal,
    pub service_fee_amount: Decimal,
    pub final_amount: Decimal,
    pub currency: Currency,
    pub status: TransactionStatus,
    pub transaction_type: TransactionType,
    pub voucher_id: Option<Uuid>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Rejected state-machine move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("transaction cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub from: TransactionStatus,
    pub to: TransactionStatus,
}

impl Transaction {
    /// Subtotal net of the voucher discount; the base for service fees.
    pub fn net_amount(&self) -> Decimal {
        self.amount - self.discount_amount
    }

    pub fn apply_service_fee(&mut self, fee: Decimal, now: DateTime<Utc>) {
        self.service_fee_amount = fee;
        self.final_amount = self.net_amount() + fee;
        self.updated_at = now;
    }

    /// Drop the fee of an abandoned payment so the next attempt recomputes it.
    pub fn reset_service_fee(&mut self, now: DateTime<Utc>) {
        self.apply_service_fee(Decimal::ZERO, now);
    }

    pub fn transition(
        &mut self,
        next: TransactionStatus,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}
