//! Best-effort notifications about settled payments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;
use service_core::retry::{retry_async, RetryConfig};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::models::Currency;

/// Emitted once a payment is settled.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentSucceeded {
    pub event: &'static str,
    pub user_id: Uuid,
    pub transaction_id: Uuid,
    pub payment_id: Uuid,
    pub amount: Decimal,
    pub currency: Currency,
    pub paid_at: DateTime<Utc>,
}

impl PaymentSucceeded {
    pub const EVENT: &'static str = "payment.succeeded";
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn payment_succeeded(&self, event: &PaymentSucceeded) -> anyhow::Result<()>;
}

/// Posts events as JSON to a fixed URL.
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(5)).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn payment_succeeded(&self, event: &PaymentSucceeded) -> anyhow::Result<()> {
        let response = self.client.post(&self.url).json(event).send().await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("webhook returned {}", status);
        }
        Ok(())
    }
}

/// Writes events to the log only.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn payment_succeeded(&self, event: &PaymentSucceeded) -> anyhow::Result<()> {
        tracing::info!(
            transaction_id = %event.transaction_id,
            payment_id = %event.payment_id,
            amount = %event.amount,
            "Payment succeeded"
        );
        Ok(())
    }
}

/// Deliver `event` in the background with exponential backoff. Never
/// blocks or fails the caller.
pub fn dispatch(notifier: Arc<dyn Notifier>, event: PaymentSucceeded, retry: RetryConfig) {
    tokio::spawn(async move {
        let result = retry_async(&retry, "notify_payment_succeeded", |_| true, || {
            notifier.payment_succeeded(&event)
        })
        .await;

        if let Err(e) = result {
            tracing::error!(
                error = %e,
                transaction_id = %event.transaction_id,
                "Dropping payment notification after retries"
            );
        }
    });
}
