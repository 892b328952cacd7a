//! Expiration of stale transactions and payments.

use crate::error::{CheckoutError, Result};
use crate::models::{PaymentStatus, TransactionStatus};
use crate::services::metrics::EXPIRED_TOTAL;
use crate::services::store::{Store, UnitOfWork};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// Rows changed by one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct SweepReport {
    pub transactions_expired: usize,
    pub payments_expired: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.transactions_expired == 0 && self.payments_expired == 0
    }
}

#[derive(Clone)]
pub struct ExpirationSweeper {
    store: Arc<dyn Store>,
}

impl ExpirationSweeper {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Expire everything past its deadline at `now` in one unit of work.
    /// Running it again with the same `now` changes nothing.
    #[instrument(skip(self))]
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut uow = self.store.begin().await?;
        let report = sweep_in(uow.as_mut(), now).await?;
        uow.commit().await?;

        if !report.is_empty() {
            EXPIRED_TOTAL
                .with_label_values(&["transaction"])
                .inc_by(report.transactions_expired as f64);
            EXPIRED_TOTAL
                .with_label_values(&["payment"])
                .inc_by(report.payments_expired as f64);
            info!(
                transactions = report.transactions_expired,
                payments = report.payments_expired,
                "Expired stale rows"
            );
        }
        Ok(report)
    }

    /// Sweep before serving a request. Failures are logged, not surfaced;
    /// the background task retries on its next tick.
    pub async fn sweep_lazily(&self) {
        if let Err(e) = self.sweep(Utc::now()).await {
            warn!(error = %e, "Opportunistic expiration sweep failed");
        }
    }

    /// Run [`sweep`](Self::sweep) every `every` until `shutdown` fires.
    pub fn spawn(self, every: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(interval_secs = every.as_secs(), "Expiration sweeper started");

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Expiration sweeper shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep(Utc::now()).await {
                            error!(error = %e, "Expiration sweep failed");
                        }
                    }
                }
            }
        })
    }
}

async fn sweep_in(uow: &mut dyn UnitOfWork, now: DateTime<Utc>) -> Result<SweepReport> {
    let mut report = SweepReport::default();

    for mut transaction in uow.find_expirable_transactions(now).await? {
        if transaction
            .transition(TransactionStatus::Expired, now)
            .is_err()
        {
            continue;
        }
        uow.update_transaction(&transaction).await?;
        report.transactions_expired += 1;

        for mut payment in uow.payments_for_transaction(transaction.id).await? {
            if payment.status == PaymentStatus::Pending
                && payment.finish(PaymentStatus::Expired, now)
            {
                uow.update_payment(&payment).await?;
                report.payments_expired += 1;
            }
        }
    }

    // Payments that lapsed while their transaction is still open, including
    // charges the gateway reported as processing but never settled.
    for mut payment in uow.find_expirable_payments(now).await? {
        if !payment.finish(PaymentStatus::Expired, now) {
            continue;
        }
        uow.update_payment(&payment).await?;
        report.payments_expired += 1;

        if let Some(mut transaction) = uow.get_transaction(payment.transaction_id, true).await? {
            if transaction.status == TransactionStatus::InProgress {
                transaction
                    .transition(TransactionStatus::Pending, now)
                    .map_err(|e| CheckoutError::InvalidState(e.to_string()))?;
            }
            if transaction.status.is_open() {
                transaction.reset_service_fee(now);
                uow.update_transaction(&transaction).await?;
            }
        }
    }

    Ok(report)
}
