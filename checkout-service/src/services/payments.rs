//! Payment initiation and settlement.

use crate::config::CheckoutRules;
use crate::dtos::{BankInstructions, CallbackAck, InitiatePaymentResponse, PaymentView};
use crate::error::{CheckoutError, Result};
use crate::models::{
    BankDetail, LineItem, Payment, PaymentChannel, PaymentStatus, Transaction,
    TransactionStatus,
};
use crate::services::fees;
use crate::services::gateway::{CallbackStatus, ChargeRequest, GatewayCallback, PaymentGateway};
use crate::services::metrics::{CALLBACKS_TOTAL, PAYMENTS_INITIATED_TOTAL};
use crate::services::notifier::{self, Notifier, PaymentSucceeded};
use crate::services::store::{Store, UnitOfWork};
use crate::services::sweeper::ExpirationSweeper;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use service_core::retry::RetryConfig;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    sweeper: ExpirationSweeper,
    rules: CheckoutRules,
    callback_url: String,
    notify_retry: RetryConfig,
}

/// Everything needed to start a charge, read before the gateway call.
struct PaymentPlan {
    transaction: Transaction,
    method_code: String,
    gateway_code: Option<String>,
    bank: Option<BankDetail>,
    service_fee: Decimal,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        sweeper: ExpirationSweeper,
        rules: CheckoutRules,
        callback_url: String,
        notify_retry: RetryConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            sweeper,
            rules,
            callback_url,
            notify_retry,
        }
    }

    /// Create the transaction's active payment, superseding any pending one.
    ///
    /// The gateway is called outside the unit of work; the transaction is
    /// re-locked and re-checked before the new payment is written.
    #[instrument(skip(self))]
    pub async fn initiate(
        &self,
        user_id: Uuid,
        transaction_id: Uuid,
        method_code: &str,
    ) -> Result<InitiatePaymentResponse> {
        self.sweeper.sweep_lazily().await;
        let now = Utc::now();

        let plan = self.plan(user_id, transaction_id, method_code).await?;
        let payment_id = Uuid::new_v4();
        let amount = plan.transaction.net_amount() + plan.service_fee;
        let expires_at = now + self.rules.payment_window();

        let (external_id, payment_url) = match &plan.gateway_code {
            Some(channel_code) => {
                let charge = self
                    .gateway
                    .create_charge(&ChargeRequest {
                        reference_id: payment_id,
                        transaction_id,
                        channel_code: channel_code.clone(),
                        amount,
                        currency: plan.transaction.currency,
                        callback_url: self.callback_url.clone(),
                        expires_at,
                    })
                    .await?;
                (charge.id, charge.payment_url)
            }
            // Bank transfers are confirmed by a signed callback carrying the
            // payment id.
            None => (payment_id.to_string(), None),
        };

        let payment = Payment {
            id: payment_id,
            transaction_id,
            method_code: plan.method_code.clone(),
            amount,
            service_fee: plan.service_fee,
            status: PaymentStatus::Pending,
            external_id: Some(external_id),
            payment_url: payment_url.clone(),
            expires_at,
            payment_date: None,
            created_at: now,
            updated_at: now,
        };

        let mut uow = self.store.begin().await?;
        let mut transaction = load_owned(uow.as_mut(), user_id, transaction_id, true).await?;
        ensure_open(&transaction)?;

        for mut previous in uow.payments_for_transaction(transaction_id).await? {
            if previous.finish(PaymentStatus::Cancelled, now) {
                uow.update_payment(&previous).await?;
                // The gateway charge stays live; a late payment on it needs
                // manual reconciliation.
                warn!(
                    payment_id = %previous.id,
                    external_id = previous.external_id.as_deref().unwrap_or("-"),
                    superseded_by = %payment.id,
                    "Superseded pending payment; gateway charge not voided"
                );
            }
        }

        uow.insert_payment(&payment).await?;
        transaction.apply_service_fee(plan.service_fee, now);
        if transaction.status == TransactionStatus::Created {
            transaction
                .transition(TransactionStatus::Pending, now)
                .map_err(|e| CheckoutError::InvalidState(e.to_string()))?;
        }
        uow.update_transaction(&transaction).await?;
        uow.commit().await?;

        let channel = if plan.bank.is_some() {
            "bank_transfer"
        } else {
            "gateway"
        };
        PAYMENTS_INITIATED_TOTAL
            .with_label_values(&[channel, transaction.currency.as_str()])
            .inc();
        info!(
            payment_id = %payment.id,
            transaction_id = %transaction.id,
            method = %payment.method_code,
            amount = %payment.amount,
            "Payment initiated"
        );

        let bank_instructions = plan
            .bank
            .map(|detail| BankInstructions::new(detail, &payment, transaction.currency));

        Ok(InitiatePaymentResponse {
            transaction_id,
            transaction_status: transaction.status,
            final_amount: transaction.final_amount,
            payment: PaymentView::from(payment),
            redirect_url: payment_url,
            bank_instructions,
        })
    }

    async fn plan(
        &self,
        user_id: Uuid,
        transaction_id: Uuid,
        method_code: &str,
    ) -> Result<PaymentPlan> {
        let mut uow = self.store.begin().await?;
        let transaction = load_owned(uow.as_mut(), user_id, transaction_id, false).await?;
        ensure_open(&transaction)?;

        let method = uow
            .find_payment_method(method_code)
            .await?
            .filter(|m| m.is_active)
            .ok_or_else(|| CheckoutError::not_found("Payment method"))?;
        if method.currency != transaction.currency {
            return Err(CheckoutError::Validation(format!(
                "Payment method {} settles in {}, transaction is in {}",
                method.code, method.currency, transaction.currency
            )));
        }

        let service_fee =
            fees::fee_for_method(&method, transaction.net_amount(), transaction.currency);

        let (gateway_code, bank) = match method.channel() {
            Some(PaymentChannel::Gateway(code)) => (Some(code.to_string()), None),
            Some(PaymentChannel::BankTransfer(bank_id)) => {
                let detail = uow.get_bank_detail(bank_id).await?.ok_or_else(|| {
                    CheckoutError::Internal(anyhow::anyhow!(
                        "Bank detail {} of method {} is missing",
                        bank_id,
                        method.code
                    ))
                })?;
                (None, Some(detail))
            }
            None => {
                return Err(CheckoutError::Internal(anyhow::anyhow!(
                    "Payment method {} has no channel",
                    method.code
                )))
            }
        };

        Ok(PaymentPlan {
            transaction,
            method_code: method.code,
            gateway_code,
            bank,
            service_fee,
        })
    }

    /// Apply a gateway callback. Unknown, duplicate, and mismatched
    /// callbacks are acknowledged without changes.
    #[instrument(skip(self, body, signature))]
    pub async fn handle_callback(&self, body: &[u8], signature: Option<&str>) -> Result<CallbackAck> {
        if !self.gateway.verify_callback(body, signature) {
            CALLBACKS_TOTAL.with_label_values(&["rejected"]).inc();
            return Err(CheckoutError::GatewaySignatureInvalid);
        }
        let callback = match self.gateway.parse_callback(body) {
            Ok(callback) => callback,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed gateway callback");
                CALLBACKS_TOTAL.with_label_values(&["ignored"]).inc();
                return Ok(CallbackAck {
                    received: true,
                    result: "ignored",
                });
            }
        };

        self.sweeper.sweep_lazily().await;
        let result = self.settle(&callback, Utc::now()).await?;
        CALLBACKS_TOTAL.with_label_values(&[result]).inc();
        info!(
            external_id = %callback.external_id,
            status = %callback.raw_status,
            result = result,
            "Gateway callback processed"
        );

        Ok(CallbackAck {
            received: true,
            result,
        })
    }

    async fn settle(&self, callback: &GatewayCallback, now: DateTime<Utc>) -> Result<&'static str> {
        let Some(status) = callback.status else {
            warn!(status = %callback.raw_status, "Unmapped gateway status");
            return Ok("ignored");
        };

        let mut uow = self.store.begin().await?;
        let Some(found) = uow.find_payment_by_external_id(&callback.external_id).await? else {
            warn!(external_id = %callback.external_id, "Callback for unknown payment");
            return Ok("ignored");
        };
        if found.status.is_terminal() {
            return Ok("ignored");
        }

        // Lock order is transaction, then payment, as on every other write path.
        let mut transaction = uow
            .get_transaction(found.transaction_id, true)
            .await?
            .ok_or_else(|| {
                CheckoutError::Database(anyhow::anyhow!(
                    "Payment {} references missing transaction",
                    found.id
                ))
            })?;
        let Some(mut payment) = uow
            .get_payment(found.id, true)
            .await?
            .filter(|p| !p.status.is_terminal())
        else {
            return Ok("ignored");
        };

        if payment.is_past_deadline(now) || transaction.is_past_deadline(now) {
            warn!(
                payment_id = %payment.id,
                transaction_id = %transaction.id,
                status = status.as_str(),
                "Callback after deadline"
            );
            return Ok("ignored");
        }
        if let Some(amount) = callback.amount {
            if amount != payment.amount {
                warn!(
                    payment_id = %payment.id,
                    expected = %payment.amount,
                    received = %amount,
                    "Callback amount mismatch"
                );
                return Ok("ignored");
            }
        }

        let outcome = match status {
            CallbackStatus::Paid => {
                if !transaction.status.can_transition_to(TransactionStatus::Success) {
                    warn!(transaction_id = %transaction.id, status = %transaction.status, "Paid callback for closed transaction");
                    return Ok("ignored");
                }
                payment.finish(PaymentStatus::Paid, now);
                transaction
                    .transition(TransactionStatus::Success, now)
                    .map_err(|e| CheckoutError::InvalidState(e.to_string()))?;

                for mut item in uow.line_items(transaction.id).await? {
                    if let LineItem::WhatsappSubscription(ref mut subscription) = item {
                        subscription.activate(now);
                        uow.update_line_item(&item).await?;
                    }
                }
                if let Some(voucher_id) = transaction.voucher_id {
                    uow.increment_voucher_usage(voucher_id, now).await?;
                }
                "paid"
            }
            CallbackStatus::Failed | CallbackStatus::Cancelled => {
                let (next, label) = if status == CallbackStatus::Failed {
                    (PaymentStatus::Failed, "failed")
                } else {
                    (PaymentStatus::Cancelled, "cancelled")
                };
                payment.finish(next, now);
                if transaction.status == TransactionStatus::InProgress {
                    transaction
                        .transition(TransactionStatus::Pending, now)
                        .map_err(|e| CheckoutError::InvalidState(e.to_string()))?;
                }
                if transaction.status.is_open() {
                    transaction.reset_service_fee(now);
                }
                label
            }
            CallbackStatus::Processing => {
                if transaction.status != TransactionStatus::Pending {
                    return Ok("ignored");
                }
                transaction
                    .transition(TransactionStatus::InProgress, now)
                    .map_err(|e| CheckoutError::InvalidState(e.to_string()))?;
                "processing"
            }
        };

        uow.update_payment(&payment).await?;
        uow.update_transaction(&transaction).await?;
        uow.commit().await?;

        if outcome == "paid" {
            notifier::dispatch(
                self.notifier.clone(),
                PaymentSucceeded {
                    event: PaymentSucceeded::EVENT,
                    user_id: transaction.user_id,
                    transaction_id: transaction.id,
                    payment_id: payment.id,
                    amount: payment.amount,
                    currency: transaction.currency,
                    paid_at: now,
                },
                self.notify_retry.clone(),
            );
        }

        Ok(outcome)
    }
}

/// Load a transaction the caller owns; anything else is "not found".
pub(crate) async fn load_owned(
    uow: &mut dyn UnitOfWork,
    user_id: Uuid,
    transaction_id: Uuid,
    lock: bool,
) -> Result<Transaction> {
    uow.get_transaction(transaction_id, lock)
        .await?
        .filter(|t| t.user_id == user_id)
        .ok_or_else(|| CheckoutError::not_found("Transaction"))
}

fn ensure_open(transaction: &Transaction) -> Result<()> {
    if !transaction.status.is_open() {
        return Err(CheckoutError::InvalidState(format!(
            "Transaction is {}",
            transaction.status
        )));
    }
    Ok(())
}
