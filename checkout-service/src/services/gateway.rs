//! Payment gateway client.
//!
//! Outbound: creates a hosted charge for a payment and returns the
//! gateway's reference plus the URL the customer is redirected to.
//! Inbound: verifies and parses asynchronous status callbacks.

use crate::config::GatewayConfig;
use crate::error::{CheckoutError, Result};
use crate::models::Currency;
use crate::services::metrics::GATEWAY_REQUEST_DURATION;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use service_core::retry::{retry_async, RetryConfig};
use service_core::utils::signature::verify_payload;
use std::time::Duration;
use uuid::Uuid;

/// Header carrying `hex(HMAC-SHA256(raw_body, callback_secret))`.
pub const CALLBACK_SIGNATURE_HEADER: &str = "x-callback-signature";

/// Charge to create at the gateway.
#[derive(Debug, Clone, Serialize)]
pub struct ChargeRequest {
    /// Our payment id, echoed back by the gateway.
    pub reference_id: Uuid,
    pub transaction_id: Uuid,
    pub channel_code: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub callback_url: String,
    pub expires_at: DateTime<Utc>,
}

/// Gateway's answer to a charge request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChargeResponse {
    /// Gateway reference used by later callbacks.
    pub id: String,
    #[serde(default)]
    pub payment_url: Option<String>,
}

/// Callback status after vocabulary mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackStatus {
    Paid,
    Failed,
    Cancelled,
    /// Customer started paying; not terminal.
    Processing,
}

impl CallbackStatus {
    /// Map the gateway's status words. Unknown words yield `None`.
    pub fn from_gateway(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PAID" | "SETTLED" | "SETTLEMENT" | "SUCCEEDED" | "SUCCESS" | "CAPTURE"
            | "CAPTURED" | "COMPLETED" => Some(CallbackStatus::Paid),
            "FAILED" | "FAILURE" | "DENY" | "DENIED" => Some(CallbackStatus::Failed),
            "CANCELLED" | "CANCELED" | "CANCEL" | "EXPIRED" | "EXPIRE" | "VOIDED" => {
                Some(CallbackStatus::Cancelled)
            }
            "PROCESSING" | "IN_PROGRESS" | "AUTHORIZED" => Some(CallbackStatus::Processing),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackStatus::Paid => "paid",
            CallbackStatus::Failed => "failed",
            CallbackStatus::Cancelled => "cancelled",
            CallbackStatus::Processing => "processing",
        }
    }
}

/// Callback body as posted by the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackPayload {
    pub external_id: String,
    pub status: String,
    #[serde(default)]
    pub amount: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCallback {
    pub external_id: String,
    pub raw_status: String,
    pub status: Option<CallbackStatus>,
    pub amount: Option<Decimal>,
}

/// Outbound and inbound halves of the gateway integration.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_charge(&self, request: &ChargeRequest) -> Result<ChargeResponse>;

    /// Constant-time check of a callback signature over the raw body.
    fn verify_callback(&self, body: &[u8], signature: Option<&str>) -> bool;

    fn parse_callback(&self, body: &[u8]) -> Result<GatewayCallback> {
        let payload: CallbackPayload = serde_json::from_slice(body)
            .map_err(|e| CheckoutError::Validation(format!("Malformed callback: {}", e)))?;
        Ok(GatewayCallback {
            status: CallbackStatus::from_gateway(&payload.status),
            external_id: payload.external_id,
            raw_status: payload.status,
            amount: payload.amount,
        })
    }
}

#[derive(Debug, thiserror::Error)]
enum ChargeError {
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("gateway returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("unreadable response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ChargeError {
    fn is_retryable(&self) -> bool {
        match self {
            ChargeError::Transport(_) => true,
            ChargeError::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            ChargeError::Decode(_) => false,
        }
    }
}

/// HTTP gateway client.
#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: Client,
    config: GatewayConfig,
}

impl HttpPaymentGateway {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CheckoutError::Internal(anyhow::anyhow!("HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    async fn post_charge(&self, request: &ChargeRequest) -> std::result::Result<ChargeResponse, ChargeError> {
        let url = format!("{}/charges", self.config.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .basic_auth(self.config.server_key.expose_secret(), Some(""))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        tracing::debug!(status = %status, body = %body, "Gateway create_charge response");

        if status.is_success() {
            Ok(serde_json::from_str(&body)?)
        } else {
            Err(ChargeError::Status { status, body })
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[tracing::instrument(skip(self, request), fields(payment_id = %request.reference_id, amount = %request.amount))]
    async fn create_charge(&self, request: &ChargeRequest) -> Result<ChargeResponse> {
        let timer = GATEWAY_REQUEST_DURATION
            .with_label_values(&["create_charge"])
            .start_timer();

        let retry = RetryConfig::with_max_retries(self.config.max_retries);
        let result = retry_async(&retry, "gateway_create_charge", ChargeError::is_retryable, || {
            self.post_charge(request)
        })
        .await;

        timer.observe_duration();

        match result {
            Ok(charge) => {
                tracing::info!(external_id = %charge.id, "Gateway charge created");
                Ok(charge)
            }
            Err(e) => {
                tracing::error!(error = %e, "Gateway charge creation failed");
                Err(CheckoutError::UpstreamUnavailable(format!(
                    "payment gateway: {}",
                    e
                )))
            }
        }
    }

    fn verify_callback(&self, body: &[u8], signature: Option<&str>) -> bool {
        let secret = self.config.callback_secret.expose_secret();
        let Some(signature) = signature else {
            tracing::warn!("Callback without signature");
            return false;
        };
        if secret.is_empty() {
            tracing::warn!("Callback secret not configured; rejecting callback");
            return false;
        }

        match verify_payload(secret, body, signature) {
            Ok(true) => true,
            Ok(false) => {
                tracing::warn!("Callback signature verification failed");
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "Callback signature check errored");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;
    use service_core::utils::signature::sign_payload;

    fn gateway(secret: &str) -> HttpPaymentGateway {
        HttpPaymentGateway::new(GatewayConfig {
            base_url: "http://localhost:1".to_string(),
            server_key: Secret::new("sk_test".to_string()),
            callback_secret: Secret::new(secret.to_string()),
            callback_url: "http://localhost/payment/callback".to_string(),
            timeout_secs: 1,
            max_retries: 0,
        })
        .unwrap()
    }

    #[test]
    fn status_vocabulary_is_mapped() {
        assert_eq!(CallbackStatus::from_gateway("settlement"), Some(CallbackStatus::Paid));
        assert_eq!(CallbackStatus::from_gateway("PAID"), Some(CallbackStatus::Paid));
        assert_eq!(CallbackStatus::from_gateway("deny"), Some(CallbackStatus::Failed));
        assert_eq!(CallbackStatus::from_gateway("EXPIRED"), Some(CallbackStatus::Cancelled));
        assert_eq!(
            CallbackStatus::from_gateway("processing"),
            Some(CallbackStatus::Processing)
        );
        assert_eq!(CallbackStatus::from_gateway("REFUND_REQUESTED"), None);
    }

    #[test]
    fn callback_signature_is_checked() {
        let gw = gateway("whsec");
        let body = br#"{"external_id":"chg_1","status":"PAID"}"#;
        let good = sign_payload("whsec", body).unwrap();

        assert!(gw.verify_callback(body, Some(&good)));
        assert!(!gw.verify_callback(body, Some("deadbeef")));
        assert!(!gw.verify_callback(body, None));
        assert!(!gw.verify_callback(br#"{"external_id":"chg_2","status":"PAID"}"#, Some(&good)));
    }

    #[test]
    fn unconfigured_secret_rejects_everything() {
        let gw = gateway("");
        let body = b"{}";
        let sig = sign_payload("", body).unwrap();
        assert!(!gw.verify_callback(body, Some(&sig)));
    }

    #[test]
    fn parse_callback_keeps_unknown_status() {
        let gw = gateway("whsec");
        let parsed = gw
            .parse_callback(br#"{"external_id":"chg_1","status":"REFUNDED","amount":"92000"}"#)
            .unwrap();
        assert_eq!(parsed.external_id, "chg_1");
        assert_eq!(parsed.status, None);
        assert_eq!(parsed.raw_status, "REFUNDED");
    }
}
