//! Domain error taxonomy for the checkout engine.

use crate::services::metrics::record_error;
use service_core::error::AppError;
use thiserror::Error;

/// Why a voucher could not be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VoucherRejection {
    #[error("Voucher code does not exist")]
    NotFound,
    #[error("Voucher has expired")]
    Expired,
    #[error("Voucher usage limit has been reached")]
    UsageExceeded,
    #[error("Subtotal is below the voucher's minimum purchase")]
    BelowMinimum,
}

impl VoucherRejection {
    pub fn code(&self) -> &'static str {
        match self {
            VoucherRejection::NotFound => "voucher_not_found",
            VoucherRejection::Expired => "voucher_expired",
            VoucherRejection::UsageExceeded => "voucher_usage_exceeded",
            VoucherRejection::BelowMinimum => "voucher_below_minimum",
        }
    }
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    VoucherRejected(#[from] VoucherRejection),

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Callback signature verification failed")]
    GatewaySignatureInvalid,

    #[error("Database error: {0}")]
    Database(anyhow::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CheckoutError {
    pub fn not_found(what: &str) -> Self {
        CheckoutError::NotFound(format!("{} not found", what))
    }
}

impl From<sqlx::Error> for CheckoutError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                CheckoutError::Conflict(format!(
                    "Duplicate value violates {}",
                    db_err.constraint().unwrap_or("a unique constraint")
                ))
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                CheckoutError::UpstreamUnavailable(format!("database: {}", err))
            }
            other => CheckoutError::Database(anyhow::Error::new(other)),
        }
    }
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        match &err {
            CheckoutError::UpstreamUnavailable(_) => record_error("upstream_unavailable"),
            CheckoutError::Database(_) => record_error("database"),
            CheckoutError::Internal(_) => record_error("internal"),
            _ => {}
        }

        match err {
            CheckoutError::Validation(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            CheckoutError::NotFound(msg) => AppError::NotFound(anyhow::anyhow!(msg)),
            CheckoutError::VoucherRejected(reason) => AppError::Rejected {
                code: reason.code().to_string(),
                message: reason.to_string(),
            },
            CheckoutError::InvalidState(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            CheckoutError::Conflict(msg) => AppError::Conflict(anyhow::anyhow!(msg)),
            CheckoutError::UpstreamUnavailable(msg) => AppError::ServiceUnavailable(msg),
            CheckoutError::GatewaySignatureInvalid => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid callback signature"))
            }
            CheckoutError::Database(err) => AppError::DatabaseError(err),
            CheckoutError::Internal(err) => AppError::InternalError(err),
        }
    }
}

pub type Result<T, E = CheckoutError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[test]
    fn voucher_rejections_become_422_with_reason_code() {
        let app: AppError = CheckoutError::from(VoucherRejection::UsageExceeded).into();
        assert_eq!(app.code(), "voucher_usage_exceeded");
        assert_eq!(
            app.into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn signature_failures_are_unauthorized() {
        let app: AppError = CheckoutError::GatewaySignatureInvalid.into();
        assert_eq!(app.into_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn invalid_state_is_a_bad_request() {
        let app: AppError = CheckoutError::InvalidState("not paid".into()).into();
        assert_eq!(app.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
