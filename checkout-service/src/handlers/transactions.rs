use crate::dtos::{
    InitiatePaymentRequest, InitiatePaymentResponse, TransactionSummary, TransactionView,
};
use crate::middleware::UserContext;
use crate::startup::AppState;
use crate::utils::ValidatedJson;
use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

pub async fn list_transactions(
    State(state): State<AppState>,
    user: UserContext,
) -> Result<Json<Vec<TransactionSummary>>, AppError> {
    Ok(Json(state.transactions.list(user.user_id).await?))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    user: UserContext,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<TransactionView>, AppError> {
    Ok(Json(state.transactions.get(user.user_id, transaction_id).await?))
}

/// Start (or restart) payment with the chosen method.
pub async fn initiate_payment(
    State(state): State<AppState>,
    user: UserContext,
    Path(transaction_id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<InitiatePaymentRequest>,
) -> Result<Json<InitiatePaymentResponse>, AppError> {
    tracing::info!(
        transaction_id = %transaction_id,
        user_id = %user.user_id,
        method = %payload.method,
        "Initiating payment"
    );

    let response = state
        .payments
        .initiate(user.user_id, transaction_id, payload.method.trim())
        .await?;
    Ok(Json(response))
}

pub async fn cancel_transaction(
    State(state): State<AppState>,
    user: UserContext,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<TransactionView>, AppError> {
    Ok(Json(
        state.transactions.cancel(user.user_id, transaction_id).await?,
    ))
}
