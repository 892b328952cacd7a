use crate::dtos::{CallbackAck, PaymentMethodView, PaymentMethodsQuery};
use crate::services::gateway::CALLBACK_SIGNATURE_HEADER;
use crate::startup::AppState;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use service_core::error::AppError;

/// Gateway notification endpoint. Authenticated by body signature rather
/// than caller headers.
pub async fn payment_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CallbackAck>, AppError> {
    let signature = headers
        .get(CALLBACK_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let ack = state.payments.handle_callback(&body, signature).await?;
    Ok(Json(ack))
}

pub async fn list_payment_methods(
    State(state): State<AppState>,
    Query(query): Query<PaymentMethodsQuery>,
) -> Result<Json<Vec<PaymentMethodView>>, AppError> {
    Ok(Json(state.transactions.payment_methods(query.currency).await?))
}
