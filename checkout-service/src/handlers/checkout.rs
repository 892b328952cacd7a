use crate::dtos::{CheckoutRequest, CheckoutResponse};
use crate::middleware::UserContext;
use crate::startup::AppState;
use crate::utils::ValidatedJson;
use axum::{extract::State, http::StatusCode, Json};
use service_core::error::AppError;

/// Create a transaction from a cart.
pub async fn checkout(
    State(state): State<AppState>,
    user: UserContext,
    ValidatedJson(payload): ValidatedJson<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), AppError> {
    tracing::info!(
        user_id = %user.user_id,
        items = payload.items.len(),
        currency = %payload.currency,
        "Checkout requested"
    );

    let response = state.checkout.checkout(user.user_id, payload).await?;
    Ok((StatusCode::CREATED, Json(response)))
}
