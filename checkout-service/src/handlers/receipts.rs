use crate::dtos::ReceiptView;
use crate::middleware::UserContext;
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

pub async fn get_receipt(
    State(state): State<AppState>,
    user: UserContext,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<ReceiptView>, AppError> {
    Ok(Json(state.receipts.receipt(user.user_id, payment_id).await?))
}
