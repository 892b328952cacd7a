//! Back-office endpoints. Every handler requires the admin role.

use crate::dtos::{
    CreateAddonRequest, CreateBankDetailRequest, CreatePackageRequest,
    CreatePaymentMethodRequest, CreateVoucherRequest, SetActiveRequest,
};
use crate::middleware::AdminContext;
use crate::models::{Addon, BankDetail, PaymentMethod, Voucher, WhatsappPackage};
use crate::services::SweepReport;
use crate::startup::AppState;
use crate::utils::ValidatedJson;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use service_core::error::AppError;
use uuid::Uuid;

pub async fn create_package(
    State(state): State<AppState>,
    _admin: AdminContext,
    ValidatedJson(payload): ValidatedJson<CreatePackageRequest>,
) -> Result<(StatusCode, Json<WhatsappPackage>), AppError> {
    let package = state.admin.create_package(payload).await?;
    Ok((StatusCode::CREATED, Json(package)))
}

pub async fn create_addon(
    State(state): State<AppState>,
    _admin: AdminContext,
    ValidatedJson(payload): ValidatedJson<CreateAddonRequest>,
) -> Result<(StatusCode, Json<Addon>), AppError> {
    let addon = state.admin.create_addon(payload).await?;
    Ok((StatusCode::CREATED, Json(addon)))
}

pub async fn create_bank_detail(
    State(state): State<AppState>,
    _admin: AdminContext,
    ValidatedJson(payload): ValidatedJson<CreateBankDetailRequest>,
) -> Result<(StatusCode, Json<BankDetail>), AppError> {
    let detail = state.admin.create_bank_detail(payload).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn create_payment_method(
    State(state): State<AppState>,
    AdminContext(admin): AdminContext,
    ValidatedJson(payload): ValidatedJson<CreatePaymentMethodRequest>,
) -> Result<(StatusCode, Json<PaymentMethod>), AppError> {
    tracing::info!(admin_id = %admin.user_id, code = %payload.code, "Creating payment method");
    let method = state.admin.create_payment_method(payload).await?;
    Ok((StatusCode::CREATED, Json(method)))
}

pub async fn list_payment_methods(
    State(state): State<AppState>,
    _admin: AdminContext,
) -> Result<Json<Vec<PaymentMethod>>, AppError> {
    Ok(Json(state.admin.list_payment_methods().await?))
}

pub async fn set_payment_method_active(
    State(state): State<AppState>,
    AdminContext(admin): AdminContext,
    Path(method_id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<SetActiveRequest>,
) -> Result<Json<PaymentMethod>, AppError> {
    tracing::info!(
        admin_id = %admin.user_id,
        method_id = %method_id,
        is_active = payload.is_active,
        force = payload.force,
        "Toggling payment method"
    );
    let method = state
        .admin
        .set_payment_method_active(method_id, payload.is_active, payload.force)
        .await?;
    Ok(Json(method))
}

pub async fn create_voucher(
    State(state): State<AppState>,
    _admin: AdminContext,
    ValidatedJson(payload): ValidatedJson<CreateVoucherRequest>,
) -> Result<(StatusCode, Json<Voucher>), AppError> {
    let voucher = state.admin.create_voucher(payload).await?;
    Ok((StatusCode::CREATED, Json(voucher)))
}

pub async fn list_vouchers(
    State(state): State<AppState>,
    _admin: AdminContext,
) -> Result<Json<Vec<Voucher>>, AppError> {
    Ok(Json(state.admin.list_vouchers().await?))
}

/// Run an expiration sweep immediately.
pub async fn sweep_expirations(
    State(state): State<AppState>,
    _admin: AdminContext,
) -> Result<Json<SweepReport>, AppError> {
    Ok(Json(state.admin.sweep(Utc::now()).await?))
}
