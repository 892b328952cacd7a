//! Back-office catalog, payment method, and voucher management.

use crate::dtos::{
    CreateAddonRequest, CreateBankDetailRequest, CreatePackageRequest,
    CreatePaymentMethodRequest, CreateVoucherRequest,
};
use crate::error::{CheckoutError, Result};
use crate::models::{
    Addon, BankDetail, FeeType, PaymentMethod, Voucher, VoucherDiscount, WhatsappPackage,
};
use crate::services::store::{Store, UnitOfWork};
use crate::services::sweeper::{ExpirationSweeper, SweepReport};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AdminService {
    store: Arc<dyn Store>,
    sweeper: ExpirationSweeper,
}

impl AdminService {
    pub fn new(store: Arc<dyn Store>, sweeper: ExpirationSweeper) -> Self {
        Self { store, sweeper }
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_package(&self, request: CreatePackageRequest) -> Result<WhatsappPackage> {
        ensure_price("monthly_price_idr", Some(request.monthly_price_idr))?;
        ensure_price("monthly_price_usd", request.monthly_price_usd)?;

        let package = WhatsappPackage {
            id: Uuid::new_v4(),
            name: request.name,
            monthly_price_idr: request.monthly_price_idr,
            monthly_price_usd: request.monthly_price_usd,
            is_active: true,
            created_at: Utc::now(),
        };
        let mut uow = self.store.begin().await?;
        uow.insert_package(&package).await?;
        uow.commit().await?;

        info!(package_id = %package.id, "Package created");
        Ok(package)
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_addon(&self, request: CreateAddonRequest) -> Result<Addon> {
        ensure_price("price_idr", Some(request.price_idr))?;
        ensure_price("price_usd", request.price_usd)?;

        let addon = Addon {
            id: Uuid::new_v4(),
            name: request.name,
            price_idr: request.price_idr,
            price_usd: request.price_usd,
            is_active: true,
            created_at: Utc::now(),
        };
        let mut uow = self.store.begin().await?;
        uow.insert_addon(&addon).await?;
        uow.commit().await?;

        info!(addon_id = %addon.id, "Addon created");
        Ok(addon)
    }

    #[instrument(skip(self, request), fields(bank = %request.bank_name))]
    pub async fn create_bank_detail(&self, request: CreateBankDetailRequest) -> Result<BankDetail> {
        let detail = BankDetail {
            id: Uuid::new_v4(),
            bank_name: request.bank_name,
            account_number: request.account_number,
            account_holder: request.account_holder,
            created_at: Utc::now(),
        };
        let mut uow = self.store.begin().await?;
        uow.insert_bank_detail(&detail).await?;
        uow.commit().await?;
        Ok(detail)
    }

    /// Register a payment method. Exactly one of `bank_detail_id` and
    /// `gateway_code` must be set. Only one bank-backed method may be
    /// active; `force` deactivates the current one.
    #[instrument(skip(self, request), fields(code = %request.code))]
    pub async fn create_payment_method(
        &self,
        request: CreatePaymentMethodRequest,
    ) -> Result<PaymentMethod> {
        validate_fee(&request.fee, request.min_fee, request.max_fee)?;
        let gateway_code = request
            .gateway_code
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        if request.bank_detail_id.is_some() == gateway_code.is_some() {
            return Err(CheckoutError::Validation(
                "Exactly one of bank_detail_id and gateway_code is required".into(),
            ));
        }

        let now = Utc::now();
        let method = PaymentMethod {
            id: Uuid::new_v4(),
            code: PaymentMethod::normalize_code(&request.code),
            name: request.name,
            currency: request.currency,
            fee: request.fee,
            min_fee: request.min_fee,
            max_fee: request.max_fee,
            is_active: request.is_active,
            bank_detail_id: request.bank_detail_id,
            gateway_code,
            created_at: now,
            updated_at: now,
        };

        let mut uow = self.store.begin().await?;
        if let Some(bank_id) = method.bank_detail_id {
            if uow.get_bank_detail(bank_id).await?.is_none() {
                return Err(CheckoutError::not_found("Bank detail"));
            }
        }
        if method.is_active && method.is_bank_transfer() {
            claim_bank_slot(uow.as_mut(), method.id, request.force, now).await?;
        }
        uow.insert_payment_method(&method).await?;
        uow.commit().await?;

        info!(method_id = %method.id, code = %method.code, "Payment method created");
        Ok(method)
    }

    #[instrument(skip(self))]
    pub async fn set_payment_method_active(
        &self,
        id: Uuid,
        is_active: bool,
        force: bool,
    ) -> Result<PaymentMethod> {
        let now = Utc::now();
        let mut uow = self.store.begin().await?;
        let mut method = uow
            .get_payment_method(id, true)
            .await?
            .ok_or_else(|| CheckoutError::not_found("Payment method"))?;

        if method.is_active == is_active {
            return Ok(method);
        }
        if is_active && method.is_bank_transfer() {
            claim_bank_slot(uow.as_mut(), method.id, force, now).await?;
        }
        method.is_active = is_active;
        method.updated_at = now;
        uow.update_payment_method(&method).await?;
        uow.commit().await?;

        info!(method_id = %method.id, is_active, "Payment method toggled");
        Ok(method)
    }

    #[instrument(skip(self, request), fields(code = %request.code))]
    pub async fn create_voucher(&self, request: CreateVoucherRequest) -> Result<Voucher> {
        validate_discount(&request.discount)?;
        ensure_price("min_purchase", request.min_purchase)?;

        let now = Utc::now();
        if request.expires_at.is_some_and(|at| at <= now) {
            return Err(CheckoutError::Validation(
                "expires_at must be in the future".into(),
            ));
        }
        let code = Voucher::normalize_code(&request.code);
        if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(CheckoutError::Validation(
                "Voucher code may only contain letters, digits, '-' and '_'".into(),
            ));
        }

        let voucher = Voucher {
            id: Uuid::new_v4(),
            code,
            discount: request.discount,
            usage_limit: request.usage_limit,
            usage_count: 0,
            expires_at: request.expires_at,
            min_purchase: request.min_purchase,
            created_at: now,
            updated_at: now,
        };
        let mut uow = self.store.begin().await?;
        uow.insert_voucher(&voucher).await?;
        uow.commit().await?;

        info!(voucher_id = %voucher.id, code = %voucher.code, "Voucher created");
        Ok(voucher)
    }

    pub async fn list_vouchers(&self) -> Result<Vec<Voucher>> {
        let mut uow = self.store.begin().await?;
        uow.list_vouchers().await
    }

    pub async fn list_payment_methods(&self) -> Result<Vec<PaymentMethod>> {
        let mut uow = self.store.begin().await?;
        uow.list_payment_methods(false).await
    }

    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        self.sweeper.sweep(now).await
    }
}

/// Make room for `method_id` as the single active bank-backed method.
async fn claim_bank_slot(
    uow: &mut dyn UnitOfWork,
    method_id: Uuid,
    force: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    let active: Vec<PaymentMethod> = uow
        .list_payment_methods(true)
        .await?
        .into_iter()
        .filter(|m| m.is_bank_transfer() && m.id != method_id)
        .collect();
    if active.is_empty() {
        return Ok(());
    }
    if !force {
        return Err(CheckoutError::Conflict(format!(
            "Bank transfer method {} is already active",
            active[0].code
        )));
    }
    for mut other in active {
        warn!(method_id = %other.id, code = %other.code, "Deactivating bank transfer method");
        other.is_active = false;
        other.updated_at = now;
        uow.update_payment_method(&other).await?;
    }
    Ok(())
}

fn ensure_price(field: &str, value: Option<Decimal>) -> Result<()> {
    match value {
        Some(v) if v < Decimal::ZERO => Err(CheckoutError::Validation(format!(
            "{field} must not be negative"
        ))),
        _ => Ok(()),
    }
}

fn validate_fee(fee: &FeeType, min_fee: Option<Decimal>, max_fee: Option<Decimal>) -> Result<()> {
    ensure_price("fee", Some(fee.value()))?;
    ensure_price("min_fee", min_fee)?;
    ensure_price("max_fee", max_fee)?;
    if let (Some(min), Some(max)) = (min_fee, max_fee) {
        if min > max {
            return Err(CheckoutError::Validation(
                "min_fee must not exceed max_fee".into(),
            ));
        }
    }
    Ok(())
}

fn validate_discount(discount: &VoucherDiscount) -> Result<()> {
    match *discount {
        VoucherDiscount::Percentage { rate, max_discount } => {
            if rate <= Decimal::ZERO || rate > Decimal::ONE_HUNDRED {
                return Err(CheckoutError::Validation(
                    "Percentage rate must be in (0, 100]".into(),
                ));
            }
            if max_discount.is_some_and(|cap| cap <= Decimal::ZERO) {
                return Err(CheckoutError::Validation(
                    "max_discount must be positive".into(),
                ));
            }
        }
        VoucherDiscount::Fixed { amount } => {
            if amount <= Decimal::ZERO {
                return Err(CheckoutError::Validation(
                    "Fixed discount must be positive".into(),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Currency;
    use crate::services::store::MemoryStore;
    use rust_decimal_macros::dec;

    fn service() -> AdminService {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        AdminService::new(store.clone(), ExpirationSweeper::new(store))
    }

    fn bank_method(code: &str, bank_detail_id: Uuid, force: bool) -> CreatePaymentMethodRequest {
        CreatePaymentMethodRequest {
            code: code.to_string(),
            name: "Manual transfer".to_string(),
            currency: Currency::Idr,
            fee: FeeType::Fixed(dec!(0)),
            min_fee: None,
            max_fee: None,
            bank_detail_id: Some(bank_detail_id),
            gateway_code: None,
            is_active: true,
            force,
        }
    }

    async fn bank(admin: &AdminService) -> Uuid {
        admin
            .create_bank_detail(CreateBankDetailRequest {
                bank_name: "BCA".to_string(),
                account_number: "1234567890".to_string(),
                account_holder: "PT Example".to_string(),
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn single_active_bank_method() {
        let admin = service();
        let bank_id = bank(&admin).await;

        let first = admin
            .create_payment_method(bank_method("bank_a", bank_id, false))
            .await
            .unwrap();
        assert_eq!(first.code, "BANK_A");

        let err = admin
            .create_payment_method(bank_method("bank_b", bank_id, false))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Conflict(_)));

        let second = admin
            .create_payment_method(bank_method("bank_b", bank_id, true))
            .await
            .unwrap();
        let methods = admin.list_payment_methods().await.unwrap();
        let active: Vec<_> = methods.iter().filter(|m| m.is_active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second.id);

        let err = admin
            .set_payment_method_active(first.id, true, false)
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Conflict(_)));
    }

    #[tokio::test]
    async fn method_needs_exactly_one_channel() {
        let admin = service();
        let bank_id = bank(&admin).await;

        let mut both = bank_method("both", bank_id, false);
        both.gateway_code = Some("BCA_VA".to_string());
        assert!(matches!(
            admin.create_payment_method(both).await.unwrap_err(),
            CheckoutError::Validation(_)
        ));

        let mut neither = bank_method("neither", bank_id, false);
        neither.bank_detail_id = None;
        assert!(matches!(
            admin.create_payment_method(neither).await.unwrap_err(),
            CheckoutError::Validation(_)
        ));

        let unknown_bank = bank_method("ghost", Uuid::new_v4(), false);
        assert!(matches!(
            admin.create_payment_method(unknown_bank).await.unwrap_err(),
            CheckoutError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn voucher_codes_are_normalized_and_validated() {
        let admin = service();
        let request = |code: &str, discount: VoucherDiscount| CreateVoucherRequest {
            code: code.to_string(),
            discount,
            usage_limit: Some(10),
            expires_at: None,
            min_purchase: None,
        };

        let voucher = admin
            .create_voucher(request(
                " save10 ",
                VoucherDiscount::Percentage {
                    rate: dec!(10),
                    max_discount: None,
                },
            ))
            .await
            .unwrap();
        assert_eq!(voucher.code, "SAVE10");

        let err = admin
            .create_voucher(request(
                "TOOMUCH",
                VoucherDiscount::Percentage {
                    rate: dec!(101),
                    max_discount: None,
                },
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Validation(_)));

        let err = admin
            .create_voucher(request("Save10", VoucherDiscount::Fixed { amount: dec!(5) }))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Conflict(_)));

        assert_eq!(admin.list_vouchers().await.unwrap().len(), 1);
    }
}
