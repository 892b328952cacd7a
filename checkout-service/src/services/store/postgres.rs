//! PostgreSQL store.

use super::{Store, UnitOfWork};
use crate::error::{CheckoutError, Result};
use crate::models::{
    Addon, AddonItem, BankDetail, LineItem, Payment, PaymentMethod, PaymentMethodRow,
    Transaction, Voucher, VoucherRow, WhatsappPackage, WhatsappSubscriptionItem,
};
use crate::services::metrics::DB_QUERY_DURATION;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Postgres;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const TRANSACTION_COLUMNS: &str = "id, user_id, amount, discount_amount, service_fee_amount, final_amount, currency, status, transaction_type, voucher_id, expires_at, created_at, updated_at";
const PAYMENT_COLUMNS: &str = "id, transaction_id, method_code, amount, service_fee, status, external_id, payment_url, expires_at, payment_date, created_at, updated_at";
const METHOD_COLUMNS: &str = "id, code, name, currency, fee_type, fee_value, min_fee, max_fee, is_active, bank_detail_id, gateway_code, created_at, updated_at";
const VOUCHER_COLUMNS: &str = "id, code, discount_type, discount_value, max_discount, usage_limit, usage_count, expires_at, min_purchase, created_at, updated_at";

/// Connection pool wrapper.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "checkout-service"))]
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| {
                CheckoutError::UpstreamUnavailable(format!("Failed to connect: {}", e))
            })?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| CheckoutError::Database(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<()> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1").execute(&self.pool).await?;

        timer.observe_duration();
        Ok(())
    }
}

/// A database transaction. Dropping it without commit rolls back.
struct PgUnitOfWork {
    tx: sqlx::Transaction<'static, Postgres>,
}

fn lock_clause(lock: bool) -> &'static str {
    if lock {
        " FOR UPDATE"
    } else {
        ""
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    // =========================================================================
    // Catalog
    // =========================================================================

    async fn insert_package(&mut self, package: &WhatsappPackage) -> Result<()> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_package"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO whatsapp_packages (id, name, monthly_price_idr, monthly_price_usd, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(package.id)
        .bind(&package.name)
        .bind(package.monthly_price_idr)
        .bind(package.monthly_price_usd)
        .bind(package.is_active)
        .bind(package.created_at)
        .execute(&mut *self.tx)
        .await?;

        timer.observe_duration();
        Ok(())
    }

    async fn get_package(&mut self, id: Uuid) -> Result<Option<WhatsappPackage>> {
        let package = sqlx::query_as::<_, WhatsappPackage>(
            r#"
            SELECT id, name, monthly_price_idr, monthly_price_usd, is_active, created_at
            FROM whatsapp_packages
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(package)
    }

    async fn insert_addon(&mut self, addon: &Addon) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO addons (id, name, price_idr, price_usd, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(addon.id)
        .bind(&addon.name)
        .bind(addon.price_idr)
        .bind(addon.price_usd)
        .bind(addon.is_active)
        .bind(addon.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn get_addon(&mut self, id: Uuid) -> Result<Option<Addon>> {
        let addon = sqlx::query_as::<_, Addon>(
            r#"
            SELECT id, name, price_idr, price_usd, is_active, created_at
            FROM addons
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(addon)
    }

    // =========================================================================
    // Payment methods
    // =========================================================================

    async fn insert_bank_detail(&mut self, detail: &BankDetail) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO bank_details (id, bank_name, account_number, account_holder, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(detail.id)
        .bind(&detail.bank_name)
        .bind(&detail.account_number)
        .bind(&detail.account_holder)
        .bind(detail.created_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn get_bank_detail(&mut self, id: Uuid) -> Result<Option<BankDetail>> {
        let detail = sqlx::query_as::<_, BankDetail>(
            r#"
            SELECT id, bank_name, account_number, account_holder, created_at
            FROM bank_details
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(detail)
    }

    async fn insert_payment_method(&mut self, method: &PaymentMethod) -> Result<()> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_payment_method"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO payment_methods (id, code, name, currency, fee_type, fee_value, min_fee, max_fee, is_active, bank_detail_id, gateway_code, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(method.id)
        .bind(&method.code)
        .bind(&method.name)
        .bind(method.currency)
        .bind(method.fee.kind())
        .bind(method.fee.value())
        .bind(method.min_fee)
        .bind(method.max_fee)
        .bind(method.is_active)
        .bind(method.bank_detail_id)
        .bind(&method.gateway_code)
        .bind(method.created_at)
        .bind(method.updated_at)
        .execute(&mut *self.tx)
        .await?;

        timer.observe_duration();
        Ok(())
    }

    async fn update_payment_method(&mut self, method: &PaymentMethod) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE payment_methods
            SET name = $2, fee_type = $3, fee_value = $4, min_fee = $5, max_fee = $6, is_active = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(method.id)
        .bind(&method.name)
        .bind(method.fee.kind())
        .bind(method.fee.value())
        .bind(method.min_fee)
        .bind(method.max_fee)
        .bind(method.is_active)
        .bind(method.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn get_payment_method(&mut self, id: Uuid, lock: bool) -> Result<Option<PaymentMethod>> {
        let sql = format!(
            "SELECT {} FROM payment_methods WHERE id = $1{}",
            METHOD_COLUMNS,
            lock_clause(lock)
        );
        let row = sqlx::query_as::<_, PaymentMethodRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(PaymentMethod::try_from)
            .transpose()
            .map_err(CheckoutError::Database)
    }

    async fn find_payment_method(&mut self, code: &str) -> Result<Option<PaymentMethod>> {
        let sql = format!("SELECT {} FROM payment_methods WHERE code = $1", METHOD_COLUMNS);
        let row = sqlx::query_as::<_, PaymentMethodRow>(&sql)
            .bind(PaymentMethod::normalize_code(code))
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(PaymentMethod::try_from)
            .transpose()
            .map_err(CheckoutError::Database)
    }

    async fn list_payment_methods(&mut self, active_only: bool) -> Result<Vec<PaymentMethod>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_payment_methods"])
            .start_timer();

        let sql = format!(
            "SELECT {} FROM payment_methods WHERE ($1 = FALSE OR is_active) ORDER BY code",
            METHOD_COLUMNS
        );
        let rows = sqlx::query_as::<_, PaymentMethodRow>(&sql)
            .bind(active_only)
            .fetch_all(&mut *self.tx)
            .await?;

        timer.observe_duration();

        rows.into_iter()
            .map(PaymentMethod::try_from)
            .collect::<anyhow::Result<Vec<_>>>()
            .map_err(CheckoutError::Database)
    }

    // =========================================================================
    // Vouchers
    // =========================================================================

    async fn insert_voucher(&mut self, voucher: &Voucher) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO vouchers (id, code, discount_type, discount_value, max_discount, usage_limit, usage_count, expires_at, min_purchase, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(voucher.id)
        .bind(&voucher.code)
        .bind(voucher.discount.kind())
        .bind(voucher.discount.value())
        .bind(voucher.discount.cap())
        .bind(voucher.usage_limit)
        .bind(voucher.usage_count)
        .bind(voucher.expires_at)
        .bind(voucher.min_purchase)
        .bind(voucher.created_at)
        .bind(voucher.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn get_voucher(&mut self, id: Uuid) -> Result<Option<Voucher>> {
        let sql = format!("SELECT {} FROM vouchers WHERE id = $1", VOUCHER_COLUMNS);
        let row = sqlx::query_as::<_, VoucherRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(Voucher::try_from)
            .transpose()
            .map_err(CheckoutError::Database)
    }

    async fn find_voucher_by_code(&mut self, code: &str) -> Result<Option<Voucher>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_voucher_by_code"])
            .start_timer();

        let sql = format!("SELECT {} FROM vouchers WHERE code = $1", VOUCHER_COLUMNS);
        let row = sqlx::query_as::<_, VoucherRow>(&sql)
            .bind(Voucher::normalize_code(code))
            .fetch_optional(&mut *self.tx)
            .await?;

        timer.observe_duration();

        row.map(Voucher::try_from)
            .transpose()
            .map_err(CheckoutError::Database)
    }

    async fn list_vouchers(&mut self) -> Result<Vec<Voucher>> {
        let sql = format!(
            "SELECT {} FROM vouchers ORDER BY created_at DESC",
            VOUCHER_COLUMNS
        );
        let rows = sqlx::query_as::<_, VoucherRow>(&sql)
            .fetch_all(&mut *self.tx)
            .await?;

        rows.into_iter()
            .map(Voucher::try_from)
            .collect::<anyhow::Result<Vec<_>>>()
            .map_err(CheckoutError::Database)
    }

    async fn increment_voucher_usage(&mut self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE vouchers SET usage_count = usage_count + 1, updated_at = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(now)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    #[instrument(skip(self, transaction), fields(transaction_id = %transaction.id))]
    async fn insert_transaction(&mut self, transaction: &Transaction) -> Result<()> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_transaction"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO transactions (id, user_id, amount, discount_amount, service_fee_amount, final_amount, currency, status, transaction_type, voucher_id, expires_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(transaction.id)
        .bind(transaction.user_id)
        .bind(transaction.amount)
        .bind(transaction.discount_amount)
        .bind(transaction.service_fee_amount)
        .bind(transaction.final_amount)
        .bind(transaction.currency)
        .bind(transaction.status)
        .bind(transaction.transaction_type)
        .bind(transaction.voucher_id)
        .bind(transaction.expires_at)
        .bind(transaction.created_at)
        .bind(transaction.updated_at)
        .execute(&mut *self.tx)
        .await?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self, transaction), fields(transaction_id = %transaction.id, status = %transaction.status))]
    async fn update_transaction(&mut self, transaction: &Transaction) -> Result<()> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_transaction"])
            .start_timer();

        sqlx::query(
            r#"
            UPDATE transactions
            SET service_fee_amount = $2, final_amount = $3, status = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(transaction.id)
        .bind(transaction.service_fee_amount)
        .bind(transaction.final_amount)
        .bind(transaction.status)
        .bind(transaction.updated_at)
        .execute(&mut *self.tx)
        .await?;

        timer.observe_duration();
        Ok(())
    }

    async fn get_transaction(&mut self, id: Uuid, lock: bool) -> Result<Option<Transaction>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_transaction"])
            .start_timer();

        let sql = format!(
            "SELECT {} FROM transactions WHERE id = $1{}",
            TRANSACTION_COLUMNS,
            lock_clause(lock)
        );
        let transaction = sqlx::query_as::<_, Transaction>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        timer.observe_duration();
        Ok(transaction)
    }

    async fn list_transactions_for_user(&mut self, user_id: Uuid) -> Result<Vec<Transaction>> {
        let sql = format!(
            "SELECT {} FROM transactions WHERE user_id = $1 ORDER BY created_at DESC",
            TRANSACTION_COLUMNS
        );
        let transactions = sqlx::query_as::<_, Transaction>(&sql)
            .bind(user_id)
            .fetch_all(&mut *self.tx)
            .await?;

        Ok(transactions)
    }

    async fn find_expirable_transactions(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<Vec<Transaction>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_expirable_transactions"])
            .start_timer();

        let sql = format!(
            "SELECT {} FROM transactions WHERE status IN ('created', 'pending') AND expires_at < $1 FOR UPDATE SKIP LOCKED",
            TRANSACTION_COLUMNS
        );
        let transactions = sqlx::query_as::<_, Transaction>(&sql)
            .bind(now)
            .fetch_all(&mut *self.tx)
            .await?;

        timer.observe_duration();
        Ok(transactions)
    }

    // =========================================================================
    // Line items
    // =========================================================================

    async fn insert_line_item(&mut self, item: &LineItem) -> Result<()> {
        match item {
            LineItem::WhatsappSubscription(item) => {
                sqlx::query(
                    r#"
                    INSERT INTO whatsapp_subscription_items (id, transaction_id, package_id, duration_months, unit_price, subtotal, starts_at, ends_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                    "#,
                )
                .bind(item.id)
                .bind(item.transaction_id)
                .bind(item.package_id)
                .bind(item.duration_months)
                .bind(item.unit_price)
                .bind(item.subtotal)
                .bind(item.starts_at)
                .bind(item.ends_at)
                .execute(&mut *self.tx)
                .await?;
            }
            LineItem::Addon(item) => {
                sqlx::query(
                    r#"
                    INSERT INTO addon_items (id, transaction_id, addon_id, quantity, unit_price, subtotal)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    "#,
                )
                .bind(item.id)
                .bind(item.transaction_id)
                .bind(item.addon_id)
                .bind(item.quantity)
                .bind(item.unit_price)
                .bind(item.subtotal)
                .execute(&mut *self.tx)
                .await?;
            }
        }
        Ok(())
    }

    async fn update_line_item(&mut self, item: &LineItem) -> Result<()> {
        // Only subscription periods change after creation.
        if let LineItem::WhatsappSubscription(item) = item {
            sqlx::query(
                "UPDATE whatsapp_subscription_items SET starts_at = $2, ends_at = $3 WHERE id = $1",
            )
            .bind(item.id)
            .bind(item.starts_at)
            .bind(item.ends_at)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    async fn line_items(&mut self, transaction_id: Uuid) -> Result<Vec<LineItem>> {
        let subscriptions = sqlx::query_as::<_, WhatsappSubscriptionItem>(
            r#"
            SELECT id, transaction_id, package_id, duration_months, unit_price, subtotal, starts_at, ends_at
            FROM whatsapp_subscription_items
            WHERE transaction_id = $1
            ORDER BY id
            "#,
        )
        .bind(transaction_id)
        .fetch_all(&mut *self.tx)
        .await?;

        let addons = sqlx::query_as::<_, AddonItem>(
            r#"
            SELECT id, transaction_id, addon_id, quantity, unit_price, subtotal
            FROM addon_items
            WHERE transaction_id = $1
            ORDER BY id
            "#,
        )
        .bind(transaction_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(subscriptions
            .into_iter()
            .map(LineItem::WhatsappSubscription)
            .chain(addons.into_iter().map(LineItem::Addon))
            .collect())
    }

    // =========================================================================
    // Payments
    // =========================================================================

    #[instrument(skip(self, payment), fields(payment_id = %payment.id))]
    async fn insert_payment(&mut self, payment: &Payment) -> Result<()> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_payment"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO payments (id, transaction_id, method_code, amount, service_fee, status, external_id, payment_url, expires_at, payment_date, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(payment.id)
        .bind(payment.transaction_id)
        .bind(&payment.method_code)
        .bind(payment.amount)
        .bind(payment.service_fee)
        .bind(payment.status)
        .bind(&payment.external_id)
        .bind(&payment.payment_url)
        .bind(payment.expires_at)
        .bind(payment.payment_date)
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut *self.tx)
        .await?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self, payment), fields(payment_id = %payment.id, status = %payment.status))]
    async fn update_payment(&mut self, payment: &Payment) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE payments
            SET status = $2, payment_date = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(payment.id)
        .bind(payment.status)
        .bind(payment.payment_date)
        .bind(payment.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn get_payment(&mut self, id: Uuid, lock: bool) -> Result<Option<Payment>> {
        let sql = format!(
            "SELECT {} FROM payments WHERE id = $1{}",
            PAYMENT_COLUMNS,
            lock_clause(lock)
        );
        let payment = sqlx::query_as::<_, Payment>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(payment)
    }

    async fn find_payment_by_external_id(
        &mut self,
        external_id: &str,
    ) -> Result<Option<Payment>> {
        let sql = format!(
            "SELECT {} FROM payments WHERE external_id = $1",
            PAYMENT_COLUMNS
        );
        let payment = sqlx::query_as::<_, Payment>(&sql)
            .bind(external_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(payment)
    }

    async fn payments_for_transaction(&mut self, transaction_id: Uuid) -> Result<Vec<Payment>> {
        let sql = format!(
            "SELECT {} FROM payments WHERE transaction_id = $1 ORDER BY created_at DESC",
            PAYMENT_COLUMNS
        );
        let payments = sqlx::query_as::<_, Payment>(&sql)
            .bind(transaction_id)
            .fetch_all(&mut *self.tx)
            .await?;

        Ok(payments)
    }

    async fn find_expirable_payments(&mut self, now: DateTime<Utc>) -> Result<Vec<Payment>> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_expirable_payments"])
            .start_timer();

        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT p.id, p.transaction_id, p.method_code, p.amount, p.service_fee, p.status, p.external_id, p.payment_url, p.expires_at, p.payment_date, p.created_at, p.updated_at
            FROM payments p
            JOIN transactions t ON t.id = p.transaction_id
            WHERE p.status = 'pending'
              AND p.expires_at < $1
              AND t.status IN ('created', 'pending', 'in_progress')
            FOR UPDATE OF t, p SKIP LOCKED
            "#,
        )
            .bind(now)
            .fetch_all(&mut *self.tx)
            .await?;

        timer.observe_duration();
        Ok(payments)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
