use chrono::Duration;
use secrecy::Secret;
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutConfig {
    pub server: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    /// OTLP collector; tracing export is off when unset.
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    pub checkout: CheckoutRules,
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL URL. Without one the service keeps state in memory.
    pub url: Option<Secret<String>>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub base_url: String,
    pub server_key: Secret<String>,
    /// Shared secret for `X-Callback-Signature`.
    pub callback_secret: Secret<String>,
    /// Public URL the gateway posts callbacks to.
    pub callback_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRules {
    pub checkout_window_days: i64,
    pub payment_window_minutes: i64,
    /// Background sweep period; 0 disables the task.
    pub sweep_interval_secs: u64,
}

impl CheckoutRules {
    pub fn checkout_window(&self) -> Duration {
        Duration::days(self.checkout_window_days)
    }

    pub fn payment_window(&self) -> Duration {
        Duration::minutes(self.payment_window_minutes)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// Receives payment-success events; logged only when unset.
    pub webhook_url: Option<String>,
    pub max_retries: u32,
}

impl CheckoutConfig {
    /// Defaults, then `configuration.*`, then `CHECKOUT__*` environment.
    pub fn load() -> Result<Self, AppError> {
        let config = core_config::builder("CHECKOUT")
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("service_name", "checkout-service")?
            .set_default("log_level", "info")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 1)?
            .set_default("gateway.base_url", "http://localhost:9090")?
            .set_default("gateway.server_key", "")?
            .set_default("gateway.callback_secret", "")?
            .set_default(
                "gateway.callback_url",
                "http://localhost:8080/payment/callback",
            )?
            .set_default("gateway.timeout_secs", 10)?
            .set_default("gateway.max_retries", 2)?
            .set_default("checkout.checkout_window_days", 7)?
            .set_default("checkout.payment_window_minutes", 24 * 60)?
            .set_default("checkout.sweep_interval_secs", 60)?
            .set_default("notifications.max_retries", 3)?
            .build()?;

        let config: CheckoutConfig = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.checkout.checkout_window_days <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "checkout.checkout_window_days must be positive"
            )));
        }
        if self.checkout.payment_window_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "checkout.payment_window_minutes must be positive"
            )));
        }
        Ok(())
    }
}
