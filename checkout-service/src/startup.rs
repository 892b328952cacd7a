//! Application startup and lifecycle management.

use crate::config::CheckoutConfig;
use crate::handlers;
use crate::services::{
    init_metrics, AdminService, CheckoutOrchestrator, ExpirationSweeper, HttpPaymentGateway,
    LogNotifier, MemoryStore, Notifier, PaymentGateway, PaymentService, PgStore,
    ReceiptProjector, Store, TransactionService, WebhookNotifier,
};
use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::{request_id_middleware, REQUEST_ID_HEADER};
use service_core::retry::RetryConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: CheckoutConfig,
    pub store: Arc<dyn Store>,
    pub checkout: CheckoutOrchestrator,
    pub payments: PaymentService,
    pub transactions: TransactionService,
    pub receipts: ReceiptProjector,
    pub admin: AdminService,
    pub sweeper: ExpirationSweeper,
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    ///
    /// Uses PostgreSQL (and runs migrations) when `database.url` is set,
    /// otherwise an in-memory store.
    pub async fn build(config: CheckoutConfig) -> Result<Self, AppError> {
        init_metrics();

        let store: Arc<dyn Store> = match &config.database.url {
            Some(url) => {
                let store = PgStore::connect(
                    url.expose_secret(),
                    config.database.max_connections,
                    config.database.min_connections,
                )
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "Failed to connect to PostgreSQL");
                    AppError::from(e)
                })?;
                store.run_migrations().await.map_err(|e| {
                    tracing::error!(error = %e, "Failed to run migrations");
                    AppError::from(e)
                })?;
                Arc::new(store)
            }
            None => {
                tracing::warn!("No database URL configured - using in-memory store");
                Arc::new(MemoryStore::new())
            }
        };

        let gateway: Arc<dyn PaymentGateway> =
            Arc::new(HttpPaymentGateway::new(config.gateway.clone()).map_err(AppError::from)?);

        let notifier: Arc<dyn Notifier> = match &config.notifications.webhook_url {
            Some(url) => Arc::new(WebhookNotifier::new(url.clone())?),
            None => Arc::new(LogNotifier),
        };

        Self::build_with(config, store, gateway, notifier).await
    }

    /// Build around explicit collaborators.
    pub async fn build_with(
        config: CheckoutConfig,
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, AppError> {
        init_metrics();

        let rules = config.checkout.clone();
        let sweeper = ExpirationSweeper::new(store.clone());

        let state = AppState {
            checkout: CheckoutOrchestrator::new(store.clone(), sweeper.clone(), rules.clone()),
            payments: PaymentService::new(
                store.clone(),
                gateway,
                notifier,
                sweeper.clone(),
                rules,
                config.gateway.callback_url.clone(),
                RetryConfig::with_max_retries(config.notifications.max_retries),
            ),
            transactions: TransactionService::new(store.clone(), sweeper.clone()),
            receipts: ReceiptProjector::new(store.clone()),
            admin: AdminService::new(store.clone(), sweeper.clone()),
            sweeper,
            store,
            config: config.clone(),
        };

        let addr = format!("{}:{}", config.server.host, config.server.port);
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Checkout service listener bound");

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let shutdown = CancellationToken::new();
        let sweep_every = self.state.config.checkout.sweep_interval_secs;
        let sweeper_task = (sweep_every > 0).then(|| {
            self.state
                .sweeper
                .clone()
                .spawn(Duration::from_secs(sweep_every), shutdown.clone())
        });

        let router = router(self.state);

        tracing::info!(
            service = "checkout-service",
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );

        let result = axum::serve(self.listener, router).await;

        shutdown.cancel();
        if let Some(task) = sweeper_task {
            task.await.ok();
        }

        result.map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}

fn router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/packages", post(handlers::admin::create_package))
        .route("/addons", post(handlers::admin::create_addon))
        .route("/bank-details", post(handlers::admin::create_bank_detail))
        .route(
            "/payment-methods",
            post(handlers::admin::create_payment_method).get(handlers::admin::list_payment_methods),
        )
        .route(
            "/payment-methods/:id/active",
            patch(handlers::admin::set_payment_method_active),
        )
        .route(
            "/vouchers",
            post(handlers::admin::create_voucher).get(handlers::admin::list_vouchers),
        )
        .route(
            "/expirations/sweep",
            post(handlers::admin::sweep_expirations),
        );

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/checkout", post(handlers::checkout::checkout))
        .route(
            "/transactions",
            get(handlers::transactions::list_transactions),
        )
        .route(
            "/transactions/:id",
            get(handlers::transactions::get_transaction),
        )
        .route(
            "/transactions/:id/payment",
            post(handlers::transactions::initiate_payment),
        )
        .route(
            "/transactions/:id/cancel",
            post(handlers::transactions::cancel_transaction),
        )
        .route(
            "/payment/callback",
            post(handlers::payments::payment_callback),
        )
        .route(
            "/payment/:id/receipt",
            get(handlers::receipts::get_receipt),
        )
        .route(
            "/payment-methods",
            get(handlers::payments::list_payment_methods),
        )
        .nest("/admin", admin)
        .route_layer(middleware::from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    user_id = tracing::field::Empty,
                )
            }),
        )
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}
