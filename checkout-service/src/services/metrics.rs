//! Prometheus metrics for checkout-service.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

/// Recorder for the `metrics` facade used by the HTTP middleware.
static METRICS_HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Checkouts by outcome.
pub static CHECKOUTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "checkout_checkouts_total",
        "Total number of checkout attempts",
        &["status"] // created, rejected, error
    )
    .expect("Failed to register checkouts_total")
});

/// Voucher applications by outcome.
pub static VOUCHER_APPLICATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "checkout_voucher_applications_total",
        "Total number of voucher applications",
        &["outcome"]
    )
    .expect("Failed to register voucher_applications_total")
});

/// Payments initiated by channel.
pub static PAYMENTS_INITIATED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "checkout_payments_initiated_total",
        "Total number of payments initiated",
        &["channel", "currency"]
    )
    .expect("Failed to register payments_initiated_total")
});

/// Gateway callbacks by resulting action.
pub static CALLBACKS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "checkout_gateway_callbacks_total",
        "Total number of gateway callbacks",
        &["result"] // paid, failed, cancelled, processing, ignored, rejected
    )
    .expect("Failed to register gateway_callbacks_total")
});

/// Rows expired by the sweeper.
pub static EXPIRED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "checkout_expired_total",
        "Total number of rows expired by the sweeper",
        &["kind"] // transaction, payment
    )
    .expect("Failed to register expired_total")
});

/// Outbound gateway call duration.
pub static GATEWAY_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "checkout_gateway_request_duration_seconds",
        "Payment gateway request duration in seconds",
        &["operation"],
        vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register gateway_request_duration")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "checkout_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "checkout_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Initialize all metrics (forces lazy initialization) and install the
/// HTTP metrics recorder once per process.
pub fn init_metrics() {
    Lazy::force(&CHECKOUTS_TOTAL);
    Lazy::force(&VOUCHER_APPLICATIONS_TOTAL);
    Lazy::force(&PAYMENTS_INITIATED_TOTAL);
    Lazy::force(&CALLBACKS_TOTAL);
    Lazy::force(&EXPIRED_TOTAL);
    Lazy::force(&GATEWAY_REQUEST_DURATION);
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&ERRORS_TOTAL);

    METRICS_HANDLE.get_or_init(|| match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Prometheus recorder not installed");
            None
        }
    });
}

/// Count a server-side failure by kind.
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .and_then(|handle| handle.as_ref())
        .map(|handle| handle.render())
        .unwrap_or_default();

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    output.push_str(&encoder.encode_to_string(&metric_families).unwrap_or_default());
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_metrics_are_rendered() {
        init_metrics();
        CHECKOUTS_TOTAL.with_label_values(&["created"]).inc();
        let rendered = get_metrics();
        assert!(rendered.contains("checkout_checkouts_total"));
    }
}
