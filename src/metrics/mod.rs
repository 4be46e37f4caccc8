//! Prometheus metrics for invoice traffic and provider health.
//!
//! Recording goes through the `metrics` facade and is a no-op until a
//! recorder is installed with [`init_prometheus_metrics`].

use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
#[cfg(feature = "api")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::monitor::AlertSeverity;

pub const INVOICES_TOTAL: &str = "daznode_invoices_total";
pub const INVOICE_AMOUNT_SATS: &str = "daznode_invoice_amount_sats";
pub const INVOICE_DURATION_SECONDS: &str = "daznode_invoice_duration_seconds";

pub const PAYMENT_CHECKS_TOTAL: &str = "daznode_payment_checks_total";

pub const PROVIDER_HEALTH_CHECKS_TOTAL: &str = "daznode_provider_health_checks_total";
pub const PROVIDER_HEALTH_CHECK_DURATION_SECONDS: &str =
    "daznode_provider_health_check_duration_seconds";
pub const PROVIDER_UP: &str = "daznode_provider_up";

pub const PROVIDER_ALERTS_TOTAL: &str = "daznode_provider_alerts_total";

pub const API_REQUESTS_TOTAL: &str = "daznode_api_requests_total";
pub const API_REQUEST_DURATION_SECONDS: &str = "daznode_api_request_duration_seconds";

#[cfg(feature = "api")]
static PROMETHEUS_HANDLE: std::sync::OnceLock<Result<PrometheusHandle, String>> =
    std::sync::OnceLock::new();

/// Install the Prometheus recorder. The install runs at most once; later and
/// concurrent calls return the same handle, or the same failure.
#[cfg(feature = "api")]
pub fn init_prometheus_metrics() -> anyhow::Result<PrometheusHandle> {
    let installed = PROMETHEUS_HANDLE.get_or_init(|| {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| format!("Failed to install Prometheus recorder: {}", e))?;
        describe_metrics();
        tracing::info!("Prometheus metrics collection initialized");
        Ok(handle)
    });

    installed.clone().map_err(|e| anyhow::anyhow!(e))
}

pub fn describe_metrics() {
    describe_counter!(INVOICES_TOTAL, "Total invoice generation attempts");
    describe_histogram!(INVOICE_AMOUNT_SATS, "Requested invoice amounts in sats");
    describe_histogram!(
        INVOICE_DURATION_SECONDS,
        "Invoice generation duration in seconds, retries included"
    );
    describe_counter!(PAYMENT_CHECKS_TOTAL, "Total payment status lookups");
    describe_counter!(PROVIDER_HEALTH_CHECKS_TOTAL, "Total provider health probes");
    describe_histogram!(
        PROVIDER_HEALTH_CHECK_DURATION_SECONDS,
        "Provider health probe duration in seconds"
    );
    describe_gauge!(PROVIDER_UP, "1 if the latest probe of the provider succeeded");
    describe_counter!(PROVIDER_ALERTS_TOTAL, "Total alerts raised per provider");
    describe_counter!(API_REQUESTS_TOTAL, "Total API requests");
    describe_histogram!(API_REQUEST_DURATION_SECONDS, "API request duration in seconds");
}

pub fn record_invoice(provider: &str, amount: u64, duration: Duration, success: bool) {
    let status = if success { "success" } else { "failure" };

    counter!(INVOICES_TOTAL, "provider" => provider.to_string(), "status" => status).increment(1);
    histogram!(INVOICE_DURATION_SECONDS, "provider" => provider.to_string())
        .record(duration.as_secs_f64());
    if success {
        histogram!(INVOICE_AMOUNT_SATS, "provider" => provider.to_string()).record(amount as f64);
    }
}

pub fn record_payment_check(provider: &str, outcome: &'static str) {
    counter!(PAYMENT_CHECKS_TOTAL, "provider" => provider.to_string(), "outcome" => outcome)
        .increment(1);
}

pub fn record_health_check(provider: &str, healthy: bool, duration: Duration) {
    let status = if healthy { "healthy" } else { "unhealthy" };

    counter!(
        PROVIDER_HEALTH_CHECKS_TOTAL,
        "provider" => provider.to_string(),
        "status" => status
    )
    .increment(1);
    histogram!(
        PROVIDER_HEALTH_CHECK_DURATION_SECONDS,
        "provider" => provider.to_string()
    )
    .record(duration.as_secs_f64());
    gauge!(PROVIDER_UP, "provider" => provider.to_string()).set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_alert(provider: &str, severity: AlertSeverity) {
    counter!(
        PROVIDER_ALERTS_TOTAL,
        "provider" => provider.to_string(),
        "severity" => severity.to_string()
    )
    .increment(1);
}

pub fn record_api_request(method: &str, path: &str, status: u16, duration: Duration) {
    counter!(
        API_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!(
        API_REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration.as_secs_f64());
}
