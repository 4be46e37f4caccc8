//! Provider health monitoring.
//!
//! [`LightningMonitor`] probes every registered provider on a fixed interval,
//! keeps a bounded rolling history of probe results and invoice outcomes per
//! provider, recommends the best provider and raises alerts when recent
//! invoice traffic degrades.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

pub mod alerts;
pub mod history;


pub use alerts::{
    Alert, AlertNotifier, AlertSeverity, AlertWebhookConfig, LogNotifier, WebhookAlertNotifier,
};
pub use history::BoundedHistory;

use crate::lightning::HealthCheckable;
use crate::metrics;

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(30);
pub const STATUS_HISTORY_CAPACITY: usize = 100;
pub const METRICS_HISTORY_CAPACITY: usize = 1000;
pub const ALERT_HISTORY_CAPACITY: usize = 50;

/// Number of most recent invoice attempts evaluated for alerts
pub const ALERT_WINDOW: usize = 5;
/// Failures within the window that raise a critical alert
pub const CRITICAL_FAILURE_THRESHOLD: usize = 4;
/// Average invoice duration within the window that raises a warning
pub const SLOW_INVOICE_THRESHOLD_MS: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub check_interval: Duration,
    pub status_history_capacity: usize,
    pub metrics_history_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
            status_history_capacity: STATUS_HISTORY_CAPACITY,
            metrics_history_capacity: METRICS_HISTORY_CAPACITY,
        }
    }
}

/// Result of one health probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    pub name: String,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub last_check: DateTime<Utc>,
    /// Percentage of healthy probes in the current window, filled in on read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime: Option<f64>,
}

impl ProviderStatus {
    pub fn healthy(name: impl Into<String>, response_time: Duration) -> Self {
        Self {
            name: name.into(),
            healthy: true,
            response_time_ms: Some(response_time.as_millis() as u64),
            last_error: None,
            last_check: Utc::now(),
            uptime: None,
        }
    }

    pub fn unhealthy(
        name: impl Into<String>,
        error: impl Into<String>,
        response_time: Option<Duration>,
    ) -> Self {
        Self {
            name: name.into(),
            healthy: false,
            response_time_ms: response_time.map(|d| d.as_millis() as u64),
            last_error: Some(error.into()),
            last_check: Utc::now(),
            uptime: None,
        }
    }
}

/// Outcome of one invoice attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceMetric {
    pub invoice_id: String,
    pub provider: String,
    pub amount: u64,
    pub duration_ms: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderMetrics {
    pub provider: String,
    pub total_invoices: usize,
    pub successful_invoices: usize,
    pub failed_invoices: usize,
    pub success_rate: f64,
    pub average_response_time_ms: f64,
    pub uptime: f64,
    pub last_error: Option<String>,
    pub last_invoice_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallStats {
    pub total_invoices: usize,
    pub successful_invoices: usize,
    pub failed_invoices: usize,
    pub success_rate: f64,
    pub average_response_time_ms: f64,
    pub provider_count: usize,
    pub healthy_provider_count: usize,
}

struct ProviderRecord {
    name: String,
    /// False for names first seen through `record_status` or
    /// `log_invoice_metrics`. Those are never health checked or recommended.
    registered: bool,
    statuses: BoundedHistory<ProviderStatus>,
    invoices: BoundedHistory<InvoiceMetric>,
}

impl ProviderRecord {
    fn new(name: String, registered: bool, config: &MonitorConfig) -> Self {
        Self {
            name,
            registered,
            statuses: BoundedHistory::new(config.status_history_capacity),
            invoices: BoundedHistory::new(config.metrics_history_capacity),
        }
    }

    /// Recomputed from the current window every time
    fn uptime(&self) -> Option<f64> {
        if self.statuses.is_empty() {
            return None;
        }
        let healthy = self.statuses.iter().filter(|s| s.healthy).count();
        Some(healthy as f64 / self.statuses.len() as f64 * 100.0)
    }

    fn latest_status(&self) -> Option<ProviderStatus> {
        self.statuses.latest().map(|status| ProviderStatus {
            uptime: self.uptime(),
            ..status.clone()
        })
    }

    fn is_healthy(&self) -> bool {
        self.statuses.latest().map_or(false, |s| s.healthy)
    }

    fn is_candidate(&self) -> bool {
        self.registered && self.is_healthy()
    }
}

/// Owns the registered providers' rolling state and the periodic probe loop
pub struct LightningMonitor {
    providers: Vec<Arc<dyn HealthCheckable>>,
    config: MonitorConfig,
    records: RwLock<Vec<ProviderRecord>>,
    alerts: RwLock<BoundedHistory<Alert>>,
    notifier: Arc<dyn AlertNotifier>,
    shutdown_tx: Mutex<Option<broadcast::Sender<()>>>,
}

impl LightningMonitor {
    pub fn new(
        providers: Vec<Arc<dyn HealthCheckable>>,
        config: MonitorConfig,
        notifier: Arc<dyn AlertNotifier>,
    ) -> Self {
        if providers.is_empty() {
            error!("Lightning monitor created without any provider");
        }

        let records = providers
            .iter()
            .map(|provider| ProviderRecord::new(provider.name().to_string(), true, &config))
            .collect();

        Self {
            providers,
            config,
            records: RwLock::new(records),
            alerts: RwLock::new(BoundedHistory::new(ALERT_HISTORY_CAPACITY)),
            notifier,
            shutdown_tx: Mutex::new(None),
        }
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers
            .iter()
            .map(|provider| provider.name().to_string())
            .collect()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Start the periodic probe loop. The first round runs immediately; a
    /// loop that is already running is stopped first.
    pub async fn start_monitoring(self: &Arc<Self>) {
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        {
            let mut tx_guard = self.shutdown_tx.lock().await;
            if let Some(previous) = tx_guard.replace(shutdown_tx) {
                let _ = previous.send(());
                debug!("Stopped previous lightning monitor loop");
            }
        }

        info!(
            check_interval_secs = self.config.check_interval.as_secs(),
            providers = self.providers.len(),
            "Starting lightning provider monitor"
        );

        let monitor: Weak<Self> = Arc::downgrade(self);
        let check_interval = self.config.check_interval;

        tokio::spawn(async move {
            let mut check_timer = interval(check_interval);
            check_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        info!("Lightning monitor received shutdown signal");
                        break;
                    }
                    _ = check_timer.tick() => {
                        let Some(monitor) = monitor.upgrade() else {
                            break;
                        };
                        monitor.check_all_providers().await;
                    }
                }
            }

            info!("Lightning monitor stopped");
        });
    }

    /// Prevent future probe rounds. A round already in flight completes.
    pub async fn stop_monitoring(&self) {
        let mut tx_guard = self.shutdown_tx.lock().await;
        if let Some(shutdown_tx) = tx_guard.take() {
            let _ = shutdown_tx.send(());
        }
    }

    pub async fn is_monitoring(&self) -> bool {
        self.shutdown_tx.lock().await.is_some()
    }

    /// Probe every provider in registration order. One failing probe never
    /// stops the others. Each check runs on its own task so a panicking
    /// implementation is recorded as unhealthy instead of ending the loop.
    #[instrument(skip(self))]
    pub async fn check_all_providers(&self) {
        for provider in &self.providers {
            let started = Instant::now();
            let check = {
                let provider = provider.clone();
                tokio::spawn(async move { provider.health_check().await })
            };
            let outcome = check.await;
            let elapsed = started.elapsed();

            let (healthy, failure) = match outcome {
                Ok(healthy) => (healthy, "Health check failed"),
                Err(e) => {
                    error!(provider = %provider.name(), error = %e, "Health check aborted");
                    (false, "Health check panicked")
                }
            };

            let status = if healthy {
                ProviderStatus::healthy(provider.name(), elapsed)
            } else {
                ProviderStatus::unhealthy(provider.name(), failure, Some(elapsed))
            };

            metrics::record_health_check(provider.name(), healthy, elapsed);
            debug!(
                provider = %provider.name(),
                healthy = healthy,
                response_time_ms = elapsed.as_millis() as u64,
                "Provider health checked"
            );

            self.record_status(status).await;
        }
    }

    /// Append a probe result to the provider's rolling history
    pub async fn record_status(&self, status: ProviderStatus) {
        let mut records = self.records.write().await;
        let record = Self::record_mut(&mut records, &status.name, &self.config);
        if !status.healthy {
            warn!(
                provider = %status.name,
                error = ?status.last_error,
                "Provider reported unhealthy"
            );
        }
        record.statuses.push(status);
    }

    /// Record the outcome of one invoice attempt and evaluate alert
    /// conditions on the most recent attempts.
    pub async fn log_invoice_metrics(
        &self,
        invoice_id: &str,
        provider: &str,
        amount: u64,
        duration: Duration,
        success: bool,
        error: Option<String>,
    ) {
        let metric = InvoiceMetric {
            invoice_id: invoice_id.to_string(),
            provider: provider.to_string(),
            amount,
            duration_ms: duration.as_millis() as u64,
            success,
            error,
            timestamp: Utc::now(),
        };

        let raised = {
            let mut records = self.records.write().await;
            let record = Self::record_mut(&mut records, provider, &self.config);
            record.invoices.push(metric);

            if record.invoices.len() >= ALERT_WINDOW {
                let window: Vec<&InvoiceMetric> = record.invoices.recent(ALERT_WINDOW).collect();
                evaluate_alerts(provider, &window)
            } else {
                Vec::new()
            }
        };

        for alert in raised {
            self.raise(alert).await;
        }
    }

    async fn raise(&self, alert: Alert) {
        metrics::record_alert(&alert.provider, alert.severity);

        match alert.severity {
            AlertSeverity::Critical => {
                error!(
                    alert_id = %alert.id,
                    provider = %alert.provider,
                    failures = alert.failures,
                    window = alert.window,
                    "{}",
                    alert.message
                );
                if let Err(e) = self.notifier.notify(&alert).await {
                    warn!(
                        alert_id = %alert.id,
                        notifier = self.notifier.name(),
                        error = %e,
                        "Failed to notify operators"
                    );
                }
            }
            AlertSeverity::Warning => {
                warn!(
                    alert_id = %alert.id,
                    provider = %alert.provider,
                    average_duration_ms = alert.average_duration_ms,
                    "{}",
                    alert.message
                );
            }
        }

        self.alerts.write().await.push(alert);
    }

    /// Healthy registered provider with the highest uptime, ties broken by
    /// the lowest latest response time. Pure read of current state.
    pub async fn get_best_provider(&self) -> Option<String> {
        let records = self.records.read().await;
        let mut best: Option<(&str, f64, u64)> = None;

        for record in records.iter().filter(|r| r.is_candidate()) {
            let uptime = record.uptime().unwrap_or(0.0);
            let response_time = record
                .statuses
                .latest()
                .and_then(|s| s.response_time_ms)
                .unwrap_or(u64::MAX);

            let better = match best {
                None => true,
                Some((_, best_uptime, best_response_time)) => {
                    uptime > best_uptime
                        || (uptime == best_uptime && response_time < best_response_time)
                }
            };
            if better {
                best = Some((&record.name, uptime, response_time));
            }
        }

        best.map(|(name, _, _)| name.to_string())
    }

    pub async fn get_provider_status(&self, provider: &str) -> Option<ProviderStatus> {
        let records = self.records.read().await;
        records
            .iter()
            .find(|r| r.name == provider)
            .and_then(ProviderRecord::latest_status)
    }

    /// Latest status of every provider that has been probed at least once
    pub async fn get_all_statuses(&self) -> Vec<ProviderStatus> {
        let records = self.records.read().await;
        records
            .iter()
            .filter_map(ProviderRecord::latest_status)
            .collect()
    }

    pub async fn get_status_history(&self, provider: &str) -> Vec<ProviderStatus> {
        let records = self.records.read().await;
        records
            .iter()
            .find(|r| r.name == provider)
            .map(|r| r.statuses.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// `None` until the provider has logged at least one invoice attempt
    pub async fn get_provider_metrics(&self, provider: &str) -> Option<ProviderMetrics> {
        let records = self.records.read().await;
        let record = records.iter().find(|r| r.name == provider)?;
        if record.invoices.is_empty() {
            return None;
        }

        let total = record.invoices.len();
        let successful = record.invoices.iter().filter(|m| m.success).count();
        let total_duration: u64 = record.invoices.iter().map(|m| m.duration_ms).sum();
        let last_failure = record.invoices.iter().rev().find(|m| !m.success);

        Some(ProviderMetrics {
            provider: record.name.clone(),
            total_invoices: total,
            successful_invoices: successful,
            failed_invoices: total - successful,
            success_rate: percentage(successful, total),
            average_response_time_ms: total_duration as f64 / total as f64,
            uptime: record.uptime().unwrap_or(0.0),
            last_error: last_failure.map(|m| {
                m.error
                    .clone()
                    .unwrap_or_else(|| "Unknown error".to_string())
            }),
            last_invoice_at: record.invoices.latest().map(|m| m.timestamp),
        })
    }

    pub async fn get_overall_stats(&self) -> OverallStats {
        let records = self.records.read().await;

        let mut stats = OverallStats {
            provider_count: self.providers.len(),
            healthy_provider_count: records.iter().filter(|r| r.is_candidate()).count(),
            ..Default::default()
        };

        let mut total_duration: u64 = 0;
        for record in records.iter() {
            for metric in record.invoices.iter() {
                stats.total_invoices += 1;
                if metric.success {
                    stats.successful_invoices += 1;
                }
                total_duration += metric.duration_ms;
            }
        }

        stats.failed_invoices = stats.total_invoices - stats.successful_invoices;
        stats.success_rate = percentage(stats.successful_invoices, stats.total_invoices);
        if stats.total_invoices > 0 {
            stats.average_response_time_ms = total_duration as f64 / stats.total_invoices as f64;
        }

        stats
    }

    /// Most recent alerts, oldest first
    pub async fn recent_alerts(&self) -> Vec<Alert> {
        self.alerts.read().await.iter().cloned().collect()
    }

    fn record_mut<'a>(
        records: &'a mut Vec<ProviderRecord>,
        provider: &str,
        config: &MonitorConfig,
    ) -> &'a mut ProviderRecord {
        match records.iter().position(|r| r.name == provider) {
            Some(index) => &mut records[index],
            None => {
                debug!(provider = %provider, "Tracking unregistered provider");
                records.push(ProviderRecord::new(provider.to_string(), false, config));
                let last = records.len() - 1;
                &mut records[last]
            }
        }
    }
}

/// Alerts for a window of the most recent invoice attempts
fn evaluate_alerts(provider: &str, window: &[&InvoiceMetric]) -> Vec<Alert> {
    let mut raised = Vec::new();
    if window.is_empty() {
        return raised;
    }

    let failures = window.iter().filter(|m| !m.success).count();
    let average_duration_ms =
        window.iter().map(|m| m.duration_ms).sum::<u64>() as f64 / window.len() as f64;

    if failures >= CRITICAL_FAILURE_THRESHOLD {
        let mut alert = Alert::new(
            AlertSeverity::Critical,
            provider,
            format!(
                "{} of the last {} invoices failed on provider {}",
                failures,
                window.len(),
                provider
            ),
        );
        alert.failures = failures;
        alert.window = window.len();
        alert.average_duration_ms = average_duration_ms;
        raised.push(alert);
    }

    if average_duration_ms > SLOW_INVOICE_THRESHOLD_MS as f64 {
        let mut alert = Alert::new(
            AlertSeverity::Warning,
            provider,
            format!(
                "Average invoice time {:.0}ms over the last {} invoices on provider {}",
                average_duration_ms,
                window.len(),
                provider
            ),
        );
        alert.failures = failures;
        alert.window = window.len();
        alert.average_duration_ms = average_duration_ms;
        raised.push(alert);
    }

    raised
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}
