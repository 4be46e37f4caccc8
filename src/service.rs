//! Invoice issuance across the registered providers.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{ProviderError, ProviderErrorKind, ProviderResult};
use crate::lightning::{Invoice, InvoiceRequest, PaymentStatus, ProviderHandle};
use crate::metrics;
use crate::monitor::LightningMonitor;

/// Routes invoice traffic to the provider the monitor currently recommends
/// and feeds every outcome back into the monitor.
pub struct InvoiceService {
    providers: Vec<ProviderHandle>,
    monitor: Arc<LightningMonitor>,
}

impl InvoiceService {
    pub fn new(providers: Vec<ProviderHandle>, monitor: Arc<LightningMonitor>) -> Self {
        Self { providers, monitor }
    }

    pub fn monitor(&self) -> &Arc<LightningMonitor> {
        &self.monitor
    }

    pub fn providers(&self) -> &[ProviderHandle] {
        &self.providers
    }

    /// Best healthy provider, or the first registered one when none has a
    /// healthy latest probe yet
    pub async fn select_provider(&self) -> ProviderResult<&ProviderHandle> {
        if let Some(best) = self.monitor.get_best_provider().await {
            if let Some(handle) = self.providers.iter().find(|p| p.name() == best) {
                return Ok(handle);
            }
        }

        self.providers
            .first()
            .ok_or_else(|| ProviderError::unavailable("No lightning provider available"))
    }

    #[instrument(skip(self, request), fields(amount = request.amount))]
    pub async fn generate_invoice(&self, request: &InvoiceRequest) -> ProviderResult<Invoice> {
        let provider = self.select_provider().await?;
        let started = Instant::now();
        let result = provider.invoices.generate_invoice(request).await;
        let elapsed = started.elapsed();

        match &result {
            Ok(invoice) => {
                info!(
                    provider = %provider.name(),
                    payment_hash = %invoice.payment_hash,
                    duration_ms = elapsed.as_millis() as u64,
                    "Invoice issued"
                );
                metrics::record_invoice(provider.name(), request.amount, elapsed, true);
                self.monitor
                    .log_invoice_metrics(
                        &invoice.id,
                        provider.name(),
                        request.amount,
                        elapsed,
                        true,
                        None,
                    )
                    .await;
            }
            // Rejected before reaching the provider, says nothing about its health
            Err(e) if e.kind == ProviderErrorKind::Validation => {
                debug!(provider = %provider.name(), error = %e, "Invoice request rejected");
            }
            Err(e) => {
                warn!(
                    provider = %provider.name(),
                    error = %e,
                    duration_ms = elapsed.as_millis() as u64,
                    "Invoice generation failed"
                );
                metrics::record_invoice(provider.name(), request.amount, elapsed, false);
                self.monitor
                    .log_invoice_metrics(
                        &format!("failed-{}", Uuid::new_v4()),
                        provider.name(),
                        request.amount,
                        elapsed,
                        false,
                        Some(e.to_string()),
                    )
                    .await;
            }
        }

        result
    }

    /// Ask the recommended provider first, then the others, until one knows
    /// the payment
    #[instrument(skip(self))]
    pub async fn check_payment(&self, payment_hash: &str) -> ProviderResult<PaymentStatus> {
        let first = self.select_provider().await?;
        let ordered = std::iter::once(first)
            .chain(self.providers.iter().filter(|p| p.name() != first.name()));

        let mut last_error = None;
        for provider in ordered {
            match provider.invoices.check_payment(payment_hash).await {
                Ok(status) => {
                    metrics::record_payment_check(provider.name(), "found");
                    return Ok(status);
                }
                Err(e) if e.kind == ProviderErrorKind::NotFound => {
                    metrics::record_payment_check(provider.name(), "not_found");
                    debug!(provider = %provider.name(), "Payment unknown to provider");
                    last_error = Some(e);
                }
                Err(e) => {
                    metrics::record_payment_check(provider.name(), "error");
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ProviderError::not_found("Payment not found")))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::error::codes;
    use crate::lightning::{HealthCheckable, InvoiceProvider, PaymentState};
    use crate::monitor::{LogNotifier, MonitorConfig, ProviderStatus};

    struct StubProvider {
        name: String,
        fail: bool,
        known_hash: Option<String>,
        invoices: AtomicUsize,
    }

    impl StubProvider {
        fn new(name: &str, fail: bool, known_hash: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                fail,
                known_hash: known_hash.map(str::to_string),
                invoices: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl HealthCheckable for StubProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn health_check(&self) -> bool {
            !self.fail
        }
    }

    #[async_trait]
    impl InvoiceProvider for StubProvider {
        async fn generate_invoice(&self, request: &InvoiceRequest) -> ProviderResult<Invoice> {
            self.invoices.fetch_add(1, Ordering::SeqCst);
            if request.amount == 0 {
                return Err(ProviderError::validation(
                    codes::INVALID_AMOUNT,
                    "Amount must be positive",
                ));
            }
            if self.fail {
                return Err(ProviderError::http(500, "Internal Server Error"));
            }
            Ok(Invoice {
                id: "hash".to_string(),
                payment_hash: "hash".to_string(),
                payment_request: "lnbc1000n1pstub".to_string(),
                amount: request.amount,
                expires_at: Utc::now(),
            })
        }

        async fn check_payment(&self, payment_hash: &str) -> ProviderResult<PaymentStatus> {
            if self.known_hash.as_deref() == Some(payment_hash) {
                Ok(PaymentStatus {
                    paid: true,
                    status: PaymentState::Paid,
                    amount: Some(1000),
                    fee: None,
                    preimage: None,
                })
            } else {
                Err(ProviderError::not_found("Payment not found"))
            }
        }
    }

    fn service(providers: Vec<Arc<StubProvider>>) -> InvoiceService {
        let handles: Vec<ProviderHandle> =
            providers.into_iter().map(ProviderHandle::new).collect();
        let monitor = Arc::new(LightningMonitor::new(
            handles.iter().map(|h| h.health.clone()).collect(),
            MonitorConfig::default(),
            Arc::new(LogNotifier),
        ));
        InvoiceService::new(handles, monitor)
    }

    #[tokio::test]
    async fn test_no_providers_is_unavailable() {
        let service = service(Vec::new());
        let err = service
            .generate_invoice(&InvoiceRequest::new(1000, "coffee"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Unavailable);
    }

    #[tokio::test]
    async fn test_uses_best_provider() {
        let a = StubProvider::new("a", false, None);
        let b = StubProvider::new("b", false, None);
        let service = service(vec![a.clone(), b.clone()]);

        service
            .monitor()
            .record_status(ProviderStatus::unhealthy("a", "down", None))
            .await;
        service
            .monitor()
            .record_status(ProviderStatus::healthy("b", Duration::from_millis(20)))
            .await;

        service
            .generate_invoice(&InvoiceRequest::new(1000, "coffee"))
            .await
            .unwrap();
        assert_eq!(a.invoices.load(Ordering::SeqCst), 0);
        assert_eq!(b.invoices.load(Ordering::SeqCst), 1);

        let metrics = service.monitor().get_provider_metrics("b").await.unwrap();
        assert_eq!(metrics.successful_invoices, 1);
    }

    #[tokio::test]
    async fn test_failures_are_logged_to_monitor() {
        let service = service(vec![StubProvider::new("a", true, None)]);

        let err = service
            .generate_invoice(&InvoiceRequest::new(1000, "coffee"))
            .await
            .unwrap_err();
        assert_eq!(err.status, Some(500));

        let metrics = service.monitor().get_provider_metrics("a").await.unwrap();
        assert_eq!(metrics.failed_invoices, 1);
        assert!(metrics.last_error.unwrap().contains("Internal Server Error"));
    }

    #[tokio::test]
    async fn test_validation_errors_are_not_logged() {
        let service = service(vec![StubProvider::new("a", false, None)]);

        let err = service
            .generate_invoice(&InvoiceRequest::new(0, "coffee"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Validation);
        assert!(service.monitor().get_provider_metrics("a").await.is_none());
    }

    #[tokio::test]
    async fn test_check_payment_falls_through_providers() {
        let service = service(vec![
            StubProvider::new("a", false, None),
            StubProvider::new("b", false, Some("feedbeef")),
        ]);

        let status = service.check_payment("feedbeef").await.unwrap();
        assert!(status.paid);

        let err = service.check_payment("cafebabe").await.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::NotFound);
    }
}
