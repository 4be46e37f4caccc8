use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics_exporter_prometheus::PrometheusHandle;

use crate::monitor::LightningMonitor;
use crate::service::InvoiceService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<InvoiceService>,
    pub start_time: Instant,
    /// Renders `/metrics`; without a recorder the endpoint serves nothing
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(service: InvoiceService) -> Self {
        Self {
            service: Arc::new(service),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn monitor(&self) -> &Arc<LightningMonitor> {
        self.service.monitor()
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }
}
