use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::lnbits::{LnbitsClient, LnbitsConfig};
use super::{Invoice, InvoiceRequest, PaymentStatus};
use crate::error::ProviderResult;

/// Anything the monitor can probe for reachability
#[async_trait]
pub trait HealthCheckable: Send + Sync {
    fn name(&self) -> &str;

    /// Point-in-time probe, never retried and never fails
    async fn health_check(&self) -> bool;
}

#[async_trait]
pub trait InvoiceProvider: HealthCheckable {
    async fn generate_invoice(&self, request: &InvoiceRequest) -> ProviderResult<Invoice>;

    async fn check_payment(&self, payment_hash: &str) -> ProviderResult<PaymentStatus>;
}

/// One built provider, viewed both as an invoice issuer and as a health probe
#[derive(Clone)]
pub struct ProviderHandle {
    pub invoices: Arc<dyn InvoiceProvider>,
    pub health: Arc<dyn HealthCheckable>,
}

impl ProviderHandle {
    pub fn new<P: InvoiceProvider + 'static>(provider: Arc<P>) -> Self {
        Self {
            invoices: provider.clone(),
            health: provider,
        }
    }

    pub fn name(&self) -> &str {
        self.health.name()
    }
}

impl std::fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderHandle")
            .field("name", &self.name())
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderBackend {
    Lnbits(LnbitsConfig),
}

/// A named provider entry in the configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub backend: ProviderBackend,
}

impl ProviderConfig {
    pub fn lnbits(name: impl Into<String>, config: LnbitsConfig) -> Self {
        Self {
            name: name.into(),
            backend: ProviderBackend::Lnbits(config),
        }
    }

    pub fn build(&self) -> ProviderResult<ProviderHandle> {
        match &self.backend {
            ProviderBackend::Lnbits(config) => {
                let client = LnbitsClient::new(self.name.clone(), config.clone())?;
                Ok(ProviderHandle::new(Arc::new(client)))
            }
        }
    }
}

/// Build every configured provider. A provider that fails to build is logged
/// and left out; the rest keep working.
pub fn build_providers(configs: &[ProviderConfig]) -> Vec<ProviderHandle> {
    let mut providers = Vec::with_capacity(configs.len());

    for config in configs {
        match config.build() {
            Ok(handle) => {
                info!(provider = %config.name, "Lightning provider initialized");
                providers.push(handle);
            }
            Err(e) => {
                warn!(
                    provider = %config.name,
                    error = %e,
                    "Failed to initialize lightning provider, skipping"
                );
            }
        }
    }

    if providers.is_empty() {
        error!(
            configured = configs.len(),
            "No lightning provider could be initialized"
        );
    }

    providers
}
