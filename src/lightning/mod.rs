//! Lightning invoice providers.
//!
//! A provider turns an [`InvoiceRequest`] into a BOLT11 [`Invoice`] issued by a
//! remote wallet backend and answers payment status lookups. The only backend
//! today is LNbits ([`lnbits::LnbitsClient`]); new backends implement
//! [`InvoiceProvider`] and get a [`ProviderBackend`] variant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod lnbits;
pub mod provider;
pub mod retry;
pub mod transport;
pub mod validation;


pub use lnbits::{LnbitsClient, LnbitsConfig};
pub use provider::{
    build_providers, HealthCheckable, InvoiceProvider, ProviderBackend, ProviderConfig,
    ProviderHandle,
};
pub use transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};

/// Parameters for a new invoice, constructed by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRequest {
    /// Amount in sats
    pub amount: u64,
    pub memo: String,
    /// Expiry in seconds, defaults to [`validation::DEFAULT_EXPIRY_SECS`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<u64>,
}

impl InvoiceRequest {
    pub fn new(amount: u64, memo: impl Into<String>) -> Self {
        Self {
            amount,
            memo: memo.into(),
            expiry: None,
        }
    }

    pub fn with_expiry(mut self, expiry_secs: u64) -> Self {
        self.expiry = Some(expiry_secs);
        self
    }

    pub fn expiry_secs(&self) -> u64 {
        self.expiry.unwrap_or(validation::DEFAULT_EXPIRY_SECS)
    }
}

/// An invoice issued by a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    /// Same as the payment hash
    pub id: String,
    pub payment_hash: String,
    pub payment_request: String,
    /// Amount in sats
    pub amount: u64,
    pub expires_at: DateTime<Utc>,
}

impl Invoice {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentState {
    Pending,
    Paid,
    Expired,
    Failed,
}

/// Snapshot of a payment as reported by the wallet backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatus {
    pub paid: bool,
    pub status: PaymentState,
    /// Amount in sats
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
    /// Routing fee in sats
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preimage: Option<String>,
}
