use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use super::provider::{HealthCheckable, InvoiceProvider};
use super::retry::backoff_delay;
use super::transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
use super::validation::{
    is_valid_bolt11_format, sanitize_memo, validate_invoice_request, validate_payment_hash,
};
use super::{Invoice, InvoiceRequest, PaymentState, PaymentStatus};
use crate::error::{codes, ProviderError, ProviderResult};
use crate::observability::sanitization::{sanitize_api_key, sanitize_invoice, sanitize_preimage};

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_RETRIES: u32 = 3;

/// Path appended to the webhook base URL so the wallet can report settlement
pub const WEBHOOK_PATH: &str = "/api/webhook/lightning";

const SIMPLIFIED_INVOICE_PATH: &str = "/wallet/invoice";
const NATIVE_PAYMENTS_PATH: &str = "/api/v1/payments";
const SIMPLIFIED_BALANCE_PATH: &str = "/wallet/balance";
const NATIVE_WALLET_PATH: &str = "/api/v1/wallet";

/// Configuration for an LNbits-compatible wallet backend
#[derive(Clone, Serialize, Deserialize)]
pub struct LnbitsConfig {
    pub endpoint: String,

    /// Wallet invoice key, required
    #[serde(rename = "api-key", default)]
    pub api_key: Option<String>,

    #[serde(rename = "wallet-id", default)]
    pub wallet_id: Option<String>,

    /// Base URL of the service receiving payment webhooks
    #[serde(rename = "webhook-base-url", default)]
    pub webhook_base_url: Option<String>,

    #[serde(rename = "timeout-ms", default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_retries")]
    pub retries: u32,
}

impl LnbitsConfig {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: Some(api_key.into()),
            wallet_id: None,
            webhook_base_url: None,
            timeout_ms: default_timeout_ms(),
            retries: default_retries(),
        }
    }
}

impl fmt::Debug for LnbitsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LnbitsConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_deref().map(sanitize_api_key))
            .field("wallet_id", &self.wallet_id)
            .field("webhook_base_url", &self.webhook_base_url)
            .field("timeout_ms", &self.timeout_ms)
            .field("retries", &self.retries)
            .finish()
    }
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_retries() -> u32 {
    DEFAULT_RETRIES
}

/// Unit the wallet endpoint expects amounts in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AmountUnit {
    Sats,
    Millisats,
}

impl AmountUnit {
    fn from_sats(self, sats: u64) -> u64 {
        match self {
            Self::Sats => sats,
            Self::Millisats => sats.saturating_mul(1000),
        }
    }

    fn to_sats(self, amount: i64) -> u64 {
        let amount = amount.unsigned_abs();
        match self {
            Self::Sats => amount,
            Self::Millisats => amount / 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InvoiceEndpoint {
    /// `POST /wallet/invoice`, amounts in sats
    Simplified,
    /// `POST /api/v1/payments`, amounts in millisats
    Native,
}

impl InvoiceEndpoint {
    fn path(self) -> &'static str {
        match self {
            Self::Simplified => SIMPLIFIED_INVOICE_PATH,
            Self::Native => NATIVE_PAYMENTS_PATH,
        }
    }

    fn unit(self) -> AmountUnit {
        match self {
            Self::Simplified => AmountUnit::Sats,
            Self::Native => AmountUnit::Millisats,
        }
    }
}

/// Client for an LNbits-compatible wallet API
pub struct LnbitsClient {
    name: String,
    endpoint: String,
    api_key: String,
    wallet_id: Option<String>,
    webhook_url: Option<String>,
    timeout: Duration,
    retries: u32,
    transport: Arc<dyn HttpTransport>,
}

impl fmt::Debug for LnbitsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LnbitsClient")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("wallet_id", &self.wallet_id)
            .field("webhook_url", &self.webhook_url)
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .finish()
    }
}

impl LnbitsClient {
    pub fn new(name: impl Into<String>, config: LnbitsConfig) -> ProviderResult<Self> {
        let transport = Arc::new(ReqwestTransport::new()?);
        Self::with_transport(name, config, transport)
    }

    pub fn with_transport(
        name: impl Into<String>,
        config: LnbitsConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> ProviderResult<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                ProviderError::configuration(codes::MISSING_API_KEY, "LNbits API key is required")
            })?
            .to_string();

        let endpoint = normalize_base_url(&config.endpoint)?;
        let webhook_url = match config.webhook_base_url.as_deref() {
            Some(base) if !base.trim().is_empty() => {
                Some(format!("{}{}", normalize_base_url(base)?, WEBHOOK_PATH))
            }
            _ => None,
        };

        Ok(Self {
            name: name.into(),
            endpoint,
            api_key,
            wallet_id: config.wallet_id,
            webhook_url,
            timeout: Duration::from_millis(config.timeout_ms),
            retries: config.retries.max(1),
            transport,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn wallet_id(&self) -> Option<&str> {
        self.wallet_id.as_deref()
    }

    pub fn webhook_url(&self) -> Option<&str> {
        self.webhook_url.as_deref()
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    fn authorize(&self, request: HttpRequest) -> HttpRequest {
        request
            .header("X-Api-Key", self.api_key.clone())
            .header("Content-Type", "application/json")
    }

    async fn get(&self, path: &str) -> ProviderResult<HttpResponse> {
        let request = self.authorize(HttpRequest::get(self.url(path), self.timeout));
        self.transport.send(request).await
    }

    /// The only place amounts are converted for the wire
    async fn send_invoice_request(
        &self,
        endpoint: InvoiceEndpoint,
        amount_sats: u64,
        memo: &str,
        expiry_secs: u64,
    ) -> ProviderResult<HttpResponse> {
        let mut payload = json!({
            "amount": endpoint.unit().from_sats(amount_sats),
            "memo": memo,
            "expiry": expiry_secs,
        });
        if endpoint == InvoiceEndpoint::Native {
            payload["out"] = Value::Bool(false);
        }
        if let Some(webhook) = &self.webhook_url {
            payload["webhook"] = Value::String(webhook.clone());
        }

        let request = self.authorize(HttpRequest::post(
            self.url(endpoint.path()),
            payload,
            self.timeout,
        ));
        self.transport.send(request).await
    }

    /// One attempt: simplified endpoint first, native API when the simplified
    /// one answers with a non-success status.
    async fn create_invoice_once(
        &self,
        amount_sats: u64,
        memo: &str,
        expiry_secs: u64,
    ) -> ProviderResult<Invoice> {
        let mut response = self
            .send_invoice_request(InvoiceEndpoint::Simplified, amount_sats, memo, expiry_secs)
            .await?;

        if !response.is_success() {
            debug!(
                provider = %self.name,
                status = response.status,
                "Simplified invoice endpoint rejected request, falling back to native API"
            );
            response = self
                .send_invoice_request(InvoiceEndpoint::Native, amount_sats, memo, expiry_secs)
                .await?;
        }

        if !response.is_success() {
            return Err(ProviderError::http(
                response.status,
                format!("Invoice creation failed with HTTP {}", response.status),
            ));
        }

        let body: Value = response.json()?;
        let payment_hash = non_empty_str(&body, "payment_hash").ok_or_else(|| {
            ProviderError::response_shape(
                codes::INVALID_RESPONSE,
                "Response is missing payment_hash",
            )
        })?;
        let payment_request = non_empty_str(&body, "payment_request").ok_or_else(|| {
            ProviderError::response_shape(
                codes::INVALID_RESPONSE,
                "Response is missing payment_request",
            )
        })?;

        if !is_valid_bolt11_format(payment_request) {
            return Err(ProviderError::response_shape(
                codes::INVALID_INVOICE,
                "Response carries a malformed BOLT11 invoice",
            ));
        }

        Ok(Invoice {
            id: payment_hash.to_string(),
            payment_hash: payment_hash.to_string(),
            payment_request: payment_request.to_string(),
            amount: amount_sats,
            expires_at: Utc::now() + chrono::Duration::seconds(expiry_secs as i64),
        })
    }
}

#[async_trait]
impl HealthCheckable for LnbitsClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn health_check(&self) -> bool {
        match self.get(SIMPLIFIED_BALANCE_PATH).await {
            Ok(response) if response.is_success() => return true,
            Ok(response) => debug!(
                provider = %self.name,
                status = response.status,
                "Balance probe failed, trying native wallet endpoint"
            ),
            Err(e) => debug!(
                provider = %self.name,
                error = %e,
                "Balance probe failed, trying native wallet endpoint"
            ),
        }

        match self.get(NATIVE_WALLET_PATH).await {
            Ok(response) => response.is_success(),
            Err(e) => {
                debug!(provider = %self.name, error = %e, "Wallet probe failed");
                false
            }
        }
    }
}

#[async_trait]
impl InvoiceProvider for LnbitsClient {
    #[instrument(skip(self, request), fields(provider = %self.name, amount = request.amount))]
    async fn generate_invoice(&self, request: &InvoiceRequest) -> ProviderResult<Invoice> {
        validate_invoice_request(request)?;

        let memo = sanitize_memo(&request.memo);
        let expiry_secs = request.expiry_secs();
        let mut last_error: Option<ProviderError> = None;

        for attempt in 1..=self.retries {
            debug!(
                attempt = attempt,
                max_attempts = self.retries,
                "Requesting invoice from wallet backend"
            );

            match self
                .create_invoice_once(request.amount, &memo, expiry_secs)
                .await
            {
                Ok(invoice) => {
                    info!(
                        attempt = attempt,
                        payment_hash = %invoice.payment_hash,
                        payment_request = %sanitize_invoice(&invoice.payment_request),
                        expires_at = %invoice.expires_at,
                        "Invoice generated"
                    );
                    return Ok(invoice);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    warn!(
                        attempt = attempt,
                        max_attempts = self.retries,
                        error = %e,
                        "Invoice attempt failed"
                    );
                    last_error = Some(e);

                    if attempt < self.retries {
                        tokio::time::sleep(backoff_delay(attempt)).await;
                    }
                }
            }
        }

        let last_error = last_error
            .unwrap_or_else(|| ProviderError::network("No invoice attempt was made"));
        error!(
            attempts = self.retries,
            error = %last_error,
            "Invoice generation failed after all retry attempts"
        );
        Err(ProviderError::exhausted(self.retries, &last_error))
    }

    #[instrument(skip(self), fields(provider = %self.name))]
    async fn check_payment(&self, payment_hash: &str) -> ProviderResult<PaymentStatus> {
        validate_payment_hash(payment_hash)?;

        let response = self
            .get(&format!("{}/{}", NATIVE_PAYMENTS_PATH, payment_hash))
            .await?;

        if response.status == 404 {
            return Err(ProviderError::not_found(format!(
                "Payment {} not found",
                payment_hash
            )));
        }
        if !response.is_success() {
            return Err(ProviderError::http(
                response.status,
                format!("Payment status lookup failed with HTTP {}", response.status),
            ));
        }

        let body: Value = response.json()?;
        let status = parse_payment_status(&body);

        debug!(
            paid = status.paid,
            status = ?status.status,
            amount = status.amount,
            preimage = ?status.preimage.as_deref().map(sanitize_preimage),
            "Payment status retrieved"
        );

        Ok(status)
    }
}

fn normalize_base_url(raw: &str) -> ProviderResult<String> {
    let parsed = Url::parse(raw.trim()).map_err(|e| {
        ProviderError::configuration(
            codes::INVALID_ENDPOINT,
            format!("Invalid URL {:?}: {}", raw, e),
        )
    })?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(ProviderError::configuration(
                codes::INVALID_ENDPOINT,
                format!("Unsupported URL scheme: {}", scheme),
            ))
        }
    }

    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

fn non_empty_str<'a>(body: &'a Value, field: &str) -> Option<&'a str> {
    body.get(field)
        .and_then(Value::as_str)
        .filter(|value| !value.trim().is_empty())
}

/// Top-level fields win, `details` is what newer LNbits versions nest them in.
fn lookup<'a>(body: &'a Value, field: &str) -> Option<&'a Value> {
    body.get(field)
        .filter(|value| !value.is_null())
        .or_else(|| body.get("details").and_then(|details| details.get(field)))
        .filter(|value| !value.is_null())
}

fn parse_payment_status(body: &Value) -> PaymentStatus {
    let paid = body.get("paid").and_then(Value::as_bool).unwrap_or(false);

    let reported = lookup(body, "status")
        .and_then(Value::as_str)
        .map(|s| s.to_ascii_lowercase());
    let status = if paid {
        PaymentState::Paid
    } else {
        match reported.as_deref() {
            Some("expired") => PaymentState::Expired,
            Some("failed") => PaymentState::Failed,
            Some("paid") | Some("success") | Some("complete") => PaymentState::Paid,
            _ => PaymentState::Pending,
        }
    };

    let amount = lookup(body, "amount")
        .and_then(Value::as_i64)
        .map(|msats| AmountUnit::Millisats.to_sats(msats));
    let fee = lookup(body, "fee")
        .and_then(Value::as_i64)
        .map(|msats| AmountUnit::Millisats.to_sats(msats));
    let preimage = lookup(body, "preimage")
        .and_then(Value::as_str)
        .filter(|p| !p.is_empty())
        .map(str::to_string);

    PaymentStatus {
        paid: paid || status == PaymentState::Paid,
        status,
        amount,
        fee,
        preimage,
    }
}
