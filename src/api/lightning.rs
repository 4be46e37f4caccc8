use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::lightning::{Invoice, InvoiceRequest, PaymentStatus};
use crate::monitor::{Alert, OverallStats, ProviderMetrics, ProviderStatus};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    /// Amount in sats
    pub amount: u64,
    #[serde(default)]
    pub memo: String,
    /// Expiry in seconds
    pub expiry: Option<u64>,
}

impl From<CreateInvoiceRequest> for InvoiceRequest {
    fn from(req: CreateInvoiceRequest) -> Self {
        Self {
            amount: req.amount,
            memo: req.memo,
            expiry: req.expiry,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub best_provider: Option<String>,
    pub monitoring: bool,
    pub providers: Vec<ProviderStatus>,
    pub stats: OverallStats,
    pub recent_alerts: Vec<Alert>,
}

#[instrument(skip(state, payload))]
pub async fn create_invoice(
    State(state): State<AppState>,
    payload: Result<Json<CreateInvoiceRequest>, JsonRejection>,
) -> Result<Json<Invoice>, AppError> {
    let Json(req) = payload.map_err(|e| AppError::validation_error(e.body_text()))?;
    let request = InvoiceRequest::from(req);

    let invoice = state.service.generate_invoice(&request).await?;
    info!(
        payment_hash = %invoice.payment_hash,
        amount = invoice.amount,
        "Invoice created via API"
    );

    Ok(Json(invoice))
}

#[instrument(skip(state))]
pub async fn payment_status(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Json<PaymentStatus>, AppError> {
    let status = state.service.check_payment(&hash).await?;
    Ok(Json(status))
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let monitor = state.monitor();

    Json(StatusResponse {
        best_provider: monitor.get_best_provider().await,
        monitoring: monitor.is_monitoring().await,
        providers: monitor.get_all_statuses().await,
        stats: monitor.get_overall_stats().await,
        recent_alerts: monitor.recent_alerts().await,
    })
}

pub async fn provider_metrics(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ProviderMetrics>, AppError> {
    state
        .monitor()
        .get_provider_metrics(&name)
        .await
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("No invoice metrics for provider {}", name)))
}
