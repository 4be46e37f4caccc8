#![cfg(feature = "api")]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use daznode::api::create_router;
use daznode::error::{codes, ProviderError, ProviderResult};
use daznode::lightning::{
    HealthCheckable, Invoice, InvoiceProvider, InvoiceRequest, PaymentState, PaymentStatus,
    ProviderHandle,
};
use daznode::monitor::{LightningMonitor, LogNotifier, MonitorConfig};
use daznode::service::InvoiceService;
use daznode::state::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;

const PAID_HASH: &str = "a3f1c9e2b4d6078812345678abcdef0123456789abcdef0123456789abcdef01";

struct FakeWallet {
    name: String,
    up: AtomicBool,
}

impl FakeWallet {
    fn new(name: &str, up: bool) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            up: AtomicBool::new(up),
        })
    }
}

#[async_trait]
impl HealthCheckable for FakeWallet {
    fn name(&self) -> &str {
        &self.name
    }

    async fn health_check(&self) -> bool {
        self.up.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InvoiceProvider for FakeWallet {
    async fn generate_invoice(&self, request: &InvoiceRequest) -> ProviderResult<Invoice> {
        if request.amount == 0 {
            return Err(ProviderError::validation(
                codes::INVALID_AMOUNT,
                "Amount must be positive",
            ));
        }
        if !self.up.load(Ordering::SeqCst) {
            let last = ProviderError::http(502, "Bad Gateway");
            return Err(ProviderError::exhausted(3, &last));
        }

        Ok(Invoice {
            id: PAID_HASH.to_string(),
            payment_hash: PAID_HASH.to_string(),
            payment_request: format!("lnbc{}n1p{}", request.amount * 10, "x".repeat(40)),
            amount: request.amount,
            expires_at: Utc::now() + Duration::seconds(request.expiry_secs() as i64),
        })
    }

    async fn check_payment(&self, payment_hash: &str) -> ProviderResult<PaymentStatus> {
        if payment_hash == PAID_HASH {
            Ok(PaymentStatus {
                paid: true,
                status: PaymentState::Paid,
                amount: Some(1000),
                fee: Some(1),
                preimage: None,
            })
        } else {
            Err(ProviderError::not_found("Payment not found"))
        }
    }
}

fn app_with(wallets: Vec<Arc<FakeWallet>>) -> (Router, Arc<LightningMonitor>) {
    let handles: Vec<ProviderHandle> = wallets.into_iter().map(ProviderHandle::new).collect();
    let monitor = Arc::new(LightningMonitor::new(
        handles.iter().map(|h| h.health.clone()).collect(),
        MonitorConfig::default(),
        Arc::new(LogNotifier),
    ));
    let state = AppState::new(InvoiceService::new(handles, monitor.clone()));
    (create_router(state), monitor)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_create_invoice() {
    let (app, monitor) = app_with(vec![FakeWallet::new("lnbits", true)]);

    let (status, body) = send(
        app,
        post_json(
            "/api/lightning/invoice",
            json!({"amount": 1000, "memo": "Coffee", "expiry": 600}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["paymentHash"], PAID_HASH);
    assert_eq!(body["amount"], 1000);
    assert!(body["paymentRequest"].as_str().unwrap().starts_with("lnbc"));

    let metrics = monitor.get_provider_metrics("lnbits").await.unwrap();
    assert_eq!(metrics.successful_invoices, 1);
}

#[tokio::test]
async fn test_create_invoice_rejects_malformed_body() {
    let (app, _) = app_with(vec![FakeWallet::new("lnbits", true)]);

    let (status, body) = send(
        app,
        post_json("/api/lightning/invoice", json!({"amount": "lots"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_create_invoice_validation_error() {
    let (app, monitor) = app_with(vec![FakeWallet::new("lnbits", true)]);

    let (status, body) = send(
        app,
        post_json("/api/lightning/invoice", json!({"amount": 0, "memo": "x"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["details"]["provider_code"], "INVALID_AMOUNT");
    assert!(monitor.get_provider_metrics("lnbits").await.is_none());
}

#[tokio::test]
async fn test_create_invoice_provider_down() {
    let (app, monitor) = app_with(vec![FakeWallet::new("lnbits", false)]);

    let (status, body) = send(
        app,
        post_json("/api/lightning/invoice", json!({"amount": 1000})),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "PROVIDER_UNAVAILABLE");
    assert_eq!(body["error"]["details"]["upstream_status"], 502);

    let metrics = monitor.get_provider_metrics("lnbits").await.unwrap();
    assert_eq!(metrics.failed_invoices, 1);
}

#[tokio::test]
async fn test_create_invoice_without_providers() {
    let (app, _) = app_with(Vec::new());

    let (status, body) = send(
        app,
        post_json("/api/lightning/invoice", json!({"amount": 1000})),
    )
    .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn test_payment_status() {
    let (app, _) = app_with(vec![FakeWallet::new("lnbits", true)]);

    let (status, body) = send(
        app.clone(),
        get(&format!("/api/lightning/payments/{}", PAID_HASH)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["paid"], true);
    assert_eq!(body["status"], "paid");

    let (status, body) = send(app, get("/api/lightning/payments/deadbeef")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_status_reports_best_provider() {
    let (app, monitor) = app_with(vec![
        FakeWallet::new("primary", false),
        FakeWallet::new("backup", true),
    ]);
    monitor.check_all_providers().await;

    let (status, body) = send(app, get("/api/lightning/status")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["best_provider"], "backup");
    assert_eq!(body["monitoring"], false);
    assert_eq!(body["providers"].as_array().unwrap().len(), 2);
    assert_eq!(body["providers"][0]["name"], "primary");
    assert_eq!(body["providers"][0]["healthy"], false);
    assert_eq!(body["stats"]["providerCount"], 2);
    assert_eq!(body["stats"]["healthyProviderCount"], 1);
}

#[tokio::test]
async fn test_provider_metrics_endpoint() {
    let (app, _) = app_with(vec![FakeWallet::new("lnbits", true)]);

    let (status, _) = send(app.clone(), get("/api/lightning/providers/lnbits/metrics")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        app.clone(),
        post_json("/api/lightning/invoice", json!({"amount": 2100})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(app, get("/api/lightning/providers/lnbits/metrics")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalInvoices"], 1);
    assert_eq!(body["successRate"], 100.0);
}

#[tokio::test]
async fn test_health_follows_monitor() {
    let primary = FakeWallet::new("primary", true);
    let backup = FakeWallet::new("backup", false);
    let (app, monitor) = app_with(vec![primary.clone(), backup.clone()]);

    // Nothing probed yet
    let (status, _) = send(app.clone(), get("/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    monitor.check_all_providers().await;
    let (status, body) = send(app.clone(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["best_provider"], "primary");
    assert_eq!(body["checks"]["provider_backup"]["status"], "unhealthy");

    primary.up.store(false, Ordering::SeqCst);
    monitor.check_all_providers().await;
    let (status, body) = send(app, get("/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
}

#[tokio::test]
async fn test_metrics_without_recorder() {
    let (app, _) = app_with(vec![FakeWallet::new("lnbits", true)]);

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
