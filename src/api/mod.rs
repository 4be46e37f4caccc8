//! HTTP surface of the lightning subsystem.

use std::time::Instant;

use axum::extract::{MatchedPath, Request, State};
use axum::http::{header, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::health::health_check;
use crate::metrics;
use crate::state::AppState;

pub mod lightning;

/// Routes:
/// - `POST /api/lightning/invoice`: issue an invoice through the best provider.
/// - `GET /api/lightning/payments/:hash`: payment status by payment hash.
/// - `GET /api/lightning/status`: provider statuses and aggregate invoice stats.
/// - `GET /api/lightning/providers/:name/metrics`: invoice metrics of one
///   provider.
/// - `GET /health`: 503 when no provider is healthy.
/// - `GET /metrics`: Prometheus exposition.
pub fn create_router(state: AppState) -> Router {
    let lightning_router = Router::new()
        .route("/invoice", post(lightning::create_invoice))
        .route("/payments/:hash", get(lightning::payment_status))
        .route("/status", get(lightning::status))
        .route("/providers/:name/metrics", get(lightning::provider_metrics));

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api/lightning", lightning_router)
        .route("/health", get(health_check))
        .route("/metrics", get(render_metrics))
        .route_layer(middleware::from_fn(track_metrics))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn track_metrics(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let path = match req.extensions().get::<MatchedPath>() {
        Some(matched_path) => matched_path.as_str().to_owned(),
        None => req.uri().path().to_owned(),
    };
    let method = req.method().clone();

    let response = next.run(req).await;

    metrics::record_api_request(
        method.as_str(),
        &path,
        response.status().as_u16(),
        start.elapsed(),
    );

    response
}
