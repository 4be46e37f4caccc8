use std::collections::BTreeMap;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::monitor::{LightningMonitor, ProviderStatus};
use crate::state::AppState;

/// Overall health state of a component or the entire service
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// Component is functioning normally
    Healthy,
    /// Component has issues but the service can still issue invoices
    Degraded,
    /// Component is not functional
    Unhealthy,
}

/// Health of one provider as seen by the monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: HealthState,
    pub message: Option<String>,
    /// When the provider was last probed
    pub last_check: Option<DateTime<Utc>>,
    pub response_time_ms: Option<u64>,
    pub uptime: Option<f64>,
}

impl ComponentHealth {
    pub fn healthy(message: impl Into<String>) -> Self {
        Self::with_state(HealthState::Healthy, message)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with_state(HealthState::Degraded, message)
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with_state(HealthState::Unhealthy, message)
    }

    fn with_state(status: HealthState, message: impl Into<String>) -> Self {
        Self {
            status,
            message: Some(message.into()),
            last_check: None,
            response_time_ms: None,
            uptime: None,
        }
    }

    /// Map the monitor's latest probe result
    pub fn from_status(status: &ProviderStatus) -> Self {
        let component = if status.healthy {
            Self::healthy(format!("Provider {} is healthy", status.name))
        } else {
            Self::unhealthy(format!(
                "Provider {} is unreachable: {}",
                status.name,
                status.last_error.as_deref().unwrap_or("unknown error")
            ))
        };

        Self {
            last_check: Some(status.last_check),
            response_time_ms: status.response_time_ms,
            uptime: status.uptime,
            ..component
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: HealthState,
    pub version: String,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
    pub best_provider: Option<String>,
    pub checks: BTreeMap<String, ComponentHealth>,
    pub summary: HealthSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSummary {
    pub total_checks: usize,
    pub healthy_count: usize,
    pub degraded_count: usize,
    pub unhealthy_count: usize,
    pub total_check_duration_ms: u64,
}

/// Service health derived from the monitor's latest probes. Never probes
/// providers itself.
pub async fn health_check(State(state): State<AppState>) -> Response {
    let start_time = Instant::now();
    let monitor = state.service.monitor();

    debug!("Starting health check");

    let checks = collect_provider_health(monitor).await;
    let overall_status = determine_overall_health(&checks);
    let summary = calculate_health_summary(&checks, start_time);

    let health_status = HealthStatus {
        status: overall_status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime().as_secs(),
        timestamp: Utc::now(),
        best_provider: monitor.get_best_provider().await,
        checks,
        summary,
    };

    info!(
        overall_status = ?health_status.status,
        total_checks = health_status.summary.total_checks,
        healthy_count = health_status.summary.healthy_count,
        unhealthy_count = health_status.summary.unhealthy_count,
        "Health check completed"
    );

    match health_status.status {
        HealthState::Healthy => (StatusCode::OK, Json(health_status)).into_response(),
        HealthState::Degraded => {
            warn!("Some lightning providers are unhealthy, service still operational");
            (StatusCode::OK, Json(health_status)).into_response()
        }
        HealthState::Unhealthy => {
            error!("No healthy lightning provider, returning 503 Service Unavailable");
            (StatusCode::SERVICE_UNAVAILABLE, Json(health_status)).into_response()
        }
    }
}

async fn collect_provider_health(monitor: &LightningMonitor) -> BTreeMap<String, ComponentHealth> {
    let mut checks = BTreeMap::new();

    for name in monitor.provider_names() {
        let component = match monitor.get_provider_status(&name).await {
            Some(status) => ComponentHealth::from_status(&status),
            None => ComponentHealth::degraded(format!("Provider {} not checked yet", name)),
        };
        checks.insert(format!("provider_{}", name), component);
    }

    checks
}

/// Healthy when every provider is, unhealthy when none is, degraded otherwise
fn determine_overall_health(checks: &BTreeMap<String, ComponentHealth>) -> HealthState {
    let healthy = checks
        .values()
        .filter(|c| c.status == HealthState::Healthy)
        .count();

    if healthy == 0 {
        HealthState::Unhealthy
    } else if healthy == checks.len() {
        HealthState::Healthy
    } else {
        HealthState::Degraded
    }
}

fn calculate_health_summary(
    checks: &BTreeMap<String, ComponentHealth>,
    start_time: Instant,
) -> HealthSummary {
    let count = |state: HealthState| checks.values().filter(|c| c.status == state).count();

    HealthSummary {
        total_checks: checks.len(),
        healthy_count: count(HealthState::Healthy),
        degraded_count: count(HealthState::Degraded),
        unhealthy_count: count(HealthState::Unhealthy),
        total_check_duration_ms: start_time.elapsed().as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn checks(states: &[HealthState]) -> BTreeMap<String, ComponentHealth> {
        states
            .iter()
            .enumerate()
            .map(|(i, state)| {
                (
                    format!("provider_{}", i),
                    ComponentHealth::with_state(*state, "test"),
                )
            })
            .collect()
    }

    #[test]
    fn test_determine_overall_health() {
        use HealthState::*;

        assert_eq!(determine_overall_health(&checks(&[Healthy, Healthy])), Healthy);
        assert_eq!(determine_overall_health(&checks(&[Healthy, Unhealthy])), Degraded);
        assert_eq!(determine_overall_health(&checks(&[Healthy, Degraded])), Degraded);
        assert_eq!(determine_overall_health(&checks(&[Degraded, Unhealthy])), Unhealthy);
        assert_eq!(determine_overall_health(&checks(&[])), Unhealthy);
    }

    #[test]
    fn test_component_from_status() {
        let healthy = ComponentHealth::from_status(&ProviderStatus::healthy(
            "lnbits",
            Duration::from_millis(42),
        ));
        assert_eq!(healthy.status, HealthState::Healthy);
        assert_eq!(healthy.response_time_ms, Some(42));
        assert!(healthy.last_check.is_some());

        let unhealthy = ComponentHealth::from_status(&ProviderStatus::unhealthy(
            "lnbits",
            "Health check failed",
            None,
        ));
        assert_eq!(unhealthy.status, HealthState::Unhealthy);
        assert!(unhealthy
            .message
            .unwrap()
            .contains("Health check failed"));
    }

    #[test]
    fn test_health_summary_calculation() {
        use HealthState::*;

        let summary =
            calculate_health_summary(&checks(&[Healthy, Healthy, Degraded, Unhealthy]), Instant::now());
        assert_eq!(summary.total_checks, 4);
        assert_eq!(summary.healthy_count, 2);
        assert_eq!(summary.degraded_count, 1);
        assert_eq!(summary.unhealthy_count, 1);
    }
}
