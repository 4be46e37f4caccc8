use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Log only
    Warning,
    /// Logged and delivered to the operator channel
    Critical,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub severity: AlertSeverity,
    pub provider: String,
    pub message: String,
    /// Failures among the evaluated window
    pub failures: usize,
    pub window: usize,
    pub average_duration_ms: f64,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        severity: AlertSeverity,
        provider: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            severity,
            provider: provider.into(),
            message: message.into(),
            failures: 0,
            window: 0,
            average_duration_ms: 0.0,
            timestamp: Utc::now(),
        }
    }
}

/// Delivers critical alerts to operators
#[async_trait]
pub trait AlertNotifier: Send + Sync {
    async fn notify(&self, alert: &Alert) -> anyhow::Result<()>;

    fn name(&self) -> &str;
}

/// Notifier used when no operator channel is configured
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl AlertNotifier for LogNotifier {
    async fn notify(&self, alert: &Alert) -> anyhow::Result<()> {
        info!(
            alert_id = %alert.id,
            provider = %alert.provider,
            severity = %alert.severity,
            "No operator channel configured, alert logged only"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Retry behaviour for alert webhook delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(rename = "initial-delay-ms", default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(rename = "max-delay-ms", default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(rename = "backoff-multiplier", default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_timeout_secs() -> u64 {
    10
}

/// Operator endpoint receiving critical alerts as JSON
#[derive(Clone, Serialize, Deserialize)]
pub struct AlertWebhookConfig {
    pub url: String,
    /// Optional secret for the HMAC-SHA256 signature header
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl fmt::Debug for AlertWebhookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertWebhookConfig")
            .field("url", &self.url)
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field("retry", &self.retry)
            .finish()
    }
}

/// Posts critical alerts to an operator webhook. Delivery runs in the
/// background so the invoice path never waits on it.
#[derive(Clone)]
pub struct WebhookAlertNotifier {
    client: Client,
    config: AlertWebhookConfig,
}

impl WebhookAlertNotifier {
    pub fn new(config: AlertWebhookConfig) -> anyhow::Result<Self> {
        Self::validate_url(&config.url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.retry.timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &AlertWebhookConfig {
        &self.config
    }

    fn validate_url(url: &str) -> anyhow::Result<()> {
        let parsed =
            reqwest::Url::parse(url).map_err(|e| anyhow::anyhow!("Invalid URL format: {}", e))?;

        match parsed.scheme() {
            "http" | "https" => {}
            scheme => return Err(anyhow::anyhow!("Unsupported URL scheme: {}", scheme)),
        }

        if parsed.host_str().is_none() {
            return Err(anyhow::anyhow!("URL must have a host"));
        }

        Ok(())
    }

    pub fn payload(alert: &Alert) -> serde_json::Value {
        serde_json::json!({
            "type": "lightning_provider_alert",
            "subject": format!("[DazNode] {} alert: {}", alert.severity, alert.provider),
            "alert": alert,
        })
    }

    async fn deliver(client: Client, config: AlertWebhookConfig, alert: Alert) -> anyhow::Result<()> {
        let payload = serde_json::to_string(&Self::payload(&alert))?;
        let retry = &config.retry;
        let max_attempts = retry.max_attempts.max(1);
        let mut delay_ms = retry.initial_delay_ms;

        for attempt in 1..=max_attempts {
            match Self::send(&client, &config, &payload, &alert.id).await {
                Ok(()) => {
                    info!(
                        alert_id = %alert.id,
                        attempt = attempt,
                        "Alert delivered to operator webhook"
                    );
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        alert_id = %alert.id,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        error = %e,
                        "Alert delivery attempt failed"
                    );

                    if attempt < max_attempts {
                        sleep(Duration::from_millis(delay_ms)).await;
                        delay_ms = ((delay_ms as f64 * retry.backoff_multiplier) as u64)
                            .min(retry.max_delay_ms);
                    }
                }
            }
        }

        Err(anyhow::anyhow!(
            "Alert delivery failed after {} attempts",
            max_attempts
        ))
    }

    async fn send(
        client: &Client,
        config: &AlertWebhookConfig,
        payload: &str,
        alert_id: &str,
    ) -> anyhow::Result<()> {
        let mut request = client
            .post(&config.url)
            .header("Content-Type", "application/json")
            .header("User-Agent", "daznode-alerts/1.0")
            .header("X-Alert-Id", alert_id)
            .body(payload.to_string());

        if let Some(secret) = &config.secret {
            request = request.header("X-Signature-SHA256", Self::sign(payload, secret)?);
        }

        let response = request.send().await?;
        if response.status().is_success() {
            debug!(alert_id = %alert_id, status = %response.status(), "Alert webhook accepted");
            Ok(())
        } else {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            Err(anyhow::anyhow!(
                "Alert webhook failed with status {}: {}",
                status,
                body
            ))
        }
    }

    /// `sha256=<hex hmac>` over the raw payload
    pub fn sign(payload: &str, secret: &str) -> anyhow::Result<String> {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .map_err(|e| anyhow::anyhow!("Invalid HMAC key: {}", e))?;
        mac.update(payload.as_bytes());
        Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
    }

    pub fn verify(payload: &str, signature: &str, secret: &str) -> bool {
        let Some(hex_signature) = signature.strip_prefix("sha256=") else {
            return false;
        };
        let Ok(bytes) = hex::decode(hex_signature) else {
            return false;
        };
        let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(payload.as_bytes());
        mac.verify_slice(&bytes).is_ok()
    }
}

#[async_trait]
impl AlertNotifier for WebhookAlertNotifier {
    async fn notify(&self, alert: &Alert) -> anyhow::Result<()> {
        let client = self.client.clone();
        let config = self.config.clone();
        let alert = alert.clone();

        tokio::spawn(async move {
            let alert_id = alert.id.clone();
            if let Err(e) = Self::deliver(client, config, alert).await {
                error!(alert_id = %alert_id, error = %e, "Failed to deliver alert");
            }
        });

        Ok(())
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn webhook_config(url: &str) -> AlertWebhookConfig {
        AlertWebhookConfig {
            url: url.to_string(),
            secret: Some("Op3rator-Alert-Secret!2024".to_string()),
            retry: RetryConfig::default(),
        }
    }

    #[test]
    fn test_retry_config_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.initial_delay_ms, 1000);
        assert_eq!(config.max_delay_ms, 30_000);
        assert_eq!(config.backoff_multiplier, 2.0);
        assert_eq!(config.timeout_secs, 10);
    }

    #[test]
    fn test_rejects_invalid_urls() {
        assert!(WebhookAlertNotifier::new(webhook_config("ftp://ops.example.com")).is_err());
        assert!(WebhookAlertNotifier::new(webhook_config("not a url")).is_err());
        assert!(WebhookAlertNotifier::new(webhook_config("https://ops.example.com/hook")).is_ok());
    }

    #[test]
    fn test_signature_round_trip() {
        let payload = r#"{"alert":"test"}"#;
        let secret = "Op3rator-Alert-Secret!2024";

        let signature = WebhookAlertNotifier::sign(payload, secret).unwrap();
        assert!(signature.starts_with("sha256="));
        assert_eq!(signature.len(), 71);

        assert!(WebhookAlertNotifier::verify(payload, &signature, secret));
        assert!(!WebhookAlertNotifier::verify(payload, &signature, "wrong"));
        assert!(!WebhookAlertNotifier::verify(payload, "sha256=zz", secret));
        assert!(!WebhookAlertNotifier::verify(payload, "garbage", secret));
    }

    #[test]
    fn test_payload_shape() {
        let alert = Alert::new(AlertSeverity::Critical, "lnbits", "4 of 5 invoices failed");
        let payload = WebhookAlertNotifier::payload(&alert);

        assert_eq!(payload["type"], "lightning_provider_alert");
        assert_eq!(payload["subject"], "[DazNode] critical alert: lnbits");
        assert_eq!(payload["alert"]["severity"], "critical");
        assert_eq!(payload["alert"]["provider"], "lnbits");
    }

    #[test]
    fn test_config_debug_redacts_secret() {
        let debug = format!("{:?}", webhook_config("https://ops.example.com"));
        assert!(!debug.contains("Op3rator"));
        assert!(debug.contains("[REDACTED]"));
    }
}
