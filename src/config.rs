use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::lightning::{ProviderBackend, ProviderConfig};
use crate::monitor::{AlertWebhookConfig, MonitorConfig};

/// Configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// HTTP server bind IP address
    #[serde(rename = "http-bind-ip", default = "default_bind_ip")]
    pub http_bind_ip: String,

    /// HTTP server bind port
    #[serde(rename = "http-bind-port", default = "default_bind_port")]
    pub http_bind_port: u16,

    /// Seconds between provider health probe rounds
    #[serde(
        rename = "monitor-interval-secs",
        default = "default_monitor_interval_secs"
    )]
    pub monitor_interval_secs: u64,

    /// Public base URL payment webhooks are delivered to. Applied to every
    /// provider that does not set its own.
    #[serde(rename = "webhook-base-url", default)]
    pub webhook_base_url: Option<String>,

    /// Lightning providers in preference order
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    /// Operator endpoint for critical alerts. Alerts are only logged when
    /// unset.
    #[serde(rename = "alert-webhook", default)]
    pub alert_webhook: Option<AlertWebhookConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_bind_ip: default_bind_ip(),
            http_bind_port: default_bind_port(),
            monitor_interval_secs: default_monitor_interval_secs(),
            webhook_base_url: None,
            providers: Vec::new(),
            alert_webhook: None,
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to TOML file atomically
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;

        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, contents)?;

        match std::fs::rename(&temp_path, path) {
            Ok(_) => Ok(()),
            Err(e) => {
                let _ = std::fs::remove_file(&temp_path);
                Err(e.into())
            }
        }
    }

    /// Load the configuration, writing a default one when the file does not
    /// exist yet. The flag is true when the file was created.
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<(Self, bool)> {
        let path = path.as_ref();

        if path.exists() {
            return Ok((Self::load_from_file(path)?, false));
        }

        let config = Self::default();
        config.save_to_file(path)?;
        Ok((config, true))
    }

    /// Get the complete HTTP server address
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.http_bind_ip, self.http_bind_port)
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            check_interval: Duration::from_secs(self.monitor_interval_secs.max(1)),
            ..Default::default()
        }
    }

    /// Provider configs with the global webhook base URL filled in
    pub fn resolved_providers(&self) -> Vec<ProviderConfig> {
        self.providers
            .iter()
            .cloned()
            .map(|mut provider| {
                match &mut provider.backend {
                    ProviderBackend::Lnbits(lnbits) => {
                        if lnbits.webhook_base_url.is_none() {
                            lnbits.webhook_base_url = self.webhook_base_url.clone();
                        }
                    }
                }
                provider
            })
            .collect()
    }
}

fn default_bind_ip() -> String {
    if std::env::var("DOCKER_CONTAINER").is_ok()
        || std::path::Path::new("/.dockerenv").exists()
        || std::env::var("KUBERNETES_SERVICE_HOST").is_ok()
    {
        "0.0.0.0".to_string()
    } else {
        "127.0.0.1".to_string()
    }
}

fn default_bind_port() -> u16 {
    3000
}

fn default_monitor_interval_secs() -> u64 {
    30
}
