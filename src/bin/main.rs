use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use console::{style, Term};
use daznode::api::create_router;
use daznode::config::Config;
use daznode::lightning::{build_providers, LnbitsConfig, ProviderBackend, ProviderConfig};
use daznode::metrics::init_prometheus_metrics;
use daznode::monitor::{
    AlertNotifier, AlertWebhookConfig, LightningMonitor, LogNotifier, WebhookAlertNotifier,
};
use daznode::observability::{init_logging, LoggingConfig};
use daznode::service::InvoiceService;
use daznode::state::AppState;
use tracing::{error, info, warn};

#[derive(Parser)]
#[clap(version, about = "DazNode lightning invoice service")]
struct Cli {
    /// Data directory path (contains config and logs)
    #[clap(long, env = "DAZNODE_DATA_DIR", default_value = ".")]
    data_dir: PathBuf,

    /// Server address (overrides config)
    #[clap(long, env = "DAZNODE_ADDR")]
    addr: Option<String>,

    /// LNbits base URL (overrides or adds the `lnbits` provider)
    #[clap(long, env = "LNBITS_ENDPOINT")]
    lnbits_endpoint: Option<String>,

    /// LNbits invoice key
    #[clap(long, env = "LNBITS_API_KEY", hide_env_values = true)]
    lnbits_api_key: Option<String>,

    #[clap(long, env = "LNBITS_WALLET_ID")]
    lnbits_wallet_id: Option<String>,

    #[clap(long, env = "LNBITS_TIMEOUT_MS")]
    lnbits_timeout_ms: Option<u64>,

    #[clap(long, env = "LNBITS_RETRIES")]
    lnbits_retries: Option<u32>,

    /// Public base URL for payment webhooks (overrides config)
    #[clap(long, env = "WEBHOOK_BASE_URL")]
    webhook_base_url: Option<String>,

    /// Operator endpoint for critical alerts (overrides config)
    #[clap(long, env = "ALERT_WEBHOOK_URL")]
    alert_webhook_url: Option<String>,

    #[clap(long, env = "ALERT_WEBHOOK_SECRET", hide_env_values = true)]
    alert_webhook_secret: Option<String>,

    /// Seconds between provider health probes (overrides config)
    #[clap(long, env = "DAZNODE_MONITOR_INTERVAL")]
    monitor_interval: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli: Cli = Cli::parse();

    let log_config = LoggingConfig {
        level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        log_dir: cli.data_dir.join("logs"),
        console_output: std::env::var("NO_CONSOLE_LOG").is_err(),
        file_output: std::env::var("NO_FILE_LOG").is_err(),
        ..Default::default()
    };
    init_logging(log_config)?;

    info!("Starting DazNode lightning service");

    std::fs::create_dir_all(&cli.data_dir)?;
    let config_path = cli.data_dir.join("daznode.toml");

    let term = Term::stdout();
    let (mut config, created) = Config::load_or_create(&config_path)?;
    if created {
        term.write_line(&format!(
            "{}{}",
            style("Writing default configuration to ").yellow(),
            style(config_path.display()).white()
        ))?;
    }

    apply_cli_overrides(&mut config, cli);

    let providers = build_providers(&config.resolved_providers());
    if providers.is_empty() {
        warn!("Starting without lightning providers, invoice requests will fail");
    }

    let notifier: Arc<dyn AlertNotifier> = match &config.alert_webhook {
        Some(webhook) => match WebhookAlertNotifier::new(webhook.clone()) {
            Ok(notifier) => Arc::new(notifier),
            Err(e) => {
                error!(error = %e, "Invalid alert webhook, alerts will only be logged");
                Arc::new(LogNotifier)
            }
        },
        None => Arc::new(LogNotifier),
    };

    let monitor = Arc::new(LightningMonitor::new(
        providers.iter().map(|p| p.health.clone()).collect(),
        config.monitor_config(),
        notifier,
    ));
    monitor.start_monitoring().await;

    let metrics_handle = init_prometheus_metrics()?;
    let state = AppState::new(InvoiceService::new(providers, monitor.clone()))
        .with_metrics(metrics_handle);

    let app = create_router(state);
    let addr = config.http_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("daznode listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    monitor.stop_monitoring().await;
    info!("DazNode lightning service stopped");
    Ok(())
}

fn apply_cli_overrides(config: &mut Config, cli: Cli) {
    if let Some(addr) = cli.addr {
        if let Some((ip, port_str)) = addr.split_once(':') {
            config.http_bind_ip = ip.to_string();
            if let Ok(port) = port_str.parse::<u16>() {
                config.http_bind_port = port;
            }
        }
    }
    if let Some(interval) = cli.monitor_interval {
        config.monitor_interval_secs = interval;
    }
    if let Some(base_url) = cli.webhook_base_url {
        config.webhook_base_url = Some(base_url);
    }
    if let Some(url) = cli.alert_webhook_url {
        let mut webhook = config.alert_webhook.take().unwrap_or(AlertWebhookConfig {
            url: String::new(),
            secret: None,
            retry: Default::default(),
        });
        webhook.url = url;
        if cli.alert_webhook_secret.is_some() {
            webhook.secret = cli.alert_webhook_secret;
        }
        config.alert_webhook = Some(webhook);
    }

    let Some(endpoint) = cli.lnbits_endpoint else {
        return;
    };

    let index = match config.providers.iter().position(|p| p.name == "lnbits") {
        Some(index) => index,
        None => {
            let provider = ProviderConfig::lnbits("lnbits", LnbitsConfig::new(&endpoint, ""));
            config.providers.insert(0, provider);
            0
        }
    };

    let ProviderBackend::Lnbits(lnbits) = &mut config.providers[index].backend;
    lnbits.endpoint = endpoint;
    if cli.lnbits_api_key.is_some() {
        lnbits.api_key = cli.lnbits_api_key;
    }
    if cli.lnbits_wallet_id.is_some() {
        lnbits.wallet_id = cli.lnbits_wallet_id;
    }
    if let Some(timeout_ms) = cli.lnbits_timeout_ms {
        lnbits.timeout_ms = timeout_ms;
    }
    if let Some(retries) = cli.lnbits_retries {
        lnbits.retries = retries;
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    info!("Shutdown signal received");
}
