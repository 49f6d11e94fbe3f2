mod config;
mod metrics;
mod order_manager;
mod orchestrator;
mod strategies;
mod tick_buffer;

use anyhow::{Context, Result};
use clap::Parser;
use market_data_gateway::AlpacaStreamClient;
use order_manager::{OrderManager, SafetyConfig};
use orchestrator::Orchestrator;
use position_manager::StoreClient;
use shared_models::alpaca::AlpacaClient;
use std::path::PathBuf;
use std::sync::Arc;
use tick_buffer::TickBuffer;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const DEFAULT_METRICS_PORT: u16 = 9184;
const DEFAULT_TICK_BUFFER_MAX_AGE_SECONDS: i64 = 300;

#[derive(Parser, Debug)]
#[command(name = "executor", about = "Paper-trading streaming engine")]
struct Cli {
    /// Directory holding settings.yaml and strategies.yaml
    #[arg(long, default_value = "config")]
    config: PathBuf,

    /// DEBUG, INFO, WARNING, ERROR
    #[arg(long, default_value = "INFO")]
    log_level: String,
}

fn level_filter(level: &str) -> LevelFilter {
    match level.to_uppercase().as_str() {
        "DEBUG" => LevelFilter::DEBUG,
        "WARNING" | "WARN" => LevelFilter::WARN,
        "ERROR" => LevelFilter::ERROR,
        _ => LevelFilter::INFO,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::builder()
        .with_default_directive(level_filter(&cli.log_level).into())
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).json().init();

    info!("starting streaming engine");

    let settings = config::load_settings(&cli.config).context("failed to load settings.yaml")?;
    let strategy_entries =
        config::load_strategies(&cli.config).context("failed to load strategies.yaml")?;

    let strategies: Vec<Box<dyn strategies::Strategy>> = strategy_entries
        .into_iter()
        .map(strategies::build_strategy)
        .collect::<shared_models::Result<_>>()
        .context("failed to build strategies from strategies.yaml")?;

    let alpaca = AlpacaClient::new(
        settings.alpaca.base_url.clone(),
        settings.alpaca.data_url.clone(),
        settings.alpaca.api_key.clone(),
        settings.alpaca.secret_key.clone(),
    );

    let safety = SafetyConfig {
        max_position_pct: settings.safety.max_position_pct,
        max_orders_per_minute: settings.safety.max_orders_per_minute,
        cooldown_seconds: settings.safety.cooldown_seconds,
        paper_only: settings.safety.paper_only,
    };

    let metrics = metrics::Metrics::new().context("failed to initialize metrics registry")?;

    let order_manager = OrderManager::new(alpaca, safety, metrics.clone())
        .context("order manager startup guard failed")?;

    let buffer = TickBuffer::new(DEFAULT_TICK_BUFFER_MAX_AGE_SECONDS);

    let store = match (
        std::env::var("DASHBOARD_STORE_URL").ok(),
        std::env::var("DASHBOARD_STORE_TOKEN").ok(),
    ) {
        (Some(url), token) => Some(StoreClient::live(url, token)),
        (None, _) => {
            info!("DASHBOARD_STORE_URL unset, running without dashboard sync");
            None
        }
    };

    let algorithm_id = std::env::var("EXECUTOR_ALGORITHM_ID")
        .ok()
        .and_then(|s| Uuid::parse_str(&s).ok())
        .unwrap_or_else(Uuid::new_v4);

    let orchestrator = Arc::new(Orchestrator::new(
        strategies,
        buffer,
        order_manager,
        store,
        algorithm_id,
        metrics.clone(),
    ));

    let metrics_port: u16 = std::env::var("METRICS_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_METRICS_PORT);
    let metrics_handle = tokio::spawn(metrics::serve(metrics_port, metrics));

    let stream_client = AlpacaStreamClient::new(
        settings.alpaca.api_key.clone(),
        settings.alpaca.secret_key.clone(),
        settings.alpaca.data_url.clone(),
    );

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!("received shutdown signal");
    };
    orchestrator.run(stream_client, shutdown).await;

    metrics_handle.abort();
    if let Err(e) = metrics_handle.await {
        if !e.is_cancelled() {
            error!("metrics server task failed: {}", e);
        }
    }

    Ok(())
}
