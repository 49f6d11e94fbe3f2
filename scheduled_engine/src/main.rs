mod batch_strategies;
mod engine;
mod http;

use anyhow::{Context, Result};
use clap::Parser;
use engine::ScheduledEngine;
use http::AppState;
use position_manager::StoreClient;
use shared_models::alpaca::AlpacaClient;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{interval, Duration};
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

const DEFAULT_HTTP_PORT: u16 = 8787;
const RUN_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[command(name = "scheduled_engine", about = "Paper-trading daily batch engine")]
struct Cli {
    /// DEBUG, INFO, WARNING, ERROR
    #[arg(long, default_value = "INFO")]
    log_level: String,

    /// Port for the /health, /status, /run HTTP surface
    #[arg(long, default_value_t = DEFAULT_HTTP_PORT)]
    http_port: u16,
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

    info!("starting scheduled engine");

    let api_key = std::env::var("ALPACA_API_KEY").context("ALPACA_API_KEY not set")?;
    let secret_key = std::env::var("ALPACA_SECRET_KEY").context("ALPACA_SECRET_KEY not set")?;
    let base_url = std::env::var("ALPACA_BASE_URL")
        .unwrap_or_else(|_| "https://paper-api.alpaca.markets".to_string());
    let data_url = std::env::var("ALPACA_DATA_URL")
        .unwrap_or_else(|_| "https://data.alpaca.markets".to_string());
    let store_url = std::env::var("DASHBOARD_STORE_URL").context("DASHBOARD_STORE_URL not set")?;
    let store_token = std::env::var("DASHBOARD_STORE_TOKEN").ok();

    let alpaca = AlpacaClient::new(base_url, data_url, api_key, secret_key);
    let store = StoreClient::live(store_url, store_token);
    let engine = ScheduledEngine::new(alpaca, store);

    let state = Arc::new(AppState {
        engine,
        last_run: RwLock::new(http::LastRun::default()),
    });

    let http_state = state.clone();
    let http_handle = tokio::spawn(async move {
        if let Err(e) = http::serve(cli.http_port, http_state).await {
            error!("http surface exited: {}", e);
        }
    });

    let mut ticker = interval(RUN_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let summary = state.engine.run_once().await;
                let mut last_run = state.last_run.write().await;
                last_run.at = Some(chrono::Utc::now());
                last_run.summary = Some(summary);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received shutdown signal");
                break;
            }
        }
    }

    http_handle.abort();
    Ok(())
}
