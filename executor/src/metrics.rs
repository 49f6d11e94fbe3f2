//! Ambient Prometheus + `/health` HTTP surface (§10.6), grounded on this
//! workspace's existing `Metrics`/axum registry pattern.

use axum::{routing::get, Router};
use prometheus::{Counter, Encoder, Gauge, Opts, Registry, TextEncoder};
use shared_models::{ModelError, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

pub struct Metrics {
    pub ticks_processed: Counter,
    pub signals_emitted: Counter,
    pub orders_submitted: Counter,
    pub orders_rejected_rate_limit: Counter,
    pub orders_rejected_cooldown: Counter,
    pub orders_rejected_exposure: Counter,
    pub orders_rejected_no_position: Counter,
    pub account_equity: Gauge,
    registry: Registry,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>> {
        let registry = Registry::new();

        let ticks_processed = Counter::with_opts(Opts::new(
            "ticks_processed_total",
            "Total number of trade ticks dispatched to strategies",
        ))
        .map_err(|e| ModelError::Config(e.to_string()))?;
        let signals_emitted = Counter::with_opts(Opts::new(
            "signals_emitted_total",
            "Total number of buy/sell signals emitted by strategies",
        ))
        .map_err(|e| ModelError::Config(e.to_string()))?;
        let orders_submitted = Counter::with_opts(Opts::new(
            "orders_submitted_total",
            "Total number of orders successfully submitted to the brokerage",
        ))
        .map_err(|e| ModelError::Config(e.to_string()))?;
        let orders_rejected_rate_limit = Counter::with_opts(Opts::new(
            "orders_rejected_rate_limit_total",
            "Orders rejected by the order manager's rate limit",
        ))
        .map_err(|e| ModelError::Config(e.to_string()))?;
        let orders_rejected_cooldown = Counter::with_opts(Opts::new(
            "orders_rejected_cooldown_total",
            "Orders rejected by the order manager's per-symbol cooldown",
        ))
        .map_err(|e| ModelError::Config(e.to_string()))?;
        let orders_rejected_exposure = Counter::with_opts(Opts::new(
            "orders_rejected_exposure_total",
            "Orders rejected by the position-exposure cap",
        ))
        .map_err(|e| ModelError::Config(e.to_string()))?;
        let orders_rejected_no_position = Counter::with_opts(Opts::new(
            "orders_rejected_no_position_total",
            "Sell orders rejected because no broker-reported position exists",
        ))
        .map_err(|e| ModelError::Config(e.to_string()))?;
        let account_equity = Gauge::with_opts(Opts::new(
            "account_equity_usd",
            "Last-refreshed brokerage account equity",
        ))
        .map_err(|e| ModelError::Config(e.to_string()))?;

        registry
            .register(Box::new(ticks_processed.clone()))
            .map_err(|e| ModelError::Config(e.to_string()))?;
        registry
            .register(Box::new(signals_emitted.clone()))
            .map_err(|e| ModelError::Config(e.to_string()))?;
        registry
            .register(Box::new(orders_submitted.clone()))
            .map_err(|e| ModelError::Config(e.to_string()))?;
        registry
            .register(Box::new(orders_rejected_rate_limit.clone()))
            .map_err(|e| ModelError::Config(e.to_string()))?;
        registry
            .register(Box::new(orders_rejected_cooldown.clone()))
            .map_err(|e| ModelError::Config(e.to_string()))?;
        registry
            .register(Box::new(orders_rejected_exposure.clone()))
            .map_err(|e| ModelError::Config(e.to_string()))?;
        registry
            .register(Box::new(orders_rejected_no_position.clone()))
            .map_err(|e| ModelError::Config(e.to_string()))?;
        registry
            .register(Box::new(account_equity.clone()))
            .map_err(|e| ModelError::Config(e.to_string()))?;

        Ok(Arc::new(Self {
            ticks_processed,
            signals_emitted,
            orders_submitted,
            orders_rejected_rate_limit,
            orders_rejected_cooldown,
            orders_rejected_exposure,
            orders_rejected_no_position,
            account_equity,
            registry,
        }))
    }
}

pub async fn serve(port: u16, metrics: Arc<Metrics>) {
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(metrics);

    let listener = match TcpListener::bind(format!("0.0.0.0:{}", port)).await {
        Ok(l) => l,
        Err(e) => {
            error!("failed to bind metrics server on port {}: {}", port, e);
            return;
        }
    };
    info!("metrics server listening on http://0.0.0.0:{}", port);
    if let Err(e) = axum::serve(listener, app).await {
        error!("metrics server exited: {}", e);
    }
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<Arc<Metrics>>,
) -> String {
    let encoder = TextEncoder::new();
    let families = metrics.registry.gather();
    encoder.encode_to_string(&families).unwrap_or_default()
}
