//! Streaming engine orchestrator (§4.5): wires the market data stream to the
//! tick/bar buffer and strategy set, and runs the account-refresh and
//! stats-logging background activities alongside the receive loop on one
//! `tokio::select!`.
//!
//! Strategy and tick-buffer state never cross an `.await`, so they sit
//! behind `std::sync::Mutex`. The order manager's `submit`/`refresh_account`
//! are async, so it sits behind `tokio::sync::Mutex` instead — the one spot
//! where this differs from the rest of the process's locking.

use crate::metrics::Metrics;
use crate::order_manager::OrderManager;
use crate::strategies::Strategy;
use crate::tick_buffer::TickBuffer;
use market_data_gateway::{AlpacaStreamClient, StreamEvent};
use position_manager::StoreClient;
use shared_models::{Bar, Side, Signal};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

const ACCOUNT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);
const STATS_LOG_INTERVAL: Duration = Duration::from_secs(30);
const STREAM_CHANNEL_CAPACITY: usize = 1024;

pub struct Orchestrator {
    strategies: Mutex<Vec<Box<dyn Strategy>>>,
    buffer: Mutex<TickBuffer>,
    order_manager: tokio::sync::Mutex<OrderManager>,
    store: Option<StoreClient>,
    /// The streaming engine runs as a single fixed algorithm identity;
    /// per-algorithm attribution across many concurrent algorithms is the
    /// scheduled engine's job (§9 "two cash models coexist").
    algorithm_id: Uuid,
    metrics: Arc<Metrics>,
}

impl Orchestrator {
    pub fn new(
        strategies: Vec<Box<dyn Strategy>>,
        buffer: TickBuffer,
        order_manager: OrderManager,
        store: Option<StoreClient>,
        algorithm_id: Uuid,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            strategies: Mutex::new(strategies),
            buffer: Mutex::new(buffer),
            order_manager: tokio::sync::Mutex::new(order_manager),
            store,
            algorithm_id,
            metrics,
        }
    }

    fn symbols(&self) -> Vec<String> {
        let strategies = self.strategies.lock().unwrap();
        let mut symbols: Vec<String> = strategies
            .iter()
            .flat_map(|s| s.symbols().to_vec())
            .collect();
        symbols.sort();
        symbols.dedup();
        symbols
    }

    /// Runs until the stream closes or `shutdown` resolves. Drives the
    /// receive loop plus the two periodic activities on a single task via
    /// `tokio::select!`, per §5.
    pub async fn run(
        &self,
        mut client: AlpacaStreamClient,
        shutdown: impl std::future::Future<Output = ()>,
    ) {
        let symbols = self.symbols();
        if let Err(e) = client.connect().await {
            warn!("failed to connect to market data stream: {}", e);
            return;
        }
        if let Err(e) = client.subscribe(&symbols, &symbols, &[]).await {
            warn!("failed to subscribe to market data stream: {}", e);
            return;
        }

        let (tx, mut rx) = mpsc::channel::<StreamEvent>(STREAM_CHANNEL_CAPACITY);
        let stream_task = tokio::spawn(async move {
            if let Err(e) = client.run(tx).await {
                warn!("stream client exited: {}", e);
            }
            client
        });

        let mut account_refresh = tokio::time::interval(ACCOUNT_REFRESH_INTERVAL);
        let mut stats_log = tokio::time::interval(STATS_LOG_INTERVAL);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                event = rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => {
                            info!("stream receive channel closed");
                            break;
                        }
                    }
                }
                _ = account_refresh.tick() => {
                    self.order_manager.lock().await.refresh_account().await;
                }
                _ = stats_log.tick() => {
                    self.log_stats();
                }
                _ = &mut shutdown => {
                    info!("shutdown requested, stopping orchestrator");
                    break;
                }
            }
        }

        match stream_task.await {
            Ok(mut client) => client.close().await,
            Err(e) => warn!("stream task join failed: {}", e),
        }
    }

    fn log_stats(&self) {
        info!(
            ticks_processed = self.metrics.ticks_processed.get(),
            signals_emitted = self.metrics.signals_emitted.get(),
            orders_submitted = self.metrics.orders_submitted.get(),
            "streaming engine stats"
        );
    }

    async fn handle_event(&self, event: StreamEvent) {
        match event {
            StreamEvent::Trade {
                symbol,
                price,
                size,
                timestamp,
            } => self.handle_tick(&symbol, price, size, timestamp).await,
            StreamEvent::Bar { symbol, bar } => self.handle_bar(&symbol, &bar).await,
            StreamEvent::Quote { .. } => {}
        }
    }

    async fn handle_tick(
        &self,
        symbol: &str,
        price: f64,
        size: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    ) {
        let indicators = {
            let mut buffer = self.buffer.lock().unwrap();
            buffer.add(symbol, price, size, Some(timestamp));
            buffer.get_indicators(symbol)
        };
        self.metrics.ticks_processed.inc();

        let signals = self.collect_signals(symbol, |strategy, indicators| {
            strategy.on_tick(symbol, price, indicators)
        }, &indicators);

        for (idx, signal) in signals {
            self.handle_signal(idx, signal).await;
        }
    }

    async fn handle_bar(&self, symbol: &str, bar: &Bar) {
        let indicators = {
            let buffer = self.buffer.lock().unwrap();
            buffer.get_indicators(symbol)
        };

        let signals = self.collect_signals(symbol, |strategy, indicators| {
            strategy.on_bar(symbol, bar, indicators)
        }, &indicators);

        for (idx, signal) in signals {
            self.handle_signal(idx, signal).await;
        }
    }

    fn collect_signals(
        &self,
        symbol: &str,
        mut dispatch: impl FnMut(&mut Box<dyn Strategy>, &crate::tick_buffer::Indicators) -> Option<Signal>,
        indicators: &crate::tick_buffer::Indicators,
    ) -> Vec<(usize, Signal)> {
        let mut strategies = self.strategies.lock().unwrap();
        let mut out = Vec::new();
        for (idx, strategy) in strategies.iter_mut().enumerate() {
            if !strategy.enabled() || !strategy.symbols().iter().any(|s| s == symbol) {
                continue;
            }
            if let Some(signal) = dispatch(strategy, indicators) {
                out.push((idx, signal));
            }
        }
        out
    }

    async fn handle_signal(&self, strategy_idx: usize, signal: Signal) {
        self.metrics.signals_emitted.inc();

        let (cash_allocation, position_size_pct) = {
            let strategies = self.strategies.lock().unwrap();
            let strategy = &strategies[strategy_idx];
            (strategy.cash_allocation(), strategy.position_size_pct())
        };
        let dollar_amount = match signal.side {
            Side::Buy => cash_allocation * position_size_pct,
            Side::Sell => 0.0,
        };

        let order = self
            .order_manager
            .lock()
            .await
            .submit(&signal, dollar_amount)
            .await;

        let Some(order) = order else { return };

        let new_qty = match signal.side {
            Side::Buy => order
                .filled_qty()
                .unwrap_or_else(|| dollar_amount / signal.price),
            Side::Sell => 0.0,
        };

        {
            let mut strategies = self.strategies.lock().unwrap();
            strategies[strategy_idx].update_position(&signal.symbol, new_qty);
        }

        if let Some(store) = &self.store {
            if let Err(e) = store
                .record_trade_fill(self.algorithm_id, &signal, &order)
                .await
            {
                warn!("failed to record fill on dashboard store: {}", e);
            }
        }
    }
}
