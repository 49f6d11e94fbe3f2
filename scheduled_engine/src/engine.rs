//! Per-invocation evaluation loop (§4.6): one pass over every enabled
//! algorithm, dispatching to the matching batch strategy routine and
//! routing any resulting signal through the scheduled engine's own
//! `submit_order`, which sizes and accounts against the algorithm's cash
//! ledger rather than broker buying power (§9 "two cash models coexist").

use crate::batch_strategies::{
    buy_and_hold_signal, mean_reversion_signal, momentum_signal, rsi_signal,
    sma_crossover_signal, BatchSignal,
};
use chrono::{NaiveDate, Timelike, Utc};
use position_manager::StoreClient;
use shared_models::alpaca::AlpacaClient;
use shared_models::{Algorithm, Position, Side, Signal, Snapshot, SnapshotPosition, StrategyKind};
use tracing::{info, warn};
use uuid::Uuid;

const BAR_LOOKBACK_PADDING: u32 = 5;

pub struct ScheduledEngine {
    alpaca: AlpacaClient,
    store: StoreClient,
}

#[derive(Debug, Default, serde::Serialize, Clone)]
pub struct RunSummary {
    pub market_open: bool,
    pub algorithms_evaluated: usize,
    pub errors: Vec<String>,
}

/// What `submit_order` sizes quantity from — a percentage of the
/// algorithm's own cash (buy) or a fixed quantity read off the Position row
/// (sell). The source dispatches on the Python value's type; here the call
/// site states its intent directly.
enum OrderSize {
    CashPct(f64),
    Quantity(f64),
}

impl ScheduledEngine {
    pub fn new(alpaca: AlpacaClient, store: StoreClient) -> Self {
        Self { alpaca, store }
    }

    /// One full evaluation pass (§4.6 steps 1-3); used by both the cron
    /// cadence and the manual `/run` trigger.
    pub async fn run_once(&self) -> RunSummary {
        let market_open = self.is_market_open().await;
        if !market_open {
            if Utc::now().minute() == 0 {
                self.create_snapshots_for_all("scheduled").await;
            }
            return RunSummary {
                market_open: false,
                algorithms_evaluated: 0,
                errors: Vec::new(),
            };
        }

        let algorithms = match self.store.list_enabled_algorithms().await {
            Ok(algos) => algos,
            Err(e) => {
                warn!("failed to fetch enabled algorithms: {}", e);
                return RunSummary {
                    market_open: true,
                    algorithms_evaluated: 0,
                    errors: vec![e.to_string()],
                };
            }
        };

        let mut errors = Vec::new();
        for algorithm in &algorithms {
            if let Err(e) = self.run_algorithm(algorithm).await {
                warn!(algorithm = %algorithm.name, "error running algorithm: {}", e);
                errors.push(format!("{}: {}", algorithm.name, e));
            }
        }

        RunSummary {
            market_open: true,
            algorithms_evaluated: algorithms.len(),
            errors,
        }
    }

    async fn is_market_open(&self) -> bool {
        match self.alpaca.get_clock().await {
            Ok(clock) => clock.is_open,
            Err(e) => {
                warn!("error checking market status: {}", e);
                false
            }
        }
    }

    async fn create_snapshots_for_all(&self, trigger: &str) {
        let algorithms = match self.store.list_enabled_algorithms().await {
            Ok(a) => a,
            Err(e) => {
                warn!("error fetching algorithms for snapshot sweep: {}", e);
                return;
            }
        };
        let count = algorithms.len();
        for algorithm in algorithms {
            if let Err(e) = self.create_snapshot(algorithm.id, trigger).await {
                warn!(algorithm = %algorithm.name, "error creating snapshot: {}", e);
            }
        }
        info!(count, trigger, "created snapshots");
    }

    async fn run_algorithm(&self, algorithm: &Algorithm) -> shared_models::Result<()> {
        for symbol in &algorithm.symbols {
            let limit = lookback_limit(algorithm) + BAR_LOOKBACK_PADDING;
            let bars = self.alpaca.get_bars_or_synthetic(symbol, limit).await?;
            if bars.is_empty() {
                continue;
            }
            let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
            let position = self.store.get_position(algorithm.id, symbol).await?;
            let has_position = position.is_some();

            let signal = match algorithm.strategy_kind {
                StrategyKind::SmaCrossover => {
                    sma_crossover_signal(&closes, &algorithm.strategy_parameters, has_position)
                }
                StrategyKind::Rsi => {
                    rsi_signal(&closes, &algorithm.strategy_parameters, has_position)
                }
                StrategyKind::Momentum => {
                    momentum_signal(&closes, &algorithm.strategy_parameters, has_position)
                }
                StrategyKind::MeanReversion => {
                    mean_reversion_signal(&closes, &algorithm.strategy_parameters, has_position)
                }
                StrategyKind::BuyAndHold => buy_and_hold_signal(has_position),
            };

            let Some(BatchSignal { side, reason }) = signal else {
                continue;
            };

            let size = match side {
                Side::Buy => OrderSize::CashPct(
                    algorithm
                        .strategy_parameters
                        .get("position_size_pct")
                        .copied()
                        .unwrap_or(0.1),
                ),
                Side::Sell => OrderSize::Quantity(
                    position.map(|p| p.quantity).unwrap_or(0.0),
                ),
            };

            self.submit_order(algorithm, symbol, side, size, &reason)
                .await?;
        }
        Ok(())
    }

    async fn submit_order(
        &self,
        algorithm: &Algorithm,
        symbol: &str,
        side: Side,
        size: OrderSize,
        notes: &str,
    ) -> shared_models::Result<()> {
        let cash = self.store.get_algorithm_cash(algorithm.id).await?;
        let bars = self.alpaca.get_bars_or_synthetic(symbol, 1).await?;
        let Some(current_price) = bars.last().map(|b| b.close) else {
            return Ok(());
        };

        let quantity = match size {
            OrderSize::CashPct(pct) => ((cash * pct) / current_price).floor(),
            OrderSize::Quantity(qty) => qty.floor(),
        };
        if quantity <= 0.0 {
            return Ok(());
        }

        if side == Side::Buy {
            let estimated_cost = quantity * current_price;
            if estimated_cost > cash {
                info!(
                    algorithm = %algorithm.name,
                    need = estimated_cost,
                    have = cash,
                    "insufficient cash for order"
                );
                return Ok(());
            }
        }

        let side_str = side.to_string();
        let order = shared_models::alpaca::NewOrder::market_qty(symbol, &side_str, quantity);
        let response = self.alpaca.submit_order(&order).await?;

        let fill_price = response.filled_avg_price().unwrap_or(current_price);
        let signal = Signal::new(side, symbol, algorithm.name.clone(), notes, fill_price);

        self.store
            .record_trade(
                algorithm.id,
                &signal,
                &response.id,
                &response.status,
                Some(fill_price),
                Some(quantity),
            )
            .await;

        match side {
            Side::Buy => self.apply_buy(algorithm.id, symbol, quantity, fill_price).await?,
            Side::Sell => {
                self.apply_sell(algorithm.id, symbol, quantity, fill_price)
                    .await?
            }
        }

        self.create_snapshot(algorithm.id, "trade").await?;
        info!(algorithm = %algorithm.name, %symbol, %side_str, quantity, "order submitted");
        Ok(())
    }

    async fn apply_buy(
        &self,
        algorithm_id: Uuid,
        symbol: &str,
        quantity: f64,
        fill_price: f64,
    ) -> shared_models::Result<()> {
        let existing = self.store.get_position(algorithm_id, symbol).await?;
        let position = match existing {
            Some(existing) => {
                let new_qty = existing.quantity + quantity;
                let old_value = existing.quantity * existing.avg_entry_price;
                let new_value = quantity * fill_price;
                let new_avg = if new_qty > 0.0 {
                    (old_value + new_value) / new_qty
                } else {
                    0.0
                };
                Position {
                    algorithm_id,
                    symbol: symbol.to_string(),
                    quantity: new_qty,
                    avg_entry_price: new_avg,
                    market_value: None,
                }
            }
            None => Position {
                algorithm_id,
                symbol: symbol.to_string(),
                quantity,
                avg_entry_price: fill_price,
                market_value: None,
            },
        };
        self.store.upsert_position(&position).await?;

        let cost = quantity * fill_price;
        let current_cash = self.store.get_algorithm_cash(algorithm_id).await?;
        let new_cash = current_cash - cost;
        self.store.update_algorithm_cash(algorithm_id, new_cash).await?;
        Ok(())
    }

    async fn apply_sell(
        &self,
        algorithm_id: Uuid,
        symbol: &str,
        quantity: f64,
        fill_price: f64,
    ) -> shared_models::Result<()> {
        let Some(existing) = self.store.get_position(algorithm_id, symbol).await? else {
            return Ok(());
        };
        let new_qty = existing.quantity - quantity;
        if new_qty <= 0.0 {
            self.store.delete_position(algorithm_id, symbol).await?;
        } else {
            self.store
                .upsert_position(&Position {
                    quantity: new_qty,
                    ..existing
                })
                .await?;
        }

        let proceeds = quantity * fill_price;
        let current_cash = self.store.get_algorithm_cash(algorithm_id).await?;
        let new_cash = current_cash + proceeds;
        self.store.update_algorithm_cash(algorithm_id, new_cash).await?;
        Ok(())
    }

    /// Values the whole book and writes a Snapshot row (§4.6 step 5, §4.7.1).
    /// `daily_pnl` is kept at 0 for parity with the source, which never
    /// implements the previous-day delta (§9, recorded in DESIGN.md).
    async fn create_snapshot(&self, algorithm_id: Uuid, trigger: &str) -> shared_models::Result<()> {
        let cash = self.store.get_algorithm_cash(algorithm_id).await?;
        let positions = self.store.list_positions(algorithm_id).await?;

        let mut snapshot_positions = Vec::with_capacity(positions.len());
        let mut total_position_value = 0.0;
        let mut total_cost_basis = 0.0;

        for position in positions {
            let bars = self
                .alpaca
                .get_bars_or_synthetic(&position.symbol, 1)
                .await
                .unwrap_or_default();
            let current_price = bars.last().map(|b| b.close).unwrap_or(position.avg_entry_price);
            let market_value = position.quantity * current_price;
            let cost_basis = position.quantity * position.avg_entry_price;
            total_position_value += market_value;
            total_cost_basis += cost_basis;

            snapshot_positions.push(SnapshotPosition {
                symbol: position.symbol,
                quantity: position.quantity,
                avg_entry_price: position.avg_entry_price,
                current_price,
                market_value: round2(market_value),
                unrealized_pnl: round2(market_value - cost_basis),
            });
        }

        let total_equity = cash + total_position_value;
        let total_pnl = total_equity - total_cost_basis;

        let snapshot = Snapshot {
            id: Uuid::new_v4(),
            algorithm_id,
            snapshot_date: today(),
            equity: round2(total_equity),
            cash: round2(cash),
            buying_power: round2(cash),
            daily_pnl: 0.0,
            total_pnl: round2(total_pnl),
            positions: snapshot_positions,
            trigger: trigger.to_string(),
        };
        self.store.create_snapshot(&snapshot).await
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn lookback_limit(algorithm: &Algorithm) -> u32 {
    let params = &algorithm.strategy_parameters;
    let candidate = match algorithm.strategy_kind {
        StrategyKind::SmaCrossover => params.get("long_period").copied().unwrap_or(50.0),
        StrategyKind::Rsi => params.get("period").copied().unwrap_or(14.0),
        StrategyKind::Momentum => params.get("lookback_days").copied().unwrap_or(20.0),
        StrategyKind::MeanReversion => params.get("window_bars").copied().unwrap_or(20.0),
        StrategyKind::BuyAndHold => 1.0,
    };
    candidate.max(1.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc as ChronoUtc;
    use std::collections::HashMap;

    fn test_algorithm(cash: f64, position_size_pct: f64) -> Algorithm {
        let mut params = HashMap::new();
        params.insert("position_size_pct".to_string(), position_size_pct);
        Algorithm {
            id: Uuid::new_v4(),
            name: "test-algo".to_string(),
            description: String::new(),
            strategy_kind: StrategyKind::BuyAndHold,
            strategy_parameters: params,
            symbols: vec!["AAPL".to_string()],
            enabled: true,
            cash,
            created_at: ChronoUtc::now(),
            updated_at: ChronoUtc::now(),
        }
    }

    fn bars_body(price: f64) -> String {
        format!(
            r#"{{"bars":[{{"o":{p},"h":{p},"l":{p},"c":{p},"v":10,"t":"2026-01-01T00:00:00Z"}}]}}"#,
            p = price
        )
    }

    fn order_body(id: &str) -> String {
        format!(r#"{{"id":"{id}","status":"filled","filled_avg_price":null,"filled_qty":null}}"#)
    }

    /// Scenario 7 buy leg (§8): cash=1000, BUY @ 100 with position_size_pct
    /// 0.5 commits qty=5 and debits cash to exactly 500.
    #[tokio::test]
    async fn buy_leg_debits_cash_and_opens_position() {
        let mut server = mockito::Server::new_async().await;
        let _bars_mock = server
            .mock("GET", mockito::Matcher::Regex(r"^/v2/stocks/AAPL/bars".to_string()))
            .with_status(200)
            .with_body(bars_body(100.0))
            .create_async()
            .await;
        let _order_mock = server
            .mock("POST", "/v2/orders")
            .with_status(200)
            .with_body(order_body("order-1"))
            .create_async()
            .await;

        let alpaca = AlpacaClient::new(server.url(), server.url(), "key", "secret");
        let store = StoreClient::mock();
        let algorithm = test_algorithm(1000.0, 0.5);
        store.seed_algorithm(algorithm.clone()).await;
        let engine = ScheduledEngine::new(alpaca, store);

        engine
            .submit_order(
                &algorithm,
                "AAPL",
                Side::Buy,
                OrderSize::CashPct(0.5),
                "test buy",
            )
            .await
            .unwrap();

        let cash = engine.store.get_algorithm_cash(algorithm.id).await.unwrap();
        assert_eq!(cash, 500.0);
        let position = engine
            .store
            .get_position(algorithm.id, "AAPL")
            .await
            .unwrap()
            .expect("position should exist after buy");
        assert_eq!(position.quantity, 5.0);
        assert_eq!(position.avg_entry_price, 100.0);
    }

    /// Scenario 7 sell leg (§8): an existing qty=5/avg=100 position sold in
    /// full @ 110 credits cash by exactly 550 and deletes the position row.
    #[tokio::test]
    async fn sell_leg_credits_cash_and_closes_position() {
        let mut server = mockito::Server::new_async().await;
        let _bars_mock = server
            .mock("GET", mockito::Matcher::Regex(r"^/v2/stocks/AAPL/bars".to_string()))
            .with_status(200)
            .with_body(bars_body(110.0))
            .create_async()
            .await;
        let _order_mock = server
            .mock("POST", "/v2/orders")
            .with_status(200)
            .with_body(order_body("order-2"))
            .create_async()
            .await;

        let alpaca = AlpacaClient::new(server.url(), server.url(), "key", "secret");
        let store = StoreClient::mock();
        let algorithm = test_algorithm(500.0, 0.5);
        store.seed_algorithm(algorithm.clone()).await;
        store
            .upsert_position(&Position {
                algorithm_id: algorithm.id,
                symbol: "AAPL".to_string(),
                quantity: 5.0,
                avg_entry_price: 100.0,
                market_value: None,
            })
            .await
            .unwrap();
        let engine = ScheduledEngine::new(alpaca, store);

        engine
            .submit_order(&algorithm, "AAPL", Side::Sell, OrderSize::Quantity(5.0), "test sell")
            .await
            .unwrap();

        let cash = engine.store.get_algorithm_cash(algorithm.id).await.unwrap();
        assert_eq!(cash, 1050.0);
        let position = engine.store.get_position(algorithm.id, "AAPL").await.unwrap();
        assert!(position.is_none());
    }

    #[test]
    fn lookback_limit_has_a_floor_of_one() {
        let algo = test_algorithm(1000.0, 0.5);
        assert!(lookback_limit(&algo) >= 1);
    }
}
