pub mod alpaca;
pub mod error;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use error::{ModelError, Result};

/// Default per-algorithm starting balance when the store has no
/// `system_state.default_starting_balance` override.
pub const DEFAULT_STARTING_BALANCE: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    SmaCrossover,
    Rsi,
    Momentum,
    MeanReversion,
    BuyAndHold,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StrategyKind::SmaCrossover => "sma_crossover",
            StrategyKind::Rsi => "rsi",
            StrategyKind::Momentum => "momentum",
            StrategyKind::MeanReversion => "mean_reversion",
            StrategyKind::BuyAndHold => "buy_and_hold",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => f.write_str("buy"),
            Side::Sell => f.write_str("sell"),
        }
    }
}

/// A single executed trade print, transient to the streaming tick buffer.
#[derive(Debug, Clone, Copy)]
pub struct Tick {
    pub price: f64,
    pub size: f64,
    pub timestamp: DateTime<Utc>,
}

/// An OHLCV aggregate, shared by the 1-minute streaming bar and the
/// 1-day scheduled-engine bar.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct Bar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub timestamp: DateTime<Utc>,
}

/// A strategy's intent, transient until routed through an order manager.
#[derive(Debug, Clone)]
pub struct Signal {
    pub side: Side,
    pub symbol: String,
    pub strategy_name: String,
    pub reason: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

impl Signal {
    pub fn new(
        side: Side,
        symbol: impl Into<String>,
        strategy_name: impl Into<String>,
        reason: impl Into<String>,
        price: f64,
    ) -> Self {
        Self {
            side,
            symbol: symbol.into(),
            strategy_name: strategy_name.into(),
            reason: reason.into(),
            price,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Algorithm {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub strategy_kind: StrategyKind,
    /// Recognized keys per `StrategyKind` are fixed by the batch strategy
    /// routines in `scheduled_engine`; this is a store-facing scalar map,
    /// not a free-form grab-bag consumed directly.
    pub strategy_parameters: std::collections::HashMap<String, f64>,
    pub symbols: Vec<String>,
    pub enabled: bool,
    pub cash: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub algorithm_id: Uuid,
    pub symbol: String,
    pub quantity: f64,
    pub avg_entry_price: f64,
    pub market_value: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub algorithm_id: Uuid,
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub order_type: String,
    pub status: String,
    pub broker_order_id: Option<String>,
    pub notes: String,
    pub filled_price: Option<f64>,
    pub filled_quantity: Option<f64>,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotPosition {
    pub symbol: String,
    pub quantity: f64,
    pub avg_entry_price: f64,
    pub current_price: f64,
    pub market_value: f64,
    pub unrealized_pnl: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: Uuid,
    pub algorithm_id: Uuid,
    pub snapshot_date: NaiveDate,
    pub equity: f64,
    pub cash: f64,
    pub buying_power: f64,
    pub daily_pnl: f64,
    pub total_pnl: f64,
    pub positions: Vec<SnapshotPosition>,
    pub trigger: String,
}
