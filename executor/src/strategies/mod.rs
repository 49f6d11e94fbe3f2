//! The five-strategy streaming family (§4.2). Polymorphism is over a small
//! `Strategy` trait (tagged-union style per the Design Notes — no
//! inheritance), with a shared `StrategyBase` holding the fields every
//! variant carries (positions, cooldown, last-signal-time) by composition.

mod buy_and_hold;
mod mean_reversion;
mod momentum;
mod rsi;
mod sma_crossover;

pub use buy_and_hold::{BuyAndHoldParams, BuyAndHoldStrategy};
pub use mean_reversion::{MeanReversionParams, MeanReversionStrategy};
pub use momentum::{MomentumParams, MomentumStrategy};
pub use rsi::{RsiParams, RsiStrategy};
pub use sma_crossover::{SmaCrossoverParams, SmaCrossoverStrategy};

use crate::tick_buffer::Indicators;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use shared_models::{Bar, ModelError, Result, Side, Signal, StrategyKind};
use std::collections::HashMap;

const DEFAULT_COOLDOWN_SECONDS: i64 = 5;
const DEFAULT_POSITION_SIZE_PCT: f64 = 0.1;
const DEFAULT_CASH_ALLOCATION: f64 = 1000.0;

pub trait Strategy: Send {
    fn name(&self) -> &str;
    fn symbols(&self) -> &[String];
    fn enabled(&self) -> bool;
    fn cash_allocation(&self) -> f64;
    fn position_size_pct(&self) -> f64;
    fn has_position(&self, symbol: &str) -> bool;
    fn update_position(&mut self, symbol: &str, quantity: f64);
    fn on_tick(&mut self, symbol: &str, price: f64, indicators: &Indicators) -> Option<Signal>;
    fn on_bar(&mut self, symbol: &str, bar: &Bar, indicators: &Indicators) -> Option<Signal>;
}

/// Shared per-strategy-instance bookkeeping: §3's "owned by the strategy
/// instance, lives for the process lifetime" state.
pub struct StrategyBase {
    pub name: String,
    pub symbols: Vec<String>,
    pub position_size_pct: f64,
    pub cash_allocation: f64,
    pub enabled: bool,
    cooldown: Duration,
    positions: HashMap<String, f64>,
    last_signal_time: HashMap<String, DateTime<Utc>>,
}

impl StrategyBase {
    pub fn new(
        name: impl Into<String>,
        symbols: Vec<String>,
        position_size_pct: f64,
        cash_allocation: f64,
        enabled: bool,
        cooldown_seconds: i64,
    ) -> Self {
        Self {
            name: name.into(),
            symbols,
            position_size_pct,
            cash_allocation,
            enabled,
            cooldown: Duration::seconds(cooldown_seconds),
            positions: HashMap::new(),
            last_signal_time: HashMap::new(),
        }
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.positions.get(symbol).copied().unwrap_or(0.0) > 0.0
    }

    pub fn update_position(&mut self, symbol: &str, quantity: f64) {
        if quantity > 0.0 {
            self.positions.insert(symbol.to_string(), quantity);
        } else {
            self.positions.remove(symbol);
        }
    }

    pub fn in_cooldown(&self, symbol: &str, now: DateTime<Utc>) -> bool {
        match self.last_signal_time.get(symbol) {
            Some(last) => now - *last < self.cooldown,
            None => false,
        }
    }

    pub fn record_signal(&mut self, symbol: &str, now: DateTime<Utc>) {
        self.last_signal_time.insert(symbol.to_string(), now);
    }

    pub fn make_signal(
        &self,
        side: Side,
        symbol: &str,
        reason: impl Into<String>,
        price: f64,
    ) -> Signal {
        Signal::new(side, symbol, self.name.clone(), reason, price)
    }
}

/// One entry of `strategies.yaml` (§6): the discriminant selects which
/// typed params struct `params` is parsed into.
#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfigEntry {
    #[serde(rename = "type")]
    pub kind: StrategyKind,
    pub name: String,
    pub symbols: Vec<String>,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default = "default_position_size_pct")]
    pub position_size_pct: f64,
    #[serde(default = "default_cash_allocation")]
    pub cash_allocation: f64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: i64,
}

fn default_position_size_pct() -> f64 {
    DEFAULT_POSITION_SIZE_PCT
}
fn default_cash_allocation() -> f64 {
    DEFAULT_CASH_ALLOCATION
}
fn default_enabled() -> bool {
    true
}
fn default_cooldown_seconds() -> i64 {
    DEFAULT_COOLDOWN_SECONDS
}

pub fn build_strategy(entry: StrategyConfigEntry) -> Result<Box<dyn Strategy>> {
    let base = StrategyBase::new(
        entry.name.clone(),
        entry.symbols.clone(),
        entry.position_size_pct,
        entry.cash_allocation,
        entry.enabled,
        entry.cooldown_seconds,
    );

    let params_value = if entry.params.is_null() {
        serde_json::json!({})
    } else {
        entry.params
    };

    match entry.kind {
        StrategyKind::Momentum => {
            let params: MomentumParams = serde_json::from_value(params_value)
                .map_err(|e| ModelError::Config(e.to_string()))?;
            Ok(Box::new(MomentumStrategy::new(base, params)))
        }
        StrategyKind::MeanReversion => {
            let params: MeanReversionParams = serde_json::from_value(params_value)
                .map_err(|e| ModelError::Config(e.to_string()))?;
            Ok(Box::new(MeanReversionStrategy::new(base, params)))
        }
        StrategyKind::SmaCrossover => {
            let params: SmaCrossoverParams = serde_json::from_value(params_value)
                .map_err(|e| ModelError::Config(e.to_string()))?;
            Ok(Box::new(SmaCrossoverStrategy::new(base, params)))
        }
        StrategyKind::Rsi => {
            let params: RsiParams = serde_json::from_value(params_value)
                .map_err(|e| ModelError::Config(e.to_string()))?;
            Ok(Box::new(RsiStrategy::new(base, params)))
        }
        StrategyKind::BuyAndHold => {
            let params: BuyAndHoldParams = serde_json::from_value(params_value)
                .map_err(|e| ModelError::Config(e.to_string()))?;
            Ok(Box::new(BuyAndHoldStrategy::new(base, params)))
        }
    }
}
