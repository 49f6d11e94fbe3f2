use super::{Strategy, StrategyBase};
use crate::tick_buffer::Indicators;
use chrono::Utc;
use serde::Deserialize;
use shared_models::{Bar, Side, Signal};
use std::collections::{HashMap, VecDeque};

fn default_period() -> usize {
    14
}
fn default_oversold() -> f64 {
    30.0
}
fn default_overbought() -> f64 {
    70.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct RsiParams {
    #[serde(default = "default_period")]
    pub period: usize,
    #[serde(default = "default_oversold")]
    pub oversold: f64,
    #[serde(default = "default_overbought")]
    pub overbought: f64,
}

pub struct RsiStrategy {
    base: StrategyBase,
    params: RsiParams,
    /// Last `period + 1` prices per symbol, maintained independently of the
    /// shared tick buffer (§4.2.4 is the strategy's own ring, not a buffer
    /// indicator).
    price_rings: HashMap<String, VecDeque<f64>>,
}

impl RsiStrategy {
    pub fn new(base: StrategyBase, params: RsiParams) -> Self {
        Self {
            base,
            params,
            price_rings: HashMap::new(),
        }
    }

    /// Simple (non-exponential) mean gain/loss RSI over the ring.
    fn compute_rsi(&self, symbol: &str) -> Option<f64> {
        let ring = self.price_rings.get(symbol)?;
        if ring.len() < self.params.period + 1 {
            return None;
        }
        let mut gains = Vec::with_capacity(ring.len() - 1);
        let mut losses = Vec::with_capacity(ring.len() - 1);
        for window in ring.iter().collect::<Vec<_>>().windows(2) {
            let delta = window[1] - window[0];
            gains.push(delta.max(0.0));
            losses.push((-delta).max(0.0));
        }
        let n = self.params.period;
        let avg_gain: f64 = gains.iter().rev().take(n).sum::<f64>() / n as f64;
        let avg_loss: f64 = losses.iter().rev().take(n).sum::<f64>() / n as f64;

        if avg_loss == 0.0 {
            return Some(100.0);
        }
        Some(100.0 - 100.0 / (1.0 + avg_gain / avg_loss))
    }

    fn push_price(&mut self, symbol: &str, price: f64) {
        let ring = self.price_rings.entry(symbol.to_string()).or_default();
        ring.push_back(price);
        while ring.len() > self.params.period + 1 {
            ring.pop_front();
        }
    }
}

impl Strategy for RsiStrategy {
    fn name(&self) -> &str {
        &self.base.name
    }
    fn symbols(&self) -> &[String] {
        &self.base.symbols
    }
    fn enabled(&self) -> bool {
        self.base.enabled
    }
    fn cash_allocation(&self) -> f64 {
        self.base.cash_allocation
    }
    fn position_size_pct(&self) -> f64 {
        self.base.position_size_pct
    }
    fn has_position(&self, symbol: &str) -> bool {
        self.base.has_position(symbol)
    }
    fn update_position(&mut self, symbol: &str, quantity: f64) {
        self.base.update_position(symbol, quantity)
    }

    fn on_tick(&mut self, symbol: &str, price: f64, _indicators: &Indicators) -> Option<Signal> {
        self.push_price(symbol, price);
        let rsi = self.compute_rsi(symbol)?;

        let now = Utc::now();
        if self.base.in_cooldown(symbol, now) {
            return None;
        }

        if rsi < self.params.oversold && !self.base.has_position(symbol) {
            self.base.record_signal(symbol, now);
            return Some(self.base.make_signal(
                Side::Buy,
                symbol,
                format!("RSI {:.2} below oversold {:.2}", rsi, self.params.oversold),
                price,
            ));
        }

        if rsi > self.params.overbought && self.base.has_position(symbol) {
            self.base.record_signal(symbol, now);
            return Some(self.base.make_signal(
                Side::Sell,
                symbol,
                format!("RSI {:.2} above overbought {:.2}", rsi, self.params.overbought),
                price,
            ));
        }

        None
    }

    fn on_bar(&mut self, symbol: &str, bar: &Bar, indicators: &Indicators) -> Option<Signal> {
        self.on_tick(symbol, bar.close, indicators)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy(period: usize) -> RsiStrategy {
        RsiStrategy::new(
            StrategyBase::new("rsi", vec!["AAPL".into()], 0.1, 1000.0, true, 5),
            RsiParams {
                period,
                oversold: 30.0,
                overbought: 70.0,
            },
        )
    }

    #[test]
    fn strictly_increasing_series_yields_rsi_100() {
        let mut s = strategy(14);
        let mut rsi = None;
        for i in 0..16 {
            s.push_price("AAPL", 100.0 + i as f64);
            rsi = s.compute_rsi("AAPL");
        }
        assert_eq!(rsi, Some(100.0));
    }

    #[test]
    fn strictly_decreasing_series_yields_low_rsi() {
        let mut s = strategy(14);
        let mut rsi = None;
        for i in 0..16 {
            s.push_price("AAPL", 200.0 - 2.0 * i as f64);
            rsi = s.compute_rsi("AAPL");
        }
        assert!(rsi.unwrap() < 30.0);
    }

    #[test]
    fn insufficient_history_yields_no_signal() {
        let mut s = strategy(14);
        assert!(s.on_tick("AAPL", 100.0, &Indicators::default()).is_none());
    }
}
