use super::{Strategy, StrategyBase};
use crate::tick_buffer::Indicators;
use chrono::Utc;
use serde::Deserialize;
use shared_models::{Bar, Side, Signal};

fn default_threshold_pct() -> f64 {
    0.05
}
fn default_exit_threshold_pct() -> f64 {
    0.03
}
fn default_lookback_seconds() -> i64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct MomentumParams {
    #[serde(default = "default_threshold_pct")]
    pub threshold_pct: f64,
    #[serde(default = "default_exit_threshold_pct")]
    pub exit_threshold_pct: f64,
    #[serde(default = "default_lookback_seconds")]
    pub lookback_seconds: i64,
}

pub struct MomentumStrategy {
    base: StrategyBase,
    params: MomentumParams,
}

impl MomentumStrategy {
    pub fn new(base: StrategyBase, params: MomentumParams) -> Self {
        Self { base, params }
    }
}

impl Strategy for MomentumStrategy {
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

    fn on_tick(&mut self, symbol: &str, price: f64, indicators: &Indicators) -> Option<Signal> {
        let now = Utc::now();
        if self.base.in_cooldown(symbol, now) {
            return None;
        }
        let momentum = indicators.momentum_secs(self.params.lookback_seconds)?;

        if momentum > self.params.threshold_pct && !self.base.has_position(symbol) {
            self.base.record_signal(symbol, now);
            return Some(self.base.make_signal(
                Side::Buy,
                symbol,
                format!(
                    "momentum {:.3}% over {}s exceeds threshold {:.3}%",
                    momentum, self.params.lookback_seconds, self.params.threshold_pct
                ),
                price,
            ));
        }

        if momentum < -self.params.exit_threshold_pct && self.base.has_position(symbol) {
            self.base.record_signal(symbol, now);
            return Some(self.base.make_signal(
                Side::Sell,
                symbol,
                format!(
                    "momentum {:.3}% over {}s below exit threshold -{:.3}%",
                    momentum, self.params.lookback_seconds, self.params.exit_threshold_pct
                ),
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
    use std::collections::HashMap;

    fn strategy() -> MomentumStrategy {
        MomentumStrategy::new(
            StrategyBase::new("mom", vec!["AAPL".into()], 0.1, 1000.0, true, 5),
            MomentumParams {
                threshold_pct: 0.05,
                exit_threshold_pct: 0.03,
                lookback_seconds: 10,
            },
        )
    }

    fn indicators_with_momentum(value: f64) -> Indicators {
        let mut momentum = HashMap::new();
        momentum.insert(10, value);
        Indicators {
            tick_count: 5,
            last_price: Some(100.0),
            momentum,
            ..Default::default()
        }
    }

    #[test]
    fn buys_when_momentum_exceeds_threshold_and_flat() {
        let mut s = strategy();
        let sig = s
            .on_tick("AAPL", 100.0, &indicators_with_momentum(0.1))
            .unwrap();
        assert_eq!(sig.side, Side::Buy);
    }

    #[test]
    fn no_buy_when_already_holding() {
        let mut s = strategy();
        s.update_position("AAPL", 10.0);
        assert!(s.on_tick("AAPL", 100.0, &indicators_with_momentum(0.1)).is_none());
    }

    #[test]
    fn sells_when_momentum_drops_below_exit_and_holding() {
        let mut s = strategy();
        s.update_position("AAPL", 10.0);
        let sig = s
            .on_tick("AAPL", 100.0, &indicators_with_momentum(-0.1))
            .unwrap();
        assert_eq!(sig.side, Side::Sell);
    }

    #[test]
    fn missing_indicator_yields_no_signal() {
        let mut s = strategy();
        assert!(s.on_tick("AAPL", 100.0, &Indicators::default()).is_none());
    }
}
