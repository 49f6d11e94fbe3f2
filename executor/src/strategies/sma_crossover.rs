use super::{Strategy, StrategyBase};
use crate::tick_buffer::Indicators;
use chrono::Utc;
use serde::Deserialize;
use shared_models::{Bar, Side, Signal};
use std::collections::HashMap;

fn default_short_seconds() -> i64 {
    30
}
fn default_long_seconds() -> i64 {
    120
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmaCrossoverParams {
    #[serde(default = "default_short_seconds")]
    pub short_seconds: i64,
    #[serde(default = "default_long_seconds")]
    pub long_seconds: i64,
}

pub struct SmaCrossoverStrategy {
    base: StrategyBase,
    params: SmaCrossoverParams,
    /// `None` until a first observation establishes a baseline; §4.2.3
    /// requires one prior call before a crossing can be detected.
    prev_short_above: HashMap<String, bool>,
}

impl SmaCrossoverStrategy {
    pub fn new(base: StrategyBase, params: SmaCrossoverParams) -> Self {
        Self {
            base,
            params,
            prev_short_above: HashMap::new(),
        }
    }
}

impl Strategy for SmaCrossoverStrategy {
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
        let short = indicators.mean_secs(self.params.short_seconds)?;
        let long = indicators.mean_secs(self.params.long_seconds)?;
        let short_above = short > long;

        // Update state on every call regardless of whether a signal is
        // emitted — the crossing is only detectable on the next call.
        let prev_state = self.prev_short_above.insert(symbol.to_string(), short_above);

        let Some(prev_short_above) = prev_state else {
            return None;
        };

        let now = Utc::now();
        if self.base.in_cooldown(symbol, now) {
            return None;
        }

        if !prev_short_above && short_above && !self.base.has_position(symbol) {
            self.base.record_signal(symbol, now);
            return Some(self.base.make_signal(
                Side::Buy,
                symbol,
                format!("SMA({}) crossed above SMA({})", self.params.short_seconds, self.params.long_seconds),
                price,
            ));
        }

        if prev_short_above && !short_above && self.base.has_position(symbol) {
            self.base.record_signal(symbol, now);
            return Some(self.base.make_signal(
                Side::Sell,
                symbol,
                format!("SMA({}) crossed below SMA({})", self.params.short_seconds, self.params.long_seconds),
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

    fn strategy() -> SmaCrossoverStrategy {
        SmaCrossoverStrategy::new(
            StrategyBase::new("sma", vec!["AAPL".into()], 0.1, 1000.0, true, 5),
            SmaCrossoverParams {
                short_seconds: 30,
                long_seconds: 120,
            },
        )
    }

    fn indicators(short: f64, long: f64) -> Indicators {
        let mut mean = HashMap::new();
        mean.insert(30, short);
        mean.insert(120, long);
        Indicators {
            tick_count: 10,
            last_price: Some(short),
            mean,
            ..Default::default()
        }
    }

    #[test]
    fn first_call_establishes_baseline_without_signal() {
        let mut s = strategy();
        assert!(s.on_tick("AAPL", 100.0, &indicators(99.0, 101.0)).is_none());
    }

    #[test]
    fn buys_on_false_to_true_transition_when_flat() {
        let mut s = strategy();
        s.on_tick("AAPL", 100.0, &indicators(99.0, 101.0)); // short below long
        let sig = s.on_tick("AAPL", 102.0, &indicators(102.0, 101.0)).unwrap();
        assert_eq!(sig.side, Side::Buy);
    }

    #[test]
    fn sells_on_true_to_false_transition_when_holding() {
        let mut s = strategy();
        s.update_position("AAPL", 10.0);
        s.on_tick("AAPL", 102.0, &indicators(102.0, 101.0)); // short above long
        let sig = s.on_tick("AAPL", 99.0, &indicators(99.0, 101.0)).unwrap();
        assert_eq!(sig.side, Side::Sell);
    }

    #[test]
    fn no_repeat_signal_without_a_new_crossing() {
        let mut s = strategy();
        s.on_tick("AAPL", 100.0, &indicators(99.0, 101.0));
        s.on_tick("AAPL", 102.0, &indicators(102.0, 101.0));
        s.update_position("AAPL", 0.0);
        assert!(s.on_tick("AAPL", 103.0, &indicators(103.0, 101.0)).is_none());
    }
}
