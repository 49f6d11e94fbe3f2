use super::{Strategy, StrategyBase};
use crate::tick_buffer::Indicators;
use chrono::Utc;
use serde::Deserialize;
use shared_models::{Bar, Side, Signal};
use std::collections::HashSet;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct BuyAndHoldParams {}

pub struct BuyAndHoldStrategy {
    base: StrategyBase,
    #[allow(dead_code)]
    params: BuyAndHoldParams,
    bought: HashSet<String>,
}

impl BuyAndHoldStrategy {
    pub fn new(base: StrategyBase, params: BuyAndHoldParams) -> Self {
        Self {
            base,
            params,
            bought: HashSet::new(),
        }
    }
}

impl Strategy for BuyAndHoldStrategy {
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
        if self.bought.contains(symbol) {
            return None;
        }
        if self.base.has_position(symbol) {
            return None;
        }
        let now = Utc::now();
        if self.base.in_cooldown(symbol, now) {
            return None;
        }
        self.bought.insert(symbol.to_string());
        self.base.record_signal(symbol, now);
        Some(
            self.base
                .make_signal(Side::Buy, symbol, "initial buy-and-hold entry", price),
        )
    }

    fn on_bar(&mut self, symbol: &str, bar: &Bar, indicators: &Indicators) -> Option<Signal> {
        self.on_tick(symbol, bar.close, indicators)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy() -> BuyAndHoldStrategy {
        BuyAndHoldStrategy::new(
            StrategyBase::new("bah", vec!["AAPL".into()], 0.1, 1000.0, true, 0),
            BuyAndHoldParams {},
        )
    }

    #[test]
    fn buys_once_then_never_again() {
        let mut s = strategy();
        let sig = s.on_tick("AAPL", 100.0, &Indicators::default()).unwrap();
        assert_eq!(sig.side, Side::Buy);
        assert!(s.on_tick("AAPL", 101.0, &Indicators::default()).is_none());
    }

    #[test]
    fn never_emits_sell() {
        let mut s = strategy();
        s.update_position("AAPL", 10.0);
        assert!(s.on_tick("AAPL", 100.0, &Indicators::default()).is_none());
    }
}
