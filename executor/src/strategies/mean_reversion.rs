use super::{Strategy, StrategyBase};
use crate::tick_buffer::Indicators;
use chrono::Utc;
use serde::Deserialize;
use shared_models::{Bar, Side, Signal};

fn default_window_seconds() -> i64 {
    60
}
fn default_std_threshold() -> f64 {
    2.0
}
fn default_exit_threshold() -> f64 {
    0.5
}

#[derive(Debug, Clone, Deserialize)]
pub struct MeanReversionParams {
    #[serde(default = "default_window_seconds")]
    pub window_seconds: i64,
    #[serde(default = "default_std_threshold")]
    pub std_threshold: f64,
    #[serde(default = "default_exit_threshold")]
    pub exit_threshold: f64,
}

pub struct MeanReversionStrategy {
    base: StrategyBase,
    params: MeanReversionParams,
}

impl MeanReversionStrategy {
    pub fn new(base: StrategyBase, params: MeanReversionParams) -> Self {
        Self { base, params }
    }
}

impl Strategy for MeanReversionStrategy {
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
        let mean = indicators.mean_secs(self.params.window_seconds)?;
        let std = indicators.std_secs(self.params.window_seconds)?;
        if std == 0.0 {
            return None;
        }
        let z = (price - mean) / std;

        if z < -self.params.std_threshold && !self.base.has_position(symbol) {
            self.base.record_signal(symbol, now);
            return Some(self.base.make_signal(
                Side::Buy,
                symbol,
                format!("z-score {:.3} below -{:.3}", z, self.params.std_threshold),
                price,
            ));
        }

        if (z.abs() < self.params.exit_threshold || z > self.params.std_threshold)
            && self.base.has_position(symbol)
        {
            self.base.record_signal(symbol, now);
            return Some(self.base.make_signal(
                Side::Sell,
                symbol,
                format!("z-score {:.3} triggered exit", z),
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

    fn strategy() -> MeanReversionStrategy {
        MeanReversionStrategy::new(
            StrategyBase::new("meanrev", vec!["AAPL".into()], 0.1, 1000.0, true, 5),
            MeanReversionParams {
                window_seconds: 60,
                std_threshold: 2.0,
                exit_threshold: 0.5,
            },
        )
    }

    fn indicators(mean: f64, std: f64) -> Indicators {
        let mut m = HashMap::new();
        m.insert(60, mean);
        let mut s = HashMap::new();
        s.insert(60, std);
        Indicators {
            tick_count: 10,
            last_price: Some(mean),
            mean: m,
            std: s,
            ..Default::default()
        }
    }

    #[test]
    fn buys_when_price_far_below_mean() {
        let mut s = strategy();
        // z = (90 - 100) / 2 = -5
        let sig = s.on_tick("AAPL", 90.0, &indicators(100.0, 2.0)).unwrap();
        assert_eq!(sig.side, Side::Buy);
    }

    #[test]
    fn zero_std_yields_no_signal() {
        let mut s = strategy();
        assert!(s.on_tick("AAPL", 90.0, &indicators(100.0, 0.0)).is_none());
    }

    #[test]
    fn sells_when_price_reverts_to_mean_while_holding() {
        let mut s = strategy();
        s.update_position("AAPL", 10.0);
        // z = (100.2 - 100) / 2 = 0.1, |z| < 0.5
        let sig = s.on_tick("AAPL", 100.2, &indicators(100.0, 2.0)).unwrap();
        assert_eq!(sig.side, Side::Sell);
    }

    #[test]
    fn sells_when_price_overshoots_above_threshold_while_holding() {
        let mut s = strategy();
        s.update_position("AAPL", 10.0);
        // z = (105 - 100) / 2 = 2.5 > 2.0
        let sig = s.on_tick("AAPL", 105.0, &indicators(100.0, 2.0)).unwrap();
        assert_eq!(sig.side, Side::Sell);
    }
}
