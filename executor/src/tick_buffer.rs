//! Time-windowed ring of ticks per symbol (§4.1). A pure function of buffer
//! state plus the current time — no I/O, matching §5's "synchronous and
//! must not block" constraint on strategy-facing computation.

use chrono::{DateTime, Duration, Utc};
use shared_models::Tick;
use std::collections::{HashMap, VecDeque};

const MOMENTUM_WINDOWS_SECS: [i64; 5] = [5, 10, 15, 30, 60];
const MEAN_WINDOWS_SECS: [i64; 3] = [30, 60, 120];
const MIN_PRICES_FOR_MEAN: usize = 5;

#[derive(Debug, Clone, Default)]
pub struct Indicators {
    pub tick_count: usize,
    pub last_price: Option<f64>,
    pub momentum: HashMap<i64, f64>,
    pub mean: HashMap<i64, f64>,
    pub std: HashMap<i64, f64>,
    pub vwap: Option<f64>,
}

impl Indicators {
    pub fn is_empty(&self) -> bool {
        self.tick_count == 0
    }

    pub fn momentum_secs(&self, window: i64) -> Option<f64> {
        self.momentum.get(&window).copied()
    }

    pub fn mean_secs(&self, window: i64) -> Option<f64> {
        self.mean.get(&window).copied()
    }

    pub fn std_secs(&self, window: i64) -> Option<f64> {
        self.std.get(&window).copied()
    }
}

pub struct TickBuffer {
    max_age_seconds: i64,
    ticks: HashMap<String, VecDeque<Tick>>,
}

impl TickBuffer {
    pub fn new(max_age_seconds: i64) -> Self {
        Self {
            max_age_seconds,
            ticks: HashMap::new(),
        }
    }

    pub fn add(&mut self, symbol: &str, price: f64, size: f64, timestamp: Option<DateTime<Utc>>) {
        let now = timestamp.unwrap_or_else(Utc::now);
        let buf = self.ticks.entry(symbol.to_string()).or_default();
        buf.push_back(Tick {
            price,
            size,
            timestamp: now,
        });
        self.prune(symbol);
    }

    fn prune(&mut self, symbol: &str) {
        let cutoff = Utc::now() - Duration::seconds(self.max_age_seconds);
        if let Some(buf) = self.ticks.get_mut(symbol) {
            while let Some(front) = buf.front() {
                if front.timestamp < cutoff {
                    buf.pop_front();
                } else {
                    break;
                }
            }
        }
    }

    /// Computed on demand from the current buffer; `{}`-equivalent
    /// (`Indicators::default()`) if fewer than 2 ticks are present.
    pub fn get_indicators(&self, symbol: &str) -> Indicators {
        let Some(buf) = self.ticks.get(symbol) else {
            return Indicators::default();
        };
        if buf.len() < 2 {
            return Indicators::default();
        }

        let now = Utc::now();
        let last_price = buf.back().map(|t| t.price);
        let mut out = Indicators {
            tick_count: buf.len(),
            last_price,
            ..Default::default()
        };

        for window in MOMENTUM_WINDOWS_SECS {
            let cutoff = now - Duration::seconds(window);
            if let Some(first_in_window) = buf.iter().find(|t| t.timestamp >= cutoff) {
                if first_in_window.price != 0.0 {
                    if let Some(last) = last_price {
                        let momentum =
                            100.0 * (last - first_in_window.price) / first_in_window.price;
                        out.momentum.insert(window, momentum);
                    }
                }
            }
        }

        for window in MEAN_WINDOWS_SECS {
            let cutoff = now - Duration::seconds(window);
            let prices: Vec<f64> = buf
                .iter()
                .filter(|t| t.timestamp >= cutoff)
                .map(|t| t.price)
                .collect();
            if prices.len() >= MIN_PRICES_FOR_MEAN {
                let mean = prices.iter().sum::<f64>() / prices.len() as f64;
                let std = if prices.len() > 1 {
                    let variance = prices.iter().map(|p| (p - mean).powi(2)).sum::<f64>()
                        / (prices.len() - 1) as f64;
                    variance.sqrt()
                } else {
                    0.0
                };
                out.mean.insert(window, mean);
                out.std.insert(window, std);
            }
        }

        let total_volume: f64 = buf.iter().map(|t| t.size).sum();
        if total_volume != 0.0 {
            let notional: f64 = buf.iter().map(|t| t.price * t.size).sum();
            out.vwap = Some(notional / total_volume);
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick_at(secs_ago: i64, price: f64, size: f64) -> (f64, f64, DateTime<Utc>) {
        (price, size, Utc::now() - Duration::seconds(secs_ago))
    }

    #[test]
    fn empty_buffer_yields_empty_indicators() {
        let buf = TickBuffer::new(120);
        assert!(buf.get_indicators("AAPL").is_empty());
    }

    #[test]
    fn single_tick_yields_empty_indicators() {
        let mut buf = TickBuffer::new(120);
        buf.add("AAPL", 100.0, 10.0, None);
        assert!(buf.get_indicators("AAPL").is_empty());
    }

    #[test]
    fn all_ticks_older_than_max_age_are_pruned_to_empty() {
        let mut buf = TickBuffer::new(5);
        let (p, s, t) = tick_at(100, 100.0, 1.0);
        buf.add("AAPL", p, s, Some(t));
        let (p, s, t) = tick_at(90, 101.0, 1.0);
        buf.add("AAPL", p, s, Some(t));
        assert!(buf.get_indicators("AAPL").is_empty());
    }

    #[test]
    fn momentum_reflects_oldest_tick_in_window() {
        let mut buf = TickBuffer::new(120);
        let (p, s, t) = tick_at(3, 100.0, 10.0);
        buf.add("AAPL", p, s, Some(t));
        let (p, s, t) = tick_at(1, 110.0, 10.0);
        buf.add("AAPL", p, s, Some(t));
        let ind = buf.get_indicators("AAPL");
        let m5 = ind.momentum_secs(5).unwrap();
        assert!((m5 - 10.0).abs() < 1e-6);
    }

    #[test]
    fn mean_and_std_require_at_least_five_prices() {
        let mut buf = TickBuffer::new(120);
        for i in 0..4 {
            buf.add("AAPL", 100.0 + i as f64, 1.0, None);
        }
        assert!(buf.get_indicators("AAPL").mean_secs(30).is_none());
        buf.add("AAPL", 105.0, 1.0, None);
        assert!(buf.get_indicators("AAPL").mean_secs(30).is_some());
    }

    #[test]
    fn vwap_is_volume_weighted_across_whole_buffer() {
        let mut buf = TickBuffer::new(120);
        buf.add("AAPL", 100.0, 10.0, None);
        buf.add("AAPL", 110.0, 30.0, None);
        let vwap = buf.get_indicators("AAPL").vwap.unwrap();
        // (100*10 + 110*30) / 40 = 107.5
        assert!((vwap - 107.5).abs() < 1e-6);
    }
}
