//! Safety-rail-guarded order submission (§4.4). Every rejection returns
//! `None` and logs; nothing here raises past its own boundary except the
//! paper-only startup guard, which is fatal by design.

use crate::metrics::Metrics;
use chrono::{DateTime, Duration, Utc};
use shared_models::alpaca::{AlpacaClient, NewOrder, OrderResponse};
use shared_models::{ModelError, Result, Side, Signal};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct SafetyConfig {
    pub max_position_pct: f64,
    pub max_orders_per_minute: u32,
    pub cooldown_seconds: i64,
    pub paper_only: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct CachedPosition {
    qty: f64,
    market_value: f64,
}

pub struct OrderManager {
    client: AlpacaClient,
    safety: SafetyConfig,
    order_timestamps: VecDeque<DateTime<Utc>>,
    last_order_time: HashMap<String, DateTime<Utc>>,
    account_equity: f64,
    positions: HashMap<String, CachedPosition>,
    metrics: Arc<Metrics>,
}

impl OrderManager {
    pub fn new(client: AlpacaClient, safety: SafetyConfig, metrics: Arc<Metrics>) -> Result<Self> {
        if safety.paper_only && !client.looks_like_paper_endpoint() {
            return Err(ModelError::Config(
                "paper_only is set but the brokerage base URL does not identify the paper endpoint"
                    .to_string(),
            ));
        }
        Ok(Self {
            client,
            safety,
            order_timestamps: VecDeque::new(),
            last_order_time: HashMap::new(),
            account_equity: 0.0,
            positions: HashMap::new(),
            metrics,
        })
    }

    /// Re-fetches account equity and positions. Never propagates a failure
    /// past this call — on error the previously cached state is kept and a
    /// warning is logged (§4.4).
    pub async fn refresh_account(&mut self) {
        match self.client.get_account().await {
            Ok(account) => {
                self.account_equity = account.equity();
                self.metrics.account_equity.set(self.account_equity);
            }
            Err(e) => warn!("failed to refresh account: {}", e),
        }
        match self.client.get_positions().await {
            Ok(positions) => {
                self.positions = positions
                    .into_iter()
                    .map(|p| {
                        (
                            p.symbol.clone(),
                            CachedPosition {
                                qty: p.qty(),
                                market_value: p.market_value(),
                            },
                        )
                    })
                    .collect();
            }
            Err(e) => warn!("failed to refresh positions: {}", e),
        }
    }

    pub fn account_equity(&self) -> f64 {
        self.account_equity
    }

    fn prune_rate_limit(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Duration::seconds(60);
        while let Some(front) = self.order_timestamps.front() {
            if *front < cutoff {
                self.order_timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    pub async fn submit(&mut self, signal: &Signal, dollar_amount: f64) -> Option<OrderResponse> {
        let now = Utc::now();

        self.prune_rate_limit(now);
        if self.order_timestamps.len() as u32 >= self.safety.max_orders_per_minute {
            info!(symbol = %signal.symbol, "order rejected: rate limit exceeded");
            self.metrics.orders_rejected_rate_limit.inc();
            return None;
        }

        if let Some(last) = self.last_order_time.get(&signal.symbol) {
            if now - *last < Duration::seconds(self.safety.cooldown_seconds) {
                info!(symbol = %signal.symbol, "order rejected: cooldown active");
                self.metrics.orders_rejected_cooldown.inc();
                return None;
            }
        }

        let side_str = match signal.side {
            Side::Buy => "buy",
            Side::Sell => "sell",
        };

        let order = match signal.side {
            Side::Buy => {
                if self.account_equity > 0.0 {
                    let current_mv = self
                        .positions
                        .get(&signal.symbol)
                        .map(|p| p.market_value)
                        .unwrap_or(0.0);
                    let prospective_pct =
                        (current_mv + dollar_amount) / self.account_equity;
                    if prospective_pct > self.safety.max_position_pct {
                        info!(symbol = %signal.symbol, pct = prospective_pct, "order rejected: exceeds max position exposure");
                        self.metrics.orders_rejected_exposure.inc();
                        return None;
                    }
                }
                NewOrder::market_notional(signal.symbol.clone(), side_str, dollar_amount)
            }
            Side::Sell => {
                let qty = self.positions.get(&signal.symbol).map(|p| p.qty);
                match qty {
                    Some(qty) if qty > 0.0 => {
                        NewOrder::market_qty(signal.symbol.clone(), side_str, qty)
                    }
                    _ => {
                        info!(symbol = %signal.symbol, "order rejected: no broker-reported position to sell");
                        self.metrics.orders_rejected_no_position.inc();
                        return None;
                    }
                }
            }
        };

        match self.client.submit_order(&order).await {
            Ok(response) => {
                self.order_timestamps.push_back(now);
                self.last_order_time.insert(signal.symbol.clone(), now);
                info!(symbol = %signal.symbol, side = %signal.side, order_id = %response.id, "order submitted");
                self.metrics.orders_submitted.inc();
                Some(response)
            }
            Err(e) => {
                warn!(symbol = %signal.symbol, "order submission failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_models::Signal;

    fn manager(base_url: String) -> OrderManager {
        let client = AlpacaClient::new(base_url, "https://data.example".into(), "key".into(), "secret".into());
        OrderManager::new(
            client,
            SafetyConfig {
                max_position_pct: 0.25,
                max_orders_per_minute: 2,
                cooldown_seconds: 0,
                paper_only: false,
            },
            Metrics::new().unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn paper_only_guard_rejects_non_paper_base_url() {
        let client = AlpacaClient::new(
            "https://api.example.com".to_string(),
            "https://data.example".to_string(),
            "k".to_string(),
            "s".to_string(),
        );
        let result = OrderManager::new(
            client,
            SafetyConfig {
                max_position_pct: 0.25,
                max_orders_per_minute: 5,
                cooldown_seconds: 5,
                paper_only: true,
            },
            Metrics::new().unwrap(),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn rate_limit_rejects_third_order_within_window() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v2/orders")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"abc","status":"filled","filled_avg_price":"100.0","filled_qty":"1"}"#)
            .expect(2)
            .create_async()
            .await;

        let mut mgr = manager(server.url());
        mgr.positions.insert(
            "AAPL".to_string(),
            CachedPosition {
                qty: 1.0,
                market_value: 100.0,
            },
        );
        mgr.positions.insert(
            "MSFT".to_string(),
            CachedPosition {
                qty: 1.0,
                market_value: 100.0,
            },
        );
        mgr.positions.insert(
            "GOOG".to_string(),
            CachedPosition {
                qty: 1.0,
                market_value: 100.0,
            },
        );

        let s1 = Signal::new(Side::Sell, "AAPL", "test", "r", 100.0);
        let s2 = Signal::new(Side::Sell, "MSFT", "test", "r", 100.0);
        let s3 = Signal::new(Side::Sell, "GOOG", "test", "r", 100.0);

        assert!(mgr.submit(&s1, 0.0).await.is_some());
        assert!(mgr.submit(&s2, 0.0).await.is_some());
        assert!(mgr.submit(&s3, 0.0).await.is_none());

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn sell_without_broker_position_is_rejected() {
        let mut mgr = manager("https://paper-api.example.com".to_string());
        let signal = Signal::new(Side::Sell, "AAPL", "test", "r", 100.0);
        assert!(mgr.submit(&signal, 0.0).await.is_none());
    }
}
