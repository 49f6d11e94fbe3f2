//! Dashboard store / D1 sync client (§4.7.1), shared by both engines.
//!
//! Follows the same `Live`/`Mock` duality as this workspace's database
//! collaborators: `Live` talks to the real dashboard store over HTTP,
//! `Mock` is an in-memory stand-in used by tests so neither engine needs a
//! network dependency to exercise its business logic.

use shared_models::{Algorithm, ModelError, Position, Result, Signal, Snapshot};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, serde::Serialize)]
struct TradeRecord<'a> {
    algorithm_id: Uuid,
    symbol: &'a str,
    side: String,
    quantity: f64,
    order_type: &'static str,
    status: &'a str,
    alpaca_order_id: &'a str,
    notes: &'a str,
    filled_price: Option<f64>,
    filled_qty: Option<f64>,
}

#[derive(Debug, serde::Deserialize)]
struct CreatedId {
    id: Uuid,
}

struct MockState {
    trades: Vec<(Uuid, TradeRecordOwned)>,
    algorithms: Vec<Algorithm>,
    positions: HashMap<(Uuid, String), Position>,
    cash: HashMap<Uuid, f64>,
    snapshots: Vec<Snapshot>,
}

#[derive(Debug, Clone)]
struct TradeRecordOwned {
    #[allow(dead_code)]
    algorithm_id: Uuid,
}

pub enum StoreClient {
    Live {
        http: reqwest::Client,
        base_url: String,
        token: Option<String>,
    },
    Mock(RwLock<MockState>),
}

impl StoreClient {
    pub fn live(base_url: impl Into<String>, token: Option<String>) -> Self {
        StoreClient::Live {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            token,
        }
    }

    pub fn mock() -> Self {
        StoreClient::Mock(RwLock::new(MockState {
            trades: Vec::new(),
            algorithms: Vec::new(),
            positions: HashMap::new(),
            cash: HashMap::new(),
            snapshots: Vec::new(),
        }))
    }

    /// Seeds the mock store with an algorithm. Panics if called on a `Live`
    /// client — test-only helper.
    pub async fn seed_algorithm(&self, algorithm: Algorithm) {
        match self {
            StoreClient::Mock(state) => {
                let mut state = state.write().await;
                state.cash.insert(algorithm.id, algorithm.cash);
                state.algorithms.push(algorithm);
            }
            StoreClient::Live { .. } => panic!("seed_algorithm is a mock-only helper"),
        }
    }

    fn auth(&self, req: reqwest::RequestBuilder, token: &Option<String>) -> reqwest::RequestBuilder {
        match token {
            Some(t) => req.bearer_auth(t),
            None => req,
        }
    }

    /// `POST /api/trades`. Never propagates a failure past this boundary —
    /// returns `None` on any network error or non-201 status, matching the
    /// source's catch-and-log contract (§4.7.1).
    pub async fn record_trade(
        &self,
        algorithm_id: Uuid,
        signal: &Signal,
        order_id: &str,
        status: &str,
        filled_price: Option<f64>,
        filled_qty: Option<f64>,
    ) -> Option<Uuid> {
        match self {
            StoreClient::Live {
                http,
                base_url,
                token,
            } => {
                let body = TradeRecord {
                    algorithm_id,
                    symbol: &signal.symbol,
                    side: signal.side.to_string(),
                    quantity: filled_qty.unwrap_or(0.0),
                    order_type: "market",
                    status,
                    alpaca_order_id: order_id,
                    notes: &signal.reason,
                    filled_price,
                    filled_qty,
                };
                let url = format!("{}/api/trades", base_url);
                let req = self.auth(http.post(&url).json(&body), token);
                match req.send().await {
                    Ok(resp) if resp.status().as_u16() == 201 => {
                        resp.json::<CreatedId>().await.ok().map(|c| c.id)
                    }
                    Ok(resp) => {
                        warn!(status = %resp.status(), "record_trade failed");
                        None
                    }
                    Err(e) => {
                        warn!("record_trade request failed: {}", e);
                        None
                    }
                }
            }
            StoreClient::Mock(state) => {
                let id = Uuid::new_v4();
                let mut state = state.write().await;
                state.trades.push((id, TradeRecordOwned { algorithm_id }));
                Some(id)
            }
        }
    }

    /// Convenience used by the streaming orchestrator: records a fill
    /// against the default algorithm context carried by `signal`'s strategy
    /// name is not enough to resolve an algorithm id, so callers needing
    /// per-algorithm attribution use `record_trade` directly; this path is
    /// for the single-algorithm streaming engine where `algorithm_id` is a
    /// fixed per-process identity.
    pub async fn record_trade_fill(
        &self,
        algorithm_id: Uuid,
        signal: &Signal,
        order: &shared_models::alpaca::OrderResponse,
    ) -> Result<()> {
        let recorded = self
            .record_trade(
                algorithm_id,
                signal,
                &order.id,
                &order.status,
                order.filled_avg_price(),
                order.filled_qty(),
            )
            .await;
        if recorded.is_none() {
            return Err(ModelError::Store(
                "dashboard store did not accept trade record".into(),
            ));
        }
        Ok(())
    }

    pub async fn list_enabled_algorithms(&self) -> Result<Vec<Algorithm>> {
        match self {
            StoreClient::Live {
                http,
                base_url,
                token,
            } => {
                let url = format!("{}/api/algorithms?enabled=true", base_url);
                let req = self.auth(http.get(&url), token);
                let resp = req.send().await?;
                if !resp.status().is_success() {
                    return Err(ModelError::Store(format!(
                        "list_enabled_algorithms failed: {}",
                        resp.status()
                    )));
                }
                Ok(resp.json().await?)
            }
            StoreClient::Mock(state) => {
                let state = state.read().await;
                Ok(state
                    .algorithms
                    .iter()
                    .filter(|a| a.enabled)
                    .cloned()
                    .collect())
            }
        }
    }

    /// All position rows for one algorithm — used by snapshot creation to
    /// value the whole book (§4.6 step 5, §4.7.1).
    pub async fn list_positions(&self, algorithm_id: Uuid) -> Result<Vec<Position>> {
        match self {
            StoreClient::Live {
                http,
                base_url,
                token,
            } => {
                let url = format!("{}/api/algorithms/{}/positions", base_url, algorithm_id);
                let req = self.auth(http.get(&url), token);
                let resp = req.send().await?;
                if !resp.status().is_success() {
                    return Err(ModelError::Store(format!(
                        "list_positions failed: {}",
                        resp.status()
                    )));
                }
                Ok(resp.json().await?)
            }
            StoreClient::Mock(state) => {
                let state = state.read().await;
                Ok(state
                    .positions
                    .values()
                    .filter(|p| p.algorithm_id == algorithm_id)
                    .cloned()
                    .collect())
            }
        }
    }

    pub async fn get_position(
        &self,
        algorithm_id: Uuid,
        symbol: &str,
    ) -> Result<Option<Position>> {
        match self {
            StoreClient::Live {
                http,
                base_url,
                token,
            } => {
                let url = format!(
                    "{}/api/algorithms/{}/positions/{}",
                    base_url, algorithm_id, symbol
                );
                let req = self.auth(http.get(&url), token);
                let resp = req.send().await?;
                if resp.status().as_u16() == 404 {
                    return Ok(None);
                }
                if !resp.status().is_success() {
                    return Err(ModelError::Store(format!(
                        "get_position failed: {}",
                        resp.status()
                    )));
                }
                Ok(Some(resp.json().await?))
            }
            StoreClient::Mock(state) => {
                let state = state.read().await;
                Ok(state
                    .positions
                    .get(&(algorithm_id, symbol.to_string()))
                    .cloned())
            }
        }
    }

    pub async fn upsert_position(&self, position: &Position) -> Result<()> {
        match self {
            StoreClient::Live {
                http,
                base_url,
                token,
            } => {
                let url = format!(
                    "{}/api/algorithms/{}/positions/{}",
                    base_url, position.algorithm_id, position.symbol
                );
                let req = self.auth(http.put(&url).json(position), token);
                let resp = req.send().await?;
                if !resp.status().is_success() {
                    return Err(ModelError::Store(format!(
                        "upsert_position failed: {}",
                        resp.status()
                    )));
                }
                Ok(())
            }
            StoreClient::Mock(state) => {
                let mut state = state.write().await;
                state.positions.insert(
                    (position.algorithm_id, position.symbol.clone()),
                    position.clone(),
                );
                Ok(())
            }
        }
    }

    pub async fn delete_position(&self, algorithm_id: Uuid, symbol: &str) -> Result<()> {
        match self {
            StoreClient::Live {
                http,
                base_url,
                token,
            } => {
                let url = format!(
                    "{}/api/algorithms/{}/positions/{}",
                    base_url, algorithm_id, symbol
                );
                let req = self.auth(http.delete(&url), token);
                let resp = req.send().await?;
                if !resp.status().is_success() && resp.status().as_u16() != 404 {
                    return Err(ModelError::Store(format!(
                        "delete_position failed: {}",
                        resp.status()
                    )));
                }
                Ok(())
            }
            StoreClient::Mock(state) => {
                let mut state = state.write().await;
                state
                    .positions
                    .remove(&(algorithm_id, symbol.to_string()));
                Ok(())
            }
        }
    }

    pub async fn get_algorithm_cash(&self, algorithm_id: Uuid) -> Result<f64> {
        match self {
            StoreClient::Live {
                http,
                base_url,
                token,
            } => {
                let url = format!("{}/api/algorithms/{}/cash", base_url, algorithm_id);
                let req = self.auth(http.get(&url), token);
                let resp = req.send().await?;
                if !resp.status().is_success() {
                    return Err(ModelError::Store(format!(
                        "get_algorithm_cash failed: {}",
                        resp.status()
                    )));
                }
                #[derive(serde::Deserialize)]
                struct CashResp {
                    cash: f64,
                }
                Ok(resp.json::<CashResp>().await?.cash)
            }
            StoreClient::Mock(state) => {
                let state = state.read().await;
                Ok(state.cash.get(&algorithm_id).copied().unwrap_or(0.0))
            }
        }
    }

    pub async fn update_algorithm_cash(&self, algorithm_id: Uuid, cash: f64) -> Result<()> {
        match self {
            StoreClient::Live {
                http,
                base_url,
                token,
            } => {
                let url = format!("{}/api/algorithms/{}/cash", base_url, algorithm_id);
                let req = self.auth(http.put(&url).json(&serde_json::json!({ "cash": cash })), token);
                let resp = req.send().await?;
                if !resp.status().is_success() {
                    return Err(ModelError::Store(format!(
                        "update_algorithm_cash failed: {}",
                        resp.status()
                    )));
                }
                Ok(())
            }
            StoreClient::Mock(state) => {
                let mut state = state.write().await;
                state.cash.insert(algorithm_id, cash);
                Ok(())
            }
        }
    }

    pub async fn create_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        match self {
            StoreClient::Live {
                http,
                base_url,
                token,
            } => {
                let url = format!("{}/api/snapshots", base_url);
                let req = self.auth(http.post(&url).json(snapshot), token);
                let resp = req.send().await?;
                if !resp.status().is_success() {
                    return Err(ModelError::Store(format!(
                        "create_snapshot failed: {}",
                        resp.status()
                    )));
                }
                Ok(())
            }
            StoreClient::Mock(state) => {
                let mut state = state.write().await;
                state.snapshots.push(snapshot.clone());
                Ok(())
            }
        }
    }

    pub async fn list_recent_snapshots(
        &self,
        algorithm_id: Uuid,
        limit: u32,
    ) -> Result<Vec<Snapshot>> {
        match self {
            StoreClient::Live {
                http,
                base_url,
                token,
            } => {
                let url = format!(
                    "{}/api/algorithms/{}/snapshots?limit={}",
                    base_url, algorithm_id, limit
                );
                let req = self.auth(http.get(&url), token);
                let resp = req.send().await?;
                if !resp.status().is_success() {
                    return Err(ModelError::Store(format!(
                        "list_recent_snapshots failed: {}",
                        resp.status()
                    )));
                }
                Ok(resp.json().await?)
            }
            StoreClient::Mock(state) => {
                let state = state.read().await;
                let mut matching: Vec<Snapshot> = state
                    .snapshots
                    .iter()
                    .filter(|s| s.algorithm_id == algorithm_id)
                    .cloned()
                    .collect();
                matching.sort_by_key(|s| s.snapshot_date);
                matching.reverse();
                matching.truncate(limit as usize);
                Ok(matching)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_models::Side;

    fn sample_signal() -> Signal {
        Signal::new(Side::Buy, "AAPL", "test-strategy", "entry", 100.0)
    }

    #[tokio::test]
    async fn mock_record_trade_returns_id() {
        let store = StoreClient::mock();
        let signal = sample_signal();
        let id = store
            .record_trade(Uuid::new_v4(), &signal, "order-1", "filled", Some(100.0), Some(1.0))
            .await;
        assert!(id.is_some());
    }

    #[tokio::test]
    async fn mock_position_roundtrip() {
        let store = StoreClient::mock();
        let algorithm_id = Uuid::new_v4();
        let position = Position {
            algorithm_id,
            symbol: "AAPL".to_string(),
            quantity: 5.0,
            avg_entry_price: 100.0,
            market_value: Some(500.0),
        };
        store.upsert_position(&position).await.unwrap();
        let fetched = store.get_position(algorithm_id, "AAPL").await.unwrap();
        assert_eq!(fetched.unwrap().quantity, 5.0);

        store.delete_position(algorithm_id, "AAPL").await.unwrap();
        let fetched = store.get_position(algorithm_id, "AAPL").await.unwrap();
        assert!(fetched.is_none());
    }

    #[tokio::test]
    async fn mock_cash_roundtrip() {
        let store = StoreClient::mock();
        let algorithm_id = Uuid::new_v4();
        assert_eq!(store.get_algorithm_cash(algorithm_id).await.unwrap(), 0.0);
        store.update_algorithm_cash(algorithm_id, 500.0).await.unwrap();
        assert_eq!(store.get_algorithm_cash(algorithm_id).await.unwrap(), 500.0);
    }

    #[tokio::test]
    async fn live_record_trade_posts_and_parses_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/trades")
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(format!(r#"{{"id":"{}"}}"#, Uuid::new_v4()))
            .create_async()
            .await;

        let store = StoreClient::live(server.url(), None);
        let signal = sample_signal();
        let id = store
            .record_trade(Uuid::new_v4(), &signal, "order-1", "filled", Some(100.0), Some(1.0))
            .await;
        assert!(id.is_some());
        mock.assert_async().await;
    }
}
