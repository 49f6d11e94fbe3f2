//! REST client for the Alpaca-shaped paper-brokerage API (§6). Shared by the
//! streaming order manager and the scheduled engine's `submit_order` path so
//! both talk to the same wire contract without duplicating it.

use crate::error::{ModelError, Result};
use crate::Bar;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AlpacaClient {
    http: reqwest::Client,
    base_url: String,
    data_url: String,
    api_key: String,
    secret_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Clock {
    pub is_open: bool,
    pub next_open: String,
    pub next_close: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub equity: String,
    pub buying_power: String,
    pub status: String,
}

impl Account {
    pub fn equity(&self) -> f64 {
        self.equity.parse().unwrap_or(0.0)
    }

    pub fn buying_power(&self) -> f64 {
        self.buying_power.parse().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerPosition {
    pub symbol: String,
    pub qty: String,
    pub market_value: String,
}

impl BrokerPosition {
    pub fn qty(&self) -> f64 {
        self.qty.parse().unwrap_or(0.0)
    }

    pub fn market_value(&self) -> f64 {
        self.market_value.parse().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewOrder {
    pub symbol: String,
    pub side: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub time_in_force: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notional: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qty: Option<f64>,
}

impl NewOrder {
    pub fn market_notional(symbol: impl Into<String>, side: &str, notional: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side: side.to_string(),
            order_type: "market".to_string(),
            time_in_force: "day".to_string(),
            notional: Some((notional * 100.0).round() / 100.0),
            qty: None,
        }
    }

    pub fn market_qty(symbol: impl Into<String>, side: &str, qty: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side: side.to_string(),
            order_type: "market".to_string(),
            time_in_force: "day".to_string(),
            notional: None,
            qty: Some(qty),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderResponse {
    pub id: String,
    pub status: String,
    pub filled_avg_price: Option<String>,
    pub filled_qty: Option<String>,
}

impl OrderResponse {
    pub fn filled_avg_price(&self) -> Option<f64> {
        self.filled_avg_price.as_ref().and_then(|s| s.parse().ok())
    }

    pub fn filled_qty(&self) -> Option<f64> {
        self.filled_qty.as_ref().and_then(|s| s.parse().ok())
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawBar {
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
    t: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
struct BarsResponse {
    bars: Option<Vec<RawBar>>,
}

#[derive(Debug, Clone, Deserialize)]
struct LatestTradeResponse {
    trade: LatestTrade,
}

#[derive(Debug, Clone, Deserialize)]
struct LatestTrade {
    p: f64,
}

impl AlpacaClient {
    pub fn new(
        base_url: impl Into<String>,
        data_url: impl Into<String>,
        api_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            data_url: data_url.into(),
            api_key: api_key.into(),
            secret_key: secret_key.into(),
        }
    }

    /// True iff `paper_only` may be satisfied: the base URL identifies the
    /// paper-trading endpoint. Used by the order manager's startup guard.
    pub fn looks_like_paper_endpoint(&self) -> bool {
        self.base_url.contains("paper-api")
    }

    fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("APCA-API-KEY-ID", &self.api_key)
            .header("APCA-API-SECRET-KEY", &self.secret_key)
            .header("Content-Type", "application/json")
    }

    pub async fn get_clock(&self) -> Result<Clock> {
        let url = format!("{}/v2/clock", self.base_url);
        let resp = self.auth(self.http.get(&url)).send().await?;
        if !resp.status().is_success() {
            return Err(ModelError::Brokerage(format!(
                "GET /v2/clock failed: {}",
                resp.status()
            )));
        }
        Ok(resp.json().await?)
    }

    pub async fn get_account(&self) -> Result<Account> {
        let url = format!("{}/v2/account", self.base_url);
        let resp = self.auth(self.http.get(&url)).send().await?;
        if !resp.status().is_success() {
            return Err(ModelError::Brokerage(format!(
                "GET /v2/account failed: {}",
                resp.status()
            )));
        }
        Ok(resp.json().await?)
    }

    pub async fn get_positions(&self) -> Result<Vec<BrokerPosition>> {
        let url = format!("{}/v2/positions", self.base_url);
        let resp = self.auth(self.http.get(&url)).send().await?;
        if !resp.status().is_success() {
            return Err(ModelError::Brokerage(format!(
                "GET /v2/positions failed: {}",
                resp.status()
            )));
        }
        Ok(resp.json().await?)
    }

    pub async fn submit_order(&self, order: &NewOrder) -> Result<OrderResponse> {
        let url = format!("{}/v2/orders", self.base_url);
        let resp = self.auth(self.http.post(&url)).json(order).send().await?;
        if resp.status().as_u16() >= 400 {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ModelError::Brokerage(format!(
                "POST /v2/orders failed: {} {}",
                status, body
            )));
        }
        Ok(resp.json().await?)
    }

    /// Up to `limit` daily OHLCV bars, newest last. Empty (not an error) if
    /// the feed has nothing for the window — callers fall back to
    /// `get_latest_trade` per §4.6 step 4.
    pub async fn get_bars(&self, symbol: &str, limit: u32) -> Result<Vec<Bar>> {
        let url = format!(
            "{}/v2/stocks/{}/bars?timeframe=1Day&limit={}&feed=iex",
            self.data_url, symbol, limit
        );
        let resp = self.auth(self.http.get(&url)).send().await?;
        if !resp.status().is_success() {
            return Err(ModelError::Brokerage(format!(
                "GET bars for {} failed: {}",
                symbol,
                resp.status()
            )));
        }
        let parsed: BarsResponse = resp.json().await?;
        Ok(parsed
            .bars
            .unwrap_or_default()
            .into_iter()
            .map(|b| Bar {
                open: b.o,
                high: b.h,
                low: b.l,
                close: b.c,
                volume: b.v,
                timestamp: b.t,
            })
            .collect())
    }

    pub async fn get_latest_trade_price(&self, symbol: &str) -> Result<f64> {
        let url = format!("{}/v2/stocks/{}/trades/latest", self.data_url, symbol);
        let resp = self.auth(self.http.get(&url)).send().await?;
        if !resp.status().is_success() {
            return Err(ModelError::Brokerage(format!(
                "GET latest trade for {} failed: {}",
                symbol,
                resp.status()
            )));
        }
        let parsed: LatestTradeResponse = resp.json().await?;
        Ok(parsed.trade.p)
    }

    /// `get_bars` with the §4.6 step 4 synthetic single-point fallback: if
    /// the feed returns no bars, build one from the latest trade so batch
    /// evaluation can proceed best-effort.
    pub async fn get_bars_or_synthetic(&self, symbol: &str, limit: u32) -> Result<Vec<Bar>> {
        let bars = self.get_bars(symbol, limit).await?;
        if !bars.is_empty() {
            return Ok(bars);
        }
        warn!(symbol, "no bars returned, falling back to latest trade");
        let price = self.get_latest_trade_price(symbol).await?;
        Ok(vec![Bar {
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 0.0,
            timestamp: Utc::now(),
        }])
    }
}
