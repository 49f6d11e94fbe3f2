//! WebSocket client for the Alpaca-shaped real-time market data feed (§4.3).
//!
//! Connects, authenticates, subscribes, then forwards every parsed frame to
//! the caller over an `mpsc` channel as a [`StreamEvent`] — a direct,
//! in-process substitute for the reference design's `on_trade`/`on_bar`/
//! `on_quote` callback triple, chosen because it composes cleanly with a
//! `tokio::select!`-driven orchestrator without fighting the borrow checker
//! over callback closures that need `&mut self` strategy state.

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use shared_models::{Bar, ModelError, Result};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::Sender;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{info, warn};

const FRAME_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub enum StreamEvent {
    Trade {
        symbol: String,
        price: f64,
        size: f64,
        timestamp: DateTime<Utc>,
    },
    Bar {
        symbol: String,
        bar: Bar,
    },
    Quote {
        symbol: String,
        bid: f64,
        ask: f64,
        bid_size: f64,
        ask_size: f64,
        timestamp: DateTime<Utc>,
    },
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "T")]
    kind: String,
    #[serde(rename = "S", default)]
    symbol: String,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    p: Option<f64>,
    #[serde(default)]
    s: Option<f64>,
    #[serde(default)]
    o: Option<f64>,
    #[serde(default)]
    h: Option<f64>,
    #[serde(default)]
    l: Option<f64>,
    #[serde(default)]
    c: Option<f64>,
    #[serde(default)]
    v: Option<f64>,
    #[serde(default)]
    bp: Option<f64>,
    #[serde(default)]
    ap: Option<f64>,
    #[serde(default)]
    bs: Option<f64>,
    #[serde(default)]
    #[serde(rename = "as")]
    ask_size: Option<f64>,
    #[serde(default)]
    t: Option<DateTime<Utc>>,
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct AlpacaStreamClient {
    api_key: String,
    secret_key: String,
    data_url: String,
    ws: Option<WsStream>,
    running: bool,
}

impl AlpacaStreamClient {
    pub fn new(
        api_key: impl Into<String>,
        secret_key: impl Into<String>,
        data_url: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            secret_key: secret_key.into(),
            data_url: data_url.into(),
            ws: None,
            running: false,
        }
    }

    /// Connects and authenticates (§4.3 steps 1-2). Fails fatally if the
    /// server does not confirm authentication.
    pub async fn connect(&mut self) -> Result<()> {
        info!(url = %self.data_url, "connecting to market data stream");
        let (mut ws, _) = connect_async(&self.data_url)
            .await
            .map_err(|e| ModelError::WebSocket(e.to_string()))?;

        let welcome = recv_frame(&mut ws).await?;
        info!(?welcome, "stream welcome");

        let auth_msg = json!({
            "action": "auth",
            "key": self.api_key,
            "secret": self.secret_key,
        });
        send_frame(&mut ws, &auth_msg).await?;

        let auth_resp = recv_frame(&mut ws).await?;
        let authenticated = auth_resp
            .first()
            .and_then(|v| v.get("msg"))
            .and_then(|v| v.as_str())
            == Some("authenticated");
        if !authenticated {
            return Err(ModelError::WebSocket(format!(
                "authentication failed: {:?}",
                auth_resp
            )));
        }
        info!("authenticated");

        self.ws = Some(ws);
        Ok(())
    }

    /// Subscribes to the given symbol lists (§4.3 step 3).
    pub async fn subscribe(
        &mut self,
        trades: &[String],
        bars: &[String],
        quotes: &[String],
    ) -> Result<()> {
        let ws = self
            .ws
            .as_mut()
            .ok_or_else(|| ModelError::WebSocket("subscribe called before connect".into()))?;

        let mut sub_msg = serde_json::Map::new();
        sub_msg.insert("action".into(), json!("subscribe"));
        if !trades.is_empty() {
            sub_msg.insert("trades".into(), json!(trades));
        }
        if !bars.is_empty() {
            sub_msg.insert("bars".into(), json!(bars));
        }
        if !quotes.is_empty() {
            sub_msg.insert("quotes".into(), json!(quotes));
        }

        send_frame(ws, &Value::Object(sub_msg)).await?;
        let resp = recv_frame(ws).await?;
        info!(?resp, "subscription acknowledged");
        Ok(())
    }

    /// The receive loop (§4.3 steps 4-6). Runs until the connection closes,
    /// forwarding every parsed frame over `tx`. Does not reconnect —
    /// reconnection is the orchestrator's responsibility.
    pub async fn run(&mut self, tx: Sender<StreamEvent>) -> Result<()> {
        let ws = self
            .ws
            .as_mut()
            .ok_or_else(|| ModelError::WebSocket("run called before connect".into()))?;
        self.running = true;

        while self.running {
            let next = tokio::time::timeout(FRAME_TIMEOUT, ws.next()).await;
            match next {
                Ok(Some(Ok(Message::Text(text)))) => {
                    dispatch_frames(&text, &tx).await;
                }
                Ok(Some(Ok(Message::Close(frame)))) => {
                    warn!(?frame, "stream closed by server");
                    self.running = false;
                }
                Ok(Some(Ok(_))) => {}
                Ok(Some(Err(e))) => {
                    warn!("stream error: {}", e);
                    self.running = false;
                }
                Ok(None) => {
                    warn!("stream ended");
                    self.running = false;
                }
                Err(_timeout) => {
                    if ws.send(Message::Ping(Vec::new())).await.is_err() {
                        warn!("ping failed, treating connection as closed");
                        self.running = false;
                    }
                }
            }
        }
        Ok(())
    }

    pub async fn close(&mut self) {
        self.running = false;
        if let Some(mut ws) = self.ws.take() {
            let _ = ws.close(None).await;
            info!("stream client closed");
        }
    }
}

async fn send_frame(ws: &mut WsStream, value: &Value) -> Result<()> {
    let text = serde_json::to_string(value)?;
    ws.send(Message::Text(text))
        .await
        .map_err(|e| ModelError::WebSocket(e.to_string()))
}

async fn recv_frame(ws: &mut WsStream) -> Result<Vec<Value>> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return Ok(serde_json::from_str(&text)?),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(ModelError::WebSocket(e.to_string())),
            None => return Err(ModelError::WebSocket("connection closed".into())),
        }
    }
}

async fn dispatch_frames(text: &str, tx: &Sender<StreamEvent>) {
    let frames: Vec<RawFrame> = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            warn!("failed to parse stream frame: {}", e);
            return;
        }
    };

    for frame in frames {
        let event = match frame.kind.as_str() {
            "t" => Some(StreamEvent::Trade {
                symbol: frame.symbol,
                price: frame.p.unwrap_or_default(),
                size: frame.s.unwrap_or_default(),
                timestamp: frame.t.unwrap_or_else(Utc::now),
            }),
            "b" => Some(StreamEvent::Bar {
                symbol: frame.symbol,
                bar: Bar {
                    open: frame.o.unwrap_or_default(),
                    high: frame.h.unwrap_or_default(),
                    low: frame.l.unwrap_or_default(),
                    close: frame.c.unwrap_or_default(),
                    volume: frame.v.unwrap_or_default(),
                    timestamp: frame.t.unwrap_or_else(Utc::now),
                },
            }),
            "q" => Some(StreamEvent::Quote {
                symbol: frame.symbol,
                bid: frame.bp.unwrap_or_default(),
                ask: frame.ap.unwrap_or_default(),
                bid_size: frame.bs.unwrap_or_default(),
                ask_size: frame.ask_size.unwrap_or_default(),
                timestamp: frame.t.unwrap_or_else(Utc::now),
            }),
            _ => None,
        };
        if let Some(event) = event {
            if tx.send(event).await.is_err() {
                warn!("stream event receiver dropped");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_parses_trade_frame() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (tx, mut rx) = tokio::sync::mpsc::channel(8);
            let frame = r#"[{"T":"t","S":"AAPL","p":100.5,"s":10,"t":"2024-01-01T00:00:00Z"}]"#;
            dispatch_frames(frame, &tx).await;
            match rx.recv().await {
                Some(StreamEvent::Trade { symbol, price, .. }) => {
                    assert_eq!(symbol, "AAPL");
                    assert_eq!(price, 100.5);
                }
                other => panic!("unexpected event: {:?}", other),
            }
        });
    }

    #[test]
    fn dispatch_parses_bar_frame() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (tx, mut rx) = tokio::sync::mpsc::channel(8);
            let frame = r#"[{"T":"b","S":"AAPL","o":1.0,"h":2.0,"l":0.5,"c":1.5,"v":100,"t":"2024-01-01T00:00:00Z"}]"#;
            dispatch_frames(frame, &tx).await;
            match rx.recv().await {
                Some(StreamEvent::Bar { symbol, bar }) => {
                    assert_eq!(symbol, "AAPL");
                    assert_eq!(bar.close, 1.5);
                }
                other => panic!("unexpected event: {:?}", other),
            }
        });
    }

    #[test]
    fn dispatch_ignores_unknown_frame_type() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (tx, mut rx) = tokio::sync::mpsc::channel(8);
            let frame = r#"[{"T":"subscription","trades":["AAPL"]}]"#;
            dispatch_frames(frame, &tx).await;
            assert!(rx.try_recv().is_err());
        });
    }
}
