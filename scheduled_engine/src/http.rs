//! Diagnostic HTTP surface (§4.6.1): `GET /health`, `GET /status`, and a
//! manual `POST /run` trigger. The Python Worker's `/test` route is dropped
//! here — it existed only to probe the Pyodide runtime and has no Rust
//! counterpart.

use crate::engine::{RunSummary, ScheduledEngine};
use axum::extract::State;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Clone, serde::Serialize, Default)]
pub struct LastRun {
    pub at: Option<DateTime<Utc>>,
    pub summary: Option<RunSummary>,
}

pub struct AppState {
    pub engine: ScheduledEngine,
    pub last_run: RwLock<LastRun>,
}

pub async fn serve(port: u16, state: Arc<AppState>) -> std::io::Result<()> {
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/run", post(run_handler))
        .with_state(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "scheduled engine http surface listening");
    axum::serve(listener, app).await
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let last_run = state.last_run.read().await;
    Json(last_run.clone())
}

async fn run_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let summary = state.engine.run_once().await;
    let mut last_run = state.last_run.write().await;
    last_run.at = Some(Utc::now());
    last_run.summary = Some(summary.clone());
    Json(summary)
}
