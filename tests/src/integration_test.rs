//! Cross-crate end-to-end tests (§8 "End-to-end scenarios"), run with
//! `--ignored` against the `integration-tests` feature. Unlike the teacher's
//! Redis-stream harness, these engines talk HTTP, so the dashboard-store leg
//! is driven against a `mockito` mock server rather than a live stack
//! (§10.5); the pure-function analytics scenarios need no mock at all.

use chrono::NaiveDate;
use portfolio_manager::{daily_returns, max_drawdown, total_return};
use position_manager::StoreClient;
use shared_models::{Algorithm, Snapshot, StrategyKind};
use std::collections::HashMap;
use uuid::Uuid;

fn snapshot(equity: f64, day: u32) -> Snapshot {
    Snapshot {
        id: Uuid::new_v4(),
        algorithm_id: Uuid::new_v4(),
        snapshot_date: NaiveDate::from_ymd_opt(2026, 1, day).unwrap(),
        equity,
        cash: equity,
        buying_power: equity,
        daily_pnl: 0.0,
        total_pnl: 0.0,
        positions: Vec::new(),
        trigger: "scheduled".to_string(),
    }
}

/// §8 end-to-end scenario 1.
#[test]
#[ignore]
fn scenario_total_return() {
    assert_eq!(total_return(10000.0, 11000.0), 10.0);
    assert_eq!(total_return(10000.0, 9000.0), -10.0);
    assert_eq!(total_return(0.0, 1000.0), 0.0);
}

/// §8 end-to-end scenario 2.
#[test]
#[ignore]
fn scenario_max_drawdown_single_peak() {
    let snaps = vec![
        snapshot(10000.0, 1),
        snapshot(11000.0, 2),
        snapshot(9900.0, 3),
        snapshot(10500.0, 4),
    ];
    assert!((max_drawdown(&snaps) - 0.10).abs() < 1e-3);
}

/// §8 end-to-end scenario 3.
#[test]
#[ignore]
fn scenario_max_drawdown_multi_peak() {
    let snaps = vec![
        snapshot(10000.0, 1),
        snapshot(9500.0, 2),
        snapshot(10000.0, 3),
        snapshot(11000.0, 4),
        snapshot(8800.0, 5),
        snapshot(9500.0, 6),
    ];
    assert!((max_drawdown(&snaps) - 0.20).abs() < 1e-3);
}

/// §8 end-to-end scenario 4.
#[test]
#[ignore]
fn scenario_daily_returns() {
    let snaps = vec![snapshot(10000.0, 1), snapshot(10100.0, 2), snapshot(10000.0, 3)];
    let returns = daily_returns(&snaps);
    assert_eq!(returns.len(), 2);
    assert!((returns[0] - 0.01).abs() < 1e-4);
    assert!((returns[1] - (-0.0099)).abs() < 1e-4);
}

/// Exercises the dashboard store's enabled-algorithms fetch against a mocked
/// HTTP backend, the same contract both engines depend on (§4.7.1, §6).
#[tokio::test]
#[ignore]
async fn dashboard_store_http_round_trip() {
    let mut server = mockito::Server::new_async().await;
    let algorithm_id = Uuid::new_v4();
    let algorithm = Algorithm {
        id: algorithm_id,
        name: "sma-crossover-aapl".to_string(),
        description: String::new(),
        strategy_kind: StrategyKind::SmaCrossover,
        strategy_parameters: HashMap::new(),
        symbols: vec!["AAPL".to_string()],
        enabled: true,
        cash: 1000.0,
        created_at: chrono::Utc::now(),
        updated_at: chrono::Utc::now(),
    };

    let list_mock = server
        .mock("GET", "/api/algorithms?enabled=true")
        .with_status(200)
        .with_body(serde_json::to_string(&vec![algorithm.clone()]).unwrap())
        .create_async()
        .await;

    let store = StoreClient::live(server.url(), None);
    let fetched = store.list_enabled_algorithms().await.unwrap();
    assert_eq!(fetched.len(), 1);
    assert_eq!(fetched[0].id, algorithm_id);
    list_mock.assert_async().await;
}
