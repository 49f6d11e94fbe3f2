//! Performance analytics (§4.7): pure functions over equity snapshots and
//! closed trades, grounded on the dashboard store's metrics module. No I/O,
//! no store client — callers fetch snapshots/trades via `position_manager`
//! and pass the results here.

use shared_models::Snapshot;

/// Percentage return from `initial` to `final`; 0 if `initial <= 0`.
pub fn total_return(initial: f64, final_equity: f64) -> f64 {
    if initial <= 0.0 {
        return 0.0;
    }
    ((final_equity - initial) / initial) * 100.0
}

/// Day-over-day equity returns as decimals, skipping any pair whose
/// previous-day equity is non-positive.
pub fn daily_returns(snapshots: &[Snapshot]) -> Vec<f64> {
    if snapshots.len() < 2 {
        return Vec::new();
    }
    snapshots
        .windows(2)
        .filter(|pair| pair[0].equity > 0.0)
        .map(|pair| (pair[1].equity - pair[0].equity) / pair[0].equity)
        .collect()
}

/// Annualized Sharpe ratio from daily returns. Stdev is population (divide
/// by N, not N-1), matching the source. 0 for empty input or zero stdev.
pub fn sharpe_ratio(returns: &[f64], annualization_factor: f64) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance =
        returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;
    let stdev = variance.sqrt();
    if stdev == 0.0 {
        return 0.0;
    }
    (mean / stdev) * annualization_factor.sqrt()
}

/// Maximum peak-to-trough drawdown across a snapshot sequence, as a
/// decimal (0.10 == 10%). 0 for an empty sequence.
pub fn max_drawdown(snapshots: &[Snapshot]) -> f64 {
    let Some(first) = snapshots.first() else {
        return 0.0;
    };
    let mut peak = first.equity;
    let mut worst = 0.0_f64;
    for snap in snapshots {
        if snap.equity > peak {
            peak = snap.equity;
        }
        if peak > 0.0 {
            let drawdown = (peak - snap.equity) / peak;
            if drawdown > worst {
                worst = drawdown;
            }
        }
    }
    worst
}

/// A trade's realized P&L, as seen by `win_rate` — a thinner shape than
/// `shared_models::Trade`, since only the store's closed-trade P&L column
/// is needed here.
pub struct TradeOutcome {
    pub pnl: f64,
}

/// Fraction of trades with positive P&L; 0 for an empty slice.
pub fn win_rate(trades: &[TradeOutcome]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let winners = trades.iter().filter(|t| t.pnl > 0.0).count();
    winners as f64 / trades.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
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

    #[test]
    fn total_return_zero_on_non_positive_initial() {
        assert_eq!(total_return(0.0, 500.0), 0.0);
        assert_eq!(total_return(-10.0, 500.0), 0.0);
    }

    #[test]
    fn total_return_computes_percentage() {
        assert_eq!(total_return(1000.0, 1100.0), 10.0);
    }

    #[test]
    fn daily_returns_skips_short_input() {
        assert!(daily_returns(&[snapshot(1000.0, 1)]).is_empty());
    }

    #[test]
    fn daily_returns_computes_sequence() {
        let snaps = vec![snapshot(1000.0, 1), snapshot(1100.0, 2), snapshot(1045.0, 3)];
        let returns = daily_returns(&snaps);
        assert_eq!(returns.len(), 2);
        assert!((returns[0] - 0.1).abs() < 1e-9);
        assert!((returns[1] - (-0.05)).abs() < 1e-9);
    }

    #[test]
    fn sharpe_ratio_zero_on_empty_or_flat() {
        assert_eq!(sharpe_ratio(&[], 252.0), 0.0);
        assert_eq!(sharpe_ratio(&[0.01, 0.01, 0.01], 252.0), 0.0);
    }

    #[test]
    fn sharpe_ratio_positive_for_upward_drift() {
        let returns = vec![0.01, 0.02, -0.005, 0.015, 0.0];
        let ratio = sharpe_ratio(&returns, 252.0);
        assert!(ratio > 0.0);
    }

    #[test]
    fn max_drawdown_zero_for_empty_or_monotonic_gain() {
        assert_eq!(max_drawdown(&[]), 0.0);
        let snaps = vec![snapshot(1000.0, 1), snapshot(1100.0, 2), snapshot(1200.0, 3)];
        assert_eq!(max_drawdown(&snaps), 0.0);
    }

    #[test]
    fn max_drawdown_tracks_peak_to_trough() {
        let snaps = vec![
            snapshot(1000.0, 1),
            snapshot(1200.0, 2),
            snapshot(900.0, 3),
            snapshot(1000.0, 4),
        ];
        let dd = max_drawdown(&snaps);
        assert!((dd - 0.25).abs() < 1e-9);
    }

    #[test]
    fn win_rate_zero_for_empty() {
        assert_eq!(win_rate(&[]), 0.0);
    }

    #[test]
    fn win_rate_computes_fraction() {
        let trades = vec![
            TradeOutcome { pnl: 10.0 },
            TradeOutcome { pnl: -5.0 },
            TradeOutcome { pnl: 3.0 },
            TradeOutcome { pnl: 0.0 },
        ];
        assert_eq!(win_rate(&trades), 0.5);
    }
}
