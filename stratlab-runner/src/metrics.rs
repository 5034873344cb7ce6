//! Performance metrics of one backtest run, derived from its equity curve
//! and closed trades.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Trading days per year used for annualization.
pub const TRADING_DAYS: f64 = 252.0;

/// One closed long round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub entry_price: f64,
    pub exit_price: f64,
    /// Fraction of equity committed at entry.
    pub allocation: f64,
    /// Price return of the instrument, net of fees on both sides.
    pub net_return: f64,
    pub bars_held: usize,
}

impl TradeRecord {
    pub fn is_winner(&self) -> bool {
        self.net_return > 0.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub cagr: f64,
    /// Annualized, zero risk-free rate.
    pub sharpe: f64,
    /// CAGR over the magnitude of the maximum drawdown; 0 without a drawdown.
    pub calmar: f64,
    /// Largest peak-to-trough loss as a non-positive fraction.
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub trade_count: usize,
}

impl PerformanceMetrics {
    pub fn compute(equity: &[f64], trades: &[TradeRecord]) -> Self {
        let curve = CurveStats::scan(equity);
        let cagr = curve.cagr();
        let calmar = if curve.max_drawdown < 0.0 {
            cagr / -curve.max_drawdown
        } else {
            0.0
        };
        let win_rate = if trades.is_empty() {
            0.0
        } else {
            trades.iter().filter(|t| t.is_winner()).count() as f64 / trades.len() as f64
        };
        Self {
            total_return: curve.total_return(),
            cagr,
            sharpe: curve.sharpe(),
            calmar,
            max_drawdown: curve.max_drawdown,
            win_rate,
            trade_count: trades.len(),
        }
    }
}

/// Everything the metrics need, gathered in one pass over the curve.
struct CurveStats {
    bars: usize,
    first: f64,
    last: f64,
    max_drawdown: f64,
    /// Welford accumulators over bar-to-bar returns.
    n_returns: usize,
    mean_return: f64,
    m2: f64,
}

impl CurveStats {
    fn scan(equity: &[f64]) -> Self {
        let mut stats = Self {
            bars: equity.len(),
            first: equity.first().copied().unwrap_or(0.0),
            last: equity.last().copied().unwrap_or(0.0),
            max_drawdown: 0.0,
            n_returns: 0,
            mean_return: 0.0,
            m2: 0.0,
        };
        let mut peak = f64::NEG_INFINITY;
        let mut prev: Option<f64> = None;
        for &value in equity {
            peak = peak.max(value);
            if peak > 0.0 {
                stats.max_drawdown = stats.max_drawdown.min(value / peak - 1.0);
            }
            if let Some(p) = prev {
                let r = if p > 0.0 { value / p - 1.0 } else { 0.0 };
                stats.n_returns += 1;
                let delta = r - stats.mean_return;
                stats.mean_return += delta / stats.n_returns as f64;
                stats.m2 += delta * (r - stats.mean_return);
            }
            prev = Some(value);
        }
        stats
    }

    fn total_return(&self) -> f64 {
        if self.bars < 2 || self.first <= 0.0 {
            return 0.0;
        }
        self.last / self.first - 1.0
    }

    fn cagr(&self) -> f64 {
        if self.bars < 2 || self.first <= 0.0 || self.last <= 0.0 {
            return 0.0;
        }
        let years = self.bars as f64 / TRADING_DAYS;
        (self.last / self.first).powf(1.0 / years) - 1.0
    }

    fn sharpe(&self) -> f64 {
        if self.n_returns < 2 {
            return 0.0;
        }
        let std = (self.m2 / (self.n_returns - 1) as f64).sqrt();
        if std < 1e-15 {
            return 0.0;
        }
        self.mean_return / std * TRADING_DAYS.sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(net_return: f64) -> TradeRecord {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        TradeRecord {
            entry_date: date,
            exit_date: date,
            entry_price: 100.0,
            exit_price: 100.0 * (1.0 + net_return),
            allocation: 1.0,
            net_return,
            bars_held: 3,
        }
    }

    fn metrics(equity: &[f64]) -> PerformanceMetrics {
        PerformanceMetrics::compute(equity, &[])
    }

    #[test]
    fn short_curves_have_zero_return() {
        assert_eq!(metrics(&[100.0]).total_return, 0.0);
        assert_eq!(metrics(&[]), PerformanceMetrics::default());
    }

    #[test]
    fn total_return_and_one_year_cagr() {
        assert!((metrics(&[100.0, 110.0, 120.0]).total_return - 0.2).abs() < 1e-12);
        let mut year = vec![100.0; 252];
        year[251] = 110.0;
        assert!((metrics(&year).cagr - 0.1).abs() < 1e-9);
    }

    #[test]
    fn flat_equity_has_zero_sharpe() {
        assert_eq!(metrics(&[100.0; 10]).sharpe, 0.0);
    }

    #[test]
    fn sharpe_sign_follows_direction() {
        let up = [100.0, 101.0, 101.5, 103.0, 103.2, 104.0];
        let down: Vec<f64> = up.iter().rev().copied().collect();
        assert!(metrics(&up).sharpe > 0.0);
        assert!(metrics(&down).sharpe < 0.0);
    }

    #[test]
    fn drawdown_measured_from_running_peak() {
        assert!((metrics(&[100.0, 120.0, 90.0, 130.0]).max_drawdown + 0.25).abs() < 1e-12);
        assert_eq!(metrics(&[1.0, 2.0, 3.0]).max_drawdown, 0.0);
    }

    #[test]
    fn calmar_zero_without_drawdown_negative_when_losing() {
        assert_eq!(metrics(&[1.0, 2.0, 3.0]).calmar, 0.0);
        assert!(metrics(&[100.0, 90.0, 80.0]).calmar < 0.0);
    }

    #[test]
    fn win_rate_counts_strict_winners() {
        let trades = [trade(0.1), trade(-0.05), trade(0.02), trade(0.0)];
        let m = PerformanceMetrics::compute(&[100.0, 105.0], &trades);
        assert!((m.win_rate - 0.5).abs() < 1e-12);
        assert_eq!(m.trade_count, 4);
    }
}
