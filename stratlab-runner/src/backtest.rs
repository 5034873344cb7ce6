//! Reference backtest oracle: long-only, close-to-close, per-side fees.
//!
//! Decisions come from composing the candidate's signals on the shared
//! price series. A position opens at the close of a bar whose entry is
//! true and exit is false, and closes at the close of the next bar whose
//! exit is true. Composition always fires an exit on the last valid bar,
//! so every trade is closed by the end of the run.
//!
//! Allocation-optimized runs first run allocation-agnostic (full
//! allocation), estimate a Kelly fraction from those trades, scale and
//! clamp it, then rerun at that fraction.

use std::borrow::Cow;
use std::sync::Arc;

use tracing::debug;

use stratlab_core::domain::{DecisionSeries, PriceSeries};
use stratlab_core::{Composer, SignalInputs, SignalRegistry, StrategyCandidate};

use crate::data::PrefetchedData;
use crate::metrics::{PerformanceMetrics, TradeRecord};
use crate::oracle::{AllocationMode, BacktestOracle, OracleError, OracleReport};
use crate::settings::SharedSettings;

#[derive(Debug, Clone)]
pub struct SignalBacktester {
    registry: Arc<SignalRegistry>,
}

impl SignalBacktester {
    pub fn new(registry: Arc<SignalRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SignalRegistry {
        &self.registry
    }
}

impl BacktestOracle for SignalBacktester {
    fn run(
        &self,
        candidate: &StrategyCandidate,
        settings: &SharedSettings,
        data: &PrefetchedData,
        mode: AllocationMode,
    ) -> Result<OracleReport, OracleError> {
        let settings = settings.with_overrides(&candidate.shared_overrides)?;

        let prices: Cow<'_, PriceSeries> = if settings.relative_mode {
            let benchmark = data
                .sources
                .benchmark
                .as_ref()
                .ok_or(OracleError::MissingBenchmark)?;
            Cow::Owned(data.prices.relative_to(benchmark))
        } else {
            Cow::Borrowed(&data.prices)
        };
        if !prices.has_valid_close() {
            return Err(OracleError::NoBars);
        }

        let inputs = SignalInputs::new(&prices, &data.sources, settings.relative_mode);
        let composed = Composer::new(&self.registry).compose_candidate(candidate, &inputs)?;

        let mut run = simulate(&prices, &composed.entry, &composed.exit, &settings, 1.0);
        let allocation = match mode {
            AllocationMode::Agnostic => 1.0,
            AllocationMode::Optimized => {
                let fraction = kelly_allocation(&run.trades, &settings);
                if (fraction - 1.0).abs() > f64::EPSILON {
                    run = simulate(&prices, &composed.entry, &composed.exit, &settings, fraction);
                }
                fraction
            }
        };

        let metrics = PerformanceMetrics::compute(&run.equity, &run.trades);
        debug!(
            candidate = %candidate.id,
            ?mode,
            allocation,
            trades = run.trades.len(),
            total_return = metrics.total_return,
            "backtest complete"
        );
        Ok(OracleReport {
            metrics,
            trades: run.trades,
            equity_curve: run.equity,
            allocation,
            composition: composed.report,
        })
    }
}

// ─── Simulation ──────────────────────────────────────────────────────

struct SimulationRun {
    equity: Vec<f64>,
    trades: Vec<TradeRecord>,
}

struct OpenPosition {
    entry_index: usize,
    entry_price: f64,
    units: f64,
}

/// Bar loop over composed decisions. Bars without a finite close carry
/// equity forward and cannot open or close a position.
fn simulate(
    prices: &PriceSeries,
    entry: &DecisionSeries,
    exit: &DecisionSeries,
    settings: &SharedSettings,
    allocation: f64,
) -> SimulationRun {
    let fee = settings.fee_rate;
    let mut cash = settings.initial_cash;
    let mut position: Option<OpenPosition> = None;
    let mut last_close = f64::NAN;
    let mut equity = Vec::with_capacity(prices.len());
    let mut trades = Vec::new();

    for (i, bar) in prices.bars.iter().enumerate() {
        let close = bar.close;
        if close.is_finite() && close > 0.0 {
            last_close = close;
            let exit_now = exit.values[i];
            match position.take() {
                Some(open) if exit_now => {
                    cash += open.units * close * (1.0 - fee);
                    trades.push(TradeRecord {
                        entry_date: prices.bars[open.entry_index].date,
                        exit_date: bar.date,
                        entry_price: open.entry_price,
                        exit_price: close,
                        allocation,
                        net_return: (close * (1.0 - fee)) / (open.entry_price * (1.0 + fee)) - 1.0,
                        bars_held: i - open.entry_index,
                    });
                }
                Some(open) => position = Some(open),
                None if entry.values[i] && !exit_now => {
                    let budget = cash * allocation;
                    let units = budget / (close * (1.0 + fee));
                    cash -= budget;
                    position = Some(OpenPosition {
                        entry_index: i,
                        entry_price: close,
                        units,
                    });
                }
                None => {}
            }
        }
        let held = position
            .as_ref()
            .map_or(0.0, |p| if last_close.is_finite() { p.units * last_close } else { 0.0 });
        equity.push(cash + held);
    }

    SimulationRun { equity, trades }
}

/// Scaled Kelly fraction from trade statistics, clamped to the configured
/// allocation bounds. No trades or no losses allocate the maximum; no
/// wins allocate the minimum.
pub fn kelly_allocation(trades: &[TradeRecord], settings: &SharedSettings) -> f64 {
    let (lo, hi) = (settings.min_allocation, settings.max_allocation);
    let wins: Vec<f64> = trades.iter().filter(|t| t.is_winner()).map(|t| t.net_return).collect();
    let losses: Vec<f64> = trades
        .iter()
        .filter(|t| !t.is_winner())
        .map(|t| -t.net_return)
        .collect();

    if trades.is_empty() || losses.is_empty() {
        return hi;
    }
    if wins.is_empty() {
        return lo;
    }
    let p = wins.len() as f64 / trades.len() as f64;
    let avg_win = wins.iter().sum::<f64>() / wins.len() as f64;
    let avg_loss = losses.iter().sum::<f64>() / losses.len() as f64;
    if avg_loss <= 0.0 {
        return hi;
    }
    let payoff = avg_win / avg_loss;
    let kelly = p - (1.0 - p) / payoff;
    (kelly * settings.kelly_scale).clamp(lo, hi)
}
