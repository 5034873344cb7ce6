//! The backtest oracle contract.
//!
//! Search treats a backtest as a black box: candidate and settings in,
//! metrics and trades out. [`crate::backtest::SignalBacktester`] is the
//! reference implementation; anything implementing [`BacktestOracle`] can
//! stand in for it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use stratlab_core::{CompositionError, CompositionReport, StrategyCandidate};

use crate::config::ConfigError;
use crate::data::PrefetchedData;
use crate::metrics::{PerformanceMetrics, TradeRecord};
use crate::settings::SharedSettings;

/// How capital is allocated to each position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationMode {
    /// Full allocation on every trade; the cheap provisional pass.
    Agnostic,
    /// Allocation sized from the agnostic pass's trade statistics.
    #[default]
    Optimized,
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("invalid settings: {0}")]
    Settings(#[from] ConfigError),

    #[error(transparent)]
    Composition(#[from] CompositionError),

    #[error("relative mode requires benchmark data")]
    MissingBenchmark,

    #[error("no valid bars to trade")]
    NoBars,

    #[error("backtest failed: {0}")]
    Failed(String),
}

/// Output of one oracle run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleReport {
    pub metrics: PerformanceMetrics,
    pub trades: Vec<TradeRecord>,
    pub equity_curve: Vec<f64>,
    /// Allocation fraction actually used.
    pub allocation: f64,
    pub composition: CompositionReport,
}

pub trait BacktestOracle: Send + Sync {
    fn run(
        &self,
        candidate: &StrategyCandidate,
        settings: &SharedSettings,
        data: &PrefetchedData,
        mode: AllocationMode,
    ) -> Result<OracleReport, OracleError>;
}
