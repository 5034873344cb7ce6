//! Candidate evaluation — oracle invocation, scoring and batch fan-out.
//!
//! Each unit of work is self-contained: the candidate, the shared settings
//! and the prefetched data (shared read-only through an `Arc`). Batches fan
//! out over the evaluator's own fixed-size rayon pool; optimizers never
//! open a pool of their own.
//!
//! Every failure mode (settings override errors, composition aborts, oracle
//! errors, oracle panics, non-finite scores, round timeouts) becomes a
//! failed [`EvaluationResult`]; nothing here aborts a batch.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use stratlab_core::StrategyCandidate;

use crate::config::ConfigError;
use crate::data::PrefetchedData;
use crate::metrics::PerformanceMetrics;
use crate::oracle::{AllocationMode, BacktestOracle};
use crate::scoring::ScoringWeights;
use crate::settings::SharedSettings;

// ─── Result types ────────────────────────────────────────────────────

/// Metrics extracted from one oracle run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    /// Risk-adjusted return.
    pub sharpe: f64,
    /// Drawdown-adjusted return.
    pub calmar: f64,
    pub total_return: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub trade_count: usize,
}

impl From<&PerformanceMetrics> for EvaluationMetrics {
    fn from(m: &PerformanceMetrics) -> Self {
        Self {
            sharpe: m.sharpe,
            calmar: m.calmar,
            total_return: m.total_return,
            max_drawdown: m.max_drawdown,
            win_rate: m.win_rate,
            trade_count: m.trade_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub candidate: StrategyCandidate,
    /// Raw composite score; `f64::NEG_INFINITY` on failure.
    pub score: f64,
    /// Batch-relative score set by the normalizer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized_score: Option<f64>,
    pub metrics: EvaluationMetrics,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EvaluationResult {
    pub fn succeeded(candidate: StrategyCandidate, score: f64, metrics: EvaluationMetrics) -> Self {
        Self {
            candidate,
            score,
            normalized_score: None,
            metrics,
            success: true,
            error: None,
        }
    }

    pub fn failed(candidate: StrategyCandidate, error: impl Into<String>) -> Self {
        Self {
            candidate,
            score: f64::NEG_INFINITY,
            normalized_score: None,
            metrics: EvaluationMetrics::default(),
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Evaluates candidates. Optimizers depend on this trait, not on the
/// concrete evaluator, so tests can score with a stub.
pub trait Evaluate: Send + Sync {
    fn evaluate(&self, candidate: &StrategyCandidate, mode: AllocationMode) -> EvaluationResult;

    /// Evaluate a batch, results in input order.
    fn evaluate_batch(&self, candidates: &[StrategyCandidate]) -> Vec<EvaluationResult> {
        candidates
            .iter()
            .map(|c| self.evaluate(c, AllocationMode::Optimized))
            .collect()
    }
}

// ─── CandidateEvaluator ──────────────────────────────────────────────

/// Worker-pool controls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Worker threads; `None` uses one per logical core, 1 runs inline.
    pub max_workers: Option<usize>,
    /// Wall-clock budget of one batch; candidates not started in time fail.
    pub round_timeout_secs: Option<u64>,
}

impl EvaluatorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == Some(0) {
            return Err(ConfigError::invalid("max_workers", "must be at least 1"));
        }
        if self.round_timeout_secs == Some(0) {
            return Err(ConfigError::invalid("round_timeout_secs", "must be at least 1"));
        }
        Ok(())
    }
}

pub struct CandidateEvaluator {
    oracle: Arc<dyn BacktestOracle>,
    settings: SharedSettings,
    data: Arc<PrefetchedData>,
    weights: ScoringWeights,
    pool: Option<rayon::ThreadPool>,
    round_timeout: Option<Duration>,
}

impl std::fmt::Debug for CandidateEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandidateEvaluator")
            .field("code", &self.settings.code)
            .field("workers", &self.workers())
            .field("round_timeout", &self.round_timeout)
            .finish()
    }
}

impl CandidateEvaluator {
    pub fn new(
        oracle: Arc<dyn BacktestOracle>,
        settings: SharedSettings,
        data: Arc<PrefetchedData>,
        weights: ScoringWeights,
        config: EvaluatorConfig,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        weights.validate()?;
        config.validate()?;

        let workers = config
            .max_workers
            .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, |n| n.get()));
        let pool = if workers > 1 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(workers)
                    .thread_name(|i| format!("stratlab-eval-{i}"))
                    .build()
                    .map_err(|e| ConfigError::ThreadPool(e.to_string()))?,
            )
        } else {
            None
        };

        Ok(Self {
            oracle,
            settings,
            data,
            weights,
            pool,
            round_timeout: config.round_timeout_secs.map(Duration::from_secs),
        })
    }

    pub fn settings(&self) -> &SharedSettings {
        &self.settings
    }

    pub fn data(&self) -> &PrefetchedData {
        &self.data
    }

    pub fn workers(&self) -> usize {
        self.pool.as_ref().map_or(1, |p| p.current_num_threads())
    }

    fn evaluate_before(
        &self,
        candidate: &StrategyCandidate,
        mode: AllocationMode,
        deadline: Option<Instant>,
    ) -> EvaluationResult {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return EvaluationResult::failed(candidate.clone(), "evaluation round timed out");
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.oracle.run(candidate, &self.settings, &self.data, mode)
        }));
        let result = match outcome {
            Ok(Ok(report)) => {
                let metrics = EvaluationMetrics::from(&report.metrics);
                let score = self.weights.score(&metrics);
                if score.is_finite() {
                    EvaluationResult::succeeded(candidate.clone(), score, metrics)
                } else {
                    EvaluationResult::failed(candidate.clone(), "composite score is not finite")
                }
            }
            Ok(Err(e)) => EvaluationResult::failed(candidate.clone(), e.to_string()),
            Err(payload) => {
                let msg = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                EvaluationResult::failed(candidate.clone(), format!("oracle panicked: {msg}"))
            }
        };

        match &result.error {
            None => debug!(candidate = %candidate.id, score = result.score, "candidate evaluated"),
            Some(err) => warn!(candidate = %candidate.id, error = %err, "candidate failed"),
        }
        result
    }
}

impl Evaluate for CandidateEvaluator {
    fn evaluate(&self, candidate: &StrategyCandidate, mode: AllocationMode) -> EvaluationResult {
        let deadline = self.round_timeout.map(|t| Instant::now() + t);
        self.evaluate_before(candidate, mode, deadline)
    }

    fn evaluate_batch(&self, candidates: &[StrategyCandidate]) -> Vec<EvaluationResult> {
        let start = Instant::now();
        let deadline = self.round_timeout.map(|t| start + t);
        let mode = AllocationMode::Optimized;

        let results: Vec<EvaluationResult> = match &self.pool {
            Some(pool) if candidates.len() > 1 => pool.install(|| {
                candidates
                    .par_iter()
                    .map(|c| self.evaluate_before(c, mode, deadline))
                    .collect()
            }),
            _ => candidates
                .iter()
                .map(|c| self.evaluate_before(c, mode, deadline))
                .collect(),
        };

        let ok = results.iter().filter(|r| r.success).count();
        info!(
            candidates = candidates.len(),
            succeeded = ok,
            failed = candidates.len() - ok,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "evaluation round complete"
        );
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{OracleError, OracleReport};
    use stratlab_core::domain::{Bar, DataSources, PriceSeries};
    use stratlab_core::CompositionReport;

    /// Oracle whose metrics are driven by the candidate id.
    struct ScriptedOracle;

    impl BacktestOracle for ScriptedOracle {
        fn run(
            &self,
            candidate: &StrategyCandidate,
            _settings: &SharedSettings,
            _data: &PrefetchedData,
            _mode: AllocationMode,
        ) -> Result<OracleReport, OracleError> {
            let metrics = match candidate.id.as_str() {
                "boom" => panic!("scripted panic"),
                "err" => return Err(OracleError::Failed("scripted".into())),
                "nan" => PerformanceMetrics {
                    sharpe: f64::NAN,
                    ..PerformanceMetrics::default()
                },
                _ => PerformanceMetrics {
                    sharpe: 1.0,
                    calmar: 2.0,
                    total_return: 0.5,
                    ..PerformanceMetrics::default()
                },
            };
            Ok(OracleReport {
                metrics,
                trades: Vec::new(),
                equity_curve: Vec::new(),
                allocation: 1.0,
                composition: CompositionReport::default(),
            })
        }
    }

    fn data() -> Arc<PrefetchedData> {
        let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bar = Bar {
            date,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 1.0,
        };
        Arc::new(PrefetchedData::new(
            PriceSeries::new("T", vec![bar]),
            DataSources::default(),
        ))
    }

    fn evaluator(workers: usize) -> CandidateEvaluator {
        CandidateEvaluator::new(
            Arc::new(ScriptedOracle),
            SharedSettings::default(),
            data(),
            ScoringWeights::default(),
            EvaluatorConfig {
                max_workers: Some(workers),
                round_timeout_secs: None,
            },
        )
        .unwrap()
    }

    fn batch() -> Vec<StrategyCandidate> {
        ["a", "boom", "err", "nan", "b"]
            .iter()
            .map(|id| StrategyCandidate::new(*id))
            .collect()
    }

    #[test]
    fn failures_never_abort_the_batch() {
        let results = evaluator(1).evaluate_batch(&batch());
        assert_eq!(results.len(), 5);
        let ok: Vec<&str> = results
            .iter()
            .filter(|r| r.success)
            .map(|r| r.candidate.id.as_str())
            .collect();
        assert_eq!(ok, vec!["a", "b"]);
        assert!((results[0].score - 1.2).abs() < 1e-12);
        assert!(results[1].error.as_deref().unwrap().contains("panicked"));
        assert!(results[3].error.as_deref().unwrap().contains("not finite"));
        assert_eq!(results[2].score, f64::NEG_INFINITY);
    }

    #[test]
    fn parallel_matches_sequential_in_order() {
        let seq = evaluator(1).evaluate_batch(&batch());
        let par = evaluator(3).evaluate_batch(&batch());
        assert_eq!(seq, par);
    }

    #[test]
    fn zero_workers_is_a_config_error() {
        let err = CandidateEvaluator::new(
            Arc::new(ScriptedOracle),
            SharedSettings::default(),
            data(),
            ScoringWeights::default(),
            EvaluatorConfig {
                max_workers: Some(0),
                round_timeout_secs: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
