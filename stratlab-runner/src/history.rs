//! Search histories — serializable records of one optimizer run.
//!
//! A history captures which search ran, from which base, what it found and
//! the per-generation or per-trial trail. It is what the strategy store
//! writes next to a saved candidate.
//!
//! `summary_by_signal` supports meta-analysis across evaluated batches:
//! "which signals show up in the best-scoring candidates?"

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stratlab_core::{Side, StrategyCandidate};

use crate::evaluator::EvaluationResult;
use crate::evolution::{EvolutionOutcome, GenerationRecord};
use crate::sequential::{SequentialOutcome, TrialRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    Generation,
    Evolution,
    Sequential,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHistory {
    pub kind: SearchKind,
    pub created_at: DateTime<Utc>,
    pub base_id: String,
    pub best_id: String,
    pub best_score: f64,
    pub cancelled: bool,
    pub elapsed_secs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampler: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub generations: Vec<GenerationRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trials: Vec<TrialRecord>,
}

impl SearchHistory {
    pub fn from_evolution(base: &StrategyCandidate, outcome: &EvolutionOutcome) -> Self {
        Self {
            kind: SearchKind::Evolution,
            created_at: Utc::now(),
            base_id: base.id.clone(),
            best_id: outcome.best.candidate.id.clone(),
            best_score: outcome.best.score,
            cancelled: outcome.cancelled,
            elapsed_secs: outcome.elapsed_secs,
            sampler: None,
            generations: outcome.history.clone(),
            trials: Vec::new(),
        }
    }

    pub fn from_sequential(base: &StrategyCandidate, outcome: &SequentialOutcome) -> Self {
        Self {
            kind: SearchKind::Sequential,
            created_at: Utc::now(),
            base_id: base.id.clone(),
            best_id: outcome.best.candidate.id.clone(),
            best_score: outcome.best.score,
            cancelled: outcome.cancelled,
            elapsed_secs: outcome.elapsed_secs,
            sampler: Some(outcome.sampler.clone()),
            generations: Vec::new(),
            trials: outcome.trials.clone(),
        }
    }
}

// ─── Per-signal summaries ────────────────────────────────────────────

/// Aggregate over every successful result that uses one signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSummary {
    pub count: usize,
    pub mean_score: f64,
    pub best_score: f64,
}

/// Group successful results by `side:signal` of each enabled signal.
pub fn summary_by_signal(results: &[EvaluationResult]) -> BTreeMap<String, SignalSummary> {
    let mut scores: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for result in results.iter().filter(|r| r.success) {
        for side in Side::ALL {
            for name in result.candidate.enabled_signals(side) {
                scores
                    .entry(format!("{side}:{name}"))
                    .or_default()
                    .push(result.score);
            }
        }
    }
    scores
        .into_iter()
        .map(|(key, values)| {
            let count = values.len();
            let mean_score = values.iter().sum::<f64>() / count as f64;
            let best_score = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            (
                key,
                SignalSummary {
                    count,
                    mean_score,
                    best_score,
                },
            )
        })
        .collect()
}
