//! Sequential optimizer — sampler-driven trials over a fixed signal set,
//! optional two-stage pruning, and write-back of the best parameters.
//!
//! Trials run one at a time; each trial's evaluation goes through the
//! evaluator, which owns any parallelism.

use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use stratlab_core::rng::RngHierarchy;
use stratlab_core::{Side, SignalRegistry, StrategyCandidate};

use super::pruner::{MedianPruner, Pruner};
use super::sampler::{Sampler, SamplerKind};
use super::search_space::{ParamAssignment, SearchSpace};
use crate::config::ConfigError;
use crate::evaluator::{Evaluate, EvaluationResult};
use crate::generator::{randomized_params, ORIGIN_KEY};
use crate::oracle::AllocationMode;
use crate::progress::{SearchControl, SearchError};

/// Objective value recorded for a trial that failed for any reason other
/// than pruning.
pub const FAILED_TRIAL_SCORE: f64 = -999.0;

/// Metadata key listing signals injected by [`StructureMode::RandomAdd`].
pub const ADDED_SIGNALS_KEY: &str = "added_signals";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StructureMode {
    /// Search the base candidate's signals only.
    #[default]
    Fixed,
    /// Inject up to `max_added_signals` new non-conflicting signals first.
    RandomAdd,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequentialConfig {
    pub n_trials: usize,
    pub sampler: SamplerKind,
    /// Two-stage evaluation with median pruning on the provisional score.
    pub pruning: bool,
    pub pruner_startup_trials: usize,
    pub structure_mode: StructureMode,
    pub max_added_signals: usize,
    pub seed: u64,
}

impl Default for SequentialConfig {
    fn default() -> Self {
        Self {
            n_trials: 50,
            sampler: SamplerKind::Tpe,
            pruning: true,
            pruner_startup_trials: 5,
            structure_mode: StructureMode::Fixed,
            max_added_signals: 2,
            seed: 42,
        }
    }
}

impl SequentialConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_trials == 0 {
            return Err(ConfigError::invalid("n_trials", "must be at least 1"));
        }
        if self.structure_mode == StructureMode::RandomAdd && self.max_added_signals == 0 {
            return Err(ConfigError::invalid(
                "max_added_signals",
                "must be at least 1 in random-add mode",
            ));
        }
        Ok(())
    }
}

// ─── Trial records ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrialState {
    Complete,
    Pruned,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub number: usize,
    pub params: ParamAssignment,
    pub state: TrialState,
    /// Objective value; the sentinel for failed trials, `None` if pruned.
    pub value: Option<f64>,
    /// Allocation-agnostic score from the first stage, when it ran.
    pub provisional: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequentialOutcome {
    pub best: EvaluationResult,
    pub best_params: ParamAssignment,
    pub trials: Vec<TrialRecord>,
    pub sampler: String,
    pub cancelled: bool,
    pub elapsed_secs: f64,
}

impl SequentialOutcome {
    pub fn best_candidate(&self) -> &StrategyCandidate {
        &self.best.candidate
    }

    pub fn count(&self, state: TrialState) -> usize {
        self.trials.iter().filter(|t| t.state == state).count()
    }
}

// ─── Optimizer ───────────────────────────────────────────────────────

pub struct SequentialOptimizer {
    registry: Arc<SignalRegistry>,
    config: SequentialConfig,
    sampler: Box<dyn Sampler>,
    pruner: Box<dyn Pruner>,
    rng: StdRng,
}

impl SequentialOptimizer {
    pub fn new(registry: Arc<SignalRegistry>, config: SequentialConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let sampler = config.sampler.build();
        let pruner = Box::new(MedianPruner {
            n_startup_trials: config.pruner_startup_trials,
        });
        let rng = RngHierarchy::new(config.seed).rng_for("sequential", 0);
        Ok(Self {
            registry,
            config,
            sampler,
            pruner,
            rng,
        })
    }

    /// Replace the configured sampler.
    pub fn with_sampler(mut self, sampler: Box<dyn Sampler>) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_pruner(mut self, pruner: Box<dyn Pruner>) -> Self {
        self.pruner = pruner;
        self
    }

    pub fn config(&self) -> &SequentialConfig {
        &self.config
    }

    /// Search parameters of `base` (plus injected signals in random-add
    /// mode) for `n_trials` trials. A base with nothing to search runs a
    /// single trial. Fails only if no trial completed.
    pub fn run(
        &mut self,
        base: &StrategyCandidate,
        evaluator: &dyn Evaluate,
        control: SearchControl<'_>,
    ) -> Result<SequentialOutcome, SearchError> {
        let start = Instant::now();
        let base = self.registry.complete_candidate(base);
        let base = match self.config.structure_mode {
            StructureMode::Fixed => base,
            StructureMode::RandomAdd => self.add_random_signals(&base),
        };
        let space = SearchSpace::from_candidate(&self.registry, &base);
        let total = if space.is_empty() { 1 } else { self.config.n_trials };

        info!(
            base = %base.id,
            sampler = self.sampler.name(),
            params = space.len(),
            trials = total,
            pruning = self.config.pruning,
            "sequential search started"
        );

        let mut trials: Vec<TrialRecord> = Vec::with_capacity(total);
        let mut best: Option<(EvaluationResult, ParamAssignment)> = None;
        let mut cancelled = false;

        for number in 0..total {
            let params = self.sampler.suggest(&space, &trials, &mut self.rng);
            let mut candidate = space.apply(&self.registry, &base, &params);
            candidate.id = format!("seq_{}_t{number:03}", self.config.seed);
            candidate.metadata.insert(ORIGIN_KEY.to_string(), "sequential".to_string());

            let (record, result) = self.run_trial(number, params, &candidate, evaluator, &trials);
            debug!(number, state = ?record.state, value = ?record.value, "trial finished");
            if let Some(result) = result {
                if best.as_ref().map_or(true, |(b, _)| result.score > b.score) {
                    best = Some((result, record.params.clone()));
                }
            }
            trials.push(record);
            control.report(number + 1, total, best.as_ref().map(|(b, _)| b.score));

            if control.is_cancelled() && number + 1 < total {
                info!(completed = number + 1, "sequential search cancelled");
                cancelled = true;
                break;
            }
        }

        let (mut best, best_params) = best.ok_or(SearchError::NoCompletedTrials)?;
        best.candidate.id = format!("{}_best", base.id);
        let outcome = SequentialOutcome {
            best,
            best_params,
            sampler: self.sampler.name().to_string(),
            cancelled,
            elapsed_secs: start.elapsed().as_secs_f64(),
            trials,
        };
        info!(
            score = outcome.best.score,
            complete = outcome.count(TrialState::Complete),
            pruned = outcome.count(TrialState::Pruned),
            failed = outcome.count(TrialState::Failed),
            elapsed_secs = outcome.elapsed_secs,
            "sequential search finished"
        );
        Ok(outcome)
    }

    /// One trial: optional allocation-agnostic first stage reported to the
    /// pruner, then the allocation-optimized run.
    fn run_trial(
        &self,
        number: usize,
        params: ParamAssignment,
        candidate: &StrategyCandidate,
        evaluator: &dyn Evaluate,
        history: &[TrialRecord],
    ) -> (TrialRecord, Option<EvaluationResult>) {
        let failed = |params: ParamAssignment, provisional: Option<f64>, error: Option<&str>| {
            warn!(number, error = error.unwrap_or(""), "trial failed");
            TrialRecord {
                number,
                params,
                state: TrialState::Failed,
                value: Some(FAILED_TRIAL_SCORE),
                provisional,
            }
        };

        let mut provisional = None;
        if self.config.pruning {
            let first = evaluator.evaluate(candidate, AllocationMode::Agnostic);
            if !first.success {
                return (failed(params, None, first.error.as_deref()), None);
            }
            provisional = Some(first.score);
            if self.pruner.should_prune(first.score, history) {
                return (
                    TrialRecord {
                        number,
                        params,
                        state: TrialState::Pruned,
                        value: None,
                        provisional,
                    },
                    None,
                );
            }
        }

        let second = evaluator.evaluate(candidate, AllocationMode::Optimized);
        if !second.success {
            return (failed(params, provisional, second.error.as_deref()), None);
        }
        (
            TrialRecord {
                number,
                params,
                state: TrialState::Complete,
                value: Some(second.score),
                provisional,
            },
            Some(second),
        )
    }

    /// Inject between one and `max_added_signals` signals absent from
    /// `base`, each on a random side, skipping any that conflict.
    fn add_random_signals(&mut self, base: &StrategyCandidate) -> StrategyCandidate {
        let mut candidate = base.clone();
        let target = self.rng.gen_range(1..=self.config.max_added_signals);
        let mut added = Vec::new();

        for _ in 0..target {
            let side = if self.rng.gen_bool(0.5) { Side::Entry } else { Side::Exit };
            let present: Vec<&str> = candidate.side(side).keys().map(String::as_str).collect();
            let pool: Vec<String> = self
                .registry
                .list_available(side, &[], &[])
                .into_iter()
                .map(|d| d.name.clone())
                .filter(|name| {
                    !present.contains(&name.as_str()) && !self.registry.conflicts_with(name, &present)
                })
                .collect();
            if pool.is_empty() {
                continue;
            }
            let name = &pool[self.rng.gen_range(0..pool.len())];
            match randomized_params(&self.registry, name, side, &mut self.rng) {
                Ok(params) => {
                    candidate.side_mut(side).insert(name.clone(), params);
                    added.push(format!("{side}:{name}"));
                }
                Err(e) => warn!(signal = %name, error = %e, "could not add signal"),
            }
        }

        if !added.is_empty() {
            info!(added = ?added, "random-add injected signals");
            candidate
                .metadata
                .insert(ADDED_SIGNALS_KEY.to_string(), added.join(","));
        }
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_and_validation() {
        let config = SequentialConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sampler, SamplerKind::Tpe);

        let zero = SequentialConfig {
            n_trials: 0,
            ..SequentialConfig::default()
        };
        assert!(zero.validate().is_err());

        let no_room = SequentialConfig {
            structure_mode: StructureMode::RandomAdd,
            max_added_signals: 0,
            ..SequentialConfig::default()
        };
        assert!(no_room.validate().is_err());
    }

    #[test]
    fn random_add_injects_bounded_non_conflicting_signals() {
        let registry = Arc::new(SignalRegistry::builtin().unwrap());
        let config = SequentialConfig {
            structure_mode: StructureMode::RandomAdd,
            max_added_signals: 2,
            ..SequentialConfig::default()
        };
        let base = StrategyCandidate::new("b").with_signal(
            Side::Entry,
            "crossover",
            registry.default_params("crossover", Side::Entry).unwrap(),
        );
        for seed in 0..20 {
            let mut opt = SequentialOptimizer::new(
                registry.clone(),
                SequentialConfig {
                    seed,
                    ..config.clone()
                },
            )
            .unwrap();
            let out = opt.add_random_signals(&base);
            let added = out.entry.len() + out.exit.len() - 1;
            assert!(added <= 2);
            assert!(!out.entry.contains_key("ma_breakout"));
            assert!(out.entry.contains_key("crossover"));
        }
    }
}
