//! Evolutionary optimizer — elitism, tournament selection, uniform
//! crossover over signal names, Gaussian parameter mutation.
//!
//! The optimizer is a single-threaded control loop: every generation is
//! handed to the evaluator as one batch, and parallelism lives there.
//! Results of successful evaluations are cached by the candidate's full
//! content hash, so unchanged elites are never re-run and the best score
//! never decreases from one generation to the next.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use stratlab_core::rng::RngHierarchy;
use stratlab_core::{ContentHash, Side, SignalConfig, SignalRegistry, StrategyCandidate};

use crate::config::ConfigError;
use crate::evaluator::{Evaluate, EvaluationResult};
use crate::generator::ORIGIN_KEY;
use crate::progress::{SearchControl, SearchError};

/// Mutation strength used to diversify the initial population.
pub const INITIAL_MUTATION_STRENGTH: f64 = 0.3;

/// Standard deviation of a parameter perturbation, as a fraction of the
/// parameter's registry range.
pub const MUTATION_SCALE: f64 = 0.2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    pub population_size: usize,
    pub generations: usize,
    /// Fraction of each generation carried over unchanged (at least one).
    pub elite_ratio: f64,
    pub tournament_size: usize,
    pub crossover_rate: f64,
    /// Probability that a bred child is mutated.
    pub mutation_rate: f64,
    /// Per-signal probability of perturbation inside one mutation.
    pub mutation_strength: f64,
    pub seed: u64,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: 20,
            generations: 10,
            elite_ratio: 0.1,
            tournament_size: 3,
            crossover_rate: 0.7,
            mutation_rate: 0.3,
            mutation_strength: 0.3,
            seed: 42,
        }
    }
}

impl EvolutionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population_size < 2 {
            return Err(ConfigError::invalid("population_size", "must be at least 2"));
        }
        if self.generations == 0 {
            return Err(ConfigError::invalid("generations", "must be at least 1"));
        }
        if self.tournament_size == 0 || self.tournament_size > self.population_size {
            return Err(ConfigError::invalid(
                "tournament_size",
                "must be between 1 and population_size",
            ));
        }
        for (field, value) in [
            ("elite_ratio", self.elite_ratio),
            ("crossover_rate", self.crossover_rate),
            ("mutation_rate", self.mutation_rate),
            ("mutation_strength", self.mutation_strength),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::invalid(field, "must be in [0, 1]"));
            }
        }
        Ok(())
    }

    pub fn elite_count(&self) -> usize {
        ((self.population_size as f64 * self.elite_ratio).floor() as usize).max(1)
    }
}

// ─── Outcome types ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    /// 1-based.
    pub generation: usize,
    pub best_score: f64,
    pub mean_score: f64,
    /// Successful evaluations in this generation.
    pub survivors: usize,
    /// Candidates actually sent to the evaluator (cache misses).
    pub evaluated: usize,
    /// Running best across all generations so far.
    pub best_so_far: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionOutcome {
    pub best: EvaluationResult,
    pub history: Vec<GenerationRecord>,
    pub cancelled: bool,
    pub elapsed_secs: f64,
}

impl EvolutionOutcome {
    pub fn best_candidate(&self) -> &StrategyCandidate {
        &self.best.candidate
    }
}

// ─── Operators ───────────────────────────────────────────────────────

/// Copy of `candidate` where each enabled signal, with probability
/// `strength`, has every parameter the registry ranges perturbed by a
/// Gaussian of σ = 20% of its range, then clamped (integers rounded) and
/// normalized. Keys missing from a sparse set start from their defaults.
pub fn mutate(
    candidate: &StrategyCandidate,
    registry: &SignalRegistry,
    strength: f64,
    rng: &mut impl Rng,
) -> StrategyCandidate {
    let mut child = candidate.clone();
    for side in Side::ALL {
        for (name, params) in child.side_mut(side).iter_mut() {
            if !params.enabled() || !rng.gen_bool(strength.clamp(0.0, 1.0)) {
                continue;
            }
            let Some(def) = registry.get(name) else {
                continue;
            };
            registry.complete_params(name, side, params);
            for (path, range) in &def.param_ranges {
                let Some(current) = params.number(path) else {
                    continue;
                };
                let Ok(noise) = Normal::new(0.0, MUTATION_SCALE * range.span()) else {
                    continue;
                };
                params.set(path, range.clamp(current + noise.sample(rng)));
            }
            registry.normalize(name, params);
        }
    }
    child
}

/// Uniform crossover. For each side independently, every signal name in
/// the union of both parents is offered by one parent chosen by a fair
/// coin; it is inherited if that parent has it. Names conflicting with an
/// already inherited one are dropped. A side left empty while a parent had
/// signals falls back to parent A's side.
pub fn crossover(
    a: &StrategyCandidate,
    b: &StrategyCandidate,
    registry: &SignalRegistry,
    rng: &mut impl Rng,
) -> StrategyCandidate {
    let mut child = a.clone();
    for side in Side::ALL {
        let (sa, sb) = (a.side(side), b.side(side));
        let names: BTreeSet<&String> = sa.keys().chain(sb.keys()).collect();
        let mut merged = SignalConfig::new();
        for name in names {
            let donor = if rng.gen_bool(0.5) { sa } else { sb };
            let Some(params) = donor.get(name) else {
                continue;
            };
            let kept: Vec<&String> = merged.keys().collect();
            if registry.conflicts_with(name, &kept) {
                continue;
            }
            merged.insert(name.clone(), params.clone());
        }
        if merged.is_empty() && !(sa.is_empty() && sb.is_empty()) {
            merged = sa.clone();
        }
        *child.side_mut(side) = merged;
    }
    child
}

/// Best of `size` random draws (with replacement) from `pool`.
fn tournament<'a>(pool: &'a [EvaluationResult], size: usize, rng: &mut StdRng) -> &'a EvaluationResult {
    let mut best = &pool[rng.gen_range(0..pool.len())];
    for _ in 1..size {
        let contender = &pool[rng.gen_range(0..pool.len())];
        if contender.score > best.score {
            best = contender;
        }
    }
    best
}

fn sort_by_score(results: &mut [EvaluationResult]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

// ─── Optimizer ───────────────────────────────────────────────────────

pub struct EvolutionaryOptimizer {
    registry: Arc<SignalRegistry>,
    config: EvolutionConfig,
    rng: StdRng,
    /// Successful results of the current run, by full content hash.
    cache: HashMap<ContentHash, EvaluationResult>,
}

impl EvolutionaryOptimizer {
    /// Validates the config and seeds the optimizer's random source.
    pub fn new(registry: Arc<SignalRegistry>, config: EvolutionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let rng = RngHierarchy::new(config.seed).rng_for("evolution", 0);
        Ok(Self {
            registry,
            config,
            rng,
            cache: HashMap::new(),
        })
    }

    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    /// Evolve from `base` for the configured number of generations.
    ///
    /// The score cache lives for one run only. Cancellation is checked
    /// after each generation; a cancelled run returns the best found so
    /// far with `cancelled` set.
    pub fn run(
        &mut self,
        base: &StrategyCandidate,
        evaluator: &dyn Evaluate,
        control: SearchControl<'_>,
    ) -> Result<EvolutionOutcome, SearchError> {
        let start = Instant::now();
        self.cache.clear();
        let base = self.registry.complete_candidate(base);
        let total = self.config.generations;
        let mut population = self.initial_population(&base);
        let mut history = Vec::with_capacity(total);
        let mut best: Option<EvaluationResult> = None;
        let mut cancelled = false;

        info!(
            base = %base.id,
            population = self.config.population_size,
            generations = total,
            seed = self.config.seed,
            "evolution started"
        );

        for generation in 1..=total {
            let (mut survivors, evaluated) = self.evaluate(&population, evaluator);
            if survivors.is_empty() {
                return Err(SearchError::NoSuccessfulEvaluations { generation });
            }
            sort_by_score(&mut survivors);

            let leader = &survivors[0];
            if best.as_ref().map_or(true, |b| leader.score > b.score) {
                best = Some(leader.clone());
            }
            let best_so_far = best.as_ref().map_or(leader.score, |b| b.score);
            let mean_score =
                survivors.iter().map(|r| r.score).sum::<f64>() / survivors.len() as f64;
            let record = GenerationRecord {
                generation,
                best_score: leader.score,
                mean_score,
                survivors: survivors.len(),
                evaluated,
                best_so_far,
            };
            info!(
                generation,
                best = record.best_score,
                mean = record.mean_score,
                survivors = record.survivors,
                evaluated,
                "generation complete"
            );
            history.push(record);
            control.report(generation, total, Some(best_so_far));

            if generation == total {
                break;
            }
            if control.is_cancelled() {
                info!(generation, "evolution cancelled");
                cancelled = true;
                break;
            }
            population = self.next_generation(&survivors, generation);
        }

        let best = best.ok_or(SearchError::NoSuccessfulEvaluations { generation: 0 })?;
        let elapsed_secs = start.elapsed().as_secs_f64();
        info!(best = %best.candidate.id, score = best.score, elapsed_secs, "evolution finished");
        Ok(EvolutionOutcome {
            best,
            history,
            cancelled,
            elapsed_secs,
        })
    }

    /// `[base] + (size - 1)` mutated copies of it.
    fn initial_population(&mut self, base: &StrategyCandidate) -> Vec<StrategyCandidate> {
        let mut population = Vec::with_capacity(self.config.population_size);
        population.push(base.clone());
        for i in 1..self.config.population_size {
            let mut copy = mutate(base, &self.registry, INITIAL_MUTATION_STRENGTH, &mut self.rng);
            copy = copy.derive(format!("evo_g0_{i:03}"));
            copy.metadata.insert(ORIGIN_KEY.to_string(), "evolution".to_string());
            population.push(copy);
        }
        population
    }

    /// Evaluate cache misses as one batch; returns successes (in
    /// population order) and the number of fresh evaluations.
    fn evaluate(
        &mut self,
        population: &[StrategyCandidate],
        evaluator: &dyn Evaluate,
    ) -> (Vec<EvaluationResult>, usize) {
        let hashes: Vec<ContentHash> = population.iter().map(|c| c.full_hash()).collect();
        let mut pending: Vec<StrategyCandidate> = Vec::new();
        let mut pending_hashes: BTreeSet<&ContentHash> = BTreeSet::new();
        for (candidate, hash) in population.iter().zip(&hashes) {
            if !self.cache.contains_key(hash) && pending_hashes.insert(hash) {
                pending.push(candidate.clone());
            }
        }

        let evaluated = pending.len();
        let mut fresh: HashMap<ContentHash, EvaluationResult> = HashMap::new();
        for result in evaluator.evaluate_batch(&pending) {
            let hash = result.candidate.full_hash();
            if result.success {
                self.cache.insert(hash, result);
            } else {
                debug!(
                    candidate = %result.candidate.id,
                    error = result.error.as_deref().unwrap_or(""),
                    "candidate failed"
                );
                fresh.insert(hash, result);
            }
        }

        let survivors = population
            .iter()
            .zip(&hashes)
            .filter(|(_, hash)| !fresh.contains_key(*hash))
            .filter_map(|(candidate, hash)| {
                self.cache.get(hash).map(|cached| EvaluationResult {
                    candidate: candidate.clone(),
                    ..cached.clone()
                })
            })
            .collect();
        (survivors, evaluated)
    }

    /// Elites unchanged, then tournament-bred children until full.
    fn next_generation(
        &mut self,
        ranked: &[EvaluationResult],
        generation: usize,
    ) -> Vec<StrategyCandidate> {
        let size = self.config.population_size;
        let elites = self.config.elite_count().min(ranked.len());
        let mut next: Vec<StrategyCandidate> =
            ranked[..elites].iter().map(|r| r.candidate.clone()).collect();

        while next.len() < size {
            let parent_a = &tournament(ranked, self.config.tournament_size, &mut self.rng).candidate;
            let parent_b = &tournament(ranked, self.config.tournament_size, &mut self.rng).candidate;
            let mut child = if self.rng.gen_bool(self.config.crossover_rate) {
                crossover(parent_a, parent_b, &self.registry, &mut self.rng)
            } else {
                parent_a.clone()
            };
            if self.rng.gen_bool(self.config.mutation_rate) {
                child = mutate(&child, &self.registry, self.config.mutation_strength, &mut self.rng);
            }
            let mut child = child.derive(format!("evo_g{generation}_{:03}", next.len()));
            child.metadata.insert(ORIGIN_KEY.to_string(), "evolution".to_string());
            child
                .metadata
                .insert("second_parent".to_string(), parent_b.id.clone());
            next.push(child);
        }
        next
    }
}
