//! Parameter samplers for the sequential optimizer.
//!
//! Samplers are stateless: each suggestion is a function of the search
//! space, the trial history and the optimizer's random source. Only trials
//! that produced a value (complete or failed) inform a suggestion.

use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use stratlab_core::ParamRange;

use super::optimizer::TrialRecord;
use super::search_space::{ParamAssignment, SearchSpace};

pub trait Sampler: Send + Sync {
    fn name(&self) -> &'static str;

    fn suggest(&self, space: &SearchSpace, history: &[TrialRecord], rng: &mut StdRng) -> ParamAssignment;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SamplerKind {
    /// Tree-structured Parzen estimator.
    #[default]
    Tpe,
    Random,
    EvolutionStrategy,
}

impl SamplerKind {
    pub fn build(self) -> Box<dyn Sampler> {
        match self {
            Self::Tpe => Box::new(TpeSampler::default()),
            Self::Random => Box::new(RandomSampler),
            Self::EvolutionStrategy => Box::new(EvolutionStrategySampler::default()),
        }
    }
}

/// `(assignment, value)` of every trial that produced a value, best first.
fn scored(history: &[TrialRecord]) -> Vec<(&ParamAssignment, f64)> {
    let mut out: Vec<(&ParamAssignment, f64)> = history
        .iter()
        .filter_map(|t| t.value.filter(|v| v.is_finite()).map(|v| (&t.params, v)))
        .collect();
    out.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    out
}

fn uniform(space: &SearchSpace, rng: &mut StdRng) -> ParamAssignment {
    space
        .params()
        .iter()
        .map(|p| (p.name.clone(), p.range.sample(rng)))
        .collect()
}

// ─── Random ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSampler;

impl Sampler for RandomSampler {
    fn name(&self) -> &'static str {
        "random"
    }

    fn suggest(&self, space: &SearchSpace, _history: &[TrialRecord], rng: &mut StdRng) -> ParamAssignment {
        uniform(space, rng)
    }
}

// ─── TPE ─────────────────────────────────────────────────────────────

/// Splits history into the top `gamma` fraction ("good") and the rest,
/// draws `n_candidates` points around good observations and keeps the one
/// maximizing l(x) / g(x). Uniform until `n_startup_trials` values exist.
#[derive(Debug, Clone, Copy)]
pub struct TpeSampler {
    pub n_startup_trials: usize,
    pub gamma: f64,
    pub n_candidates: usize,
}

impl Default for TpeSampler {
    fn default() -> Self {
        Self {
            n_startup_trials: 10,
            gamma: 0.2,
            n_candidates: 24,
        }
    }
}

impl TpeSampler {
    fn sample_numeric(&self, range: &ParamRange, good: &[f64], bad: &[f64], rng: &mut StdRng) -> f64 {
        let sigma = 0.1 * range.span();
        if sigma <= 0.0 || good.is_empty() {
            return range.sample(rng);
        }
        let Ok(unit) = Normal::new(0.0, sigma) else {
            return range.sample(rng);
        };
        let density = |x: f64, points: &[f64]| -> f64 {
            if points.is_empty() {
                return 0.0;
            }
            points.iter().map(|&m| gaussian_pdf(x, m, sigma)).sum::<f64>() / points.len() as f64
        };

        let mut best_value = range.clamp(good[0]);
        let mut best_ratio = f64::NEG_INFINITY;
        for _ in 0..self.n_candidates {
            let center = good[rng.gen_range(0..good.len())];
            let x = range.clamp(center + unit.sample(rng));
            let ratio = density(x, good) / (density(x, bad) + 1e-10);
            if ratio > best_ratio {
                best_ratio = ratio;
                best_value = x;
            }
        }
        best_value
    }
}

fn gaussian_pdf(x: f64, mean: f64, sigma: f64) -> f64 {
    let z = (x - mean) / sigma;
    (-0.5 * z * z).exp() / (sigma * (2.0 * std::f64::consts::PI).sqrt())
}

impl Sampler for TpeSampler {
    fn name(&self) -> &'static str {
        "tpe"
    }

    fn suggest(&self, space: &SearchSpace, history: &[TrialRecord], rng: &mut StdRng) -> ParamAssignment {
        let observed = scored(history);
        if observed.len() < self.n_startup_trials.max(1) {
            return uniform(space, rng);
        }
        let n_good = ((observed.len() as f64 * self.gamma).ceil() as usize).clamp(1, observed.len());
        let (good, bad) = observed.split_at(n_good);

        space
            .params()
            .iter()
            .map(|p| {
                let values = |group: &[(&ParamAssignment, f64)]| -> Vec<f64> {
                    group.iter().filter_map(|(a, _)| a.get(&p.name).copied()).collect()
                };
                let value = self.sample_numeric(&p.range, &values(good), &values(bad), rng);
                (p.name.clone(), value)
            })
            .collect()
    }
}

// ─── Evolution strategy ──────────────────────────────────────────────

/// (1+1)-style strategy: perturb the best assignment so far with Gaussian
/// noise whose width shrinks geometrically with the number of observations.
#[derive(Debug, Clone, Copy)]
pub struct EvolutionStrategySampler {
    /// Initial σ as a fraction of each parameter's range.
    pub initial_sigma: f64,
    pub decay: f64,
    pub min_sigma: f64,
}

impl Default for EvolutionStrategySampler {
    fn default() -> Self {
        Self {
            initial_sigma: 0.3,
            decay: 0.95,
            min_sigma: 0.02,
        }
    }
}

impl Sampler for EvolutionStrategySampler {
    fn name(&self) -> &'static str {
        "evolution-strategy"
    }

    fn suggest(&self, space: &SearchSpace, history: &[TrialRecord], rng: &mut StdRng) -> ParamAssignment {
        let observed = scored(history);
        let Some((parent, _)) = observed.first() else {
            return uniform(space, rng);
        };
        let scale = (self.initial_sigma * self.decay.powi(observed.len() as i32)).max(self.min_sigma);

        space
            .params()
            .iter()
            .map(|p| {
                let value = match (parent.get(&p.name), Normal::new(0.0, scale * p.range.span())) {
                    (Some(&current), Ok(noise)) => p.range.clamp(current + noise.sample(rng)),
                    _ => p.range.sample(rng),
                };
                (p.name.clone(), value)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequential::optimizer::TrialState;
    use stratlab_core::rng::RngHierarchy;
    use stratlab_core::{Side, SignalRegistry, StrategyCandidate};

    fn space() -> SearchSpace {
        let reg = SignalRegistry::builtin().unwrap();
        let c = StrategyCandidate::new("c").with_signal(
            Side::Entry,
            "period_breakout",
            reg.default_params("period_breakout", Side::Entry).unwrap(),
        );
        SearchSpace::from_candidate(&reg, &c)
    }

    fn trial(number: usize, value: f64, params: ParamAssignment) -> TrialRecord {
        TrialRecord {
            number,
            params,
            state: TrialState::Complete,
            value: Some(value),
            provisional: None,
        }
    }

    #[test]
    fn all_samplers_respect_bounds() {
        let space = space();
        let mut rng = RngHierarchy::new(11).rng_for("t", 0);
        let mut history = Vec::new();
        for kind in [SamplerKind::Random, SamplerKind::Tpe, SamplerKind::EvolutionStrategy] {
            let sampler = kind.build();
            for n in 0..30 {
                let a = sampler.suggest(&space, &history, &mut rng);
                for p in space.params() {
                    let v = a[&p.name];
                    assert!(p.range.contains(v), "{} {} = {v}", sampler.name(), p.name);
                    assert_eq!(v, p.range.clamp(v));
                }
                history.push(trial(n, a.values().sum::<f64>(), a));
            }
        }
    }

    #[test]
    fn tpe_concentrates_near_good_region() {
        let space = space();
        let name = space.params()[0].name.clone();
        let range = space.params()[0].range;
        let target = range.min + 0.2 * range.span();
        let mut rng = RngHierarchy::new(3).rng_for("t", 0);
        let history: Vec<TrialRecord> = (0..40)
            .map(|i| {
                let v = range.min + range.span() * (i as f64 / 39.0);
                let mut a = ParamAssignment::new();
                a.insert(name.clone(), v);
                trial(i, -(v - target).abs(), a)
            })
            .collect();
        let tpe = TpeSampler::default();
        let mean: f64 = (0..50)
            .map(|_| tpe.suggest(&space, &history, &mut rng)[&name])
            .sum::<f64>()
            / 50.0;
        assert!((mean - target).abs() < 0.2 * range.span(), "mean {mean} target {target}");
    }

    #[test]
    fn sampling_is_deterministic_per_seed() {
        let space = space();
        let tpe = TpeSampler::default();
        let a = tpe.suggest(&space, &[], &mut RngHierarchy::new(5).rng_for("t", 0));
        let b = tpe.suggest(&space, &[], &mut RngHierarchy::new(5).rng_for("t", 0));
        assert_eq!(a, b);
    }
}
