//! Constrained random strategy generator.
//!
//! Each candidate draws its own entry/exit signal counts, picks eligible
//! signals at random while skipping any that are mutually exclusive with
//! one already picked, force-includes required signals, and randomizes
//! every ranged numeric parameter of the picks. Candidate `i` draws from
//! the `("generator", i)` stream, so a batch is reproducible from the seed
//! alone and independent of how many candidates fail.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use stratlab_core::rng::RngHierarchy;
use stratlab_core::signals::registry::RegistryError;
use stratlab_core::{Side, SignalCategory, SignalParams, SignalRegistry, StrategyCandidate};

use crate::config::ConfigError;

/// Metadata key naming the component that produced a candidate.
pub const ORIGIN_KEY: &str = "origin";

// ─── Config types ────────────────────────────────────────────────────

/// Which sides receive signals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SideRestriction {
    #[default]
    Both,
    /// Entry signals only; exits come from the forced final exit.
    EntryFilterOnly,
    /// Exit signals only; entry is unconditionally true.
    ExitTriggerOnly,
}

impl SideRestriction {
    pub fn allows(self, side: Side) -> bool {
        match (self, side) {
            (Self::Both, _) => true,
            (Self::EntryFilterOnly, Side::Entry) => true,
            (Self::ExitTriggerOnly, Side::Exit) => true,
            _ => false,
        }
    }
}

/// Inclusive signal-count range for one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountRange {
    pub min: usize,
    pub max: usize,
}

impl CountRange {
    pub const fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    fn sample(&self, rng: &mut impl Rng) -> usize {
        rng.gen_range(self.min..=self.max)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub entry_signals: CountRange,
    pub exit_signals: CountRange,
    pub restriction: SideRestriction,
    /// Categories eligible for random picks; empty allows all.
    pub allowed_categories: Vec<SignalCategory>,
    pub excluded_signals: Vec<String>,
    pub required_entry: Vec<String>,
    pub required_exit: Vec<String>,
    pub seed: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            entry_signals: CountRange::new(1, 3),
            exit_signals: CountRange::new(1, 2),
            restriction: SideRestriction::Both,
            allowed_categories: Vec::new(),
            excluded_signals: Vec::new(),
            required_entry: Vec::new(),
            required_exit: Vec::new(),
            seed: 42,
        }
    }
}

impl GeneratorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, range) in [
            ("entry_signals", self.entry_signals),
            ("exit_signals", self.exit_signals),
        ] {
            if range.min > range.max {
                return Err(ConfigError::invalid(field, "min must not exceed max"));
            }
        }
        Ok(())
    }

    fn count_range(&self, side: Side) -> CountRange {
        match side {
            Side::Entry => self.entry_signals,
            Side::Exit => self.exit_signals,
        }
    }

    fn required(&self, side: Side) -> &[String] {
        match side {
            Side::Entry => &self.required_entry,
            Side::Exit => &self.required_exit,
        }
    }
}

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("required signal '{name}' cannot be used on the {side} side")]
    NotUsable { name: String, side: Side },

    #[error("required {side} signals '{a}' and '{b}' are mutually exclusive")]
    ConflictingRequired { side: Side, a: String, b: String },

    #[error("no eligible signals for candidate {index}")]
    NoSignals { index: u64 },
}

// ─── Generator ───────────────────────────────────────────────────────

pub struct StrategyGenerator {
    registry: Arc<SignalRegistry>,
    config: GeneratorConfig,
    rng: RngHierarchy,
    next_index: u64,
}

impl StrategyGenerator {
    /// Validates the config and the required signals against the registry.
    pub fn new(registry: Arc<SignalRegistry>, config: GeneratorConfig) -> Result<Self, GenerateError> {
        config.validate()?;
        for side in Side::ALL {
            let required = config.required(side);
            for (i, name) in required.iter().enumerate() {
                let def = registry
                    .get(name)
                    .ok_or_else(|| RegistryError::UnknownSignal(name.clone()))?;
                if !def.usable_on(side) {
                    return Err(GenerateError::NotUsable {
                        name: name.clone(),
                        side,
                    });
                }
                if let Some(other) = required[..i].iter().find(|o| registry.are_exclusive(name, o)) {
                    return Err(GenerateError::ConflictingRequired {
                        side,
                        a: other.clone(),
                        b: name.clone(),
                    });
                }
            }
        }
        let rng = RngHierarchy::new(config.seed);
        Ok(Self {
            registry,
            config,
            rng,
            next_index: 0,
        })
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Generate up to `count` candidates. Failed slots are logged and
    /// skipped, so the batch may be shorter than requested. Successive
    /// calls continue the stream.
    pub fn generate(&mut self, count: usize) -> Vec<StrategyCandidate> {
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let index = self.next_index;
            self.next_index += 1;
            match self.generate_one(index) {
                Ok(candidate) => {
                    debug!(
                        id = %candidate.id,
                        entry = ?candidate.enabled_signals(Side::Entry),
                        exit = ?candidate.enabled_signals(Side::Exit),
                        "generated candidate"
                    );
                    out.push(candidate);
                }
                Err(e) => warn!(index, error = %e, "candidate generation failed, slot skipped"),
            }
        }
        info!(requested = count, generated = out.len(), seed = self.config.seed, "generation batch done");
        out
    }

    fn generate_one(&self, index: u64) -> Result<StrategyCandidate, GenerateError> {
        let mut rng = self.rng.rng_for("generator", index);
        let mut candidate = StrategyCandidate::new(format!("gen_{}_{index:04}", self.config.seed));
        candidate
            .metadata
            .insert(ORIGIN_KEY.to_string(), "generator".to_string());

        for side in Side::ALL {
            if !self.config.restriction.allows(side) {
                continue;
            }
            let target = self.config.count_range(side).sample(&mut rng);
            for name in self.pick_signals(side, target, &mut rng) {
                let params = randomized_params(&self.registry, &name, side, &mut rng)?;
                candidate.side_mut(side).insert(name, params);
            }
        }

        if candidate.enabled_count() == 0 {
            return Err(GenerateError::NoSignals { index });
        }
        Ok(candidate)
    }

    /// Required signals first, then random eligible picks that do not
    /// conflict with anything already selected.
    fn pick_signals(&self, side: Side, target: usize, rng: &mut StdRng) -> Vec<String> {
        let mut selected: Vec<String> = self.config.required(side).to_vec();
        let mut pool: Vec<&str> = self
            .registry
            .list_available(side, &self.config.allowed_categories, &self.config.excluded_signals)
            .into_iter()
            .map(|d| d.name.as_str())
            .filter(|name| !selected.iter().any(|s| s == name))
            .collect();

        while selected.len() < target && !pool.is_empty() {
            let name = pool.swap_remove(rng.gen_range(0..pool.len()));
            if !self.registry.conflicts_with(name, &selected) {
                selected.push(name.to_string());
            }
        }
        selected
    }
}

/// Side-aware defaults for `name` with every ranged numeric parameter drawn
/// uniformly from its range, then normalized. Categoricals keep defaults.
pub fn randomized_params(
    registry: &SignalRegistry,
    name: &str,
    side: Side,
    rng: &mut impl Rng,
) -> Result<SignalParams, RegistryError> {
    let def = registry
        .get(name)
        .ok_or_else(|| RegistryError::UnknownSignal(name.to_string()))?;
    let mut params = def.default_params(side);
    for (path, range) in &def.param_ranges {
        params.set(path, range.sample(rng));
    }
    registry.normalize(name, &mut params);
    Ok(params)
}
