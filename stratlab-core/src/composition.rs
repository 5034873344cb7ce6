//! Signal composition — declarative entry/exit configuration to boolean
//! decision series on the price index.
//!
//! Per side, in registry declaration order:
//! 1. Seed: all-true for entry, all-false for exit.
//! 2. Skip signals that are disabled, used on the wrong side, exit-disabled
//!    on the exit side, restricted in relative mode while it is active, or
//!    missing a declared data requirement.
//! 3. Evaluate with defaults filled in, re-index onto the price dates
//!    (absent dates are indeterminate).
//! 4. Entry = AND, exit = OR; indeterminate counts as false on both sides.
//!
//! Finally the exit fires on the last date with a valid close.
//!
//! A missing data key aborts composition. Any other evaluation error drops
//! that signal and composition continues.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::candidate::{Side, SignalConfig, StrategyCandidate};
use crate::domain::{DataRequirement, DecisionSeries};
use crate::params::SignalParams;
use crate::signals::{SignalDefinition, SignalError, SignalInputs, SignalRegistry};

// ─── Report ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    Disabled,
    UsageMismatch,
    ExitDisabled,
    RelativeModeRestricted,
    MissingData(DataRequirement),
    EvaluationFailed(String),
    UnknownSignal,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "disabled"),
            Self::UsageMismatch => write!(f, "not usable on this side"),
            Self::ExitDisabled => write!(f, "cannot be used as an exit"),
            Self::RelativeModeRestricted => write!(f, "restricted in relative mode"),
            Self::MissingData(req) => write!(f, "missing data requirement '{req}'"),
            Self::EvaluationFailed(msg) => write!(f, "evaluation failed: {msg}"),
            Self::UnknownSignal => write!(f, "not in registry"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedSignal {
    pub side: Side,
    pub name: String,
    pub reason: SkipReason,
}

/// What composition did with each configured signal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositionReport {
    pub applied: Vec<(Side, String)>,
    pub skipped: Vec<SkippedSignal>,
}

impl CompositionReport {
    pub fn applied_on(&self, side: Side) -> Vec<&str> {
        self.applied
            .iter()
            .filter(|(s, _)| *s == side)
            .map(|(_, n)| n.as_str())
            .collect()
    }

    pub fn skip_reason(&self, side: Side, name: &str) -> Option<&SkipReason> {
        self.skipped
            .iter()
            .find(|s| s.side == side && s.name == name)
            .map(|s| &s.reason)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComposedSignals {
    pub entry: DecisionSeries,
    pub exit: DecisionSeries,
    pub report: CompositionReport,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompositionError {
    #[error("signal '{signal}' ({side}) aborted composition: {source}")]
    DataKey {
        signal: String,
        side: Side,
        #[source]
        source: SignalError,
    },
}

// ─── Composer ────────────────────────────────────────────────────────

/// Stateless composition over a registry.
#[derive(Debug, Clone, Copy)]
pub struct Composer<'r> {
    registry: &'r SignalRegistry,
}

impl<'r> Composer<'r> {
    pub fn new(registry: &'r SignalRegistry) -> Self {
        Self { registry }
    }

    pub fn compose_candidate(
        &self,
        candidate: &StrategyCandidate,
        inputs: &SignalInputs<'_>,
    ) -> Result<ComposedSignals, CompositionError> {
        self.compose(&candidate.entry, &candidate.exit, inputs)
    }

    pub fn compose(
        &self,
        entry: &SignalConfig,
        exit: &SignalConfig,
        inputs: &SignalInputs<'_>,
    ) -> Result<ComposedSignals, CompositionError> {
        let mut report = CompositionReport::default();
        let entry_series = self.compose_side(Side::Entry, entry, inputs, &mut report)?;
        let mut exit_series = self.compose_side(Side::Exit, exit, inputs, &mut report)?;

        if let Some(last) = inputs.prices.last_valid_index() {
            exit_series.values[last] = true;
        }

        Ok(ComposedSignals {
            entry: entry_series,
            exit: exit_series,
            report,
        })
    }

    fn compose_side(
        &self,
        side: Side,
        config: &SignalConfig,
        inputs: &SignalInputs<'_>,
        report: &mut CompositionReport,
    ) -> Result<DecisionSeries, CompositionError> {
        let dates = inputs.prices.dates();
        let mut composite = DecisionSeries::filled(dates.clone(), side == Side::Entry);

        for def in self.registry.definitions() {
            let Some(params) = config.get(&def.name) else {
                continue;
            };
            if let Some(reason) = skip_reason(def, side, params, inputs) {
                debug!(signal = %def.name, %side, %reason, "skipping signal");
                report.skipped.push(SkippedSignal {
                    side,
                    name: def.name.clone(),
                    reason,
                });
                continue;
            }

            let mut concrete = params.clone();
            concrete.merge_defaults(&def.default_params(side));
            def.kind.normalize(&mut concrete);

            match def.kind.evaluate(&concrete, inputs) {
                Ok(series) => {
                    let aligned = series.reindex(&dates);
                    for (slot, value) in composite.values.iter_mut().zip(aligned) {
                        let value = value.unwrap_or(false);
                        match side {
                            Side::Entry => *slot = *slot && value,
                            Side::Exit => *slot = *slot || value,
                        }
                    }
                    report.applied.push((side, def.name.clone()));
                }
                Err(err) if err.is_fatal() => {
                    return Err(CompositionError::DataKey {
                        signal: def.name.clone(),
                        side,
                        source: err,
                    });
                }
                Err(err) => {
                    warn!(signal = %def.name, %side, error = %err, "dropping signal contribution");
                    report.skipped.push(SkippedSignal {
                        side,
                        name: def.name.clone(),
                        reason: SkipReason::EvaluationFailed(err.to_string()),
                    });
                }
            }
        }

        for name in config.keys() {
            if self.registry.get(name).is_none() {
                warn!(signal = %name, %side, "configured signal is not in the registry");
                report.skipped.push(SkippedSignal {
                    side,
                    name: name.clone(),
                    reason: SkipReason::UnknownSignal,
                });
            }
        }

        Ok(composite)
    }
}

/// First reason `def` cannot contribute on `side`, if any.
fn skip_reason(
    def: &SignalDefinition,
    side: Side,
    params: &SignalParams,
    inputs: &SignalInputs<'_>,
) -> Option<SkipReason> {
    if !def.kind.is_eligible(params) {
        return Some(SkipReason::Disabled);
    }
    if !def.usage.allows(side) {
        return Some(SkipReason::UsageMismatch);
    }
    if side == Side::Exit && def.exit_disabled {
        return Some(SkipReason::ExitDisabled);
    }
    if inputs.relative_mode && def.relative_mode_restricted {
        return Some(SkipReason::RelativeModeRestricted);
    }
    inputs
        .sources
        .first_unmet(&def.data_requirements)
        .map(|req| SkipReason::MissingData(req.clone()))
}
