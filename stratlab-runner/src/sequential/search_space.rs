//! Flat search space over a candidate's numeric signal parameters.
//!
//! Each searchable parameter gets a trial name `{side}_{signal}_{path}`
//! (e.g. `entry_crossover_fast.period`). Signal names contain underscores,
//! so decoding matches the longest known signal name first.

use std::collections::BTreeMap;

use tracing::warn;

use stratlab_core::{ParamRange, Side, SignalRegistry, StrategyCandidate};

/// Trial name → sampled value.
pub type ParamAssignment = BTreeMap<String, f64>;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchParam {
    pub name: String,
    pub side: Side,
    pub signal: String,
    pub path: String,
    pub range: ParamRange,
}

#[derive(Debug, Clone)]
pub struct SearchSpace {
    params: Vec<SearchParam>,
    /// Every registry name, longest first.
    known_signals: Vec<String>,
}

pub fn trial_name(side: Side, signal: &str, path: &str) -> String {
    format!("{side}_{signal}_{path}")
}

impl SearchSpace {
    /// One parameter per registry range of every enabled signal that is
    /// usable on its side. Paths come from the registry, so a sparse
    /// parameter set is searched in full. Unranged numbers and
    /// categoricals stay fixed.
    pub fn from_candidate(registry: &SignalRegistry, candidate: &StrategyCandidate) -> Self {
        let mut params = Vec::new();
        for side in Side::ALL {
            for (signal, signal_params) in candidate.side(side) {
                if !signal_params.enabled() {
                    continue;
                }
                let Some(def) = registry.get(signal) else {
                    continue;
                };
                if !def.usable_on(side) {
                    continue;
                }
                for (path, range) in &def.param_ranges {
                    params.push(SearchParam {
                        name: trial_name(side, signal, path),
                        side,
                        signal: signal.clone(),
                        path: path.clone(),
                        range: *range,
                    });
                }
            }
        }
        let mut known_signals: Vec<String> = registry.names().map(String::from).collect();
        known_signals.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        Self {
            params,
            known_signals,
        }
    }

    pub fn params(&self) -> &[SearchParam] {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&SearchParam> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Split a trial name back into `(side, signal, path)`.
    pub fn decode_name(&self, name: &str) -> Option<(Side, String, String)> {
        let (side, rest) = if let Some(rest) = name.strip_prefix("entry_") {
            (Side::Entry, rest)
        } else if let Some(rest) = name.strip_prefix("exit_") {
            (Side::Exit, rest)
        } else {
            return None;
        };
        self.known_signals.iter().find_map(|signal| {
            rest.strip_prefix(signal.as_str())
                .and_then(|tail| tail.strip_prefix('_'))
                .filter(|path| !path.is_empty())
                .map(|path| (side, signal.clone(), path.to_string()))
        })
    }

    /// Copy of `base` with every decodable assignment written back,
    /// clamped to its range, then normalized per touched signal.
    pub fn apply(
        &self,
        registry: &SignalRegistry,
        base: &StrategyCandidate,
        assignment: &ParamAssignment,
    ) -> StrategyCandidate {
        let mut candidate = base.clone();
        let mut touched: Vec<(Side, String)> = Vec::new();
        for (name, &value) in assignment {
            let Some((side, signal, path)) = self.decode_name(name) else {
                warn!(name, "undecodable trial parameter ignored");
                continue;
            };
            let value = registry
                .range(&signal, &path)
                .map_or(value, |range| range.clamp(value));
            let Some(params) = candidate.side_mut(side).get_mut(&signal) else {
                warn!(name, "trial parameter names a signal absent from the candidate");
                continue;
            };
            params.set(&path, value);
            if !touched.contains(&(side, signal.clone())) {
                touched.push((side, signal));
            }
        }
        for (side, signal) in touched {
            if let Some(params) = candidate.side_mut(side).get_mut(&signal) {
                registry.normalize(&signal, params);
            }
        }
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SignalRegistry {
        SignalRegistry::builtin().unwrap()
    }

    fn candidate(reg: &SignalRegistry) -> StrategyCandidate {
        StrategyCandidate::new("base")
            .with_signal(Side::Entry, "crossover", reg.default_params("crossover", Side::Entry).unwrap())
            .with_signal(
                Side::Exit,
                "trailing_stop",
                reg.default_params("trailing_stop", Side::Exit).unwrap(),
            )
    }

    #[test]
    fn names_follow_side_signal_path() {
        let reg = registry();
        let space = SearchSpace::from_candidate(&reg, &candidate(&reg));
        assert!(space.get("entry_crossover_fast.period").is_some());
        assert!(space.get("entry_crossover_slow.period").is_some());
        assert!(space.get("exit_trailing_stop_stop_pct").is_some());
    }

    #[test]
    fn decode_prefers_longest_signal_name() {
        let reg = registry();
        let space = SearchSpace::from_candidate(&reg, &candidate(&reg));
        assert_eq!(
            space.decode_name("exit_trailing_stop_stop_pct"),
            Some((Side::Exit, "trailing_stop".into(), "stop_pct".into()))
        );
        assert_eq!(
            space.decode_name("entry_ma_breakout_period"),
            Some((Side::Entry, "ma_breakout".into(), "period".into()))
        );
        assert_eq!(space.decode_name("entry_unknown_x"), None);
        assert_eq!(space.decode_name("sideways_crossover_x"), None);
        assert_eq!(space.decode_name("entry_crossover_"), None);
    }

    #[test]
    fn apply_clamps_and_ignores_unknown_names() {
        let reg = registry();
        let base = candidate(&reg);
        let space = SearchSpace::from_candidate(&reg, &base);
        let mut assignment = ParamAssignment::new();
        assignment.insert("exit_trailing_stop_stop_pct".into(), 5.0);
        assignment.insert("entry_nothing_here".into(), 1.0);
        let out = space.apply(&reg, &base, &assignment);
        let range = reg.range("trailing_stop", "stop_pct").unwrap();
        assert_eq!(out.exit["trailing_stop"].number("stop_pct"), Some(range.max));
        assert_eq!(out.entry, base.entry);
    }

    #[test]
    fn sparse_signal_is_searched_over_registry_ranges() {
        let reg = registry();
        let sparse = StrategyCandidate::new("s").with_signal(
            Side::Entry,
            "period_breakout",
            stratlab_core::SignalParams::new(true),
        );
        let space = SearchSpace::from_candidate(&reg, &sparse);
        let expected: Vec<&String> = reg.get("period_breakout").unwrap().param_ranges.keys().collect();
        assert!(!space.is_empty());
        assert_eq!(space.len(), expected.len());
        for path in expected {
            assert!(space.get(&trial_name(Side::Entry, "period_breakout", path)).is_some());
        }
    }

    #[test]
    fn signals_on_an_unusable_side_are_not_searched() {
        let reg = registry();
        // trailing_stop is exit-only; composition skips it on the entry side.
        let c = StrategyCandidate::new("c")
            .with_signal(
                Side::Entry,
                "trailing_stop",
                reg.default_params("trailing_stop", Side::Entry).unwrap(),
            )
            .with_signal(
                Side::Exit,
                "trailing_stop",
                reg.default_params("trailing_stop", Side::Exit).unwrap(),
            );
        let space = SearchSpace::from_candidate(&reg, &c);
        assert!(space.params().iter().all(|p| p.side == Side::Exit));
        assert!(space.get("exit_trailing_stop_stop_pct").is_some());
    }

    #[test]
    fn disabled_signals_are_not_searched() {
        let reg = registry();
        let mut off = reg.default_params("rsi_threshold", Side::Entry).unwrap();
        off.set_enabled(false);
        let c = StrategyCandidate::new("c").with_signal(Side::Entry, "rsi_threshold", off);
        assert!(SearchSpace::from_candidate(&reg, &c).is_empty());
    }
}
