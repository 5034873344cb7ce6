//! Signal registry — validated, immutable catalog built once at startup.
//!
//! Construction derives each signal's search ranges (schema bounds merged
//! with hand-tuned overrides, overrides win) and fails fast on duplicate
//! names, unknown override paths, invalid ranges or exclusion pairs naming
//! unknown signals.

use std::collections::{BTreeMap, HashMap, HashSet};

use super::{builtin, ParamRange, SignalCategory, SignalDefinition};
use crate::candidate::{Side, StrategyCandidate};
use crate::params::SignalParams;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("duplicate signal name '{0}'")]
    DuplicateName(String),

    #[error("unknown signal '{0}'")]
    UnknownSignal(String),

    #[error("signal '{signal}' has no numeric parameter '{path}'")]
    UnknownParameter { signal: String, path: String },

    #[error("invalid range for '{signal}.{path}': [{min}, {max}]")]
    InvalidRange {
        signal: String,
        path: String,
        min: f64,
        max: f64,
    },
}

#[derive(Debug)]
pub struct SignalRegistry {
    definitions: Vec<SignalDefinition>,
    index: HashMap<String, usize>,
    /// Stored in both orders so lookups are symmetric.
    exclusions: HashSet<(String, String)>,
}

impl SignalRegistry {
    /// The built-in catalog with its range overrides and exclusion pairs.
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::new(
            builtin::catalog(),
            &builtin::range_overrides(),
            &builtin::EXCLUSIVE_PAIRS,
        )
    }

    pub fn new(
        mut definitions: Vec<SignalDefinition>,
        overrides: &[(&str, &str, ParamRange)],
        exclusive_pairs: &[(&str, &str)],
    ) -> Result<Self, RegistryError> {
        let mut index = HashMap::with_capacity(definitions.len());
        for (i, def) in definitions.iter().enumerate() {
            if index.insert(def.name.clone(), i).is_some() {
                return Err(RegistryError::DuplicateName(def.name.clone()));
            }
        }

        // Schema-derived ranges.
        for def in &mut definitions {
            let mut ranges = BTreeMap::new();
            for field in def.kind.schema().fields {
                if let Some(bounds) = field.bounds {
                    check_range(&def.name, &field.path, &bounds)?;
                    ranges.insert(field.path, bounds);
                }
            }
            def.param_ranges = ranges;
        }

        // Overrides must target an existing numeric schema field.
        for (signal, path, range) in overrides {
            let i = *index
                .get(*signal)
                .ok_or_else(|| RegistryError::UnknownSignal(signal.to_string()))?;
            let def = &mut definitions[i];
            let numeric = def
                .kind
                .schema()
                .field(path)
                .is_some_and(|f| f.is_numeric());
            if !numeric {
                return Err(RegistryError::UnknownParameter {
                    signal: signal.to_string(),
                    path: path.to_string(),
                });
            }
            check_range(signal, path, range)?;
            def.param_ranges.insert(path.to_string(), *range);
        }

        let mut exclusions = HashSet::new();
        for (a, b) in exclusive_pairs {
            for name in [a, b] {
                if !index.contains_key(*name) {
                    return Err(RegistryError::UnknownSignal(name.to_string()));
                }
            }
            exclusions.insert((a.to_string(), b.to_string()));
            exclusions.insert((b.to_string(), a.to_string()));
        }

        Ok(Self {
            definitions,
            index,
            exclusions,
        })
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// All definitions in declaration order.
    pub fn definitions(&self) -> &[SignalDefinition] {
        &self.definitions
    }

    pub fn get(&self, name: &str) -> Option<&SignalDefinition> {
        self.index.get(name).map(|&i| &self.definitions[i])
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.definitions.iter().map(|d| d.name.as_str())
    }

    /// Definitions usable on `side`, restricted to `allowed` categories
    /// (empty = unrestricted) and skipping `excluded` names.
    pub fn list_available(
        &self,
        side: Side,
        allowed: &[SignalCategory],
        excluded: &[String],
    ) -> Vec<&SignalDefinition> {
        self.definitions
            .iter()
            .filter(|d| d.usable_on(side))
            .filter(|d| allowed.is_empty() || allowed.contains(&d.category))
            .filter(|d| !excluded.contains(&d.name))
            .collect()
    }

    /// Whether `a` and `b` are mutually exclusive (symmetric).
    pub fn are_exclusive(&self, a: &str, b: &str) -> bool {
        self.exclusions.contains(&(a.to_string(), b.to_string()))
    }

    /// Whether `name` conflicts with any of `selected`.
    pub fn conflicts_with<S: AsRef<str>>(&self, name: &str, selected: &[S]) -> bool {
        selected.iter().any(|s| self.are_exclusive(name, s.as_ref()))
    }

    pub fn range(&self, name: &str, path: &str) -> Option<&ParamRange> {
        self.get(name).and_then(|d| d.param_ranges.get(path))
    }

    /// Side-aware defaults for `name`, enabled.
    pub fn default_params(&self, name: &str, side: Side) -> Result<SignalParams, RegistryError> {
        self.get(name)
            .map(|d| d.default_params(side))
            .ok_or_else(|| RegistryError::UnknownSignal(name.to_string()))
    }

    /// Fill keys missing from `params` with the side-aware defaults of
    /// `name`. Existing values win; unknown names are left untouched.
    pub fn complete_params(&self, name: &str, side: Side, params: &mut SignalParams) {
        if let Some(def) = self.get(name) {
            params.merge_defaults(&def.default_params(side));
        }
    }

    /// Copy of `candidate` where every known signal carries its full
    /// parameter set, as composition would see it.
    pub fn complete_candidate(&self, candidate: &StrategyCandidate) -> StrategyCandidate {
        let mut out = candidate.clone();
        for side in Side::ALL {
            for (name, params) in out.side_mut(side).iter_mut() {
                self.complete_params(name, side, params);
            }
        }
        out
    }

    /// Repair cross-parameter constraints for a known signal; unknown
    /// names are left untouched.
    pub fn normalize(&self, name: &str, params: &mut SignalParams) {
        if let Some(def) = self.get(name) {
            def.kind.normalize(params);
        }
    }
}

fn check_range(signal: &str, path: &str, range: &ParamRange) -> Result<(), RegistryError> {
    if range.is_valid() {
        Ok(())
    } else {
        Err(RegistryError::InvalidRange {
            signal: signal.to_string(),
            path: path.to_string(),
            min: range.min,
            max: range.max,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::builtin::trend::{BuyAndHold, MaBreakout};
    use crate::signals::UsageScope;

    fn registry() -> SignalRegistry {
        SignalRegistry::builtin().unwrap()
    }

    #[test]
    fn overrides_win_over_schema_bounds() {
        let reg = registry();
        let r = reg.range("period_breakout", "period").unwrap();
        assert_eq!((r.min, r.max), (10.0, 120.0));
        let r = reg.range("period_breakout", "lookback_days").unwrap();
        assert_eq!((r.min, r.max), (1.0, 20.0));
    }

    #[test]
    fn nested_ranges_use_dotted_paths() {
        let reg = registry();
        assert!(reg.range("crossover", "fast.period").is_some());
        assert_eq!(reg.range("crossover", "slow.period").unwrap().min, 20.0);
        assert!(reg.range("crossover", "fast.ma_type").is_none());
    }

    #[test]
    fn duplicate_name_is_fatal() {
        let defs = vec![
            SignalDefinition::new("x", SignalCategory::Trend, UsageScope::Both, BuyAndHold),
            SignalDefinition::new("x", SignalCategory::Trend, UsageScope::Both, MaBreakout),
        ];
        let err = SignalRegistry::new(defs, &[], &[]).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateName("x".into()));
    }

    #[test]
    fn override_on_unknown_parameter_is_fatal() {
        let defs = vec![SignalDefinition::new(
            "ma",
            SignalCategory::Trend,
            UsageScope::Both,
            MaBreakout,
        )];
        let err = SignalRegistry::new(defs, &[("ma", "nope", ParamRange::real(0.0, 1.0))], &[])
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownParameter { .. }));
    }

    #[test]
    fn inverted_override_is_fatal() {
        let defs = vec![SignalDefinition::new(
            "ma",
            SignalCategory::Trend,
            UsageScope::Both,
            MaBreakout,
        )];
        let err =
            SignalRegistry::new(defs, &[("ma", "period", ParamRange::integer(50.0, 10.0))], &[])
                .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidRange { .. }));
    }

    #[test]
    fn exclusion_is_symmetric() {
        let reg = registry();
        assert!(reg.are_exclusive("crossover", "ma_breakout"));
        assert!(reg.are_exclusive("ma_breakout", "crossover"));
        assert!(!reg.are_exclusive("crossover", "rsi_threshold"));
        assert!(reg.conflicts_with("bollinger_bands", &["volume_surge", "rsi_threshold"]));
    }

    #[test]
    fn list_available_filters_side_category_and_names() {
        let reg = registry();
        let exit: Vec<&str> = reg
            .list_available(Side::Exit, &[], &[])
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert!(exit.contains(&"trailing_stop"));
        assert!(!exit.contains(&"buy_and_hold"));
        assert!(!exit.contains(&"beta_filter"));
        assert!(!exit.contains(&"fundamental_per"));

        let trend = reg.list_available(Side::Entry, &[SignalCategory::Trend], &["crossover".into()]);
        assert!(trend.iter().all(|d| d.category == SignalCategory::Trend));
        assert!(trend.iter().all(|d| d.name != "crossover"));
        assert!(!trend.is_empty());
    }

    #[test]
    fn every_range_has_a_numeric_schema_field() {
        let reg = registry();
        for def in reg.definitions() {
            let schema = def.kind.schema();
            for path in def.param_ranges.keys() {
                assert!(
                    schema.field(path).is_some_and(|f| f.is_numeric()),
                    "{}.{path} not in schema",
                    def.name
                );
            }
        }
    }

    #[test]
    fn complete_candidate_fills_sparse_signals() {
        let reg = SignalRegistry::builtin().unwrap();
        let sparse = StrategyCandidate::new("s")
            .with_signal(Side::Entry, "period_breakout", SignalParams::new(true))
            .with_signal(Side::Exit, "trailing_stop", SignalParams::new(true).with("stop_pct", 0.07));
        let full = reg.complete_candidate(&sparse);

        let defaults = reg.default_params("period_breakout", Side::Entry).unwrap();
        assert_eq!(full.entry["period_breakout"], defaults);
        assert_eq!(full.exit["trailing_stop"].number("stop_pct"), Some(0.07));
        for path in reg.get("trailing_stop").unwrap().param_ranges.keys() {
            assert!(full.exit["trailing_stop"].number(path).is_some(), "{path}");
        }
    }

    #[test]
    fn default_params_unknown_signal() {
        assert!(registry().default_params("nope", Side::Entry).is_err());
    }
}
