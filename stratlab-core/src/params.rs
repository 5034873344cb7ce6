//! Signal parameter sets — a small recursive tagged union.
//!
//! A parameter set maps names to scalars or nested sub-maps (composite
//! signals such as a crossover carry `fast` / `slow` sub-maps). Every set
//! carries an `enabled` flag. Nested values are addressed with dotted paths
//! (`"fast.period"`), which is also how numeric search refers to them.
//!
//! `BTreeMap` keeps key order deterministic for serialization and hashing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Nested parameter map.
pub type ParamMap = BTreeMap<String, ParamValue>;

/// Separator between segments of a nested parameter path.
pub const PATH_SEPARATOR: char = '.';

/// One parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Number(f64),
    Text(String),
    Nested(ParamMap),
}

impl ParamValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_nested(&self) -> Option<&ParamMap> {
        match self {
            Self::Nested(m) => Some(m),
            _ => None,
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        Self::Number(f64::from(v))
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<ParamMap> for ParamValue {
    fn from(v: ParamMap) -> Self {
        Self::Nested(v)
    }
}

/// Build a `ParamMap` from `(key, value)` pairs.
pub fn param_map<const N: usize>(pairs: [(&str, ParamValue); N]) -> ParamMap {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

// ─── SignalParams ────────────────────────────────────────────────────

/// Parameter set for one signal on one side of a candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalParams(ParamMap);

impl Default for SignalParams {
    fn default() -> Self {
        Self::new(false)
    }
}

impl SignalParams {
    pub const ENABLED: &'static str = "enabled";

    pub fn new(enabled: bool) -> Self {
        let mut map = ParamMap::new();
        map.insert(Self::ENABLED.to_string(), ParamValue::Bool(enabled));
        Self(map)
    }

    /// Wrap an existing map, inserting `enabled = false` if it is absent.
    pub fn from_map(mut map: ParamMap) -> Self {
        map.entry(Self::ENABLED.to_string())
            .or_insert(ParamValue::Bool(false));
        Self(map)
    }

    /// Builder-style insert of a top-level value.
    pub fn with(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn enabled(&self) -> bool {
        self.0
            .get(Self::ENABLED)
            .and_then(ParamValue::as_bool)
            .unwrap_or(false)
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.0
            .insert(Self::ENABLED.to_string(), ParamValue::Bool(enabled));
    }

    pub fn as_map(&self) -> &ParamMap {
        &self.0
    }

    /// Look up a value by dotted path.
    pub fn get(&self, path: &str) -> Option<&ParamValue> {
        let mut segments = path.split(PATH_SEPARATOR);
        let mut current = self.0.get(segments.next()?)?;
        for segment in segments {
            current = current.as_nested()?.get(segment)?;
        }
        Some(current)
    }

    pub fn number(&self, path: &str) -> Option<f64> {
        self.get(path).and_then(ParamValue::as_number)
    }

    pub fn number_or(&self, path: &str, default: f64) -> f64 {
        self.number(path).unwrap_or(default)
    }

    pub fn text(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(ParamValue::as_text)
    }

    pub fn text_or<'a>(&'a self, path: &str, default: &'a str) -> &'a str {
        self.text(path).unwrap_or(default)
    }

    pub fn nested(&self, key: &str) -> Option<&ParamMap> {
        self.0.get(key).and_then(ParamValue::as_nested)
    }

    /// Set a value by dotted path, creating intermediate maps as needed.
    ///
    /// Returns `false` (and leaves the set untouched) if an intermediate
    /// segment exists but is not a nested map.
    pub fn set(&mut self, path: &str, value: impl Into<ParamValue>) -> bool {
        let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
        let Some((last, parents)) = segments.split_last() else {
            return false;
        };
        let mut map = &mut self.0;
        for segment in parents {
            let entry = map
                .entry((*segment).to_string())
                .or_insert_with(|| ParamValue::Nested(ParamMap::new()));
            match entry {
                ParamValue::Nested(inner) => map = inner,
                _ => return false,
            }
        }
        map.insert((*last).to_string(), value.into());
        true
    }

    /// Dotted paths of every numeric leaf, in key order.
    pub fn numeric_paths(&self) -> Vec<String> {
        fn walk(prefix: &str, map: &ParamMap, out: &mut Vec<String>) {
            for (key, value) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}{PATH_SEPARATOR}{key}")
                };
                match value {
                    ParamValue::Number(_) => out.push(path),
                    ParamValue::Nested(inner) => walk(&path, inner, out),
                    _ => {}
                }
            }
        }
        let mut out = Vec::new();
        walk("", &self.0, &mut out);
        out
    }

    /// Fill keys missing from `self` with values from `defaults`, recursing
    /// into nested maps. Existing values win.
    pub fn merge_defaults(&mut self, defaults: &SignalParams) {
        fn merge(target: &mut ParamMap, defaults: &ParamMap) {
            for (key, default) in defaults {
                match (target.get_mut(key), default) {
                    (None, _) => {
                        target.insert(key.clone(), default.clone());
                    }
                    (Some(ParamValue::Nested(inner)), ParamValue::Nested(inner_default)) => {
                        merge(inner, inner_default);
                    }
                    _ => {}
                }
            }
        }
        merge(&mut self.0, &defaults.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crossover_params() -> SignalParams {
        SignalParams::new(true)
            .with(
                "fast",
                param_map([("period", 5.into()), ("ma_type", "sma".into())]),
            )
            .with(
                "slow",
                param_map([("period", 25.into()), ("ma_type", "sma".into())]),
            )
            .with("direction", "golden")
    }

    #[test]
    fn enabled_flag_always_present() {
        assert!(!SignalParams::default().enabled());
        let p = SignalParams::from_map(ParamMap::new());
        assert!(p.as_map().contains_key(SignalParams::ENABLED));
    }

    #[test]
    fn dotted_path_lookup() {
        let p = crossover_params();
        assert_eq!(p.number("fast.period"), Some(5.0));
        assert_eq!(p.text("slow.ma_type"), Some("sma"));
        assert_eq!(p.number("fast.missing"), None);
        assert_eq!(p.number("direction.period"), None);
    }

    #[test]
    fn set_creates_nested_maps() {
        let mut p = SignalParams::new(true);
        assert!(p.set("fast.period", 7.0));
        assert_eq!(p.number("fast.period"), Some(7.0));
    }

    #[test]
    fn set_refuses_to_descend_into_scalar() {
        let mut p = SignalParams::new(true).with("period", 10.0);
        assert!(!p.set("period.inner", 1.0));
        assert_eq!(p.number("period"), Some(10.0));
    }

    #[test]
    fn numeric_paths_skip_categoricals_and_flags() {
        let p = crossover_params();
        assert_eq!(p.numeric_paths(), vec!["fast.period", "slow.period"]);
    }

    #[test]
    fn merge_defaults_keeps_existing_values() {
        let mut p = SignalParams::new(true).with("fast", param_map([("period", 9.into())]));
        p.merge_defaults(&crossover_params());
        assert_eq!(p.number("fast.period"), Some(9.0));
        assert_eq!(p.text("fast.ma_type"), Some("sma"));
        assert_eq!(p.number("slow.period"), Some(25.0));
    }

    #[test]
    fn json_roundtrip_preserves_shape() {
        let p = crossover_params();
        let json = serde_json::to_string(&p).unwrap();
        let back: SignalParams = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }

    #[test]
    fn toml_integer_reads_as_number() {
        let p: SignalParams = toml::from_str("enabled = true\nperiod = 20\n").unwrap();
        assert!(p.enabled());
        assert_eq!(p.number("period"), Some(20.0));
    }
}
