//! Shared backtest settings and per-candidate overrides.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use stratlab_core::ParamValue;

use crate::config::ConfigError;

/// Settings shared by every evaluation in a research session.
///
/// Candidates may override individual fields through
/// `StrategyCandidate::shared_overrides`; see [`SharedSettings::with_overrides`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharedSettings {
    /// Instrument code traded by every candidate.
    pub code: String,
    /// Benchmark index code (enables benchmark-dependent signals).
    pub benchmark_code: Option<String>,
    /// Sector index code (enables sector-dependent signals).
    pub sector_code: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub initial_cash: f64,
    /// Fee charged on each side of a round trip, as a fraction of notional.
    pub fee_rate: f64,
    /// Evaluate on prices divided by the benchmark close.
    pub relative_mode: bool,
    /// Multiplier on the raw Kelly fraction in allocation-optimized runs.
    pub kelly_scale: f64,
    pub min_allocation: f64,
    pub max_allocation: f64,
}

impl Default for SharedSettings {
    fn default() -> Self {
        Self {
            code: String::new(),
            benchmark_code: None,
            sector_code: None,
            start_date: None,
            end_date: None,
            initial_cash: 1_000_000.0,
            fee_rate: 0.001,
            relative_mode: false,
            kelly_scale: 0.5,
            min_allocation: 0.1,
            max_allocation: 1.0,
        }
    }
}

impl SharedSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.initial_cash.is_finite() && self.initial_cash > 0.0) {
            return Err(ConfigError::invalid("initial_cash", "must be positive"));
        }
        if !(0.0..0.5).contains(&self.fee_rate) {
            return Err(ConfigError::invalid("fee_rate", "must be in [0, 0.5)"));
        }
        if !(self.kelly_scale.is_finite() && self.kelly_scale > 0.0) {
            return Err(ConfigError::invalid("kelly_scale", "must be positive"));
        }
        if !(self.min_allocation > 0.0 && self.min_allocation <= self.max_allocation) {
            return Err(ConfigError::invalid(
                "min_allocation",
                "must be positive and not exceed max_allocation",
            ));
        }
        if self.max_allocation > 1.0 {
            return Err(ConfigError::invalid("max_allocation", "must not exceed 1.0"));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(ConfigError::invalid("start_date", "must not be after end_date"));
            }
        }
        if self.relative_mode && self.benchmark_code.is_none() {
            return Err(ConfigError::invalid(
                "relative_mode",
                "requires a benchmark_code",
            ));
        }
        Ok(())
    }

    /// Copy of these settings with `overrides` applied, validated.
    ///
    /// An unknown key or a value of the wrong type is an error; the caller
    /// fails the one evaluation that carried it.
    pub fn with_overrides(
        &self,
        overrides: &BTreeMap<String, ParamValue>,
    ) -> Result<Self, ConfigError> {
        if overrides.is_empty() {
            return Ok(self.clone());
        }
        let mut out = self.clone();
        for (key, value) in overrides {
            match key.as_str() {
                "initial_cash" => out.initial_cash = number(key, value)?,
                "fee_rate" => out.fee_rate = number(key, value)?,
                "kelly_scale" => out.kelly_scale = number(key, value)?,
                "min_allocation" => out.min_allocation = number(key, value)?,
                "max_allocation" => out.max_allocation = number(key, value)?,
                "relative_mode" => {
                    out.relative_mode = value
                        .as_bool()
                        .ok_or_else(|| ConfigError::invalid(key, "expected a boolean"))?
                }
                "start_date" => out.start_date = Some(date(key, value)?),
                "end_date" => out.end_date = Some(date(key, value)?),
                _ => return Err(ConfigError::UnknownOverride(key.clone())),
            }
        }
        out.validate()?;
        Ok(out)
    }
}

fn number(key: &str, value: &ParamValue) -> Result<f64, ConfigError> {
    value
        .as_number()
        .ok_or_else(|| ConfigError::invalid(key, "expected a number"))
}

fn date(key: &str, value: &ParamValue) -> Result<NaiveDate, ConfigError> {
    value
        .as_text()
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        .ok_or_else(|| ConfigError::invalid(key, "expected a YYYY-MM-DD date"))
}
