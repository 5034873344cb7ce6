//! Signal catalog — definitions, parameter schemas and the signal-kind trait.
//!
//! A signal is a named, parameterized boolean rule over time series. The
//! registry holds one immutable [`SignalDefinition`] per name: metadata
//! (category, usage scope, data requirements, flags), derived search ranges,
//! and a boxed [`SignalKind`] that knows how to evaluate the rule.
//!
//! Signals are pure: price history and side data in, tri-state series out.
//! They never see positions or equity.

pub mod builtin;
pub mod registry;

pub use registry::{RegistryError, SignalRegistry};

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::candidate::Side;
use crate::domain::{DataRequirement, DataSources, PriceSeries, SignalSeries};
use crate::params::{ParamValue, SignalParams};

// ─── Classification ──────────────────────────────────────────────────

/// Which side(s) of a strategy a signal may appear on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageScope {
    EntryOnly,
    ExitOnly,
    Both,
}

impl UsageScope {
    pub fn allows(self, side: Side) -> bool {
        matches!(
            (self, side),
            (Self::Both, _) | (Self::EntryOnly, Side::Entry) | (Self::ExitOnly, Side::Exit)
        )
    }
}

impl fmt::Display for UsageScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::EntryOnly => "entry",
            Self::ExitOnly => "exit",
            Self::Both => "both",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalCategory {
    Trend,
    Oscillator,
    Volatility,
    Volume,
    Breakout,
    Fundamental,
    Relative,
    Margin,
    Risk,
}

impl SignalCategory {
    pub const ALL: [SignalCategory; 9] = [
        Self::Trend,
        Self::Oscillator,
        Self::Volatility,
        Self::Volume,
        Self::Breakout,
        Self::Fundamental,
        Self::Relative,
        Self::Margin,
        Self::Risk,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trend => "trend",
            Self::Oscillator => "oscillator",
            Self::Volatility => "volatility",
            Self::Volume => "volume",
            Self::Breakout => "breakout",
            Self::Fundamental => "fundamental",
            Self::Relative => "relative",
            Self::Margin => "margin",
            Self::Risk => "risk",
        }
    }
}

impl fmt::Display for SignalCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown signal category '{s}'"))
    }
}

// ─── Parameter ranges ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Integer,
    Real,
}

/// Closed search range for one numeric parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamRange {
    pub min: f64,
    pub max: f64,
    pub kind: ParamKind,
}

impl ParamRange {
    pub const fn integer(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            kind: ParamKind::Integer,
        }
    }

    pub const fn real(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            kind: ParamKind::Real,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min <= self.max
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Clamp into the range, rounding integers.
    pub fn clamp(&self, value: f64) -> f64 {
        let v = if value.is_finite() { value } else { self.min };
        let v = v.clamp(self.min, self.max);
        match self.kind {
            ParamKind::Integer => v.round().clamp(self.min.ceil(), self.max.floor()),
            ParamKind::Real => v,
        }
    }

    /// Uniform draw from the range.
    pub fn sample(&self, rng: &mut impl Rng) -> f64 {
        match self.kind {
            ParamKind::Integer => {
                let lo = self.min.ceil() as i64;
                let hi = self.max.floor() as i64;
                if hi <= lo {
                    return lo as f64;
                }
                rng.gen_range(lo..=hi) as f64
            }
            ParamKind::Real => {
                if self.span() <= 0.0 {
                    return self.min;
                }
                rng.gen_range(self.min..=self.max)
            }
        }
    }
}

// ─── Schema ──────────────────────────────────────────────────────────

/// One configurable field of a signal kind.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaField {
    /// Dotted path into the parameter set.
    pub path: String,
    pub default: ParamValue,
    /// Replaces `default` when the signal is configured on the exit side.
    pub exit_default: Option<ParamValue>,
    /// Numeric bounds; `None` for categorical fields.
    pub bounds: Option<ParamRange>,
}

impl SchemaField {
    pub fn categorical(path: &str, default: &str) -> Self {
        Self {
            path: path.to_string(),
            default: ParamValue::from(default),
            exit_default: None,
            bounds: None,
        }
    }

    pub fn numeric(path: &str, default: f64, bounds: ParamRange) -> Self {
        Self {
            path: path.to_string(),
            default: ParamValue::Number(default),
            exit_default: None,
            bounds: Some(bounds),
        }
    }

    pub fn on_exit(mut self, value: impl Into<ParamValue>) -> Self {
        self.exit_default = Some(value.into());
        self
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.default, ParamValue::Number(_))
    }
}

/// Field list for one signal kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamSchema {
    pub fields: Vec<SchemaField>,
}

impl ParamSchema {
    pub fn new(fields: Vec<SchemaField>) -> Self {
        Self { fields }
    }

    pub fn field(&self, path: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.path == path)
    }

    /// Enabled parameter set populated with side-appropriate defaults.
    pub fn defaults(&self, side: Side) -> SignalParams {
        let mut params = SignalParams::new(true);
        for field in &self.fields {
            let value = match (side, &field.exit_default) {
                (Side::Exit, Some(exit)) => exit.clone(),
                _ => field.default.clone(),
            };
            params.set(&field.path, value);
        }
        params
    }
}

// ─── Evaluation ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SignalError {
    /// A data key the signal reads is absent. Treated as misconfiguration.
    #[error("missing data key '{0}'")]
    MissingKey(String),

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("signal computation failed: {0}")]
    Computation(String),
}

impl SignalError {
    pub fn invalid(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Fatal errors abort composition; the rest drop one signal.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::MissingKey(_))
    }
}

/// Everything a signal may read.
#[derive(Debug, Clone, Copy)]
pub struct SignalInputs<'a> {
    pub prices: &'a PriceSeries,
    pub sources: &'a DataSources,
    /// Prices are expressed relative to the benchmark.
    pub relative_mode: bool,
}

impl<'a> SignalInputs<'a> {
    pub fn new(prices: &'a PriceSeries, sources: &'a DataSources, relative_mode: bool) -> Self {
        Self {
            prices,
            sources,
            relative_mode,
        }
    }

    pub fn benchmark(&self) -> Result<&'a PriceSeries, SignalError> {
        self.sources
            .benchmark
            .as_ref()
            .ok_or_else(|| SignalError::MissingKey("benchmark".into()))
    }

    pub fn sector(&self) -> Result<&'a PriceSeries, SignalError> {
        self.sources
            .sector
            .as_ref()
            .ok_or_else(|| SignalError::MissingKey("sector".into()))
    }

    /// Statement column forward-filled onto the price dates.
    pub fn statement_column(&self, column: &str) -> Result<Vec<f64>, SignalError> {
        self.sources
            .statements
            .as_ref()
            .and_then(|t| t.forward_fill_onto(column, &self.prices.dates()))
            .ok_or_else(|| SignalError::MissingKey(format!("statements:{column}")))
    }

    /// Margin column forward-filled onto the price dates.
    pub fn margin_column(&self, column: &str) -> Result<Vec<f64>, SignalError> {
        self.sources
            .margin
            .as_ref()
            .and_then(|t| t.forward_fill_onto(column, &self.prices.dates()))
            .ok_or_else(|| SignalError::MissingKey(format!("margin:{column}")))
    }
}

/// Behaviour of one signal kind.
///
/// `evaluate` is the parameter builder and the rule in one step: it reads
/// the configuration into concrete arguments (rejecting invalid ones with
/// `InvalidParameter`), then computes a series on the signal's own index.
pub trait SignalKind: Send + Sync {
    fn schema(&self) -> ParamSchema;

    /// Eligibility predicate over a configuration.
    fn is_eligible(&self, params: &SignalParams) -> bool {
        params.enabled()
    }

    /// Repair cross-parameter constraints (e.g. fast < slow) after search
    /// operators have changed values independently.
    fn normalize(&self, _params: &mut SignalParams) {}

    fn evaluate(
        &self,
        params: &SignalParams,
        inputs: &SignalInputs<'_>,
    ) -> Result<SignalSeries, SignalError>;
}

/// Immutable registry entry.
pub struct SignalDefinition {
    pub name: String,
    pub category: SignalCategory,
    pub usage: UsageScope,
    pub data_requirements: Vec<DataRequirement>,
    /// Search ranges, derived by the registry from the schema plus overrides.
    pub param_ranges: BTreeMap<String, ParamRange>,
    /// Structurally unusable as an exit rule.
    pub exit_disabled: bool,
    /// Skipped while prices are expressed relative to the benchmark.
    pub relative_mode_restricted: bool,
    pub kind: Box<dyn SignalKind>,
}

impl SignalDefinition {
    pub fn new(
        name: &str,
        category: SignalCategory,
        usage: UsageScope,
        kind: impl SignalKind + 'static,
    ) -> Self {
        Self {
            name: name.to_string(),
            category,
            usage,
            data_requirements: Vec::new(),
            param_ranges: BTreeMap::new(),
            exit_disabled: false,
            relative_mode_restricted: false,
            kind: Box::new(kind),
        }
    }

    pub fn requires(mut self, req: DataRequirement) -> Self {
        self.data_requirements.push(req);
        self
    }

    pub fn exit_disabled(mut self) -> Self {
        self.exit_disabled = true;
        self
    }

    pub fn relative_mode_restricted(mut self) -> Self {
        self.relative_mode_restricted = true;
        self
    }

    /// Whether the signal can ever appear on `side`.
    pub fn usable_on(&self, side: Side) -> bool {
        self.usage.allows(side) && !(side == Side::Exit && self.exit_disabled)
    }

    /// Side-aware default parameters, enabled.
    pub fn default_params(&self, side: Side) -> SignalParams {
        self.kind.schema().defaults(side)
    }
}

impl fmt::Debug for SignalDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalDefinition")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("usage", &self.usage)
            .field("data_requirements", &self.data_requirements)
            .field("param_ranges", &self.param_ranges)
            .field("exit_disabled", &self.exit_disabled)
            .field("relative_mode_restricted", &self.relative_mode_restricted)
            .finish_non_exhaustive()
    }
}
