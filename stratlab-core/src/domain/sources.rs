//! Optional side data consumed by signals: benchmark, sector, financial
//! statements, margin balances.
//!
//! Signals declare what they need as [`DataRequirement`] tags
//! (`"benchmark"`, `"sector"`, `"statements:EPS"`, `"margin:margin_ratio"`).
//! A requirement is satisfiable only when the named source (and column, for
//! tabular sources) holds at least one non-missing value.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::series::PriceSeries;

// ─── DataRequirement ─────────────────────────────────────────────────

/// An upstream data dependency declared by a signal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DataRequirement {
    Benchmark,
    Sector,
    Statements(String),
    Margin(String),
}

impl fmt::Display for DataRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Benchmark => write!(f, "benchmark"),
            Self::Sector => write!(f, "sector"),
            Self::Statements(col) => write!(f, "statements:{col}"),
            Self::Margin(col) => write!(f, "margin:{col}"),
        }
    }
}

/// Error for an unrecognised requirement tag.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown data requirement tag '{0}'")]
pub struct UnknownRequirement(pub String);

impl FromStr for DataRequirement {
    type Err = UnknownRequirement;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag.split_once(':') {
            None if tag == "benchmark" => Ok(Self::Benchmark),
            None if tag == "sector" => Ok(Self::Sector),
            Some(("statements", col)) if !col.is_empty() => Ok(Self::Statements(col.to_string())),
            Some(("margin", col)) if !col.is_empty() => Ok(Self::Margin(col.to_string())),
            _ => Err(UnknownRequirement(tag.to_string())),
        }
    }
}

// ─── DatedTable ──────────────────────────────────────────────────────

/// Column-oriented table keyed by date (statements, margin balances).
///
/// Rows are sorted ascending by date; every column has one value per row,
/// with NaN for missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatedTable {
    pub dates: Vec<NaiveDate>,
    pub columns: BTreeMap<String, Vec<f64>>,
}

impl DatedTable {
    pub fn new(dates: Vec<NaiveDate>) -> Self {
        Self {
            dates,
            columns: BTreeMap::new(),
        }
    }

    /// Add a column. Panics if the column length differs from the row count.
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        assert_eq!(
            values.len(),
            self.dates.len(),
            "column length must match row count"
        );
        self.columns.insert(name.into(), values);
        self
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(|v| v.as_slice())
    }

    /// True if the column exists and has at least one finite value.
    pub fn has_values(&self, name: &str) -> bool {
        self.column(name)
            .is_some_and(|values| values.iter().any(|v| v.is_finite()))
    }

    /// Forward-fill a column onto `target` dates: each target date takes the
    /// latest finite value reported on or before it, NaN before the first.
    /// Rows past the end of a short column count as missing.
    pub fn forward_fill_onto(&self, name: &str, target: &[NaiveDate]) -> Option<Vec<f64>> {
        let values = self.column(name)?;
        let mut out = Vec::with_capacity(target.len());
        let mut row = 0;
        let mut last = f64::NAN;
        for date in target {
            while row < self.dates.len() && self.dates[row] <= *date {
                if let Some(&v) = values.get(row).filter(|v| v.is_finite()) {
                    last = v;
                }
                row += 1;
            }
            out.push(last);
        }
        Some(out)
    }
}

// ─── DataSources ─────────────────────────────────────────────────────

/// All optional side data available to one composition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSources {
    pub benchmark: Option<PriceSeries>,
    pub sector: Option<PriceSeries>,
    pub statements: Option<DatedTable>,
    pub margin: Option<DatedTable>,
}

impl DataSources {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether `req` can be met by the supplied sources.
    pub fn satisfies(&self, req: &DataRequirement) -> bool {
        match req {
            DataRequirement::Benchmark => self
                .benchmark
                .as_ref()
                .is_some_and(|s| s.has_valid_close()),
            DataRequirement::Sector => self.sector.as_ref().is_some_and(|s| s.has_valid_close()),
            DataRequirement::Statements(col) => {
                self.statements.as_ref().is_some_and(|t| t.has_values(col))
            }
            DataRequirement::Margin(col) => self.margin.as_ref().is_some_and(|t| t.has_values(col)),
        }
    }

    /// First requirement in `reqs` that cannot be met, if any.
    pub fn first_unmet<'a>(&self, reqs: &'a [DataRequirement]) -> Option<&'a DataRequirement> {
        reqs.iter().find(|r| !self.satisfies(r))
    }
}
