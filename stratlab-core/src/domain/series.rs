//! Date-indexed series: price history, raw signal output, composed decisions.
//!
//! Signal output is tri-state (`Some(true)`, `Some(false)`, `None`): `None`
//! marks a date the signal could not decide on (warmup, missing input, or a
//! date absent from the signal's own index). Composed decisions are plain
//! booleans aligned to the price index.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::bar::Bar;

// ─── PriceSeries ─────────────────────────────────────────────────────

/// Daily bars for one code, sorted ascending by date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub code: String,
    pub bars: Vec<Bar>,
}

impl PriceSeries {
    /// Build a series, sorting bars by date and dropping duplicate dates
    /// (the last occurrence wins).
    pub fn new(code: impl Into<String>, mut bars: Vec<Bar>) -> Self {
        bars.sort_by_key(|b| b.date);
        let mut deduped: Vec<Bar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match deduped.last_mut() {
                Some(last) if last.date == bar.date => *last = bar,
                _ => deduped.push(bar),
            }
        }
        Self {
            code: code.into(),
            bars: deduped,
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.bars.iter().map(|b| b.date).collect()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.low).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.volume).collect()
    }

    /// Index of the last bar with a finite close.
    pub fn last_valid_index(&self) -> Option<usize> {
        self.bars.iter().rposition(|b| b.close.is_finite())
    }

    /// True if at least one close is present.
    pub fn has_valid_close(&self) -> bool {
        self.bars.iter().any(|b| b.close.is_finite())
    }

    /// Restrict to bars within `[start, end]` (inclusive).
    pub fn slice_dates(&self, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            code: self.code.clone(),
            bars: self
                .bars
                .iter()
                .filter(|b| b.date >= start && b.date <= end)
                .cloned()
                .collect(),
        }
    }

    /// Prices expressed relative to `benchmark`: every OHLC field divided by
    /// the benchmark close on the same date. Dates the benchmark lacks (or
    /// where its close is not positive) become void bars.
    pub fn relative_to(&self, benchmark: &PriceSeries) -> Self {
        let lookup: HashMap<NaiveDate, f64> =
            benchmark.bars.iter().map(|b| (b.date, b.close)).collect();
        let bars = self
            .bars
            .iter()
            .map(|b| match lookup.get(&b.date) {
                Some(&base) if base.is_finite() && base > 0.0 => Bar {
                    date: b.date,
                    open: b.open / base,
                    high: b.high / base,
                    low: b.low / base,
                    close: b.close / base,
                    volume: b.volume,
                },
                _ => Bar::void(b.date),
            })
            .collect();
        Self {
            code: format!("{}/{}", self.code, benchmark.code),
            bars,
        }
    }
}

// ─── SignalSeries ────────────────────────────────────────────────────

/// Raw output of a single signal on the signal's own date index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSeries {
    dates: Vec<NaiveDate>,
    values: Vec<Option<bool>>,
}

impl SignalSeries {
    pub fn new(dates: Vec<NaiveDate>, values: Vec<Option<bool>>) -> Self {
        assert_eq!(
            dates.len(),
            values.len(),
            "signal series dates and values must have equal length"
        );
        Self { dates, values }
    }

    /// Build from a fully-determined boolean vector.
    pub fn from_bools(dates: Vec<NaiveDate>, values: Vec<bool>) -> Self {
        Self::new(dates, values.into_iter().map(Some).collect())
    }

    /// A series with the same value on every date.
    pub fn constant(dates: Vec<NaiveDate>, value: bool) -> Self {
        let values = vec![Some(value); dates.len()];
        Self { dates, values }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn values(&self) -> &[Option<bool>] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Re-index onto `base`: dates present in both keep the computed value,
    /// dates absent from this series become indeterminate (`None`).
    pub fn reindex(&self, base: &[NaiveDate]) -> Vec<Option<bool>> {
        if self.dates.as_slice() == base {
            return self.values.clone();
        }
        let lookup: HashMap<NaiveDate, Option<bool>> = self
            .dates
            .iter()
            .copied()
            .zip(self.values.iter().copied())
            .collect();
        base.iter()
            .map(|d| lookup.get(d).copied().flatten())
            .collect()
    }
}

// ─── DecisionSeries ──────────────────────────────────────────────────

/// Composed boolean decisions aligned to the price index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionSeries {
    pub dates: Vec<NaiveDate>,
    pub values: Vec<bool>,
}

impl DecisionSeries {
    pub fn filled(dates: Vec<NaiveDate>, value: bool) -> Self {
        let values = vec![value; dates.len()];
        Self { dates, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn count_true(&self) -> usize {
        self.values.iter().filter(|v| **v).count()
    }

    pub fn all(&self, value: bool) -> bool {
        self.values.iter().all(|v| *v == value)
    }

    /// Value on `date`, if the date is on the index.
    pub fn get(&self, date: NaiveDate) -> Option<bool> {
        self.dates
            .binary_search(&date)
            .ok()
            .map(|idx| self.values[idx])
    }
}
