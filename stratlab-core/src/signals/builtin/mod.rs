//! Built-in signal catalog.
//!
//! Declaration order here is composition order. The math is deliberately
//! plain; what matters to the search layer is each signal's metadata,
//! schema and composition contract.

pub mod breakout;
pub mod fundamental;
pub mod oscillator;
pub mod relative;
pub mod risk;
pub mod trend;

use chrono::NaiveDate;
use std::collections::HashMap;

use super::{ParamRange, SignalCategory, SignalDefinition, SignalError, SignalInputs, UsageScope};
use crate::domain::{DataRequirement, PriceSeries, SignalSeries};
use crate::params::SignalParams;

/// Pairs of signals that may not be enabled together on one side.
pub const EXCLUSIVE_PAIRS: [(&str, &str); 2] = [
    ("crossover", "ma_breakout"),
    ("rsi_threshold", "bollinger_bands"),
];

/// Hand-tuned search ranges that replace schema bounds.
pub fn range_overrides() -> Vec<(&'static str, &'static str, ParamRange)> {
    vec![
        ("period_breakout", "period", ParamRange::integer(10.0, 120.0)),
        ("crossover", "slow.period", ParamRange::integer(20.0, 200.0)),
        ("rsi_threshold", "threshold", ParamRange::real(20.0, 80.0)),
        ("trailing_stop", "stop_pct", ParamRange::real(0.03, 0.2)),
    ]
}

pub fn catalog() -> Vec<SignalDefinition> {
    use SignalCategory as C;
    use UsageScope as U;
    vec![
        SignalDefinition::new("buy_and_hold", C::Trend, U::EntryOnly, trend::BuyAndHold),
        SignalDefinition::new("period_breakout", C::Breakout, U::Both, breakout::PeriodBreakout),
        SignalDefinition::new("ma_breakout", C::Trend, U::Both, trend::MaBreakout),
        SignalDefinition::new("crossover", C::Trend, U::Both, trend::Crossover),
        SignalDefinition::new("rsi_threshold", C::Oscillator, U::Both, oscillator::RsiThreshold),
        SignalDefinition::new(
            "bollinger_bands",
            C::Volatility,
            U::Both,
            oscillator::BollingerBands,
        ),
        SignalDefinition::new("atr_breakout", C::Volatility, U::Both, breakout::AtrBreakout),
        SignalDefinition::new("volume_surge", C::Volume, U::Both, breakout::VolumeSurge),
        SignalDefinition::new("index_trend", C::Relative, U::Both, trend::IndexTrend)
            .requires(DataRequirement::Benchmark),
        SignalDefinition::new("beta_filter", C::Relative, U::EntryOnly, relative::BetaFilter)
            .requires(DataRequirement::Benchmark)
            .relative_mode_restricted(),
        SignalDefinition::new("sector_strength", C::Relative, U::Both, relative::SectorStrength)
            .requires(DataRequirement::Sector),
        SignalDefinition::new(
            "fundamental_per",
            C::Fundamental,
            U::Both,
            fundamental::FundamentalPer,
        )
        .requires(DataRequirement::Statements("EPS".into()))
        .exit_disabled(),
        SignalDefinition::new("margin_balance", C::Margin, U::Both, fundamental::MarginBalance)
            .requires(DataRequirement::Margin("margin_ratio".into()))
            .relative_mode_restricted(),
        SignalDefinition::new("trailing_stop", C::Risk, U::ExitOnly, risk::TrailingStop),
    ]
}

// ─── Parameter readers ───────────────────────────────────────────────

/// Positive integer parameter (periods, lookbacks).
pub(crate) fn int_param(params: &SignalParams, path: &str) -> Result<usize, SignalError> {
    let v = params
        .number(path)
        .ok_or_else(|| SignalError::invalid(path, "missing numeric value"))?;
    if !v.is_finite() || v < 1.0 {
        return Err(SignalError::invalid(path, format!("must be >= 1, got {v}")));
    }
    Ok(v.round() as usize)
}

pub(crate) fn real_param(params: &SignalParams, path: &str) -> Result<f64, SignalError> {
    match params.number(path) {
        Some(v) if v.is_finite() => Ok(v),
        Some(v) => Err(SignalError::invalid(path, format!("must be finite, got {v}"))),
        None => Err(SignalError::invalid(path, "missing numeric value")),
    }
}

pub(crate) fn choice_param<'p>(
    params: &'p SignalParams,
    path: &str,
    allowed: &[&str],
) -> Result<&'p str, SignalError> {
    let value = params
        .text(path)
        .ok_or_else(|| SignalError::invalid(path, "missing value"))?;
    if allowed.contains(&value) {
        Ok(value)
    } else {
        Err(SignalError::invalid(
            path,
            format!("'{value}' is not one of {allowed:?}"),
        ))
    }
}

/// Swap two numeric parameters if `low > high`.
pub(crate) fn order_pair(params: &mut SignalParams, low: &str, high: &str) {
    if let (Some(a), Some(b)) = (params.number(low), params.number(high)) {
        if a > b {
            params.set(low, b);
            params.set(high, a);
        }
    }
}

// ─── Series helpers ──────────────────────────────────────────────────

/// Element-wise comparison; `None` wherever either side is missing.
pub(crate) fn compare(lhs: &[f64], rhs: &[f64], op: fn(f64, f64) -> bool) -> Vec<Option<bool>> {
    lhs.iter()
        .zip(rhs)
        .map(|(&a, &b)| (a.is_finite() && b.is_finite()).then(|| op(a, b)))
        .collect()
}

/// True if the condition held on any of the last `days` bars (including
/// today). Undecidable today stays undecidable.
pub(crate) fn within_last(values: Vec<Option<bool>>, days: usize) -> Vec<Option<bool>> {
    if days <= 1 {
        return values;
    }
    (0..values.len())
        .map(|i| {
            values[i]?;
            let start = (i + 1).saturating_sub(days);
            Some(values[start..=i].iter().any(|v| *v == Some(true)))
        })
        .collect()
}

/// Series on the traded instrument's own index.
pub(crate) fn on_prices(inputs: &SignalInputs<'_>, values: Vec<Option<bool>>) -> SignalSeries {
    SignalSeries::new(inputs.prices.dates(), values)
}

/// Closes of `series` looked up on `dates`; NaN where absent.
pub(crate) fn align_closes(series: &PriceSeries, dates: &[NaiveDate]) -> Vec<f64> {
    let lookup: HashMap<NaiveDate, f64> = series.bars.iter().map(|b| (b.date, b.close)).collect();
    dates
        .iter()
        .map(|d| lookup.get(d).copied().unwrap_or(f64::NAN))
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::domain::{Bar, DataSources, PriceSeries};
    use chrono::NaiveDate;

    pub fn day(i: usize) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, 2).unwrap() + chrono::Duration::days(i as i64)
    }

    pub fn series(code: &str, closes: &[f64]) -> PriceSeries {
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar {
                date: day(i),
                open: c,
                high: c + 1.0,
                low: c - 1.0,
                close: c,
                volume: 1000.0,
            })
            .collect();
        PriceSeries::new(code, bars)
    }

    pub fn no_sources() -> DataSources {
        DataSources::empty()
    }
}
