//! Moving averages (SMA, EMA) and rolling standard deviation over slices.
//!
//! Any NaN inside a window makes that output NaN. EMA seeds from the SMA of
//! its first `period` values and stays NaN after a gap.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Moving-average flavour selectable from signal parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaType {
    Sma,
    Ema,
}

impl MaType {
    pub fn compute(self, values: &[f64], period: usize) -> Vec<f64> {
        match self {
            Self::Sma => sma_of_series(values, period),
            Self::Ema => ema_of_series(values, period),
        }
    }
}

impl fmt::Display for MaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sma => write!(f, "sma"),
            Self::Ema => write!(f, "ema"),
        }
    }
}

impl FromStr for MaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sma" => Ok(Self::Sma),
            "ema" => Ok(Self::Ema),
            other => Err(format!("unknown moving average type '{other}'")),
        }
    }
}

// ─── Slice helpers ───────────────────────────────────────────────────

/// Rolling mean over `period` values.
pub fn sma_of_series(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }
    for i in (period - 1)..n {
        let window = &values[i + 1 - period..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        result[i] = window.iter().sum::<f64>() / period as f64;
    }
    result
}

/// Exponential moving average with alpha = 2 / (period + 1).
pub fn ema_of_series(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }
    let seed_window = &values[..period];
    if seed_window.iter().any(|v| v.is_nan()) {
        return result;
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut prev = seed_window.iter().sum::<f64>() / period as f64;
    result[period - 1] = prev;
    for i in period..n {
        if values[i].is_nan() {
            return result;
        }
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = prev;
    }
    result
}

/// Rolling population standard deviation.
pub fn rolling_std(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }
    for i in (period - 1)..n {
        let window = &values[i + 1 - period..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        let mean = window.iter().sum::<f64>() / period as f64;
        let variance = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / period as f64;
        result[i] = variance.sqrt();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn sma_5_basic() {
        let result = sma_of_series(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0], 5);
        assert!(result[..4].iter().all(|v| v.is_nan()));
        assert_approx(result[4], 12.0, DEFAULT_EPSILON);
        assert_approx(result[6], 14.0, DEFAULT_EPSILON);
    }

    #[test]
    fn sma_nan_window_is_nan() {
        let result = sma_of_series(&[10.0, 11.0, f64::NAN, 13.0, 14.0, 15.0], 3);
        assert!(result[2].is_nan() && result[3].is_nan() && result[4].is_nan());
        assert_approx(result[5], 14.0, DEFAULT_EPSILON);
    }

    #[test]
    fn ema_seeds_from_sma() {
        let result = ema_of_series(&[1.0, 2.0, 3.0, 4.0], 3);
        assert_approx(result[2], 2.0, DEFAULT_EPSILON);
        // alpha = 0.5
        assert_approx(result[3], 3.0, DEFAULT_EPSILON);
    }

    #[test]
    fn ema_stays_nan_after_gap() {
        let result = ema_of_series(&[1.0, 2.0, 3.0, f64::NAN, 5.0], 2);
        assert!(result[3].is_nan() && result[4].is_nan());
    }

    #[test]
    fn rolling_std_of_constant_is_zero() {
        let result = rolling_std(&[5.0; 6], 4);
        assert_approx(result[5], 0.0, DEFAULT_EPSILON);
    }

    #[test]
    fn ma_type_parses() {
        assert_eq!("ema".parse::<MaType>(), Ok(MaType::Ema));
        assert!("wma".parse::<MaType>().is_err());
    }
}
