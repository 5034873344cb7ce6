//! Price channels: rolling highest high / lowest low.
//!
//! The channel at bar t covers the `period` bars *before* t, so a close
//! above the upper channel is a genuine breakout rather than a tie with
//! itself. Lookback: period.

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelSide {
    High,
    Low,
}

#[derive(Debug, Clone)]
pub struct Channel {
    period: usize,
    side: ChannelSide,
    name: String,
}

impl Channel {
    pub fn new(period: usize, side: ChannelSide) -> Self {
        assert!(period >= 1, "channel period must be >= 1");
        let label = match side {
            ChannelSide::High => "high",
            ChannelSide::Low => "low",
        };
        Self {
            period,
            side,
            name: format!("channel_{label}_{period}"),
        }
    }
}

impl Indicator for Channel {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let (values, window) = match self.side {
            ChannelSide::High => {
                let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
                let window = rolling_max(&highs, self.period);
                (highs, window)
            }
            ChannelSide::Low => {
                let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
                let window = rolling_min(&lows, self.period);
                (lows, window)
            }
        };
        // Shift by one bar: channel excludes the current bar.
        let mut out = vec![f64::NAN; values.len()];
        for i in 1..values.len() {
            out[i] = window[i - 1];
        }
        out
    }
}

fn rolling_extreme(values: &[f64], period: usize, pick: fn(f64, f64) -> f64) -> Vec<f64> {
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
        result[i] = window.iter().copied().fold(window[0], |a, b| pick(a, b));
    }
    result
}

/// Rolling maximum over the window ending at (and including) each index.
pub fn rolling_max(values: &[f64], period: usize) -> Vec<f64> {
    rolling_extreme(values, period, f64::max)
}

/// Rolling minimum over the window ending at (and including) each index.
pub fn rolling_min(values: &[f64], period: usize) -> Vec<f64> {
    rolling_extreme(values, period, f64::min)
}
