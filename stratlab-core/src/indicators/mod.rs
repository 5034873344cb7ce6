//! Indicators used by the built-in signal kinds.
//!
//! Bar-based indicators implement [`Indicator`]: full bar history in, one
//! value per bar out, NaN during warmup and wherever an input is missing.
//! Slice helpers (`sma_of_series`, `rolling_std`, ...) serve side data that
//! is not shaped as bars (margin ratios, forward-filled statements).

pub mod atr;
pub mod channel;
pub mod moving;
pub mod relative;
pub mod rsi;

pub use atr::{true_range, wilder_smooth, Atr};
pub use channel::{rolling_max, rolling_min, Channel, ChannelSide};
pub use moving::{ema_of_series, rolling_std, sma_of_series, MaType};
pub use relative::{pct_change, roc_of_series, rolling_beta};
pub use rsi::Rsi;

use crate::domain::Bar;

/// Trait for indicators.
///
/// The output has the same length as `bars`; the first `lookback()` values
/// are NaN. No value at bar t may depend on bars after t.
pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g. "sma_20", "atr_14").
    fn name(&self) -> &str;

    /// Number of bars needed before the indicator produces valid output.
    fn lookback(&self) -> usize;

    fn compute(&self, bars: &[Bar]) -> Vec<f64>;
}

/// Create synthetic bars from close prices for testing.
///
/// open = prev close, high = max(open, close) + 1, low = min(open, close) - 1.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<Bar> {
    let base_date = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar {
                date: base_date + chrono::Duration::days(i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;

#[cfg(test)]
mod tests {
    use super::*;

    /// Truncating the input must not change earlier outputs.
    #[test]
    fn no_lookahead_across_bar_indicators() {
        let closes: Vec<f64> = (0..60)
            .map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0 + i as f64 * 0.1)
            .collect();
        let bars = make_bars(&closes);
        let indicators: Vec<Box<dyn Indicator>> = vec![
            Box::new(Atr::new(14)),
            Box::new(Rsi::new(14)),
            Box::new(Channel::new(20, ChannelSide::High)),
        ];
        for ind in &indicators {
            let full = ind.compute(&bars);
            let partial = ind.compute(&bars[..40]);
            for i in 0..40 {
                let (a, b) = (full[i], partial[i]);
                assert!(
                    (a.is_nan() && b.is_nan()) || (a - b).abs() < DEFAULT_EPSILON,
                    "{} differs at {i}: {a} vs {b}",
                    ind.name()
                );
            }
        }
    }
}
