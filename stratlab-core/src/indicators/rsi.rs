//! Relative Strength Index (RSI).
//!
//! Wilder smoothing of average gains and losses.
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss). Lookback: period.
//! avg_loss == 0 gives 100; avg_gain == 0 gives 0.

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    name: String,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "RSI period must be >= 1");
        Self {
            period,
            name: format!("rsi_{period}"),
        }
    }
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            50.0
        } else {
            100.0
        }
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let n = bars.len();
        let mut result = vec![f64::NAN; n];
        if n < self.period + 1 {
            return result;
        }

        let changes: Vec<f64> = (0..n)
            .map(|i| match i {
                0 => f64::NAN,
                _ => bars[i].close - bars[i - 1].close,
            })
            .collect();

        let seed = &changes[1..=self.period];
        if seed.iter().any(|c| c.is_nan()) {
            return result;
        }
        let period = self.period as f64;
        let mut avg_gain = seed.iter().filter(|c| **c > 0.0).sum::<f64>() / period;
        let mut avg_loss = -seed.iter().filter(|c| **c < 0.0).sum::<f64>() / period;
        result[self.period] = rsi_value(avg_gain, avg_loss);

        for i in (self.period + 1)..n {
            let ch = changes[i];
            if ch.is_nan() {
                return result;
            }
            avg_gain = (avg_gain * (period - 1.0) + ch.max(0.0)) / period;
            avg_loss = (avg_loss * (period - 1.0) + (-ch).max(0.0)) / period;
            result[i] = rsi_value(avg_gain, avg_loss);
        }
        result
    }
}
