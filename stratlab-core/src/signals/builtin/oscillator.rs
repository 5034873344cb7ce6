//! Oscillator and band signals: RSI threshold, Bollinger position.

use super::{choice_param, compare, int_param, on_prices, real_param};
use crate::domain::SignalSeries;
use crate::indicators::{rolling_std, sma_of_series, Indicator, Rsi};
use crate::params::SignalParams;
use crate::signals::{ParamRange, ParamSchema, SchemaField, SignalError, SignalInputs, SignalKind};

/// RSI below (oversold) or above (overbought) a threshold.
#[derive(Debug, Clone, Copy)]
pub struct RsiThreshold;

impl SignalKind for RsiThreshold {
    fn schema(&self) -> ParamSchema {
        ParamSchema::new(vec![
            SchemaField::numeric("period", 14.0, ParamRange::integer(2.0, 50.0)),
            SchemaField::numeric("threshold", 30.0, ParamRange::real(10.0, 90.0)).on_exit(70.0),
            SchemaField::categorical("condition", "below").on_exit("above"),
        ])
    }

    fn evaluate(
        &self,
        params: &SignalParams,
        inputs: &SignalInputs<'_>,
    ) -> Result<SignalSeries, SignalError> {
        let period = int_param(params, "period")?;
        let threshold = real_param(params, "threshold")?;
        if !(0.0..=100.0).contains(&threshold) {
            return Err(SignalError::invalid("threshold", "must lie in [0, 100]"));
        }
        let condition = choice_param(params, "condition", &["below", "above"])?;

        let rsi = Rsi::new(period).compute(&inputs.prices.bars);
        let level = vec![threshold; rsi.len()];
        let values = if condition == "below" {
            compare(&rsi, &level, |r, t| r < t)
        } else {
            compare(&rsi, &level, |r, t| r > t)
        };
        Ok(on_prices(inputs, values))
    }
}

/// Close relative to Bollinger bands.
#[derive(Debug, Clone, Copy)]
pub struct BollingerBands;

const BAND_POSITIONS: [&str; 4] = ["below_lower", "above_upper", "above_middle", "below_middle"];

impl SignalKind for BollingerBands {
    fn schema(&self) -> ParamSchema {
        ParamSchema::new(vec![
            SchemaField::numeric("period", 20.0, ParamRange::integer(5.0, 100.0)),
            SchemaField::numeric("std_multiplier", 2.0, ParamRange::real(0.5, 4.0)),
            SchemaField::categorical("position", "below_lower").on_exit("above_upper"),
        ])
    }

    fn evaluate(
        &self,
        params: &SignalParams,
        inputs: &SignalInputs<'_>,
    ) -> Result<SignalSeries, SignalError> {
        let period = int_param(params, "period")?;
        let mult = real_param(params, "std_multiplier")?;
        let position = choice_param(params, "position", &BAND_POSITIONS)?;

        let closes = inputs.prices.closes();
        let middle = sma_of_series(&closes, period);
        let std = rolling_std(&closes, period);
        let band = |sign: f64| -> Vec<f64> {
            middle
                .iter()
                .zip(&std)
                .map(|(m, s)| m + sign * mult * s)
                .collect()
        };
        let values = match position {
            "below_lower" => compare(&closes, &band(-1.0), |c, b| c < b),
            "above_upper" => compare(&closes, &band(1.0), |c, b| c > b),
            "above_middle" => compare(&closes, &middle, |c, m| c > m),
            _ => compare(&closes, &middle, |c, m| c < m),
        };
        Ok(on_prices(inputs, values))
    }
}
