//! Breakout signals: channel breakout, ATR band breakout, volume surge.

use super::{choice_param, compare, int_param, on_prices, real_param, within_last};
use crate::domain::SignalSeries;
use crate::indicators::{sma_of_series, Atr, Channel, ChannelSide, Indicator};
use crate::params::SignalParams;
use crate::signals::{ParamRange, ParamSchema, SchemaField, SignalError, SignalInputs, SignalKind};

/// Close beyond the highest high (or lowest low) of the previous `period`
/// bars, within the last `lookback_days`.
#[derive(Debug, Clone, Copy)]
pub struct PeriodBreakout;

impl SignalKind for PeriodBreakout {
    fn schema(&self) -> ParamSchema {
        ParamSchema::new(vec![
            SchemaField::numeric("period", 20.0, ParamRange::integer(5.0, 250.0)),
            SchemaField::categorical("direction", "high").on_exit("low"),
            SchemaField::numeric("lookback_days", 1.0, ParamRange::integer(1.0, 20.0)),
        ])
    }

    fn evaluate(
        &self,
        params: &SignalParams,
        inputs: &SignalInputs<'_>,
    ) -> Result<SignalSeries, SignalError> {
        let period = int_param(params, "period")?;
        let direction = choice_param(params, "direction", &["high", "low"])?;
        let lookback = int_param(params, "lookback_days")?;

        let bars = &inputs.prices.bars;
        let closes = inputs.prices.closes();
        let values = if direction == "high" {
            let upper = Channel::new(period, ChannelSide::High).compute(bars);
            compare(&closes, &upper, |c, u| c > u)
        } else {
            let lower = Channel::new(period, ChannelSide::Low).compute(bars);
            compare(&closes, &lower, |c, l| c < l)
        };
        Ok(on_prices(inputs, within_last(values, lookback)))
    }
}

/// Close beyond SMA ± threshold × ATR.
#[derive(Debug, Clone, Copy)]
pub struct AtrBreakout;

impl SignalKind for AtrBreakout {
    fn schema(&self) -> ParamSchema {
        ParamSchema::new(vec![
            SchemaField::numeric("atr_period", 14.0, ParamRange::integer(5.0, 50.0)),
            SchemaField::numeric("ma_period", 20.0, ParamRange::integer(5.0, 100.0)),
            SchemaField::numeric("threshold", 1.5, ParamRange::real(0.5, 5.0)),
            SchemaField::categorical("direction", "up").on_exit("down"),
        ])
    }

    fn evaluate(
        &self,
        params: &SignalParams,
        inputs: &SignalInputs<'_>,
    ) -> Result<SignalSeries, SignalError> {
        let atr_period = int_param(params, "atr_period")?;
        let ma_period = int_param(params, "ma_period")?;
        let threshold = real_param(params, "threshold")?;
        if threshold <= 0.0 {
            return Err(SignalError::invalid("threshold", "must be positive"));
        }
        let direction = choice_param(params, "direction", &["up", "down"])?;

        let closes = inputs.prices.closes();
        let atr = Atr::new(atr_period).compute(&inputs.prices.bars);
        let ma = sma_of_series(&closes, ma_period);
        let sign = if direction == "up" { 1.0 } else { -1.0 };
        let band: Vec<f64> = ma
            .iter()
            .zip(&atr)
            .map(|(m, a)| m + sign * threshold * a)
            .collect();
        let values = if direction == "up" {
            compare(&closes, &band, |c, b| c > b)
        } else {
            compare(&closes, &band, |c, b| c < b)
        };
        Ok(on_prices(inputs, values))
    }
}

/// Volume above `threshold` × its SMA.
#[derive(Debug, Clone, Copy)]
pub struct VolumeSurge;

impl SignalKind for VolumeSurge {
    fn schema(&self) -> ParamSchema {
        ParamSchema::new(vec![
            SchemaField::numeric("period", 20.0, ParamRange::integer(5.0, 100.0)),
            SchemaField::numeric("threshold", 1.5, ParamRange::real(1.1, 5.0)),
        ])
    }

    fn evaluate(
        &self,
        params: &SignalParams,
        inputs: &SignalInputs<'_>,
    ) -> Result<SignalSeries, SignalError> {
        let period = int_param(params, "period")?;
        let threshold = real_param(params, "threshold")?;

        let volumes = inputs.prices.volumes();
        let scaled: Vec<f64> = sma_of_series(&volumes, period)
            .into_iter()
            .map(|v| v * threshold)
            .collect();
        Ok(on_prices(inputs, compare(&volumes, &scaled, |v, s| v > s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::Side;
    use crate::signals::builtin::test_support::{no_sources, series};

    #[test]
    fn period_breakout_high_and_low() {
        // highs = close + 1, lows = close - 1
        let prices = series("X", &[10.0, 10.0, 10.0, 12.0, 7.0]);
        let sources = no_sources();
        let inputs = SignalInputs::new(&prices, &sources, false);

        let entry = PeriodBreakout.schema().defaults(Side::Entry).with("period", 2.0);
        let out = PeriodBreakout.evaluate(&entry, &inputs).unwrap();
        assert_eq!(out.values()[3], Some(true));
        assert_eq!(out.values()[4], Some(false));

        let exit = PeriodBreakout.schema().defaults(Side::Exit).with("period", 2.0);
        let out = PeriodBreakout.evaluate(&exit, &inputs).unwrap();
        assert_eq!(out.values()[3], Some(false));
        assert_eq!(out.values()[4], Some(true));
    }

    #[test]
    fn volume_surge_flags_spike() {
        let mut prices = series("X", &[10.0; 6]);
        prices.bars[5].volume = 5000.0;
        let sources = no_sources();
        let params = VolumeSurge.schema().defaults(Side::Entry).with("period", 3.0);
        let out = VolumeSurge
            .evaluate(&params, &SignalInputs::new(&prices, &sources, false))
            .unwrap();
        assert_eq!(out.values()[4], Some(false));
        assert_eq!(out.values()[5], Some(true));
    }

    #[test]
    fn atr_breakout_rejects_non_positive_threshold() {
        let prices = series("X", &[10.0; 30]);
        let sources = no_sources();
        let params = AtrBreakout.schema().defaults(Side::Entry).with("threshold", 0.0);
        let err = AtrBreakout
            .evaluate(&params, &SignalInputs::new(&prices, &sources, false))
            .unwrap_err();
        assert!(matches!(err, SignalError::InvalidParameter { .. }));
    }
}
