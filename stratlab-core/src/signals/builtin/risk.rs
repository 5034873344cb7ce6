//! Risk exits.

use super::{compare, int_param, on_prices, real_param};
use crate::domain::SignalSeries;
use crate::indicators::rolling_max;
use crate::params::SignalParams;
use crate::signals::{ParamRange, ParamSchema, SchemaField, SignalError, SignalInputs, SignalKind};

/// Close more than `stop_pct` below the highest close of the last
/// `lookback` bars.
#[derive(Debug, Clone, Copy)]
pub struct TrailingStop;

impl SignalKind for TrailingStop {
    fn schema(&self) -> ParamSchema {
        ParamSchema::new(vec![
            SchemaField::numeric("lookback", 20.0, ParamRange::integer(5.0, 120.0)),
            SchemaField::numeric("stop_pct", 0.1, ParamRange::real(0.02, 0.3)),
        ])
    }

    fn evaluate(
        &self,
        params: &SignalParams,
        inputs: &SignalInputs<'_>,
    ) -> Result<SignalSeries, SignalError> {
        let lookback = int_param(params, "lookback")?;
        let stop_pct = real_param(params, "stop_pct")?;
        if !(stop_pct > 0.0 && stop_pct < 1.0) {
            return Err(SignalError::invalid("stop_pct", "must lie in (0, 1)"));
        }

        let closes = inputs.prices.closes();
        let stop: Vec<f64> = rolling_max(&closes, lookback)
            .into_iter()
            .map(|peak| peak * (1.0 - stop_pct))
            .collect();
        Ok(on_prices(inputs, compare(&closes, &stop, |c, s| c < s)))
    }
}
