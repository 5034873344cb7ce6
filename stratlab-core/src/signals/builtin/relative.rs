//! Signals relative to the market: beta band against the benchmark, sector
//! momentum.

use super::{align_closes, choice_param, compare, int_param, on_prices, order_pair, real_param};
use crate::domain::SignalSeries;
use crate::indicators::{roc_of_series, rolling_beta};
use crate::params::SignalParams;
use crate::signals::{ParamRange, ParamSchema, SchemaField, SignalError, SignalInputs, SignalKind};

/// Rolling beta against the benchmark inside `[beta_min, beta_max]`.
#[derive(Debug, Clone, Copy)]
pub struct BetaFilter;

impl SignalKind for BetaFilter {
    fn schema(&self) -> ParamSchema {
        ParamSchema::new(vec![
            SchemaField::numeric("lookback", 60.0, ParamRange::integer(20.0, 250.0)),
            SchemaField::numeric("beta_min", 0.5, ParamRange::real(0.0, 2.0)),
            SchemaField::numeric("beta_max", 1.5, ParamRange::real(0.5, 3.0)),
        ])
    }

    fn normalize(&self, params: &mut SignalParams) {
        order_pair(params, "beta_min", "beta_max");
    }

    fn evaluate(
        &self,
        params: &SignalParams,
        inputs: &SignalInputs<'_>,
    ) -> Result<SignalSeries, SignalError> {
        let lookback = int_param(params, "lookback")?;
        let lo = real_param(params, "beta_min")?;
        let hi = real_param(params, "beta_max")?;
        if lo > hi {
            return Err(SignalError::invalid("beta_min", "must not exceed beta_max"));
        }
        let benchmark = inputs.benchmark()?;

        let dates = inputs.prices.dates();
        let bench = align_closes(benchmark, &dates);
        let beta = rolling_beta(&inputs.prices.closes(), &bench, lookback);
        let values = beta
            .iter()
            .map(|b| b.is_finite().then(|| (lo..=hi).contains(b)))
            .collect();
        Ok(on_prices(inputs, values))
    }
}

/// Sector index rate of change over `period` above (or below) a threshold.
/// Evaluated on the sector series' own index.
#[derive(Debug, Clone, Copy)]
pub struct SectorStrength;

impl SignalKind for SectorStrength {
    fn schema(&self) -> ParamSchema {
        ParamSchema::new(vec![
            SchemaField::numeric("period", 20.0, ParamRange::integer(5.0, 120.0)),
            SchemaField::numeric("threshold", 0.0, ParamRange::real(-0.2, 0.2)),
            SchemaField::categorical("condition", "above").on_exit("below"),
        ])
    }

    fn evaluate(
        &self,
        params: &SignalParams,
        inputs: &SignalInputs<'_>,
    ) -> Result<SignalSeries, SignalError> {
        let period = int_param(params, "period")?;
        let threshold = real_param(params, "threshold")?;
        let condition = choice_param(params, "condition", &["above", "below"])?;
        let sector = inputs.sector()?;

        let roc = roc_of_series(&sector.closes(), period);
        let level = vec![threshold; roc.len()];
        let values = if condition == "above" {
            compare(&roc, &level, |r, t| r > t)
        } else {
            compare(&roc, &level, |r, t| r < t)
        };
        Ok(SignalSeries::new(sector.dates(), values))
    }
}
