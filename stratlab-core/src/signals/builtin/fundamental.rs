//! Signals over side tables: price/earnings band, margin-balance ratio.

use super::{choice_param, compare, int_param, on_prices, order_pair, real_param};
use crate::domain::SignalSeries;
use crate::indicators::sma_of_series;
use crate::params::SignalParams;
use crate::signals::{ParamRange, ParamSchema, SchemaField, SignalError, SignalInputs, SignalKind};

/// Price/earnings ratio (close over latest reported EPS) inside
/// `(per_min, per_max]`. Non-positive earnings never qualify.
#[derive(Debug, Clone, Copy)]
pub struct FundamentalPer;

impl SignalKind for FundamentalPer {
    fn schema(&self) -> ParamSchema {
        ParamSchema::new(vec![
            SchemaField::numeric("per_min", 0.0, ParamRange::real(0.0, 50.0)),
            SchemaField::numeric("per_max", 15.0, ParamRange::real(5.0, 100.0)),
        ])
    }

    fn normalize(&self, params: &mut SignalParams) {
        order_pair(params, "per_min", "per_max");
    }

    fn evaluate(
        &self,
        params: &SignalParams,
        inputs: &SignalInputs<'_>,
    ) -> Result<SignalSeries, SignalError> {
        let lo = real_param(params, "per_min")?;
        let hi = real_param(params, "per_max")?;
        if lo > hi {
            return Err(SignalError::invalid("per_min", "must not exceed per_max"));
        }
        let eps = inputs.statement_column("EPS")?;

        let values = inputs
            .prices
            .closes()
            .iter()
            .zip(&eps)
            .map(|(&close, &e)| {
                if !close.is_finite() || !e.is_finite() {
                    return None;
                }
                if e <= 0.0 {
                    return Some(false);
                }
                let per = close / e;
                Some(per > lo && per <= hi)
            })
            .collect();
        Ok(on_prices(inputs, values))
    }
}

/// Smoothed margin-balance ratio below (or above) a threshold.
#[derive(Debug, Clone, Copy)]
pub struct MarginBalance;

impl SignalKind for MarginBalance {
    fn schema(&self) -> ParamSchema {
        ParamSchema::new(vec![
            SchemaField::numeric("period", 5.0, ParamRange::integer(1.0, 60.0)),
            SchemaField::numeric("threshold", 1.0, ParamRange::real(0.2, 10.0)),
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
        let condition = choice_param(params, "condition", &["below", "above"])?;
        let ratio = inputs.margin_column("margin_ratio")?;

        let smoothed = sma_of_series(&ratio, period);
        let level = vec![threshold; smoothed.len()];
        let values = if condition == "below" {
            compare(&smoothed, &level, |r, t| r < t)
        } else {
            compare(&smoothed, &level, |r, t| r > t)
        };
        Ok(on_prices(inputs, values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::Side;
    use crate::domain::{DataSources, DatedTable};
    use crate::signals::builtin::test_support::{day, series};

    #[test]
    fn per_band_uses_forward_filled_eps() {
        let prices = series("X", &[100.0, 100.0, 100.0, 100.0]);
        let statements = DatedTable::new(vec![day(1), day(3)])
            .with_column("EPS", vec![10.0, -1.0]);
        let sources = DataSources {
            statements: Some(statements),
            ..DataSources::default()
        };
        let params = FundamentalPer.schema().defaults(Side::Entry);
        let out = FundamentalPer
            .evaluate(&params, &SignalInputs::new(&prices, &sources, false))
            .unwrap();
        // day 0 no report yet; PER 10 on days 1-2; loss on day 3
        assert_eq!(
            out.values(),
            &[None, Some(true), Some(true), Some(false)]
        );
    }

    #[test]
    fn per_reading_undeclared_column_is_missing_key() {
        let prices = series("X", &[100.0]);
        let sources = DataSources {
            statements: Some(DatedTable::new(vec![day(0)]).with_column("BPS", vec![5.0])),
            ..DataSources::default()
        };
        let err = FundamentalPer
            .evaluate(
                &FundamentalPer.schema().defaults(Side::Entry),
                &SignalInputs::new(&prices, &sources, false),
            )
            .unwrap_err();
        assert_eq!(err, SignalError::MissingKey("statements:EPS".into()));
    }

    #[test]
    fn margin_ratio_below_threshold() {
        let prices = series("X", &[1.0; 4]);
        let margin = DatedTable::new(vec![day(0), day(2)])
            .with_column("margin_ratio", vec![0.5, 3.0]);
        let sources = DataSources {
            margin: Some(margin),
            ..DataSources::default()
        };
        let params = MarginBalance.schema().defaults(Side::Entry).with("period", 1.0);
        let out = MarginBalance
            .evaluate(&params, &SignalInputs::new(&prices, &sources, false))
            .unwrap();
        assert_eq!(
            out.values(),
            &[Some(true), Some(true), Some(false), Some(false)]
        );
    }
}
