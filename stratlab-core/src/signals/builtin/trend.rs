//! Trend signals: buy-and-hold, price vs moving average, MA crossover,
//! benchmark trend.

use super::{choice_param, compare, int_param, on_prices, within_last};
use crate::domain::SignalSeries;
use crate::indicators::{sma_of_series, MaType};
use crate::params::SignalParams;
use crate::signals::{ParamRange, ParamSchema, SchemaField, SignalError, SignalInputs, SignalKind};

fn ma_type(params: &SignalParams, path: &str) -> Result<MaType, SignalError> {
    params
        .text_or(path, "sma")
        .parse()
        .map_err(|reason: String| SignalError::invalid(path, reason))
}

/// Always in the market.
#[derive(Debug, Clone, Copy)]
pub struct BuyAndHold;

impl SignalKind for BuyAndHold {
    fn schema(&self) -> ParamSchema {
        ParamSchema::default()
    }

    fn evaluate(
        &self,
        _params: &SignalParams,
        inputs: &SignalInputs<'_>,
    ) -> Result<SignalSeries, SignalError> {
        Ok(SignalSeries::constant(inputs.prices.dates(), true))
    }
}

/// Close above (or below) its moving average.
#[derive(Debug, Clone, Copy)]
pub struct MaBreakout;

impl SignalKind for MaBreakout {
    fn schema(&self) -> ParamSchema {
        ParamSchema::new(vec![
            SchemaField::numeric("period", 25.0, ParamRange::integer(5.0, 200.0)),
            SchemaField::categorical("ma_type", "sma"),
            SchemaField::categorical("direction", "above").on_exit("below"),
        ])
    }

    fn evaluate(
        &self,
        params: &SignalParams,
        inputs: &SignalInputs<'_>,
    ) -> Result<SignalSeries, SignalError> {
        let period = int_param(params, "period")?;
        let ma_type = ma_type(params, "ma_type")?;
        let direction = choice_param(params, "direction", &["above", "below"])?;

        let closes = inputs.prices.closes();
        let ma = ma_type.compute(&closes, period);
        let values = match direction {
            "above" => compare(&closes, &ma, |c, m| c > m),
            _ => compare(&closes, &ma, |c, m| c < m),
        };
        Ok(on_prices(inputs, values))
    }
}

/// Fast MA crossing the slow MA within the last `lookback_days` bars.
///
/// Composite: `fast` and `slow` are nested sub-maps with their own period
/// and MA type.
#[derive(Debug, Clone, Copy)]
pub struct Crossover;

impl SignalKind for Crossover {
    fn schema(&self) -> ParamSchema {
        ParamSchema::new(vec![
            SchemaField::numeric("fast.period", 5.0, ParamRange::integer(2.0, 50.0)),
            SchemaField::categorical("fast.ma_type", "sma"),
            SchemaField::numeric("slow.period", 25.0, ParamRange::integer(10.0, 250.0)),
            SchemaField::categorical("slow.ma_type", "sma"),
            SchemaField::categorical("direction", "golden").on_exit("dead"),
            SchemaField::numeric("lookback_days", 1.0, ParamRange::integer(1.0, 10.0)),
        ])
    }

    /// Keep fast strictly shorter than slow.
    fn normalize(&self, params: &mut SignalParams) {
        let (Some(fast), Some(slow)) = (params.number("fast.period"), params.number("slow.period"))
        else {
            return;
        };
        if slow <= fast {
            params.set("fast.period", slow.min(fast));
            params.set("slow.period", slow.max(fast) + 1.0);
        }
    }

    fn evaluate(
        &self,
        params: &SignalParams,
        inputs: &SignalInputs<'_>,
    ) -> Result<SignalSeries, SignalError> {
        let fast_period = int_param(params, "fast.period")?;
        let slow_period = int_param(params, "slow.period")?;
        if fast_period >= slow_period {
            return Err(SignalError::invalid(
                "fast.period",
                format!("fast ({fast_period}) must be shorter than slow ({slow_period})"),
            ));
        }
        let direction = choice_param(params, "direction", &["golden", "dead"])?;
        let lookback = int_param(params, "lookback_days")?;

        let closes = inputs.prices.closes();
        let fast = ma_type(params, "fast.ma_type")?.compute(&closes, fast_period);
        let slow = ma_type(params, "slow.ma_type")?.compute(&closes, slow_period);
        let golden = direction == "golden";

        let mut events = vec![None; closes.len()];
        for i in 1..closes.len() {
            let window = [fast[i - 1], slow[i - 1], fast[i], slow[i]];
            if window.iter().any(|v| !v.is_finite()) {
                continue;
            }
            let (was_above, is_above) = (fast[i - 1] > slow[i - 1], fast[i] > slow[i]);
            events[i] = Some(if golden {
                !was_above && is_above
            } else {
                was_above && !is_above
            });
        }
        Ok(on_prices(inputs, within_last(events, lookback)))
    }
}

/// Benchmark close above (or below) its SMA. Evaluated on the benchmark's
/// own index.
#[derive(Debug, Clone, Copy)]
pub struct IndexTrend;

impl SignalKind for IndexTrend {
    fn schema(&self) -> ParamSchema {
        ParamSchema::new(vec![
            SchemaField::numeric("period", 50.0, ParamRange::integer(10.0, 200.0)),
            SchemaField::categorical("direction", "above").on_exit("below"),
        ])
    }

    fn evaluate(
        &self,
        params: &SignalParams,
        inputs: &SignalInputs<'_>,
    ) -> Result<SignalSeries, SignalError> {
        let period = int_param(params, "period")?;
        let direction = choice_param(params, "direction", &["above", "below"])?;
        let benchmark = inputs.benchmark()?;

        let closes = benchmark.closes();
        let ma = sma_of_series(&closes, period);
        let values = match direction {
            "above" => compare(&closes, &ma, |c, m| c > m),
            _ => compare(&closes, &ma, |c, m| c < m),
        };
        Ok(SignalSeries::new(benchmark.dates(), values))
    }
}
