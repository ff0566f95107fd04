//! Exponential Moving Average (EMA).
//!
//! alpha = 2 / (period + 1), seeded with the first close and updated recursively,
//! so every bar carries a value. A NaN close yields no value for that bar and does
//! not disturb the running average.

use super::{closes, BUILTIN_AUTHOR, BUILTIN_VERSION};
use crate::error::DataError;
use crate::params::{ParameterDefinition, ResolvedParams};
use crate::plot::PlotDirective;
use crate::plugin::IndicatorPlugin;
use crate::series::{AugmentedSeries, DerivedColumn};

#[derive(Debug, Clone, Copy, Default)]
pub struct ExponentialMovingAverage;

impl ExponentialMovingAverage {
    pub fn column_name(period: usize) -> String {
        format!("EMA_{period}")
    }
}

pub(crate) fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut state: Option<f64> = None;
    values
        .iter()
        .map(|&value| {
            if value.is_nan() {
                return f64::NAN;
            }
            let next = match state {
                Some(previous) => alpha * value + (1.0 - alpha) * previous,
                None => value,
            };
            state = Some(next);
            next
        })
        .collect()
}

impl IndicatorPlugin for ExponentialMovingAverage {
    fn name(&self) -> &str {
        "Exponential Moving Average"
    }

    fn version(&self) -> &str {
        BUILTIN_VERSION
    }

    fn description(&self) -> &str {
        "Calculate the exponential moving average of closing prices"
    }

    fn author(&self) -> &str {
        BUILTIN_AUTHOR
    }

    fn parameter_definitions(&self) -> Vec<ParameterDefinition> {
        vec![ParameterDefinition::int("period", 12)
            .range(2.0, 500.0)
            .step(1.0)
            .describe("Span of the exponential moving average")]
    }

    fn calculate(
        &self,
        series: &AugmentedSeries,
        params: &ResolvedParams,
    ) -> Result<AugmentedSeries, DataError> {
        let period = params.window("period")?;
        let closes = closes(series)?;
        series.with_column(DerivedColumn::from_f64(
            Self::column_name(period),
            ema(&closes, period),
        ))
    }

    fn describe_outputs(&self, params: &ResolvedParams) -> Vec<PlotDirective> {
        let Ok(period) = params.window("period") else {
            return Vec::new();
        };
        vec![PlotDirective::line(Self::column_name(period), format!("EMA({period})")).color("red")]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::{assert_approx, make_series, DEFAULT_EPSILON};

    #[test]
    fn ema_seeds_with_first_close() {
        // alpha = 2 / 4 = 0.5
        let result = ema(&[10.0, 12.0, 14.0], 3);
        assert_eq!(result[0], 10.0);
        assert!((result[1] - 11.0).abs() < DEFAULT_EPSILON);
        assert!((result[2] - 12.5).abs() < DEFAULT_EPSILON);
    }

    #[test]
    fn ema_constant_series_stays_constant() {
        let result = ema(&[7.0; 30], 12);
        assert!(result.iter().all(|value| (value - 7.0).abs() < DEFAULT_EPSILON));
    }

    #[test]
    fn ema_skips_nan_without_resetting() {
        let result = ema(&[10.0, f64::NAN, 14.0], 3);
        assert!(result[1].is_nan());
        assert!((result[2] - 12.0).abs() < DEFAULT_EPSILON);
    }

    #[test]
    fn ema_column_uses_default_period() {
        let series = make_series(&[10.0, 12.0, 14.0]);
        let params = ResolvedParams::defaults(&ExponentialMovingAverage.parameter_definitions())
            .expect("defaults");
        let result = ExponentialMovingAverage
            .calculate(&series, &params)
            .expect("calculate");

        let values = &result.column("EMA_12").expect("column").values;
        assert_approx(values[0], 10.0, DEFAULT_EPSILON);
        assert!(values.iter().all(Option::is_some));
    }
}
