//! Simple Moving Average (SMA).
//!
//! Rolling mean of close prices over `period`. First value at index period-1.

use super::{closes, rolling_mean, BUILTIN_AUTHOR, BUILTIN_VERSION};
use crate::error::DataError;
use crate::params::{ParameterDefinition, ResolvedParams};
use crate::plot::PlotDirective;
use crate::plugin::IndicatorPlugin;
use crate::series::{AugmentedSeries, DerivedColumn};

#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleMovingAverage;

impl SimpleMovingAverage {
    pub fn column_name(period: usize) -> String {
        format!("SMA_{period}")
    }
}

impl IndicatorPlugin for SimpleMovingAverage {
    fn name(&self) -> &str {
        "Simple Moving Average"
    }

    fn version(&self) -> &str {
        BUILTIN_VERSION
    }

    fn description(&self) -> &str {
        "Calculate the simple moving average of closing prices"
    }

    fn author(&self) -> &str {
        BUILTIN_AUTHOR
    }

    fn parameter_definitions(&self) -> Vec<ParameterDefinition> {
        vec![ParameterDefinition::int("period", 20)
            .range(2.0, 500.0)
            .step(1.0)
            .describe("Number of periods for the moving average")]
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
            rolling_mean(&closes, period),
        ))
    }

    fn describe_outputs(&self, params: &ResolvedParams) -> Vec<PlotDirective> {
        let Ok(period) = params.window("period") else {
            return Vec::new();
        };
        vec![PlotDirective::line(Self::column_name(period), format!("SMA({period})")).color("blue")]
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::params::ParamValue;
    use crate::builtins::{assert_approx, make_series, DEFAULT_EPSILON};

    fn params(period: i64) -> ResolvedParams {
        let definitions = SimpleMovingAverage.parameter_definitions();
        let overrides = BTreeMap::from([(String::from("period"), ParamValue::Int(period))]);
        ResolvedParams::resolve(&definitions, &overrides).expect("params")
    }

    #[test]
    fn sma_5_basic() {
        let series = make_series(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0]);
        let result = SimpleMovingAverage
            .calculate(&series, &params(5))
            .expect("calculate");
        let values = &result.column("SMA_5").expect("column").values;

        assert_eq!(values.len(), 7);
        assert!(values[..4].iter().all(Option::is_none));
        // mean(10..=14) = 12
        assert_approx(values[4], 12.0, DEFAULT_EPSILON);
        assert_approx(values[5], 13.0, DEFAULT_EPSILON);
        assert_approx(values[6], 14.0, DEFAULT_EPSILON);
    }

    #[test]
    fn sma_too_few_bars_is_all_missing() {
        let series = make_series(&[10.0, 11.0, 12.0, 13.0, 14.0]);
        let result = SimpleMovingAverage
            .calculate(&series, &params(20))
            .expect("short series is not an error");
        assert!(result
            .column("SMA_20")
            .expect("column")
            .values
            .iter()
            .all(Option::is_none));
    }

    #[test]
    fn sma_keeps_input_series_intact() {
        let series = make_series(&[1.0, 2.0, 3.0]);
        let result = SimpleMovingAverage
            .calculate(&series, &params(2))
            .expect("calculate");

        assert!(series.columns().is_empty());
        assert_eq!(result.bars(), series.bars());
    }

    #[test]
    fn sma_empty_series_is_an_error() {
        let series = make_series(&[]);
        assert_eq!(
            SimpleMovingAverage.calculate(&series, &params(5)),
            Err(DataError::EmptySeries)
        );
    }

    #[test]
    fn sma_directive_names_its_column() {
        let outputs = SimpleMovingAverage.describe_outputs(&params(50));
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].column.as_deref(), Some("SMA_50"));
        assert_eq!(outputs[0].label, "SMA(50)");
    }
}
