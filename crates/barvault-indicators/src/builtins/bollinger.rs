//! Bollinger Bands: rolling mean of close +/- multiplier * rolling sample stddev.

use super::{closes, rolling_mean, rolling_sample_std, BUILTIN_AUTHOR, BUILTIN_VERSION};
use crate::error::DataError;
use crate::params::{ParameterDefinition, ResolvedParams};
use crate::plot::{LineDash, PlotDirective};
use crate::plugin::IndicatorPlugin;
use crate::series::{AugmentedSeries, DerivedColumn};

#[derive(Debug, Clone, Copy, Default)]
pub struct BollingerBands;

impl BollingerBands {
    /// Upper, middle and lower column names. Whole multipliers keep one decimal (`2.0`).
    pub fn column_names(period: usize, multiplier: f64) -> [String; 3] {
        let multiplier = if multiplier.fract() == 0.0 {
            format!("{multiplier:.1}")
        } else {
            format!("{multiplier}")
        };
        ["Upper", "Middle", "Lower"].map(|band| format!("BB_{band}_{period}_{multiplier}"))
    }

    fn settings(params: &ResolvedParams) -> Result<(usize, f64), DataError> {
        Ok((params.window("period")?, params.float("multiplier")?))
    }
}

impl IndicatorPlugin for BollingerBands {
    fn name(&self) -> &str {
        "Bollinger Bands"
    }

    fn version(&self) -> &str {
        BUILTIN_VERSION
    }

    fn description(&self) -> &str {
        "Calculate Bollinger Bands volatility indicator"
    }

    fn author(&self) -> &str {
        BUILTIN_AUTHOR
    }

    fn parameter_definitions(&self) -> Vec<ParameterDefinition> {
        vec![
            ParameterDefinition::int("period", 20)
                .range(2.0, 500.0)
                .step(1.0)
                .describe("Number of periods for the middle band"),
            ParameterDefinition::float("multiplier", 2.0)
                .range(0.5, 5.0)
                .step(0.1)
                .describe("Standard deviation multiplier"),
        ]
    }

    fn calculate(
        &self,
        series: &AugmentedSeries,
        params: &ResolvedParams,
    ) -> Result<AugmentedSeries, DataError> {
        let (period, multiplier) = Self::settings(params)?;
        let closes = closes(series)?;

        let middle = rolling_mean(&closes, period);
        let deviation = rolling_sample_std(&closes, period);
        let upper = middle
            .iter()
            .zip(&deviation)
            .map(|(mean, std)| mean + multiplier * std)
            .collect();
        let lower = middle
            .iter()
            .zip(&deviation)
            .map(|(mean, std)| mean - multiplier * std)
            .collect();

        let [upper_name, middle_name, lower_name] = Self::column_names(period, multiplier);
        series.with_columns([
            DerivedColumn::from_f64(upper_name, upper),
            DerivedColumn::from_f64(middle_name, middle),
            DerivedColumn::from_f64(lower_name, lower),
        ])
    }

    fn describe_outputs(&self, params: &ResolvedParams) -> Vec<PlotDirective> {
        let Ok((period, multiplier)) = Self::settings(params) else {
            return Vec::new();
        };
        let [upper, middle, lower] = Self::column_names(period, multiplier);
        let band = |column: String, label: String| {
            PlotDirective::line(column, label)
                .color("gray")
                .width(1.0)
                .dash(LineDash::Dash)
                .opacity(0.6)
        };

        vec![
            band(upper, format!("BB Upper({period})")),
            PlotDirective::line(middle, format!("BB Middle({period})")).color("blue"),
            band(lower, format!("BB Lower({period})")),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::{assert_approx, make_series, DEFAULT_EPSILON};

    fn defaults() -> ResolvedParams {
        ResolvedParams::defaults(&BollingerBands.parameter_definitions()).expect("defaults")
    }

    #[test]
    fn column_names_keep_multiplier_decimal() {
        assert_eq!(
            BollingerBands::column_names(20, 2.0),
            [
                String::from("BB_Upper_20_2.0"),
                String::from("BB_Middle_20_2.0"),
                String::from("BB_Lower_20_2.0"),
            ]
        );
        assert_eq!(BollingerBands::column_names(10, 2.5)[0], "BB_Upper_10_2.5");
    }

    #[test]
    fn bands_straddle_middle_by_sample_std() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + f64::from(i % 4)).collect();
        let series = make_series(&closes);
        let result = BollingerBands
            .calculate(&series, &defaults())
            .expect("calculate");

        let upper = result.column("BB_Upper_20_2.0").expect("upper").values[19];
        let middle = result.column("BB_Middle_20_2.0").expect("middle").values[19];
        let lower = result.column("BB_Lower_20_2.0").expect("lower").values[19];

        // values 100..=103 five times each: mean 101.5, squares 5 * (2.25 + 0.25) * 2 = 25
        let std = (25.0f64 / 19.0).sqrt();
        assert_approx(middle, 101.5, DEFAULT_EPSILON);
        assert_approx(upper, 101.5 + 2.0 * std, 1e-9);
        assert_approx(lower, 101.5 - 2.0 * std, 1e-9);
        assert!(result.column("BB_Upper_20_2.0").expect("upper").values[18].is_none());
    }

    #[test]
    fn outputs_are_gray_bands_around_blue_middle() {
        let outputs = BollingerBands.describe_outputs(&defaults());
        let colors: Vec<&str> = outputs.iter().map(|directive| directive.color.as_str()).collect();

        assert_eq!(colors, vec!["gray", "blue", "gray"]);
        assert_eq!(outputs[0].dash, LineDash::Dash);
        assert_eq!(outputs[1].column.as_deref(), Some("BB_Middle_20_2.0"));
    }
}
