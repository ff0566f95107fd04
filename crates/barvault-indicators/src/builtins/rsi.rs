//! Relative Strength Index (RSI).
//!
//! Wilder smoothing of average gains and losses, seeded with the plain mean of
//! the first `period` changes. RSI = 100 - 100 / (1 + avg_gain / avg_loss).
//! First value at index `period`.

use super::{closes, BUILTIN_AUTHOR, BUILTIN_VERSION};
use crate::error::DataError;
use crate::params::{ParameterDefinition, ResolvedParams};
use crate::plot::{Axis, LineDash, PlotDirective};
use crate::plugin::IndicatorPlugin;
use crate::series::{AugmentedSeries, DerivedColumn};

#[derive(Debug, Clone, Copy, Default)]
pub struct RelativeStrengthIndex;

impl RelativeStrengthIndex {
    pub fn column_name(period: usize) -> String {
        format!("RSI_{period}")
    }
}

fn rsi(closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period + 1 {
        return result;
    }

    let changes: Vec<f64> = closes.windows(2).map(|pair| pair[1] - pair[0]).collect();

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for &change in &changes[..period] {
        if change.is_nan() {
            return result;
        }
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss -= change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    result[period] = compute_rsi(avg_gain, avg_loss);

    let alpha = 1.0 / period as f64;
    for i in (period + 1)..n {
        let change = changes[i - 1];
        if change.is_nan() {
            // smoothing cannot recover from a gap
            return result;
        }
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        avg_gain = alpha * gain + (1.0 - alpha) * avg_gain;
        avg_loss = alpha * loss + (1.0 - alpha) * avg_loss;
        result[i] = compute_rsi(avg_gain, avg_loss);
    }

    result
}

fn compute_rsi(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else if avg_gain == 0.0 {
        0.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

impl IndicatorPlugin for RelativeStrengthIndex {
    fn name(&self) -> &str {
        "Relative Strength Index"
    }

    fn version(&self) -> &str {
        BUILTIN_VERSION
    }

    fn description(&self) -> &str {
        "Calculate the Relative Strength Index (RSI) momentum indicator"
    }

    fn author(&self) -> &str {
        BUILTIN_AUTHOR
    }

    fn parameter_definitions(&self) -> Vec<ParameterDefinition> {
        vec![
            ParameterDefinition::int("period", 14)
                .range(2.0, 100.0)
                .step(1.0)
                .describe("Number of periods for RSI calculation"),
            ParameterDefinition::int("overbought", 70)
                .range(50.0, 100.0)
                .step(1.0)
                .describe("Overbought threshold"),
            ParameterDefinition::int("oversold", 30)
                .range(0.0, 50.0)
                .step(1.0)
                .describe("Oversold threshold"),
        ]
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
            rsi(&closes, period),
        ))
    }

    fn describe_outputs(&self, params: &ResolvedParams) -> Vec<PlotDirective> {
        let (Ok(period), Ok(overbought), Ok(oversold)) = (
            params.window("period"),
            params.int("overbought"),
            params.int("oversold"),
        ) else {
            return Vec::new();
        };

        let threshold = |level: i64, label: &str, color: &str| {
            PlotDirective::reference(level as f64, format!("{label} ({level})"))
                .on_axis(Axis::Secondary)
                .color(color)
                .width(1.0)
                .dash(LineDash::Dash)
                .opacity(0.5)
        };

        vec![
            PlotDirective::line(Self::column_name(period), format!("RSI({period})"))
                .on_axis(Axis::Secondary)
                .color("purple"),
            threshold(overbought, "Overbought", "red"),
            threshold(oversold, "Oversold", "green"),
        ]
    }
}
