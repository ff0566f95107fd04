//! Market Cipher A and B.
//!
//! Both build on the WaveTrend oscillator over the typical price (hlc3):
//!
//! ```text
//! esa = ema(hlc3, channel)
//! d   = ema(|hlc3 - esa|, channel)
//! ci  = (hlc3 - esa) / (0.015 * d + 1e-10)
//! wt1 = ema(ci, average)
//! wt2 = sma(wt1, 4)
//! ```
//!
//! Cipher B adds a money flow oscillator scaled to -100..=100 and marks
//! WT1/WT2 crosses inside the oversold and overbought zones. These ship with the
//! crate but load through the external path, see [`crate::registry::BundledSource`].

use crate::builtins::{exponential_average, rolling_mean, BUILTIN_AUTHOR, BUILTIN_VERSION};
use crate::error::DataError;
use crate::params::{ParameterDefinition, ResolvedParams};
use crate::plot::{Axis, LineDash, PlotDirective, RenderKind};
use crate::plugin::{Indicator, IndicatorPlugin};
use crate::series::{AugmentedSeries, DerivedColumn};

const SIGNAL_LENGTH: usize = 4;
const EPSILON: f64 = 1e-10;

/// Both ciphers, ready to be admitted through the external variant.
pub fn bundled() -> Vec<Indicator> {
    vec![
        Indicator::external(MarketCipherA),
        Indicator::external(MarketCipherB),
    ]
}

fn typical_prices(series: &AugmentedSeries) -> Result<Vec<f64>, DataError> {
    if series.is_empty() {
        return Err(DataError::EmptySeries);
    }
    let high = series.values("high")?;
    let low = series.values("low")?;
    let close = series.values("close")?;
    Ok(high
        .iter()
        .zip(&low)
        .zip(&close)
        .map(|((high, low), close)| (high + low + close) / 3.0)
        .collect())
}

/// WT1 and WT2 for a typical price series.
fn wave_trend(typical: &[f64], channel: usize, average: usize) -> (Vec<f64>, Vec<f64>) {
    let esa = exponential_average(typical, channel);
    let distance: Vec<f64> = typical
        .iter()
        .zip(&esa)
        .map(|(price, esa)| (price - esa).abs())
        .collect();
    let d = exponential_average(&distance, channel);
    let ci: Vec<f64> = typical
        .iter()
        .zip(&esa)
        .zip(&d)
        .map(|((price, esa), d)| (price - esa) / (0.015 * d + EPSILON))
        .collect();

    let wt1 = exponential_average(&ci, average);
    let wt2 = rolling_mean(&wt1, SIGNAL_LENGTH);
    (wt1, wt2)
}

/// Money flow index rescaled from 0..=100 to -100..=100.
///
/// A bar whose typical price did not move contributes to neither side.
fn money_flow(typical: &[f64], volume: &[f64], length: usize) -> Vec<f64> {
    let n = typical.len();
    let mut positive = vec![0.0; n];
    let mut negative = vec![0.0; n];
    for i in 1..n {
        let change = typical[i] - typical[i - 1];
        let raw = typical[i] * volume[i];
        if change > 0.0 {
            positive[i] = raw;
        } else if change < 0.0 {
            negative[i] = raw;
        }
    }

    let mut result = vec![f64::NAN; n];
    if length == 0 || n < length {
        return result;
    }
    for end in (length - 1)..n {
        let window = (end + 1 - length)..=end;
        let up: f64 = positive[window.clone()].iter().sum();
        let down: f64 = negative[window].iter().sum();
        let index = 100.0 - 100.0 / (1.0 + up / (down + EPSILON));
        result[end] = (index - 50.0) * 2.0;
    }
    result
}

/// `level` where WT1 crosses WT2 in the given direction and `zone` accepts WT2.
fn cross_marks(
    wt1: &[f64],
    wt2: &[f64],
    upward: bool,
    zone: impl Fn(f64) -> bool,
    level: f64,
) -> Vec<f64> {
    let mut marks = vec![f64::NAN; wt1.len()];
    for i in 1..wt1.len() {
        let crossed = if upward {
            wt1[i] > wt2[i] && wt1[i - 1] <= wt2[i - 1]
        } else {
            wt1[i] < wt2[i] && wt1[i - 1] >= wt2[i - 1]
        };
        if crossed && zone(wt2[i]) {
            marks[i] = level;
        }
    }
    marks
}

fn difference(left: &[f64], right: &[f64]) -> Vec<f64> {
    left.iter().zip(right).map(|(a, b)| a - b).collect()
}

fn wave_settings(params: &ResolvedParams) -> Result<(usize, usize), DataError> {
    Ok((
        params.window("channel_length")?,
        params.window("average_length")?,
    ))
}

fn wave_parameters() -> [ParameterDefinition; 2] {
    [
        ParameterDefinition::int("channel_length", 9)
            .range(5.0, 20.0)
            .step(1.0)
            .describe("Channel length for the EMA of the typical price"),
        ParameterDefinition::int("average_length", 12)
            .range(5.0, 30.0)
            .step(1.0)
            .describe("Average length for wave trend smoothing"),
    ]
}

fn threshold(level: i64, label: &str, color: &str) -> PlotDirective {
    PlotDirective::reference(level as f64, format!("{label} ({level})"))
        .on_axis(Axis::Secondary)
        .color(color)
        .width(1.0)
        .dash(LineDash::Dash)
        .opacity(0.5)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MarketCipherA;

impl MarketCipherA {
    /// WT1, WT2 and histogram column names.
    pub fn column_names(channel: usize, average: usize) -> [String; 3] {
        ["WT1", "WT2", "Hist"].map(|part| format!("MCA_{part}_{channel}_{average}"))
    }
}

impl IndicatorPlugin for MarketCipherA {
    fn name(&self) -> &str {
        "Market Cipher A"
    }

    fn version(&self) -> &str {
        BUILTIN_VERSION
    }

    fn description(&self) -> &str {
        "Wave Trend oscillator with momentum crossover signals"
    }

    fn author(&self) -> &str {
        BUILTIN_AUTHOR
    }

    fn parameter_definitions(&self) -> Vec<ParameterDefinition> {
        let [channel, average] = wave_parameters();
        vec![
            channel,
            average,
            ParameterDefinition::int("overbought", 60)
                .range(50.0, 80.0)
                .step(5.0)
                .describe("Overbought threshold level"),
            ParameterDefinition::int("oversold", -60)
                .range(-80.0, -50.0)
                .step(5.0)
                .describe("Oversold threshold level"),
        ]
    }

    fn calculate(
        &self,
        series: &AugmentedSeries,
        params: &ResolvedParams,
    ) -> Result<AugmentedSeries, DataError> {
        let (channel, average) = wave_settings(params)?;
        let typical = typical_prices(series)?;
        let (wt1, wt2) = wave_trend(&typical, channel, average);
        let hist = difference(&wt1, &wt2);

        let [wt1_name, wt2_name, hist_name] = Self::column_names(channel, average);
        series.with_columns([
            DerivedColumn::from_f64(wt1_name, wt1),
            DerivedColumn::from_f64(wt2_name, wt2),
            DerivedColumn::from_f64(hist_name, hist),
        ])
    }

    fn describe_outputs(&self, params: &ResolvedParams) -> Vec<PlotDirective> {
        let (Ok((channel, average)), Ok(overbought), Ok(oversold)) = (
            wave_settings(params),
            params.int("overbought"),
            params.int("oversold"),
        ) else {
            return Vec::new();
        };
        let [wt1, wt2, _] = Self::column_names(channel, average);

        vec![
            PlotDirective::line(wt1, "MCA WT1")
                .on_axis(Axis::Secondary)
                .color("#00bcd4")
                .opacity(0.9),
            PlotDirective::line(wt2, "MCA WT2")
                .on_axis(Axis::Secondary)
                .color("#ff5722")
                .width(1.0)
                .opacity(0.7),
            threshold(overbought, "MCA Overbought", "red"),
            threshold(oversold, "MCA Oversold", "green"),
        ]
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MarketCipherB;

/// Settings that shape Market Cipher B's columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherBSettings {
    pub channel: usize,
    pub average: usize,
    pub mfi_length: usize,
    pub overbought: i64,
    pub oversold: i64,
}

impl CipherBSettings {
    fn resolve(params: &ResolvedParams) -> Result<Self, DataError> {
        let (channel, average) = wave_settings(params)?;
        Ok(Self {
            channel,
            average,
            mfi_length: params.window("mfi_length")?,
            overbought: params.int("overbought")?,
            oversold: params.int("oversold")?,
        })
    }
}

impl MarketCipherB {
    /// WT1, WT2, MFI, histogram, buy and sell column names.
    pub fn column_names(settings: &CipherBSettings) -> [String; 6] {
        let wave = format!("{}_{}", settings.channel, settings.average);
        [
            format!("MCB_WT1_{wave}"),
            format!("MCB_WT2_{wave}"),
            format!("MCB_MFI_{}", settings.mfi_length),
            format!("MCB_Hist_{wave}"),
            format!("MCB_Buy_{wave}_{}", settings.oversold),
            format!("MCB_Sell_{wave}_{}", settings.overbought),
        ]
    }
}

impl IndicatorPlugin for MarketCipherB {
    fn name(&self) -> &str {
        "Market Cipher B"
    }

    fn version(&self) -> &str {
        BUILTIN_VERSION
    }

    fn description(&self) -> &str {
        "Multi-indicator confluence with Money Flow and momentum signals"
    }

    fn author(&self) -> &str {
        BUILTIN_AUTHOR
    }

    fn parameter_definitions(&self) -> Vec<ParameterDefinition> {
        let [channel, average] = wave_parameters();
        vec![
            channel,
            average,
            ParameterDefinition::int("mfi_length", 60)
                .range(20.0, 100.0)
                .step(10.0)
                .describe("Money Flow Index length"),
            ParameterDefinition::int("overbought", 53)
                .range(40.0, 70.0)
                .step(1.0)
                .describe("Overbought threshold"),
            ParameterDefinition::int("oversold", -53)
                .range(-70.0, -40.0)
                .step(1.0)
                .describe("Oversold threshold"),
        ]
    }

    fn calculate(
        &self,
        series: &AugmentedSeries,
        params: &ResolvedParams,
    ) -> Result<AugmentedSeries, DataError> {
        let settings = CipherBSettings::resolve(params)?;
        let typical = typical_prices(series)?;
        let volume = series.values("volume")?;

        let (wt1, wt2) = wave_trend(&typical, settings.channel, settings.average);
        let mfi = money_flow(&typical, &volume, settings.mfi_length);
        let hist = difference(&wt1, &wt2);
        let oversold = settings.oversold as f64;
        let overbought = settings.overbought as f64;
        let buy = cross_marks(&wt1, &wt2, true, |wt2| wt2 < oversold, oversold);
        let sell = cross_marks(&wt1, &wt2, false, |wt2| wt2 > overbought, overbought);

        let [wt1_name, wt2_name, mfi_name, hist_name, buy_name, sell_name] =
            Self::column_names(&settings);
        series.with_columns([
            DerivedColumn::from_f64(wt1_name, wt1),
            DerivedColumn::from_f64(wt2_name, wt2),
            DerivedColumn::from_f64(mfi_name, mfi),
            DerivedColumn::from_f64(hist_name, hist),
            DerivedColumn::from_f64(buy_name, buy),
            DerivedColumn::from_f64(sell_name, sell),
        ])
    }

    fn describe_outputs(&self, params: &ResolvedParams) -> Vec<PlotDirective> {
        let Ok(settings) = CipherBSettings::resolve(params) else {
            return Vec::new();
        };
        let [wt1, wt2, mfi, _, buy, sell] = Self::column_names(&settings);
        let dot = |column: String, label: &str, color: &str| {
            PlotDirective::line(column, label)
                .render(RenderKind::Scatter)
                .on_axis(Axis::Secondary)
                .color(color)
                .opacity(1.0)
        };

        vec![
            PlotDirective::line(wt1, "MCB WT1")
                .on_axis(Axis::Secondary)
                .color("#00e676")
                .opacity(0.9),
            PlotDirective::line(wt2, "MCB WT2")
                .on_axis(Axis::Secondary)
                .color("#ff1744")
                .width(1.0)
                .opacity(0.7),
            PlotDirective::line(mfi, "MCB MFI")
                .on_axis(Axis::Secondary)
                .color("#ffeb3b")
                .width(1.0)
                .dash(LineDash::Dot)
                .opacity(0.6),
            dot(buy, "MCB Buy", "green"),
            dot(sell, "MCB Sell", "red"),
        ]
    }
}
