//! Built-in indicators.
//!
//! Every built-in reads closing prices, emits NaN-free [`DerivedColumn`]s with
//! leading `None` values until its lookback is filled, and names its columns
//! after the parameters that distinguish one instance from another.
//!
//! [`DerivedColumn`]: crate::series::DerivedColumn

mod bollinger;
mod ema;
mod rsi;
mod sma;

pub use bollinger::BollingerBands;
pub use ema::ExponentialMovingAverage;
pub use rsi::RelativeStrengthIndex;
pub use sma::SimpleMovingAverage;

pub(crate) use ema::ema as exponential_average;

use crate::error::DataError;
use crate::series::AugmentedSeries;

pub(crate) const BUILTIN_VERSION: &str = "1.0.0";
pub(crate) const BUILTIN_AUTHOR: &str = "Market Data Team";

/// Closing prices of a non-empty series.
pub(crate) fn closes(series: &AugmentedSeries) -> Result<Vec<f64>, DataError> {
    if series.is_empty() {
        return Err(DataError::EmptySeries);
    }
    series.values("close")
}

/// Rolling mean; NaN until `period` values are available or while a NaN is in the window.
pub(crate) fn rolling_mean(values: &[f64], period: usize) -> Vec<f64> {
    let mut result = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return result;
    }
    for (offset, window) in values.windows(period).enumerate() {
        result[offset + period - 1] = window.iter().sum::<f64>() / period as f64;
    }
    result
}

/// Rolling sample standard deviation (divides by `period - 1`).
pub(crate) fn rolling_sample_std(values: &[f64], period: usize) -> Vec<f64> {
    let mut result = vec![f64::NAN; values.len()];
    if period < 2 || values.len() < period {
        return result;
    }
    for (offset, window) in values.windows(period).enumerate() {
        let mean = window.iter().sum::<f64>() / period as f64;
        let squares: f64 = window.iter().map(|value| (value - mean).powi(2)).sum();
        result[offset + period - 1] = (squares / (period - 1) as f64).sqrt();
    }
    result
}

/// Create an augmented series from close prices for testing.
///
/// open = previous close (or close for the first bar), high/low = max/min of open and
/// close -/+ 1.0, volume = 1000, one calendar day apart starting 2024-01-02.
#[cfg(test)]
pub(crate) fn make_series(closes: &[f64]) -> AugmentedSeries {
    use barvault_core::{AggregationPeriod, Bar, BarSeries, Symbol};
    use time::macros::date;
    use time::Duration;

    let symbol = Symbol::parse("TEST").expect("symbol");
    let bars = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar {
                symbol: symbol.clone(),
                date: date!(2024 - 01 - 02) + Duration::days(i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                adjusted_close: close,
                volume: Some(1000),
            }
        })
        .collect();
    BarSeries::new(symbol, AggregationPeriod::Daily, bars)
        .expect("series")
        .into()
}

/// Assert a derived value is present and approximately equal to `expected`.
#[cfg(test)]
pub(crate) fn assert_approx(actual: Option<f64>, expected: f64, epsilon: f64) {
    let Some(actual) = actual else {
        panic!("assert_approx failed: value missing, expected={expected}");
    };
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

#[cfg(test)]
pub(crate) const DEFAULT_EPSILON: f64 = 1e-10;
