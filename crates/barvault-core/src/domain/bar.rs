use serde::{Deserialize, Serialize};
use time::Date;

use crate::domain::{iso_date, AggregationPeriod, Symbol};
use crate::ValidationError;

/// Largest volume a bar may carry; stores keep volume in a signed 64-bit column.
pub const MAX_VOLUME: u64 = i64::MAX as u64;

/// One OHLCV record for a symbol on a trading day (or the last day of an aggregated bucket).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: Symbol,
    #[serde(with = "iso_date")]
    pub date: Date,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adjusted_close: f64,
    pub volume: Option<u64>,
}

impl Bar {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: Symbol,
        date: Date,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        adjusted_close: f64,
        volume: Option<u64>,
    ) -> Result<Self, ValidationError> {
        validate_non_negative("open", open)?;
        validate_non_negative("high", high)?;
        validate_non_negative("low", low)?;
        validate_non_negative("close", close)?;
        validate_non_negative("adjusted_close", adjusted_close)?;

        if let Some(volume) = volume.filter(|volume| *volume > MAX_VOLUME) {
            return Err(ValidationError::VolumeOutOfRange {
                volume,
                max: MAX_VOLUME,
            });
        }

        if high < low {
            return Err(ValidationError::InvalidBarRange);
        }

        if open < low || open > high || close < low || close > high {
            return Err(ValidationError::InvalidBarBounds);
        }

        Ok(Self {
            symbol,
            date,
            open,
            high,
            low,
            close,
            adjusted_close,
            volume,
        })
    }
}

/// Ordered, duplicate-free run of bars for a single symbol.
///
/// Construction goes through [`BarSeries::new`], so a value of this type always has
/// strictly ascending dates and a single symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BarSeriesParts")]
pub struct BarSeries {
    symbol: Symbol,
    period: AggregationPeriod,
    bars: Vec<Bar>,
}

#[derive(Deserialize)]
struct BarSeriesParts {
    symbol: Symbol,
    period: AggregationPeriod,
    bars: Vec<Bar>,
}

impl TryFrom<BarSeriesParts> for BarSeries {
    type Error = ValidationError;

    fn try_from(parts: BarSeriesParts) -> Result<Self, Self::Error> {
        Self::new(parts.symbol, parts.period, parts.bars)
    }
}

impl BarSeries {
    pub fn new(
        symbol: Symbol,
        period: AggregationPeriod,
        bars: Vec<Bar>,
    ) -> Result<Self, ValidationError> {
        let mut previous: Option<Date> = None;
        for bar in &bars {
            if bar.symbol != symbol {
                return Err(ValidationError::SymbolMismatch {
                    expected: symbol.to_string(),
                    found: bar.symbol.to_string(),
                });
            }
            if let Some(previous) = previous {
                if bar.date <= previous {
                    return Err(ValidationError::UnorderedDates {
                        previous,
                        next: bar.date,
                    });
                }
            }
            previous = Some(bar.date);
        }

        Ok(Self {
            symbol,
            period,
            bars,
        })
    }

    /// Builds a series from bars already known to be ordered and single-symbol.
    pub(crate) fn from_ordered(symbol: Symbol, period: AggregationPeriod, bars: Vec<Bar>) -> Self {
        debug_assert!(bars.windows(2).all(|pair| pair[0].date < pair[1].date));
        Self {
            symbol,
            period,
            bars,
        }
    }

    pub fn empty(symbol: Symbol, period: AggregationPeriod) -> Self {
        Self {
            symbol,
            period,
            bars: Vec::new(),
        }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn period(&self) -> AggregationPeriod {
        self.period
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn into_bars(self) -> Vec<Bar> {
        self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first_date(&self) -> Option<Date> {
        self.bars.first().map(|bar| bar.date)
    }

    pub fn last_date(&self) -> Option<Date> {
        self.bars.last().map(|bar| bar.date)
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|bar| bar.close).collect()
    }
}

fn validate_non_negative(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value < 0.0 {
        return Err(ValidationError::NegativeValue { field });
    }
    Ok(())
}
