//! Rebinning of daily bars into weekly and monthly candles.
//!
//! Buckets are formed only from bars that exist in the input, so calendar gaps never
//! produce synthetic bars and a trailing partial period is emitted as-is. An aggregated
//! bar is dated on the last trading day of its bucket.

use time::{Date, Month};

use crate::config::AggregatorConfig;
use crate::domain::{AggregationPeriod, Bar, BarSeries, Symbol};
use crate::store::BarStore;
use crate::{AggregateError, CoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BucketKey {
    /// Julian day of the first calendar day of the week.
    Week(i32),
    Month(i32, Month),
}

/// Stateless daily-to-coarser bar aggregation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Aggregator {
    config: AggregatorConfig,
}

impl Aggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self { config }
    }

    /// Aggregates `series` into `period` bars without touching the input.
    ///
    /// Requesting the series' own period returns an identical copy. Only daily series can
    /// be rebinned; anything else is rejected.
    pub fn aggregate(
        &self,
        series: &BarSeries,
        period: AggregationPeriod,
    ) -> Result<BarSeries, AggregateError> {
        if series.period() == period {
            return Ok(series.clone());
        }
        if series.period() != AggregationPeriod::Daily {
            return Err(AggregateError::UnsupportedConversion {
                from: series.period().to_string(),
                to: period.to_string(),
            });
        }

        let mut bars = Vec::new();
        let mut current: Option<(BucketKey, BucketBuilder)> = None;

        for bar in series.bars() {
            let key = self.bucket_key(bar.date, period);
            match current.as_mut() {
                Some((open_key, builder)) if *open_key == key => builder.add_bar(bar),
                _ => {
                    if let Some((_, builder)) = current.take() {
                        bars.push(builder.build());
                    }
                    current = Some((key, BucketBuilder::start(bar)));
                }
            }
        }
        if let Some((_, builder)) = current {
            bars.push(builder.build());
        }

        Ok(BarSeries::from_ordered(series.symbol().clone(), period, bars))
    }

    /// Reads daily bars for `symbol` from `store` and aggregates them into `period`.
    pub fn load(
        &self,
        store: &dyn BarStore,
        symbol: &Symbol,
        period: AggregationPeriod,
        start: Option<Date>,
        end: Option<Date>,
    ) -> Result<BarSeries, CoreError> {
        let daily = store.range(symbol, start, end)?;
        Ok(self.aggregate(&daily, period)?)
    }

    fn bucket_key(&self, date: Date, period: AggregationPeriod) -> BucketKey {
        match period {
            AggregationPeriod::Monthly => BucketKey::Month(date.year(), date.month()),
            AggregationPeriod::Weekly | AggregationPeriod::Daily => {
                let weekday = i32::from(date.weekday().number_days_from_monday());
                let start = i32::from(self.config.week_start.number_days_from_monday());
                let offset = (weekday - start).rem_euclid(7);
                BucketKey::Week(date.to_julian_day() - offset)
            }
        }
    }
}

struct BucketBuilder {
    first: Bar,
    high: f64,
    low: f64,
    close: f64,
    adjusted_close: f64,
    last_date: Date,
    volume: u64,
    has_volume: bool,
}

impl BucketBuilder {
    fn start(bar: &Bar) -> Self {
        Self {
            first: bar.clone(),
            high: bar.high,
            low: bar.low,
            close: bar.close,
            adjusted_close: bar.adjusted_close,
            last_date: bar.date,
            volume: bar.volume.unwrap_or(0),
            has_volume: bar.volume.is_some(),
        }
    }

    fn add_bar(&mut self, bar: &Bar) {
        self.high = self.high.max(bar.high);
        self.low = self.low.min(bar.low);
        self.close = bar.close;
        self.adjusted_close = bar.adjusted_close;
        self.last_date = bar.date;
        if let Some(volume) = bar.volume {
            self.volume = self.volume.saturating_add(volume);
            self.has_volume = true;
        }
    }

    fn build(self) -> Bar {
        Bar {
            symbol: self.first.symbol,
            date: self.last_date,
            open: self.first.open,
            high: self.high,
            low: self.low,
            close: self.close,
            adjusted_close: self.adjusted_close,
            volume: self.has_volume.then_some(self.volume),
        }
    }
}
