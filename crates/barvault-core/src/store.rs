use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;
use time::Date;

use crate::domain::{iso_date, AggregationPeriod, Bar, BarSeries, Symbol};
use crate::{StoreError, ValidationError};

/// Durable, deduplicated persistence of daily bars keyed by `(symbol, date)`.
///
/// Implementations must make `upsert_many` all-or-nothing and must serialize writers
/// of the same symbol while leaving writers of different symbols independent.
pub trait BarStore: Send + Sync {
    fn last_date(&self, symbol: &Symbol) -> Result<Option<Date>, StoreError>;

    /// Writes or replaces the rows of `bars` and returns how many distinct dates were written.
    fn upsert_many(&self, symbol: &Symbol, bars: &[Bar]) -> Result<usize, StoreError>;

    fn range(
        &self,
        symbol: &Symbol,
        start: Option<Date>,
        end: Option<Date>,
    ) -> Result<BarSeries, StoreError>;

    fn symbols(&self) -> Result<BTreeSet<Symbol>, StoreError>;

    fn date_range(&self, symbol: &Symbol) -> Result<Option<(Date, Date)>, StoreError> {
        let series = self.range(symbol, None, None)?;
        Ok(series.first_date().zip(series.last_date()))
    }

    fn summary(&self, symbol: &Symbol) -> Result<Option<SymbolSummary>, StoreError> {
        let series = self.range(symbol, None, None)?;
        Ok(SymbolSummary::from_series(&series))
    }
}

/// Descriptive statistics over everything stored for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolSummary {
    pub symbol: Symbol,
    pub record_count: usize,
    #[serde(with = "iso_date")]
    pub first_date: Date,
    #[serde(with = "iso_date")]
    pub last_date: Date,
    pub latest_close: f64,
    pub highest_high: f64,
    pub lowest_low: f64,
    /// Mean over bars that carry a volume; `None` when none do.
    pub average_volume: Option<f64>,
}

impl SymbolSummary {
    pub fn from_series(series: &BarSeries) -> Option<Self> {
        let first = series.bars().first()?;
        let last = series.bars().last()?;

        let mut highest_high = f64::MIN;
        let mut lowest_low = f64::MAX;
        let mut volume_sum = 0.0;
        let mut volume_count = 0usize;
        for bar in series.bars() {
            highest_high = highest_high.max(bar.high);
            lowest_low = lowest_low.min(bar.low);
            if let Some(volume) = bar.volume {
                volume_sum += volume as f64;
                volume_count += 1;
            }
        }

        Some(Self {
            symbol: series.symbol().clone(),
            record_count: series.len(),
            first_date: first.date,
            last_date: last.date,
            latest_close: last.close,
            highest_high,
            lowest_low,
            average_volume: (volume_count > 0).then(|| volume_sum / volume_count as f64),
        })
    }
}

/// Sorts a write batch by date and keeps the last row for each duplicated date.
///
/// Every bar must belong to `symbol`.
pub fn prepare_batch(symbol: &Symbol, bars: &[Bar]) -> Result<Vec<Bar>, StoreError> {
    let mut by_date = BTreeMap::new();
    for bar in bars {
        if &bar.symbol != symbol {
            return Err(StoreError::Validation(ValidationError::SymbolMismatch {
                expected: symbol.to_string(),
                found: bar.symbol.to_string(),
            }));
        }
        by_date.insert(bar.date, bar.clone());
    }
    Ok(by_date.into_values().collect())
}

/// Per-symbol writer gate. Holders for different symbols never contend.
///
/// A symbol's slot lives only while some writer holds or waits on it.
#[derive(Default)]
pub struct WriterLocks {
    locks: Mutex<HashMap<Symbol, Arc<Mutex<()>>>>,
}

impl WriterLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `write` while holding the writer slot for `symbol`.
    pub fn with_writer<T>(
        &self,
        symbol: &Symbol,
        write: impl FnOnce() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let slot = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|_| StoreError::Unavailable(String::from("writer registry poisoned")))?;
            Arc::clone(locks.entry(symbol.clone()).or_default())
        };
        let result = slot
            .lock()
            .map_err(|_| StoreError::Unavailable(format!("writer slot for {symbol} poisoned")))
            .and_then(|_guard| write());
        self.release(symbol, &slot);
        result
    }

    fn release(&self, symbol: &Symbol, slot: &Arc<Mutex<()>>) {
        let Ok(mut locks) = self.locks.lock() else {
            return;
        };
        // the map and `slot` are the only owners left
        if Arc::strong_count(slot) == 2 {
            locks.remove(symbol);
        }
    }

    /// Symbols that currently have a writer slot.
    pub fn active(&self) -> usize {
        self.locks.lock().map_or(0, |locks| locks.len())
    }
}

type SymbolBars = Arc<RwLock<BTreeMap<Date, Bar>>>;

/// In-memory [`BarStore`] for tests and single-process use.
///
/// Each symbol owns its own lock, so the outer map is only write-locked when a symbol is
/// seen for the first time.
#[derive(Clone, Default)]
pub struct MemoryBarStore {
    symbols: Arc<RwLock<HashMap<Symbol, SymbolBars>>>,
}

impl MemoryBarStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn existing(&self, symbol: &Symbol) -> Result<Option<SymbolBars>, StoreError> {
        let symbols = self.symbols.read().map_err(poisoned)?;
        Ok(symbols.get(symbol).cloned())
    }

    fn entry(&self, symbol: &Symbol) -> Result<SymbolBars, StoreError> {
        if let Some(bars) = self.existing(symbol)? {
            return Ok(bars);
        }
        let mut symbols = self.symbols.write().map_err(poisoned)?;
        Ok(Arc::clone(symbols.entry(symbol.clone()).or_default()))
    }
}

impl BarStore for MemoryBarStore {
    fn last_date(&self, symbol: &Symbol) -> Result<Option<Date>, StoreError> {
        let Some(bars) = self.existing(symbol)? else {
            return Ok(None);
        };
        let bars = bars.read().map_err(poisoned)?;
        Ok(bars.keys().next_back().copied())
    }

    fn upsert_many(&self, symbol: &Symbol, bars: &[Bar]) -> Result<usize, StoreError> {
        let batch = prepare_batch(symbol, bars)?;
        if batch.is_empty() {
            return Ok(0);
        }

        let stored = self.entry(symbol)?;
        let mut stored = stored.write().map_err(poisoned)?;
        let written = batch.len();
        for bar in batch {
            stored.insert(bar.date, bar);
        }
        Ok(written)
    }

    fn range(
        &self,
        symbol: &Symbol,
        start: Option<Date>,
        end: Option<Date>,
    ) -> Result<BarSeries, StoreError> {
        let Some(stored) = self.existing(symbol)? else {
            return Ok(BarSeries::empty(symbol.clone(), AggregationPeriod::Daily));
        };
        let stored = stored.read().map_err(poisoned)?;
        let bars = stored
            .values()
            .filter(|bar| start.map_or(true, |start| bar.date >= start))
            .filter(|bar| end.map_or(true, |end| bar.date <= end))
            .cloned()
            .collect();
        Ok(BarSeries::new(symbol.clone(), AggregationPeriod::Daily, bars)?)
    }

    fn symbols(&self) -> Result<BTreeSet<Symbol>, StoreError> {
        let symbols = self.symbols.read().map_err(poisoned)?;
        let mut known = BTreeSet::new();
        for (symbol, bars) in symbols.iter() {
            if !bars.read().map_err(poisoned)?.is_empty() {
                known.insert(symbol.clone());
            }
        }
        Ok(known)
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> StoreError {
    StoreError::Unavailable(String::from("memory store lock poisoned"))
}
