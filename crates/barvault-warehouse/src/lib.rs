//! # barvault warehouse
//!
//! DuckDB-backed [`BarStore`] for daily OHLCV bars.
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `daily_bars` | One row per `(symbol, date)`, indexed on `symbol` and on `date` |
//! | `ingest_log` | One row per committed write batch |
//! | `schema_migrations` | Applied migration versions |
//!
//! Every `upsert_many` call runs inside a single transaction and is serialized per symbol.

pub mod duckdb;
pub mod error;
pub mod migrations;

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::{Connection, ToSql};
use barvault_core::{
    prepare_batch, AggregationPeriod, Bar, BarSeries, BarStore, StoreError, Symbol,
    ValidationError, WriterLocks, MAX_VOLUME,
};
use time::macros::format_description;
use time::Date;
use tracing::{debug, warn};

pub use self::duckdb::{DuckDbConnectionManager, PooledConnection};
pub use error::WarehouseError;

#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    pub barvault_home: PathBuf,
    pub db_path: PathBuf,
    pub max_pool_size: usize,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        let barvault_home = resolve_barvault_home();
        let db_path = barvault_home.join("data").join("bars.duckdb");
        Self {
            barvault_home,
            db_path,
            max_pool_size: 4,
        }
    }
}

impl WarehouseConfig {
    /// Config rooted at `home`, with the database in its `data` directory.
    pub fn in_home(home: impl Into<PathBuf>) -> Self {
        let barvault_home = home.into();
        let db_path = barvault_home.join("data").join("bars.duckdb");
        Self {
            barvault_home,
            db_path,
            ..Self::default()
        }
    }
}

/// Ingest audit row written alongside each committed batch.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestLogEntry {
    pub symbol: String,
    pub row_count: u64,
    pub first_date: Option<Date>,
    pub last_date: Option<Date>,
}

#[derive(Clone)]
pub struct Warehouse {
    manager: DuckDbConnectionManager,
    writers: std::sync::Arc<WriterLocks>,
}

impl Warehouse {
    pub fn open_default() -> Result<Self, WarehouseError> {
        Self::open(WarehouseConfig::default())
    }

    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let manager = DuckDbConnectionManager::open(config.db_path.clone(), config.max_pool_size)?;
        let warehouse = Self {
            manager,
            writers: std::sync::Arc::new(WriterLocks::new()),
        };
        warehouse.initialize()?;
        Ok(warehouse)
    }

    pub fn initialize(&self) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire()?;
        migrations::apply_migrations(&connection)?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        self.manager.db_path()
    }

    /// Ingest history for `symbol`, newest first.
    pub fn ingest_log(&self, symbol: &Symbol) -> Result<Vec<IngestLogEntry>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare(
            "SELECT symbol, row_count, CAST(first_date AS VARCHAR), CAST(last_date AS VARCHAR) \
             FROM ingest_log WHERE symbol = ? ORDER BY logged_at DESC, last_date DESC",
        )?;
        let rows = statement.query_map([symbol.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (symbol, row_count, first_date, last_date) = row?;
            entries.push(IngestLogEntry {
                row_count: u64::try_from(row_count).unwrap_or(0),
                first_date: first_date
                    .as_deref()
                    .map(|text| parse_date(&symbol, text))
                    .transpose()?,
                last_date: last_date
                    .as_deref()
                    .map(|text| parse_date(&symbol, text))
                    .transpose()?,
                symbol,
            });
        }
        Ok(entries)
    }

    fn write_batch(&self, symbol: &Symbol, batch: &[Bar]) -> Result<usize, WarehouseError> {
        let connection = self.manager.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<usize, WarehouseError> {
            for bar in batch {
                let date = bar.date.to_string();
                let volume = bar
                    .volume
                    .map(|volume| {
                        i64::try_from(volume).map_err(|_| ValidationError::VolumeOutOfRange {
                            volume,
                            max: MAX_VOLUME,
                        })
                    })
                    .transpose()
                    .map_err(StoreError::from)?;
                let params: [&dyn ToSql; 8] = [
                    &bar.symbol.as_str(),
                    &date,
                    &bar.open,
                    &bar.high,
                    &bar.low,
                    &bar.close,
                    &bar.adjusted_close,
                    &volume,
                ];
                connection.execute(
                    "INSERT INTO daily_bars \
                     (symbol, date, open, high, low, close, adjusted_close, volume, updated_at) \
                     VALUES (?, CAST(? AS DATE), ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP) \
                     ON CONFLICT (symbol, date) DO UPDATE SET \
                     open = excluded.open, high = excluded.high, low = excluded.low, \
                     close = excluded.close, adjusted_close = excluded.adjusted_close, \
                     volume = excluded.volume, updated_at = excluded.updated_at",
                    params.as_slice(),
                )?;
            }

            let row_count = i64::try_from(batch.len()).unwrap_or(i64::MAX);
            let first_date = batch.first().map(|bar| bar.date.to_string());
            let last_date = batch.last().map(|bar| bar.date.to_string());
            let params: [&dyn ToSql; 4] = [&symbol.as_str(), &row_count, &first_date, &last_date];
            connection.execute(
                "INSERT INTO ingest_log (symbol, row_count, first_date, last_date, logged_at) \
                 VALUES (?, ?, CAST(? AS DATE), CAST(? AS DATE), CURRENT_TIMESTAMP)",
                params.as_slice(),
            )?;

            Ok(batch.len())
        })();

        finalize_transaction(&connection, result)
    }

    fn read_range(
        &self,
        symbol: &Symbol,
        start: Option<Date>,
        end: Option<Date>,
    ) -> Result<Vec<Bar>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let start = start.map(|date| date.to_string());
        let end = end.map(|date| date.to_string());
        let params: [&dyn ToSql; 5] = [&symbol.as_str(), &start, &start, &end, &end];

        let mut statement = connection.prepare(
            "SELECT CAST(date AS VARCHAR), open, high, low, close, adjusted_close, volume \
             FROM daily_bars \
             WHERE symbol = ? \
               AND (? IS NULL OR date >= CAST(? AS DATE)) \
               AND (? IS NULL OR date <= CAST(? AS DATE)) \
             ORDER BY date ASC",
        )?;
        let rows = statement.query_map(params.as_slice(), |row| {
            Ok(StoredRow {
                date: row.get(0)?,
                open: row.get(1)?,
                high: row.get(2)?,
                low: row.get(3)?,
                close: row.get(4)?,
                adjusted_close: row.get(5)?,
                volume: row.get(6)?,
            })
        })?;

        let mut bars = Vec::new();
        for row in rows {
            bars.push(row?.into_bar(symbol)?);
        }
        Ok(bars)
    }

    fn read_last_date(&self, symbol: &Symbol) -> Result<Option<Date>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let last: Option<String> = connection.query_row(
            "SELECT CAST(MAX(date) AS VARCHAR) FROM daily_bars WHERE symbol = ?",
            [symbol.as_str()],
            |row| row.get(0),
        )?;
        last.as_deref()
            .map(|text| parse_date(symbol.as_str(), text))
            .transpose()
    }

    fn read_date_range(&self, symbol: &Symbol) -> Result<Option<(Date, Date)>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let (first, last): (Option<String>, Option<String>) = connection.query_row(
            "SELECT CAST(MIN(date) AS VARCHAR), CAST(MAX(date) AS VARCHAR) \
             FROM daily_bars WHERE symbol = ?",
            [symbol.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        match (first, last) {
            (Some(first), Some(last)) => Ok(Some((
                parse_date(symbol.as_str(), &first)?,
                parse_date(symbol.as_str(), &last)?,
            ))),
            _ => Ok(None),
        }
    }

    fn read_symbols(&self) -> Result<BTreeSet<Symbol>, WarehouseError> {
        let connection = self.manager.acquire()?;
        let mut statement = connection.prepare("SELECT DISTINCT symbol FROM daily_bars")?;
        let rows = statement.query_map([], |row| row.get::<_, String>(0))?;

        let mut symbols = BTreeSet::new();
        for row in rows {
            let raw = row?;
            match Symbol::parse(&raw) {
                Ok(symbol) => {
                    symbols.insert(symbol);
                }
                Err(err) => {
                    warn!(symbol = %raw, error = %err, "skipping unparseable stored symbol")
                }
            }
        }
        Ok(symbols)
    }
}

impl BarStore for Warehouse {
    fn last_date(&self, symbol: &Symbol) -> Result<Option<Date>, StoreError> {
        Ok(self.read_last_date(symbol)?)
    }

    fn upsert_many(&self, symbol: &Symbol, bars: &[Bar]) -> Result<usize, StoreError> {
        let batch = prepare_batch(symbol, bars)?;
        if batch.is_empty() {
            return Ok(0);
        }

        let written = self
            .writers
            .with_writer(symbol, || Ok(self.write_batch(symbol, &batch)?))?;
        debug!(%symbol, written, "committed bar batch");
        Ok(written)
    }

    fn range(
        &self,
        symbol: &Symbol,
        start: Option<Date>,
        end: Option<Date>,
    ) -> Result<BarSeries, StoreError> {
        let bars = self.read_range(symbol, start, end)?;
        Ok(BarSeries::new(symbol.clone(), AggregationPeriod::Daily, bars)?)
    }

    fn symbols(&self) -> Result<BTreeSet<Symbol>, StoreError> {
        Ok(self.read_symbols()?)
    }

    fn date_range(&self, symbol: &Symbol) -> Result<Option<(Date, Date)>, StoreError> {
        Ok(self.read_date_range(symbol)?)
    }
}

struct StoredRow {
    date: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    adjusted_close: f64,
    volume: Option<i64>,
}

impl StoredRow {
    fn into_bar(self, symbol: &Symbol) -> Result<Bar, WarehouseError> {
        let date = parse_date(symbol.as_str(), &self.date)?;
        let volume = self
            .volume
            .map(|volume| {
                u64::try_from(volume).map_err(|_| WarehouseError::CorruptRow {
                    symbol: symbol.to_string(),
                    detail: format!("negative volume {volume} on {date}"),
                })
            })
            .transpose()?;
        Ok(Bar {
            symbol: symbol.clone(),
            date,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            adjusted_close: self.adjusted_close,
            volume,
        })
    }
}

fn parse_date(symbol: &str, text: &str) -> Result<Date, WarehouseError> {
    let format = format_description!("[year]-[month]-[day]");
    Date::parse(text.trim(), &format).map_err(|err| WarehouseError::CorruptRow {
        symbol: symbol.to_owned(),
        detail: format!("unreadable date '{text}': {err}"),
    })
}

fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

fn resolve_barvault_home() -> PathBuf {
    if let Some(path) = env::var_os("BARVAULT_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".barvault");
    }

    PathBuf::from(".barvault")
}
