use thiserror::Error;
use time::Date;

/// Validation and contract errors exposed by `barvault-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol contains whitespace or control character {ch:?} at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("invalid aggregation period '{value}', expected one of daily, weekly, monthly")]
    InvalidPeriod { value: String },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },

    #[error("volume {volume} exceeds max {max}")]
    VolumeOutOfRange { volume: u64, max: u64 },

    #[error("bar high must be >= low")]
    InvalidBarRange,
    #[error("bar open/close must be within high/low range")]
    InvalidBarBounds,

    #[error("bar for '{found}' cannot join a series for '{expected}'")]
    SymbolMismatch { expected: String, found: String },
    #[error("series dates must be strictly ascending: {previous} is followed by {next}")]
    UnorderedDates { previous: Date, next: Date },
}

/// Failure raised by a [`crate::BarStore`] implementation.
///
/// A failed `upsert_many` leaves nothing from the batch visible.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("store task failed: {0}")]
    TaskFailed(String),
}

/// Aggregation requests that cannot be satisfied from the given series.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AggregateError {
    #[error("cannot aggregate a {from} series into {to} bars")]
    UnsupportedConversion { from: String, to: String },
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}
