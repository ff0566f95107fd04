//! Structural and value checks applied to raw rows before they may enter a store.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

use crate::domain::{Bar, Symbol, MAX_VOLUME};

const PRICE_DECIMALS: i32 = 6;

/// One untyped row as handed over by a fetch capability.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawBarRow(Map<String, Value>);

impl RawBarRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.insert(field.to_owned(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field).filter(|value| !value.is_null())
    }
}

impl From<Map<String, Value>> for RawBarRow {
    fn from(value: Map<String, Value>) -> Self {
        Self(value)
    }
}

/// Why a raw row was refused.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RejectionReason {
    #[error("required field '{field}' is missing")]
    MissingField { field: &'static str },

    #[error("field '{field}' must be {expected}")]
    TypeMismatch {
        field: &'static str,
        expected: &'static str,
    },

    #[error("{detail}")]
    BoundViolation { detail: String },

    #[error("date {date} is after fetch date {as_of}")]
    FutureDate { date: Date, as_of: Date },
}

impl RejectionReason {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MissingField { .. } => "missing_field",
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::BoundViolation { .. } => "bound_violation",
            Self::FutureDate { .. } => "future_date",
        }
    }
}

/// Row validator pinned to the moment a fetch was made.
#[derive(Debug, Clone, Copy)]
pub struct BarValidator {
    as_of: Date,
}

impl BarValidator {
    pub fn new(as_of: Date) -> Self {
        Self { as_of }
    }

    pub fn as_of(&self) -> Date {
        self.as_of
    }

    /// Validates `row` and returns the bar it describes.
    ///
    /// Checks run in a fixed order: required fields and their types, price bounds,
    /// volume, and finally the future-date guard. The first failing check wins.
    pub fn validate(&self, symbol: &Symbol, row: &RawBarRow) -> Result<Bar, RejectionReason> {
        let date = required_date(row)?;
        let open = required_number(row, "open")?;
        let high = required_number(row, "high")?;
        let low = required_number(row, "low")?;
        let close = required_number(row, "close")?;
        let adjusted_close = match optional_number(row, "adjusted_close")? {
            Some(value) => value,
            None => optional_number(row, "adj_close")?.unwrap_or(close),
        };
        let raw_volume = optional_number(row, "volume")?;

        let bar = Bar::new(
            symbol.clone(),
            date,
            round_price(open),
            round_price(high),
            round_price(low),
            round_price(close),
            round_price(adjusted_close),
            None,
        )
        .map_err(|err| RejectionReason::BoundViolation {
            detail: err.to_string(),
        })?;

        let volume = match raw_volume {
            None => None,
            Some(value) if value < 0.0 => {
                return Err(RejectionReason::BoundViolation {
                    detail: format!("volume {value} must be non-negative"),
                })
            }
            Some(value) if value.fract() != 0.0 => {
                return Err(RejectionReason::TypeMismatch {
                    field: "volume",
                    expected: "a whole number",
                })
            }
            Some(value) if value >= MAX_VOLUME as f64 => {
                return Err(RejectionReason::BoundViolation {
                    detail: format!("volume {value} exceeds max {MAX_VOLUME}"),
                })
            }
            Some(value) => Some(value as u64),
        };

        if date > self.as_of {
            return Err(RejectionReason::FutureDate {
                date,
                as_of: self.as_of,
            });
        }

        Ok(Bar { volume, ..bar })
    }
}

fn required_date(row: &RawBarRow) -> Result<Date, RejectionReason> {
    let value = row
        .get("date")
        .ok_or(RejectionReason::MissingField { field: "date" })?;
    let text = value.as_str().ok_or(RejectionReason::TypeMismatch {
        field: "date",
        expected: "a date string",
    })?;
    parse_date(text).ok_or(RejectionReason::TypeMismatch {
        field: "date",
        expected: "a calendar date (YYYY-MM-DD or RFC3339)",
    })
}

fn parse_date(text: &str) -> Option<Date> {
    let text = text.trim();
    let calendar = format_description!("[year]-[month]-[day]");
    if let Ok(date) = Date::parse(text, &calendar) {
        return Some(date);
    }
    if let Ok(timestamp) = OffsetDateTime::parse(text, &Rfc3339) {
        return Some(timestamp.date());
    }
    // "2024-01-02 00:00:00" as written by dataframe exports.
    match text.split_once(' ') {
        Some((head, _)) => Date::parse(head, &calendar).ok(),
        None => None,
    }
}

fn required_number(row: &RawBarRow, field: &'static str) -> Result<f64, RejectionReason> {
    optional_number(row, field)?.ok_or(RejectionReason::MissingField { field })
}

fn optional_number(row: &RawBarRow, field: &'static str) -> Result<Option<f64>, RejectionReason> {
    let Some(value) = row.get(field) else {
        return Ok(None);
    };
    let mismatch = RejectionReason::TypeMismatch {
        field,
        expected: "a number",
    };
    match value {
        Value::Number(number) => number.as_f64().map(Some).ok_or(mismatch),
        Value::String(text) => match text.trim().parse::<f64>() {
            Ok(number) if number.is_finite() => Ok(Some(number)),
            _ => Err(mismatch),
        },
        _ => Err(mismatch),
    }
}

fn round_price(value: f64) -> f64 {
    let scale = 10f64.powi(PRICE_DECIMALS);
    (value * scale).round() / scale
}
