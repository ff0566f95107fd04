use barvault_core::{Bar, BarSeries};
use serde::{Deserialize, Serialize};

use crate::error::DataError;

/// One derived value per bar; `None` where the indicator has no value yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedColumn {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

impl DerivedColumn {
    /// Builds a column from raw floats, mapping NaN and infinities to `None`.
    pub fn from_f64(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values: values
                .into_iter()
                .map(|value| value.is_finite().then_some(value))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A bar series plus the derived columns computed over it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AugmentedSeries {
    series: BarSeries,
    columns: Vec<DerivedColumn>,
}

impl AugmentedSeries {
    pub fn bars(&self) -> &[Bar] {
        self.series.bars()
    }

    pub fn series(&self) -> &BarSeries {
        &self.series
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn columns(&self) -> &[DerivedColumn] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&DerivedColumn> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }

    /// Values of an OHLCV field or a derived column; missing values come back as NaN.
    pub fn values(&self, name: &str) -> Result<Vec<f64>, DataError> {
        let bars = self.series.bars();
        let field: Option<fn(&Bar) -> f64> = match name {
            "open" => Some(|bar: &Bar| bar.open),
            "high" => Some(|bar: &Bar| bar.high),
            "low" => Some(|bar: &Bar| bar.low),
            "close" => Some(|bar: &Bar| bar.close),
            "adjusted_close" => Some(|bar: &Bar| bar.adjusted_close),
            "volume" => Some(|bar: &Bar| bar.volume.map_or(f64::NAN, |volume| volume as f64)),
            _ => None,
        };
        if let Some(field) = field {
            return Ok(bars.iter().map(field).collect());
        }

        self.column(name)
            .map(|column| {
                column
                    .values
                    .iter()
                    .map(|value| value.unwrap_or(f64::NAN))
                    .collect()
            })
            .ok_or_else(|| DataError::MissingColumn {
                column: name.to_owned(),
            })
    }

    /// Returns a copy with `column` appended, leaving `self` untouched.
    pub fn with_column(&self, column: DerivedColumn) -> Result<Self, DataError> {
        self.with_columns([column])
    }

    pub fn with_columns(
        &self,
        columns: impl IntoIterator<Item = DerivedColumn>,
    ) -> Result<Self, DataError> {
        let mut augmented = self.clone();
        for column in columns {
            augmented.push(column)?;
        }
        Ok(augmented)
    }

    fn push(&mut self, column: DerivedColumn) -> Result<(), DataError> {
        if is_base_field(&column.name) || self.column(&column.name).is_some() {
            return Err(DataError::DuplicateColumn {
                column: column.name,
            });
        }
        if column.len() != self.len() {
            return Err(DataError::LengthMismatch {
                expected: self.len(),
                found: column.len(),
                column: column.name,
            });
        }
        self.columns.push(column);
        Ok(())
    }
}

impl From<BarSeries> for AugmentedSeries {
    fn from(series: BarSeries) -> Self {
        Self {
            series,
            columns: Vec::new(),
        }
    }
}

fn is_base_field(name: &str) -> bool {
    matches!(
        name,
        "symbol" | "date" | "open" | "high" | "low" | "close" | "adjusted_close" | "volume"
    )
}
