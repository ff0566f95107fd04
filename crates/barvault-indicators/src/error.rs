use thiserror::Error;

/// A plugin could not compute its output for the given series.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DataError {
    #[error("series is empty")]
    EmptySeries,
    #[error("series has no column '{column}'")]
    MissingColumn { column: String },
    #[error("column '{column}' already exists in the series")]
    DuplicateColumn { column: String },
    #[error("column '{column}' has {found} values, series has {expected} bars")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },
    #[error("parameter '{name}' is unusable: {detail}")]
    InvalidParameter { name: String, detail: String },
}

/// The caller asked for something no registered plugin can provide.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("unknown plugin '{name}'")]
    UnknownPlugin { name: String },
    #[error("unknown parameter: {name}")]
    UnknownParameter { name: String },
    #[error("parameter '{name}': expected {expected}, got {found}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        found: String,
    },
    #[error("parameter '{name}': {detail}")]
    BoundViolation { name: String, detail: String },
    #[error("parameter '{name}': value '{value}' not in choices {choices:?}")]
    InvalidChoice {
        name: String,
        value: String,
        choices: Vec<String>,
    },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DirectiveError {
    #[error("directive label cannot be empty")]
    EmptyLabel,
    #[error("directive '{label}' has no color")]
    EmptyColor { label: String },
    #[error("directive '{label}' needs a column or a reference level")]
    MissingTarget { label: String },
    #[error("directive '{label}' opacity {opacity} is outside 0..=1")]
    OpacityOutOfRange { label: String, opacity: f64 },
    #[error("directive '{label}' line width {width} must be positive")]
    NonPositiveWidth { label: String, width: f64 },
}

/// A discovered candidate could not be admitted into the registry.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PluginLoadError {
    #[error("missing or empty '{field}' attribute")]
    EmptyIdentity { field: &'static str },
    #[error("version '{version}' is not dotted numeric")]
    InvalidVersion { version: String },
    #[error("plugin name '{name}' is already registered")]
    DuplicateName { name: String },
    #[error("parameter '{parameter}' is declared twice")]
    DuplicateParameter { parameter: String },
    #[error("default for '{parameter}' is invalid: {reason}")]
    InvalidDefault {
        parameter: String,
        #[source]
        reason: ConfigurationError,
    },
    #[error("plot outputs are invalid: {0}")]
    InvalidOutputs(#[from] DirectiveError),
    #[error("construction failed: {detail}")]
    Construction { detail: String },
}
