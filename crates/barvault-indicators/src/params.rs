//! Plugin parameter definitions and their resolution against caller overrides.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, DataError};

/// A parameter value as supplied by a caller or a manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "str",
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            Self::Bool(_) | Self::Text(_) => None,
        }
    }
}

impl Display for ParamValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    Int,
    Float,
    Bool,
    #[serde(rename = "str")]
    Text,
    Choice,
}

impl ParameterKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Text => "str",
            Self::Choice => "choice",
        }
    }
}

/// One configurable knob of a plugin.
///
/// `min`, `max` and `step` only apply to numeric kinds; `choices` only to
/// [`ParameterKind::Choice`]. `step` is a presentation hint and is not enforced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterDefinition {
    pub name: String,
    pub kind: ParameterKind,
    pub default: ParamValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
    pub description: String,
}

impl ParameterDefinition {
    fn with_kind(name: &str, kind: ParameterKind, default: ParamValue) -> Self {
        Self {
            name: name.to_owned(),
            kind,
            default,
            min: None,
            max: None,
            step: None,
            choices: Vec::new(),
            description: String::new(),
        }
    }

    pub fn int(name: &str, default: i64) -> Self {
        Self::with_kind(name, ParameterKind::Int, ParamValue::Int(default))
    }

    pub fn float(name: &str, default: f64) -> Self {
        Self::with_kind(name, ParameterKind::Float, ParamValue::Float(default))
    }

    pub fn boolean(name: &str, default: bool) -> Self {
        Self::with_kind(name, ParameterKind::Bool, ParamValue::Bool(default))
    }

    pub fn text(name: &str, default: &str) -> Self {
        Self::with_kind(name, ParameterKind::Text, ParamValue::from(default))
    }

    pub fn choice(name: &str, default: &str, choices: &[&str]) -> Self {
        let mut definition =
            Self::with_kind(name, ParameterKind::Choice, ParamValue::from(default));
        definition.choices = choices.iter().map(|choice| (*choice).to_owned()).collect();
        definition
    }

    #[must_use]
    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    #[must_use]
    pub fn step(mut self, step: f64) -> Self {
        self.step = Some(step);
        self
    }

    #[must_use]
    pub fn describe(mut self, description: &str) -> Self {
        self.description = description.to_owned();
        self
    }

    #[must_use]
    pub fn with_default(mut self, default: ParamValue) -> Self {
        self.default = default;
        self
    }

    /// Checks `value` against this definition and returns it normalized to the declared kind.
    pub fn check(&self, value: &ParamValue) -> Result<ParamValue, ConfigurationError> {
        let normalized = match (self.kind, value) {
            (ParameterKind::Int, ParamValue::Int(number)) => ParamValue::Int(*number),
            (ParameterKind::Int, ParamValue::Float(number))
                if number.is_finite()
                    && number.fract() == 0.0
                    && number.abs() <= i64::MAX as f64 =>
            {
                ParamValue::Int(*number as i64)
            }
            (ParameterKind::Float, ParamValue::Int(number)) => ParamValue::Float(*number as f64),
            (ParameterKind::Float, ParamValue::Float(number)) if number.is_finite() => {
                ParamValue::Float(*number)
            }
            (ParameterKind::Bool, ParamValue::Bool(flag)) => ParamValue::Bool(*flag),
            (ParameterKind::Text, ParamValue::Text(text)) => ParamValue::Text(text.clone()),
            (ParameterKind::Choice, ParamValue::Text(text)) => {
                if !self.choices.iter().any(|choice| choice == text) {
                    return Err(ConfigurationError::InvalidChoice {
                        name: self.name.clone(),
                        value: text.clone(),
                        choices: self.choices.clone(),
                    });
                }
                ParamValue::Text(text.clone())
            }
            (kind, other) => {
                return Err(ConfigurationError::TypeMismatch {
                    name: self.name.clone(),
                    expected: kind.as_str(),
                    found: match other {
                        ParamValue::Float(number) if !number.is_finite() => number.to_string(),
                        _ => other.type_name().to_owned(),
                    },
                });
            }
        };

        if let Some(number) = normalized.as_f64() {
            if let Some(min) = self.min {
                if number < min {
                    return Err(ConfigurationError::BoundViolation {
                        name: self.name.clone(),
                        detail: format!("value {normalized} is below minimum {min}"),
                    });
                }
            }
            if let Some(max) = self.max {
                if number > max {
                    return Err(ConfigurationError::BoundViolation {
                        name: self.name.clone(),
                        detail: format!("value {normalized} is above maximum {max}"),
                    });
                }
            }
        }

        Ok(normalized)
    }
}

/// Definition defaults merged with caller overrides, every value checked.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResolvedParams {
    values: BTreeMap<String, ParamValue>,
}

impl ResolvedParams {
    pub fn defaults(definitions: &[ParameterDefinition]) -> Result<Self, ConfigurationError> {
        Self::resolve(definitions, &BTreeMap::new())
    }

    pub fn resolve(
        definitions: &[ParameterDefinition],
        overrides: &BTreeMap<String, ParamValue>,
    ) -> Result<Self, ConfigurationError> {
        if let Some(unknown) = overrides
            .keys()
            .find(|name| !definitions.iter().any(|definition| &definition.name == *name))
        {
            return Err(ConfigurationError::UnknownParameter {
                name: unknown.clone(),
            });
        }

        let mut values = BTreeMap::new();
        for definition in definitions {
            let raw = overrides.get(&definition.name).unwrap_or(&definition.default);
            values.insert(definition.name.clone(), definition.check(raw)?);
        }
        Ok(Self { values })
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn int(&self, name: &str) -> Result<i64, DataError> {
        match self.require(name)? {
            ParamValue::Int(value) => Ok(*value),
            other => Err(mismatch(name, "int", other)),
        }
    }

    pub fn float(&self, name: &str) -> Result<f64, DataError> {
        match self.require(name)? {
            ParamValue::Float(value) => Ok(*value),
            ParamValue::Int(value) => Ok(*value as f64),
            other => Err(mismatch(name, "float", other)),
        }
    }

    pub fn flag(&self, name: &str) -> Result<bool, DataError> {
        match self.require(name)? {
            ParamValue::Bool(value) => Ok(*value),
            other => Err(mismatch(name, "bool", other)),
        }
    }

    pub fn text(&self, name: &str) -> Result<&str, DataError> {
        match self.require(name)? {
            ParamValue::Text(value) => Ok(value),
            other => Err(mismatch(name, "str", other)),
        }
    }

    /// A positive integer parameter used as a lookback length.
    pub fn window(&self, name: &str) -> Result<usize, DataError> {
        let value = self.int(name)?;
        usize::try_from(value)
            .ok()
            .filter(|window| *window > 0)
            .ok_or_else(|| DataError::InvalidParameter {
                name: name.to_owned(),
                detail: format!("window must be positive, got {value}"),
            })
    }

    fn require(&self, name: &str) -> Result<&ParamValue, DataError> {
        self.values.get(name).ok_or_else(|| DataError::InvalidParameter {
            name: name.to_owned(),
            detail: String::from("not resolved"),
        })
    }
}

fn mismatch(name: &str, expected: &str, found: &ParamValue) -> DataError {
    DataError::InvalidParameter {
        name: name.to_owned(),
        detail: format!("expected {expected}, got {}", found.type_name()),
    }
}
