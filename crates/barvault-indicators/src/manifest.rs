//! JSON preset manifests: a named built-in with its own identity and defaults.
//!
//! ```json
//! {
//!   "name": "Fast SMA",
//!   "version": "1.0.0",
//!   "description": "Ten-day simple moving average",
//!   "author": "Desk Tools",
//!   "base": "sma",
//!   "defaults": { "period": 10 }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{DataError, PluginLoadError};
use crate::params::{ParamValue, ParameterDefinition, ResolvedParams};
use crate::plot::PlotDirective;
use crate::plugin::{Indicator, IndicatorPlugin};
use crate::series::AugmentedSeries;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PresetManifest {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub author: String,
    pub base: String,
    #[serde(default)]
    pub defaults: BTreeMap<String, ParamValue>,
}

impl PresetManifest {
    pub fn from_json(text: &str) -> Result<Self, PluginLoadError> {
        serde_json::from_str(text).map_err(|err| PluginLoadError::Construction {
            detail: format!("invalid manifest: {err}"),
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, PluginLoadError> {
        let text = std::fs::read_to_string(path).map_err(|err| PluginLoadError::Construction {
            detail: format!("cannot read {}: {err}", path.display()),
        })?;
        Self::from_json(&text)
    }

    /// Binds the manifest to its base built-in. Default values are checked later by the registry.
    pub fn build(self) -> Result<Preset, PluginLoadError> {
        let base = Indicator::builtin(&self.base).ok_or_else(|| PluginLoadError::Construction {
            detail: format!("unknown base indicator '{}'", self.base),
        })?;

        let mut definitions = base.parameter_definitions();
        for (name, value) in &self.defaults {
            let definition = definitions
                .iter_mut()
                .find(|definition| &definition.name == name)
                .ok_or_else(|| PluginLoadError::Construction {
                    detail: format!("base '{}' has no parameter '{name}'", self.base),
                })?;
            *definition = definition.clone().with_default(value.clone());
        }

        let description = if self.description.is_empty() {
            base.description().to_owned()
        } else {
            self.description
        };

        Ok(Preset {
            name: self.name,
            version: self.version,
            description,
            author: self.author,
            base,
            definitions,
        })
    }
}

/// A built-in indicator republished under a manifest's identity and defaults.
#[derive(Debug, Clone)]
pub struct Preset {
    name: String,
    version: String,
    description: String,
    author: String,
    base: Indicator,
    definitions: Vec<ParameterDefinition>,
}

impl Preset {
    pub fn base(&self) -> &Indicator {
        &self.base
    }
}

impl IndicatorPlugin for Preset {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn author(&self) -> &str {
        &self.author
    }

    fn parameter_definitions(&self) -> Vec<ParameterDefinition> {
        self.definitions.clone()
    }

    fn calculate(
        &self,
        series: &AugmentedSeries,
        params: &ResolvedParams,
    ) -> Result<AugmentedSeries, DataError> {
        self.base.calculate(series, params)
    }

    fn describe_outputs(&self, params: &ResolvedParams) -> Vec<PlotDirective> {
        self.base.describe_outputs(params)
    }
}
