use std::collections::BTreeMap;

use barvault_core::BarSeries;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{ConfigurationError, DataError};
use crate::params::{ParamValue, ResolvedParams};
use crate::plot::PlotDirective;
use crate::plugin::{Indicator, IndicatorPlugin};
use crate::registry::PluginRegistry;
use crate::series::AugmentedSeries;

/// One requested plugin with the caller's parameter overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStep {
    pub plugin: String,
    pub overrides: BTreeMap<String, ParamValue>,
}

impl PipelineStep {
    pub fn new(plugin: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            overrides: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_param(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.overrides.insert(name.to_owned(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginFailure {
    pub plugin: String,
    pub error: String,
    #[serde(skip)]
    pub cause: DataError,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineOutput {
    pub series: AugmentedSeries,
    pub directives: Vec<PlotDirective>,
    pub failures: Vec<PluginFailure>,
}

/// Applies registered indicators to a bar series in caller order.
pub struct CalculationPipeline<'a> {
    registry: &'a PluginRegistry,
}

impl<'a> CalculationPipeline<'a> {
    pub fn new(registry: &'a PluginRegistry) -> Self {
        Self { registry }
    }

    /// Resolves every step before any calculation runs, so an unknown plugin or a bad
    /// parameter fails the whole call without partial output. A step whose calculation
    /// fails contributes nothing and is recorded in [`PipelineOutput::failures`]; later
    /// steps see the series as it was before the failed step.
    pub fn run(
        &self,
        series: &BarSeries,
        steps: &[PipelineStep],
    ) -> Result<PipelineOutput, ConfigurationError> {
        let resolved = steps
            .iter()
            .map(|step| self.resolve(step))
            .collect::<Result<Vec<_>, _>>()?;

        let mut current = AugmentedSeries::from(series.clone());
        let mut directives = Vec::new();
        let mut failures = Vec::new();

        for (step, (plugin, params)) in steps.iter().zip(&resolved) {
            match apply(plugin, &current, params) {
                Ok(next) => {
                    debug!(plugin = %step.plugin, columns = next.columns().len(), "plugin applied");
                    directives.extend(plugin.describe_outputs(params));
                    current = next;
                }
                Err(cause) => {
                    warn!(plugin = %step.plugin, error = %cause, "plugin calculation failed");
                    failures.push(PluginFailure {
                        plugin: step.plugin.clone(),
                        error: cause.to_string(),
                        cause,
                    });
                }
            }
        }

        Ok(PipelineOutput {
            series: current,
            directives,
            failures,
        })
    }

    fn resolve(
        &self,
        step: &PipelineStep,
    ) -> Result<(Indicator, ResolvedParams), ConfigurationError> {
        let plugin = self
            .registry
            .get(&step.plugin)
            .ok_or_else(|| ConfigurationError::UnknownPlugin {
                name: step.plugin.clone(),
            })?;
        let params = ResolvedParams::resolve(&plugin.parameter_definitions(), &step.overrides)?;
        Ok((plugin, params))
    }
}

/// Runs one plugin and checks it kept every column it was given.
fn apply(
    plugin: &Indicator,
    current: &AugmentedSeries,
    params: &ResolvedParams,
) -> Result<AugmentedSeries, DataError> {
    let next = plugin.calculate(current, params)?;
    if next.len() != current.len() {
        return Err(DataError::LengthMismatch {
            column: String::from("bars"),
            expected: current.len(),
            found: next.len(),
        });
    }
    if let Some(lost) = current
        .column_names()
        .find(|name| next.column(name).is_none())
    {
        return Err(DataError::MissingColumn {
            column: lost.to_owned(),
        });
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::make_series;
    use crate::params::ParameterDefinition;
    use crate::registry::{BuiltinSource, SourceChain, StaticSource};

    struct Exploding;

    impl IndicatorPlugin for Exploding {
        fn name(&self) -> &str {
            "Exploding"
        }

        fn version(&self) -> &str {
            "1.0.0"
        }

        fn description(&self) -> &str {
            "always fails"
        }

        fn author(&self) -> &str {
            "tests"
        }

        fn parameter_definitions(&self) -> Vec<ParameterDefinition> {
            Vec::new()
        }

        fn calculate(
            &self,
            _series: &AugmentedSeries,
            _params: &ResolvedParams,
        ) -> Result<AugmentedSeries, DataError> {
            Err(DataError::MissingColumn {
                column: String::from("vwap"),
            })
        }

        fn describe_outputs(&self, _params: &ResolvedParams) -> Vec<PlotDirective> {
            vec![PlotDirective::line("BOOM", "Boom")]
        }
    }

    fn registry() -> PluginRegistry {
        let mut registry = PluginRegistry::default();
        registry.discover(
            &SourceChain::new()
                .with(BuiltinSource)
                .with(StaticSource::new().register(Exploding)),
        );
        registry
    }

    fn closes() -> BarSeries {
        make_series(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0])
            .series()
            .clone()
    }

    #[test]
    fn failing_plugin_is_isolated() {
        let registry = registry();
        let output = CalculationPipeline::new(&registry)
            .run(
                &closes(),
                &[
                    PipelineStep::new("Exploding"),
                    PipelineStep::new("Simple Moving Average").with_param("period", 3_i64),
                ],
            )
            .expect("run");

        assert_eq!(output.failures.len(), 1);
        assert_eq!(output.failures[0].plugin, "Exploding");
        assert!(output.series.column("SMA_3").is_some());
        assert!(output.series.column("BOOM").is_none());
        assert_eq!(output.directives.len(), 1);
    }

    #[test]
    fn same_family_instances_coexist() {
        let registry = registry();
        let output = CalculationPipeline::new(&registry)
            .run(
                &closes(),
                &[
                    PipelineStep::new("Simple Moving Average").with_param("period", 2_i64),
                    PipelineStep::new("Simple Moving Average").with_param("period", 3_i64),
                ],
            )
            .expect("run");

        let names: Vec<&str> = output.series.column_names().collect();
        assert_eq!(names, vec!["SMA_2", "SMA_3"]);
        assert!(output.failures.is_empty());
    }

    #[test]
    fn duplicate_instance_is_a_plugin_failure() {
        let registry = registry();
        let step = PipelineStep::new("Exponential Moving Average");
        let output = CalculationPipeline::new(&registry)
            .run(&closes(), &[step.clone(), step])
            .expect("run");

        assert_eq!(output.series.columns().len(), 1);
        assert_eq!(
            output.failures[0].cause,
            DataError::DuplicateColumn {
                column: String::from("EMA_12")
            }
        );
    }

    #[test]
    fn unknown_plugin_fails_the_whole_run() {
        let registry = registry();
        let error = CalculationPipeline::new(&registry)
            .run(
                &closes(),
                &[
                    PipelineStep::new("Simple Moving Average"),
                    PipelineStep::new("MACD"),
                ],
            )
            .expect_err("unknown");

        assert_eq!(
            error,
            ConfigurationError::UnknownPlugin {
                name: String::from("MACD")
            }
        );
    }

    #[test]
    fn empty_series_records_a_failure_per_plugin() {
        let registry = registry();
        let empty = make_series(&[]).series().clone();
        let output = CalculationPipeline::new(&registry)
            .run(
                &empty,
                &[
                    PipelineStep::new("Simple Moving Average"),
                    PipelineStep::new("Relative Strength Index"),
                ],
            )
            .expect("run");

        assert_eq!(output.failures.len(), 2);
        assert!(output
            .failures
            .iter()
            .all(|failure| failure.cause == DataError::EmptySeries));
        assert!(output.directives.is_empty());
    }
}
