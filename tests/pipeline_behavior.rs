//! Behavior-driven tests for indicator plugins and the calculation pipeline
//!
//! These tests verify what the chart layer receives: derived columns, plot
//! directives and recorded failures, from stored bars through to output.

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};

use barvault_indicators::{
    AugmentedSeries, BuiltinSource, CalculationPipeline, ConfigurationError, DataError,
    IndicatorPlugin, ManifestDirectory, ParameterDefinition, PipelineStep, PlotDirective,
    PluginRegistry, RegistryConfig, ResolvedParams, SourceChain, StaticSource,
};
use barvault_tests::*;
use tempfile::tempdir;
use time::macros::date;
use time::Duration;

struct NeedsVwap;

impl IndicatorPlugin for NeedsVwap {
    fn name(&self) -> &str {
        "VWAP Bands"
    }

    fn version(&self) -> &str {
        "0.3.0"
    }

    fn description(&self) -> &str {
        "Bands around a volume weighted average price column"
    }

    fn author(&self) -> &str {
        "Desk Tools"
    }

    fn parameter_definitions(&self) -> Vec<ParameterDefinition> {
        Vec::new()
    }

    fn calculate(
        &self,
        series: &AugmentedSeries,
        _params: &ResolvedParams,
    ) -> Result<AugmentedSeries, DataError> {
        series.values("vwap")?;
        Ok(series.clone())
    }

    fn describe_outputs(&self, _params: &ResolvedParams) -> Vec<PlotDirective> {
        vec![PlotDirective::line("VWAP_UPPER", "VWAP upper")]
    }
}

/// Counts how often `calculate` runs.
struct Counting {
    calls: Arc<AtomicUsize>,
}

impl IndicatorPlugin for Counting {
    fn name(&self) -> &str {
        "Counting"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn description(&self) -> &str {
        "Records calculate calls"
    }

    fn author(&self) -> &str {
        "Desk Tools"
    }

    fn parameter_definitions(&self) -> Vec<ParameterDefinition> {
        vec![ParameterDefinition::int("lookback", 5).range(2.0, 50.0)]
    }

    fn calculate(
        &self,
        series: &AugmentedSeries,
        _params: &ResolvedParams,
    ) -> Result<AugmentedSeries, DataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(series.clone())
    }

    fn describe_outputs(&self, _params: &ResolvedParams) -> Vec<PlotDirective> {
        Vec::new()
    }
}

fn trending_series(days: i64) -> BarSeries {
    let bars = (0..days)
        .map(|offset| {
            let close = 50.0 + offset as f64 * 0.5;
            let day = date!(2024 - 01 - 01) + Duration::days(offset);
            bar("SPY", day, close, close + 1.0, close - 1.0, close, Some(1_000))
        })
        .collect();
    BarSeries::new(symbol("SPY"), AggregationPeriod::Daily, bars).expect("series")
}

// =============================================================================
// Pipeline: Stored bars to chart output
// =============================================================================

#[test]
fn when_user_charts_weekly_bars_with_indicators_then_columns_and_directives_follow_request_order() {
    // Given: Ninety days of SPY in the warehouse and the built-in registry
    let temp = tempdir().expect("tempdir");
    let warehouse = open_warehouse(temp.path());
    warehouse
        .upsert_many(&symbol("SPY"), trending_series(90).bars())
        .expect("write");
    let registry = PluginRegistry::with_builtins();

    // When: Weekly bars are run through SMA(4), RSI(5) and Bollinger(4, 2.0)
    let weekly = Aggregator::default()
        .load(&warehouse, &symbol("SPY"), AggregationPeriod::Weekly, None, None)
        .expect("weekly");
    let output = CalculationPipeline::new(&registry)
        .run(
            &weekly,
            &[
                PipelineStep::new("Simple Moving Average").with_param("period", 4_i64),
                PipelineStep::new("Relative Strength Index").with_param("period", 5_i64),
                PipelineStep::new("Bollinger Bands").with_param("period", 4_i64),
            ],
        )
        .expect("run");

    // Then: Every column is present, aligned with the weekly bars, in request order
    let names: Vec<&str> = output.series.column_names().collect();
    assert_eq!(
        names,
        vec!["SMA_4", "RSI_5", "BB_Upper_4_2.0", "BB_Middle_4_2.0", "BB_Lower_4_2.0"]
    );
    assert_eq!(output.series.len(), weekly.len());
    assert!(output
        .series
        .columns()
        .iter()
        .all(|column| column.values.len() == weekly.len()));
    assert_eq!(output.directives.len(), 1 + 3 + 3);
    assert!(output.failures.is_empty());

    // And: A steadily rising series has RSI pinned at 100 once defined
    let rsi = &output.series.column("RSI_5").expect("rsi").values;
    assert!(rsi[..5].iter().all(Option::is_none));
    assert!(rsi[5..].iter().all(|value| *value == Some(100.0)));
}

#[test]
fn when_one_plugin_raises_a_data_error_then_the_sma_output_survives_and_one_failure_is_recorded() {
    // Given: A registry holding the built-ins and a plugin that needs a missing column
    let mut registry = PluginRegistry::default();
    registry.discover(
        &SourceChain::new()
            .with(BuiltinSource)
            .with(StaticSource::new().register(NeedsVwap)),
    );

    // When: The pipeline runs the broken plugin between two good ones
    let output = CalculationPipeline::new(&registry)
        .run(
            &trending_series(30),
            &[
                PipelineStep::new("Simple Moving Average").with_param("period", 10_i64),
                PipelineStep::new("VWAP Bands"),
                PipelineStep::new("Exponential Moving Average").with_param("period", 10_i64),
            ],
        )
        .expect("run");

    // Then: Both good plugins contribute and exactly one failure is recorded
    assert!(output.series.column("SMA_10").is_some());
    assert!(output.series.column("EMA_10").is_some());
    assert_eq!(output.failures.len(), 1);
    assert_eq!(output.failures[0].plugin, "VWAP Bands");
    assert_eq!(
        output.failures[0].cause,
        DataError::MissingColumn {
            column: String::from("vwap")
        }
    );
    assert!(output
        .directives
        .iter()
        .all(|directive| directive.column.as_deref() != Some("VWAP_UPPER")));
}

#[test]
fn when_user_charts_both_market_ciphers_then_wave_and_money_flow_columns_are_added() {
    // Given: A registry refreshed with the default sources
    let mut registry = PluginRegistry::new(RegistryConfig::default());
    registry.refresh();

    // When: Both ciphers run over a steady uptrend, Cipher B with a 20 bar money flow
    let output = CalculationPipeline::new(&registry)
        .run(
            &trending_series(40),
            &[
                PipelineStep::new("Market Cipher A"),
                PipelineStep::new("Market Cipher B").with_param("mfi_length", 20_i64),
            ],
        )
        .expect("run");

    // Then: Each cipher contributes its columns and directives without failures
    let names: Vec<&str> = output.series.column_names().collect();
    assert_eq!(names[..3], ["MCA_WT1_9_12", "MCA_WT2_9_12", "MCA_Hist_9_12"]);
    assert!(names.contains(&"MCB_MFI_20"));
    assert!(names.contains(&"MCB_Buy_9_12_-53"));
    assert_eq!(output.directives.len(), 4 + 5);
    assert!(output.failures.is_empty());

    // And: Money flow is undefined until its window fills, then reads fully bought
    let mfi = &output.series.column("MCB_MFI_20").expect("mfi").values;
    assert!(mfi[..19].iter().all(Option::is_none));
    assert!(mfi[19..]
        .iter()
        .all(|value| matches!(value, Some(v) if *v > 99.99)));
}

// =============================================================================
// Pipeline: Configuration errors
// =============================================================================

#[test]
fn when_a_parameter_is_below_its_minimum_then_the_run_fails_before_any_calculation() {
    // Given: A registry with a plugin that counts its calculations
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = PluginRegistry::default();
    registry.discover(&StaticSource::new().register(Counting {
        calls: Arc::clone(&calls),
    }));

    // When: The first step is valid and the second asks for lookback 1
    let error = CalculationPipeline::new(&registry)
        .run(
            &trending_series(10),
            &[
                PipelineStep::new("Counting"),
                PipelineStep::new("Counting").with_param("lookback", 1_i64),
            ],
        )
        .expect_err("bound violation");

    // Then: It is a bounds violation and nothing was calculated
    assert!(matches!(
        error,
        ConfigurationError::BoundViolation { ref name, .. } if name == "lookback"
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn when_user_requests_an_unregistered_plugin_then_the_whole_run_is_rejected() {
    // Given: The built-in registry
    let registry = PluginRegistry::with_builtins();

    // When: A step names a plugin nobody registered
    let result = CalculationPipeline::new(&registry).run(
        &trending_series(10),
        &[PipelineStep::new("Ichimoku Cloud")],
    );

    // Then: No partial result comes back
    assert_eq!(
        result,
        Err(ConfigurationError::UnknownPlugin {
            name: String::from("Ichimoku Cloud")
        })
    );
}

// =============================================================================
// Registry: Discovery
// =============================================================================

#[test]
fn when_plugin_directory_changes_then_rediscovery_drops_removed_presets() {
    // Given: A plugin directory with two presets
    let temp = tempdir().expect("tempdir");
    let write = |file: &str, name: &str, period: i64| {
        fs::write(
            temp.path().join(file),
            format!(
                r#"{{"name": "{name}", "version": "1.0.0", "author": "Desk Tools",
                    "base": "ema", "defaults": {{"period": {period}}}}}"#
            ),
        )
        .expect("write manifest");
    };
    write("fast.json", "Fast EMA", 5);
    write("slow.json", "Slow EMA", 50);
    let mut registry = PluginRegistry::new(RegistryConfig {
        include_builtins: false,
        include_bundled: false,
        manifest_dir: Some(temp.path().to_path_buf()),
    });
    registry.refresh();
    assert_eq!(registry.len(), 2);

    // When: One preset is removed and discovery runs again
    fs::remove_file(temp.path().join("slow.json")).expect("remove");
    let outcome = registry.discover(&ManifestDirectory::new(temp.path())).clone();

    // Then: Only the remaining preset is live
    assert_eq!(registry.len(), 1);
    assert!(registry.get("Slow EMA").is_none());
    assert!(outcome.contains_key("Fast EMA"));
    assert!(!outcome.contains_key("Slow EMA"));

    // And: The preset computes with its own default period
    let output = CalculationPipeline::new(&registry)
        .run(&trending_series(10), &[PipelineStep::new("Fast EMA")])
        .expect("run");
    assert!(output.series.column("EMA_5").is_some());
}
