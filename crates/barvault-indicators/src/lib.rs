//! Indicator plugins for barvault.
//!
//! This crate contains:
//! - The [`IndicatorPlugin`] contract, parameter definitions and plot directives
//! - Built-in SMA, EMA, RSI and Bollinger Bands indicators
//! - Market Cipher A and B, shipped as external plugins
//! - [`PluginRegistry`] with built-in, explicit and JSON manifest sources
//! - [`CalculationPipeline`], which applies registered indicators to a bar series

pub mod builtins;
pub mod error;
pub mod manifest;
pub mod market_cipher;
pub mod params;
pub mod pipeline;
pub mod plot;
pub mod plugin;
pub mod registry;
pub mod series;

pub use builtins::{
    BollingerBands, ExponentialMovingAverage, RelativeStrengthIndex, SimpleMovingAverage,
};
pub use error::{ConfigurationError, DataError, DirectiveError, PluginLoadError};
pub use manifest::{Preset, PresetManifest};
pub use market_cipher::{CipherBSettings, MarketCipherA, MarketCipherB};
pub use params::{ParamValue, ParameterDefinition, ParameterKind, ResolvedParams};
pub use pipeline::{CalculationPipeline, PipelineOutput, PipelineStep, PluginFailure};
pub use plot::{Axis, Fill, LineDash, PlotDirective, RenderKind};
pub use plugin::{Indicator, IndicatorPlugin};
pub use registry::{
    BuiltinSource, BundledSource, Candidate, LoadStatus, ManifestDirectory, PluginDescriptor,
    PluginRegistry, PluginSource, RegistryConfig, SourceChain, StaticSource,
};
pub use series::{AugmentedSeries, DerivedColumn};
