use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use crate::builtins::{
    BollingerBands, ExponentialMovingAverage, RelativeStrengthIndex, SimpleMovingAverage,
};
use crate::error::DataError;
use crate::params::{ParameterDefinition, ResolvedParams};
use crate::plot::PlotDirective;
use crate::series::AugmentedSeries;

/// Capability every indicator exposes to the registry and the pipeline.
pub trait IndicatorPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn version(&self) -> &str;
    fn description(&self) -> &str;
    fn author(&self) -> &str;

    /// Declared parameters in declaration order. Names must be unique.
    fn parameter_definitions(&self) -> Vec<ParameterDefinition>;

    /// Returns a new series with this indicator's columns appended.
    ///
    /// Column names must embed the parameters that distinguish one instance from
    /// another so several instances can share a pipeline. An empty series is a
    /// [`DataError::EmptySeries`]; a series shorter than the lookback yields
    /// leading `None` values instead.
    fn calculate(
        &self,
        series: &AugmentedSeries,
        params: &ResolvedParams,
    ) -> Result<AugmentedSeries, DataError>;

    /// Pure function of `params`.
    fn describe_outputs(&self, params: &ResolvedParams) -> Vec<PlotDirective>;
}

/// The built-in indicators plus anything else implementing [`IndicatorPlugin`].
#[derive(Clone)]
pub enum Indicator {
    Sma(SimpleMovingAverage),
    Ema(ExponentialMovingAverage),
    Rsi(RelativeStrengthIndex),
    Bollinger(BollingerBands),
    External(Arc<dyn IndicatorPlugin>),
}

impl Indicator {
    pub fn builtins() -> Vec<Self> {
        vec![
            Self::Sma(SimpleMovingAverage),
            Self::Ema(ExponentialMovingAverage),
            Self::Rsi(RelativeStrengthIndex),
            Self::Bollinger(BollingerBands),
        ]
    }

    /// Looks up a built-in by short key (`sma`, `ema`, `rsi`, `bollinger`) or display name.
    pub fn builtin(key: &str) -> Option<Self> {
        let key = key.trim();
        Self::builtins().into_iter().find(|indicator| {
            indicator.name().eq_ignore_ascii_case(key)
                || indicator
                    .builtin_key()
                    .is_some_and(|short| short.eq_ignore_ascii_case(key))
        })
    }

    pub fn external(plugin: impl IndicatorPlugin + 'static) -> Self {
        Self::External(Arc::new(plugin))
    }

    pub fn builtin_key(&self) -> Option<&'static str> {
        match self {
            Self::Sma(_) => Some("sma"),
            Self::Ema(_) => Some("ema"),
            Self::Rsi(_) => Some("rsi"),
            Self::Bollinger(_) => Some("bollinger"),
            Self::External(_) => None,
        }
    }

    fn as_plugin(&self) -> &dyn IndicatorPlugin {
        match self {
            Self::Sma(plugin) => plugin,
            Self::Ema(plugin) => plugin,
            Self::Rsi(plugin) => plugin,
            Self::Bollinger(plugin) => plugin,
            Self::External(plugin) => plugin.as_ref(),
        }
    }
}

impl IndicatorPlugin for Indicator {
    fn name(&self) -> &str {
        self.as_plugin().name()
    }

    fn version(&self) -> &str {
        self.as_plugin().version()
    }

    fn description(&self) -> &str {
        self.as_plugin().description()
    }

    fn author(&self) -> &str {
        self.as_plugin().author()
    }

    fn parameter_definitions(&self) -> Vec<ParameterDefinition> {
        self.as_plugin().parameter_definitions()
    }

    fn calculate(
        &self,
        series: &AugmentedSeries,
        params: &ResolvedParams,
    ) -> Result<AugmentedSeries, DataError> {
        self.as_plugin().calculate(series, params)
    }

    fn describe_outputs(&self, params: &ResolvedParams) -> Vec<PlotDirective> {
        self.as_plugin().describe_outputs(params)
    }
}

impl Debug for Indicator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let variant = self.builtin_key().unwrap_or("external");
        f.debug_struct("Indicator")
            .field("kind", &variant)
            .field("name", &self.name())
            .field("version", &self.version())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_lookup_accepts_key_or_name() {
        let by_key = Indicator::builtin("RSI").expect("rsi by key");
        let by_name = Indicator::builtin("Relative Strength Index").expect("rsi by name");

        assert_eq!(by_key.name(), by_name.name());
        assert!(Indicator::builtin("macd").is_none());
    }

    #[test]
    fn builtins_are_listed_in_fixed_order() {
        let names: Vec<String> = Indicator::builtins()
            .iter()
            .map(|indicator| indicator.name().to_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "Simple Moving Average",
                "Exponential Moving Average",
                "Relative Strength Index",
                "Bollinger Bands",
            ]
        );
    }
}
