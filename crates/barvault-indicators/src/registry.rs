//! Plugin discovery and lookup.
//!
//! A [`PluginSource`] enumerates candidates; [`PluginRegistry::discover`] checks each
//! against the indicator contract and admits the ones that pass. Every discovery
//! replaces the previous registry contents.

use std::collections::{BTreeMap, HashMap};
use std::env;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::error::PluginLoadError;
use crate::manifest::PresetManifest;
use crate::market_cipher;
use crate::params::{ParameterDefinition, ResolvedParams};
use crate::plugin::{Indicator, IndicatorPlugin};

/// Outcome of loading one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LoadStatus {
    Loaded,
    Failed { reason: String },
}

impl LoadStatus {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded)
    }
}

/// Metadata snapshot taken when a plugin is discovered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginDescriptor {
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: String,
    pub parameters: Vec<ParameterDefinition>,
    pub status: LoadStatus,
}

impl PluginDescriptor {
    fn of(plugin: &dyn IndicatorPlugin, status: LoadStatus) -> Self {
        Self {
            name: plugin.name().to_owned(),
            version: plugin.version().to_owned(),
            description: plugin.description().to_owned(),
            author: plugin.author().to_owned(),
            parameters: plugin.parameter_definitions(),
            status,
        }
    }

    fn unconstructed(origin: &str, error: &PluginLoadError) -> Self {
        Self {
            name: origin.to_owned(),
            version: String::new(),
            description: String::new(),
            author: String::new(),
            parameters: Vec::new(),
            status: LoadStatus::Failed {
                reason: error.to_string(),
            },
        }
    }
}

/// A candidate produced by a source, or the reason it could not be built.
#[derive(Debug, Clone)]
pub enum Candidate {
    Ready(Indicator),
    Broken {
        origin: String,
        error: PluginLoadError,
    },
}

pub trait PluginSource {
    fn candidates(&self) -> Vec<Candidate>;
}

/// The four built-in indicators.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinSource;

impl PluginSource for BuiltinSource {
    fn candidates(&self) -> Vec<Candidate> {
        Indicator::builtins().into_iter().map(Candidate::Ready).collect()
    }
}

/// Indicators shipped with the crate that load as external plugins.
#[derive(Debug, Clone, Copy, Default)]
pub struct BundledSource;

impl PluginSource for BundledSource {
    fn candidates(&self) -> Vec<Candidate> {
        market_cipher::bundled()
            .into_iter()
            .map(Candidate::Ready)
            .collect()
    }
}

/// Explicitly registered implementations.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    plugins: Vec<Indicator>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn register(mut self, plugin: impl IndicatorPlugin + 'static) -> Self {
        self.plugins.push(Indicator::external(plugin));
        self
    }

    #[must_use]
    pub fn register_indicator(mut self, indicator: Indicator) -> Self {
        self.plugins.push(indicator);
        self
    }
}

impl PluginSource for StaticSource {
    fn candidates(&self) -> Vec<Candidate> {
        self.plugins.iter().cloned().map(Candidate::Ready).collect()
    }
}

/// `*.json` preset manifests in one directory, enumerated in file-name order.
#[derive(Debug, Clone)]
pub struct ManifestDirectory {
    root: PathBuf,
}

impl ManifestDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn manifest_paths(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            let is_manifest = path.extension().is_some_and(|ext| ext == "json");
            let hidden = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with('_') || name.starts_with('.'));
            if path.is_file() && is_manifest && !hidden {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

impl PluginSource for ManifestDirectory {
    fn candidates(&self) -> Vec<Candidate> {
        let paths = match self.manifest_paths() {
            Ok(paths) => paths,
            Err(err) => {
                return vec![Candidate::Broken {
                    origin: self.root.display().to_string(),
                    error: PluginLoadError::Construction {
                        detail: format!("cannot list manifest directory: {err}"),
                    },
                }];
            }
        };

        paths
            .into_iter()
            .map(|path| {
                let origin = path
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .unwrap_or("manifest")
                    .to_owned();
                match PresetManifest::from_path(&path).and_then(PresetManifest::build) {
                    Ok(preset) => Candidate::Ready(Indicator::external(preset)),
                    Err(error) => Candidate::Broken { origin, error },
                }
            })
            .collect()
    }
}

/// Several sources enumerated in order.
#[derive(Default)]
pub struct SourceChain {
    sources: Vec<Box<dyn PluginSource>>,
}

impl SourceChain {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, source: impl PluginSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }
}

impl PluginSource for SourceChain {
    fn candidates(&self) -> Vec<Candidate> {
        self.sources
            .iter()
            .flat_map(|source| source.candidates())
            .collect()
    }
}

/// Which sources [`PluginRegistry::refresh`] enumerates.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub include_builtins: bool,
    pub include_bundled: bool,
    pub manifest_dir: Option<PathBuf>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            include_builtins: true,
            include_bundled: true,
            manifest_dir: None,
        }
    }
}

impl RegistryConfig {
    /// Reads `BARVAULT_PLUGIN_DIR` for the manifest directory.
    pub fn from_env() -> Self {
        let manifest_dir = env::var_os("BARVAULT_PLUGIN_DIR")
            .map(PathBuf::from)
            .filter(|path| !path.as_os_str().is_empty());
        Self {
            manifest_dir,
            ..Self::default()
        }
    }

    pub fn sources(&self) -> SourceChain {
        let mut chain = SourceChain::new();
        if self.include_builtins {
            chain = chain.with(BuiltinSource);
        }
        if self.include_bundled {
            chain = chain.with(BundledSource);
        }
        if let Some(dir) = &self.manifest_dir {
            chain = chain.with(ManifestDirectory::new(dir.clone()));
        }
        chain
    }
}

#[derive(Debug, Default)]
pub struct PluginRegistry {
    config: RegistryConfig,
    order: Vec<String>,
    plugins: HashMap<String, (Indicator, PluginDescriptor)>,
    last_discovery: BTreeMap<String, PluginDescriptor>,
}

impl PluginRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// A registry already populated with the built-ins.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new(RegistryConfig::default());
        registry.discover(&BuiltinSource);
        registry
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Discovers from the sources named by the registry's config.
    pub fn refresh(&mut self) -> &BTreeMap<String, PluginDescriptor> {
        let sources = self.config.sources();
        self.discover(&sources)
    }

    /// Replaces the registry with every candidate of `source` that satisfies the contract.
    ///
    /// The returned map covers every candidate, loaded or not, keyed by plugin name
    /// (or by origin when the candidate never produced one). A loaded plugin's
    /// outcome always stands; failures only fill keys that are still vacant.
    pub fn discover(
        &mut self,
        source: &dyn PluginSource,
    ) -> &BTreeMap<String, PluginDescriptor> {
        let mut order = Vec::new();
        let mut plugins = HashMap::new();
        let mut outcomes = BTreeMap::new();

        for candidate in source.candidates() {
            match candidate {
                Candidate::Broken { origin, error } => {
                    warn!(plugin = %origin, error = %error, "plugin failed to load");
                    let descriptor = PluginDescriptor::unconstructed(&origin, &error);
                    outcomes.entry(origin).or_insert(descriptor);
                }
                Candidate::Ready(indicator) => {
                    let admitted = if plugins.contains_key(indicator.name()) {
                        Err(PluginLoadError::DuplicateName {
                            name: indicator.name().to_owned(),
                        })
                    } else {
                        check_contract(&indicator)
                    };

                    match admitted {
                        Ok(()) => {
                            info!(
                                plugin = indicator.name(),
                                version = indicator.version(),
                                "plugin loaded"
                            );
                            let descriptor = PluginDescriptor::of(&indicator, LoadStatus::Loaded);
                            outcomes.insert(descriptor.name.clone(), descriptor.clone());
                            order.push(descriptor.name.clone());
                            plugins.insert(descriptor.name.clone(), (indicator, descriptor));
                        }
                        Err(error) => {
                            warn!(
                                plugin = indicator.name(),
                                error = %error,
                                "plugin failed to load"
                            );
                            let descriptor = PluginDescriptor::of(
                                &indicator,
                                LoadStatus::Failed {
                                    reason: error.to_string(),
                                },
                            );
                            // a rejected duplicate must not shadow the loaded entry's report
                            outcomes.entry(descriptor.name.clone()).or_insert(descriptor);
                        }
                    }
                }
            }
        }

        self.order = order;
        self.plugins = plugins;
        self.last_discovery = outcomes;
        &self.last_discovery
    }

    pub fn get(&self, name: &str) -> Option<Indicator> {
        self.plugins.get(name).map(|(indicator, _)| indicator.clone())
    }

    pub fn descriptor(&self, name: &str) -> Option<&PluginDescriptor> {
        self.plugins.get(name).map(|(_, descriptor)| descriptor)
    }

    /// Loaded plugins in registration order.
    pub fn list(&self) -> Vec<&PluginDescriptor> {
        self.order
            .iter()
            .filter_map(|name| self.descriptor(name))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    pub fn last_discovery(&self) -> &BTreeMap<String, PluginDescriptor> {
        &self.last_discovery
    }
}

fn check_contract(plugin: &dyn IndicatorPlugin) -> Result<(), PluginLoadError> {
    for (field, value) in [
        ("name", plugin.name()),
        ("version", plugin.version()),
        ("description", plugin.description()),
        ("author", plugin.author()),
    ] {
        if value.trim().is_empty() {
            return Err(PluginLoadError::EmptyIdentity { field });
        }
    }

    let version = plugin.version();
    let parts: Vec<&str> = version.split('.').collect();
    let numeric = parts
        .iter()
        .all(|part| !part.is_empty() && part.bytes().all(|byte| byte.is_ascii_digit()));
    if parts.len() > 3 || !numeric {
        return Err(PluginLoadError::InvalidVersion {
            version: version.to_owned(),
        });
    }

    let definitions = plugin.parameter_definitions();
    for (index, definition) in definitions.iter().enumerate() {
        if definitions[..index]
            .iter()
            .any(|earlier| earlier.name == definition.name)
        {
            return Err(PluginLoadError::DuplicateParameter {
                parameter: definition.name.clone(),
            });
        }
        definition
            .check(&definition.default)
            .map_err(|reason| PluginLoadError::InvalidDefault {
                parameter: definition.name.clone(),
                reason,
            })?;
    }

    let params = ResolvedParams::defaults(&definitions).map_err(|reason| {
        PluginLoadError::Construction {
            detail: reason.to_string(),
        }
    })?;
    for directive in plugin.describe_outputs(&params) {
        directive.validate()?;
    }
    Ok(())
}
