//! Global configuration and the three-tier settings waterfall.
//!
//! Resolution order is fixed:
//!
//! 1. [`AppConfig`] defaults, flattened to a map.
//! 2. The protocol override map, applied where its values are non-null.
//! 3. Call-site overrides, applied where non-null. These always win.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, StreamError};

/// Flat settings map handed to adapters. `Null` means "defer to the tier below".
pub type Settings = IndexMap<String, Value>;

/// Builds a [`Settings`] map from `key => value` pairs.
///
/// ```
/// use streamflow_core::settings;
///
/// let overrides = settings! { "chunk_size" => 8192, "use_lines" => true };
/// assert_eq!(overrides["chunk_size"], 8192);
/// ```
#[macro_export]
macro_rules! settings {
    () => { $crate::Settings::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::Settings::new();
        $(
            map.insert(
                ::std::string::String::from($key),
                $crate::__serde_json::Value::from($value),
            );
        )+
        map
    }};
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development.
    #[default]
    Dev,
    /// Production.
    Prod,
    /// Test runs.
    Test,
}

/// Log verbosity requested by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Normal lifecycle logging.
    #[default]
    Info,
    /// Silence.
    None,
}

/// Tier 1 configuration for the whole engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Deployment environment.
    pub env: Environment,
    /// Log verbosity.
    pub log_level: LogLevel,
    /// Default block size for every adapter.
    pub chunk_size: usize,
    /// Whether telemetry middlewares should be installed.
    pub enable_telemetry: bool,
    /// Anchor key to base directory, used to build the file policy.
    #[serde(skip_serializing)]
    pub anchors: IndexMap<String, PathBuf>,
    /// Tier 2 override tables keyed by protocol scheme.
    #[serde(skip_serializing)]
    pub protocols: HashMap<String, Settings>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            env: Environment::Dev,
            log_level: LogLevel::Info,
            chunk_size: 1024,
            enable_telemetry: true,
            anchors: IndexMap::new(),
            protocols: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Configuration`] if the document is malformed.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| StreamError::config("AppConfig", e.to_string()))?;
        if config.chunk_size == 0 {
            return Err(StreamError::config("AppConfig", "chunk_size must be > 0"));
        }
        Ok(config)
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read, or a configuration
    /// error if it does not parse.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let source = fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Tier 1 as a flat map.
    #[must_use]
    pub fn to_settings(&self) -> Settings {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map.into_iter().collect(),
            _ => Settings::new(),
        }
    }
}

/// Pure waterfall merge of the three tiers.
#[must_use]
pub fn resolve(global: &AppConfig, protocol: Option<&Settings>, call: &Settings) -> Settings {
    let mut merged = global.to_settings();
    for tier in protocol.into_iter().chain(std::iter::once(call)) {
        for (key, value) in tier {
            if !value.is_null() {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    merged
}

/// Holds Tier 1 and the Tier 2 tables, and resolves per call.
#[derive(Debug, Clone, Default)]
pub struct SettingsResolver {
    global: AppConfig,
    protocols: HashMap<String, Settings>,
}

impl SettingsResolver {
    /// Builds a resolver; Tier 2 tables are taken from `global.protocols`.
    #[must_use]
    pub fn new(global: AppConfig) -> Self {
        let protocols = global
            .protocols
            .iter()
            .map(|(scheme, table)| (scheme.to_ascii_lowercase(), table.clone()))
            .collect();
        Self { global, protocols }
    }

    /// Replaces the Tier 2 table for `protocol`.
    pub fn configure_protocol(&mut self, protocol: &str, overrides: Settings) {
        self.protocols
            .insert(protocol.to_ascii_lowercase(), overrides);
    }

    /// Replaces the Tier 2 table for `protocol` with a typed record.
    ///
    /// `None` fields serialize to null and therefore defer to Tier 1.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Configuration`] if `overrides` is not a map-like record.
    pub fn configure_protocol_with<T: Serialize>(
        &mut self,
        protocol: &str,
        overrides: &T,
    ) -> Result<()> {
        match serde_json::to_value(overrides) {
            Ok(Value::Object(map)) => {
                self.configure_protocol(protocol, map.into_iter().collect());
                Ok(())
            }
            Ok(other) => Err(StreamError::config(
                "SettingsResolver",
                format!("protocol overrides for '{protocol}' must be a record, got {other}"),
            )),
            Err(e) => Err(StreamError::config("SettingsResolver", e.to_string())),
        }
    }

    /// Tier 1 configuration.
    #[must_use]
    pub fn global(&self) -> &AppConfig {
        &self.global
    }

    /// Merged settings for a call against `protocol`.
    #[must_use]
    pub fn resolve(&self, protocol: &str, call: &Settings) -> Settings {
        let tier2 = self.protocols.get(&protocol.to_ascii_lowercase());
        resolve(&self.global, tier2, call)
    }
}
