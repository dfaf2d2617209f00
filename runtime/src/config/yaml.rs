use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use super::ConfigError;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present
/// here override the environment.
///
/// # Example YAML structure
/// ```yaml
/// runtime:
///   hook_timeout_ms: 5000
///   reload_timeout_ms: 30000
///
/// plugins:
///   manifest: "/etc/hotswap/plugins.yaml"
///   autoload:
///     - echo
///     - counter
///   settings:
///     counter:
///       step: 2
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub runtime: Option<RuntimeYaml>,
    pub plugins: Option<PluginsYaml>,
}

/// Lifecycle timeouts from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RuntimeYaml {
    pub hook_timeout_ms: Option<u64>,
    pub reload_timeout_ms: Option<u64>,
}

/// Plugin selection and settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PluginsYaml {
    pub manifest: Option<String>,
    pub autoload: Option<Vec<String>>,
    /// Raw per-plugin settings, handed to the config validator untouched
    pub settings: Option<HashMap<String, serde_json::Value>>,
}

impl YamlConfig {
    /// Load YAML configuration from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    /// Parse YAML configuration from a string
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(contents).map_err(ConfigError::Parse)
    }
}
