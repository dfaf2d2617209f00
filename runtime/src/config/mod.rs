//! Configuration module for the hotswap runtime
//!
//! This module loads runtime configuration from various sources: .env files,
//! YAML files, and environment variables. Priority: YAML > ENV vars > .env
//! values > defaults. The `.env` file itself is loaded by the binary at
//! startup.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `manifest`: YAML descriptor lists for offline inspection
//!
//! # Example
//! ```rust,no_run
//! use hotswap_runtime::config::RuntimeConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = RuntimeConfig::from_env()?;
//!
//! // Load from YAML file with environment variable fallbacks
//! let config = RuntimeConfig::from_file(&PathBuf::from("hotswap.yaml"))?;
//! println!("hook timeout: {:?}", config.hook_timeout);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod manifest;
mod yaml;

pub use manifest::Manifest;
pub use yaml::YamlConfig;

/// Default upper bound for a single lifecycle hook
pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(5);

/// Default upper bound for a whole reload
pub const DEFAULT_RELOAD_TIMEOUT: Duration = Duration::from_secs(30);

const ENV_HOOK_TIMEOUT: &str = "HOTSWAP_HOOK_TIMEOUT_MS";
const ENV_RELOAD_TIMEOUT: &str = "HOTSWAP_RELOAD_TIMEOUT_MS";
const ENV_MANIFEST: &str = "HOTSWAP_MANIFEST";
const ENV_AUTOLOAD: &str = "HOTSWAP_AUTOLOAD";

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML config: {0}")]
    Parse(#[source] serde_yaml::Error),

    #[error("Invalid value for {var}: '{value}' (expected milliseconds)")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Runtime configuration
///
/// Controls lifecycle timeouts, which plugins the binary loads at startup
/// and the raw settings handed to each plugin.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// Upper bound for each lifecycle hook call
    pub hook_timeout: Duration,

    /// Upper bound for a whole reload; exceeding it rolls the reload back
    pub reload_timeout: Duration,

    /// YAML descriptor list to inspect or install (optional)
    pub manifest_path: Option<PathBuf>,

    /// Plugins to load at startup, in the given order
    pub autoload: Vec<String>,

    /// Raw settings per plugin name; never interpreted by the runtime
    pub plugin_settings: HashMap<String, serde_json::Value>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            hook_timeout: DEFAULT_HOOK_TIMEOUT,
            reload_timeout: DEFAULT_RELOAD_TIMEOUT,
            manifest_path: None,
            autoload: Vec::new(),
            plugin_settings: HashMap::new(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if a variable is present but malformed, or the
    /// resulting configuration fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::env_layer()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file, falling back to environment
    /// variables for anything the file leaves out
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let yaml = YamlConfig::from_file(path)?;
        let mut config = Self::env_layer()?;
        config.apply_yaml(yaml);
        config.validate()?;
        Ok(config)
    }

    fn env_layer() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(ms) = env_millis(ENV_HOOK_TIMEOUT)? {
            config.hook_timeout = ms;
        }
        if let Some(ms) = env_millis(ENV_RELOAD_TIMEOUT)? {
            config.reload_timeout = ms;
        }
        if let Ok(path) = env::var(ENV_MANIFEST) {
            if !path.trim().is_empty() {
                config.manifest_path = Some(PathBuf::from(path.trim()));
            }
        }
        if let Ok(list) = env::var(ENV_AUTOLOAD) {
            config.autoload = parse_name_list(&list);
        }

        Ok(config)
    }

    fn apply_yaml(&mut self, yaml: YamlConfig) {
        if let Some(runtime) = yaml.runtime {
            if let Some(ms) = runtime.hook_timeout_ms {
                self.hook_timeout = Duration::from_millis(ms);
            }
            if let Some(ms) = runtime.reload_timeout_ms {
                self.reload_timeout = Duration::from_millis(ms);
            }
        }
        if let Some(plugins) = yaml.plugins {
            if let Some(path) = plugins.manifest {
                self.manifest_path = Some(PathBuf::from(path));
            }
            if let Some(autoload) = plugins.autoload {
                self.autoload = autoload;
            }
            if let Some(settings) = plugins.settings {
                self.plugin_settings = settings;
            }
        }
    }

    /// Check timeouts for consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hook_timeout.is_zero() {
            return Err(ConfigError::Invalid("hook timeout must be greater than zero".into()));
        }
        if self.reload_timeout.is_zero() {
            return Err(ConfigError::Invalid("reload timeout must be greater than zero".into()));
        }
        if self.reload_timeout < self.hook_timeout {
            return Err(ConfigError::Invalid(format!(
                "reload timeout ({}ms) is shorter than the hook timeout ({}ms)",
                self.reload_timeout.as_millis(),
                self.hook_timeout.as_millis()
            )));
        }
        Ok(())
    }

    /// Raw settings for a plugin (`Null` when none are configured)
    pub fn settings_for(&self, name: &str) -> serde_json::Value {
        self.plugin_settings
            .get(name)
            .cloned()
            .unwrap_or(serde_json::Value::Null)
    }

    /// Set the hook timeout
    pub fn with_hook_timeout(mut self, timeout: Duration) -> Self {
        self.hook_timeout = timeout;
        self
    }

    /// Set the reload timeout
    pub fn with_reload_timeout(mut self, timeout: Duration) -> Self {
        self.reload_timeout = timeout;
        self
    }

    /// Set the raw settings of one plugin
    pub fn with_plugin_settings(mut self, name: impl Into<String>, settings: serde_json::Value) -> Self {
        self.plugin_settings.insert(name.into(), settings);
        self
    }
}

fn env_millis(var: &'static str) -> Result<Option<Duration>, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|_| ConfigError::InvalidEnv { var, value }),
        Err(_) => Ok(None),
    }
}

fn parse_name_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
