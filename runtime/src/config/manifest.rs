use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;

use super::ConfigError;
use crate::plugin::metadata::PluginDescriptor;

/// A YAML list of plugin descriptors, used by the operator binary to
/// inspect an installation offline
///
/// # Example YAML structure
/// ```yaml
/// plugins:
///   - name: storage
///     version: 2.1.0
///   - name: reporter
///     version: 1.0.0
///     dependencies:
///       - name: storage
///         constraint: "~2.1.0"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Manifest {
    #[serde(default)]
    pub plugins: Vec<PluginDescriptor>,
}

impl Manifest {
    /// Load a manifest from a file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }

    /// Parse a manifest, rejecting duplicate plugin names
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let manifest: Manifest = serde_yaml::from_str(contents).map_err(ConfigError::Parse)?;

        let mut seen = BTreeSet::new();
        for descriptor in &manifest.plugins {
            if !seen.insert(descriptor.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "plugin '{}' is listed more than once in the manifest",
                    descriptor.name
                )));
            }
        }

        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_manifest() {
        let manifest = Manifest::parse(
            r#"
plugins:
  - name: A
    version: 1.0.0
  - name: B
    version: 1.0.0
    dependencies:
      - name: A
        constraint: ">=1.0.0"
"#,
        )
        .unwrap();
        assert_eq!(manifest.plugins.len(), 2);
        assert!(manifest.plugins[1].depends_on_plugin("A"));
    }

    #[test]
    fn test_manifest_rejects_bad_versions() {
        let err = Manifest::parse("plugins:\n  - name: A\n    version: one\n").unwrap_err();
        assert!(err.to_string().contains("invalid version format"));
    }

    #[test]
    fn test_manifest_rejects_duplicates() {
        let err = Manifest::parse(
            "plugins:\n  - {name: A, version: 1.0.0}\n  - {name: A, version: 2.0.0}\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
