//! Plugin Descriptors
//!
//! A descriptor is the immutable record the runtime knows about an installed
//! plugin: its unique name, its version and the ordered list of dependencies
//! it declares. A version bump produces a new descriptor; installed
//! descriptors are never edited in place.

use serde::{Deserialize, Serialize};

use crate::version::{Constraint, Version, VersionError};

/// Immutable metadata describing an installable plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    /// Unique plugin name (e.g., "counter")
    pub name: String,

    /// Version of this implementation
    pub version: Version,

    /// Declared dependencies, in declaration order
    #[serde(default)]
    pub dependencies: Vec<PluginDependency>,

    /// Brief description of the plugin
    #[serde(default)]
    pub description: String,

    /// Plugin author or organization
    #[serde(default)]
    pub author: String,

    /// Required runtime version (semver range); `None` accepts any host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_requirement: Option<semver::VersionReq>,
}

impl PluginDescriptor {
    /// Create a descriptor with no dependencies
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            dependencies: Vec::new(),
            description: String::new(),
            author: String::new(),
            host_requirement: None,
        }
    }

    /// Create a descriptor from a version string
    pub fn parse(name: impl Into<String>, version: &str) -> Result<Self, VersionError> {
        Ok(Self::new(name, Version::parse(version)?))
    }

    /// Declare a dependency with an already-parsed constraint
    pub fn depends_on(mut self, name: impl Into<String>, constraint: Constraint) -> Self {
        self.dependencies.push(PluginDependency {
            name: name.into(),
            constraint,
        });
        self
    }

    /// Declare a dependency from a constraint string (e.g. ">=1.0.0")
    pub fn with_dependency(
        self,
        name: impl Into<String>,
        constraint: &str,
    ) -> Result<Self, VersionError> {
        Ok(self.depends_on(name, Constraint::parse(constraint)?))
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the author
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// Require a runtime version range
    pub fn with_host_requirement(mut self, requirement: semver::VersionReq) -> Self {
        self.host_requirement = Some(requirement);
        self
    }

    /// Whether `host` satisfies the declared host requirement
    pub fn supports_host(&self, host: &semver::Version) -> bool {
        self.host_requirement
            .as_ref()
            .is_none_or(|req| req.matches(host))
    }

    /// Names of the declared dependencies, in declaration order
    pub fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.dependencies.iter().map(|d| d.name.as_str())
    }

    /// Whether this descriptor declares a dependency on `name`
    pub fn depends_on_plugin(&self, name: &str) -> bool {
        self.dependencies.iter().any(|d| d.name == name)
    }
}

/// A declared dependency: plugin name plus the required version range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDependency {
    /// Name of the required plugin
    pub name: String,

    /// Versions of that plugin this one accepts
    pub constraint: Constraint,
}

/// Version of this runtime, checked against descriptor host requirements
pub fn host_version() -> semver::Version {
    semver::Version::parse(env!("CARGO_PKG_VERSION")).unwrap_or(semver::Version::new(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_builder() {
        let descriptor = PluginDescriptor::parse("counter", "1.2.0")
            .unwrap()
            .with_dependency("echo", ">=1.0.0")
            .unwrap()
            .with_author("Platform Team")
            .with_description("Counts invocations");

        assert_eq!(descriptor.name, "counter");
        assert_eq!(descriptor.version, Version::new(1, 2, 0));
        assert_eq!(descriptor.dependency_names().collect::<Vec<_>>(), vec!["echo"]);
        assert!(descriptor.depends_on_plugin("echo"));
        assert!(!descriptor.depends_on_plugin("counter"));
        assert_eq!(descriptor.author, "Platform Team");
    }

    #[test]
    fn test_descriptor_rejects_bad_input() {
        assert!(PluginDescriptor::parse("bad", "1.0").is_err());
        let descriptor = PluginDescriptor::parse("ok", "1.0.0").unwrap();
        assert!(descriptor.with_dependency("dep", ">=one").is_err());
    }

    #[test]
    fn test_host_requirement() {
        let host = semver::Version::new(1, 4, 0);
        let descriptor = PluginDescriptor::new("p", Version::new(1, 0, 0));
        assert!(descriptor.supports_host(&host));

        let descriptor = descriptor.with_host_requirement(semver::VersionReq::parse(">=2.0.0").unwrap());
        assert!(!descriptor.supports_host(&host));
        assert!(descriptor.supports_host(&semver::Version::new(2, 1, 0)));
    }

    #[test]
    fn test_descriptor_yaml() {
        let yaml = r#"
name: reporter
version: 2.1.0
dependencies:
  - name: storage
    constraint: "~2.1.0"
  - name: echo
    constraint: "1.0.0"
host_requirement: ">=1.0.0"
"#;
        let descriptor: PluginDescriptor = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(descriptor.version, Version::new(2, 1, 0));
        assert_eq!(descriptor.dependencies.len(), 2);
        assert_eq!(descriptor.dependencies[1].constraint.to_string(), "==1.0.0");
        assert!(descriptor.host_requirement.is_some());
    }

    #[test]
    fn test_host_version_matches_package() {
        assert_eq!(host_version().to_string(), env!("CARGO_PKG_VERSION"));
    }
}
