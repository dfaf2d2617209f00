//! Dependency resolution error types

use thiserror::Error;

use crate::errors::ErrorKind;
use crate::version::{Constraint, Version};

/// One reason a plugin set cannot be resolved
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DependencyError {
    /// A declared dependency is not installed
    #[error("plugin '{plugin}' requires {dependency} {constraint}, which is not installed")]
    Missing {
        plugin: String,
        dependency: String,
        constraint: Constraint,
    },

    /// The installed dependency does not satisfy the declared constraint
    #[error("plugin '{plugin}' requires {dependency} {constraint}, but {installed} is installed")]
    VersionConflict {
        plugin: String,
        dependency: String,
        constraint: Constraint,
        installed: Version,
    },

    /// The dependency edges loop back on themselves
    #[error("circular dependency: {}", render_cycle(.cycle))]
    Circular {
        /// Plugins forming the cycle, in edge order, starting from the
        /// lexically first plugin the search reached
        cycle: Vec<String>,
    },
}

impl DependencyError {
    /// Short, dependency-centric rendering used in check reports:
    /// `A >=2.0.0 (installed 1.0.0)`, `A >=1.0.0 (not installed)`, `X -> Y -> X`
    pub fn description(&self) -> String {
        match self {
            DependencyError::Missing {
                dependency,
                constraint,
                ..
            } => format!("{dependency} {constraint} (not installed)"),
            DependencyError::VersionConflict {
                dependency,
                constraint,
                installed,
                ..
            } => format!("{dependency} {constraint} (installed {installed})"),
            DependencyError::Circular { cycle } => render_cycle(cycle),
        }
    }

    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            DependencyError::Missing { .. } => ErrorKind::MissingDependency,
            DependencyError::VersionConflict { .. } => ErrorKind::VersionConflict,
            DependencyError::Circular { .. } => ErrorKind::CircularDependency,
        }
    }

    /// The plugin whose declaration caused the error (`None` for cycles)
    pub fn plugin(&self) -> Option<&str> {
        match self {
            DependencyError::Missing { plugin, .. }
            | DependencyError::VersionConflict { plugin, .. } => Some(plugin),
            DependencyError::Circular { .. } => None,
        }
    }
}

fn render_cycle(cycle: &[String]) -> String {
    let mut path = cycle.join(" -> ");
    if let Some(first) = cycle.first() {
        path.push_str(" -> ");
        path.push_str(first);
    }
    path
}
