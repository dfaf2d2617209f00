//! Runtime error taxonomy
//!
//! Every fallible manager operation returns [`PluginError`]. Variants carry
//! the plugin name and the failing dependency, hook or cycle so callers can
//! render an actionable message; [`PluginError::kind`] collapses them onto a
//! small set of categories for outer layers that only need to branch.

use std::fmt;
use std::time::Duration;

use hotswap_plugin_api::HookError;
use thiserror::Error;

use crate::plugin::lifecycle::PluginState;
use crate::resolver::DependencyError;
use crate::version::VersionError;

/// Result type for lifecycle operations
pub type PluginResult<T> = Result<T, PluginError>;

/// Lifecycle hook or plugin call the runtime invokes under isolation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleHook {
    /// Factory call producing a fresh instance
    Construct,
    OnLoad,
    OnUnload,
    GetState,
    RestoreState,
    Process,
}

impl fmt::Display for LifecycleHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleHook::Construct => write!(f, "construct"),
            LifecycleHook::OnLoad => write!(f, "on_load"),
            LifecycleHook::OnUnload => write!(f, "on_unload"),
            LifecycleHook::GetState => write!(f, "get_state"),
            LifecycleHook::RestoreState => write!(f, "restore_state"),
            LifecycleHook::Process => write!(f, "process"),
        }
    }
}

/// How a single hook call failed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HookFailure {
    /// The hook returned an error
    #[error("{hook} failed: {source}")]
    Error {
        hook: LifecycleHook,
        #[source]
        source: HookError,
    },

    /// The hook panicked; the panic was caught
    #[error("{hook} panicked: {message}")]
    Panic { hook: LifecycleHook, message: String },

    /// The hook did not finish within its allotted time
    #[error("{hook} timed out after {}ms", .timeout.as_millis())]
    Timeout {
        hook: LifecycleHook,
        timeout: Duration,
    },
}

impl HookFailure {
    /// The hook that failed
    pub fn hook(&self) -> LifecycleHook {
        match self {
            HookFailure::Error { hook, .. }
            | HookFailure::Panic { hook, .. }
            | HookFailure::Timeout { hook, .. } => *hook,
        }
    }

    /// Check if the failure was a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, HookFailure::Timeout { .. })
    }
}

/// Error categories exposed to API layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidVersionFormat,
    InvalidConstraintFormat,
    MissingDependency,
    VersionConflict,
    CircularDependency,
    Load,
    Reload,
    RollbackFailed,
    DependentPluginsActive,
    HookTimeout,
    NotFound,
    AlreadyInstalled,
    InvalidState,
    HostIncompatible,
    Configuration,
    Unload,
    Invocation,
}

/// Plugin runtime error
#[derive(Debug, Clone, Error)]
pub enum PluginError {
    // ─────────────────────────────────────────────────────────────────────────
    // Input and lookup errors
    // ─────────────────────────────────────────────────────────────────────────
    /// Malformed version or constraint
    #[error(transparent)]
    InvalidVersion(#[from] VersionError),

    /// No installed or registered plugin with this name
    #[error("plugin '{0}' not found")]
    NotFound(String),

    /// A descriptor with this name is already installed
    #[error("plugin '{0}' is already installed")]
    AlreadyInstalled(String),

    /// The operation is not allowed in the plugin's current state
    #[error("cannot {operation} plugin '{plugin}' while it is {state}")]
    InvalidState {
        plugin: String,
        state: PluginState,
        operation: &'static str,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Resolution errors
    // ─────────────────────────────────────────────────────────────────────────
    /// Missing dependency, version conflict or cycle
    #[error("plugin '{plugin}' has unresolved dependencies: {}", describe_all(.errors))]
    Dependency {
        plugin: String,
        errors: Vec<DependencyError>,
    },

    /// The descriptor's host requirement rejects this runtime
    #[error("plugin '{plugin}' requires runtime {requirement}, running {host}")]
    HostIncompatible {
        plugin: String,
        requirement: semver::VersionReq,
        host: semver::Version,
    },

    /// A dependency is installed and satisfied but has no live instance
    #[error("plugin '{plugin}' needs '{dependency}' to be active, but it is {state}")]
    DependencyInactive {
        plugin: String,
        dependency: String,
        state: PluginState,
    },

    /// The config validator rejected the plugin's settings
    #[error("configuration rejected for plugin '{plugin}': {}", .errors.join("; "))]
    Configuration { plugin: String, errors: Vec<String> },

    /// The registry has a descriptor but no way to construct an instance
    #[error("no factory registered for plugin '{0}'")]
    FactoryMissing(String),

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle errors
    // ─────────────────────────────────────────────────────────────────────────
    /// Construction or `on_load` failed
    #[error("failed to load plugin '{plugin}': {source}")]
    Load {
        plugin: String,
        #[source]
        source: HookFailure,
    },

    /// A lifecycle hook exceeded the configured hook timeout
    #[error("plugin '{plugin}': {hook} exceeded {}ms", .timeout.as_millis())]
    HookTimeout {
        plugin: String,
        hook: LifecycleHook,
        timeout: Duration,
    },

    /// A whole reload exceeded the configured reload timeout
    #[error("reload of plugin '{plugin}' did not finish within {}ms", .timeout.as_millis())]
    ReloadTimeout { plugin: String, timeout: Duration },

    /// `get_state` failed before a reload; nothing was changed
    #[error("failed to snapshot plugin '{plugin}': {source}")]
    Snapshot {
        plugin: String,
        #[source]
        source: HookFailure,
    },

    /// A reload step failed and the previous instance was restored
    #[error("reload of plugin '{plugin}' failed and was rolled back: {cause}")]
    Reload {
        plugin: String,
        #[source]
        cause: Box<PluginError>,
    },

    /// A reload failed and the previous instance could not be restored
    #[error("rollback of plugin '{plugin}' failed ({rollback}) after: {cause}")]
    RollbackFailed {
        plugin: String,
        cause: Box<PluginError>,
        #[source]
        rollback: HookFailure,
    },

    /// Unload refused because active plugins still depend on this one
    #[error("cannot unload plugin '{plugin}': still required by {}", .dependents.join(", "))]
    DependentPluginsActive {
        plugin: String,
        dependents: Vec<String>,
    },

    /// `on_unload` failed; the instance was dropped anyway
    #[error("plugin '{plugin}' failed to unload: {source}")]
    Unload {
        plugin: String,
        #[source]
        source: HookFailure,
    },

    /// `process` failed
    #[error("plugin '{plugin}' failed to process payload: {source}")]
    Invocation {
        plugin: String,
        #[source]
        source: HookFailure,
    },
}

fn describe_all(errors: &[DependencyError]) -> String {
    errors
        .iter()
        .map(DependencyError::description)
        .collect::<Vec<_>>()
        .join("; ")
}

impl PluginError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            PluginError::InvalidVersion(VersionError::InvalidVersionFormat(_)) => {
                ErrorKind::InvalidVersionFormat
            }
            PluginError::InvalidVersion(VersionError::InvalidConstraintFormat { .. }) => {
                ErrorKind::InvalidConstraintFormat
            }
            PluginError::NotFound(_) => ErrorKind::NotFound,
            PluginError::AlreadyInstalled(_) => ErrorKind::AlreadyInstalled,
            PluginError::InvalidState { .. } => ErrorKind::InvalidState,
            PluginError::Dependency { errors, .. } => errors
                .first()
                .map(DependencyError::kind)
                .unwrap_or(ErrorKind::MissingDependency),
            PluginError::DependencyInactive { .. } => ErrorKind::MissingDependency,
            PluginError::HostIncompatible { .. } => ErrorKind::HostIncompatible,
            PluginError::Configuration { .. } => ErrorKind::Configuration,
            PluginError::FactoryMissing(_) | PluginError::Load { .. } => ErrorKind::Load,
            PluginError::HookTimeout { .. } | PluginError::ReloadTimeout { .. } => {
                ErrorKind::HookTimeout
            }
            PluginError::Snapshot { .. } | PluginError::Reload { .. } => ErrorKind::Reload,
            PluginError::RollbackFailed { .. } => ErrorKind::RollbackFailed,
            PluginError::DependentPluginsActive { .. } => ErrorKind::DependentPluginsActive,
            PluginError::Unload { .. } => ErrorKind::Unload,
            PluginError::Invocation { .. } => ErrorKind::Invocation,
        }
    }

    /// Convert a failed construct or `on_load` call into a load error.
    /// Timeouts keep their own category.
    pub(crate) fn load(plugin: &str, failure: HookFailure) -> Self {
        match failure {
            HookFailure::Timeout { hook, timeout } => PluginError::HookTimeout {
                plugin: plugin.to_string(),
                hook,
                timeout,
            },
            source => PluginError::Load {
                plugin: plugin.to_string(),
                source,
            },
        }
    }

    /// The error that caused a reload to be rolled back
    pub fn reload_cause(&self) -> Option<&PluginError> {
        match self {
            PluginError::Reload { cause, .. } | PluginError::RollbackFailed { cause, .. } => {
                Some(cause)
            }
            _ => None,
        }
    }
}
