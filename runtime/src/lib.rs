pub mod config;
pub mod errors;
pub mod manager;
pub mod plugin;
pub mod resolver;
pub mod version;

// Re-export commonly used items for convenience
pub use config::RuntimeConfig;
pub use errors::{ErrorKind, HookFailure, LifecycleHook, PluginError, PluginResult};
pub use manager::{LiveInstance, PluginInfo, PluginManager, PluginMetrics};
pub use plugin::{InMemoryRegistry, PluginDescriptor, PluginRegistry, PluginState};
pub use resolver::{DependencyError, Resolution, Resolver};
pub use version::{Constraint, Version};
