//! Plugin registration, descriptors and isolation
//!
//! This module holds everything the lifecycle manager needs to know about a
//! plugin besides its live instance:
//!
//! - [`metadata`]: immutable descriptors (name, version, dependencies)
//! - [`registry`]: the registration table mapping names to descriptors and
//!   factories, filled at link time through `inventory`
//! - [`lifecycle`]: per-plugin state machine bookkeeping
//! - [`isolation`]: panic catching and timeouts around plugin calls
//! - [`builtin`]: plugins shipped with the runtime
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Plugin Registration                          │
//! │  register_plugin! ──▶ inventory ──▶ InMemoryRegistry (DashMap)   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Writing a Plugin
//!
//! ```ignore
//! use hotswap_runtime::plugin::prelude::*;
//!
//! #[derive(Default)]
//! pub struct Greeter;
//!
//! #[async_trait]
//! impl Plugin for Greeter {
//!     async fn on_load(&self, _ctx: &PluginContext) -> Result<(), HookError> {
//!         Ok(())
//!     }
//!
//!     async fn process(&self, payload: Value) -> Result<Value, HookError> {
//!         Ok(payload)
//!     }
//! }
//! ```

#[macro_use]
pub mod macros;
pub mod builtin;
pub mod isolation;
pub mod lifecycle;
pub mod metadata;
pub mod registry;

// Re-exports for convenience
pub use isolation::{call_hook, call_hook_sync};
pub use lifecycle::{PluginEntry, PluginState};
pub use metadata::{PluginDependency, PluginDescriptor};
pub use registry::{InMemoryRegistry, PluginConstructor, PluginFactoryFn, PluginRegistry};

/// Prelude module for convenient imports
///
/// Use this for plugin development:
/// ```ignore
/// use hotswap_runtime::plugin::prelude::*;
/// ```
pub mod prelude {
    pub use super::metadata::{PluginDependency, PluginDescriptor};
    pub use super::registry::{InMemoryRegistry, PluginConstructor, PluginFactoryFn, PluginRegistry};
    pub use crate::version::{Constraint, Op, Version};

    // Plugin contract
    pub use hotswap_plugin_api::{HookError, Plugin, PluginContext, Value, async_trait};

    // Re-export commonly needed external crates
    pub use inventory;
    pub use std::sync::Arc;
}
