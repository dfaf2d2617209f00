//! # Hotswap Plugin API
//!
//! This crate defines the contract between the Hotswap runtime and the
//! plugins it hosts. Plugin authors depend on this crate only; everything
//! about dependency resolution, state machines and instance swapping lives in
//! the runtime.
//!
//! # Lifecycle Contract
//!
//! Every plugin implements four lifecycle hooks plus one business method:
//!
//! - `on_load` is called once after construction, before the instance is
//!   published to callers.
//! - `on_unload` is called before the instance is retired (unload or reload).
//! - `get_state` returns an opaque snapshot, taken right before a reload.
//! - `restore_state` receives that snapshot on the replacement instance.
//! - `process` is the business entry point called by host workers.
//!
//! The runtime may call the hooks in these sequences:
//!
//! ```text
//! load:    construct -> on_load
//! reload:  get_state -> on_unload -> construct(new) -> on_load(new) -> restore_state(new)
//! rollback after a failed reload: on_load(old) -> restore_state(old)   (once on_unload(old) was entered)
//! unload:  on_unload
//! ```
//!
//! All hooks take `&self`: an instance is shared between the runtime and any
//! number of in-flight callers, so plugins keep mutable state behind their own
//! synchronization. Hooks must be safe to call again in the sequences above.
//!
//! # Example Plugin
//!
//! ```rust,ignore
//! use hotswap_plugin_api::*;
//!
//! struct Greeter;
//!
//! #[async_trait]
//! impl Plugin for Greeter {
//!     async fn on_load(&self, ctx: &PluginContext) -> Result<(), HookError> {
//!         let _ = ctx.setting("greeting");
//!         Ok(())
//!     }
//!
//!     async fn process(&self, payload: Value) -> Result<Value, HookError> {
//!         Ok(serde_json::json!({ "hello": payload }))
//!     }
//! }
//! ```

use std::collections::BTreeMap;

// =============================================================================
// Re-exports for plugin developers
// =============================================================================

pub use async_trait::async_trait;
pub use serde_json::Value;

// =============================================================================
// Hook Errors
// =============================================================================

/// Error returned by a plugin hook or business method.
///
/// The runtime never inspects the message beyond logging and surfacing it;
/// the variant only helps operators tell configuration problems from bugs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HookError {
    /// The hook could not complete its work
    #[error("{0}")]
    Failed(String),

    /// The plugin rejected its configuration
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A state snapshot could not be produced or applied
    #[error("invalid state: {0}")]
    State(String),

    /// The payload handed to `process` was not understood
    #[error("invalid payload: {0}")]
    Payload(String),
}

impl HookError {
    /// Shorthand for [`HookError::Failed`]
    pub fn failed(msg: impl Into<String>) -> Self {
        HookError::Failed(msg.into())
    }

    /// Shorthand for [`HookError::State`]
    pub fn state(msg: impl Into<String>) -> Self {
        HookError::State(msg.into())
    }
}

impl From<serde_json::Error> for HookError {
    fn from(e: serde_json::Error) -> Self {
        HookError::State(e.to_string())
    }
}

// =============================================================================
// Plugin Context
// =============================================================================

/// Context handed to [`Plugin::on_load`]
#[derive(Debug, Clone)]
pub struct PluginContext {
    /// Name of the plugin being loaded
    pub plugin_name: String,

    /// Version of the descriptor being loaded (e.g. "1.2.0")
    pub version: String,

    /// Raw plugin settings, already accepted by the host's config validator
    pub config: Value,

    /// Versions of the plugin's direct dependencies, all active at this point
    pub dependencies: BTreeMap<String, String>,
}

impl PluginContext {
    /// Create a new context
    pub fn new(plugin_name: impl Into<String>, version: impl Into<String>, config: Value) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            version: version.into(),
            config,
            dependencies: BTreeMap::new(),
        }
    }

    /// Attach the resolved versions of the direct dependencies
    pub fn with_dependencies(mut self, dependencies: BTreeMap<String, String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Look up a top-level setting in the raw config object
    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.config.as_object().and_then(|obj| obj.get(key))
    }
}

// =============================================================================
// Plugin Trait
// =============================================================================

/// The implementation contract every hot-reloadable plugin fulfils.
///
/// Only `on_load` and `process` are required; the remaining hooks default to
/// stateless no-ops.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Initialize the instance. Returning an error keeps the instance from
    /// ever being published.
    async fn on_load(&self, ctx: &PluginContext) -> Result<(), HookError>;

    /// Release resources before the instance is retired.
    async fn on_unload(&self) -> Result<(), HookError> {
        Ok(())
    }

    /// Capture the instance state as an opaque blob.
    async fn get_state(&self) -> Result<Vec<u8>, HookError> {
        Ok(Vec::new())
    }

    /// Apply a blob previously produced by `get_state`, possibly by an older
    /// implementation of the same plugin.
    async fn restore_state(&self, state: &[u8]) -> Result<(), HookError> {
        let _ = state;
        Ok(())
    }

    /// Business entry point invoked by host workers.
    async fn process(&self, payload: Value) -> Result<Value, HookError>;
}

// =============================================================================
// Tests
// =============================================================================
