//! Plugin Lifecycle State
//!
//! This module defines the per-plugin lifecycle states and the bookkeeping
//! entry the manager keeps for every installed plugin.
//!
//! # Lifecycle State Machine
//!
//! ```text
//!     +-----------+   load    +---------+   ok    +--------+
//!     | Unloaded  | --------> | Loading | ------> | Active | <----+
//!     +-----------+           +---------+         +--------+      |
//!          ^                       | error          |    |        | ok / rolled back
//!          |                       v                |    v        |
//!          |   unload         +--------+   load     |  +-----------+
//!          +----------------- | Failed | <----------+--| Reloading |
//!          (from Active)      +--------+  rollback     +-----------+
//!                                         failed
//! ```

use std::time::{Duration, Instant};

/// Plugin lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginState {
    /// Installed but no live instance
    Unloaded,

    /// Constructing the instance and running `on_load`
    Loading,

    /// Live instance published and callable
    Active,

    /// Hot reload in progress; the previous instance stays callable
    Reloading,

    /// Load or rollback failed; needs an operator `load` to retry
    Failed,
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginState::Unloaded => write!(f, "unloaded"),
            PluginState::Loading => write!(f, "loading"),
            PluginState::Active => write!(f, "active"),
            PluginState::Reloading => write!(f, "reloading"),
            PluginState::Failed => write!(f, "failed"),
        }
    }
}

impl PluginState {
    /// Check if the plugin has a callable instance
    pub fn is_active(&self) -> bool {
        matches!(self, PluginState::Active | PluginState::Reloading)
    }

    /// Check if the plugin can be loaded
    pub fn can_load(&self) -> bool {
        matches!(self, PluginState::Unloaded | PluginState::Failed)
    }

    /// Check if the plugin can be hot reloaded
    pub fn can_reload(&self) -> bool {
        matches!(self, PluginState::Active)
    }

    /// Check if the plugin can be unloaded
    pub fn can_unload(&self) -> bool {
        matches!(self, PluginState::Active)
    }

    /// Check if the plugin can be uninstalled
    pub fn can_uninstall(&self) -> bool {
        matches!(self, PluginState::Unloaded | PluginState::Failed)
    }
}

/// Lifecycle bookkeeping for one installed plugin
#[derive(Debug)]
pub struct PluginEntry {
    /// Current plugin state
    pub state: PluginState,

    /// Time the current instance went live
    pub loaded_at: Option<Instant>,

    /// Successful reloads since install
    pub reload_count: u64,

    /// Reloads that were rolled back
    pub rollback_count: u64,

    /// Last lifecycle error message (if any)
    pub last_error: Option<String>,
}

impl PluginEntry {
    /// Create a new entry for a freshly installed plugin
    pub fn new() -> Self {
        Self {
            state: PluginState::Unloaded,
            loaded_at: None,
            reload_count: 0,
            rollback_count: 0,
            last_error: None,
        }
    }

    /// Transition to a new state
    pub fn transition(&mut self, plugin: &str, new_state: PluginState) {
        tracing::debug!(
            plugin = %plugin,
            from = %self.state,
            to = %new_state,
            "Plugin state transition"
        );
        match new_state {
            PluginState::Active if self.state != PluginState::Reloading => {
                self.loaded_at = Some(Instant::now());
            }
            PluginState::Unloaded | PluginState::Failed => self.loaded_at = None,
            _ => {}
        }
        self.state = new_state;
    }

    /// Record a lifecycle error
    pub fn record_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }

    /// Get uptime of the current instance
    pub fn uptime(&self) -> Duration {
        self.loaded_at.map(|t| t.elapsed()).unwrap_or_default()
    }
}

impl Default for PluginEntry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_state_display() {
        assert_eq!(format!("{}", PluginState::Active), "active");
        assert_eq!(format!("{}", PluginState::Failed), "failed");
        assert_eq!(format!("{}", PluginState::Reloading), "reloading");
    }

    #[test]
    fn test_plugin_state_guards() {
        assert!(PluginState::Unloaded.can_load());
        assert!(PluginState::Failed.can_load());
        assert!(!PluginState::Active.can_load());

        assert!(PluginState::Active.can_reload());
        assert!(!PluginState::Reloading.can_reload());
        assert!(!PluginState::Unloaded.can_unload());

        assert!(PluginState::Reloading.is_active());
        assert!(!PluginState::Loading.is_active());
        assert!(!PluginState::Active.can_uninstall());
    }

    #[test]
    fn test_plugin_entry() {
        let mut entry = PluginEntry::new();
        assert_eq!(entry.state, PluginState::Unloaded);
        assert_eq!(entry.uptime(), Duration::ZERO);

        entry.transition("p", PluginState::Loading);
        entry.transition("p", PluginState::Active);
        let loaded_at = entry.loaded_at;
        assert!(loaded_at.is_some());

        // A reload keeps the uptime of the plugin
        entry.transition("p", PluginState::Reloading);
        entry.transition("p", PluginState::Active);
        assert_eq!(entry.loaded_at, loaded_at);

        entry.record_error("test error");
        assert!(entry.last_error.as_ref().unwrap().contains("test error"));

        entry.transition("p", PluginState::Unloaded);
        assert!(entry.loaded_at.is_none());
    }
}
