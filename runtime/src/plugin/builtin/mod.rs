//! Built-in Plugin Registrations
//!
//! Plugins shipped with the runtime, registered through `register_plugin!`.
//!
//! - `echo` 1.0.0: returns its payload unchanged
//! - `counter` 1.0.0 (requires `echo >=1.0.0`): counts invocations and
//!   carries the count across hot reloads

mod counter;
mod echo;

pub use counter::Counter;
pub use echo::Echo;

use std::sync::Arc;

use hotswap_plugin_api::{HookError, Plugin};

use crate::plugin::metadata::PluginDescriptor;
use crate::version::{Constraint, Op, Version};

// ============================================================================
// Descriptor Functions
// ============================================================================

fn echo_descriptor() -> PluginDescriptor {
    PluginDescriptor::new("echo", Version::new(1, 0, 0))
        .with_description("Returns every payload unchanged")
}

fn counter_descriptor() -> PluginDescriptor {
    PluginDescriptor::new("counter", Version::new(1, 0, 0))
        .depends_on("echo", Constraint::new(Op::Ge, Version::new(1, 0, 0)))
        .with_description("Counts invocations; the count survives hot reload")
}

// ============================================================================
// Factory Functions
// ============================================================================

fn create_echo() -> Result<Arc<dyn Plugin>, HookError> {
    Ok(Arc::new(Echo))
}

fn create_counter() -> Result<Arc<dyn Plugin>, HookError> {
    Ok(Arc::new(Counter::default()))
}

// ============================================================================
// Registrations
// ============================================================================

register_plugin!("echo", echo_descriptor, create_echo);
register_plugin!("counter", counter_descriptor, create_counter);
