//! Plugin Registration Macros
//!
//! Convenience macro for registering plugins compiled into the host. It
//! wraps the `inventory::submit!` boilerplate around a
//! [`PluginConstructor`](crate::plugin::registry::PluginConstructor).
//!
//! # Example
//!
//! ```ignore
//! use hotswap_runtime::plugin::prelude::*;
//! use hotswap_runtime::register_plugin;
//!
//! fn greeter_descriptor() -> PluginDescriptor {
//!     PluginDescriptor::new("greeter", Version::new(1, 0, 0))
//!         .with_description("Says hello")
//! }
//!
//! fn create_greeter() -> Result<Arc<dyn Plugin>, HookError> {
//!     Ok(Arc::new(Greeter::default()))
//! }
//!
//! register_plugin!("greeter", greeter_descriptor, create_greeter);
//! ```

/// Register a plugin with the host at link time.
///
/// # Arguments
///
/// * `$name` - The plugin name; must equal the descriptor's name
/// * `$descriptor_fn` - Function returning the `PluginDescriptor`
/// * `$factory_fn` - Factory with signature `fn() -> Result<Arc<dyn Plugin>, HookError>`
#[macro_export]
macro_rules! register_plugin {
    ($name:expr, $descriptor_fn:expr, $factory_fn:expr) => {
        ::inventory::submit! {
            $crate::plugin::registry::PluginConstructor::new($name, $descriptor_fn, $factory_fn)
        }
    };
}
