//! Plugin Registry
//!
//! The registry is the runtime's source of plugin metadata and
//! implementations: it maps a plugin name to its current descriptor and to a
//! factory producing fresh instances. Hot reload asks the factory again, so
//! swapping the factory (or publishing a new version) is how a new
//! implementation reaches a running host.
//!
//! Plugins compiled into the host register at link time through the
//! `inventory` crate (see [`register_plugin!`](crate::register_plugin)) and
//! are picked up by [`InMemoryRegistry::with_builtins`].
//!
//! # Usage
//!
//! ```ignore
//! use hotswap_runtime::plugin::registry::InMemoryRegistry;
//!
//! let registry = InMemoryRegistry::with_builtins();
//! registry.register_fn(descriptor, || Ok(Arc::new(MyPlugin::default()) as Arc<dyn Plugin>));
//! ```

use dashmap::DashMap;
use std::sync::Arc;

use hotswap_plugin_api::{HookError, Plugin};

use super::metadata::PluginDescriptor;
use crate::version::Version;

/// Factory function type producing a fresh plugin instance
pub type PluginFactoryFn = Arc<dyn Fn() -> Result<Arc<dyn Plugin>, HookError> + Send + Sync>;

/// Factory function pointer type (non-Arc version for PluginConstructor)
pub type PluginFactoryPtr = fn() -> Result<Arc<dyn Plugin>, HookError>;

/// Descriptor function type for deferred descriptor creation
pub type DescriptorFn = fn() -> PluginDescriptor;

/// Source of plugin descriptors and implementations
pub trait PluginRegistry: Send + Sync {
    /// Current descriptor for `name`
    fn find_descriptor(&self, name: &str) -> Option<PluginDescriptor>;

    /// Factory producing fresh instances of `name`
    fn factory(&self, name: &str) -> Option<PluginFactoryFn>;
}

/// Plugin constructor for inventory-based registration
///
/// Uses function pointers to defer non-const operations (descriptor
/// creation) until runtime, making it compatible with `inventory::submit!`.
pub struct PluginConstructor {
    /// Plugin name, must match the descriptor's name
    pub name: &'static str,

    /// Descriptor function (deferred creation for const compatibility)
    pub descriptor_fn: DescriptorFn,

    /// Factory producing fresh instances
    pub create: PluginFactoryPtr,
}

impl PluginConstructor {
    /// Create a new plugin constructor
    pub const fn new(name: &'static str, descriptor_fn: DescriptorFn, create: PluginFactoryPtr) -> Self {
        Self {
            name,
            descriptor_fn,
            create,
        }
    }

    /// Get the descriptor (calls the deferred function)
    pub fn descriptor(&self) -> PluginDescriptor {
        (self.descriptor_fn)()
    }
}

// Collect all registered plugins at link time
inventory::collect!(PluginConstructor);

struct RegistryEntry {
    descriptor: PluginDescriptor,
    factory: PluginFactoryFn,
}

/// Concurrent in-memory registry
///
/// Lookups and updates may happen from any thread while plugins are running.
pub struct InMemoryRegistry {
    entries: DashMap<String, RegistryEntry>,
}

impl InMemoryRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Create a registry holding every plugin registered via `inventory`
    pub fn with_builtins() -> Self {
        let registry = Self::new();

        for constructor in inventory::iter::<PluginConstructor> {
            let descriptor = constructor.descriptor();
            if descriptor.name != constructor.name {
                tracing::warn!(
                    plugin = %constructor.name,
                    descriptor = %descriptor.name,
                    "Skipping plugin whose descriptor name does not match its registration"
                );
                continue;
            }
            registry.register(descriptor, Arc::new(constructor.create));
        }

        tracing::info!(plugins = registry.len(), "Plugin registry initialized");
        registry
    }

    /// Register a plugin, replacing any previous entry with the same name
    pub fn register(&self, descriptor: PluginDescriptor, factory: PluginFactoryFn) {
        tracing::debug!(
            plugin = %descriptor.name,
            version = %descriptor.version,
            "Registered plugin"
        );
        self.entries.insert(
            descriptor.name.clone(),
            RegistryEntry {
                descriptor,
                factory,
            },
        );
    }

    /// Register a plugin from a closure
    pub fn register_fn<F>(&self, descriptor: PluginDescriptor, factory: F)
    where
        F: Fn() -> Result<Arc<dyn Plugin>, HookError> + Send + Sync + 'static,
    {
        self.register(descriptor, Arc::new(factory));
    }

    /// Swap the implementation of an already registered plugin, keeping its
    /// descriptor. Returns `false` if `name` is not registered.
    pub fn replace_factory(&self, name: &str, factory: PluginFactoryFn) -> bool {
        match self.entries.get_mut(name) {
            Some(mut entry) => {
                entry.factory = factory;
                tracing::debug!(plugin = %name, "Replaced plugin factory");
                true
            }
            None => false,
        }
    }

    /// Publish a new version of a plugin together with its implementation.
    /// Returns the previously registered version, if any.
    pub fn publish(&self, descriptor: PluginDescriptor, factory: PluginFactoryFn) -> Option<Version> {
        let name = descriptor.name.clone();
        let version = descriptor.version.clone();
        let previous = self
            .entries
            .insert(
                name.clone(),
                RegistryEntry {
                    descriptor,
                    factory,
                },
            )
            .map(|entry| entry.descriptor.version);

        tracing::info!(
            plugin = %name,
            version = %version,
            previous = ?previous.as_ref().map(ToString::to_string),
            "Published plugin version"
        );
        previous
    }

    /// Remove a plugin. Running instances are unaffected.
    pub fn unregister(&self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    /// Check if a plugin is registered
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered plugin names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Every registered descriptor, sorted by name
    pub fn descriptors(&self) -> Vec<PluginDescriptor> {
        let mut descriptors: Vec<PluginDescriptor> =
            self.entries.iter().map(|e| e.descriptor.clone()).collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// Number of registered plugins
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PluginRegistry for InMemoryRegistry {
    fn find_descriptor(&self, name: &str) -> Option<PluginDescriptor> {
        self.entries.get(name).map(|entry| entry.descriptor.clone())
    }

    fn factory(&self, name: &str) -> Option<PluginFactoryFn> {
        // Clone out so the map guard is released before the factory runs
        self.entries.get(name).map(|entry| entry.factory.clone())
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}
