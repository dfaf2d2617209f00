//! Plugin Lifecycle Manager
//!
//! The manager owns the installed-descriptor table and the live-instance
//! table and drives every lifecycle transition:
//!
//! ```text
//! install ──▶ Unloaded ──load──▶ Loading ──▶ Active ──reload──▶ Reloading ──▶ Active
//!                 ▲                 │           │                    │
//!                 └─────unload──────┼───────────┘                    │ rollback failed
//!                                   ▼                                ▼
//!                                 Failed ◀───────────────────────────┘
//! ```
//!
//! # Concurrency
//!
//! - Read path: [`PluginManager::invoke`] loads the published instance from
//!   an `ArcSwapOption` and never waits on a writer.
//! - Write path: load, reload and unload of one plugin are serialized by
//!   that plugin's writer lock. Different plugins proceed independently.
//! - Resolution snapshots the installed set under a short read lock.
//!
//! # Example
//!
//! ```ignore
//! let manager = PluginManager::with_builtins(RuntimeConfig::default());
//! manager.load_plugin("counter").await?;
//! let out = manager.invoke("counter", Value::Null).await?;
//! manager.reload_plugin("counter").await?;
//! ```

mod reload;
mod slot;
mod validator;

pub use slot::{LiveInstance, PluginMetrics};
pub use validator::{AcceptAll, ConfigValidator};

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use hotswap_plugin_api::{Plugin, PluginContext, Value};

use crate::config::RuntimeConfig;
use crate::errors::{LifecycleHook, PluginError, PluginResult};
use crate::plugin::isolation::{call_hook, call_hook_sync};
use crate::plugin::lifecycle::PluginState;
use crate::plugin::metadata::{PluginDescriptor, host_version};
use crate::plugin::registry::{InMemoryRegistry, PluginRegistry};
use crate::resolver::{DependencyReport, DependencyTree, Resolution, Resolver};
use crate::version::Version;
use slot::PluginSlot;

/// Row returned by [`PluginManager::list_plugins`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: Version,
    pub state: PluginState,
    /// Generation of the live instance, if one is published
    pub generation: Option<u64>,
}

/// Owner of installed descriptors and live plugin instances
pub struct PluginManager {
    registry: Arc<dyn PluginRegistry>,
    validator: Arc<dyn ConfigValidator>,
    config: RuntimeConfig,
    host: semver::Version,
    descriptors: RwLock<BTreeMap<String, PluginDescriptor>>,
    slots: DashMap<String, Arc<PluginSlot>>,
}

impl PluginManager {
    /// Create a manager backed by `registry`
    pub fn new(registry: Arc<dyn PluginRegistry>, config: RuntimeConfig) -> Self {
        Self {
            registry,
            validator: Arc::new(AcceptAll),
            config,
            host: host_version(),
            descriptors: RwLock::new(BTreeMap::new()),
            slots: DashMap::new(),
        }
    }

    /// Create a manager over the plugins compiled into this binary
    pub fn with_builtins(config: RuntimeConfig) -> Self {
        Self::new(Arc::new(InMemoryRegistry::with_builtins()), config)
    }

    /// Use `validator` for plugin settings
    pub fn with_validator(mut self, validator: impl ConfigValidator + 'static) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    /// Check host requirements against `host` instead of this crate's version
    pub fn with_host_version(mut self, host: semver::Version) -> Self {
        self.host = host;
        self
    }

    /// Active configuration
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    // =========================================================================
    // Install / Uninstall
    // =========================================================================

    /// Add a descriptor to the installed set, in state `Unloaded`
    pub fn install(&self, descriptor: PluginDescriptor) -> PluginResult<()> {
        let mut descriptors = self.descriptors.write();
        if descriptors.contains_key(&descriptor.name) {
            return Err(PluginError::AlreadyInstalled(descriptor.name));
        }

        info!(
            plugin = %descriptor.name,
            version = %descriptor.version,
            dependencies = descriptor.dependencies.len(),
            "Plugin installed"
        );
        self.slots
            .insert(descriptor.name.clone(), Arc::new(PluginSlot::new()));
        descriptors.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// Install the registry's current descriptor for `name`
    pub fn install_from_registry(&self, name: &str) -> PluginResult<()> {
        let descriptor = self
            .registry
            .find_descriptor(name)
            .ok_or_else(|| PluginError::NotFound(name.to_string()))?;
        self.install(descriptor)
    }

    /// Remove an `Unloaded` or `Failed` plugin from the installed set
    ///
    /// Refused with `DependentPluginsActive` while a plugin that depends on
    /// it is still running, as with [`PluginManager::unload_plugin`].
    pub async fn uninstall(&self, name: &str) -> PluginResult<()> {
        let (slot, _guard) = self.lock_slot(name).await?;
        let state = slot.state();
        if !state.can_uninstall() {
            return Err(invalid_state(name, state, "uninstall"));
        }

        let dependents = self.dependents_of(name);
        if !dependents.is_empty() {
            return Err(PluginError::DependentPluginsActive {
                plugin: name.to_string(),
                dependents,
            });
        }

        self.descriptors.write().remove(name);
        self.slots.remove(name);
        info!(plugin = %name, "Plugin uninstalled");
        Ok(())
    }

    /// Install `name` and every dependency reachable from it that the
    /// registry can supply. Unknown dependencies are left for resolution to
    /// report.
    fn ensure_installed(&self, name: &str) -> PluginResult<()> {
        let mut queue = VecDeque::from([name.to_string()]);
        let mut seen = BTreeSet::new();

        while let Some(next) = queue.pop_front() {
            if !seen.insert(next.clone()) {
                continue;
            }

            let descriptor = match self.installed(&next) {
                Some(descriptor) => descriptor,
                None => match self.registry.find_descriptor(&next) {
                    Some(descriptor) => {
                        match self.install(descriptor.clone()) {
                            Ok(()) | Err(PluginError::AlreadyInstalled(_)) => {}
                            Err(e) => return Err(e),
                        }
                        descriptor
                    }
                    None if next == name => return Err(PluginError::NotFound(next)),
                    None => continue,
                },
            };

            queue.extend(descriptor.dependency_names().map(str::to_string));
        }

        Ok(())
    }

    // =========================================================================
    // Load / Unload
    // =========================================================================

    /// Load `name`, loading any inactive dependencies first in resolved order
    ///
    /// # Errors
    /// - `NotFound` if neither installed nor known to the registry
    /// - `Dependency` if its closure has missing, conflicting or cyclic
    ///   dependencies (nothing is loaded)
    /// - `InvalidState` unless the plugin is `Unloaded` or `Failed`
    /// - `Load` / `HookTimeout` / `Configuration` if a plugin fails to come up;
    ///   that plugin ends `Failed`, dependencies already loaded stay active
    ///
    /// Descriptors pulled from the registry for the closure stay installed
    /// even when the load then fails; remove them with
    /// [`PluginManager::uninstall`].
    pub async fn load_plugin(&self, name: &str) -> PluginResult<()> {
        self.ensure_installed(name)?;

        let order = self
            .resolve_load_order_for(name)?
            .into_result()
            .map_err(|errors| PluginError::Dependency {
                plugin: name.to_string(),
                errors,
            })?;

        let state = self.slot(name)?.state();
        if !state.can_load() {
            return Err(invalid_state(name, state, "load"));
        }

        debug!(plugin = %name, order = ?order, "Loading plugin with dependencies");
        for dependency in order.iter().filter(|n| n.as_str() != name) {
            self.load_one(dependency, false).await?;
        }
        self.load_one(name, true).await
    }

    /// Load a single plugin whose dependencies are already active. With
    /// `strict` unset, an already active plugin is left alone.
    async fn load_one(&self, name: &str, strict: bool) -> PluginResult<()> {
        let (slot, _guard) = self.lock_slot(name).await?;
        let state = slot.state();
        if !strict && state.is_active() {
            return Ok(());
        }
        if !state.can_load() {
            return Err(invalid_state(name, state, "load"));
        }

        let descriptor = self
            .installed(name)
            .ok_or_else(|| PluginError::NotFound(name.to_string()))?;
        if let Some(report) = self.resolver().check_dependencies(name) {
            if !report.is_satisfied() {
                return Err(PluginError::Dependency {
                    plugin: name.to_string(),
                    errors: report.unmet,
                });
            }
        }
        self.check_host(&descriptor)?;
        let dependencies = self.dependency_versions(&descriptor)?;

        slot.transition(name, PluginState::Loading);
        match self.instantiate(&descriptor, dependencies).await {
            Ok(plugin) => {
                let generation = slot.next_generation();
                slot.publish(Some(LiveInstance {
                    plugin,
                    descriptor: descriptor.clone(),
                    generation,
                }));
                slot.transition(name, PluginState::Active);
                info!(
                    plugin = %name,
                    version = %descriptor.version,
                    generation,
                    "Plugin loaded"
                );
                Ok(())
            }
            Err(err) => {
                slot.record_error(&err);
                slot.transition(name, PluginState::Failed);
                warn!(plugin = %name, error = %err, "Plugin failed to load");
                Err(err)
            }
        }
    }

    /// Unload an active plugin
    ///
    /// Refused with `DependentPluginsActive` while any active plugin declares
    /// a dependency on it. The instance is retired before `on_unload` runs;
    /// if the hook fails the plugin ends `Failed` instead of `Unloaded`.
    pub async fn unload_plugin(&self, name: &str) -> PluginResult<()> {
        let (slot, _guard) = self.lock_slot(name).await?;
        let state = slot.state();
        if !state.can_unload() {
            return Err(invalid_state(name, state, "unload"));
        }

        let dependents = self.dependents_of(name);
        if !dependents.is_empty() {
            return Err(PluginError::DependentPluginsActive {
                plugin: name.to_string(),
                dependents,
            });
        }

        let result = match slot.publish(None) {
            Some(retired) => {
                call_hook(LifecycleHook::OnUnload, Some(self.config.hook_timeout), || {
                    retired.plugin.on_unload()
                })
                .await
            }
            None => Ok(()),
        };

        match result {
            Ok(()) => {
                slot.transition(name, PluginState::Unloaded);
                info!(plugin = %name, "Plugin unloaded");
                Ok(())
            }
            Err(source) => {
                slot.record_error(&source);
                slot.transition(name, PluginState::Failed);
                warn!(plugin = %name, error = %source, "Plugin failed to unload cleanly");
                Err(PluginError::Unload {
                    plugin: name.to_string(),
                    source,
                })
            }
        }
    }

    /// Unload every active plugin, dependents before their dependencies
    ///
    /// Continues past individual failures and returns them.
    pub async fn shutdown(&self) -> Vec<PluginError> {
        let active: Vec<PluginDescriptor> = self
            .descriptors
            .read()
            .values()
            .filter(|d| self.state_of(&d.name).is_some_and(|s| s.is_active()))
            .cloned()
            .collect();

        let mut order = Resolver::new(&active)
            .resolve_load_order()
            .into_result()
            .unwrap_or_else(|_| active.iter().map(|d| d.name.clone()).collect());
        order.reverse();

        info!(plugins = order.len(), "Shutting down plugins");
        let mut errors = Vec::new();
        for name in order {
            if let Err(err) = self.unload_plugin(&name).await {
                warn!(plugin = %name, error = %err, "Plugin did not shut down cleanly");
                errors.push(err);
            }
        }
        errors
    }

    /// Build and initialize a fresh instance: validate settings, construct
    /// through the registry's factory, then run `on_load`
    async fn instantiate(
        &self,
        descriptor: &PluginDescriptor,
        dependencies: BTreeMap<String, String>,
    ) -> PluginResult<Arc<dyn Plugin>> {
        let name = descriptor.name.as_str();
        let factory = self
            .registry
            .factory(name)
            .ok_or_else(|| PluginError::FactoryMissing(name.to_string()))?;

        let settings = self.config.settings_for(name);
        self.validator
            .validate(name, &settings)
            .map_err(|errors| PluginError::Configuration {
                plugin: name.to_string(),
                errors,
            })?;

        let plugin = call_hook_sync(LifecycleHook::Construct, || factory())
            .map_err(|failure| PluginError::load(name, failure))?;

        let ctx = PluginContext::new(name, descriptor.version.to_string(), settings)
            .with_dependencies(dependencies);
        call_hook(LifecycleHook::OnLoad, Some(self.config.hook_timeout), || {
            plugin.on_load(&ctx)
        })
        .await
        .map_err(|failure| PluginError::load(name, failure))?;

        Ok(plugin)
    }

    /// Versions of the live instances of `descriptor`'s direct dependencies
    fn dependency_versions(
        &self,
        descriptor: &PluginDescriptor,
    ) -> PluginResult<BTreeMap<String, String>> {
        descriptor
            .dependency_names()
            .map(|dependency| match self.live_instance(dependency) {
                Some(live) => Ok((dependency.to_string(), live.descriptor.version.to_string())),
                None => Err(PluginError::DependencyInactive {
                    plugin: descriptor.name.clone(),
                    dependency: dependency.to_string(),
                    state: self.state_of(dependency).unwrap_or(PluginState::Unloaded),
                }),
            })
            .collect()
    }

    fn check_host(&self, descriptor: &PluginDescriptor) -> PluginResult<()> {
        match &descriptor.host_requirement {
            Some(requirement) if !requirement.matches(&self.host) => {
                Err(PluginError::HostIncompatible {
                    plugin: descriptor.name.clone(),
                    requirement: requirement.clone(),
                    host: self.host.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    // =========================================================================
    // Invocation
    // =========================================================================

    /// Call `process` on the current instance of `name`
    ///
    /// Never waits on a load, reload or unload. Calls already running when a
    /// reload swaps the instance finish on the instance they started with.
    pub async fn invoke(&self, name: &str, payload: Value) -> PluginResult<Value> {
        let slot = self.slot(name)?;
        let Some(instance) = slot.current() else {
            return Err(invalid_state(name, slot.state(), "invoke"));
        };

        let result = call_hook(LifecycleHook::Process, None, || instance.plugin.process(payload)).await;
        slot.record_call(result.is_ok());
        result.map_err(|source| PluginError::Invocation {
            plugin: name.to_string(),
            source,
        })
    }

    /// The currently published instance of `name`
    pub fn live_instance(&self, name: &str) -> Option<Arc<LiveInstance>> {
        self.slots.get(name).and_then(|slot| slot.current())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Name, version and state of every installed plugin, by name
    pub fn list_plugins(&self) -> Vec<PluginInfo> {
        self.descriptors
            .read()
            .values()
            .map(|descriptor| {
                let slot = self.slots.get(&descriptor.name);
                PluginInfo {
                    name: descriptor.name.clone(),
                    version: descriptor.version.clone(),
                    state: slot
                        .as_ref()
                        .map(|s| s.state())
                        .unwrap_or(PluginState::Unloaded),
                    generation: slot.and_then(|s| s.current()).map(|live| live.generation),
                }
            })
            .collect()
    }

    /// Installed descriptor of `name`
    pub fn get_plugin(&self, name: &str) -> PluginResult<PluginDescriptor> {
        self.installed(name)
            .ok_or_else(|| PluginError::NotFound(name.to_string()))
    }

    /// Current lifecycle state of `name`
    pub fn state_of(&self, name: &str) -> Option<PluginState> {
        self.slots.get(name).map(|slot| slot.state())
    }

    /// Direct dependencies of every installed plugin reachable from `name`
    pub fn get_dependency_tree(&self, name: &str) -> PluginResult<DependencyTree> {
        self.resolver()
            .dependency_tree(name)
            .ok_or_else(|| PluginError::NotFound(name.to_string()))
    }

    /// Global load order over the installed set
    pub fn resolve_load_order(&self) -> Resolution {
        self.resolver().resolve_load_order()
    }

    /// Load order of `name`'s dependency closure, ending with `name`
    pub fn resolve_load_order_for(&self, name: &str) -> PluginResult<Resolution> {
        self.resolver()
            .resolve_load_order_for(name)
            .ok_or_else(|| PluginError::NotFound(name.to_string()))
    }

    /// Check `name`'s declared dependencies against the installed set
    pub fn check_dependencies(&self, name: &str) -> PluginResult<DependencyReport> {
        self.resolver()
            .check_dependencies(name)
            .ok_or_else(|| PluginError::NotFound(name.to_string()))
    }

    /// Installed plugins declaring a dependency on `name` that are loading,
    /// active or reloading, by name
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        self.resolver()
            .graph()
            .dependents(name)
            .into_iter()
            .filter(|dependent| {
                self.state_of(dependent).is_some_and(|state| {
                    matches!(
                        state,
                        PluginState::Loading | PluginState::Active | PluginState::Reloading
                    )
                })
            })
            .collect()
    }

    /// Health counters of `name`
    pub fn plugin_metrics(&self, name: &str) -> Option<PluginMetrics> {
        self.slots.get(name).map(|slot| slot.metrics())
    }

    /// Health counters of every installed plugin, by name
    pub fn all_plugin_metrics(&self) -> Vec<(String, PluginMetrics)> {
        let mut metrics: Vec<_> = self
            .slots
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().metrics()))
            .collect();
        metrics.sort_by(|a, b| a.0.cmp(&b.0));
        metrics
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn installed(&self, name: &str) -> Option<PluginDescriptor> {
        self.descriptors.read().get(name).cloned()
    }

    /// Snapshot the installed set into a resolver
    fn resolver(&self) -> Resolver {
        Resolver::new(self.descriptors.read().values())
    }

    fn slot(&self, name: &str) -> PluginResult<Arc<PluginSlot>> {
        self.slots
            .get(name)
            .map(|slot| Arc::clone(slot.value()))
            .ok_or_else(|| PluginError::NotFound(name.to_string()))
    }

    /// Take `name`'s writer lock. Fails if the plugin was uninstalled while
    /// waiting.
    async fn lock_slot(&self, name: &str) -> PluginResult<(Arc<PluginSlot>, OwnedMutexGuard<()>)> {
        let slot = self.slot(name)?;
        let guard = Arc::clone(&slot.writer).lock_owned().await;

        let still_installed = self
            .slots
            .get(name)
            .is_some_and(|current| Arc::ptr_eq(current.value(), &slot));
        if !still_installed {
            return Err(PluginError::NotFound(name.to_string()));
        }
        Ok((slot, guard))
    }
}

fn invalid_state(plugin: &str, state: PluginState, operation: &'static str) -> PluginError {
    PluginError::InvalidState {
        plugin: plugin.to_string(),
        state,
        operation,
    }
}
