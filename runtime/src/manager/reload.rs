//! Hot reload with snapshot and rollback
//!
//! ```text
//! get_state(old) -> on_unload(old) -> construct(new) -> on_load(new)
//!     -> restore_state(new)  (best effort)  -> publish(new)
//! ```
//!
//! The old instance stays published until the new one has passed
//! `on_load`, so callers never see a half-built plugin. When any step fails,
//! or the sequence runs past the reload deadline, the old instance is kept
//! and re-initialized if its `on_unload` was entered.
//!
//! The deadline is checked between steps. A running hook is only ever cut
//! short by its own hook timeout.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

use hotswap_plugin_api::{Plugin, PluginContext};

use super::slot::{LiveInstance, PluginSlot};
use super::{PluginManager, invalid_state};
use crate::errors::{LifecycleHook, PluginError, PluginResult};
use crate::plugin::isolation::call_hook;
use crate::plugin::lifecycle::PluginState;
use crate::plugin::metadata::PluginDescriptor;
use crate::resolver::{DependencyError, Resolver};

/// How far a reload got before it stopped
#[derive(Debug)]
struct ReloadProgress {
    deadline: Instant,
    snapshot: Option<Vec<u8>>,
    /// `on_unload` was entered on the old instance, finished or not
    old_unloaded: bool,
}

impl ReloadProgress {
    fn new(limit: Duration) -> Self {
        Self {
            deadline: Instant::now() + limit,
            snapshot: None,
            old_unloaded: false,
        }
    }
}

impl PluginManager {
    /// Replace the live instance of `name` with a fresh one from the registry
    ///
    /// The registry's current descriptor is used; a changed version is
    /// validated against the installed set and active dependents before
    /// anything is touched.
    ///
    /// # Errors
    /// - `InvalidState` unless the plugin is `Active`
    /// - `Dependency` / `HostIncompatible` / `DependencyInactive` if the new
    ///   descriptor cannot run here; nothing is changed
    /// - `Reload` if a step failed or the reload ran past `reload_timeout`;
    ///   the previous instance is still published and the plugin is `Active`
    /// - `RollbackFailed` if the previous instance could not be brought back;
    ///   the plugin is `Failed` and has no live instance
    pub async fn reload_plugin(&self, name: &str) -> PluginResult<()> {
        let (slot, _guard) = self.lock_slot(name).await?;
        let state = slot.state();
        if !state.can_reload() {
            return Err(invalid_state(name, state, "reload"));
        }
        let Some(old) = slot.current() else {
            return Err(invalid_state(name, state, "reload"));
        };

        let installed = self.get_plugin(name)?;
        let descriptor = self
            .registry
            .find_descriptor(name)
            .unwrap_or_else(|| installed.clone());
        if descriptor.version != installed.version {
            info!(
                plugin = %name,
                from = %installed.version,
                to = %descriptor.version,
                "Reloading to a new version"
            );
        }
        self.validate_replacement(&descriptor)?;
        let dependencies = self.dependency_versions(&descriptor)?;

        slot.transition(name, PluginState::Reloading);
        let mut progress = ReloadProgress::new(self.config.reload_timeout);
        let outcome = self
            .swap_steps(&old, &descriptor, dependencies, &mut progress)
            .await;

        match outcome {
            Ok(plugin) => {
                let generation = slot.next_generation();
                slot.publish(Some(LiveInstance {
                    plugin,
                    descriptor: descriptor.clone(),
                    generation,
                }));
                if descriptor != installed {
                    self.descriptors
                        .write()
                        .insert(name.to_string(), descriptor.clone());
                }
                slot.record_reload();
                slot.transition(name, PluginState::Active);
                info!(
                    plugin = %name,
                    version = %descriptor.version,
                    generation,
                    "Plugin reloaded"
                );
                Ok(())
            }
            Err(cause) => self.roll_back(name, &slot, &old, progress, cause).await,
        }
    }

    /// Run the swap one step at a time, checking the deadline after each.
    /// Returns the initialized replacement; the caller publishes it.
    async fn swap_steps(
        &self,
        old: &LiveInstance,
        descriptor: &PluginDescriptor,
        dependencies: BTreeMap<String, String>,
        progress: &mut ReloadProgress,
    ) -> PluginResult<Arc<dyn Plugin>> {
        let name = descriptor.name.as_str();
        let hook_timeout = Some(self.config.hook_timeout);

        let snapshot = call_hook(LifecycleHook::GetState, hook_timeout, || old.plugin.get_state())
            .await
            .map_err(|source| PluginError::Snapshot {
                plugin: name.to_string(),
                source,
            })?;
        progress.snapshot = Some(snapshot.clone());
        self.check_deadline(name, progress)?;

        // A timed-out or panicking on_unload may have released resources
        progress.old_unloaded = true;
        call_hook(LifecycleHook::OnUnload, hook_timeout, || old.plugin.on_unload())
            .await
            .map_err(|source| PluginError::Unload {
                plugin: name.to_string(),
                source,
            })?;
        self.check_deadline(name, progress)?;

        let plugin = self.instantiate(descriptor, dependencies).await?;
        self.keep_replacement(name, &plugin, progress).await?;

        if let Err(failure) = call_hook(LifecycleHook::RestoreState, hook_timeout, || {
            plugin.restore_state(&snapshot)
        })
        .await
        {
            warn!(
                plugin = %name,
                error = %failure,
                "State restore failed; new instance starts fresh"
            );
        }
        self.keep_replacement(name, &plugin, progress).await?;

        Ok(plugin)
    }

    fn check_deadline(&self, name: &str, progress: &ReloadProgress) -> PluginResult<()> {
        if Instant::now() >= progress.deadline {
            return Err(PluginError::ReloadTimeout {
                plugin: name.to_string(),
                timeout: self.config.reload_timeout,
            });
        }
        Ok(())
    }

    /// Unload a loaded but unpublished replacement once the deadline has passed
    async fn keep_replacement(
        &self,
        name: &str,
        plugin: &Arc<dyn Plugin>,
        progress: &ReloadProgress,
    ) -> PluginResult<()> {
        let Err(timeout) = self.check_deadline(name, progress) else {
            return Ok(());
        };
        if let Err(failure) = call_hook(
            LifecycleHook::OnUnload,
            Some(self.config.hook_timeout),
            || plugin.on_unload(),
        )
        .await
        {
            warn!(plugin = %name, error = %failure, "Discarded replacement did not unload cleanly");
        }
        Err(timeout)
    }

    /// Keep the previous instance after a failed reload
    async fn roll_back(
        &self,
        name: &str,
        slot: &PluginSlot,
        old: &LiveInstance,
        progress: ReloadProgress,
        cause: PluginError,
    ) -> PluginResult<()> {
        warn!(plugin = %name, error = %cause, "Reload failed; rolling back");

        if progress.old_unloaded {
            let hook_timeout = Some(self.config.hook_timeout);
            let ctx = PluginContext::new(
                name,
                old.descriptor.version.to_string(),
                self.config.settings_for(name),
            )
            .with_dependencies(self.dependency_versions(&old.descriptor).unwrap_or_default());

            if let Err(rollback) =
                call_hook(LifecycleHook::OnLoad, hook_timeout, || old.plugin.on_load(&ctx)).await
            {
                slot.publish(None);
                slot.record_error(&rollback);
                slot.transition(name, PluginState::Failed);
                error!(
                    plugin = %name,
                    cause = %cause,
                    error = %rollback,
                    "Rollback failed; plugin has no live instance"
                );
                return Err(PluginError::RollbackFailed {
                    plugin: name.to_string(),
                    cause: Box::new(cause),
                    rollback,
                });
            }

            if let Some(snapshot) = progress.snapshot.as_deref() {
                if let Err(failure) = call_hook(LifecycleHook::RestoreState, hook_timeout, || {
                    old.plugin.restore_state(snapshot)
                })
                .await
                {
                    warn!(plugin = %name, error = %failure, "Snapshot not restored after rollback");
                }
            }
        }

        slot.record_rollback(&cause);
        slot.transition(name, PluginState::Active);
        info!(
            plugin = %name,
            generation = old.generation,
            "Rolled back to previous instance"
        );
        Err(PluginError::Reload {
            plugin: name.to_string(),
            cause: Box::new(cause),
        })
    }

    /// Check that `descriptor` can replace the installed one: its own
    /// closure must resolve and active dependents must still accept it
    fn validate_replacement(&self, descriptor: &PluginDescriptor) -> PluginResult<()> {
        self.check_host(descriptor)?;

        let name = descriptor.name.as_str();
        let mut candidate = self.descriptors.read().clone();
        candidate.insert(name.to_string(), descriptor.clone());
        let resolver = Resolver::new(candidate.values());

        let mut errors = resolver
            .resolve_load_order_for(name)
            .map(|resolution| resolution.errors)
            .unwrap_or_default();

        for dependent in self.dependents_of(name) {
            if let Some(report) = resolver.check_dependencies(&dependent) {
                errors.extend(report.unmet.into_iter().filter(|e| {
                    matches!(e, DependencyError::VersionConflict { dependency, .. } if dependency == name)
                }));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(PluginError::Dependency {
                plugin: name.to_string(),
                errors,
            })
        }
    }
}
