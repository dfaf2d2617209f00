//! Per-plugin live slot
//!
//! A slot owns everything the manager tracks for one installed plugin:
//!
//! - the published instance, behind an `ArcSwapOption` so callers load it
//!   without taking a lock
//! - the single-writer lock serializing load, reload and unload
//! - lifecycle bookkeeping and call counters
//!
//! Retired instances are freed when the last in-flight caller drops its
//! `Arc`.

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use hotswap_plugin_api::Plugin;

use crate::plugin::lifecycle::{PluginEntry, PluginState};
use crate::plugin::metadata::PluginDescriptor;

/// The published, fully initialized implementation of a plugin
pub struct LiveInstance {
    /// The instance itself
    pub plugin: Arc<dyn Plugin>,

    /// Descriptor the instance was built from
    pub descriptor: PluginDescriptor,

    /// Increments with every load or successful reload of this plugin
    pub generation: u64,
}

impl std::fmt::Debug for LiveInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveInstance")
            .field("name", &self.descriptor.name)
            .field("version", &self.descriptor.version.to_string())
            .field("generation", &self.generation)
            .finish()
    }
}

/// Plugin metrics for health reporting
#[derive(Debug, Clone, Serialize)]
pub struct PluginMetrics {
    /// Current plugin state
    pub state: PluginState,
    /// Generation of the live instance (if any)
    pub generation: Option<u64>,
    /// Number of `process` calls
    pub call_count: u64,
    /// Number of failed `process` calls
    pub error_count: u64,
    /// Error rate (0.0 to 1.0)
    pub error_rate: f64,
    /// Successful reloads
    pub reload_count: u64,
    /// Reloads that were rolled back
    pub rollback_count: u64,
    /// Last error message (if any)
    pub last_error: Option<String>,
    /// Seconds since the plugin last went live
    pub uptime_seconds: u64,
    /// Seconds since the last `process` call (or since install)
    pub idle_seconds: u64,
}

pub(crate) struct PluginSlot {
    pub(crate) live: ArcSwapOption<LiveInstance>,
    pub(crate) writer: Arc<tokio::sync::Mutex<()>>,
    entry: Mutex<PluginEntry>,
    generation: AtomicU64,
    calls: AtomicU64,
    errors: AtomicU64,
    created: Instant,
    /// Milliseconds after `created` of the latest call
    last_call_ms: AtomicU64,
}

impl PluginSlot {
    pub(crate) fn new() -> Self {
        Self {
            live: ArcSwapOption::empty(),
            writer: Arc::new(tokio::sync::Mutex::new(())),
            entry: Mutex::new(PluginEntry::new()),
            generation: AtomicU64::new(0),
            calls: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            created: Instant::now(),
            last_call_ms: AtomicU64::new(0),
        }
    }

    pub(crate) fn state(&self) -> PluginState {
        self.entry.lock().state
    }

    pub(crate) fn transition(&self, plugin: &str, state: PluginState) {
        self.entry.lock().transition(plugin, state);
    }

    pub(crate) fn record_error(&self, error: &impl ToString) {
        self.entry.lock().record_error(error.to_string());
    }

    pub(crate) fn record_reload(&self) {
        self.entry.lock().reload_count += 1;
    }

    pub(crate) fn record_rollback(&self, error: &impl ToString) {
        let mut entry = self.entry.lock();
        entry.rollback_count += 1;
        entry.record_error(error.to_string());
    }

    pub(crate) fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Publish a new instance (or clear it); returns the previous one
    pub(crate) fn publish(&self, instance: Option<LiveInstance>) -> Option<Arc<LiveInstance>> {
        self.live.swap(instance.map(Arc::new))
    }

    pub(crate) fn current(&self) -> Option<Arc<LiveInstance>> {
        self.live.load_full()
    }

    pub(crate) fn record_call(&self, ok: bool) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
        let elapsed = self.created.elapsed().as_millis() as u64;
        self.last_call_ms.fetch_max(elapsed, Ordering::Relaxed);
    }

    pub(crate) fn metrics(&self) -> PluginMetrics {
        let call_count = self.calls.load(Ordering::Relaxed);
        let error_count = self.errors.load(Ordering::Relaxed);
        let elapsed_ms = self.created.elapsed().as_millis() as u64;
        let idle_ms = elapsed_ms.saturating_sub(self.last_call_ms.load(Ordering::Relaxed));
        let entry = self.entry.lock();

        PluginMetrics {
            state: entry.state,
            generation: self.live.load().as_ref().map(|live| live.generation),
            call_count,
            error_count,
            error_rate: if call_count > 0 {
                error_count as f64 / call_count as f64
            } else {
                0.0
            },
            reload_count: entry.reload_count,
            rollback_count: entry.rollback_count,
            last_error: entry.last_error.clone(),
            uptime_seconds: entry.uptime().as_secs(),
            idle_seconds: idle_ms / 1000,
        }
    }
}
