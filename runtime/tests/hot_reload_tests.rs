//! Hot reload tests for the Hotswap runtime
//!
//! These tests drive the public manager API end to end:
//! - Reload keeps state and swaps the instance
//! - A failing reload leaves the original instance serving
//! - Calls in flight during a reload always see a complete instance
//! - Unload guards and rollback escalation
//!
//! Run: cargo test --test hot_reload_tests -- --nocapture

use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use hotswap_plugin_api::{HookError, Plugin, PluginContext, async_trait};
use hotswap_runtime::plugin::PluginFactoryFn;
use hotswap_runtime::{
    ErrorKind, InMemoryRegistry, PluginDescriptor, PluginManager, PluginState, RuntimeConfig,
};

mod common {
    use super::*;

    /// Stateful plugin whose `on_load` can be told to fail
    pub struct Versioned {
        pub tag: &'static str,
        pub count: AtomicU64,
        pub fail_first_load: bool,
        pub fail_second_load: bool,
        pub load_delay: Duration,
        pub loaded_once: AtomicBool,
    }

    impl Versioned {
        pub fn new(tag: &'static str) -> Self {
            Self {
                tag,
                count: AtomicU64::new(0),
                fail_first_load: false,
                fail_second_load: false,
                load_delay: Duration::ZERO,
                loaded_once: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl Plugin for Versioned {
        async fn on_load(&self, _ctx: &PluginContext) -> Result<(), HookError> {
            let again = self.loaded_once.swap(true, Ordering::SeqCst);
            if (!again && self.fail_first_load) || (again && self.fail_second_load) {
                return Err(HookError::failed(format!("{} refuses to load", self.tag)));
            }
            if self.load_delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(self.load_delay).await;
            }
            Ok(())
        }

        async fn get_state(&self) -> Result<Vec<u8>, HookError> {
            Ok(self.count.load(Ordering::SeqCst).to_be_bytes().to_vec())
        }

        async fn restore_state(&self, state: &[u8]) -> Result<(), HookError> {
            let bytes: [u8; 8] = state
                .try_into()
                .map_err(|_| HookError::state("expected 8 bytes"))?;
            self.count.store(u64::from_be_bytes(bytes), Ordering::SeqCst);
            Ok(())
        }

        async fn process(&self, _payload: Value) -> Result<Value, HookError> {
            let count = self.count.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(json!({ "tag": self.tag, "count": count }))
        }
    }

    pub fn factory(make: impl Fn() -> Versioned + Send + Sync + 'static) -> PluginFactoryFn {
        Arc::new(move || Ok(Arc::new(make()) as Arc<dyn Plugin>))
    }

    pub fn descriptor(name: &str, version: &str) -> PluginDescriptor {
        PluginDescriptor::parse(name, version).unwrap()
    }

    pub fn config() -> RuntimeConfig {
        RuntimeConfig::default()
            .with_hook_timeout(Duration::from_secs(2))
            .with_reload_timeout(Duration::from_secs(5))
    }

    pub fn manager(registry: &Arc<InMemoryRegistry>) -> PluginManager {
        PluginManager::new(registry.clone(), config())
    }
}

use common::*;

/// Scenario D: the new implementation's `on_load` fails during reload
#[tokio::test]
async fn test_scenario_d_failed_reload_keeps_original() {
    let registry = Arc::new(InMemoryRegistry::new());
    registry.register(descriptor("A", "1.0.0"), factory(|| Versioned::new("v1")));
    let manager = manager(&registry);

    manager.load_plugin("A").await.unwrap();
    assert_eq!(
        manager.invoke("A", Value::Null).await.unwrap(),
        json!({"tag": "v1", "count": 1})
    );
    let original = manager.live_instance("A").unwrap();

    registry.replace_factory(
        "A",
        factory(|| Versioned {
            fail_first_load: true,
            ..Versioned::new("v2")
        }),
    );
    let err = manager.reload_plugin("A").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Reload);
    assert_eq!(manager.state_of("A"), Some(PluginState::Active));
    assert!(Arc::ptr_eq(&original, &manager.live_instance("A").unwrap()));

    // Observable behavior is unchanged
    assert_eq!(
        manager.invoke("A", Value::Null).await.unwrap(),
        json!({"tag": "v1", "count": 2})
    );
}

#[tokio::test]
async fn test_repeated_failed_reloads_are_idempotent() {
    let registry = Arc::new(InMemoryRegistry::new());
    registry.register(descriptor("A", "1.0.0"), factory(|| Versioned::new("v1")));
    let manager = manager(&registry);
    manager.load_plugin("A").await.unwrap();
    let original = manager.live_instance("A").unwrap();

    registry.replace_factory(
        "A",
        factory(|| Versioned {
            fail_first_load: true,
            ..Versioned::new("v2")
        }),
    );
    for _ in 0..3 {
        assert_eq!(
            manager.reload_plugin("A").await.unwrap_err().kind(),
            ErrorKind::Reload
        );
    }

    assert!(Arc::ptr_eq(&original, &manager.live_instance("A").unwrap()));
    assert_eq!(manager.plugin_metrics("A").unwrap().rollback_count, 3);
}

#[tokio::test]
async fn test_reload_carries_state_to_new_version() {
    let registry = Arc::new(InMemoryRegistry::new());
    registry.register(descriptor("A", "1.0.0"), factory(|| Versioned::new("v1")));
    let manager = manager(&registry);
    manager.load_plugin("A").await.unwrap();
    for _ in 0..5 {
        manager.invoke("A", Value::Null).await.unwrap();
    }

    registry.publish(descriptor("A", "1.1.0"), factory(|| Versioned::new("v2")));
    manager.reload_plugin("A").await.unwrap();

    assert_eq!(
        manager.invoke("A", Value::Null).await.unwrap(),
        json!({"tag": "v2", "count": 6})
    );
    let plugins = manager.list_plugins();
    assert_eq!(plugins[0].version.to_string(), "1.1.0");
    assert_eq!(plugins[0].generation, Some(2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_calls_during_reload() {
    let registry = Arc::new(InMemoryRegistry::new());
    registry.register(descriptor("A", "1.0.0"), factory(|| Versioned::new("v1")));
    let manager = Arc::new(manager(&registry));
    manager.load_plugin("A").await.unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let mut workers = Vec::new();
    for _ in 0..8 {
        let manager = Arc::clone(&manager);
        let stop = Arc::clone(&stop);
        workers.push(tokio::spawn(async move {
            let mut tags = Vec::new();
            let mut during_reload = 0usize;
            while !stop.load(Ordering::SeqCst) {
                let reloading = manager.state_of("A") == Some(PluginState::Reloading);
                let out = manager
                    .invoke("A", Value::Null)
                    .await
                    .expect("every call must reach a complete instance");
                if reloading && manager.state_of("A") == Some(PluginState::Reloading) {
                    during_reload += 1;
                }
                let generation = manager.live_instance("A").map(|live| live.generation);
                assert!(matches!(generation, Some(1) | Some(2)));
                tags.push(out["tag"].as_str().unwrap_or_default().to_string());
                tokio::task::yield_now().await;
            }
            (tags, during_reload)
        }));
    }

    tokio::time::sleep(Duration::from_millis(20)).await;
    // The replacement takes a while to come up, so calls keep landing mid-reload
    registry.replace_factory(
        "A",
        factory(|| Versioned {
            load_delay: Duration::from_millis(50),
            ..Versioned::new("v2")
        }),
    );
    manager.reload_plugin("A").await.unwrap();

    // Every call after a successful reload sees the new instance
    assert_eq!(
        manager.invoke("A", Value::Null).await.unwrap()["tag"],
        json!("v2")
    );

    tokio::time::sleep(Duration::from_millis(20)).await;
    stop.store(true, Ordering::SeqCst);

    let mut total = 0;
    let mut mid_reload = 0;
    for worker in workers {
        let (tags, during_reload) = worker.await.unwrap();
        assert!(tags.iter().all(|tag| tag == "v1" || tag == "v2"));
        total += tags.len();
        mid_reload += during_reload;
    }
    assert!(total > 0);
    assert!(mid_reload > 0, "no call completed while the plugin was reloading");

    let metrics = manager.plugin_metrics("A").unwrap();
    assert_eq!(metrics.error_count, 0);
    assert_eq!(metrics.reload_count, 1);
}

#[tokio::test]
async fn test_rollback_failure_escalates() {
    let registry = Arc::new(InMemoryRegistry::new());
    registry.register(
        descriptor("A", "1.0.0"),
        factory(|| Versioned {
            fail_second_load: true,
            ..Versioned::new("v1")
        }),
    );
    let manager = manager(&registry);
    manager.load_plugin("A").await.unwrap();

    registry.replace_factory(
        "A",
        factory(|| Versioned {
            fail_first_load: true,
            ..Versioned::new("v2")
        }),
    );
    let err = manager.reload_plugin("A").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RollbackFailed);
    assert_eq!(manager.state_of("A"), Some(PluginState::Failed));
    assert!(manager.live_instance("A").is_none());
}

#[tokio::test]
async fn test_unload_guard_and_shutdown() {
    let registry = Arc::new(InMemoryRegistry::new());
    registry.register(descriptor("storage", "2.1.0"), factory(|| Versioned::new("s")));
    registry.register(
        descriptor("reporter", "1.0.0")
            .with_dependency("storage", "~2.1.0")
            .unwrap(),
        factory(|| Versioned::new("r")),
    );
    let manager = manager(&registry);
    manager.load_plugin("reporter").await.unwrap();

    let err = manager.unload_plugin("storage").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DependentPluginsActive);
    assert!(err.to_string().contains("reporter"));

    assert!(manager.shutdown().await.is_empty());
    assert!(
        manager
            .list_plugins()
            .iter()
            .all(|p| p.state == PluginState::Unloaded)
    );
}

#[tokio::test]
async fn test_builtin_counter_survives_reload() {
    let manager = PluginManager::with_builtins(config());
    manager.load_plugin("counter").await.unwrap();
    assert_eq!(manager.state_of("echo"), Some(PluginState::Active));

    for _ in 0..3 {
        manager.invoke("counter", json!({})).await.unwrap();
    }
    manager.reload_plugin("counter").await.unwrap();

    assert_eq!(
        manager.invoke("counter", json!({})).await.unwrap(),
        json!({"count": 4})
    );
    assert_eq!(
        manager.invoke("echo", json!({"ping": true})).await.unwrap(),
        json!({"ping": true})
    );
}
