use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use hotswap_plugin_api::{HookError, Plugin, PluginContext, Value, async_trait};

/// Snapshot format shared by every counter version
#[derive(Debug, Serialize, Deserialize)]
struct CounterState {
    count: u64,
}

/// Counts `process` calls. The `step` setting (default 1) sets the
/// increment.
#[derive(Debug)]
pub struct Counter {
    count: AtomicU64,
    step: AtomicU64,
}

impl Default for Counter {
    fn default() -> Self {
        Self {
            count: AtomicU64::new(0),
            step: AtomicU64::new(1),
        }
    }
}

impl Counter {
    /// Current count
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Plugin for Counter {
    async fn on_load(&self, ctx: &PluginContext) -> Result<(), HookError> {
        if let Some(step) = ctx.setting("step") {
            let step = step
                .as_u64()
                .filter(|s| *s > 0)
                .ok_or_else(|| HookError::Configuration(format!("step must be a positive integer, got {step}")))?;
            self.step.store(step, Ordering::Release);
        }
        Ok(())
    }

    async fn get_state(&self) -> Result<Vec<u8>, HookError> {
        Ok(serde_json::to_vec(&CounterState {
            count: self.count(),
        })?)
    }

    async fn restore_state(&self, state: &[u8]) -> Result<(), HookError> {
        if state.is_empty() {
            return Ok(());
        }
        let state: CounterState = serde_json::from_slice(state)?;
        self.count.store(state.count, Ordering::Release);
        Ok(())
    }

    async fn process(&self, _payload: Value) -> Result<Value, HookError> {
        let step = self.step.load(Ordering::Acquire);
        let count = self.count.fetch_add(step, Ordering::AcqRel) + step;
        Ok(serde_json::json!({ "count": count }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_counter_counts() {
        let counter = Counter::default();
        counter
            .on_load(&PluginContext::new("counter", "1.0.0", Value::Null))
            .await
            .unwrap();
        counter.process(Value::Null).await.unwrap();
        assert_eq!(counter.process(Value::Null).await.unwrap(), json!({"count": 2}));
    }

    #[tokio::test]
    async fn test_counter_step_setting() {
        let counter = Counter::default();
        counter
            .on_load(&PluginContext::new("counter", "1.0.0", json!({"step": 5})))
            .await
            .unwrap();
        assert_eq!(counter.process(Value::Null).await.unwrap(), json!({"count": 5}));

        let bad = Counter::default();
        let err = bad
            .on_load(&PluginContext::new("counter", "1.0.0", json!({"step": 0})))
            .await
            .unwrap_err();
        assert!(matches!(err, HookError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_counter_state_roundtrip() {
        let old = Counter::default();
        for _ in 0..3 {
            old.process(Value::Null).await.unwrap();
        }
        let snapshot = old.get_state().await.unwrap();

        let new = Counter::default();
        new.restore_state(&snapshot).await.unwrap();
        assert_eq!(new.count(), 3);

        assert!(new.restore_state(b"not json").await.is_err());
        assert!(new.restore_state(&[]).await.is_ok());
        assert_eq!(new.count(), 3);
    }
}
