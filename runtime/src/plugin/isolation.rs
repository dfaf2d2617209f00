//! Plugin Isolation and Panic Safety
//!
//! Every call into plugin code (factory, lifecycle hooks, `process`) goes
//! through this module. Panics are caught with `catch_unwind` and turned into
//! [`HookFailure::Panic`], and async hooks can be bounded by a timeout, so a
//! misbehaving plugin surfaces as an ordinary error instead of taking the
//! host down.
//!
//! # Safety Considerations
//!
//! - `catch_unwind` only catches panics, not aborts
//! - The host must be built with `panic = "unwind"`
//! - Panics inside tasks a plugin spawns itself are not caught here
//! - A timed-out hook future is dropped at its next await point

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use hotswap_plugin_api::HookError;

use crate::errors::{HookFailure, LifecycleHook};

/// Call a synchronous plugin function with panic catching
///
/// # Example
///
/// ```ignore
/// let instance = call_hook_sync(LifecycleHook::Construct, || factory())?;
/// ```
pub fn call_hook_sync<F, T>(hook: LifecycleHook, plugin_fn: F) -> Result<T, HookFailure>
where
    F: FnOnce() -> Result<T, HookError>,
{
    match catch_unwind(AssertUnwindSafe(plugin_fn)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(HookFailure::Error { hook, source }),
        Err(panic_info) => {
            let message = extract_panic_message(&panic_info);
            tracing::error!(hook = %hook, message = %message, "Plugin panicked");
            Err(HookFailure::Panic { hook, message })
        }
    }
}

/// Call an async plugin hook with panic catching and an optional timeout
///
/// Panics are caught both while creating the future and while polling it.
///
/// # Example
///
/// ```ignore
/// call_hook(LifecycleHook::OnLoad, Some(timeout), || instance.on_load(&ctx)).await?;
/// ```
pub async fn call_hook<F, Fut, T>(
    hook: LifecycleHook,
    timeout: Option<Duration>,
    plugin_fn: F,
) -> Result<T, HookFailure>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, HookError>>,
{
    let future = match catch_unwind(AssertUnwindSafe(plugin_fn)) {
        Ok(fut) => fut,
        Err(panic_info) => {
            let message = extract_panic_message(&panic_info);
            tracing::error!(hook = %hook, message = %message, "Plugin panicked during future creation");
            return Err(HookFailure::Panic { hook, message });
        }
    };

    let guarded = AssertUnwindSafe(future).catch_unwind();
    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, guarded).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(hook = %hook, timeout_ms = limit.as_millis() as u64, "Plugin hook timed out");
                return Err(HookFailure::Timeout {
                    hook,
                    timeout: limit,
                });
            }
        },
        None => guarded.await,
    };

    match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(HookFailure::Error { hook, source }),
        Err(panic_info) => {
            let message = extract_panic_message(&panic_info);
            tracing::error!(hook = %hook, message = %message, "Plugin panicked during async execution");
            Err(HookFailure::Panic { hook, message })
        }
    }
}

/// Extract a human-readable message from panic info
///
/// Handles common panic message types: &str, String, and falls back
/// to a generic message.
fn extract_panic_message(panic_info: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic (non-string payload)".to_string()
    }
}
