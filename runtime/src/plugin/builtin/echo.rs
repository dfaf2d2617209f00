use hotswap_plugin_api::{HookError, Plugin, PluginContext, Value, async_trait};

/// Stateless plugin returning its payload
#[derive(Debug, Default)]
pub struct Echo;

#[async_trait]
impl Plugin for Echo {
    async fn on_load(&self, ctx: &PluginContext) -> Result<(), HookError> {
        tracing::debug!(plugin = %ctx.plugin_name, version = %ctx.version, "Echo ready");
        Ok(())
    }

    async fn process(&self, payload: Value) -> Result<Value, HookError> {
        Ok(payload)
    }
}
