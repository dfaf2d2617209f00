//! Plugin Config collaborator
//!
//! The runtime hands each plugin's raw settings to a [`ConfigValidator`]
//! before `on_load`. It never interprets the settings itself.

use serde_json::Value;

/// Validates raw plugin settings
pub trait ConfigValidator: Send + Sync {
    /// Accept the settings, or return every problem found
    fn validate(&self, plugin: &str, config: &Value) -> Result<(), Vec<String>>;
}

/// Validator accepting every configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl ConfigValidator for AcceptAll {
    fn validate(&self, _plugin: &str, _config: &Value) -> Result<(), Vec<String>> {
        Ok(())
    }
}

impl<F> ConfigValidator for F
where
    F: Fn(&str, &Value) -> Result<(), Vec<String>> + Send + Sync,
{
    fn validate(&self, plugin: &str, config: &Value) -> Result<(), Vec<String>> {
        self(plugin, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accept_all() {
        assert!(AcceptAll.validate("any", &Value::Null).is_ok());
    }

    #[test]
    fn test_closure_validator() {
        let validator = |plugin: &str, config: &Value| {
            if plugin == "counter" && config.get("step").is_none() {
                Err(vec!["step is required".to_string()])
            } else {
                Ok(())
            }
        };

        assert!(validator.validate("counter", &json!({"step": 1})).is_ok());
        assert_eq!(
            validator.validate("counter", &json!({})).unwrap_err(),
            vec!["step is required"]
        );
        assert!(validator.validate("echo", &Value::Null).is_ok());
    }
}
