//! Explicit component configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use crate::error::{FlowError, Result};

/// Configured properties of one component, passed to its factory.
///
/// Each builtin component documents the keys it recognizes. Unknown keys are
/// kept but ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
    values: BTreeMap<String, JsonValue>,
}

impl ComponentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<JsonValue>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.values.get(key)
    }

    pub fn get_u64(&self, key: &str) -> Result<Option<u64>> {
        self.typed(key, "an unsigned integer", JsonValue::as_u64)
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        self.typed(key, "a boolean", JsonValue::as_bool)
    }

    pub fn get_str(&self, key: &str) -> Result<Option<&str>> {
        match self.values.get(key) {
            None | Some(JsonValue::Null) => Ok(None),
            Some(JsonValue::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(type_error(key, "a string", other)),
        }
    }

    pub fn u64_or(&self, key: &str, default: u64) -> Result<u64> {
        Ok(self.get_u64(key)?.unwrap_or(default))
    }

    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool> {
        Ok(self.get_bool(key)?.unwrap_or(default))
    }

    pub fn required_str(&self, key: &str) -> Result<&str> {
        self.get_str(key)?
            .ok_or_else(|| FlowError::configuration(format!("Missing required property '{key}'")))
    }

    fn typed<T>(
        &self,
        key: &str,
        expected: &str,
        extract: impl Fn(&JsonValue) -> Option<T>,
    ) -> Result<Option<T>> {
        match self.values.get(key) {
            None | Some(JsonValue::Null) => Ok(None),
            Some(value) => extract(value)
                .map(Some)
                .ok_or_else(|| type_error(key, expected, value)),
        }
    }
}

fn type_error(key: &str, expected: &str, found: &JsonValue) -> FlowError {
    FlowError::configuration(format!(
        "Property '{key}' must be {expected}, found {found}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_getters() {
        let config = ComponentConfig::new()
            .with("max_rows", 10u64)
            .with("flag", true)
            .with("pattern", "^a");

        assert_eq!(config.get_u64("max_rows").unwrap(), Some(10));
        assert_eq!(config.u64_or("first_row", 1).unwrap(), 1);
        assert!(config.bool_or("flag", false).unwrap());
        assert_eq!(config.required_str("pattern").unwrap(), "^a");
    }

    #[test]
    fn test_type_mismatch_is_configuration_error() {
        let config = ComponentConfig::new().with("max_rows", "ten");
        let err = config.get_u64("max_rows").unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("max_rows"));
    }

    #[test]
    fn test_missing_required() {
        let err = ComponentConfig::new().required_str("pattern").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: Missing required property 'pattern'"
        );
    }
}
