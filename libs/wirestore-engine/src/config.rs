use serde::Deserialize;

use crate::error::EngineError;

/// Root configuration, parsed from TOML.
///
/// ```toml
/// [store]
/// table_name = "sensor"
/// cleanup_rate_secs = 900
/// records_to_keep = 5000
///
/// [database]
/// max_connections = 8
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StoreConfig {
    /// Store parameters, validated against `params::config_params()`.
    #[serde(default)]
    pub store: Option<toml::Value>,

    /// Backend-specific settings, handed to the connection provider as JSON.
    #[serde(default)]
    pub database: Option<toml::Value>,
}

impl StoreConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, EngineError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| EngineError::Config(format!("{path}: {e}")))?;
        Self::parse(&content).map_err(|e| e.with_context(path))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, EngineError> {
        toml::from_str(toml_str).map_err(|e| EngineError::Config(e.to_string()))
    }
}

/// Serialize an optional TOML section to a JSON string (`"{}"` if absent).
pub fn config_json_or_empty(val: &Option<toml::Value>) -> Result<String, EngineError> {
    match val {
        Some(v) => serde_json::to_string(v)
            .map_err(|e| EngineError::Config(format!("serialize section: {e}"))),
        None => Ok("{}".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_sections() {
        let cfg = StoreConfig::parse(
            r#"
            [store]
            table_name = "sensor"
            records_to_keep = 10

            [database]
            max_connections = 4
            "#,
        )
        .unwrap();
        let store = cfg.store.unwrap();
        assert_eq!(store.get("table_name").and_then(|v| v.as_str()), Some("sensor"));
        assert_eq!(
            config_json_or_empty(&cfg.database).unwrap(),
            r#"{"max_connections":4}"#
        );
    }

    #[test]
    fn empty_document_is_valid() {
        let cfg = StoreConfig::parse("").unwrap();
        assert_eq!(cfg, StoreConfig::default());
        assert_eq!(config_json_or_empty(&cfg.database).unwrap(), "{}");
    }

    #[test]
    fn malformed_toml_is_config_error() {
        assert!(matches!(
            StoreConfig::parse("[store\n"),
            Err(EngineError::Config(_))
        ));
    }
}
