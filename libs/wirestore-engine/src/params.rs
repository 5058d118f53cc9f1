//! Store parameter declarations and their validation.
//!
//! Raw config (a TOML section converted to JSON) is checked against the
//! declared `ConfigParam`s, defaults are filled in, and on reload the
//! restart-only parameters are compared against the running values.

use std::collections::{HashMap, HashSet};

use wirestore_api::config::{ConfigParam, ConfigValues, ParamContext, ParamType, ParamValue};

use crate::error::EngineError;

pub const TABLE_NAME: &str = "table_name";
pub const TABLE_PREFIX: &str = "table_prefix";
pub const CLEANUP_RATE_SECS: &str = "cleanup_rate_secs";
pub const RECORDS_TO_KEEP: &str = "records_to_keep";
pub const CLEANUP_SCHEDULE: &str = "cleanup_schedule";

pub const DEFAULT_TABLE_PREFIX: &str = "WR_";
pub const DEFAULT_CLEANUP_RATE_SECS: u64 = 900;
pub const DEFAULT_RECORDS_TO_KEEP: u64 = 5000;

/// Parameters understood by the `[store]` section.
pub fn config_params() -> Vec<ConfigParam> {
    vec![
        ConfigParam::new(
            TABLE_NAME,
            ParamType::Str,
            ParamContext::Sighup,
            None,
            "Name of the table records are stored in (without prefix)",
        ),
        ConfigParam::new(
            TABLE_PREFIX,
            ParamType::Str,
            ParamContext::Postmaster,
            Some(ParamValue::Str(DEFAULT_TABLE_PREFIX.into())),
            "Prefix prepended to the table name",
        ),
        ConfigParam::new(
            CLEANUP_RATE_SECS,
            ParamType::U64,
            ParamContext::Sighup,
            Some(ParamValue::U64(DEFAULT_CLEANUP_RATE_SECS)),
            "Delay before retention runs, in seconds; 0 disables retention",
        ),
        ConfigParam::new(
            RECORDS_TO_KEEP,
            ParamType::U64,
            ParamContext::Sighup,
            Some(ParamValue::U64(DEFAULT_RECORDS_TO_KEEP)),
            "Rows removed per retention run; 0 truncates the table",
        ),
        ConfigParam::new(
            CLEANUP_SCHEDULE,
            ParamType::Str,
            ParamContext::Sighup,
            Some(ParamValue::Str("once".into())),
            "\"once\": one run per configuration change, \"recurring\": run every cleanup_rate_secs",
        ),
    ]
}

/// Parse a JSON config object against the declared params.
///
/// Unknown keys are rejected. Absent keys are left out (filled later by
/// `validate_and_build`).
pub fn parse_store_config(
    config: Option<&serde_json::Value>,
    params: &[ConfigParam],
) -> Result<HashMap<String, ParamValue>, EngineError> {
    let obj = match config {
        Some(serde_json::Value::Object(map)) => map,
        Some(_) => {
            return Err(EngineError::Config(
                "store config must be a table/object".into(),
            ));
        }
        None => return Ok(HashMap::new()),
    };

    let known: HashSet<&str> = params.iter().map(|p| p.name.as_str()).collect();
    for key in obj.keys() {
        if !known.contains(key.as_str()) {
            return Err(EngineError::Config(format!("unknown parameter '{key}'")));
        }
    }

    let mut result = HashMap::new();
    for param in params {
        if let Some(v) = obj.get(&param.name) {
            result.insert(param.name.clone(), value_to_param_value(v, param)?);
        }
    }

    Ok(result)
}

/// Build `ConfigValues` from parsed key-value pairs.
///
/// For each declared param:
/// - If present in `parsed`: use the value.
/// - If absent with default: use default value.
/// - If absent and required: return error.
pub fn validate_and_build(
    parsed: &HashMap<String, ParamValue>,
    params: &[ConfigParam],
) -> Result<ConfigValues, EngineError> {
    let mut values = ConfigValues::new();

    for param in params {
        match parsed.get(&param.name) {
            Some(v) => values.set(&param.name, v.clone()),
            None => {
                if let Some(ref default) = param.default {
                    values.set(&param.name, default.clone());
                } else if param.required {
                    return Err(EngineError::Config(format!(
                        "missing required parameter '{}' ({})",
                        param.name, param.description
                    )));
                }
            }
        }
    }

    Ok(values)
}

/// Parse and validate a `[store]` TOML section in one step.
pub fn store_values(section: Option<&toml::Value>) -> Result<ConfigValues, EngineError> {
    let json = section
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| EngineError::Config(format!("convert [store] section: {e}")))?;
    let params = config_params();
    let parsed = parse_store_config(json.as_ref(), &params)?;
    validate_and_build(&parsed, &params)
}

/// Reject a reload that changes a restart-only parameter.
pub fn check_sighup_changes(
    old_values: &ConfigValues,
    new_values: &ConfigValues,
    params: &[ConfigParam],
) -> Result<(), EngineError> {
    for param in params {
        if param.context != ParamContext::Postmaster {
            continue;
        }
        if old_values.get(&param.name) != new_values.get(&param.name) {
            return Err(EngineError::Config(format!(
                "parameter '{}' has context 'postmaster' and cannot be changed at runtime \
                 (requires restart)",
                param.name
            )));
        }
    }

    Ok(())
}

fn value_to_param_value(
    val: &serde_json::Value,
    param: &ConfigParam,
) -> Result<ParamValue, EngineError> {
    match param.param_type {
        ParamType::Bool => {
            let b = val.as_bool().ok_or_else(|| {
                EngineError::Config(format!("parameter '{}': expected bool", param.name))
            })?;
            Ok(ParamValue::Bool(b))
        }
        ParamType::I64 => {
            let i = val.as_i64().ok_or_else(|| {
                EngineError::Config(format!("parameter '{}': expected integer", param.name))
            })?;
            Ok(ParamValue::I64(i))
        }
        ParamType::U64 => {
            if let Some(u) = val.as_u64() {
                return Ok(ParamValue::U64(u));
            }
            let i = val.as_i64().ok_or_else(|| {
                EngineError::Config(format!("parameter '{}': expected integer", param.name))
            })?;
            Err(EngineError::Config(format!(
                "parameter '{}': expected non-negative integer, got {i}",
                param.name
            )))
        }
        ParamType::Str => {
            let s = val.as_str().ok_or_else(|| {
                EngineError::Config(format!("parameter '{}': expected string", param.name))
            })?;
            Ok(ParamValue::Str(s.to_string()))
        }
    }
}
