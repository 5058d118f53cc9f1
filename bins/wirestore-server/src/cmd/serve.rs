use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal::unix::{SignalKind, signal};
use wirestore_api::config::ConfigValues;
use wirestore_api::{StoreError, WireRecord};
use wirestore_engine::config::config_json_or_empty;
use wirestore_engine::params::{check_sighup_changes, config_params, store_values};
use wirestore_engine::{EngineError, RecordStore, StoreConfig, StoreOptions};
use wirestore_storage_memory::MemoryDatabase;

use crate::config::ServeArgs;
use crate::emitter::StdoutEmitter;
use crate::error::ServerError;

/// Configuration the running store was built from.
struct Running {
    config: StoreConfig,
    values: ConfigValues,
}

pub async fn run(args: ServeArgs) -> Result<(), ServerError> {
    tracing::info!("wirestore-server starting");

    // --- Load config ---
    let config = StoreConfig::load(&args.config)?;
    let values = store_values(config.store.as_ref()).map_err(|e| e.with_context("[store]"))?;
    let options = StoreOptions::from_values(&values)?;
    tracing::info!(config = %args.config, "loaded config");

    // --- Database ---
    let database = MemoryDatabase::from_config_json(&config_json_or_empty(&config.database)?)
        .map_err(|e| e.with_context("[database]"))?;

    let store = Arc::new(RecordStore::activate(
        options,
        Arc::new(database),
        Arc::new(StdoutEmitter),
    )?);
    let mut running = Running { config, values };

    let mut sighup = signal(SignalKind::hangup())?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    tracing::info!("reading record batches from stdin, press Ctrl+C to stop");
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => deliver_line(&store, &line).await,
                Ok(None) => {
                    tracing::info!("end of input");
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to read stdin");
                    break;
                }
            },
            _ = sighup.recv() => {
                tracing::info!(config = %args.config, "SIGHUP received, reloading configuration");
                match reload(&store, &args.config, &running) {
                    Ok(next) => {
                        running = next;
                        tracing::info!("configuration reloaded successfully");
                    }
                    Err(e) => tracing::error!(error = %e, "configuration reload failed (keeping old config)"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down...");
                break;
            }
        }
    }

    store.deactivate().await;
    Ok(())
}

async fn deliver_line(store: &Arc<RecordStore>, line: &str) {
    if line.trim().is_empty() {
        return;
    }
    let batch = match parse_batch(line) {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!(error = %e, "skipping malformed input line");
            return;
        }
    };
    let store = store.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || store.deliver(&batch)).await {
        tracing::error!(error = %e, "delivery task failed");
    }
}

/// One input line: a JSON array of records or a single record object.
///
/// Parsed straight from text so field order is kept.
fn parse_batch(line: &str) -> Result<Vec<WireRecord>, StoreError> {
    if line.trim_start().starts_with('[') {
        Ok(serde_json::from_str(line)?)
    } else {
        Ok(vec![serde_json::from_str(line)?])
    }
}

/// Re-read the config file and apply hot-reloadable store options.
fn reload(store: &RecordStore, path: &str, running: &Running) -> Result<Running, EngineError> {
    apply_config(store, StoreConfig::load(path)?, running)
}

/// Apply a freshly loaded config to the running store.
///
/// Rejected without touching the store when `[database]` or a
/// restart-only `[store]` parameter differs from the running config.
fn apply_config(
    store: &RecordStore,
    config: StoreConfig,
    running: &Running,
) -> Result<Running, EngineError> {
    if config.database != running.config.database {
        return Err(EngineError::Config(
            "[database] cannot be changed at runtime (requires restart)".into(),
        ));
    }
    let values = store_values(config.store.as_ref()).map_err(|e| e.with_context("[store]"))?;
    check_sighup_changes(&running.values, &values, &config_params())?;
    store.update(StoreOptions::from_values(&values)?)?;
    Ok(Running { config, values })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wirestore_api::{NullEmitter, TypedValue};

    const BASE: &str = r#"
[store]
table_name = "sensor"
cleanup_rate_secs = 0

[database]
max_connections = 4
"#;

    fn start(toml_str: &str) -> (RecordStore, Running) {
        let config = StoreConfig::parse(toml_str).unwrap();
        let values = store_values(config.store.as_ref()).unwrap();
        let store = RecordStore::activate(
            StoreOptions::from_values(&values).unwrap(),
            Arc::new(MemoryDatabase::default()),
            Arc::new(NullEmitter),
        )
        .unwrap();
        (store, Running { config, values })
    }

    #[tokio::test]
    async fn reload_applies_table_name_change() {
        let (store, running) = start(BASE);
        let next = StoreConfig::parse(&BASE.replace("\"sensor\"", "\"engine\"")).unwrap();
        let running = apply_config(&store, next, &running).unwrap();
        assert_eq!(store.options().table_name, "engine");
        assert_eq!(running.values.get_str("table_name"), Some("engine"));
        store.deactivate().await;
    }

    #[tokio::test]
    async fn reload_rejects_database_change() {
        let (store, running) = start(BASE);
        let next = StoreConfig::parse(
            &BASE
                .replace("max_connections = 4", "max_connections = 8")
                .replace("\"sensor\"", "\"engine\""),
        )
        .unwrap();
        let err = apply_config(&store, next, &running).err().unwrap();
        assert!(err.to_string().contains("[database]"));
        assert_eq!(store.options().table_name, "sensor");
        store.deactivate().await;
    }

    #[tokio::test]
    async fn reload_rejects_restart_only_param_change() {
        let (store, running) = start(BASE);
        let next = StoreConfig::parse(&BASE.replace(
            "table_name = \"sensor\"",
            "table_name = \"engine\"\ntable_prefix = \"X_\"",
        ))
        .unwrap();
        let err = apply_config(&store, next, &running).err().unwrap();
        assert!(err.to_string().contains("'table_prefix'"));
        assert_eq!(store.options().table_name, "sensor");
        assert_eq!(store.options().table_prefix, "WR_");
        store.deactivate().await;
    }

    #[test]
    fn parses_single_record_and_arrays() {
        let one = parse_batch(
            r#"{"temperature":{"type":"double","value":21.5},"status":{"type":"string","value":"ok"}}"#,
        )
        .unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].get("temperature"), Some(&TypedValue::Double(21.5)));
        let names: Vec<&str> = one[0].fields().map(|(n, _)| n).collect();
        assert_eq!(names, ["temperature", "status"]);

        let many = parse_batch(
            r#"[{"a":{"type":"integer","value":1}},{"b":{"type":"boolean","value":true}}]"#,
        )
        .unwrap();
        assert_eq!(many.len(), 2);
        assert_eq!(many[1].get("b"), Some(&TypedValue::Boolean(true)));
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(parse_batch("{").is_err());
        assert!(parse_batch(r#"{"a":1}"#).is_err());
        assert!(parse_batch(r#"{"a":{"type":"integer","value":1},"a":{"type":"integer","value":2}}"#).is_err());
    }
}
