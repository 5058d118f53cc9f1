use std::collections::HashMap;
use std::sync::Arc;

use wirestore_api::{
    ColumnType, ConnectionProvider, IdentifierSanitizer, StoreError, TypeMapper, WireRecord,
};

use crate::sql;
use crate::writer::record_columns;

/// A structural change applied to the live table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaChange {
    CreatedTable,
    AddedColumn {
        column: String,
        column_type: ColumnType,
    },
    /// Dropped and re-added with a new type. Previous values are lost.
    ReplacedColumn {
        column: String,
        from: ColumnType,
        to: ColumnType,
    },
}

/// Brings the live table in line with an incoming record.
///
/// Every operation takes its own connection and releases it on return.
pub struct SchemaReconciler {
    provider: Arc<dyn ConnectionProvider>,
    mapper: Arc<dyn TypeMapper>,
    sanitizer: Arc<dyn IdentifierSanitizer>,
}

impl SchemaReconciler {
    pub fn new(
        provider: Arc<dyn ConnectionProvider>,
        mapper: Arc<dyn TypeMapper>,
        sanitizer: Arc<dyn IdentifierSanitizer>,
    ) -> Self {
        Self {
            provider,
            mapper,
            sanitizer,
        }
    }

    /// Create the table with its `TIMESTAMP` key if it does not exist.
    /// Returns whether it was created.
    pub fn ensure_table(&self, table: &str) -> Result<bool, StoreError> {
        let mut conn = self.provider.connection()?;
        if conn.table_exists(table)? {
            return Ok(false);
        }
        let stmt = sql::create_table(table);
        tracing::debug!(statement = %stmt, "creating table");
        conn.execute(&stmt)
            .map_err(|e| e.with_context(format!("create table {table}")))?;
        tracing::info!(table = %table, "table created");
        Ok(true)
    }

    /// Add missing columns and replace columns whose type no longer
    /// matches, in record field order. One statement per change.
    pub fn ensure_columns(
        &self,
        table: &str,
        record: &WireRecord,
    ) -> Result<Vec<SchemaChange>, StoreError> {
        let columns = record_columns(record, self.sanitizer.as_ref())?;
        let mut conn = self.provider.connection()?;
        let live: HashMap<String, ColumnType> = conn
            .columns(table)?
            .into_iter()
            .map(|c| (c.name, c.column_type))
            .collect();

        let mut changes = Vec::new();
        for (column, value) in columns {
            let wanted = self.mapper.column_type(value.kind());
            match live.get(&column) {
                Some(&current) if current == wanted => {}
                Some(&current) => {
                    tracing::info!(
                        table = %table,
                        column = %column,
                        from = %current,
                        to = %wanted,
                        "column type changed, replacing column"
                    );
                    conn.execute(&sql::drop_column(table, &column))
                        .map_err(|e| e.with_context(format!("drop column {column}")))?;
                    conn.execute(&sql::add_column(table, &column, wanted))
                        .map_err(|e| e.with_context(format!("add column {column}")))?;
                    changes.push(SchemaChange::ReplacedColumn {
                        column,
                        from: current,
                        to: wanted,
                    });
                }
                None => {
                    let stmt = sql::add_column(table, &column, wanted);
                    tracing::debug!(statement = %stmt, "adding column");
                    conn.execute(&stmt)
                        .map_err(|e| e.with_context(format!("add column {column}")))?;
                    changes.push(SchemaChange::AddedColumn {
                        column,
                        column_type: wanted,
                    });
                }
            }
        }
        Ok(changes)
    }

    /// `ensure_table` followed by `ensure_columns`.
    pub fn reconcile(
        &self,
        table: &str,
        record: &WireRecord,
    ) -> Result<Vec<SchemaChange>, StoreError> {
        let mut changes = Vec::new();
        if self.ensure_table(table)? {
            changes.push(SchemaChange::CreatedTable);
        }
        changes.extend(self.ensure_columns(table, record)?);
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wirestore_api::{DefaultTypeMapper, ErrorKind, SqlIdentifierSanitizer, TypedValue};
    use wirestore_storage_memory::MemoryDatabase;

    fn reconciler(db: &MemoryDatabase) -> SchemaReconciler {
        SchemaReconciler::new(
            Arc::new(db.clone()),
            Arc::new(DefaultTypeMapper),
            Arc::new(SqlIdentifierSanitizer),
        )
    }

    fn sensor_record() -> WireRecord {
        WireRecord::from_pairs([
            ("temperature", TypedValue::Double(21.5)),
            ("status", TypedValue::from("ok")),
        ])
        .unwrap()
    }

    #[test]
    fn ensure_table_is_idempotent() {
        let db = MemoryDatabase::default();
        let r = reconciler(&db);
        assert!(r.ensure_table("WR_sensor").unwrap());
        assert!(!r.ensure_table("WR_sensor").unwrap());
        let snap = db.snapshot("WR_sensor").unwrap();
        assert_eq!(snap.column_names(), ["TIMESTAMP"]);
        assert_eq!(snap.column_type("TIMESTAMP"), Some(ColumnType::BigInt));
        assert_eq!(db.open_connections(), 0);
    }

    #[test]
    fn ensure_columns_adds_in_field_order_then_is_noop() {
        let db = MemoryDatabase::default();
        let r = reconciler(&db);
        r.ensure_table("WR_sensor").unwrap();

        let changes = r.ensure_columns("WR_sensor", &sensor_record()).unwrap();
        assert_eq!(
            changes,
            vec![
                SchemaChange::AddedColumn {
                    column: "temperature".into(),
                    column_type: ColumnType::Double,
                },
                SchemaChange::AddedColumn {
                    column: "status".into(),
                    column_type: ColumnType::Varchar,
                },
            ]
        );
        assert!(r.ensure_columns("WR_sensor", &sensor_record()).unwrap().is_empty());
        assert_eq!(
            db.snapshot("WR_sensor").unwrap().column_names(),
            ["TIMESTAMP", "temperature", "status"]
        );
    }

    #[test]
    fn type_drift_replaces_column() {
        let db = MemoryDatabase::default();
        let r = reconciler(&db);
        let first = WireRecord::from_pairs([("x", TypedValue::Integer(1))]).unwrap();
        let drifted = WireRecord::from_pairs([("x", TypedValue::from("one"))]).unwrap();

        r.reconcile("t", &first).unwrap();
        let changes = r.reconcile("t", &drifted).unwrap();
        assert_eq!(
            changes,
            vec![SchemaChange::ReplacedColumn {
                column: "x".into(),
                from: ColumnType::Integer,
                to: ColumnType::Varchar,
            }]
        );
        assert_eq!(
            db.snapshot("t").unwrap().column_type("x"),
            Some(ColumnType::Varchar)
        );
    }

    #[test]
    fn reconcile_reports_table_creation_first() {
        let db = MemoryDatabase::default();
        let changes = reconciler(&db).reconcile("t", &sensor_record()).unwrap();
        assert_eq!(changes.first(), Some(&SchemaChange::CreatedTable));
        assert_eq!(changes.len(), 3);
    }

    #[test]
    fn failures_propagate_and_release_connections() {
        let db = MemoryDatabase::default();
        let r = reconciler(&db);
        r.ensure_table("t").unwrap();
        db.fail_next("ALTER", 1);
        let err = r.ensure_columns("t", &sensor_record()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(db.open_connections(), 0);

        db.fail_next("CONNECT", 1);
        assert_eq!(r.ensure_table("u").unwrap_err().kind(), ErrorKind::Io);
        assert!(db.snapshot("u").is_none());
    }
}
