mod sql;
mod table;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use wirestore_api::{ColumnInfo, Connection, ConnectionProvider, SqlParam, StoreError, TypedValue};

use crate::sql::Statement;
use crate::table::{param_value, Table};

pub use table::TableSnapshot;

// ═══════════════════════════════════════════════════════════════
//  MemoryDatabaseConfig
// ═══════════════════════════════════════════════════════════════

fn default_max_connections() -> usize {
    64
}

#[derive(Debug, serde::Deserialize)]
pub struct MemoryDatabaseConfig {
    /// Connections that may be open at once. Further requests fail
    /// as "connection unavailable".
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for MemoryDatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryDatabase
// ═══════════════════════════════════════════════════════════════

/// Fault injected into the next matching operations.
#[derive(Debug)]
struct Fault {
    /// Upper-cased statement verb, or `CONNECT` / `COMMIT`.
    verb: String,
    remaining: usize,
}

#[derive(Debug, Default)]
struct Faults {
    failures: Vec<Fault>,
    delays: HashMap<String, Duration>,
}

#[derive(Debug)]
struct Shared {
    tables: Mutex<HashMap<String, Table>>,
    faults: Mutex<Faults>,
    open: AtomicUsize,
    max_connections: usize,
}

/// In-process relational database.
///
/// Tables with typed columns, primary key and NOT NULL enforcement,
/// per-connection transactions. Understands exactly the statement shapes
/// the record store generates. Cloning shares the same database.
#[derive(Debug, Clone)]
pub struct MemoryDatabase {
    shared: Arc<Shared>,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new(default_max_connections())
    }
}

impl MemoryDatabase {
    pub fn new(max_connections: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: Mutex::new(HashMap::new()),
                faults: Mutex::new(Faults::default()),
                open: AtomicUsize::new(0),
                max_connections,
            }),
        }
    }

    /// Create from a JSON config object (`"{}"` = defaults).
    pub fn from_config_json(config_json: &str) -> Result<Self, StoreError> {
        let config: MemoryDatabaseConfig = if config_json.trim() == "{}" {
            MemoryDatabaseConfig::default()
        } else {
            serde_json::from_str(config_json)
                .map_err(|e| StoreError::config(format!("memory database config: {e}")))?
        };
        if config.max_connections == 0 {
            return Err(StoreError::config("max_connections must be at least 1"));
        }
        Ok(Self::new(config.max_connections))
    }

    /// Connections currently handed out and not yet dropped.
    pub fn open_connections(&self) -> usize {
        self.shared.open.load(Ordering::SeqCst)
    }

    /// Copy of a table's columns and rows.
    pub fn snapshot(&self, table: &str) -> Option<TableSnapshot> {
        let tables = lock_recover(&self.shared.tables);
        tables.get(table).map(|t| TableSnapshot {
            name: table.to_string(),
            columns: t.column_infos(),
            rows: t.rows.clone(),
        })
    }

    pub fn table_names(&self) -> Vec<String> {
        let tables = lock_recover(&self.shared.tables);
        let mut names: Vec<String> = tables.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn row_count(&self, table: &str) -> Option<usize> {
        lock_recover(&self.shared.tables).get(table).map(|t| t.rows.len())
    }

    /// Fail the next `count` operations whose verb is `verb`
    /// (`INSERT`, `ALTER`, `CREATE`, `DELETE`, `TRUNCATE`, `COMMIT`,
    /// `CONNECT` for connection acquisition, `METADATA` for table lookups).
    pub fn fail_next(&self, verb: &str, count: usize) {
        let mut faults = lock_recover(&self.shared.faults);
        faults.failures.push(Fault {
            verb: verb.to_ascii_uppercase(),
            remaining: count,
        });
    }

    /// Sleep for `delay` before executing every statement with this verb.
    pub fn delay_statements(&self, verb: &str, delay: Duration) {
        let mut faults = lock_recover(&self.shared.faults);
        faults.delays.insert(verb.to_ascii_uppercase(), delay);
    }

    fn check_fault(&self, verb: &str) -> Result<(), StoreError> {
        let delay = {
            let mut faults = lock_recover(&self.shared.faults);
            if let Some(f) = faults
                .failures
                .iter_mut()
                .find(|f| f.verb == verb && f.remaining > 0)
            {
                f.remaining -= 1;
                return Err(StoreError::io(format!("injected {verb} failure")));
            }
            faults.delays.get(verb).copied()
        };
        if let Some(d) = delay {
            std::thread::sleep(d);
        }
        Ok(())
    }

    fn tables(&self) -> MutexGuard<'_, HashMap<String, Table>> {
        lock_recover(&self.shared.tables)
    }

    /// Run a DDL / DELETE / TRUNCATE statement. Autocommitted.
    fn apply(&self, stmt: Statement) -> Result<u64, StoreError> {
        let mut tables = self.tables();
        match stmt {
            Statement::CreateTable {
                table,
                if_not_exists,
                columns,
            } => {
                if tables.contains_key(&table) {
                    if if_not_exists {
                        return Ok(0);
                    }
                    return Err(StoreError::schema(format!("table '{table}' already exists")));
                }
                if columns.iter().filter(|c| c.primary_key).count() > 1 {
                    return Err(StoreError::schema("multiple primary keys"));
                }
                tracing::debug!(table = %table, "memory: create table");
                tables.insert(table, Table::new(columns)?);
                Ok(0)
            }
            Statement::AddColumn { table, column } => {
                let t = table_mut(&mut tables, &table)?;
                if column.primary_key {
                    return Err(StoreError::schema("cannot add a primary key column"));
                }
                t.add_column(column)?;
                Ok(0)
            }
            Statement::DropColumn { table, column } => {
                table_mut(&mut tables, &table)?.drop_column(&column)?;
                Ok(0)
            }
            Statement::Delete { table, limit } => {
                let t = table_mut(&mut tables, &table)?;
                // Unordered: removes rows from the front of storage order.
                let n = match limit {
                    Some(n) => usize::try_from(n).unwrap_or(usize::MAX).min(t.rows.len()),
                    None => t.rows.len(),
                };
                t.rows.drain(..n);
                Ok(n as u64)
            }
            Statement::Truncate { table } => {
                let t = table_mut(&mut tables, &table)?;
                let n = t.rows.len();
                t.rows.clear();
                Ok(n as u64)
            }
            Statement::Insert { .. } => Err(StoreError::logic(
                "INSERT requires parameters (use execute_with)",
            )),
        }
    }
}

impl ConnectionProvider for MemoryDatabase {
    fn connection(&self) -> Result<Box<dyn Connection>, StoreError> {
        self.check_fault("CONNECT")?;
        let prev = self.shared.open.fetch_add(1, Ordering::SeqCst);
        if prev >= self.shared.max_connections {
            self.shared.open.fetch_sub(1, Ordering::SeqCst);
            return Err(StoreError::io(format!(
                "no connection available ({} open)",
                self.shared.max_connections
            )));
        }
        Ok(Box::new(MemoryConnection {
            db: self.clone(),
            staged: Vec::new(),
        }))
    }
}

fn table_mut<'a>(
    tables: &'a mut HashMap<String, Table>,
    name: &str,
) -> Result<&'a mut Table, StoreError> {
    tables
        .get_mut(name)
        .ok_or_else(|| StoreError::schema(format!("table not found: {name}")))
}

fn lock_recover<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => {
            tracing::warn!("memory database lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryConnection
// ═══════════════════════════════════════════════════════════════

struct StagedInsert {
    table: String,
    values: Vec<(String, TypedValue)>,
}

/// Connection with its own transaction. Inserts are staged and become
/// visible on commit; dropping the connection discards them.
pub struct MemoryConnection {
    db: MemoryDatabase,
    staged: Vec<StagedInsert>,
}

impl Connection for MemoryConnection {
    fn table_exists(&mut self, table: &str) -> Result<bool, StoreError> {
        self.db.check_fault("METADATA")?;
        Ok(self.db.tables().contains_key(table))
    }

    fn columns(&mut self, table: &str) -> Result<Vec<ColumnInfo>, StoreError> {
        self.db.check_fault("METADATA")?;
        Ok(self
            .db
            .tables()
            .get(table)
            .map(Table::column_infos)
            .unwrap_or_default())
    }

    fn execute(&mut self, sql: &str) -> Result<u64, StoreError> {
        self.db.check_fault(&sql::verb(sql))?;
        let stmt = sql::parse(sql)?;
        self.db.apply(stmt)
    }

    fn execute_with(&mut self, sql: &str, params: &[SqlParam<'_>]) -> Result<u64, StoreError> {
        self.db.check_fault(&sql::verb(sql))?;
        let Statement::Insert {
            table,
            columns,
            placeholders,
        } = sql::parse(sql)?
        else {
            return Err(StoreError::logic(
                "only INSERT accepts parameters",
            ));
        };
        if placeholders != columns.len() {
            return Err(StoreError::format(format!(
                "{} columns but {placeholders} placeholders",
                columns.len()
            )));
        }
        if params.len() != placeholders {
            return Err(StoreError::format(format!(
                "{placeholders} placeholders but {} parameters bound",
                params.len()
            )));
        }

        let values: Vec<(String, TypedValue)> = columns
            .into_iter()
            .zip(params.iter().map(param_value))
            .collect();

        // Validate now so errors surface at execute time, like a real driver.
        {
            let tables = self.db.tables();
            let t = tables
                .get(&table)
                .ok_or_else(|| StoreError::schema(format!("table not found: {table}")))?;
            let row = t.build_row(&values)?;
            if let Some(key) = t.key_of(&row) {
                let staged_dup = self.staged.iter().any(|s| {
                    s.table == table
                        && t.build_row(&s.values).ok().and_then(|r| t.key_of(&r)).as_ref()
                            == Some(&key)
                });
                if t.has_key(&key) || staged_dup {
                    return Err(StoreError::schema(format!(
                        "duplicate primary key {key:?} in table '{table}'"
                    )));
                }
            }
        }

        self.staged.push(StagedInsert { table, values });
        Ok(1)
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.db.check_fault("COMMIT")?;
        let staged = std::mem::take(&mut self.staged);
        let mut tables = self.db.tables();

        // Re-validate against the live schema, then apply all or nothing.
        let mut rows = Vec::with_capacity(staged.len());
        for s in &staged {
            let t = tables
                .get(&s.table)
                .ok_or_else(|| StoreError::schema(format!("table not found: {}", s.table)))?;
            let row = t.build_row(&s.values)?;
            if let Some(key) = t.key_of(&row) {
                if t.has_key(&key) {
                    return Err(StoreError::schema(format!(
                        "duplicate primary key {key:?} in table '{}'",
                        s.table
                    )));
                }
            }
            rows.push((s.table.clone(), row));
        }
        for (table, row) in rows {
            if let Some(t) = tables.get_mut(&table) {
                t.rows.push(row);
            }
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        self.staged.clear();
        Ok(())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.db.shared.open.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wirestore_api::{ColumnType, ErrorKind};

    const CREATE: &str = "CREATE TABLE IF NOT EXISTS t (TIMESTAMP BIGINT NOT NULL PRIMARY KEY);";

    fn db_with_table() -> MemoryDatabase {
        let db = MemoryDatabase::default();
        let mut conn = db.connection().unwrap();
        conn.execute(CREATE).unwrap();
        conn.execute("ALTER TABLE t ADD COLUMN x INTEGER;").unwrap();
        db
    }

    fn insert(db: &MemoryDatabase, ts: i64, x: i32) -> Result<(), StoreError> {
        let mut conn = db.connection()?;
        conn.execute_with(
            "INSERT INTO t (TIMESTAMP, x) VALUES (?, ?);",
            &[SqlParam::BigInt(ts), SqlParam::Int(x)],
        )?;
        conn.commit()
    }

    #[test]
    fn create_is_idempotent_with_if_not_exists() {
        let db = db_with_table();
        let mut conn = db.connection().unwrap();
        conn.execute(CREATE).unwrap();
        assert_eq!(conn.columns("t").unwrap().len(), 2);
        assert!(conn.table_exists("t").unwrap());
        assert!(!conn.table_exists("u").unwrap());
        assert!(conn.columns("u").unwrap().is_empty());
    }

    #[test]
    fn insert_visible_only_after_commit() {
        let db = db_with_table();
        let mut conn = db.connection().unwrap();
        conn.execute_with(
            "INSERT INTO t (TIMESTAMP, x) VALUES (?, ?);",
            &[SqlParam::BigInt(1), SqlParam::Int(5)],
        )
        .unwrap();
        assert_eq!(db.row_count("t"), Some(0));
        conn.commit().unwrap();
        assert_eq!(db.row_count("t"), Some(1));
    }

    #[test]
    fn rollback_and_drop_discard_staged_rows() {
        let db = db_with_table();
        {
            let mut conn = db.connection().unwrap();
            conn.execute_with(
                "INSERT INTO t (TIMESTAMP, x) VALUES (?, ?);",
                &[SqlParam::BigInt(1), SqlParam::Int(5)],
            )
            .unwrap();
            conn.rollback().unwrap();
            conn.commit().unwrap();
        }
        {
            let mut conn = db.connection().unwrap();
            conn.execute_with(
                "INSERT INTO t (TIMESTAMP, x) VALUES (?, ?);",
                &[SqlParam::BigInt(2), SqlParam::Int(5)],
            )
            .unwrap();
        }
        assert_eq!(db.row_count("t"), Some(0));
        assert_eq!(db.open_connections(), 0);
    }

    #[test]
    fn type_mismatch_and_missing_column_are_schema_errors() {
        let db = db_with_table();
        let mut conn = db.connection().unwrap();
        let err = conn
            .execute_with(
                "INSERT INTO t (TIMESTAMP, x) VALUES (?, ?);",
                &[SqlParam::BigInt(1), SqlParam::Text("nope")],
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);

        let err = conn
            .execute_with(
                "INSERT INTO t (TIMESTAMP, y) VALUES (?, ?);",
                &[SqlParam::BigInt(1), SqlParam::Int(1)],
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);

        let err = conn
            .execute_with("INSERT INTO nope (TIMESTAMP) VALUES (?);", &[SqlParam::BigInt(1)])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
    }

    #[test]
    fn primary_key_is_enforced() {
        let db = db_with_table();
        insert(&db, 1, 1).unwrap();
        assert_eq!(insert(&db, 1, 2).unwrap_err().kind(), ErrorKind::Schema);
        assert_eq!(db.row_count("t"), Some(1));
    }

    #[test]
    fn drop_and_add_column_loses_old_values() {
        let db = db_with_table();
        insert(&db, 1, 42).unwrap();
        let mut conn = db.connection().unwrap();
        conn.execute("ALTER TABLE t DROP COLUMN x;").unwrap();
        conn.execute("ALTER TABLE t ADD COLUMN x VARCHAR(102400);").unwrap();
        let snap = db.snapshot("t").unwrap();
        assert_eq!(snap.column_type("x"), Some(ColumnType::Varchar));
        assert_eq!(snap.value(0, "x"), Some(None));
        assert!(conn.execute("ALTER TABLE t DROP COLUMN TIMESTAMP;").is_err());
    }

    #[test]
    fn delete_limit_removes_at_most_n_rows() {
        let db = db_with_table();
        for ts in 0..5 {
            insert(&db, ts, 0).unwrap();
        }
        let mut conn = db.connection().unwrap();
        assert_eq!(conn.execute("DELETE FROM t LIMIT 2;").unwrap(), 2);
        assert_eq!(db.row_count("t"), Some(3));
        assert_eq!(conn.execute("DELETE FROM t LIMIT 10;").unwrap(), 3);
        assert_eq!(db.row_count("t"), Some(0));
    }

    #[test]
    fn truncate_keeps_schema() {
        let db = db_with_table();
        insert(&db, 1, 1).unwrap();
        db.connection().unwrap().execute("TRUNCATE TABLE t;").unwrap();
        let snap = db.snapshot("t").unwrap();
        assert!(snap.rows.is_empty());
        assert_eq!(snap.column_names(), ["TIMESTAMP", "x"]);
    }

    #[test]
    fn connection_limit_and_accounting() {
        let db = MemoryDatabase::new(1);
        let first = db.connection().unwrap();
        assert_eq!(db.open_connections(), 1);
        assert_eq!(db.connection().err().map(|e| e.kind()), Some(ErrorKind::Io));
        drop(first);
        assert_eq!(db.open_connections(), 0);
        assert!(db.connection().is_ok());
    }

    #[test]
    fn injected_faults_fire_then_clear() {
        let db = db_with_table();
        db.fail_next("insert", 1);
        assert_eq!(insert(&db, 1, 1).unwrap_err().kind(), ErrorKind::Io);
        insert(&db, 1, 1).unwrap();

        db.fail_next("CONNECT", 1);
        assert!(db.connection().is_err());
        assert!(db.connection().is_ok());
    }

    #[test]
    fn config_json() {
        assert_eq!(
            MemoryDatabase::from_config_json("{}").unwrap().shared.max_connections,
            64
        );
        assert_eq!(
            MemoryDatabase::from_config_json(r#"{"max_connections":2}"#)
                .unwrap()
                .shared
                .max_connections,
            2
        );
        assert!(MemoryDatabase::from_config_json(r#"{"max_connections":0}"#).is_err());
    }
}
