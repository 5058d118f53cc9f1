use crate::error::StoreError;
use crate::schema::ColumnInfo;
use crate::value::SqlParam;

/// A transactional database connection.
///
/// Obtained from a `ConnectionProvider` for one operation sequence and
/// never shared between execution contexts. Dropping the connection
/// releases it; uncommitted work is discarded at that point.
///
/// Identifiers passed to the metadata methods are already sanitized.
pub trait Connection: Send {
    /// Does a table with this name exist?
    fn table_exists(&mut self, table: &str) -> Result<bool, StoreError>;

    /// Live column set of a table, in declaration order.
    /// Empty when the table does not exist.
    fn columns(&mut self, table: &str) -> Result<Vec<ColumnInfo>, StoreError>;

    /// Execute a statement without parameters. Returns affected rows.
    ///
    /// DDL, `DELETE` and `TRUNCATE` take effect immediately.
    fn execute(&mut self, sql: &str) -> Result<u64, StoreError>;

    /// Execute a statement with positional `?` parameters.
    /// Takes effect on `commit()`.
    fn execute_with(&mut self, sql: &str, params: &[SqlParam<'_>]) -> Result<u64, StoreError>;

    fn commit(&mut self) -> Result<(), StoreError>;

    fn rollback(&mut self) -> Result<(), StoreError>;
}

/// Hands out independent connections.
///
/// The engine doesn't know concrete backends. For the engine, a database
/// is just this trait.
pub trait ConnectionProvider: Send + Sync {
    /// Fails with an `Io` error when no connection is available.
    fn connection(&self) -> Result<Box<dyn Connection>, StoreError>;
}
