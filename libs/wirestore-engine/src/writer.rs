use std::sync::Arc;

use wirestore_api::{
    ConnectionProvider, IdentifierSanitizer, SqlParam, StoreError, TypedValue, WireRecord,
};

use crate::sql::{self, TIMESTAMP_COLUMN};

/// Sanitized column name for each field, in record order.
///
/// Fields whose names collide after sanitizing, or with the `TIMESTAMP`
/// key, cannot be stored and fail as a precondition. Both checks ignore
/// ASCII case since many engines fold unquoted identifiers.
pub(crate) fn record_columns<'r>(
    record: &'r WireRecord,
    sanitizer: &dyn IdentifierSanitizer,
) -> Result<Vec<(String, &'r TypedValue)>, StoreError> {
    let mut columns: Vec<(String, &TypedValue)> = Vec::with_capacity(record.len());
    for (field, value) in record.fields() {
        let column = sanitizer.sanitize(field);
        if column.eq_ignore_ascii_case(TIMESTAMP_COLUMN) {
            return Err(StoreError::precondition(format!(
                "field '{field}' collides with the {TIMESTAMP_COLUMN} key column"
            )));
        }
        if columns.iter().any(|(c, _)| c.eq_ignore_ascii_case(&column)) {
            return Err(StoreError::precondition(format!(
                "field '{field}' maps to column '{column}' used by another field"
            )));
        }
        columns.push((column, value));
    }
    Ok(columns)
}

/// Inserts one record as one row.
pub struct RecordWriter {
    provider: Arc<dyn ConnectionProvider>,
    sanitizer: Arc<dyn IdentifierSanitizer>,
}

impl RecordWriter {
    pub fn new(
        provider: Arc<dyn ConnectionProvider>,
        sanitizer: Arc<dyn IdentifierSanitizer>,
    ) -> Self {
        Self {
            provider,
            sanitizer,
        }
    }

    /// Insert `record` with `timestamp` as its key and commit.
    ///
    /// On failure the transaction is rolled back before the error is
    /// returned. The connection is released on every path.
    pub fn insert(&self, table: &str, record: &WireRecord, timestamp: i64) -> Result<(), StoreError> {
        let columns = record_columns(record, self.sanitizer.as_ref())?;

        let mut names: Vec<&str> = Vec::with_capacity(columns.len() + 1);
        let mut params: Vec<SqlParam<'_>> = Vec::with_capacity(columns.len() + 1);
        names.push(TIMESTAMP_COLUMN);
        params.push(SqlParam::BigInt(timestamp));
        for (column, value) in &columns {
            names.push(column);
            params.push(value.as_param());
        }

        let stmt = sql::insert(table, &names);
        tracing::debug!(statement = %stmt, params = params.len(), "inserting record");

        let mut conn = self.provider.connection()?;
        let result = conn
            .execute_with(&stmt, &params)
            .and_then(|_| conn.commit());
        if let Err(e) = result {
            if let Err(rb) = conn.rollback() {
                tracing::warn!(table = %table, error = %rb, "rollback failed");
            }
            return Err(e);
        }
        Ok(())
    }
}
