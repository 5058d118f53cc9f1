//! Statement text generated by the store.
//!
//! Identifiers are expected to be sanitized already.

use wirestore_api::ColumnType;

pub const TIMESTAMP_COLUMN: &str = "TIMESTAMP";

pub fn create_table(table: &str) -> String {
    format!("CREATE TABLE IF NOT EXISTS {table} ({TIMESTAMP_COLUMN} BIGINT NOT NULL PRIMARY KEY);")
}

pub fn add_column(table: &str, column: &str, column_type: ColumnType) -> String {
    format!("ALTER TABLE {table} ADD COLUMN {column} {column_type};")
}

pub fn drop_column(table: &str, column: &str) -> String {
    format!("ALTER TABLE {table} DROP COLUMN {column};")
}

/// `INSERT` with one `?` per column, in the given order.
pub fn insert<S: AsRef<str>>(table: &str, columns: &[S]) -> String {
    let names: Vec<&str> = columns.iter().map(AsRef::as_ref).collect();
    let placeholders = vec!["?"; columns.len()];
    format!(
        "INSERT INTO {table} ({}) VALUES ({});",
        names.join(", "),
        placeholders.join(", ")
    )
}

pub fn delete_limit(table: &str, limit: u64) -> String {
    format!("DELETE FROM {table} LIMIT {limit};")
}

pub fn truncate(table: &str) -> String {
    format!("TRUNCATE TABLE {table};")
}
