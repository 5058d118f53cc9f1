use wirestore_api::{ColumnInfo, ColumnType, SqlParam, StoreError, TypedValue};

use crate::sql::ColumnDef;

/// One table: typed columns plus rows aligned to them.
#[derive(Debug, Clone)]
pub(crate) struct Table {
    pub columns: Vec<ColumnDef>,
    pub rows: Vec<Vec<Option<TypedValue>>>,
}

impl Table {
    pub fn new(columns: Vec<ColumnDef>) -> Result<Self, StoreError> {
        for (i, c) in columns.iter().enumerate() {
            if columns[..i].iter().any(|p| p.name == c.name) {
                return Err(StoreError::schema(format!("duplicate column '{}'", c.name)));
            }
        }
        Ok(Self {
            columns,
            rows: Vec::new(),
        })
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn add_column(&mut self, column: ColumnDef) -> Result<(), StoreError> {
        if self.column_index(&column.name).is_some() {
            return Err(StoreError::schema(format!(
                "column '{}' already exists",
                column.name
            )));
        }
        if column.not_null && !self.rows.is_empty() {
            return Err(StoreError::schema(format!(
                "cannot add NOT NULL column '{}' to a non-empty table",
                column.name
            )));
        }
        self.columns.push(column);
        for row in &mut self.rows {
            row.push(None);
        }
        Ok(())
    }

    pub fn drop_column(&mut self, name: &str) -> Result<(), StoreError> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| StoreError::schema(format!("no such column: {name}")))?;
        if self.columns[idx].primary_key {
            return Err(StoreError::schema(format!(
                "cannot drop primary key column '{name}'"
            )));
        }
        self.columns.remove(idx);
        for row in &mut self.rows {
            row.remove(idx);
        }
        Ok(())
    }

    /// Build a full row from named values, checking types and constraints.
    pub fn build_row(
        &self,
        values: &[(String, TypedValue)],
    ) -> Result<Vec<Option<TypedValue>>, StoreError> {
        let mut row: Vec<Option<TypedValue>> = vec![None; self.columns.len()];
        for (name, value) in values {
            let idx = self
                .column_index(name)
                .ok_or_else(|| StoreError::schema(format!("no such column: {name}")))?;
            if row[idx].is_some() {
                return Err(StoreError::schema(format!(
                    "column '{name}' specified more than once"
                )));
            }
            let expected = self.columns[idx].column_type;
            if !accepts(expected, value) {
                return Err(StoreError::schema(format!(
                    "type mismatch for column '{name}': column is {expected}, value is {}",
                    value.kind()
                )));
            }
            row[idx] = Some(value.clone());
        }
        for (idx, column) in self.columns.iter().enumerate() {
            if (column.not_null || column.primary_key) && row[idx].is_none() {
                return Err(StoreError::schema(format!(
                    "NULL not allowed for column '{}'",
                    column.name
                )));
            }
        }
        Ok(row)
    }

    /// Primary key value of a built row, if the table has a key.
    pub fn key_of(&self, row: &[Option<TypedValue>]) -> Option<TypedValue> {
        let idx = self.columns.iter().position(|c| c.primary_key)?;
        row[idx].clone()
    }

    pub fn has_key(&self, key: &TypedValue) -> bool {
        let Some(idx) = self.columns.iter().position(|c| c.primary_key) else {
            return false;
        };
        self.rows.iter().any(|r| r[idx].as_ref() == Some(key))
    }

    pub fn column_infos(&self) -> Vec<ColumnInfo> {
        self.columns
            .iter()
            .map(|c| ColumnInfo {
                name: c.name.clone(),
                column_type: c.column_type,
            })
            .collect()
    }
}

fn accepts(column_type: ColumnType, value: &TypedValue) -> bool {
    matches!(
        (column_type, value),
        (ColumnType::Boolean, TypedValue::Boolean(_))
            | (ColumnType::TinyInt, TypedValue::Byte(_))
            | (ColumnType::SmallInt, TypedValue::Short(_))
            | (ColumnType::Integer, TypedValue::Integer(_))
            | (ColumnType::BigInt, TypedValue::Long(_))
            | (ColumnType::Double, TypedValue::Double(_))
            | (ColumnType::Varchar, TypedValue::String(_))
            | (ColumnType::Binary, TypedValue::ByteArray(_))
    )
}

/// Owned copy of a bound parameter.
pub(crate) fn param_value(param: &SqlParam<'_>) -> TypedValue {
    match *param {
        SqlParam::Bool(v) => TypedValue::Boolean(v),
        SqlParam::TinyInt(v) => TypedValue::Byte(v),
        SqlParam::SmallInt(v) => TypedValue::Short(v),
        SqlParam::Int(v) => TypedValue::Integer(v),
        SqlParam::BigInt(v) => TypedValue::Long(v),
        SqlParam::Double(v) => TypedValue::Double(v),
        SqlParam::Text(v) => TypedValue::String(v.to_string()),
        SqlParam::Bytes(v) => TypedValue::ByteArray(v.to_vec()),
    }
}

/// Read-only copy of a table, for inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSnapshot {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<Option<TypedValue>>>,
}

impl TableSnapshot {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column_type(&self, column: &str) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|c| c.name == column)
            .map(|c| c.column_type)
    }

    /// Value of `column` in row `row`. `None` when the column is unknown,
    /// `Some(None)` for a NULL cell.
    pub fn value(&self, row: usize, column: &str) -> Option<Option<&TypedValue>> {
        let idx = self.columns.iter().position(|c| c.name == column)?;
        self.rows.get(row).map(|r| r[idx].as_ref())
    }
}
