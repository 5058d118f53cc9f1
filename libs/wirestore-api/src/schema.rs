use std::fmt;

use crate::value::ValueKind;

/// Native column type of the backing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Double,
    Varchar,
    Binary,
}

/// Width of text columns created for string fields.
pub const VARCHAR_LENGTH: usize = 102_400;

impl ColumnType {
    /// DDL type string used in `ADD COLUMN`.
    pub fn type_string(&self) -> String {
        match self {
            ColumnType::Boolean => "BOOLEAN".into(),
            ColumnType::TinyInt => "TINYINT".into(),
            ColumnType::SmallInt => "SMALLINT".into(),
            ColumnType::Integer => "INTEGER".into(),
            ColumnType::BigInt => "BIGINT".into(),
            ColumnType::Double => "DOUBLE".into(),
            ColumnType::Varchar => format!("VARCHAR({VARCHAR_LENGTH})"),
            ColumnType::Binary => "BINARY".into(),
        }
    }

    /// Parse a DDL type string. Length/precision suffixes are ignored,
    /// so `VARCHAR(64)` and `VARCHAR(102400)` are the same type.
    pub fn parse(s: &str) -> Option<Self> {
        let base = s.split('(').next().unwrap_or(s).trim();
        match base.to_ascii_uppercase().as_str() {
            "BOOLEAN" | "BOOL" => Some(ColumnType::Boolean),
            "TINYINT" => Some(ColumnType::TinyInt),
            "SMALLINT" => Some(ColumnType::SmallInt),
            "INTEGER" | "INT" => Some(ColumnType::Integer),
            "BIGINT" => Some(ColumnType::BigInt),
            "DOUBLE" => Some(ColumnType::Double),
            "VARCHAR" => Some(ColumnType::Varchar),
            "BINARY" | "VARBINARY" => Some(ColumnType::Binary),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.type_string())
    }
}

/// One live column as reported by table metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub column_type: ColumnType,
}

/// Maps a value kind to the column type that stores it.
pub trait TypeMapper: Send + Sync {
    fn column_type(&self, kind: ValueKind) -> ColumnType;
}

/// Default mapping, one column type per value kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTypeMapper;

impl TypeMapper for DefaultTypeMapper {
    fn column_type(&self, kind: ValueKind) -> ColumnType {
        match kind {
            ValueKind::Boolean => ColumnType::Boolean,
            ValueKind::Byte => ColumnType::TinyInt,
            ValueKind::Short => ColumnType::SmallInt,
            ValueKind::Integer => ColumnType::Integer,
            ValueKind::Long => ColumnType::BigInt,
            ValueKind::Double => ColumnType::Double,
            ValueKind::String => ColumnType::Varchar,
            ValueKind::ByteArray => ColumnType::Binary,
        }
    }
}

/// Maps an arbitrary name to an identifier safe for direct inclusion in SQL.
pub trait IdentifierSanitizer: Send + Sync {
    fn sanitize(&self, name: &str) -> String;
}

/// SQL keywords that cannot appear as bare identifiers. `TIMESTAMP` is
/// left out: it names the key column.
pub const RESERVED_WORDS: &[&str] = &[
    "ADD", "ALL", "ALTER", "AND", "ANY", "AS", "ASC", "BETWEEN", "BY", "CASE", "CAST", "CHECK",
    "COLUMN", "CONSTRAINT", "CREATE", "CROSS", "CURRENT_DATE", "CURRENT_TIME",
    "CURRENT_TIMESTAMP", "CURRENT_USER", "DEFAULT", "DELETE", "DESC", "DISTINCT", "DROP", "ELSE",
    "END", "EXCEPT", "EXISTS", "FALSE", "FETCH", "FOR", "FOREIGN", "FROM", "FULL", "GRANT",
    "GROUP", "HAVING", "IF", "IN", "INDEX", "INNER", "INSERT", "INTERSECT", "INTO", "IS", "JOIN",
    "KEY", "LEFT", "LIKE", "LIMIT", "NOT", "NULL", "OFFSET", "ON", "OR", "ORDER", "OUTER",
    "PRIMARY", "REFERENCES", "REVOKE", "RIGHT", "SELECT", "SET", "TABLE", "THEN", "TO", "TRUE",
    "TRUNCATE", "UNION", "UNIQUE", "UPDATE", "USER", "USING", "VALUES", "WHEN", "WHERE", "WITH",
];

/// Whether `word` is a reserved SQL keyword, ignoring ASCII case.
pub fn is_reserved_word(word: &str) -> bool {
    RESERVED_WORDS.iter().any(|r| r.eq_ignore_ascii_case(word))
}

/// Keeps `[A-Za-z0-9_]`, replaces anything else with `_`.
/// Names that are empty, start with a digit or are reserved words get a
/// leading `_`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlIdentifierSanitizer;

impl IdentifierSanitizer for SqlIdentifierSanitizer {
    fn sanitize(&self, name: &str) -> String {
        let mut out = String::with_capacity(name.len() + 1);
        if name.chars().next().is_none_or(|c| c.is_ascii_digit()) || is_reserved_word(name) {
            out.push('_');
        }
        out.extend(
            name.chars()
                .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' }),
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_strings_parse_back() {
        for t in [
            ColumnType::Boolean,
            ColumnType::TinyInt,
            ColumnType::SmallInt,
            ColumnType::Integer,
            ColumnType::BigInt,
            ColumnType::Double,
            ColumnType::Varchar,
            ColumnType::Binary,
        ] {
            assert_eq!(ColumnType::parse(&t.type_string()), Some(t));
        }
        assert_eq!(ColumnType::parse("varchar(12)"), Some(ColumnType::Varchar));
        assert_eq!(ColumnType::parse("JSONB"), None);
    }

    #[test]
    fn string_maps_to_varchar() {
        assert_eq!(DefaultTypeMapper.column_type(ValueKind::String), ColumnType::Varchar);
        assert_eq!(DefaultTypeMapper.column_type(ValueKind::Integer), ColumnType::Integer);
    }

    #[test]
    fn sanitizer_output_is_plain_identifier() {
        let s = SqlIdentifierSanitizer;
        assert_eq!(s.sanitize("temperature"), "temperature");
        assert_eq!(s.sanitize("WR_sensor"), "WR_sensor");
        assert_eq!(s.sanitize("a b;DROP TABLE x"), "a_b_DROP_TABLE_x");
        assert_eq!(s.sanitize("1st"), "_1st");
        assert_eq!(s.sanitize(""), "_");
        assert_eq!(s.sanitize("\"quoted\""), "_quoted_");
    }

    #[test]
    fn reserved_words_are_prefixed() {
        let s = SqlIdentifierSanitizer;
        for (name, column) in [
            ("order", "_order"),
            ("SELECT", "_SELECT"),
            ("From", "_From"),
            ("limit", "_limit"),
            ("orders", "orders"),
            ("timestamp", "timestamp"),
        ] {
            assert_eq!(s.sanitize(name), column);
        }
    }
}
