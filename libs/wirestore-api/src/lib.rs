pub mod config;
pub mod connection;
pub mod emitter;
pub mod error;
pub mod record;
pub mod schema;
pub mod value;

pub use connection::{Connection, ConnectionProvider};
pub use emitter::{CollectingEmitter, NullEmitter, RecordEmitter};
pub use error::{ErrorKind, StoreError};
pub use record::WireRecord;
pub use schema::{
    ColumnInfo, ColumnType, DefaultTypeMapper, IdentifierSanitizer, RESERVED_WORDS,
    SqlIdentifierSanitizer, TypeMapper, is_reserved_word,
};
pub use value::{SqlParam, TypedValue, ValueKind};
