use super::{ColumnType, Dialect};
use crate::ErrorKind;
use crate::error::NativeError;

/// Primary result code for `SQLITE_BUSY`.
const SQLITE_BUSY: u32 = 5;
/// Primary result code for `SQLITE_CONSTRAINT`.
const SQLITE_CONSTRAINT: u32 = 19;

/// SQLite rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn quote_char(&self) -> char {
        '"'
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn column_type(&self, ty: ColumnType) -> &'static str {
        match ty {
            ColumnType::String => "VARCHAR(255)",
            ColumnType::Text | ColumnType::Json => "CLOB",
            ColumnType::Integer => "INTEGER",
            ColumnType::SmallInt => "SMALLINT",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Float => "DOUBLE PRECISION",
            ColumnType::Decimal => "NUMERIC(10, 0)",
            ColumnType::Date => "DATE",
            ColumnType::DateTime => "DATETIME",
            ColumnType::Time => "TIME",
            ColumnType::Binary => "BLOB",
            ColumnType::Guid => "CHAR(36)",
        }
    }

    // SQLite reports most failures as SQLITE_ERROR, so the message decides.
    fn classify(&self, native: &NativeError) -> ErrorKind {
        let message = native.message.to_lowercase();
        let primary = native
            .code
            .as_deref()
            .and_then(|c| c.parse::<u32>().ok())
            .map(|c| c & 0xFF);

        if message.contains("already exists") {
            ErrorKind::TableAlreadyExists
        } else if message.contains("no such table") {
            ErrorKind::TableNotFound
        } else if primary == Some(SQLITE_CONSTRAINT)
            || message.contains("constraint failed")
            || message.contains("is not unique")
            || message.contains("must be unique")
        {
            ErrorKind::ConstraintViolation
        } else if primary == Some(SQLITE_BUSY) {
            ErrorKind::Timeout
        } else {
            ErrorKind::Other
        }
    }
}
