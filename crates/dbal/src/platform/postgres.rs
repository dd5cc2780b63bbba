use super::{ColumnType, Dialect, DialectVersion};
use crate::ErrorKind;
use crate::error::NativeError;

const JSON_SINCE: DialectVersion = DialectVersion::new(9, 2, 0);
const JSONB_SINCE: DialectVersion = DialectVersion::new(9, 4, 0);

/// PostgreSQL rules. Without a version the newest rules apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PostgresDialect {
    pub(crate) version: Option<DialectVersion>,
}

impl PostgresDialect {
    #[must_use]
    pub const fn new(version: Option<DialectVersion>) -> Self {
        Self { version }
    }

    #[must_use]
    pub const fn version(&self) -> Option<DialectVersion> {
        self.version
    }

    fn json_type(&self) -> &'static str {
        match self.version {
            None => "JSONB",
            Some(v) if v >= JSONB_SINCE => "JSONB",
            Some(v) if v >= JSON_SINCE => "JSON",
            Some(_) => "TEXT",
        }
    }
}

impl Dialect for PostgresDialect {
    fn quote_char(&self) -> char {
        '"'
    }

    fn placeholder(&self, index: usize) -> String {
        format!("${index}")
    }

    fn column_type(&self, ty: ColumnType) -> &'static str {
        match ty {
            ColumnType::String => "VARCHAR(255)",
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "INT",
            ColumnType::SmallInt => "SMALLINT",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Float => "DOUBLE PRECISION",
            ColumnType::Decimal => "NUMERIC(10, 0)",
            ColumnType::Date => "DATE",
            ColumnType::DateTime => "TIMESTAMP(0) WITHOUT TIME ZONE",
            ColumnType::Time => "TIME(0) WITHOUT TIME ZONE",
            ColumnType::Json => self.json_type(),
            ColumnType::Binary => "BYTEA",
            ColumnType::Guid => "UUID",
        }
    }

    fn classify(&self, native: &NativeError) -> ErrorKind {
        let Some(state) = native.code.as_deref() else {
            return ErrorKind::Other;
        };

        match state {
            "42P07" => ErrorKind::TableAlreadyExists,
            "42P01" => ErrorKind::TableNotFound,
            "08P01" => ErrorKind::ProtocolError,
            // admin_shutdown, crash_shutdown, cannot_connect_now
            "57P01" | "57P02" | "57P03" => ErrorKind::ConnectionLost,
            "57014" => ErrorKind::Timeout,
            s if s.starts_with("23") => ErrorKind::ConstraintViolation,
            s if s.starts_with("08") => ErrorKind::ConnectionLost,
            _ => ErrorKind::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db(state: &str) -> NativeError {
        NativeError::database(Some(state.to_string()), "error")
    }

    #[test]
    fn test_postgres_classify_sqlstates() {
        let d = PostgresDialect::default();
        assert_eq!(d.classify(&db("42P07")), ErrorKind::TableAlreadyExists);
        assert_eq!(d.classify(&db("42P01")), ErrorKind::TableNotFound);
        assert_eq!(d.classify(&db("23505")), ErrorKind::ConstraintViolation);
        assert_eq!(d.classify(&db("23502")), ErrorKind::ConstraintViolation);
        assert_eq!(d.classify(&db("08006")), ErrorKind::ConnectionLost);
        assert_eq!(d.classify(&db("57P01")), ErrorKind::ConnectionLost);
        assert_eq!(d.classify(&db("08P01")), ErrorKind::ProtocolError);
        assert_eq!(d.classify(&db("57014")), ErrorKind::Timeout);
        assert_eq!(d.classify(&db("42601")), ErrorKind::Other);
    }

    #[test]
    fn test_postgres_json_type_by_version() {
        let v = |major, minor| PostgresDialect::new(Some(DialectVersion::new(major, minor, 0)));
        assert_eq!(v(9, 1).column_type(ColumnType::Json), "TEXT");
        assert_eq!(v(9, 2).column_type(ColumnType::Json), "JSON");
        assert_eq!(v(9, 4).column_type(ColumnType::Json), "JSONB");
        assert_eq!(PostgresDialect::default().column_type(ColumnType::Json), "JSONB");
    }

    #[test]
    fn test_postgres_placeholders_are_numbered() {
        let d = PostgresDialect::default();
        assert_eq!(d.placeholder(1), "$1");
        assert_eq!(d.placeholder(12), "$12");
    }
}
