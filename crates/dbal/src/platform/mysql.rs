use super::{ColumnType, Dialect, DialectVersion};
use crate::ErrorKind;
use crate::error::NativeError;

const JSON_SINCE: DialectVersion = DialectVersion::new(5, 7, 8);
const UCA_0900_SINCE: DialectVersion = DialectVersion::new(8, 0, 0);

const TABLE_OPTIONS_LEGACY: &str =
    "DEFAULT CHARACTER SET utf8mb4 COLLATE `utf8mb4_unicode_ci` ENGINE = InnoDB";
const TABLE_OPTIONS: &str =
    "DEFAULT CHARACTER SET utf8mb4 COLLATE `utf8mb4_0900_ai_ci` ENGINE = InnoDB";

/// MySQL and MariaDB rules. Without a version the newest rules apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MysqlDialect {
    pub(crate) version: Option<DialectVersion>,
}

impl MysqlDialect {
    #[must_use]
    pub const fn new(version: Option<DialectVersion>) -> Self {
        Self { version }
    }

    #[must_use]
    pub const fn version(&self) -> Option<DialectVersion> {
        self.version
    }

    fn at_least(&self, since: DialectVersion) -> bool {
        self.version.is_none_or(|v| v >= since)
    }
}

impl Dialect for MysqlDialect {
    fn quote_char(&self) -> char {
        '`'
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn column_type(&self, ty: ColumnType) -> &'static str {
        match ty {
            ColumnType::String => "VARCHAR(255)",
            ColumnType::Text => "LONGTEXT",
            ColumnType::Integer => "INT",
            ColumnType::SmallInt => "SMALLINT",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Boolean => "TINYINT(1)",
            ColumnType::Float => "DOUBLE PRECISION",
            ColumnType::Decimal => "NUMERIC(10, 0)",
            ColumnType::Date => "DATE",
            ColumnType::DateTime => "DATETIME",
            ColumnType::Time => "TIME",
            ColumnType::Json if self.at_least(JSON_SINCE) => "JSON",
            ColumnType::Json => "LONGTEXT",
            ColumnType::Binary => "LONGBLOB",
            ColumnType::Guid => "CHAR(36)",
        }
    }

    fn table_options(&self) -> Option<&'static str> {
        if self.at_least(UCA_0900_SINCE) {
            Some(TABLE_OPTIONS)
        } else {
            Some(TABLE_OPTIONS_LEGACY)
        }
    }

    fn empty_insert(&self, quoted_table: &str) -> String {
        format!("INSERT INTO {quoted_table} () VALUES ()")
    }

    fn classify(&self, native: &NativeError) -> ErrorKind {
        let Some(code) = native.code.as_deref().and_then(|c| c.parse::<u32>().ok()) else {
            return ErrorKind::Other;
        };

        match code {
            1050 => ErrorKind::TableAlreadyExists,
            1051 | 1146 => ErrorKind::TableNotFound,
            1022 | 1048 | 1062 | 1216 | 1217 | 1451 | 1452 | 1557 | 1586 | 3819 | 4025 => {
                ErrorKind::ConstraintViolation
            }
            // server gone away, lost during query, can't connect, killed
            1927 | 2002 | 2006 | 2013 => ErrorKind::ConnectionLost,
            // lock wait timeout, max_execution_time exceeded
            1205 | 3024 => ErrorKind::Timeout,
            _ => ErrorKind::Other,
        }
    }
}
