//! SQL dialect layer.
//!
//! A [`Platform`] knows how one engine quotes identifiers, names column types,
//! writes placeholders and reports errors. It holds no connection state and is
//! `Copy`, so every slot of a pool shares the same value.

mod mysql;
mod postgres;
mod sqlite;
mod types;

use std::fmt;
use std::fmt::Write as _;
use std::str::FromStr;

pub use mysql::MysqlDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;
pub use types::ColumnType;

use crate::error::{NativeError, NativeErrorSource};
use crate::{Engine, Error, ErrorKind, Result, Value};

/// Lightweight round-trip used to verify a fresh connection.
pub const VERIFICATION_QUERY: &str = "SELECT 1";

/// Engine version used to pick dialect rules, e.g. `5.7` or `9.4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DialectVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl DialectVersion {
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl FromStr for DialectVersion {
    type Err = Error;

    /// Accepts `8`, `5.7`, `8.0.32` and vendor suffixes like `8.0.32-0ubuntu`.
    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.trim().split('.').map(|part| {
            let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
            digits.parse::<u32>().ok()
        });

        let major = parts
            .next()
            .flatten()
            .ok_or_else(|| Error::Config(format!("invalid driver_version: '{s}'")))?;
        let minor = parts.next().flatten().unwrap_or(0);
        let patch = parts.next().flatten().unwrap_or(0);

        Ok(Self::new(major, minor, patch))
    }
}

impl fmt::Display for DialectVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// A generated statement with its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Per-engine rules the statement builders are parameterized over.
pub(crate) trait Dialect {
    fn quote_char(&self) -> char;

    /// Placeholder for the `index`-th parameter, 1-based.
    fn placeholder(&self, index: usize) -> String;

    fn column_type(&self, ty: ColumnType) -> &'static str;

    /// Trailing `CREATE TABLE` options.
    fn table_options(&self) -> Option<&'static str> {
        None
    }

    fn empty_insert(&self, quoted_table: &str) -> String {
        format!("INSERT INTO {quoted_table} DEFAULT VALUES")
    }

    /// Classifies an error the engine reported for a statement.
    fn classify(&self, native: &NativeError) -> ErrorKind;
}

/// Dialect strategy for one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Mysql(MysqlDialect),
    Postgres(PostgresDialect),
    Sqlite(SqliteDialect),
}

impl Platform {
    #[must_use]
    pub const fn for_engine(engine: Engine, version: Option<DialectVersion>) -> Self {
        match engine {
            Engine::Mysql => Self::Mysql(MysqlDialect::new(version)),
            Engine::Postgres => Self::Postgres(PostgresDialect::new(version)),
            Engine::Sqlite => Self::Sqlite(SqliteDialect),
        }
    }

    /// Selects the platform for an engine and an optional version string.
    pub fn new(engine: Engine, version: Option<&str>) -> Result<Self> {
        let version = version
            .filter(|v| !v.trim().is_empty())
            .map(str::parse)
            .transpose()?;
        Ok(Self::for_engine(engine, version))
    }

    #[must_use]
    pub const fn engine(&self) -> Engine {
        match self {
            Self::Mysql(_) => Engine::Mysql,
            Self::Postgres(_) => Engine::Postgres,
            Self::Sqlite(_) => Engine::Sqlite,
        }
    }

    fn dialect(&self) -> &dyn Dialect {
        match self {
            Self::Mysql(d) => d,
            Self::Postgres(d) => d,
            Self::Sqlite(d) => d,
        }
    }

    /// Quotes a table or column name; dotted names are quoted per part.
    #[must_use]
    pub fn quote_identifier(&self, name: &str) -> String {
        let quote = self.dialect().quote_char();
        let escaped = format!("{quote}{quote}");
        name.split('.')
            .map(|part| format!("{quote}{}{quote}", part.replace(quote, &escaped)))
            .collect::<Vec<_>>()
            .join(".")
    }

    pub fn build_create_table(&self, table: &str, columns: &[(String, ColumnType)]) -> Result<String> {
        let dialect = self.dialect();
        let table = self.quoted_name(table, "table")?;
        if columns.is_empty() {
            return Err(Error::InvalidStatement(format!(
                "table {table} needs at least one column"
            )));
        }

        let mut sql = format!("CREATE TABLE {table} (");
        for (i, (name, ty)) in columns.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            let column = self.quoted_name(name, "column")?;
            let _ = write!(sql, "{column} {} NOT NULL", dialect.column_type(*ty));
        }
        sql.push(')');

        if let Some(options) = dialect.table_options() {
            sql.push(' ');
            sql.push_str(options);
        }
        Ok(sql)
    }

    pub fn build_drop_table(&self, table: &str) -> Result<String> {
        Ok(format!("DROP TABLE {}", self.quoted_name(table, "table")?))
    }

    pub fn build_insert(&self, table: &str, values: &[(String, Value)]) -> Result<Statement> {
        let dialect = self.dialect();
        let table = self.quoted_name(table, "table")?;
        if values.is_empty() {
            return Ok(Statement {
                sql: dialect.empty_insert(&table),
                params: Vec::new(),
            });
        }

        let columns = values
            .iter()
            .map(|(name, _)| self.quoted_name(name, "column"))
            .collect::<Result<Vec<_>>>()?;
        let placeholders: Vec<String> = (1..=values.len()).map(|i| dialect.placeholder(i)).collect();

        Ok(Statement {
            sql: format!(
                "INSERT INTO {table} ({}) VALUES ({})",
                columns.join(", "),
                placeholders.join(", ")
            ),
            params: values.iter().map(|(_, v)| v.clone()).collect(),
        })
    }

    /// Equality conjunction over `criteria`; `Null` criteria become `IS NULL`.
    pub fn build_find_one_by(&self, table: &str, criteria: &[(String, Value)]) -> Result<Statement> {
        let dialect = self.dialect();
        let mut sql = format!("SELECT * FROM {}", self.quoted_name(table, "table")?);
        let mut params = Vec::with_capacity(criteria.len());

        for (i, (name, value)) in criteria.iter().enumerate() {
            sql.push_str(if i == 0 { " WHERE " } else { " AND " });
            let column = self.quoted_name(name, "column")?;
            if value.is_null() {
                let _ = write!(sql, "{column} IS NULL");
            } else {
                params.push(value.clone());
                let _ = write!(sql, "{column} = {}", dialect.placeholder(params.len()));
            }
        }
        sql.push_str(" LIMIT 1");

        Ok(Statement { sql, params })
    }

    #[must_use]
    pub const fn verification_query(&self) -> &'static str {
        VERIFICATION_QUERY
    }

    /// Maps a native error onto the portable taxonomy.
    #[must_use]
    pub fn classify_error(&self, native: &NativeError) -> ErrorKind {
        match native.source {
            NativeErrorSource::Transport => ErrorKind::ConnectionLost,
            NativeErrorSource::Protocol => ErrorKind::ProtocolError,
            NativeErrorSource::Timeout => ErrorKind::Timeout,
            NativeErrorSource::Codec => ErrorKind::Other,
            NativeErrorSource::Database => self.dialect().classify(native),
        }
    }

    fn quoted_name(&self, name: &str, what: &str) -> Result<String> {
        if name.trim().is_empty() {
            return Err(Error::InvalidStatement(format!("{what} name must not be empty")));
        }
        Ok(self.quote_identifier(name))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mysql(MysqlDialect { version: Some(v) })
            | Self::Postgres(PostgresDialect { version: Some(v) }) => {
                write!(f, "{} {v}", self.engine())
            }
            _ => write!(f, "{}", self.engine()),
        }
    }
}
