use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Portable column types accepted by `create_table`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    String,
    Text,
    Integer,
    SmallInt,
    BigInt,
    Boolean,
    Float,
    Decimal,
    Date,
    DateTime,
    Time,
    Json,
    Binary,
    Guid,
}

impl ColumnType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Text => "text",
            Self::Integer => "integer",
            Self::SmallInt => "smallint",
            Self::BigInt => "bigint",
            Self::Boolean => "boolean",
            Self::Float => "float",
            Self::Decimal => "decimal",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Time => "time",
            Self::Json => "json",
            Self::Binary => "binary",
            Self::Guid => "guid",
        }
    }
}

impl FromStr for ColumnType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "string" | "varchar" => Self::String,
            "text" => Self::Text,
            "integer" | "int" => Self::Integer,
            "smallint" => Self::SmallInt,
            "bigint" => Self::BigInt,
            "boolean" | "bool" => Self::Boolean,
            "float" | "double" => Self::Float,
            "decimal" | "numeric" => Self::Decimal,
            "date" => Self::Date,
            "datetime" | "timestamp" => Self::DateTime,
            "time" => Self::Time,
            "json" => Self::Json,
            "binary" | "blob" => Self::Binary,
            "guid" | "uuid" => Self::Guid,
            _ => return Err(Error::UnknownColumnType(s.to_string())),
        })
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
