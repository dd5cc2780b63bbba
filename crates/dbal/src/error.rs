//! Portable error taxonomy.
//!
//! Drivers report failures as [`NativeError`] values. The owning
//! [`Platform`](crate::Platform) classifies them into an [`ErrorKind`], and the
//! facade surfaces the pair as an [`Error`] variant so callers can recover with
//! a plain `match`:
//!
//! ```no_run
//! # async fn demo(conn: &dbal::Connection) -> dbal::Result<()> {
//! match conn.create_table("test", [("id", "string")]).await {
//!     Ok(()) | Err(dbal::Error::TableAlreadyExists(_)) => {}
//!     Err(e) => return Err(e),
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Where a native failure originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeErrorSource {
    /// The engine answered with an error for the statement.
    Database,
    /// The transport failed (socket closed, reset, worker gone).
    Transport,
    /// The engine sent something the driver could not understand.
    Protocol,
    /// The operation did not finish in time.
    Timeout,
    /// A value could not be encoded or decoded.
    Codec,
}

/// An error as reported by a specific engine driver, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeError {
    pub source: NativeErrorSource,
    /// Engine error code: MySQL error number, PostgreSQL SQLSTATE, SQLite
    /// extended result code.
    pub code: Option<String>,
    pub message: String,
}

impl NativeError {
    #[must_use]
    pub fn database(code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            source: NativeErrorSource::Database,
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            source: NativeErrorSource::Transport,
            code: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self {
            source: NativeErrorSource::Protocol,
            code: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn timeout(after: Duration) -> Self {
        Self {
            source: NativeErrorSource::Timeout,
            code: None,
            message: format!("operation timed out after {after:?}"),
        }
    }

    #[must_use]
    pub fn codec(message: impl Into<String>) -> Self {
        Self {
            source: NativeErrorSource::Codec,
            code: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{code}] {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for NativeError {}

/// Portable classification of a native error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TableAlreadyExists,
    TableNotFound,
    ConstraintViolation,
    ConnectionLost,
    Timeout,
    ProtocolError,
    Other,
}

impl ErrorKind {
    /// Connection-level kinds leave the physical connection in an unknown
    /// state; the slot is recycled after them.
    #[must_use]
    pub const fn is_connection_level(self) -> bool {
        matches!(self, Self::ConnectionLost | Self::ProtocolError)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TableAlreadyExists => "table_already_exists",
            Self::TableNotFound => "table_not_found",
            Self::ConstraintViolation => "constraint_violation",
            Self::ConnectionLost => "connection_lost",
            Self::Timeout => "timeout",
            Self::ProtocolError => "protocol_error",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Unsupported engine: {0}")]
    UnsupportedEngine(String),

    #[error("Unknown column type: {0}")]
    UnknownColumnType(String),

    #[error("Invalid statement: {0}")]
    InvalidStatement(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Handshake failed: {0}")]
    HandshakeFailed(NativeError),

    #[error("Connection pool is closed")]
    PoolClosed,

    #[error("Connection lost: {0}")]
    ConnectionLost(NativeError),

    #[error("Timeout: {0}")]
    Timeout(NativeError),

    #[error("Table already exists: {0}")]
    TableAlreadyExists(NativeError),

    #[error("Table not found: {0}")]
    TableNotFound(NativeError),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(NativeError),

    #[error("Protocol error: {0}")]
    ProtocolError(NativeError),

    #[error("Database error: {0}")]
    Other(NativeError),
}

impl Error {
    /// Builds the variant matching a classified native error.
    #[must_use]
    pub const fn from_native(kind: ErrorKind, native: NativeError) -> Self {
        match kind {
            ErrorKind::TableAlreadyExists => Self::TableAlreadyExists(native),
            ErrorKind::TableNotFound => Self::TableNotFound(native),
            ErrorKind::ConstraintViolation => Self::ConstraintViolation(native),
            ErrorKind::ConnectionLost => Self::ConnectionLost(native),
            ErrorKind::Timeout => Self::Timeout(native),
            ErrorKind::ProtocolError => Self::ProtocolError(native),
            ErrorKind::Other => Self::Other(native),
        }
    }

    /// Portable kind for errors that came from a driver.
    #[must_use]
    pub const fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::TableAlreadyExists(_) => Some(ErrorKind::TableAlreadyExists),
            Self::TableNotFound(_) => Some(ErrorKind::TableNotFound),
            Self::ConstraintViolation(_) => Some(ErrorKind::ConstraintViolation),
            Self::ConnectionLost(_) => Some(ErrorKind::ConnectionLost),
            Self::Timeout(_) => Some(ErrorKind::Timeout),
            Self::ProtocolError(_) => Some(ErrorKind::ProtocolError),
            Self::Other(_) => Some(ErrorKind::Other),
            _ => None,
        }
    }

    /// The engine-native error carried by this variant, if any.
    #[must_use]
    pub const fn native(&self) -> Option<&NativeError> {
        match self {
            Self::HandshakeFailed(native)
            | Self::ConnectionLost(native)
            | Self::Timeout(native)
            | Self::TableAlreadyExists(native)
            | Self::TableNotFound(native)
            | Self::ConstraintViolation(native)
            | Self::ProtocolError(native)
            | Self::Other(native) => Some(native),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_table_already_exists(&self) -> bool {
        matches!(self, Self::TableAlreadyExists(_))
    }

    #[must_use]
    pub const fn is_table_not_found(&self) -> bool {
        matches!(self, Self::TableNotFound(_))
    }

    #[must_use]
    pub const fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::ConstraintViolation(_))
    }

    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    #[must_use]
    pub const fn is_pool_closed(&self) -> bool {
        matches!(self, Self::PoolClosed)
    }

    #[must_use]
    pub const fn is_handshake_failed(&self) -> bool {
        matches!(self, Self::HandshakeFailed(_))
    }

    /// Statement-level failures leave the connection usable.
    #[must_use]
    pub const fn is_statement_level(&self) -> bool {
        matches!(
            self,
            Self::TableAlreadyExists(_) | Self::TableNotFound(_) | Self::ConstraintViolation(_)
        )
    }

    #[must_use]
    pub const fn is_connection_level(&self) -> bool {
        matches!(self, Self::ConnectionLost(_) | Self::ProtocolError(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    fn native() -> NativeError {
        NativeError::database(Some("1050".to_string()), "Table 'test' already exists")
    }

    #[test]
    fn test_native_error_display_with_code() {
        assert_eq!(native().to_string(), "[1050] Table 'test' already exists");
    }

    #[test]
    fn test_native_error_display_without_code() {
        let err = NativeError::transport("connection reset by peer");
        assert_eq!(err.to_string(), "connection reset by peer");
        assert_eq!(err.source, NativeErrorSource::Transport);
    }

    #[test]
    fn test_native_error_timeout_message() {
        let err = NativeError::timeout(Duration::from_secs(5));
        assert!(err.to_string().contains("5s"));
        assert_eq!(err.source, NativeErrorSource::Timeout);
    }

    #[test]
    fn test_from_native_round_trips_kind() {
        let kinds = [
            ErrorKind::TableAlreadyExists,
            ErrorKind::TableNotFound,
            ErrorKind::ConstraintViolation,
            ErrorKind::ConnectionLost,
            ErrorKind::Timeout,
            ErrorKind::ProtocolError,
            ErrorKind::Other,
        ];
        for kind in kinds {
            let err = Error::from_native(kind, native());
            assert_eq!(err.kind(), Some(kind));
            assert_eq!(err.native(), Some(&native()));
        }
    }

    #[test]
    fn test_connection_level_kinds() {
        assert!(ErrorKind::ConnectionLost.is_connection_level());
        assert!(ErrorKind::ProtocolError.is_connection_level());
        assert!(!ErrorKind::TableNotFound.is_connection_level());
        assert!(!ErrorKind::Timeout.is_connection_level());
    }

    #[test]
    fn test_predicates() {
        let err = Error::TableAlreadyExists(native());
        assert!(err.is_table_already_exists());
        assert!(err.is_statement_level());
        assert!(!err.is_connection_level());

        let err = Error::ConnectionLost(NativeError::transport("gone"));
        assert!(err.is_connection_level());
        assert!(!err.is_statement_level());

        assert!(Error::PoolClosed.is_pool_closed());
        assert!(Error::PoolClosed.kind().is_none());
        assert!(Error::PoolClosed.native().is_none());
    }

    #[test]
    fn test_error_display() {
        let err = Error::UnsupportedEngine("oracle".to_string());
        assert_eq!(err.to_string(), "Unsupported engine: oracle");

        let err = Error::TableNotFound(NativeError::database(
            Some("42P01".to_string()),
            "relation \"test\" does not exist",
        ));
        assert!(err.to_string().contains("42P01"));
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::ConstraintViolation.to_string(), "constraint_violation");
    }
}
