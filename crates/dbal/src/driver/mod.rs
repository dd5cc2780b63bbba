//! Engine transports.
//!
//! A [`Driver`] owns exactly one physical connection. The pool creates drivers
//! through a [`DriverFactory`] chosen once per logical database.

mod mysql;
mod postgres;
mod sqlite;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::{Database, Encode, Type};

pub use mysql::MysqlDriver;
pub use postgres::PostgresDriver;
pub use sqlite::SqliteDriver;

use crate::error::{NativeError, NativeErrorSource};
use crate::{Credentials, Engine, QueryResult, Result, Value};

/// One physical connection to an engine.
///
/// Statements on a driver are strictly sequential: every method takes
/// `&mut self`.
#[async_trait]
pub trait Driver: Send + fmt::Debug {
    fn engine(&self) -> Engine;

    /// Performs the handshake. Replaces any existing connection.
    async fn connect(&mut self, credentials: &Credentials) -> Result<(), NativeError>;

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult, NativeError>;

    async fn ping(&mut self) -> Result<(), NativeError>;

    /// Closes the connection. Calling it on a closed driver is a no-op.
    async fn close(&mut self);

    fn is_connected(&self) -> bool;
}

/// Creates unconnected drivers for one logical database.
#[async_trait]
pub trait DriverFactory: Send + Sync + fmt::Debug {
    fn engine(&self) -> Engine;

    fn create(&self) -> Box<dyn Driver>;

    /// Releases state shared by every driver of the pool. Called once the
    /// pool has closed all of its slots.
    async fn shutdown(&self) {}
}

/// Returns the sqlx-backed factory for `engine`.
pub fn factory_for(engine: Engine, credentials: &Credentials) -> Result<Arc<dyn DriverFactory>> {
    Ok(match engine {
        Engine::Mysql => Arc::new(mysql::MysqlFactory),
        Engine::Postgres => Arc::new(postgres::PostgresFactory),
        Engine::Sqlite => Arc::new(sqlite::SqliteFactory::new(credentials)?),
    })
}

/// Binds portable parameters in order. `N` is the engine's NULL binding.
pub(crate) fn bind_params<'q, DB, N>(
    mut query: Query<'q, DB, <DB as Database>::Arguments<'q>>,
    params: &'q [Value],
) -> Query<'q, DB, <DB as Database>::Arguments<'q>>
where
    DB: Database,
    N: Default + Encode<'q, DB> + Type<DB> + 'q,
    bool: Encode<'q, DB> + Type<DB>,
    i64: Encode<'q, DB> + Type<DB>,
    f64: Encode<'q, DB> + Type<DB>,
    &'q str: Encode<'q, DB> + Type<DB>,
    &'q [u8]: Encode<'q, DB> + Type<DB>,
{
    for param in params {
        query = match param {
            Value::Null => query.bind(N::default()),
            Value::Bool(v) => query.bind(*v),
            Value::Int(v) => query.bind(*v),
            Value::Float(v) => query.bind(*v),
            Value::Text(v) => query.bind(v.as_str()),
            Value::Bytes(v) => query.bind(v.as_slice()),
        };
    }
    query
}

/// Converts a sqlx failure into a native error. `code` extracts the engine
/// code from a database error.
pub(crate) fn native_error(
    err: sqlx::Error,
    code: impl FnOnce(&dyn sqlx::error::DatabaseError) -> Option<String>,
) -> NativeError {
    match err {
        sqlx::Error::Database(db) => {
            let code = code(db.as_ref());
            NativeError::database(code, db.message())
        }
        sqlx::Error::Io(e) => NativeError::transport(e.to_string()),
        e @ (sqlx::Error::Tls(_) | sqlx::Error::WorkerCrashed | sqlx::Error::PoolClosed) => {
            NativeError::transport(e.to_string())
        }
        sqlx::Error::Protocol(msg) => NativeError::protocol(msg),
        e @ sqlx::Error::PoolTimedOut => NativeError {
            source: NativeErrorSource::Timeout,
            code: None,
            message: e.to_string(),
        },
        e @ (sqlx::Error::Decode(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Encode(_)
        | sqlx::Error::TypeNotFound { .. }) => NativeError::codec(e.to_string()),
        e => NativeError::database(None, e.to_string()),
    }
}

/// Error for a statement issued on a driver that has no live connection.
pub(crate) fn not_connected(engine: Engine) -> NativeError {
    NativeError::transport(format!("{engine} driver is not connected"))
}
