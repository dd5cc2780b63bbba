use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{
    Column, ConnectOptions, Connection as _, Either, Executor, Row as _, TypeInfo, ValueRef,
};
use tokio::sync::Mutex;

use super::{Driver, DriverFactory, bind_params, native_error, not_connected};
use crate::error::NativeError;
use crate::{Credentials, Engine, Error, QueryResult, Result, Row, Value};

/// Resolves connect options once so every slot of a pool opens the same
/// database, including the shared in-memory one.
#[derive(Debug)]
pub(crate) struct SqliteFactory {
    options: Arc<SqliteConnectOptions>,
    keep_alive: Option<Arc<KeepAlive>>,
}

impl SqliteFactory {
    pub(crate) fn new(credentials: &Credentials) -> Result<Self> {
        let memory = credentials.is_sqlite_memory();
        let options = if memory {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| Error::InvalidCredentials(e.to_string()))?
        } else {
            let path = credentials.option("path").unwrap_or(credentials.dbname());
            let read_only = credentials
                .option("read_only")
                .is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1");
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(!read_only)
                .read_only(read_only)
        };

        Ok(Self {
            options: Arc::new(options.disable_statement_logging()),
            keep_alive: memory.then(Arc::default),
        })
    }
}

#[async_trait]
impl DriverFactory for SqliteFactory {
    fn engine(&self) -> Engine {
        Engine::Sqlite
    }

    fn create(&self) -> Box<dyn Driver> {
        Box::new(SqliteDriver {
            options: Arc::clone(&self.options),
            keep_alive: self.keep_alive.clone(),
            conn: None,
        })
    }

    async fn shutdown(&self) {
        if let Some(keep_alive) = &self.keep_alive {
            keep_alive.close().await;
        }
    }
}

/// Connection outside the slot set that holds a shared in-memory database
/// open. SQLite drops such a database when its last connection closes, which
/// would otherwise happen whenever every slot is reconnected at once.
#[derive(Debug, Default)]
struct KeepAlive {
    conn: Mutex<Option<SqliteConnection>>,
}

impl KeepAlive {
    async fn open(&self, options: &SqliteConnectOptions) -> Result<(), NativeError> {
        let mut conn = self.conn.lock().await;
        if conn.is_none() {
            *conn = Some(options.connect().await.map_err(to_native)?);
            tracing::debug!("Opened in-memory keep-alive connection");
        }
        Ok(())
    }

    async fn close(&self) {
        let conn = self.conn.lock().await.take();
        if let Some(conn) = conn
            && let Err(e) = conn.close().await
        {
            tracing::debug!(error = %e, "sqlite keep-alive close failed");
        }
    }
}

/// SQLite connection over `sqlx`. Statements run on sqlx's worker thread.
#[derive(Debug)]
pub struct SqliteDriver {
    options: Arc<SqliteConnectOptions>,
    keep_alive: Option<Arc<KeepAlive>>,
    conn: Option<SqliteConnection>,
}

#[async_trait]
impl Driver for SqliteDriver {
    fn engine(&self) -> Engine {
        Engine::Sqlite
    }

    // The factory already resolved the target from the credentials.
    async fn connect(&mut self, _credentials: &Credentials) -> Result<(), NativeError> {
        self.close().await;
        if let Some(keep_alive) = &self.keep_alive {
            keep_alive.open(&self.options).await?;
        }
        let conn = self.options.connect().await.map_err(to_native)?;
        self.conn = Some(conn);
        Ok(())
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult, NativeError> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| not_connected(Engine::Sqlite))?;
        let query = bind_params::<_, Option<String>>(sqlx::query(sql), params)
            .persistent(!params.is_empty());

        // Rows and affected counts are both collected, so no statement kind
        // needs to be guessed from the SQL text.
        let mut result = QueryResult::default();
        let mut stream = conn.fetch_many(query);
        while let Some(step) = stream.try_next().await.map_err(to_native)? {
            match step {
                Either::Left(done) => result.rows_affected += done.rows_affected(),
                Either::Right(row) => result.rows.push(decode_row(&row)?),
            }
        }
        Ok(result)
    }

    async fn ping(&mut self) -> Result<(), NativeError> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| not_connected(Engine::Sqlite))?;
        conn.ping().await.map_err(to_native)
    }

    async fn close(&mut self) {
        if let Some(conn) = self.conn.take()
            && let Err(e) = conn.close().await
        {
            tracing::debug!(error = %e, "sqlite close failed");
        }
    }

    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }
}

// SQLite database errors carry the extended result code.
fn to_native(err: sqlx::Error) -> NativeError {
    native_error(err, |db| db.code().map(|c| c.into_owned()))
}

fn decode_row(row: &SqliteRow) -> Result<Row, NativeError> {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());
    for (i, column) in row.columns().iter().enumerate() {
        columns.push(column.name().to_string());
        let declared_bool = column.type_info().name() == "BOOLEAN";
        values.push(decode_value(row, i, declared_bool).map_err(to_native)?);
    }
    Ok(Row::new(columns, values))
}

// Decodes by the value's storage class, not the declared column type.
fn decode_value(row: &SqliteRow, i: usize, declared_bool: bool) -> Result<Value, sqlx::Error> {
    let storage = {
        let raw = row.try_get_raw(i)?;
        if raw.is_null() {
            return Ok(Value::Null);
        }
        raw.type_info().name().to_string()
    };

    Ok(match storage.as_str() {
        "INTEGER" if declared_bool => Value::Bool(row.try_get_unchecked::<bool, _>(i)?),
        "INTEGER" => Value::Int(row.try_get_unchecked::<i64, _>(i)?),
        "REAL" => Value::Float(row.try_get_unchecked::<f64, _>(i)?),
        "BLOB" => Value::Bytes(row.try_get_unchecked::<Vec<u8>, _>(i)?),
        _ => Value::Text(row.try_get_unchecked::<String, _>(i)?),
    })
}
