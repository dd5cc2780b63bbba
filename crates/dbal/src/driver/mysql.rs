use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlDatabaseError, MySqlRow};
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::types::{BigDecimal, JsonValue};
use sqlx::{Column, ConnectOptions, Connection as _, Either, Executor, Row as _, TypeInfo};

use super::{Driver, DriverFactory, bind_params, native_error, not_connected};
use crate::error::NativeError;
use crate::{Credentials, Engine, QueryResult, Row, Value};

const DEFAULT_CHARSET: &str = "utf8mb4";

#[derive(Debug)]
pub(crate) struct MysqlFactory;

impl DriverFactory for MysqlFactory {
    fn engine(&self) -> Engine {
        Engine::Mysql
    }

    fn create(&self) -> Box<dyn Driver> {
        Box::new(MysqlDriver::default())
    }
}

/// MySQL / MariaDB connection over `sqlx`.
#[derive(Debug, Default)]
pub struct MysqlDriver {
    conn: Option<MySqlConnection>,
}

impl MysqlDriver {
    fn connect_options(credentials: &Credentials) -> MySqlConnectOptions {
        let mut options = MySqlConnectOptions::new()
            .host(credentials.host())
            .port(credentials.port())
            .username(credentials.user())
            .database(credentials.dbname())
            .charset(credentials.option("charset").unwrap_or(DEFAULT_CHARSET));

        if !credentials.password().is_empty() {
            options = options.password(credentials.password());
        }
        if let Some(socket) = credentials.option("socket") {
            options = options.socket(socket);
        }
        options.disable_statement_logging()
    }
}

#[async_trait]
impl Driver for MysqlDriver {
    fn engine(&self) -> Engine {
        Engine::Mysql
    }

    async fn connect(&mut self, credentials: &Credentials) -> Result<(), NativeError> {
        self.close().await;
        let conn = Self::connect_options(credentials)
            .connect()
            .await
            .map_err(to_native)?;
        self.conn = Some(conn);
        Ok(())
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult, NativeError> {
        let conn = self.conn.as_mut().ok_or_else(|| not_connected(Engine::Mysql))?;
        let query = bind_params::<_, Option<String>>(sqlx::query(sql), params)
            .persistent(!params.is_empty());

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
        let conn = self.conn.as_mut().ok_or_else(|| not_connected(Engine::Mysql))?;
        conn.ping().await.map_err(to_native)
    }

    async fn close(&mut self) {
        if let Some(conn) = self.conn.take()
            && let Err(e) = conn.close().await
        {
            tracing::debug!(error = %e, "mysql close failed");
        }
    }

    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }
}

// MySQL reports the server error number; SQLSTATE is too coarse to classify.
fn to_native(err: sqlx::Error) -> NativeError {
    native_error(err, |db| {
        db.try_downcast_ref::<MySqlDatabaseError>()
            .map(|e| e.number().to_string())
            .or_else(|| db.code().map(|c| c.into_owned()))
    })
}

fn decode_row(row: &MySqlRow) -> Result<Row, NativeError> {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());
    for (i, column) in row.columns().iter().enumerate() {
        columns.push(column.name().to_string());
        values.push(decode_value(row, i, column.type_info().name()).map_err(to_native)?);
    }
    Ok(Row::new(columns, values))
}

fn text<T: ToString>(value: Option<T>) -> Value {
    value.map_or(Value::Null, |v| Value::Text(v.to_string()))
}

fn decode_value(row: &MySqlRow, i: usize, ty: &str) -> Result<Value, sqlx::Error> {
    Ok(match ty {
        "NULL" => Value::Null,
        "BOOLEAN" => row.try_get_unchecked::<Option<bool>, _>(i)?.into(),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            row.try_get_unchecked::<Option<i64>, _>(i)?.into()
        }
        t if t.ends_with(" UNSIGNED") => match row.try_get_unchecked::<Option<u64>, _>(i)? {
            None => Value::Null,
            Some(v) => i64::try_from(v).map_or_else(|_| Value::Text(v.to_string()), Value::Int),
        },
        "FLOAT" => row
            .try_get_unchecked::<Option<f32>, _>(i)?
            .map_or(Value::Null, |v| Value::Float(f64::from(v))),
        "DOUBLE" => row.try_get_unchecked::<Option<f64>, _>(i)?.into(),
        "DECIMAL" => text(row.try_get_unchecked::<Option<BigDecimal>, _>(i)?),
        "DATE" => text(row.try_get_unchecked::<Option<NaiveDate>, _>(i)?),
        "TIME" => text(row.try_get_unchecked::<Option<NaiveTime>, _>(i)?),
        "DATETIME" => text(row.try_get_unchecked::<Option<NaiveDateTime>, _>(i)?),
        "TIMESTAMP" => text(row.try_get_unchecked::<Option<DateTime<Utc>>, _>(i)?),
        "JSON" => text(row.try_get_unchecked::<Option<JsonValue>, _>(i)?),
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
        | "GEOMETRY" => row.try_get_unchecked::<Option<Vec<u8>>, _>(i)?.into(),
        _ => row.try_get_unchecked::<Option<String>, _>(i)?.into(),
    })
}
