use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgArgumentBuffer, PgConnectOptions, PgConnection, PgRow, PgTypeInfo, Postgres};
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::types::{BigDecimal, JsonValue, Uuid};
use sqlx::{
    Column, ConnectOptions, Connection as _, Either, Encode, Executor, Row as _, Type, TypeInfo,
};

use super::{Driver, DriverFactory, bind_params, native_error, not_connected};
use crate::error::NativeError;
use crate::{Credentials, Engine, QueryResult, Row, Value};

#[derive(Debug)]
pub(crate) struct PostgresFactory;

impl DriverFactory for PostgresFactory {
    fn engine(&self) -> Engine {
        Engine::Postgres
    }

    fn create(&self) -> Box<dyn Driver> {
        Box::new(PostgresDriver::default())
    }
}

/// NULL parameter with an unspecified type. The server infers the type from
/// the statement, so NULL fits any nullable column.
#[derive(Debug, Default, Clone, Copy)]
struct UntypedNull;

impl Type<Postgres> for UntypedNull {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(Oid(0))
    }
}

impl Encode<'_, Postgres> for UntypedNull {
    fn encode_by_ref(&self, _buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        Ok(IsNull::Yes)
    }
}

/// PostgreSQL connection over `sqlx`.
#[derive(Debug, Default)]
pub struct PostgresDriver {
    conn: Option<PgConnection>,
}

impl PostgresDriver {
    fn connect_options(credentials: &Credentials) -> PgConnectOptions {
        let mut options = PgConnectOptions::new_without_pgpass()
            .host(credentials.host())
            .port(credentials.port())
            .username(credentials.user())
            .database(credentials.dbname());

        if !credentials.password().is_empty() {
            options = options.password(credentials.password());
        }
        if let Some(name) = credentials.option("application_name") {
            options = options.application_name(name);
        }
        if let Some(search_path) = credentials.option("search_path") {
            options = options.options([("search_path", search_path)]);
        }
        options.disable_statement_logging()
    }
}

#[async_trait]
impl Driver for PostgresDriver {
    fn engine(&self) -> Engine {
        Engine::Postgres
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
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| not_connected(Engine::Postgres))?;
        let query = bind_params::<_, UntypedNull>(sqlx::query(sql), params)
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
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| not_connected(Engine::Postgres))?;
        conn.ping().await.map_err(to_native)
    }

    async fn close(&mut self) {
        if let Some(conn) = self.conn.take()
            && let Err(e) = conn.close().await
        {
            tracing::debug!(error = %e, "postgres close failed");
        }
    }

    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }
}

fn to_native(err: sqlx::Error) -> NativeError {
    native_error(err, |db| db.code().map(|c| c.into_owned()))
}

fn decode_row(row: &PgRow) -> Result<Row, NativeError> {
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

fn decode_value(row: &PgRow, i: usize, ty: &str) -> Result<Value, sqlx::Error> {
    Ok(match ty {
        "VOID" => Value::Null,
        "BOOL" => row.try_get::<Option<bool>, _>(i)?.into(),
        "INT2" => row.try_get::<Option<i16>, _>(i)?.map(i64::from).into(),
        "INT4" => row.try_get::<Option<i32>, _>(i)?.map(i64::from).into(),
        "INT8" => row.try_get::<Option<i64>, _>(i)?.into(),
        "FLOAT4" => row.try_get::<Option<f32>, _>(i)?.map(f64::from).into(),
        "FLOAT8" => row.try_get::<Option<f64>, _>(i)?.into(),
        "NUMERIC" => text(row.try_get::<Option<BigDecimal>, _>(i)?),
        "DATE" => text(row.try_get::<Option<NaiveDate>, _>(i)?),
        "TIME" => text(row.try_get::<Option<NaiveTime>, _>(i)?),
        "TIMESTAMP" => text(row.try_get::<Option<NaiveDateTime>, _>(i)?),
        "TIMESTAMPTZ" => text(row.try_get::<Option<DateTime<Utc>>, _>(i)?),
        "JSON" | "JSONB" => text(row.try_get::<Option<JsonValue>, _>(i)?),
        "UUID" => text(row.try_get::<Option<Uuid>, _>(i)?),
        "BYTEA" => row.try_get::<Option<Vec<u8>>, _>(i)?.into(),
        _ => row.try_get::<Option<String>, _>(i)?.into(),
    })
}
