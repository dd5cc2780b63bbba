//! Public facade over one pool and its dialect.

use std::fmt;
use std::time::{Duration, Instant};

use crate::config::ConnectionConfig;
use crate::driver;
use crate::error::NativeError;
use crate::platform::{ColumnType, Platform};
use crate::pool::{ConnectionPool, PoolOptions, PoolStatus, SlotOutcome};
use crate::{Credentials, Engine, Error, QueryResult, Result, Row, Value, observability};

/// Handle to one logical database.
///
/// Cloning is cheap and every clone shares the same pool. Each operation
/// holds exactly one slot for its duration and gives it back before it
/// returns.
#[derive(Clone)]
pub struct Connection {
    pool: ConnectionPool,
    platform: Platform,
    query_timeout: Option<Duration>,
    shutdown_timeout: Duration,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("platform", &self.platform)
            .field("pool", &self.pool)
            .field("query_timeout", &self.query_timeout)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Builds a connection without opening any slot.
    ///
    /// # Errors
    ///
    /// `UnsupportedEngine` for an unknown engine name, `InvalidCredentials`
    /// when the credentials cannot address that engine and `Config` for a
    /// zero pool size.
    pub fn new(
        engine: &str,
        credentials: Credentials,
        pool_size: usize,
        dialect_version: Option<&str>,
    ) -> Result<Self> {
        let engine: Engine = engine.parse()?;
        Self::with_options(
            engine,
            credentials,
            &PoolOptions::with_max_size(pool_size),
            dialect_version,
        )
    }

    pub fn with_options(
        engine: Engine,
        credentials: Credentials,
        options: &PoolOptions,
        dialect_version: Option<&str>,
    ) -> Result<Self> {
        credentials.validate(engine)?;
        let platform = Platform::new(engine, dialect_version)?;
        let factory = driver::factory_for(engine, &credentials)?;
        let pool = ConnectionPool::new(factory, credentials, options)?;

        tracing::debug!(
            engine = %engine,
            platform = %platform,
            max_size = options.max_size,
            "Created connection"
        );

        Ok(Self {
            pool,
            platform,
            query_timeout: None,
            shutdown_timeout: options.shutdown_timeout,
        })
    }

    pub fn from_config(config: &ConnectionConfig) -> Result<Self> {
        let connection = Self::with_options(
            config.engine()?,
            config.credentials()?,
            &config.pool_options(),
            config.driver_version.as_deref(),
        )?;
        Ok(connection.with_query_timeout(config.query_timeout()))
    }

    #[cfg(test)]
    pub(crate) const fn from_parts(pool: ConnectionPool, platform: Platform) -> Self {
        Self {
            pool,
            platform,
            query_timeout: None,
            shutdown_timeout: crate::pool::DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Bounds every statement. On expiry the caller gets `Timeout` and the
    /// slot is reconnected before reuse.
    #[must_use]
    pub const fn with_query_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// [`Connection::new`] followed by [`Connection::connect_and_verify`].
    pub async fn create_connected(
        engine: &str,
        credentials: Credentials,
        pool_size: usize,
        dialect_version: Option<&str>,
    ) -> Result<Self> {
        let connection = Self::new(engine, credentials, pool_size, dialect_version)?;
        connection.connect_and_verify().await?;
        Ok(connection)
    }

    /// Opens a slot and runs a trivial round-trip. Meant to be called once
    /// at startup; an error here should abort the process.
    pub async fn connect_and_verify(&self) -> Result<()> {
        self.run("verify", self.platform.verification_query(), &[])
            .await?;
        tracing::info!(engine = %self.engine(), "Connection verified");
        Ok(())
    }

    pub const fn platform(&self) -> &Platform {
        &self.platform
    }

    pub const fn engine(&self) -> Engine {
        self.platform.engine()
    }

    pub fn status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// Creates `name` with the given `(column, type)` pairs, in order.
    ///
    /// Type names are the portable ones (`string`, `integer`, `boolean`, ...).
    pub async fn create_table<I, K, T>(&self, name: &str, columns: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
        T: AsRef<str>,
    {
        let columns: Vec<(String, ColumnType)> = columns
            .into_iter()
            .map(|(column, ty)| Ok((column.into(), ty.as_ref().parse()?)))
            .collect::<Result<_>>()?;
        let sql = self.platform.build_create_table(name, &columns)?;
        self.run("create_table", &sql, &[]).await.map(drop)
    }

    pub async fn drop_table(&self, name: &str) -> Result<()> {
        let sql = self.platform.build_drop_table(name)?;
        self.run("drop_table", &sql, &[]).await.map(drop)
    }

    /// Inserts one row and returns the affected row count.
    pub async fn insert<I, K, V>(&self, table: &str, values: I) -> Result<u64>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let statement = self.platform.build_insert(table, &pairs(values))?;
        let result = self
            .run("insert", &statement.sql, &statement.params)
            .await?;
        Ok(result.rows_affected)
    }

    /// First row matching every criterion, or `None` when nothing matches.
    ///
    /// A missing table is an error (`TableNotFound`), not `None`.
    pub async fn find_one_by<I, K, V>(&self, table: &str, criteria: I) -> Result<Option<Row>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let statement = self.platform.build_find_one_by(table, &pairs(criteria))?;
        let result = self
            .run("find_one_by", &statement.sql, &statement.params)
            .await?;
        Ok(result.into_first())
    }

    /// Runs `sql` as written. Placeholders follow the engine (`?` or `$n`).
    pub async fn raw_query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.run("raw_query", sql, params).await
    }

    /// Drains the pool within the configured deadline and closes it.
    pub async fn shutdown(&self) {
        self.pool.shutdown(self.shutdown_timeout).await;
    }

    async fn run(&self, operation: &'static str, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let started = Instant::now();
        let result = self.run_inner(sql, params).await;
        observability::record_query(
            self.engine(),
            operation,
            started.elapsed(),
            result.as_ref().err().and_then(Error::kind),
        );
        result
    }

    async fn run_inner(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let mut slot = self.pool.acquire().await?;

        let executed = match self.query_timeout {
            Some(after) => {
                let timed = tokio::time::timeout(after, slot.execute(sql, params)).await;
                if let Ok(executed) = timed {
                    executed
                } else {
                    // Slot is still Busy; dropping it forces a reconnect.
                    tracing::warn!(
                        slot = slot.id(),
                        timeout_ms = after.as_millis() as u64,
                        "Statement timed out"
                    );
                    drop(slot);
                    return Err(Error::Timeout(NativeError::timeout(after)));
                }
            }
            None => slot.execute(sql, params).await,
        };

        match executed {
            Ok(result) => {
                slot.release(SlotOutcome::Healthy);
                Ok(result)
            }
            Err(native) => {
                let kind = self.platform.classify_error(&native);
                tracing::debug!(slot = slot.id(), kind = %kind, error = %native, "Statement failed");
                let outcome = if kind.is_connection_level() {
                    SlotOutcome::Fatal
                } else {
                    SlotOutcome::Healthy
                };
                slot.release(outcome);
                Err(Error::from_native(kind, native))
            }
        }
    }
}

fn pairs<I, K, V>(items: I) -> Vec<(String, Value)>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    items
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::credentials::SQLITE_MEMORY;
    use crate::testing::{StubFactory, StubStats, stub_credentials};

    fn stub_connection(size: usize) -> (Connection, Arc<StubStats>) {
        let (factory, stats) = StubFactory::new(Duration::ZERO);
        let pool =
            ConnectionPool::new(factory, stub_credentials(), &PoolOptions::with_max_size(size))
                .unwrap();
        let connection = Connection::from_parts(pool, Platform::for_engine(Engine::Sqlite, None));
        (connection, stats)
    }

    fn sqlite(size: usize) -> Connection {
        let credentials = Credentials::builder(SQLITE_MEMORY)
            .build(Engine::Sqlite)
            .unwrap();
        Connection::new("sqlite", credentials, size, None).unwrap()
    }

    #[test]
    fn test_new_rejects_unknown_engine() {
        let err = Connection::new("oracle", stub_credentials(), 1, None).unwrap_err();
        assert!(matches!(err, Error::UnsupportedEngine(_)));
    }

    #[test]
    fn test_new_rejects_credentials_without_host() {
        let credentials = Credentials::builder("app").build(Engine::Sqlite).unwrap();
        let err = Connection::new("postgres", credentials, 1, None).unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials(_)));
    }

    #[test]
    fn test_new_rejects_zero_pool_size() {
        let err = Connection::new("sqlite", stub_credentials(), 0, None).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_new_picks_dialect_version() {
        let credentials = Credentials::builder("app")
            .host("localhost")
            .port(3306)
            .build(Engine::Mysql)
            .unwrap();
        let connection = Connection::new("mysql", credentials, 1, Some("5.7")).unwrap();
        assert_eq!(connection.engine(), Engine::Mysql);
        assert_eq!(connection.platform().to_string(), "mysql 5.7.0");
    }

    #[tokio::test]
    async fn test_raw_query_round_trips_through_pool() {
        let (connection, stats) = stub_connection(1);
        let result = connection
            .raw_query("SELECT ?", &[Value::Int(1)])
            .await
            .unwrap();
        let row = result.into_first().unwrap();
        assert_eq!(row.get("sql"), Some(&Value::from("SELECT ?")));
        assert_eq!(row.get("params"), Some(&Value::Int(1)));
        assert_eq!(stats.executed(), vec!["SELECT ?".to_string()]);
        assert_eq!(connection.status().available, 1);
    }

    #[tokio::test]
    async fn test_statement_error_keeps_slot() {
        let (connection, stats) = stub_connection(1);
        let err = connection.raw_query("FAIL 19", &[]).await.unwrap_err();
        assert!(err.is_constraint_violation());

        connection.raw_query("SELECT 1", &[]).await.unwrap();
        assert_eq!(stats.connects(), 1);
    }

    #[tokio::test]
    async fn test_connection_lost_reconnects_before_reuse() {
        let (connection, stats) = stub_connection(1);
        let err = connection.raw_query("LOSE", &[]).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionLost(_)));
        assert!(err.is_connection_level());

        connection.raw_query("SELECT 1", &[]).await.unwrap();
        assert_eq!(stats.connects(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_timeout_recycles_slot() {
        let (connection, stats) = stub_connection(1);
        let connection = connection.with_query_timeout(Some(Duration::from_millis(25)));

        let err = connection.raw_query("HANG", &[]).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(err.kind(), Some(crate::ErrorKind::Timeout));

        connection.raw_query("SELECT 1", &[]).await.unwrap();
        assert_eq!(stats.connects(), 2);
        assert_eq!(stats.closes(), 1);
    }

    #[tokio::test]
    async fn test_connect_and_verify_opens_one_slot() {
        let (connection, stats) = stub_connection(4);
        connection.connect_and_verify().await.unwrap();
        assert_eq!(stats.connects(), 1);
        assert_eq!(stats.executed(), vec!["SELECT 1".to_string()]);
    }

    #[tokio::test]
    async fn test_connect_and_verify_reports_handshake_failure() {
        let (connection, stats) = stub_connection(1);
        stats.fail_next_connects(2);
        let err = connection.connect_and_verify().await.unwrap_err();
        assert!(err.is_handshake_failed());
    }

    #[tokio::test]
    async fn test_shutdown_rejects_later_operations() {
        let (connection, _) = stub_connection(2);
        connection.raw_query("SELECT 1", &[]).await.unwrap();
        connection.shutdown().await;
        let err = connection.raw_query("SELECT 1", &[]).await.unwrap_err();
        assert!(err.is_pool_closed());
    }

    #[tokio::test]
    async fn test_create_table_rejects_unknown_type() {
        let (connection, stats) = stub_connection(1);
        let err = connection
            .create_table("test", [("id", "geometry")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownColumnType(_)));
        assert!(stats.executed().is_empty());
    }

    #[tokio::test]
    async fn test_sqlite_create_table_twice() {
        let connection = sqlite(1);
        connection
            .create_table("test", [("id", "string")])
            .await
            .unwrap();
        let err = connection
            .create_table("test", [("id", "string")])
            .await
            .unwrap_err();
        assert!(err.is_table_already_exists());
        assert!(err.native().is_some());
    }

    #[tokio::test]
    async fn test_sqlite_drop_missing_table() {
        let connection = sqlite(1);
        let err = connection.drop_table("missing").await.unwrap_err();
        assert!(err.is_table_not_found());
    }

    #[tokio::test]
    async fn test_sqlite_insert_then_find() {
        let connection = sqlite(2);
        connection
            .create_table("test", [("id", "string")])
            .await
            .unwrap();

        let affected = connection.insert("test", [("id", "1")]).await.unwrap();
        assert_eq!(affected, 1);

        let row = connection
            .find_one_by("test", [("id", "1")])
            .await
            .unwrap()
            .unwrap();
        let expected: Row = [("id", "1")].into_iter().collect();
        assert_eq!(row, expected);

        let missing = connection.find_one_by("test", [("id", "2")]).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_sqlite_insert_counts_rows_for_keyword_like_column() {
        let connection = sqlite(1);
        connection
            .create_table("t", [("returning_customer", "string")])
            .await
            .unwrap();
        let affected = connection
            .insert("t", [("returning_customer", "yes")])
            .await
            .unwrap();
        assert_eq!(affected, 1);

        let updated = connection
            .raw_query("UPDATE t SET returning_customer = 'returning'", &[])
            .await
            .unwrap();
        assert_eq!(updated.rows_affected, 1);
    }

    #[tokio::test]
    async fn test_sqlite_memory_survives_fatal_release() {
        let connection = sqlite(1);
        connection
            .create_table("keep", [("id", "string")])
            .await
            .unwrap();
        connection.insert("keep", [("id", "1")]).await.unwrap();

        let slot = connection.pool.acquire().await.unwrap();
        slot.release(SlotOutcome::Fatal);

        let row = connection.find_one_by("keep", [("id", "1")]).await.unwrap();
        assert!(row.is_some());
        assert_eq!(connection.status().size, 1);
    }

    #[tokio::test]
    async fn test_sqlite_find_in_missing_table() {
        let connection = sqlite(1);
        let err = connection
            .find_one_by("missing", [("id", "1")])
            .await
            .unwrap_err();
        assert!(err.is_table_not_found());
    }
}
