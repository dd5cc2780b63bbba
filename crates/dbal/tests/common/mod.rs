//! Shared scenarios for the engine integration tests.
//!
//! Each scenario takes a ready [`Connection`] and works on its own table, so
//! the same checks run against SQLite, MySQL and PostgreSQL.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use dbal::{Connection, ConnectionConfig, Credentials, Engine, Row, SQLITE_MEMORY, Value};

static NEXT_TABLE: AtomicUsize = AtomicUsize::new(0);

/// Table name unique to this process and call.
pub fn table_name(prefix: &str) -> String {
    let n = NEXT_TABLE.fetch_add(1, Ordering::Relaxed);
    format!("dbal_{prefix}_{}_{n}", std::process::id())
}

pub fn memory_connection(pool_size: usize) -> Connection {
    let credentials = Credentials::builder(SQLITE_MEMORY)
        .build(Engine::Sqlite)
        .unwrap();
    Connection::new("sqlite", credentials, pool_size, None).unwrap()
}

/// Verified connection to the database named by `var`, or `None` when the
/// variable is unset.
pub async fn url_connection(var: &str, pool_size: usize) -> Option<Connection> {
    let Ok(url) = std::env::var(var) else {
        eprintln!("Skipping test: {var} not set");
        return None;
    };

    let config = ConnectionConfig {
        number_of_connections: pool_size,
        ..ConnectionConfig::from_url(&url).unwrap()
    };
    let connection = Connection::from_config(&config).unwrap();
    connection.connect_and_verify().await.unwrap();
    Some(connection)
}

pub async fn create_twice(connection: &Connection) {
    let table = table_name("create");
    connection
        .create_table(&table, [("id", "string")])
        .await
        .unwrap();

    let err = connection
        .create_table(&table, [("id", "string")])
        .await
        .unwrap_err();
    assert!(err.is_table_already_exists(), "{err}");

    connection.drop_table(&table).await.unwrap();
}

pub async fn drop_missing(connection: &Connection) {
    let err = connection
        .drop_table(&table_name("missing"))
        .await
        .unwrap_err();
    assert!(err.is_table_not_found(), "{err}");
}

pub async fn insert_then_find(connection: &Connection) {
    let table = table_name("roundtrip");
    connection
        .create_table(&table, [("id", "string")])
        .await
        .unwrap();

    connection.insert(&table, [("id", "1")]).await.unwrap();
    let row = connection
        .find_one_by(&table, [("id", "1")])
        .await
        .unwrap()
        .expect("inserted row");
    let expected: Row = [("id", "1")].into_iter().collect();
    assert_eq!(row, expected);

    let missing = connection.find_one_by(&table, [("id", "2")]).await.unwrap();
    assert!(missing.is_none());

    connection.drop_table(&table).await.unwrap();
}

pub async fn find_in_missing_table(connection: &Connection) {
    let err = connection
        .find_one_by(&table_name("absent"), [("id", "1")])
        .await
        .unwrap_err();
    assert!(err.is_table_not_found(), "{err}");
}

pub async fn unique_violation(connection: &Connection) {
    let table = table_name("unique");
    connection
        .create_table(&table, [("id", "string"), ("n", "integer")])
        .await
        .unwrap();

    let platform = connection.platform();
    let index = platform.quote_identifier(&format!("{table}_id_uniq"));
    let sql = format!(
        "CREATE UNIQUE INDEX {index} ON {} ({})",
        platform.quote_identifier(&table),
        platform.quote_identifier("id")
    );
    connection.raw_query(&sql, &[]).await.unwrap();

    connection
        .insert(&table, [("id", Value::from("a")), ("n", Value::Int(1))])
        .await
        .unwrap();
    let err = connection
        .insert(&table, [("id", Value::from("a")), ("n", Value::Int(2))])
        .await
        .unwrap_err();
    assert!(err.is_constraint_violation(), "{err}");

    // The slot stays usable after a statement-level failure.
    let row = connection
        .find_one_by(&table, [("id", "a")])
        .await
        .unwrap()
        .expect("first row");
    assert_eq!(row.get("n").and_then(Value::as_i64), Some(1));

    connection.drop_table(&table).await.unwrap();
}

/// NULL binds into a nullable non-text column and counts as one row.
pub async fn null_parameter(connection: &Connection) {
    let table = table_name("nullable");
    let platform = connection.platform();
    let sql = format!(
        "CREATE TABLE {} ({} INTEGER NULL)",
        platform.quote_identifier(&table),
        platform.quote_identifier("n")
    );
    connection.raw_query(&sql, &[]).await.unwrap();

    let affected = connection.insert(&table, [("n", Value::Null)]).await.unwrap();
    assert_eq!(affected, 1);

    let count = connection
        .raw_query(
            &format!(
                "SELECT COUNT(*) AS c FROM {} WHERE {} IS NULL",
                platform.quote_identifier(&table),
                platform.quote_identifier("n")
            ),
            &[],
        )
        .await
        .unwrap()
        .into_first()
        .expect("count row");
    assert_eq!(count.get("c").and_then(Value::as_i64), Some(1));

    connection.drop_table(&table).await.unwrap();
}

/// Runs `callers` concurrent lookups and checks the pool never grew past its
/// cap. With `strict` unset, slots the server refuses may fail the handshake;
/// every other lookup must still succeed.
pub async fn concurrent_finds(connection: &Connection, callers: usize, strict: bool) {
    let table = table_name("concurrent");
    connection
        .create_table(&table, [("id", "string")])
        .await
        .unwrap();
    connection.insert(&table, [("id", "1")]).await.unwrap();

    let mut handles = Vec::with_capacity(callers);
    for _ in 0..callers {
        let connection = connection.clone();
        let table = table.clone();
        handles.push(tokio::spawn(async move {
            connection.find_one_by(&table, [("id", "1")]).await
        }));
    }

    let mut found = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(row) => {
                assert!(row.is_some());
                found += 1;
            }
            Err(e) if !strict && (e.is_handshake_failed() || e.is_connection_level()) => {
                eprintln!("Slot refused by server: {e}");
            }
            Err(e) => panic!("lookup failed: {e}"),
        }
    }
    assert!(found > 0);

    let status = connection.status();
    assert!(status.size <= status.max_size);
    assert_eq!(status.waiting, 0);

    connection.drop_table(&table).await.unwrap();
}

pub async fn shutdown_rejects_operations(connection: &Connection) {
    connection.shutdown().await;
    let err = connection.raw_query("SELECT 1", &[]).await.unwrap_err();
    assert!(err.is_pool_closed());
}
