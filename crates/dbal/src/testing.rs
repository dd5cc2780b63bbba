//! Instrumented in-process driver for pool tests.
//!
//! Statements sleep for the configured delay and are otherwise echoed back.
//! A few magic statements drive failure paths:
//!
//! - `LOSE` drops the connection and fails with a transport error
//! - `HANG` never completes
//! - `FAIL <code>` fails with a database error carrying `<code>`

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::driver::{Driver, DriverFactory, not_connected};
use crate::error::NativeError;
use crate::{Credentials, Engine, QueryResult, Row, Value};

#[derive(Debug, Default)]
pub(crate) struct StubStats {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    connect_attempts: AtomicUsize,
    connects: AtomicUsize,
    closes: AtomicUsize,
    factory_shutdowns: AtomicUsize,
    failing_connects: AtomicUsize,
    executed: Mutex<Vec<String>>,
}

impl StubStats {
    pub(crate) fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn connect_attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn factory_shutdowns(&self) -> usize {
        self.factory_shutdowns.load(Ordering::SeqCst)
    }

    /// Makes the next `n` handshakes fail.
    pub(crate) fn fail_next_connects(&self, n: usize) {
        self.failing_connects.store(n, Ordering::SeqCst);
    }

    pub(crate) fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }
}

#[derive(Debug)]
pub(crate) struct StubFactory {
    stats: Arc<StubStats>,
    delay: Duration,
}

impl StubFactory {
    pub(crate) fn new(delay: Duration) -> (Arc<Self>, Arc<StubStats>) {
        let stats = Arc::new(StubStats::default());
        let factory = Arc::new(Self {
            stats: Arc::clone(&stats),
            delay,
        });
        (factory, stats)
    }
}

#[async_trait]
impl DriverFactory for StubFactory {
    fn engine(&self) -> Engine {
        Engine::Sqlite
    }

    fn create(&self) -> Box<dyn Driver> {
        Box::new(StubDriver {
            stats: Arc::clone(&self.stats),
            delay: self.delay,
            connected: false,
        })
    }

    async fn shutdown(&self) {
        self.stats.factory_shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug)]
struct StubDriver {
    stats: Arc<StubStats>,
    delay: Duration,
    connected: bool,
}

struct InFlight<'a>(&'a StubStats);

impl<'a> InFlight<'a> {
    fn enter(stats: &'a StubStats) -> Self {
        let now = stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        stats.peak.fetch_max(now, Ordering::SeqCst);
        Self(stats)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Driver for StubDriver {
    fn engine(&self) -> Engine {
        Engine::Sqlite
    }

    async fn connect(&mut self, _credentials: &Credentials) -> Result<(), NativeError> {
        self.stats.connect_attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .stats
            .failing_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(NativeError::transport("connection refused"));
        }
        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        self.connected = true;
        Ok(())
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult, NativeError> {
        if !self.connected {
            return Err(not_connected(Engine::Sqlite));
        }

        let _in_flight = InFlight::enter(&self.stats);
        self.stats.executed.lock().push(sql.to_string());

        if sql == "HANG" {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(self.delay).await;

        if sql == "LOSE" {
            self.connected = false;
            return Err(NativeError::transport("connection reset by peer"));
        }
        if let Some(code) = sql.strip_prefix("FAIL ") {
            return Err(NativeError::database(Some(code.to_string()), "stub failure"));
        }

        let row = Row::new(
            vec!["sql".to_string(), "params".to_string()],
            vec![Value::from(sql), Value::Int(params.len() as i64)],
        );
        Ok(QueryResult::with_rows(vec![row]))
    }

    async fn ping(&mut self) -> Result<(), NativeError> {
        if self.connected {
            Ok(())
        } else {
            Err(not_connected(Engine::Sqlite))
        }
    }

    async fn close(&mut self) {
        if self.connected {
            self.connected = false;
            self.stats.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

pub(crate) fn stub_credentials() -> Credentials {
    Credentials::builder(crate::credentials::SQLITE_MEMORY)
        .build(Engine::Sqlite)
        .unwrap()
}
