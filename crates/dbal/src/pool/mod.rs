//! Connection pool built on [`deadpool`].
//!
//! Each logical database gets one [`ConnectionPool`] holding up to
//! `max_size` slots. Slots are opened lazily, waiters are served in arrival
//! order by deadpool's fair semaphore, and dropping a queued `acquire` future
//! simply leaves the queue.
//!
//! A slot handed back while still [`SlotState::Busy`] (its statement future
//! was dropped) or marked fatal through [`PooledSlot::release`] is reconnected
//! by the manager before the next caller sees it.

mod manager;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use deadpool::Runtime;
use deadpool::managed::{Object, Pool, PoolError, QueueMode};

pub use manager::SlotState;
use manager::Slot;
use manager::SlotManager;

use crate::driver::DriverFactory;
use crate::error::NativeError;
use crate::{Credentials, Engine, Error, QueryResult, Result, Value, observability};

/// Default drain deadline for [`ConnectionPool::shutdown`].
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Pool sizing and timeouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOptions {
    /// Hard cap on physical connections.
    pub max_size: usize,
    /// How long `acquire` may wait for a slot. `None` waits indefinitely.
    pub wait_timeout: Option<Duration>,
    pub shutdown_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_size: 1,
            wait_timeout: None,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl PoolOptions {
    #[must_use]
    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            max_size,
            ..Self::default()
        }
    }
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub max_size: usize,
    /// Slots currently open, busy or idle.
    pub size: usize,
    /// Idle slots ready to hand out.
    pub available: usize,
    /// Callers queued in `acquire`.
    pub waiting: usize,
}

/// How the caller leaves a slot it is done with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotOutcome {
    Healthy,
    /// The connection is unusable; reconnect before reuse.
    Fatal,
}

/// Bounded pool of driver slots for one logical database.
#[derive(Clone)]
pub struct ConnectionPool {
    pool: Pool<SlotManager>,
    wait_timeout: Option<Duration>,
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("engine", &self.engine())
            .field("status", &self.status())
            .finish()
    }
}

impl ConnectionPool {
    pub fn new(
        factory: Arc<dyn DriverFactory>,
        credentials: Credentials,
        options: &PoolOptions,
    ) -> Result<Self> {
        if options.max_size == 0 {
            return Err(Error::Config(
                "number_of_connections must be at least 1".to_string(),
            ));
        }

        let pool = Pool::builder(SlotManager::new(factory, credentials))
            .max_size(options.max_size)
            .queue_mode(QueueMode::Fifo)
            .wait_timeout(options.wait_timeout)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| Error::Config(format!("failed to build pool: {e}")))?;

        Ok(Self {
            pool,
            wait_timeout: options.wait_timeout,
        })
    }

    pub fn engine(&self) -> Engine {
        self.pool.manager().engine()
    }

    /// Waits for an idle slot, opening a new one while below `max_size`.
    pub async fn acquire(&self) -> Result<PooledSlot> {
        if self.is_closed() {
            return Err(Error::PoolClosed);
        }

        let started = Instant::now();
        let object = self.pool.get().await.map_err(|e| self.map_pool_error(e))?;
        observability::record_pool_wait(self.engine(), started.elapsed());
        tracing::debug!(slot = object.id, engine = %self.engine(), "Acquired slot");

        Ok(PooledSlot {
            object: Some(object),
            pool: self.clone(),
        })
    }

    /// Stops handing out slots, waits up to `deadline` for in-flight
    /// statements and closes every slot. Safe to call more than once.
    pub async fn shutdown(&self, deadline: Duration) {
        let first = self.pool.manager().begin_close();
        if first {
            tracing::info!(engine = %self.engine(), "Shutting down connection pool");
        }

        let drained = tokio::time::timeout(deadline, self.drain()).await;
        if drained.is_err() {
            tracing::warn!(
                engine = %self.engine(),
                in_use = self.status().size,
                "Shutdown deadline elapsed with slots still in use"
            );
        }
        self.pool.close();
        self.pool.manager().release_shared().await;
    }

    async fn drain(&self) {
        let manager = self.pool.manager();
        loop {
            let returned = manager.returned.notified();
            tokio::pin!(returned);
            returned.as_mut().enable();

            match self.pool.get().await {
                Ok(object) => {
                    let mut slot = Object::take(object);
                    slot.close().await;
                    tracing::debug!(slot = slot.id, "Closed slot");
                }
                // No idle slot: wait for a busy one to come back.
                Err(PoolError::Backend(Error::PoolClosed)) => {
                    if self.pool.status().size == 0 {
                        return;
                    }
                    returned.await;
                }
                Err(_) => return,
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed() || self.pool.manager().is_closing()
    }

    pub fn status(&self) -> PoolStatus {
        let status = self.pool.status();
        PoolStatus {
            max_size: status.max_size,
            size: status.size,
            available: status.available,
            waiting: status.waiting,
        }
    }

    fn map_pool_error(&self, err: PoolError<Error>) -> Error {
        match err {
            PoolError::Backend(e) => e,
            PoolError::Closed => Error::PoolClosed,
            PoolError::Timeout(_) => {
                Error::Timeout(NativeError::timeout(self.wait_timeout.unwrap_or_default()))
            }
            other => Error::Config(other.to_string()),
        }
    }
}

/// Exclusive access to one slot. Dropping the guard returns the slot.
pub struct PooledSlot {
    object: Option<Object<SlotManager>>,
    pool: ConnectionPool,
}

impl fmt::Debug for PooledSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledSlot")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}

impl PooledSlot {
    fn slot(&self) -> Option<&Slot> {
        self.object.as_deref()
    }

    pub fn id(&self) -> usize {
        self.slot().map_or(0, |s| s.id)
    }

    pub fn state(&self) -> SlotState {
        self.slot().map_or(SlotState::Closed, |s| s.state)
    }

    /// Runs one statement. The slot is `Busy` until the driver answers.
    pub async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult, NativeError> {
        let engine = self.pool.engine();
        let Some(slot) = self.object.as_deref_mut() else {
            return Err(crate::driver::not_connected(engine));
        };

        slot.state = SlotState::Busy;
        let result = slot.driver.execute(sql, params).await;
        slot.state = SlotState::Idle;
        result
    }

    /// Returns the slot, marking it for reconnection on a fatal outcome.
    pub fn release(mut self, outcome: SlotOutcome) {
        if outcome == SlotOutcome::Fatal
            && let Some(slot) = self.object.as_deref_mut()
        {
            tracing::debug!(slot = slot.id, "Slot marked for reconnection");
            slot.state = SlotState::Closing;
        }
    }
}

impl Drop for PooledSlot {
    fn drop(&mut self) {
        if let Some(object) = self.object.take() {
            drop(object);
            self.pool.pool.manager().returned.notify_waiters();
        }
    }
}
