use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use deadpool::managed::{Manager, Metrics, RecycleError, RecycleResult};
use tokio::sync::Notify;

use crate::driver::{Driver, DriverFactory};
use crate::error::NativeError;
use crate::{Credentials, Engine, Error, observability};

/// Lifecycle of one physical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Disconnected,
    Connecting,
    Idle,
    /// A statement is in flight. A slot returned in this state was cancelled
    /// mid-statement and is reconnected before reuse.
    Busy,
    /// Marked broken; reconnected before reuse.
    Closing,
    Closed,
}

impl SlotState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pooled driver with its protocol state.
#[derive(Debug)]
pub struct Slot {
    pub(crate) id: usize,
    pub(crate) driver: Box<dyn Driver>,
    pub(crate) state: SlotState,
}

impl Slot {
    pub(crate) async fn close(&mut self) {
        self.state = SlotState::Closing;
        self.driver.close().await;
        self.state = SlotState::Closed;
    }
}

/// Creates, reconnects and retires slots for one logical database.
pub(crate) struct SlotManager {
    factory: Arc<dyn DriverFactory>,
    credentials: Credentials,
    next_id: AtomicUsize,
    closing: AtomicBool,
    pub(crate) returned: Notify,
}

impl fmt::Debug for SlotManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotManager")
            .field("engine", &self.factory.engine())
            .field("credentials", &self.credentials)
            .field("closing", &self.is_closing())
            .finish_non_exhaustive()
    }
}

impl SlotManager {
    pub(crate) fn new(factory: Arc<dyn DriverFactory>, credentials: Credentials) -> Self {
        Self {
            factory,
            credentials,
            next_id: AtomicUsize::new(1),
            closing: AtomicBool::new(false),
            returned: Notify::new(),
        }
    }

    pub(crate) fn engine(&self) -> Engine {
        self.factory.engine()
    }

    pub(crate) fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Closes state the factory shares across slots.
    pub(crate) async fn release_shared(&self) {
        self.factory.shutdown().await;
    }

    /// Returns `false` if shutdown had already begun.
    pub(crate) fn begin_close(&self) -> bool {
        !self.closing.swap(true, Ordering::AcqRel)
    }

    /// Handshake with a single retry. A second failure retires the slot.
    async fn connect(&self, slot: &mut Slot) -> Result<(), Error> {
        slot.state = SlotState::Connecting;

        let first = match slot.driver.connect(&self.credentials).await {
            Ok(()) => {
                slot.state = SlotState::Idle;
                return Ok(());
            }
            Err(e) => e,
        };

        tracing::warn!(
            slot = slot.id,
            engine = %self.engine(),
            error = %first,
            "Handshake failed, retrying once"
        );
        slot.driver.close().await;

        match slot.driver.connect(&self.credentials).await {
            Ok(()) => {
                slot.state = SlotState::Idle;
                Ok(())
            }
            Err(second) => {
                slot.state = SlotState::Closed;
                tracing::warn!(
                    slot = slot.id,
                    engine = %self.engine(),
                    error = %second,
                    "Handshake failed twice, giving up on slot"
                );
                Err(Error::HandshakeFailed(second))
            }
        }
    }

    async fn reconnect(&self, slot: &mut Slot) -> Result<(), Error> {
        tracing::warn!(
            slot = slot.id,
            engine = %self.engine(),
            state = %slot.state,
            "Reconnecting slot before reuse"
        );
        observability::record_reconnect(self.engine());

        slot.state = SlotState::Closing;
        slot.driver.close().await;
        slot.state = SlotState::Disconnected;
        self.connect(slot).await?;

        slot.driver.ping().await.map_err(|e: NativeError| {
            slot.state = SlotState::Closing;
            Error::ConnectionLost(e)
        })
    }
}

impl Manager for SlotManager {
    type Type = Slot;
    type Error = Error;

    async fn create(&self) -> Result<Slot, Error> {
        if self.is_closing() {
            return Err(Error::PoolClosed);
        }

        let mut slot = Slot {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            driver: self.factory.create(),
            state: SlotState::Disconnected,
        };
        self.connect(&mut slot).await?;
        tracing::debug!(slot = slot.id, engine = %self.engine(), "Opened slot");
        Ok(slot)
    }

    async fn recycle(&self, slot: &mut Slot, _metrics: &Metrics) -> RecycleResult<Error> {
        match slot.state {
            SlotState::Idle => Ok(()),
            SlotState::Closed => Err(RecycleError::Message("slot is closed".into())),
            _ if self.is_closing() => Err(RecycleError::Message("pool is shutting down".into())),
            _ => self.reconnect(slot).await.map_err(RecycleError::Backend),
        }
    }
}
