//! Metrics hooks for pool and statement activity.
//!
//! With the `metrics` feature the hooks record through the [`metrics`]
//! facade; installing a recorder is left to the application. Without it they
//! compile to nothing.

#[cfg(feature = "metrics")]
mod metrics;

#[cfg(feature = "metrics")]
pub use metrics::{describe_metrics, record_pool_wait, record_query, record_reconnect};

#[cfg(not(feature = "metrics"))]
mod noop {
    use std::time::Duration;

    use crate::{Engine, ErrorKind};

    #[allow(clippy::missing_const_for_fn)]
    pub fn describe_metrics() {}

    #[allow(clippy::missing_const_for_fn)]
    pub fn record_query(
        _engine: Engine,
        _operation: &'static str,
        _duration: Duration,
        _error: Option<ErrorKind>,
    ) {
    }

    #[allow(clippy::missing_const_for_fn)]
    pub fn record_pool_wait(_engine: Engine, _duration: Duration) {}

    #[allow(clippy::missing_const_for_fn)]
    pub fn record_reconnect(_engine: Engine) {}
}

#[cfg(not(feature = "metrics"))]
pub use noop::{describe_metrics, record_pool_wait, record_query, record_reconnect};
