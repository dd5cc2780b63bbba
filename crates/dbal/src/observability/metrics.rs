use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};

use crate::{Engine, ErrorKind};

const METRIC_QUERY_DURATION: &str = "dbal_query_duration_seconds";
const METRIC_QUERY_TOTAL: &str = "dbal_queries_total";
const METRIC_QUERY_ERRORS: &str = "dbal_query_errors_total";
const METRIC_POOL_WAIT_TIME: &str = "dbal_pool_wait_seconds";
const METRIC_RECONNECTS: &str = "dbal_reconnects_total";

/// Registers metric descriptions with the installed recorder.
pub fn describe_metrics() {
    describe_histogram!(METRIC_QUERY_DURATION, "Statement duration in seconds");
    describe_counter!(METRIC_QUERY_TOTAL, "Total statements executed");
    describe_counter!(METRIC_QUERY_ERRORS, "Total failed statements by kind");
    describe_histogram!(
        METRIC_POOL_WAIT_TIME,
        "Time waiting for a connection from the pool"
    );
    describe_counter!(METRIC_RECONNECTS, "Total slot reconnections");
}

/// Records one facade operation.
pub fn record_query(
    engine: Engine,
    operation: &'static str,
    duration: Duration,
    error: Option<ErrorKind>,
) {
    let status = if error.is_some() { "error" } else { "success" };

    histogram!(
        METRIC_QUERY_DURATION,
        "engine" => engine.as_str(),
        "operation" => operation,
    )
    .record(duration.as_secs_f64());

    counter!(
        METRIC_QUERY_TOTAL,
        "engine" => engine.as_str(),
        "operation" => operation,
        "status" => status,
    )
    .increment(1);

    if let Some(kind) = error {
        counter!(
            METRIC_QUERY_ERRORS,
            "engine" => engine.as_str(),
            "kind" => kind.as_str(),
        )
        .increment(1);
    }
}

pub fn record_pool_wait(engine: Engine, duration: Duration) {
    histogram!(METRIC_POOL_WAIT_TIME, "engine" => engine.as_str()).record(duration.as_secs_f64());
}

pub fn record_reconnect(engine: Engine) {
    counter!(METRIC_RECONNECTS, "engine" => engine.as_str()).increment(1);
}
