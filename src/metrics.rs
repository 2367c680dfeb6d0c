use lazy_static::lazy_static;
use prometheus::{
    Counter, Gauge, Histogram, register_counter, register_gauge, register_histogram,
};

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("panel_requests_total", "Total number of queued requests").unwrap();
    pub static ref DEDUP_HITS: Counter = register_counter!(
        "panel_dedup_hits_total",
        "Requests answered by an already pending request"
    )
    .unwrap();
    pub static ref QUEUE_DEPTH: Gauge =
        register_gauge!("panel_queue_depth", "Requests waiting for a slot").unwrap();
    pub static ref RUNNING_REQUESTS: Gauge =
        register_gauge!("panel_running_requests", "Requests currently in flight").unwrap();
    pub static ref REQUEST_LATENCY: Histogram = register_histogram!(
        "panel_request_latency_seconds",
        "Backend call latency in seconds"
    )
    .unwrap();
    pub static ref SLOW_REQUESTS: Counter = register_counter!(
        "panel_slow_requests_total",
        "Backend calls slower than the configured threshold"
    )
    .unwrap();
    pub static ref SETTINGS_POLLS: Counter =
        register_counter!("panel_settings_polls_total", "Settings polls issued").unwrap();
    pub static ref SETTINGS_POLL_FAILURES: Counter = register_counter!(
        "panel_settings_poll_failures_total",
        "Settings polls that failed"
    )
    .unwrap();
    pub static ref SETTINGS_APPLIED: Counter = register_counter!(
        "panel_settings_applied_total",
        "Settings snapshots applied to the document"
    )
    .unwrap();
}
