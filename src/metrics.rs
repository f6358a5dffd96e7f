//! OpenTelemetry metrics publication for pool statistics.

use std::sync::{Arc, LazyLock};

use opentelemetry::{
    global,
    metrics::{Gauge, Histogram},
    Key, KeyValue, StringValue, Value,
};

/// Central metrics singleton shared by all pools in the process.
pub(crate) static POOL_METRICS: LazyLock<Arc<Metrics>> = LazyLock::new(|| Arc::new(Metrics::new()));

const KEY_POOL_NAME: Key = Key::from_static_str("messaging.client.connection.pool.name");
const KEY_STATE: Key = Key::from_static_str("messaging.client.connection.state");

/// Storage for pool metrics.
pub(crate) struct Metrics {
    /// The number of connections that are currently in the state described
    /// by the state attribute.
    pub(crate) conn_count: Gauge<u64>,
    /// The time it took to obtain a connection from the pool.
    pub(crate) wait_time: Histogram<f64>,
    /// The maximum number of open connections allowed.
    pub(crate) conn_max: Gauge<u64>,
    /// The floor of live connections maintained by the reconnector.
    pub(crate) idle_min: Gauge<u64>,
}

impl Metrics {
    /// Create new storage for pool metrics.
    ///
    /// You probably don't need this, as all pools use a central metrics
    /// singleton for storage.
    pub(crate) fn new() -> Self {
        let meter = global::meter("diampool");
        let conn_count = meter
            .u64_gauge("messaging.client.connection.count")
            .with_description("The number of connections that are currently in state described by the state attribute.")
            .build();
        let wait_time = meter
            .f64_histogram("messaging.client.connection.wait_time")
            .with_unit("s")
            .with_description("The time it took to obtain a connection from the pool.")
            .build();
        let conn_max = meter
            .u64_gauge("messaging.client.connection.max")
            .with_description("The maximum number of open connections allowed.")
            .build();
        let idle_min = meter
            .u64_gauge("messaging.client.connection.idle.min")
            .with_description("The floor of live connections maintained by the reconnector.")
            .build();
        Metrics {
            conn_count,
            wait_time,
            conn_max,
            idle_min,
        }
    }

    /// Record a point-in-time occupancy snapshot.
    pub(crate) fn record_stats(&self, label: &[KeyValue; 1], stats: &PoolStats) {
        let total_label = status_kv(label[0].clone(), "total");
        self.conn_count.record(stats.total as u64, &total_label);
        let idle_label = status_kv(label[0].clone(), "idle");
        self.conn_count.record(stats.idle as u64, &idle_label);
        let used_label = status_kv(label[0].clone(), "used");
        self.conn_count.record(stats.acquired as u64, &used_label);
        self.conn_max.record(stats.max as u64, label);
    }

    /// Record static pool limits, once at pool construction.
    pub(crate) fn record_limits(&self, label: &[KeyValue; 1], max: usize, min_idle: usize) {
        self.conn_max.record(max as u64, label);
        self.idle_min.record(min_idle as u64, label);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics::new()
    }
}

pub(crate) fn pool_kv(name: String) -> [KeyValue; 1] {
    [KeyValue::new(KEY_POOL_NAME, name)]
}

fn status_kv(name: KeyValue, status: &'static str) -> [KeyValue; 2] {
    [
        name,
        KeyValue::new(KEY_STATE, Value::String(StringValue::from(status))),
    ]
}

/// Point-in-time snapshot of pool occupancy.
///
/// Counts are consistent with each other at the instant of the snapshot, but
/// not with any later snapshot. A connection under construction counts as
/// acquired, so `idle + acquired == total` holds at every observable point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Maximum total number of connections allowed in the pool.
    pub max: usize,
    /// Current total (`idle` + `acquired`) number of connections.
    pub total: usize,
    /// Current number of idle (not checked out) connections.
    pub idle: usize,
    /// Current number of acquired (checked out) connections.
    pub acquired: usize,
}
