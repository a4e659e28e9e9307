//! Metrics collection and exposition.
//!
//! # Metrics
//! - `connpool_connections_opened_total` (counter): factory successes by backend
//! - `connpool_factory_errors_total` (counter): factory failures by backend
//! - `connpool_waits_total` (counter): acquires that had to queue
//! - `connpool_connections_discarded_total` (counter): released connections closed for lack of idle room
//! - `connpool_acquire_timeouts_total` (counter): bounded acquires that gave up
//! - `connpool_open_connections`, `connpool_idle_connections`,
//!   `connpool_waiting_requests` (gauges): published from `PoolStats`

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::pool::PoolStats;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    let builder = PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_opened(backend: &str) {
    counter!("connpool_connections_opened_total", "backend" => backend.to_string()).increment(1);
}

pub fn record_factory_error(backend: &str) {
    counter!("connpool_factory_errors_total", "backend" => backend.to_string()).increment(1);
}

pub fn record_wait(backend: &str) {
    counter!("connpool_waits_total", "backend" => backend.to_string()).increment(1);
}

pub fn record_discarded(backend: &str) {
    counter!("connpool_connections_discarded_total", "backend" => backend.to_string())
        .increment(1);
}

pub fn record_acquire_timeout() {
    counter!("connpool_acquire_timeouts_total").increment(1);
}

/// Publish a stats snapshot as gauges.
pub fn record_stats(backend: &str, stats: &PoolStats) {
    gauge!("connpool_open_connections", "backend" => backend.to_string())
        .set(stats.num_open as f64);
    gauge!("connpool_idle_connections", "backend" => backend.to_string()).set(stats.idle as f64);
    gauge!("connpool_waiting_requests", "backend" => backend.to_string())
        .set(stats.waiters as f64);
}
