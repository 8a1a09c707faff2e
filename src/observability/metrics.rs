//! Metrics collection and exposition.
//!
//! # Metrics
//! - `stream_sessions_total` (counter): finished sessions by outcome
//! - `stream_sessions_active` (gauge): sessions currently streaming
//! - `stream_records_sent_total` (counter): records written to clients
//! - `stream_session_duration_seconds` (histogram): session lifetime
//! - `stream_rejected_total` (counter): requests refused before streaming, by status
//! - `relay_requests_total` (counter): relayed requests by upstream status
//! - `relay_request_duration_seconds` (histogram): time to upstream response head
//! - `active_connections` (gauge): open client connections
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so library users
//!   and tests pay nothing
//! - Labels are limited to low-cardinality values (outcome, status)

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Install the Prometheus recorder and serve the scrape endpoint on `addr`.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_session_opened() {
    ::metrics::gauge!("stream_sessions_active").increment(1.0);
}

pub fn record_session_closed(outcome: &'static str, duration: Duration) {
    ::metrics::gauge!("stream_sessions_active").decrement(1.0);
    ::metrics::counter!("stream_sessions_total", "outcome" => outcome).increment(1);
    ::metrics::histogram!("stream_session_duration_seconds").record(duration.as_secs_f64());
}

pub fn record_frame_sent() {
    ::metrics::counter!("stream_records_sent_total").increment(1);
}

pub fn record_rejected(status: u16) {
    ::metrics::counter!("stream_rejected_total", "status" => status.to_string()).increment(1);
}

pub fn record_relay_request(status: u16, started: Instant) {
    ::metrics::counter!("relay_requests_total", "status" => status.to_string()).increment(1);
    ::metrics::histogram!("relay_request_duration_seconds")
        .record(started.elapsed().as_secs_f64());
}

pub fn record_connection_opened() {
    ::metrics::gauge!("active_connections").increment(1.0);
}

pub fn record_connection_closed() {
    ::metrics::gauge!("active_connections").decrement(1.0);
}
