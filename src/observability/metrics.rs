//! Metrics collection and exposition.
//!
//! # Metrics
//! - `tcp_server_connections_accepted_total` (counter)
//! - `tcp_server_connections_dialed_total` (counter)
//! - `tcp_server_active_connections` (gauge): connections not yet closed
//! - `tcp_server_accept_errors_total` (counter): by `kind` = transient | fatal
//! - `tcp_server_messages_received_total` / `tcp_server_messages_sent_total` (counters)
//! - `tcp_server_connections_closed_total` (counter): by `reason`
//! - `tcp_server_connections_reaped_total` (counter)
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_connection_opened(dialed: bool) {
    if dialed {
        counter!("tcp_server_connections_dialed_total").increment(1);
    } else {
        counter!("tcp_server_connections_accepted_total").increment(1);
    }
    gauge!("tcp_server_active_connections").increment(1.0);
}

pub fn record_connection_closed(reason: &'static str) {
    counter!("tcp_server_connections_closed_total", "reason" => reason).increment(1);
    gauge!("tcp_server_active_connections").decrement(1.0);
}

pub fn record_accept_error(transient: bool) {
    let kind = if transient { "transient" } else { "fatal" };
    counter!("tcp_server_accept_errors_total", "kind" => kind).increment(1);
}

pub fn record_message_received() {
    counter!("tcp_server_messages_received_total").increment(1);
}

pub fn record_message_sent() {
    counter!("tcp_server_messages_sent_total").increment(1);
}

pub fn record_reaped(count: usize) {
    counter!("tcp_server_connections_reaped_total").increment(count as u64);
}
