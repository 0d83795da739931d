//! Prometheus metrics for the relay.
//!
//! Provides metrics collection and a Prometheus-compatible `/metrics` endpoint.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// Metric names as constants for consistency
const WS_CONNECTIONS_ACTIVE: &str = "party_ws_connections_active";
const WS_MESSAGES_TOTAL: &str = "party_ws_messages_total";
const SIGNALING_MESSAGES_TOTAL: &str = "party_signaling_messages_total";
const VALIDATION_FAILURES_TOTAL: &str = "party_validation_failures_total";
const RATE_LIMITED_TOTAL: &str = "party_rate_limited_total";
const CLIENTS_CONNECTED: &str = "party_clients_connected";
const BROADCASTER_PRESENT: &str = "party_broadcaster_present";

/// Initialize metrics and return the Prometheus handle.
///
/// # Errors
///
/// Returns an error if the Prometheus recorder cannot be installed
/// (e.g., if another recorder is already installed).
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Increment active WebSocket connections.
pub fn inc_ws_connections() {
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
}

/// Decrement active WebSocket connections.
pub fn dec_ws_connections() {
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a WebSocket message.
///
/// # Arguments
///
/// * `direction` - "inbound" or "outbound"
/// * `msg_type` - Wire `type` tag (e.g., "play", "user-list")
pub fn record_ws_message(direction: &str, msg_type: &str) {
    counter!(
        WS_MESSAGES_TOTAL,
        "direction" => direction.to_string(),
        "type" => msg_type.to_string()
    )
    .increment(1);
}

/// Record a relayed signaling message (offer, answer, ice-candidate).
pub fn record_signaling_message(msg_type: &str) {
    counter!(
        SIGNALING_MESSAGES_TOTAL,
        "type" => msg_type.to_string()
    )
    .increment(1);
}

/// Record an input validation failure.
///
/// # Arguments
///
/// * `field` - Field that failed (name, to, sdp, url, time, message_size, ...)
pub fn record_validation_failure(field: &str) {
    counter!(
        VALIDATION_FAILURES_TOTAL,
        "type" => field.to_string()
    )
    .increment(1);
}

/// Record a rate-limited message.
pub fn record_rate_limited(source: &str) {
    counter!(
        RATE_LIMITED_TOTAL,
        "source" => source.to_string()
    )
    .increment(1);
}

/// Publish the registry's size and broadcast state.
#[allow(clippy::cast_precision_loss)]
pub fn set_session_gauges(clients: usize, broadcasting: bool) {
    gauge!(CLIENTS_CONNECTED).set(clients as f64);
    gauge!(BROADCASTER_PRESENT).set(if broadcasting { 1.0 } else { 0.0 });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        // No recorder installed in unit tests; calls must not panic.
        inc_ws_connections();
        record_ws_message("inbound", "play");
        record_validation_failure("name");
        set_session_gauges(2, true);
        dec_ws_connections();
    }
}
