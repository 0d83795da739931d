//! # Watch Party Relay Library
//!
//! Shared types and the router for the relay server.
//! This library is used by both the binary and integration tests.

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::IntoResponse,
    routing::get,
    Router,
};

pub mod config;
pub mod health;
pub mod metrics;
pub mod relay;
pub mod routes;
pub mod validation;

pub use config::ServerConfig;
pub use relay::{RelayError, RelayState, SessionSnapshot};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Session registry and fan-out.
    pub relay: RelayState,
}

impl AppState {
    /// Fresh state with an empty session.
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            relay: RelayState::new(config),
        }
    }

    /// Get a reference to the relay state.
    pub fn relay(&self) -> &RelayState {
        &self.relay
    }
}

/// Routes for the relay WebSocket, session API and health probes.
///
/// Static files, metrics and HTTP middleware are layered on by the binary.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/api/session", get(routes::get_session))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/health", get(health::readiness))
        .with_state(state)
}

/// Relay WebSocket upgrade.
#[tracing::instrument(name = "websocket_connect", skip(ws, state))]
async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    tracing::debug!("WebSocket connection upgrade requested");
    ws.on_upgrade(move |socket| relay::handle_relay_socket(socket, state.relay))
}
