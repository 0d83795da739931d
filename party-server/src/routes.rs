//! API route handlers.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::AppState;

/// `GET /api/session`: the current session snapshot.
#[tracing::instrument(name = "get_session", skip(state))]
pub async fn get_session(State(state): State<AppState>) -> impl IntoResponse {
    match state.relay().snapshot() {
        Ok(snapshot) => (StatusCode::OK, Json(serde_json::json!(snapshot))),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": e.to_string() })),
        ),
    }
}
