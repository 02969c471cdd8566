use axum::{extract::State, http::StatusCode, response::Json};
use serde_json::{json, Value};
use tracing::warn;

use crate::state::AppState;

/// Liveness plus a cheap pool checkout so a dead database shows up here.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.db() {
        Ok(_) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(err) => {
            warn!(error = %err, "health check could not reach the database");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "degraded" })),
            )
        }
    }
}
