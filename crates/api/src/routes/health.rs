//! Liveness probe.

use axum::Json;
use serde_json::{Value, json};

/// GET /health: `{"status":"ok"}` while the process is serving requests.
pub async fn check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
