use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::utils::gateway::{AppState, AppStateData};

pub const SURVEI_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A handler for a simple liveness check
pub async fn status_handler() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok".to_string(),
        version: SURVEI_VERSION.to_string(),
    })
}

#[derive(Debug, Deserialize, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
}

/// A handler for a health check that includes availability of the feedback store
pub async fn health_handler(
    State(AppStateData { feedback_store, .. }): AppState,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if feedback_store.health().await.is_ok() {
        return Ok(Json(json!({
            "gateway": "ok",
            "store": "ok",
        })));
    }

    Err((
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({
            "gateway": "ok",
            "store": "error",
        })),
    ))
}
