use axum::{extract::State, Json};
use pollroom_core::{observability, AppState};
use serde_json::{json, Value};

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "store_connected": state.coordinator.reconciler().store_connected(),
        "sessions": state.event_bus().session_count(),
        "metrics": observability::metrics_snapshot(),
    }))
}
