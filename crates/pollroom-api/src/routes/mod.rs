pub mod health;
pub mod polls;

use axum::Json;
use serde_json::{json, Value};

use crate::error::ApiError;

pub async fn root() -> Json<Value> {
    Json(json!({ "message": "Pollroom API" }))
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound
}
