use axum::{
    extract::{Path, State},
    Json,
};
use pollroom_core::AppState;
use serde_json::{json, Value};

use crate::error::ApiError;

/// Hands out the next presenter identity. There is no credential check; the
/// name only scopes poll history.
pub async fn teacher_login(State(state): State<AppState>) -> Json<Value> {
    let username = state.next_teacher_username();
    tracing::info!(%username, "presenter logged in");
    Json(json!({ "username": username }))
}

pub async fn get_poll_history(
    State(state): State<AppState>,
    Path(teacher_username): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let owner = teacher_username.trim();
    if owner.is_empty() {
        return Err(ApiError::BadRequest("teacherUsername is required".into()));
    }
    let polls = state.coordinator.poll_history(owner).await;
    Ok(Json(serde_json::to_value(polls)?))
}
