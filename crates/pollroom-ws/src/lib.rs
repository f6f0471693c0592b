mod handler;

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use pollroom_core::{AppState, DEFAULT_ALLOWED_ORIGINS};
use std::collections::BTreeSet;

const MAX_FRAME_SIZE: usize = 32 * 1024;

pub fn gateway_router() -> Router<AppState> {
    Router::new().route("/gateway", get(ws_upgrade))
}

fn normalize_origin(origin: &str) -> String {
    origin.trim().trim_end_matches('/').to_ascii_lowercase()
}

fn default_allowed_origins() -> BTreeSet<String> {
    DEFAULT_ALLOWED_ORIGINS
        .iter()
        .copied()
        .map(normalize_origin)
        .collect()
}

fn build_allowed_origins(state: &AppState) -> BTreeSet<String> {
    let mut allowed = default_allowed_origins();
    for origin in state
        .config
        .allowed_origins
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
    {
        allowed.insert(normalize_origin(origin));
    }
    allowed
}

fn is_origin_allowed(headers: &HeaderMap, state: &AppState) -> bool {
    let Some(origin) = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok()) else {
        // Native clients and non-browser callers typically omit Origin.
        return true;
    };

    if state.config.allows_any_origin()
        || build_allowed_origins(state).contains(&normalize_origin(origin))
    {
        return true;
    }

    // Same-origin upgrades are always fine: host:port must match exactly.
    if let Some(host) = headers.get(header::HOST).and_then(|v| v.to_str().ok()) {
        let origin_no_scheme = origin
            .trim()
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .split('/')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        return origin_no_scheme == host.trim().to_ascii_lowercase();
    }

    false
}

async fn ws_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    if !is_origin_allowed(&headers, &state) {
        tracing::debug!("gateway upgrade refused for origin {:?}", headers.get(header::ORIGIN));
        return StatusCode::FORBIDDEN.into_response();
    }

    ws.max_message_size(MAX_FRAME_SIZE)
        .max_frame_size(MAX_FRAME_SIZE)
        .on_upgrade(move |socket| handler::handle_connection(socket, state))
        .into_response()
}
