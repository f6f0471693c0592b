pub mod error;
pub mod routes;

use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use pollroom_core::{AppConfig, AppState, DEFAULT_ALLOWED_ORIGINS};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

pub fn build_router() -> Router<AppState> {
    Router::new()
        .route("/", get(routes::root))
        .route("/health", get(routes::health::health))
        .route("/teacher-login", post(routes::polls::teacher_login))
        .route(
            "/poll-history/{teacher_username}",
            get(routes::polls::get_poll_history),
        )
        .fallback(routes::not_found)
}

/// CORS for the browser client. `*` in the configured origins opens the API
/// to any page.
pub fn cors_layer(config: &AppConfig) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if config.allows_any_origin() {
        return base.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = DEFAULT_ALLOWED_ORIGINS
        .iter()
        .map(|origin| origin.to_string())
        .chain(config.allowed_origins.iter().map(|o| o.trim().trim_end_matches('/').to_string()))
        .filter_map(|origin| match HeaderValue::from_str(&origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(origins))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use pollroom_core::store::NullStore;
    use pollroom_models::poll::{NewPoll, PollOption};
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state() -> AppState {
        AppState::new(Arc::new(NullStore), AppConfig::default())
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn root_reports_api_name() {
        let app = build_router().with_state(state());
        let (status, body) = send(app, get_request("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Pollroom API");
    }

    #[tokio::test]
    async fn teacher_login_hands_out_sequential_names() {
        let state = state();
        let login = || {
            Request::builder()
                .method(Method::POST)
                .uri("/teacher-login")
                .body(Body::empty())
                .unwrap()
        };

        let (_, first) = send(build_router().with_state(state.clone()), login()).await;
        let (_, second) = send(build_router().with_state(state), login()).await;

        assert_eq!(first["username"], "teacher1");
        assert_eq!(second["username"], "teacher2");
    }

    #[tokio::test]
    async fn poll_history_lists_fallback_polls() {
        let state = state();
        state
            .coordinator
            .create_poll(NewPoll {
                question: "Q1".into(),
                options: vec![
                    PollOption { id: 1, text: "A".into(), correct: false },
                    PollOption { id: 2, text: "B".into(), correct: true },
                ],
                timer: 30,
                teacher_username: "teacher1".into(),
            })
            .await
            .unwrap();

        let app = build_router().with_state(state);
        let (status, body) = send(app.clone(), get_request("/poll-history/teacher1")).await;
        assert_eq!(status, StatusCode::OK);
        let polls = body.as_array().unwrap();
        assert_eq!(polls.len(), 1);
        assert_eq!(polls[0]["question"], "Q1");
        assert_eq!(polls[0]["teacherUsername"], "teacher1");
        assert!(!polls[0]["_id"].as_str().unwrap().is_empty());

        let (_, other) = send(app, get_request("/poll-history/teacher2")).await;
        assert_eq!(other, serde_json::json!([]));
    }

    #[tokio::test]
    async fn blank_owner_is_a_bad_request() {
        let app = build_router().with_state(state());
        let (status, body) = send(app, get_request("/poll-history/%20")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn unknown_route_returns_json_not_found() {
        let app = build_router().with_state(state());
        let (status, body) = send(app, get_request("/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn health_reports_store_and_metrics() {
        let app = build_router().with_state(state());
        let (status, body) = send(app, get_request("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["store_connected"], false);
        assert!(body["metrics"]["total_events"].is_u64());
    }

    #[tokio::test]
    async fn cors_echoes_configured_origin() {
        let config = AppConfig {
            allowed_origins: vec!["https://polls.example.com/".into()],
            ..AppConfig::default()
        };
        let app = build_router()
            .layer(cors_layer(&config))
            .with_state(AppState::new(Arc::new(NullStore), config));
        let request = Request::builder()
            .uri("/")
            .header(header::ORIGIN, "https://polls.example.com")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "https://polls.example.com"
        );
    }
}
