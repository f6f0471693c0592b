pub mod connection;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod observability;
pub mod persistence;
pub mod presence_manager;
pub mod session;
pub mod store;
pub mod votes;

#[cfg(test)]
pub(crate) mod testing;

use coordinator::{PollCoordinator, SessionConfig};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<PollCoordinator>,
    pub config: AppConfig,
    /// Source of presenter usernames handed out by the login route.
    pub teacher_counter: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(store: Arc<dyn store::PollStore>, config: AppConfig) -> Self {
        let event_bus = events::EventBus::new(config.event_capacity);
        let coordinator = PollCoordinator::new(store, event_bus, config.session.clone());
        Self {
            coordinator: Arc::new(coordinator),
            config,
            teacher_counter: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn event_bus(&self) -> &events::EventBus {
        self.coordinator.event_bus()
    }

    pub fn next_teacher_username(&self) -> String {
        let n = self.teacher_counter.fetch_add(1, Ordering::Relaxed);
        format!("teacher{n}")
    }
}

/// Local dev-server origins accepted alongside the configured ones.
pub const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "http://localhost:3000",
    "http://127.0.0.1:3000",
    "http://localhost:5173",
    "http://127.0.0.1:5173",
];

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Extra browser origins allowed to open the gateway. `*` allows any.
    pub allowed_origins: Vec<String>,
    /// Per-session outbound buffer before a slow client starts skipping events.
    pub event_capacity: usize,
    pub session: SessionConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            event_capacity: 256,
            session: SessionConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|origin| origin.trim() == "*")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teacher_usernames_count_up_from_one() {
        let state = AppState::new(Arc::new(store::NullStore), AppConfig::default());
        assert_eq!(state.next_teacher_username(), "teacher1");
        assert_eq!(state.next_teacher_username(), "teacher2");
        assert_eq!(state.clone().next_teacher_username(), "teacher3");
    }

    #[test]
    fn wildcard_origin_is_detected() {
        let mut config = AppConfig::default();
        assert!(!config.allows_any_origin());
        config.allowed_origins = vec!["https://a.example".into(), " * ".into()];
        assert!(config.allows_any_origin());
    }
}
