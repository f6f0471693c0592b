use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

use crate::observability;

#[derive(Debug, Clone)]
pub struct ServerEvent {
    pub event_type: String,
    pub payload: serde_json::Value,
    /// When set, only deliver this event to the specified connection sessions.
    pub target_session_ids: Option<Vec<String>>,
}

/// Broadcast-based event bus for real-time dispatch.
///
/// Every connected session owns its own bounded channel. A session that falls
/// behind skips events (`RecvError::Lagged`); publishers never block.
#[derive(Clone)]
pub struct EventBus {
    capacity: usize,
    sessions: Arc<RwLock<HashMap<String, broadcast::Sender<ServerEvent>>>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn register_session(&self, session_id: impl Into<String>) -> broadcast::Receiver<ServerEvent> {
        let (sender, receiver) = broadcast::channel(self.capacity.max(64));
        let mut sessions = match self.sessions.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        sessions.insert(session_id.into(), sender);
        receiver
    }

    pub fn unregister_session(&self, session_id: &str) {
        let mut sessions = match self.sessions.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        sessions.remove(session_id);
    }

    pub fn session_count(&self) -> usize {
        match self.sessions.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn publish(&self, event: ServerEvent) {
        let senders: Vec<broadcast::Sender<ServerEvent>> = {
            let sessions = match self.sessions.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };

            match event.target_session_ids.as_ref() {
                Some(targets) => targets
                    .iter()
                    .filter_map(|id| sessions.get(id).cloned())
                    .collect(),
                None => sessions.values().cloned().collect(),
            }
        };

        observability::ws_event_dispatched(&event.event_type);
        for sender in senders {
            let _ = sender.send(event.clone());
        }
    }

    /// Helper: publish an event to every connected session.
    pub fn dispatch(&self, event_type: &str, payload: serde_json::Value) {
        self.publish(ServerEvent {
            event_type: event_type.to_string(),
            payload,
            target_session_ids: None,
        });
    }

    /// Helper: publish a targeted event delivered only to the specified sessions.
    pub fn dispatch_to_sessions(
        &self,
        event_type: &str,
        payload: serde_json::Value,
        target_session_ids: Vec<String>,
    ) {
        self.publish(ServerEvent {
            event_type: event_type.to_string(),
            payload,
            target_session_ids: Some(target_session_ids),
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(4096)
    }
}
