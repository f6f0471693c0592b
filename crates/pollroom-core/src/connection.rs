//! Per-connection identity and the side effects of client commands.
//!
//! A connection starts `Anonymous`, becomes `Named` after a successful join
//! and ends `Disconnected` on transport close or when it is kicked. The
//! transport feeds it inbound commands and outbound bus events and does what
//! the returned [`Flow`] / [`Delivery`] say.

use pollroom_models::gateway::{ClientCommand, KICKED_OUT};
use std::sync::Arc;

use crate::coordinator::{JoinOutcome, PollCoordinator};
use crate::events::ServerEvent;
use crate::votes::Vote;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionPhase {
    Anonymous,
    Named(String),
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Forward,
    /// Forward the event, then close the connection.
    ForwardAndClose,
}

pub struct ConnectionLifecycle {
    session_id: String,
    phase: ConnectionPhase,
    coordinator: Arc<PollCoordinator>,
}

impl ConnectionLifecycle {
    pub fn new(session_id: impl Into<String>, coordinator: Arc<PollCoordinator>) -> Self {
        Self {
            session_id: session_id.into(),
            phase: ConnectionPhase::Anonymous,
            coordinator,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn phase(&self) -> &ConnectionPhase {
        &self.phase
    }

    pub fn username(&self) -> Option<&str> {
        match &self.phase {
            ConnectionPhase::Named(name) => Some(name),
            _ => None,
        }
    }

    pub async fn handle_command(&mut self, command: ClientCommand) -> Flow {
        if self.phase == ConnectionPhase::Disconnected {
            return Flow::Close;
        }

        match command {
            ClientCommand::JoinChat(join) => self.join(&join.username),
            ClientCommand::ChatMessage(mut message) => {
                if message.username.trim().is_empty() {
                    if let Some(name) = self.username() {
                        message.username = name.to_string();
                    }
                }
                self.coordinator.chat(message);
            }
            ClientCommand::KickOut(username) => self.coordinator.kick(&username),
            ClientCommand::CreatePoll(new_poll) => {
                if let Err(e) = self.coordinator.create_poll(new_poll).await {
                    tracing::warn!(session_id = %self.session_id, "createPoll ignored: {e}");
                }
            }
            ClientCommand::SubmitAnswer(answer) => {
                let participant = if answer.username.trim().is_empty() {
                    self.username().unwrap_or_default().to_string()
                } else {
                    answer.username
                };
                let _ = self.coordinator.submit_answer(Vote {
                    participant,
                    option: answer.option,
                    poll_id: answer.poll_id,
                });
            }
        }
        Flow::Continue
    }

    fn join(&mut self, username: &str) {
        if let ConnectionPhase::Named(current) = &self.phase {
            tracing::debug!(session_id = %self.session_id, current = %current, "already joined, ignoring join");
            return;
        }
        match self.coordinator.join(&self.session_id, username) {
            JoinOutcome::Joined | JoinOutcome::Reclaimed => {
                self.phase = ConnectionPhase::Named(username.trim().to_string());
            }
            JoinOutcome::Duplicate | JoinOutcome::Invalid => {}
        }
    }

    /// Decide what to do with a bus event bound for this connection. A kick
    /// naming this connection's identity ends it.
    pub fn on_event(&mut self, event: &ServerEvent) -> Delivery {
        if event.event_type == KICKED_OUT {
            if let ConnectionPhase::Named(name) = &self.phase {
                if event.payload.as_str() == Some(name.as_str()) {
                    tracing::info!(session_id = %self.session_id, username = %name, "connection kicked");
                    self.phase = ConnectionPhase::Disconnected;
                    return Delivery::ForwardAndClose;
                }
            }
        }
        Delivery::Forward
    }

    /// Transport-level close. Idempotent.
    pub fn disconnect(&mut self) {
        let previous = std::mem::replace(&mut self.phase, ConnectionPhase::Disconnected);
        if let ConnectionPhase::Named(name) = previous {
            self.coordinator.participant_disconnected(&name);
        }
    }
}
