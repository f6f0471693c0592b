//! The live poll session coordinator.
//!
//! Owns the one [`SessionState`] and applies client events to it. Each
//! mutation and the broadcast it triggers happen under the same lock, so
//! subscribers observe events in mutation order. Persistence runs after the
//! lock is released and never blocks or fails the live flow.

use chrono::Utc;
use pollroom_models::chat::ChatMessage;
use pollroom_models::gateway::{
    CHAT_MESSAGE, KICKED_OUT, PARTICIPANTS_UPDATE, POLL_CREATED, POLL_RESULTS,
};
use pollroom_models::poll::{NewPoll, Poll, PollRecord, Tally};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::CoreError;
use crate::events::EventBus;
use crate::observability;
use crate::persistence::PersistenceReconciler;
use crate::presence_manager::PresenceManager;
use crate::session::{SessionState, TallySnapshot};
use crate::store::PollStore;
use crate::votes::{self, Vote, VotePolicy, VoteRejection};

const MAX_QUESTION_LEN: usize = 500;
const MAX_OPTIONS: usize = 26;

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub votes: VotePolicy,
    /// Drop a participant from the roster when their connection closes.
    pub remove_on_disconnect: bool,
    /// How long a disconnected participant may take to rejoin before removal.
    pub disconnect_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            votes: VotePolicy::default(),
            remove_on_disconnect: false,
            disconnect_grace: Duration::from_millis(1500),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// Name added to the roster.
    Joined,
    /// Name was still held from a disconnect inside the grace period.
    Reclaimed,
    /// Name already taken; the join is ignored.
    Duplicate,
    /// Empty name; the join is ignored.
    Invalid,
}

pub struct PollCoordinator {
    state: Mutex<SessionState>,
    reconciler: Arc<PersistenceReconciler>,
    event_bus: EventBus,
    presence: PresenceManager,
    config: SessionConfig,
}

impl PollCoordinator {
    pub fn new(store: Arc<dyn PollStore>, event_bus: EventBus, config: SessionConfig) -> Self {
        Self {
            state: Mutex::new(SessionState::new()),
            reconciler: Arc::new(PersistenceReconciler::new(store)),
            event_bus,
            presence: PresenceManager::new(config.disconnect_grace),
            config,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn reconciler(&self) -> &PersistenceReconciler {
        &self.reconciler
    }

    pub fn join(&self, session_id: &str, username: &str) -> JoinOutcome {
        let name = username.trim();
        if name.is_empty() {
            return JoinOutcome::Invalid;
        }
        let reclaimed = self.presence.cancel_removal(name);

        let mut state = self.lock_state();
        let outcome = if state.add_participant(name) {
            self.event_bus
                .dispatch(PARTICIPANTS_UPDATE, to_payload(state.roster()));
            JoinOutcome::Joined
        } else if reclaimed {
            JoinOutcome::Reclaimed
        } else {
            JoinOutcome::Duplicate
        };

        if outcome != JoinOutcome::Duplicate {
            self.send_live_poll(&state, session_id);
        }
        tracing::debug!(username = name, ?outcome, "join");
        outcome
    }

    /// Bring a single session up to date with the live poll and tally.
    fn send_live_poll(&self, state: &SessionState, session_id: &str) {
        let Some(poll) = state.current_poll().and_then(|live| live.to_poll()) else {
            return;
        };
        let targets = vec![session_id.to_string()];
        self.event_bus
            .dispatch_to_sessions(POLL_CREATED, to_payload(&poll), targets.clone());
        self.event_bus
            .dispatch_to_sessions(POLL_RESULTS, to_payload(state.tally()), targets);
    }

    pub fn leave(&self, username: &str) -> bool {
        let mut state = self.lock_state();
        let removed = state.remove_participant(username);
        if removed {
            self.event_bus
                .dispatch(PARTICIPANTS_UPDATE, to_payload(state.roster()));
        }
        removed
    }

    /// A named connection went away. Presence is kept unless the session is
    /// configured to drop it, in which case removal waits out the grace period.
    pub fn participant_disconnected(self: &Arc<Self>, username: &str) {
        if !self.config.remove_on_disconnect {
            tracing::debug!(username, "disconnect keeps roster entry");
            return;
        }
        let coordinator = Arc::clone(self);
        let name = username.to_string();
        self.presence.schedule_removal(username, async move {
            if coordinator.leave(&name) {
                tracing::info!(username = %name, "participant removed after disconnect");
            }
        });
    }

    pub fn chat(&self, mut message: ChatMessage) {
        if message.timestamp.is_none() {
            message.timestamp = Some(Utc::now());
        }
        let mut state = self.lock_state();
        self.event_bus.dispatch(CHAT_MESSAGE, to_payload(&message));
        state.append_chat(message);
    }

    /// Remove `username` and announce the kick. The announcement goes out even
    /// if the name was never on the roster.
    pub fn kick(&self, username: &str) {
        self.presence.cancel_removal(username);
        let mut state = self.lock_state();
        let removed = state.remove_participant(username);
        self.event_bus
            .dispatch(PARTICIPANTS_UPDATE, to_payload(state.roster()));
        self.event_bus.dispatch(KICKED_OUT, json!(username));
        tracing::info!(username, removed, "participant kicked");
    }

    /// Open a new poll, retiring the live one. The tally resets immediately;
    /// the poll is announced once its canonical ID is known.
    pub async fn create_poll(&self, new_poll: NewPoll) -> Result<Poll, CoreError> {
        validate_new_poll(&new_poll)?;
        let record = PollRecord::from_new(new_poll, Utc::now());

        let generation = self.lock_state().set_current_poll(record.clone());
        let poll = self.reconciler.persist_new_poll(record).await;

        {
            let mut state = self.lock_state();
            match state.assign_poll_id(generation, &poll.id) {
                Some(live) => {
                    self.event_bus.dispatch(POLL_CREATED, to_payload(&live));
                    let snapshot = state.tally_snapshot();
                    self.event_bus
                        .dispatch(POLL_RESULTS, to_payload(&snapshot.votes));
                    self.reconciler.retire_writers_except(&poll.id);
                    // Votes accepted while the save was in flight had no ID to target.
                    if !snapshot.votes.is_empty() {
                        self.reconciler.schedule_vote_update(&poll.id, snapshot);
                    }
                }
                None => {
                    tracing::info!(poll_id = %poll.id, "poll was replaced before it finished saving");
                }
            }
        }

        tracing::info!(poll_id = %poll.id, question = %poll.record.question, "poll created");
        Ok(poll)
    }

    /// Count a vote and broadcast the new tally. The store write is queued
    /// and never waited on.
    pub fn submit_answer(&self, vote: Vote) -> Result<TallySnapshot, VoteRejection> {
        let snapshot = {
            let mut state = self.lock_state();
            match votes::submit_answer(&mut state, &self.config.votes, &vote) {
                Ok(snapshot) => {
                    self.event_bus
                        .dispatch(POLL_RESULTS, to_payload(&snapshot.votes));
                    snapshot
                }
                Err(rejection) => {
                    observability::vote_rejected();
                    tracing::debug!(participant = %vote.participant, %rejection, "vote ignored");
                    return Err(rejection);
                }
            }
        };

        observability::vote_accepted();
        tracing::debug!(
            participant = %vote.participant,
            option = %vote.option,
            votes = ?snapshot.votes,
            "vote received"
        );

        match snapshot.poll_id.as_deref() {
            Some(poll_id) => self
                .reconciler
                .schedule_vote_update(poll_id, snapshot.clone()),
            None => tracing::debug!("poll still saving, tally will be persisted once it has an ID"),
        }
        Ok(snapshot)
    }

    pub fn roster(&self) -> Vec<String> {
        self.lock_state().roster().to_vec()
    }

    pub fn tally(&self) -> Tally {
        self.lock_state().tally().clone()
    }

    pub fn current_poll(&self) -> Option<Poll> {
        self.lock_state()
            .current_poll()
            .and_then(|live| live.to_poll())
    }

    pub fn chat_log(&self) -> Vec<ChatMessage> {
        self.lock_state().chat_log().to_vec()
    }

    pub async fn poll_history(&self, owner: &str) -> Vec<Poll> {
        self.reconciler.poll_history(owner).await
    }
}

fn validate_new_poll(poll: &NewPoll) -> Result<(), CoreError> {
    let question = poll.question.trim();
    if question.is_empty() || question.chars().count() > MAX_QUESTION_LEN {
        return Err(CoreError::BadRequest(
            "Question must be 1-500 characters".into(),
        ));
    }
    if poll.options.is_empty() || poll.options.len() > MAX_OPTIONS {
        return Err(CoreError::BadRequest("Poll needs 1-26 options".into()));
    }
    let mut seen = HashSet::new();
    if !poll.options.iter().all(|option| seen.insert(option.id)) {
        return Err(CoreError::BadRequest("Option ids must be unique".into()));
    }
    Ok(())
}

fn to_payload<T: Serialize + ?Sized>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        tracing::error!("failed to encode event payload: {e}");
        Value::Null
    })
}
