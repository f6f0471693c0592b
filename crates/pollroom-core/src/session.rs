//! The single authoritative live session: current poll, tally, roster and chat.
//!
//! `SessionState` is plain data with synchronous mutators. The coordinator
//! owns exactly one instance behind a mutex, so every mutation here runs to
//! completion before the next one starts.

use pollroom_models::chat::ChatMessage;
use pollroom_models::poll::{Poll, PollRecord, Tally};
use std::collections::HashSet;

/// The poll currently open for voting.
#[derive(Debug, Clone)]
pub struct LivePoll {
    pub generation: u64,
    /// Canonical ID; `None` while the durable-store save is still pending.
    pub id: Option<String>,
    pub record: PollRecord,
}

impl LivePoll {
    pub fn to_poll(&self) -> Option<Poll> {
        self.id.as_ref().map(|id| Poll {
            id: id.clone(),
            record: self.record.clone(),
        })
    }
}

/// Immutable view of the tally handed to broadcast and persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TallySnapshot {
    pub generation: u64,
    pub poll_id: Option<String>,
    /// Bumped on every accepted vote; orders writes of the same poll's tally.
    pub revision: u64,
    pub votes: Tally,
}

#[derive(Debug, Default)]
pub struct SessionState {
    current: Option<LivePoll>,
    tally: Tally,
    generation: u64,
    revision: u64,
    voters: HashSet<String>,
    roster: Vec<String>,
    chat_log: Vec<ChatMessage>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retire the live poll (if any) and open `record` with an empty tally.
    /// Returns the new poll's generation.
    pub fn set_current_poll(&mut self, record: PollRecord) -> u64 {
        self.generation += 1;
        self.tally.clear();
        self.voters.clear();
        self.current = Some(LivePoll {
            generation: self.generation,
            id: None,
            record,
        });
        self.generation
    }

    /// Bind the canonical ID to the poll opened in `generation`. Returns the
    /// addressed poll, or `None` if a newer poll has replaced it meanwhile.
    pub fn assign_poll_id(&mut self, generation: u64, id: &str) -> Option<Poll> {
        let live = self.current.as_mut().filter(|p| p.generation == generation)?;
        live.id = Some(id.to_string());
        live.to_poll()
    }

    pub fn current_poll(&self) -> Option<&LivePoll> {
        self.current.as_ref()
    }

    pub fn record_vote(&mut self, option_key: &str) -> TallySnapshot {
        *self.tally.entry(option_key.to_string()).or_insert(0) += 1;
        self.revision += 1;
        self.tally_snapshot()
    }

    /// Remember that `participant` voted in the live poll. Returns `false` if
    /// they already had.
    pub fn mark_voter(&mut self, participant: &str) -> bool {
        self.voters.insert(participant.to_string())
    }

    pub fn has_voted(&self, participant: &str) -> bool {
        self.voters.contains(participant)
    }

    pub fn tally(&self) -> &Tally {
        &self.tally
    }

    pub fn tally_snapshot(&self) -> TallySnapshot {
        TallySnapshot {
            generation: self.generation,
            poll_id: self.current.as_ref().and_then(|p| p.id.clone()),
            revision: self.revision,
            votes: self.tally.clone(),
        }
    }

    pub fn add_participant(&mut self, name: &str) -> bool {
        if self.roster.iter().any(|p| p == name) {
            return false;
        }
        self.roster.push(name.to_string());
        true
    }

    pub fn remove_participant(&mut self, name: &str) -> bool {
        let before = self.roster.len();
        self.roster.retain(|p| p != name);
        self.roster.len() != before
    }

    pub fn has_participant(&self, name: &str) -> bool {
        self.roster.iter().any(|p| p == name)
    }

    pub fn roster(&self) -> &[String] {
        &self.roster
    }

    pub fn append_chat(&mut self, message: ChatMessage) {
        self.chat_log.push(message);
    }

    pub fn chat_log(&self) -> &[ChatMessage] {
        &self.chat_log
    }
}
