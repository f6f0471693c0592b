//! Best-effort persistence of the live session.
//!
//! Every call first tries the durable store and falls back to an append-only
//! in-memory poll history. Nothing here returns an error: storage trouble is
//! logged and absorbed.
//!
//! Tally writes run on a background writer per poll. Callers hand over a
//! snapshot and return at once; while a write is in flight only the newest
//! waiting snapshot is kept, so a slow store costs at most one extra write.

use chrono::Utc;
use pollroom_models::poll::{Poll, PollRecord, Tally};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::sync::Notify;

use crate::observability;
use crate::session::TallySnapshot;
use crate::store::PollStore;

#[derive(Debug, Default)]
struct TallyWriter {
    /// Highest revision that reached the store or the history.
    written: u64,
    /// Newest snapshot waiting behind the in-flight write.
    pending: Option<TallySnapshot>,
    in_flight: bool,
}

pub struct PersistenceReconciler {
    store: Arc<dyn PollStore>,
    history: RwLock<Vec<Poll>>,
    last_local_id: AtomicI64,
    /// Tally writers keyed by poll ID. Only the live poll is kept.
    writers: Mutex<HashMap<String, TallyWriter>>,
    writes_idle: Notify,
}

impl PersistenceReconciler {
    pub fn new(store: Arc<dyn PollStore>) -> Self {
        Self {
            store,
            history: RwLock::new(Vec::new()),
            last_local_id: AtomicI64::new(0),
            writers: Mutex::new(HashMap::new()),
            writes_idle: Notify::new(),
        }
    }

    pub fn store_connected(&self) -> bool {
        self.store.connected()
    }

    /// Persist a freshly created poll and return it under its canonical ID.
    pub async fn persist_new_poll(&self, record: PollRecord) -> Poll {
        if self.store.connected() {
            match self.store.save(&record).await {
                Ok(id) => {
                    tracing::info!(poll_id = %id, "poll saved to durable store");
                    return Poll { id, record };
                }
                Err(e) => {
                    tracing::warn!(error = %e, "saving poll failed, keeping it in memory");
                }
            }
        } else {
            tracing::debug!("durable store not connected, keeping poll in memory");
        }

        observability::store_fallback();
        let poll = Poll {
            id: self.next_local_id(),
            record,
        };
        self.history_mut().push(poll.clone());
        tracing::info!(poll_id = %poll.id, "poll recorded in memory history");
        poll
    }

    /// Queue the full tally snapshot for `poll_id` and return without waiting
    /// on the store. Snapshots older than one already written or queued for
    /// the same poll are dropped.
    pub fn schedule_vote_update(self: &Arc<Self>, poll_id: &str, snapshot: TallySnapshot) {
        {
            let mut writers = self.lock_writers();
            let writer = writers.entry(poll_id.to_string()).or_default();
            let queued = writer.pending.as_ref().map_or(0, |p| p.revision);
            if snapshot.revision <= writer.written.max(queued) {
                tracing::debug!(poll_id, revision = snapshot.revision, "skipping stale tally write");
                return;
            }
            if writer.in_flight {
                writer.pending = Some(snapshot);
                return;
            }
            writer.in_flight = true;
        }

        let reconciler = Arc::clone(self);
        let poll_id = poll_id.to_string();
        tokio::spawn(async move { reconciler.drain_writes(poll_id, snapshot).await });
    }

    /// Wait until no tally write is in flight.
    pub async fn flush(&self) {
        loop {
            let idle = self.writes_idle.notified();
            let busy = self.lock_writers().values().any(|w| w.in_flight);
            if !busy {
                return;
            }
            idle.await;
        }
    }

    /// Forget writers of every poll except the live one.
    pub fn retire_writers_except(&self, live_poll_id: &str) {
        self.lock_writers().retain(|poll_id, _| poll_id == live_poll_id);
        self.writes_idle.notify_waiters();
    }

    #[cfg(test)]
    pub(crate) fn tracked_polls(&self) -> usize {
        self.lock_writers().len()
    }

    async fn drain_writes(&self, poll_id: String, mut snapshot: TallySnapshot) {
        loop {
            let written = self.write_tally(&poll_id, &snapshot).await;
            let next = {
                let mut writers = self.lock_writers();
                match writers.get_mut(&poll_id) {
                    Some(writer) => {
                        if written {
                            writer.written = writer.written.max(snapshot.revision);
                        }
                        let next = writer
                            .pending
                            .take()
                            .filter(|next| next.revision > writer.written);
                        if next.is_none() {
                            writer.in_flight = false;
                        }
                        next
                    }
                    // Retired while the write was in flight.
                    None => None,
                }
            };
            match next {
                Some(next) => snapshot = next,
                None => break,
            }
        }
        self.writes_idle.notify_waiters();
    }

    /// Returns whether the tally landed in the store or the history.
    async fn write_tally(&self, poll_id: &str, snapshot: &TallySnapshot) -> bool {
        if self.store.connected() {
            match self.store.update(poll_id, &snapshot.votes).await {
                Ok(Some(poll)) => {
                    tracing::debug!(poll_id, votes = ?poll.record.votes, "poll votes updated in durable store");
                    return true;
                }
                Ok(None) => {
                    tracing::info!(poll_id, "poll not found in durable store");
                }
                Err(e) => {
                    observability::store_fallback();
                    tracing::warn!(poll_id, error = %e, "updating poll votes failed");
                }
            }
        }

        if self.update_history(poll_id, &snapshot.votes) {
            tracing::debug!(poll_id, votes = ?snapshot.votes, "poll votes updated in memory");
            true
        } else {
            tracing::debug!(poll_id, "no stored poll matches, dropping tally update");
            false
        }
    }

    /// Polls owned by `owner`, newest first. Store results are merged with any
    /// polls that only made it into the in-memory history.
    pub async fn poll_history(&self, owner: &str) -> Vec<Poll> {
        let mut polls: Vec<Poll> = self
            .history_ref()
            .iter()
            .rev()
            .filter(|poll| poll.record.teacher_username == owner)
            .cloned()
            .collect();

        if self.store.connected() {
            match self.store.find_by_owner(owner).await {
                Ok(stored) => polls.extend(stored),
                Err(e) => tracing::warn!(owner, error = %e, "loading poll history failed"),
            }
        }

        polls.sort_by(|a, b| b.record.created_at.cmp(&a.record.created_at));
        polls
    }

    /// Every poll kept in memory, in creation order.
    pub fn history(&self) -> Vec<Poll> {
        self.history_ref().clone()
    }

    fn update_history(&self, poll_id: &str, votes: &Tally) -> bool {
        let mut history = self.history_mut();
        match history.iter_mut().find(|poll| poll.id == poll_id) {
            Some(poll) => {
                poll.record.votes = votes.clone();
                true
            }
            None => false,
        }
    }

    /// Millisecond timestamp, bumped past the previous ID when two polls are
    /// created within the same millisecond.
    fn next_local_id(&self) -> String {
        let now = Utc::now().timestamp_millis();
        let previous = match self
            .last_local_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |prev| Some(now.max(prev + 1)))
        {
            Ok(prev) | Err(prev) => prev,
        };
        now.max(previous + 1).to_string()
    }

    fn lock_writers(&self) -> MutexGuard<'_, HashMap<String, TallyWriter>> {
        match self.writers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn history_ref(&self) -> std::sync::RwLockReadGuard<'_, Vec<Poll>> {
        match self.history.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn history_mut(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Poll>> {
        match self.history.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
