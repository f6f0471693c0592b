use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Defers roster removal after a disconnect so a participant who reconnects
/// within the grace period keeps their name.
///
/// Only used when the session removes participants on disconnect; otherwise
/// names stay on the roster until an explicit kick.
pub struct PresenceManager {
    pending_removals: Arc<DashMap<String, JoinHandle<()>>>,
    grace_period: Duration,
}

impl PresenceManager {
    pub fn new(grace_period: Duration) -> Self {
        Self {
            pending_removals: Arc::new(DashMap::new()),
            grace_period,
        }
    }

    /// Schedule `task` to run for `username` once the grace period elapses.
    ///
    /// Any previously pending removal for the same name is cancelled first.
    pub fn schedule_removal<F>(&self, username: &str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel_removal(username);
        let pending = self.pending_removals.clone();
        let delay = self.grace_period;
        let key = username.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            pending.remove(&key);
            task.await;
        });
        self.pending_removals.insert(username.to_string(), handle);
    }

    /// Cancel a pending removal (e.g. on rejoin). Returns whether one was pending.
    pub fn cancel_removal(&self, username: &str) -> bool {
        match self.pending_removals.remove(username) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, username: &str) -> bool {
        self.pending_removals.contains_key(username)
    }
}

impl Default for PresenceManager {
    fn default() -> Self {
        Self::new(Duration::from_millis(1500))
    }
}
