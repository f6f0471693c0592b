//! Test doubles shared by the unit tests in this crate.

use async_trait::async_trait;
use chrono::Utc;
use pollroom_models::poll::{Poll, PollOption, PollRecord, Tally};
use std::sync::Mutex;
use std::time::Duration;

use crate::store::{PollStore, StoreError};

pub fn record(owner: &str, question: &str) -> PollRecord {
    PollRecord {
        question: question.to_string(),
        options: vec![
            PollOption { id: 1, text: "A".into(), correct: true },
            PollOption { id: 2, text: "B".into(), correct: false },
        ],
        timer: 30,
        teacher_username: owner.to_string(),
        votes: Tally::new(),
        created_at: Utc::now(),
    }
}

/// In-memory store whose connectivity and failures are scripted per test.
#[derive(Default)]
pub struct ScriptedStore {
    connected: bool,
    fail_saves: bool,
    fail_updates: bool,
    save_delay: Option<Duration>,
    update_delay: Option<Duration>,
    hang_updates: bool,
    saved: Mutex<Vec<Poll>>,
    updates: Mutex<Vec<(String, Tally)>>,
}

impl ScriptedStore {
    pub fn connected() -> Self {
        Self {
            connected: true,
            ..Self::default()
        }
    }

    pub fn failing_saves(mut self) -> Self {
        self.fail_saves = true;
        self
    }

    pub fn failing_updates(mut self) -> Self {
        self.fail_updates = true;
        self
    }

    pub fn with_save_delay(mut self, delay: Duration) -> Self {
        self.save_delay = Some(delay);
        self
    }

    pub fn with_update_delay(mut self, delay: Duration) -> Self {
        self.update_delay = Some(delay);
        self
    }

    /// `update` records the call and then never completes.
    pub fn hanging_updates(mut self) -> Self {
        self.hang_updates = true;
        self
    }

    /// Every `update` call received, in order.
    pub fn updates(&self) -> Vec<(String, Tally)> {
        self.updates.lock().unwrap().clone()
    }

    pub fn saved(&self) -> Vec<Poll> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl PollStore for ScriptedStore {
    fn connected(&self) -> bool {
        self.connected
    }

    async fn save(&self, record: &PollRecord) -> Result<String, StoreError> {
        if let Some(delay) = self.save_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_saves {
            return Err(StoreError::Backend("save rejected".into()));
        }
        let mut saved = self.saved.lock().unwrap();
        let id = format!("store-{}", saved.len() + 1);
        saved.push(Poll {
            id: id.clone(),
            record: record.clone(),
        });
        Ok(id)
    }

    async fn update(&self, id: &str, votes: &Tally) -> Result<Option<Poll>, StoreError> {
        self.updates
            .lock()
            .unwrap()
            .push((id.to_string(), votes.clone()));
        if self.hang_updates {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.update_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_updates {
            return Err(StoreError::Backend("update rejected".into()));
        }
        let mut saved = self.saved.lock().unwrap();
        Ok(saved.iter_mut().find(|poll| poll.id == id).map(|poll| {
            poll.record.votes = votes.clone();
            poll.clone()
        }))
    }

    async fn find_by_owner(&self, owner: &str) -> Result<Vec<Poll>, StoreError> {
        Ok(self
            .saved
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|poll| poll.record.teacher_username == owner)
            .cloned()
            .collect())
    }
}
