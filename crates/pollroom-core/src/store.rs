//! Durable store capability. The coordinator picks one implementation at
//! startup: [`SqlPollStore`] when a database is reachable, otherwise
//! [`NullStore`], which fails every call and routes all persistence to the
//! in-memory poll history.

use async_trait::async_trait;
use pollroom_db::{DbError, DbPool};
use pollroom_models::poll::{Poll, PollRecord, Tally};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("durable store unavailable")]
    Unavailable,
    #[error("durable store error: {0}")]
    Backend(String),
}

impl From<DbError> for StoreError {
    fn from(e: DbError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

#[async_trait]
pub trait PollStore: Send + Sync {
    fn connected(&self) -> bool;

    /// Persist a new poll and return its store-assigned ID.
    async fn save(&self, record: &PollRecord) -> Result<String, StoreError>;

    /// Overwrite the stored tally. `Ok(None)` means no record has `id`.
    async fn update(&self, id: &str, votes: &Tally) -> Result<Option<Poll>, StoreError>;

    /// Polls owned by `owner`, newest first.
    async fn find_by_owner(&self, owner: &str) -> Result<Vec<Poll>, StoreError>;
}

/// Store used when no database is configured or reachable.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

#[async_trait]
impl PollStore for NullStore {
    fn connected(&self) -> bool {
        false
    }

    async fn save(&self, _record: &PollRecord) -> Result<String, StoreError> {
        Err(StoreError::Unavailable)
    }

    async fn update(&self, _id: &str, _votes: &Tally) -> Result<Option<Poll>, StoreError> {
        Err(StoreError::Unavailable)
    }

    async fn find_by_owner(&self, _owner: &str) -> Result<Vec<Poll>, StoreError> {
        Err(StoreError::Unavailable)
    }
}

/// SQLite-backed store.
#[derive(Clone)]
pub struct SqlPollStore {
    pool: DbPool,
}

impl SqlPollStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PollStore for SqlPollStore {
    fn connected(&self) -> bool {
        !self.pool.is_closed()
    }

    async fn save(&self, record: &PollRecord) -> Result<String, StoreError> {
        let row = pollroom_db::polls::create_poll(&self.pool, record).await?;
        Ok(row.id.to_string())
    }

    async fn update(&self, id: &str, votes: &Tally) -> Result<Option<Poll>, StoreError> {
        // Locally generated fallback IDs are never valid row IDs here.
        let Ok(row_id) = id.parse::<i64>() else {
            return Ok(None);
        };
        match pollroom_db::polls::update_poll_votes(&self.pool, row_id, votes).await {
            Ok(row) => Ok(Some(row.into_poll())),
            Err(DbError::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_owner(&self, owner: &str) -> Result<Vec<Poll>, StoreError> {
        let rows = pollroom_db::polls::get_teacher_polls(&self.pool, owner).await?;
        Ok(rows.into_iter().map(|r| r.into_poll()).collect())
    }
}
