use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};
use pollroom_models::poll::{Poll, PollOption, PollRecord, Tally};
use sqlx::types::Json;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PollRow {
    pub id: i64,
    pub question: String,
    pub options: Json<Vec<PollOption>>,
    pub timer: i64,
    pub teacher_username: String,
    pub votes: Json<Tally>,
    pub created_at: DateTime<Utc>,
}

impl PollRow {
    pub fn into_poll(self) -> Poll {
        Poll {
            id: self.id.to_string(),
            record: PollRecord {
                question: self.question,
                options: self.options.0,
                timer: u32::try_from(self.timer).unwrap_or_default(),
                teacher_username: self.teacher_username,
                votes: self.votes.0,
                created_at: self.created_at,
            },
        }
    }
}

pub async fn create_poll(pool: &DbPool, record: &PollRecord) -> Result<PollRow, DbError> {
    let row = sqlx::query_as::<_, PollRow>(
        "INSERT INTO polls (question, options, timer, teacher_username, votes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         RETURNING id, question, options, timer, teacher_username, votes, created_at",
    )
    .bind(&record.question)
    .bind(Json(&record.options))
    .bind(i64::from(record.timer))
    .bind(&record.teacher_username)
    .bind(Json(&record.votes))
    .bind(record.created_at)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Overwrite the stored tally. Fails with [`DbError::NotFound`] when no poll
/// has `id`.
pub async fn update_poll_votes(pool: &DbPool, id: i64, votes: &Tally) -> Result<PollRow, DbError> {
    let row = sqlx::query_as::<_, PollRow>(
        "UPDATE polls SET votes = ?2 WHERE id = ?1
         RETURNING id, question, options, timer, teacher_username, votes, created_at",
    )
    .bind(id)
    .bind(Json(votes))
    .fetch_optional(pool)
    .await?;
    row.ok_or(DbError::NotFound)
}

pub async fn get_teacher_polls(
    pool: &DbPool,
    teacher_username: &str,
) -> Result<Vec<PollRow>, DbError> {
    let rows = sqlx::query_as::<_, PollRow>(
        "SELECT id, question, options, timer, teacher_username, votes, created_at
         FROM polls
         WHERE teacher_username = ?1
         ORDER BY created_at DESC, id DESC",
    )
    .bind(teacher_username)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
