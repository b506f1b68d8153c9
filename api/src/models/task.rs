use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::task::{Task, TaskStatus};
use sqlx::SqlitePool;

use super::from_millis;
use crate::error::Result;

/// Durable copy of every task, written after each step.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn save(&self, task: &Task) -> Result<()>;
    async fn load(&self, id: &str) -> Result<Option<Task>>;
    /// Remove tasks created before `cutoff`, returning how many went.
    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    owner_id: String,
    status: String,
    progress: i64,
    step: i64,
    message: String,
    error: Option<String>,
    params: String,
    sources: String,
    tracks: String,
    result: Option<String>,
    csv_data: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<TaskRow> for Task {
    type Error = serde_json::Error;

    fn try_from(row: TaskRow) -> std::result::Result<Self, Self::Error> {
        Ok(Task {
            id: row.id,
            owner_id: row.owner_id,
            status: TaskStatus::from(row.status),
            progress: row.progress.clamp(0, 100) as u8,
            step: row.step.max(0) as u32,
            message: row.message,
            error: row.error,
            params: serde_json::from_str(&row.params)?,
            sources: serde_json::from_str(&row.sources)?,
            tracks: serde_json::from_str(&row.tracks)?,
            result: row.result.as_deref().map(serde_json::from_str).transpose()?,
            csv_data: row.csv_data,
            created_at: from_millis(row.created_at),
            updated_at: from_millis(row.updated_at),
        })
    }
}

pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn save(&self, task: &Task) -> Result<()> {
        let result = task.result.as_ref().map(serde_json::to_string).transpose()?;
        sqlx::query(
            "INSERT INTO tasks (id, owner_id, status, progress, step, message, error, params, sources, tracks, result, csv_data, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                progress = excluded.progress,
                step = excluded.step,
                message = excluded.message,
                error = excluded.error,
                sources = excluded.sources,
                tracks = excluded.tracks,
                result = excluded.result,
                csv_data = excluded.csv_data,
                updated_at = excluded.updated_at",
        )
        .bind(&task.id)
        .bind(&task.owner_id)
        .bind(task.status.as_str())
        .bind(i64::from(task.progress))
        .bind(i64::from(task.step))
        .bind(&task.message)
        .bind(&task.error)
        .bind(serde_json::to_string(&task.params)?)
        .bind(serde_json::to_string(&task.sources)?)
        .bind(serde_json::to_string(&task.tracks)?)
        .bind(result)
        .bind(&task.csv_data)
        .bind(task.created_at.timestamp_millis())
        .bind(task.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<Task>> {
        let row = sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Task::try_from).transpose()?)
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let done = sqlx::query("DELETE FROM tasks WHERE created_at < ?")
            .bind(cutoff.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected())
    }
}
