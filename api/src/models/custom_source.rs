use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cratedigger::sources::youtube::descriptor_from_url;
use serde::{Deserialize, Serialize};
use shared::task::{SourceDescriptor, SourceKind};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::from_millis;
use crate::error::{Result, TaskError};

/// A YouTube playlist or channel an owner added to their source list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomSource {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub url: String,
    pub kind: SourceKind,
    pub source_id: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl CustomSource {
    pub fn descriptor(&self) -> SourceDescriptor {
        SourceDescriptor {
            id: self.source_id.clone(),
            name: self.name.clone(),
            kind: self.kind,
            custom: true,
            url: Some(self.url.clone()),
        }
    }
}

#[async_trait]
pub trait CustomSourceStore: Send + Sync {
    async fn add(&self, owner_id: &str, name: &str, url: &str) -> Result<CustomSource>;
    async fn list(&self, owner_id: &str) -> Result<Vec<CustomSource>>;

    /// Descriptors of the owner's active sources, oldest first.
    async fn active_for_owner(&self, owner_id: &str) -> Result<Vec<SourceDescriptor>> {
        Ok(self
            .list(owner_id)
            .await?
            .into_iter()
            .filter(|s| s.active)
            .map(|s| s.descriptor())
            .collect())
    }
}

#[derive(sqlx::FromRow)]
struct CustomSourceRow {
    id: String,
    owner_id: String,
    name: String,
    url: String,
    kind: String,
    source_id: String,
    active: bool,
    created_at: i64,
}

impl From<CustomSourceRow> for CustomSource {
    fn from(row: CustomSourceRow) -> Self {
        Self {
            id: row.id,
            owner_id: row.owner_id,
            name: row.name,
            url: row.url,
            kind: if row.kind == "playlist" {
                SourceKind::Playlist
            } else {
                SourceKind::Channel
            },
            source_id: row.source_id,
            active: row.active,
            created_at: from_millis(row.created_at),
        }
    }
}

pub struct SqliteCustomSourceStore {
    pool: SqlitePool,
}

impl SqliteCustomSourceStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CustomSourceStore for SqliteCustomSourceStore {
    async fn add(&self, owner_id: &str, name: &str, url: &str) -> Result<CustomSource> {
        let descriptor = descriptor_from_url(name, url).ok_or_else(|| {
            TaskError::Invalid(format!("Not a YouTube playlist or channel URL: {url}"))
        })?;
        let kind = match descriptor.kind {
            SourceKind::Playlist => "playlist",
            _ => "channel",
        };

        let row = sqlx::query_as::<_, CustomSourceRow>(
            "INSERT INTO custom_sources (id, owner_id, name, url, kind, source_id, active, created_at)
             VALUES (?, ?, ?, ?, ?, ?, 1, ?)
             ON CONFLICT(owner_id, source_id) DO UPDATE SET name = excluded.name, url = excluded.url, active = 1
             RETURNING *",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(owner_id)
        .bind(&descriptor.name)
        .bind(descriptor.url.as_deref().unwrap_or(url))
        .bind(kind)
        .bind(&descriptor.id)
        .bind(Utc::now().timestamp_millis())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn list(&self, owner_id: &str) -> Result<Vec<CustomSource>> {
        let rows = sqlx::query_as::<_, CustomSourceRow>(
            "SELECT * FROM custom_sources WHERE owner_id = ? ORDER BY created_at, rowid",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(CustomSource::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[tokio::test]
    async fn adds_and_lists_sources_per_owner() {
        let store = SqliteCustomSourceStore::new(db::connect("sqlite::memory:").await.unwrap());
        let added = store
            .add("alice", "Deep cuts", "https://www.youtube.com/playlist?list=PL123")
            .await
            .unwrap();
        assert_eq!(added.kind, SourceKind::Playlist);
        assert_eq!(added.source_id, "PL123");

        store.add("alice", "", "@somelabel").await.unwrap();
        store
            .add("bob", "Other", "https://www.youtube.com/channel/UC1")
            .await
            .unwrap();

        let active = store.active_for_owner("alice").await.unwrap();
        assert_eq!(active.len(), 2);
        assert!(active.iter().all(|d| d.custom));
        assert_eq!(active[1].name, "@somelabel");
    }

    #[tokio::test]
    async fn rejects_unknown_urls() {
        let store = SqliteCustomSourceStore::new(db::connect("sqlite::memory:").await.unwrap());
        let err = store.add("alice", "x", "https://example.com/list").await;
        assert!(matches!(err, Err(TaskError::Invalid(_))));
    }

    #[tokio::test]
    async fn re_adding_keeps_one_row() {
        let store = SqliteCustomSourceStore::new(db::connect("sqlite::memory:").await.unwrap());
        let url = "https://www.youtube.com/playlist?list=PL9";
        store.add("alice", "First", url).await.unwrap();
        store.add("alice", "Renamed", url).await.unwrap();
        let all = store.list("alice").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Renamed");
    }
}
