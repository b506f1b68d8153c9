use async_trait::async_trait;
use cratedigger::{CredentialStore, Credentials, DiggerError};
use sqlx::SqlitePool;

use super::from_millis;

#[derive(sqlx::FromRow)]
struct CredentialRow {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
}

/// Destination tokens per owner, in the `credentials` table.
pub struct SqliteCredentialStore {
    pool: SqlitePool,
}

impl SqliteCredentialStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn store_error(e: sqlx::Error) -> DiggerError {
    DiggerError::Credentials(e.to_string())
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn load(&self, owner_id: &str, destination: &str) -> cratedigger::Result<Option<Credentials>> {
        let row = sqlx::query_as::<_, CredentialRow>(
            "SELECT access_token, refresh_token, expires_at FROM credentials WHERE owner_id = ? AND destination = ?",
        )
        .bind(owner_id)
        .bind(destination)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(row.map(|row| Credentials {
            access_token: row.access_token,
            refresh_token: row.refresh_token,
            expires_at: row.expires_at.map(from_millis),
        }))
    }

    async fn save(&self, owner_id: &str, destination: &str, credentials: &Credentials) -> cratedigger::Result<()> {
        sqlx::query(
            "INSERT INTO credentials (owner_id, destination, access_token, refresh_token, expires_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(owner_id, destination) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at",
        )
        .bind(owner_id)
        .bind(destination)
        .bind(&credentials.access_token)
        .bind(&credentials.refresh_token)
        .bind(credentials.expires_at.map(|at| at.timestamp_millis()))
        .execute(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn upserts_per_owner_and_destination() {
        let store = SqliteCredentialStore::new(db::connect("sqlite::memory:").await.unwrap());
        assert!(store.load("alice", "spotify").await.unwrap().is_none());

        store
            .save("alice", "spotify", &Credentials::new("first"))
            .await
            .unwrap();
        let refreshed = Credentials {
            access_token: "second".into(),
            refresh_token: Some("r".into()),
            expires_at: Some(Utc::now() + Duration::hours(1)),
        };
        store.save("alice", "spotify", &refreshed).await.unwrap();

        let loaded = store.load("alice", "spotify").await.unwrap().unwrap();
        assert_eq!(loaded.access_token, "second");
        assert_eq!(loaded.refresh_token.as_deref(), Some("r"));
        assert!(!loaded.is_expired());
        assert!(store.load("alice", "youtube").await.unwrap().is_none());
    }
}
