use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use tokio::sync::{Mutex, RwLock};

use crate::error::{DiggerError, Result};

/// Refresh this long before the provider's stated expiry.
const EXPIRY_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
        }
    }

    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(at) => at - Duration::seconds(EXPIRY_SKEW_SECS) <= Utc::now(),
            None => false,
        }
    }

    /// Merge a token endpoint response. Providers that do not rotate refresh
    /// tokens omit it, in which case the previous one is kept.
    pub fn refreshed(&self, access_token: String, refresh_token: Option<String>, expires_in: Option<i64>) -> Self {
        Self {
            access_token,
            refresh_token: refresh_token.or_else(|| self.refresh_token.clone()),
            expires_at: expires_in.map(|secs| Utc::now() + Duration::seconds(secs)),
        }
    }
}

/// Where destination tokens live between runs.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self, owner_id: &str, destination: &str) -> Result<Option<Credentials>>;
    async fn save(&self, owner_id: &str, destination: &str, credentials: &Credentials) -> Result<()>;
}

fn key(owner_id: &str, destination: &str) -> String {
    format!("{owner_id}/{destination}")
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    entries: RwLock<HashMap<String, Credentials>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self, owner_id: &str, destination: &str) -> Result<Option<Credentials>> {
        Ok(self.entries.read().await.get(&key(owner_id, destination)).cloned())
    }

    async fn save(&self, owner_id: &str, destination: &str, credentials: &Credentials) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key(owner_id, destination), credentials.clone());
        Ok(())
    }
}

/// JSON file keyed by `owner/destination`, used by the command line tool.
pub struct JsonFileCredentialStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn read_all(&self) -> Result<BTreeMap<String, Credentials>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) if text.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| DiggerError::Credentials(format!("{}: {e}", self.path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl CredentialStore for JsonFileCredentialStore {
    async fn load(&self, owner_id: &str, destination: &str) -> Result<Option<Credentials>> {
        Ok(self.read_all().await?.remove(&key(owner_id, destination)))
    }

    async fn save(&self, owner_id: &str, destination: &str, credentials: &Credentials) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut all = self.read_all().await?;
        all.insert(key(owner_id, destination), credentials.clone());
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.path, serde_json::to_string_pretty(&all)?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_uses_skew() {
        let mut creds = Credentials::new("t");
        assert!(!creds.is_expired());
        creds.expires_at = Some(Utc::now() + Duration::seconds(30));
        assert!(creds.is_expired());
        creds.expires_at = Some(Utc::now() + Duration::seconds(3600));
        assert!(!creds.is_expired());
    }

    #[test]
    fn refresh_keeps_old_refresh_token() {
        let creds = Credentials {
            access_token: "old".into(),
            refresh_token: Some("r1".into()),
            expires_at: None,
        };
        let next = creds.refreshed("new".into(), None, Some(3600));
        assert_eq!(next.access_token, "new");
        assert_eq!(next.refresh_token.as_deref(), Some("r1"));
        assert!(!next.is_expired());
    }

    #[tokio::test]
    async fn json_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("auth.json");

        let store = JsonFileCredentialStore::new(&path);
        assert!(store.load("me", "spotify").await.unwrap().is_none());
        store
            .save("me", "spotify", &Credentials::new("abc"))
            .await
            .unwrap();
        store
            .save("me", "youtube", &Credentials::new("def"))
            .await
            .unwrap();

        let reopened = JsonFileCredentialStore::new(&path);
        let loaded = reopened.load("me", "spotify").await.unwrap().unwrap();
        assert_eq!(loaded.access_token, "abc");
        assert!(reopened.load("me", "youtube").await.unwrap().is_some());
    }
}
