pub mod spotify;
pub mod youtube;

use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::credentials::{CredentialStore, Credentials};
use crate::error::{DiggerError, Result};
use crate::http::handle_response;

pub use spotify::{SpotifyDestination, SpotifyDestinationBuilder, SpotifyFactory};
pub use youtube::{YouTubeDestination, YouTubeDestinationBuilder, YouTubeFactory};

/// How a token endpoint expects the client credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClientAuth {
    /// HTTP basic header (Spotify).
    Basic,
    /// `client_id`/`client_secret` form fields (Google).
    Form,
}

#[derive(Debug, Clone)]
pub(crate) struct OAuthClient {
    pub token_url: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub auth: ClientAuth,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// One owner's tokens for one destination. Refreshes before expiry and writes
/// the refreshed tokens back to the store before handing them out.
pub(crate) struct OAuthSession {
    destination: &'static str,
    owner_id: String,
    store: Arc<dyn CredentialStore>,
    oauth: OAuthClient,
    client: Client,
    credentials: Mutex<Option<Credentials>>,
}

impl OAuthSession {
    pub fn new(
        destination: &'static str,
        owner_id: &str,
        store: Arc<dyn CredentialStore>,
        oauth: OAuthClient,
        client: Client,
    ) -> Self {
        Self {
            destination,
            owner_id: owner_id.to_string(),
            store,
            oauth,
            client,
            credentials: Mutex::new(None),
        }
    }

    /// Use `credentials` when given (persisting them), otherwise load the
    /// stored ones.
    pub async fn adopt(&self, credentials: Option<Credentials>) -> Result<()> {
        let credentials = match credentials {
            Some(c) => {
                self.store.save(&self.owner_id, self.destination, &c).await?;
                Some(c)
            }
            None => self.store.load(&self.owner_id, self.destination).await?,
        };
        if credentials.is_none() {
            return Err(DiggerError::NotAuthenticated(self.destination.to_string()));
        }
        *self.credentials.lock().await = credentials;
        Ok(())
    }

    pub async fn access_token(&self) -> Result<String> {
        let mut guard = self.credentials.lock().await;
        let current = guard
            .as_ref()
            .ok_or_else(|| DiggerError::NotAuthenticated(self.destination.to_string()))?;
        if !current.is_expired() {
            return Ok(current.access_token.clone());
        }

        info!("{} token is expired, refreshing...", self.destination);
        let refreshed = match self.refresh(current).await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                warn!("{} token refresh failed: {}", self.destination, e);
                *guard = None;
                return Err(DiggerError::NotAuthenticated(self.destination.to_string()));
            }
        };
        self.store
            .save(&self.owner_id, self.destination, &refreshed)
            .await?;
        let token = refreshed.access_token.clone();
        *guard = Some(refreshed);
        Ok(token)
    }

    async fn refresh(&self, current: &Credentials) -> Result<Credentials> {
        let refresh_token = current
            .refresh_token
            .as_deref()
            .ok_or_else(|| DiggerError::Credentials("no refresh token stored".to_string()))?;
        let (Some(client_id), Some(client_secret)) =
            (self.oauth.client_id.as_deref(), self.oauth.client_secret.as_deref())
        else {
            return Err(DiggerError::NotConfigured("OAuth client credentials"));
        };

        debug!("Request: POST {}", self.oauth.token_url);
        let request = self.client.post(&self.oauth.token_url);
        let request = match self.oauth.auth {
            ClientAuth::Basic => request.basic_auth(client_id, Some(client_secret)).form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ]),
            ClientAuth::Form => request.form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", client_id),
                ("client_secret", client_secret),
            ]),
        };
        let response: TokenResponse = handle_response(request.send().await?).await?;
        Ok(current.refreshed(
            response.access_token,
            response.refresh_token,
            response.expires_in,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;
    use chrono::{Duration, Utc};
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn expired() -> Credentials {
        Credentials {
            access_token: "stale".into(),
            refresh_token: Some("refresh-1".into()),
            expires_at: Some(Utc::now() - Duration::seconds(5)),
        }
    }

    fn session(server: &MockServer, store: Arc<dyn CredentialStore>, auth: ClientAuth) -> OAuthSession {
        OAuthSession::new(
            "spotify",
            "owner",
            store,
            OAuthClient {
                token_url: format!("{}/api/token", server.uri()),
                client_id: Some("id".into()),
                client_secret: Some("secret".into()),
                auth,
            },
            Client::new(),
        )
    }

    #[tokio::test]
    async fn refreshes_and_persists_before_use() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .and(header_exists("authorization"))
            .and(body_string_contains("refresh_token=refresh-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "fresh",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::new());
        let session = session(&server, store.clone(), ClientAuth::Basic);
        session.adopt(Some(expired())).await.unwrap();

        assert_eq!(session.access_token().await.unwrap(), "fresh");
        // second call uses the cached token
        assert_eq!(session.access_token().await.unwrap(), "fresh");

        let saved = store.load("owner", "spotify").await.unwrap().unwrap();
        assert_eq!(saved.access_token, "fresh");
        assert_eq!(saved.refresh_token.as_deref(), Some("refresh-1"));
    }

    #[tokio::test]
    async fn failed_refresh_is_not_authenticated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let store: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::new());
        let session = session(&server, store, ClientAuth::Form);
        session.adopt(Some(expired())).await.unwrap();
        assert!(matches!(
            session.access_token().await,
            Err(DiggerError::NotAuthenticated(_))
        ));
    }

    #[tokio::test]
    async fn adopt_without_stored_credentials_fails() {
        let server = MockServer::start().await;
        let store: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::new());
        let session = session(&server, store, ClientAuth::Basic);
        assert!(session.adopt(None).await.is_err());
    }
}
