use async_trait::async_trait;
use itertools::Itertools;
use reqwest::{Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use shared::{MatchResult, Track};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{ClientAuth, OAuthClient, OAuthSession};
use crate::credentials::{CredentialStore, Credentials};
use crate::error::{DiggerError, Result};
use crate::http::{error_from_response, handle_response, with_retry, RetryPolicy};
use crate::matching;
use crate::parsing::split_remix;
use crate::traits::{CreatedPlaylist, DestinationFactory, PlaylistDestination};

const DEFAULT_API_BASE: &str = "https://api.spotify.com/v1";
const DEFAULT_ACCOUNTS_BASE: &str = "https://accounts.spotify.com";
const MAX_BATCH: usize = 100;
const SEARCH_LIMIT: &str = "10";
const DEFAULT_THRESHOLD: f64 = 0.7;

#[derive(Debug, Deserialize)]
struct Profile {
    id: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: Paging,
}

#[derive(Debug, Default, Deserialize)]
struct Paging {
    #[serde(default)]
    items: Vec<SpotifyTrack>,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Artist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrack {
    id: String,
    name: String,
    #[serde(default)]
    artists: Vec<Artist>,
    #[serde(default)]
    external_urls: ExternalUrls,
}

impl SpotifyTrack {
    fn artist_credit(&self) -> String {
        self.artists.iter().map(|a| a.name.as_str()).join(", ")
    }

    fn url(&self) -> String {
        self.external_urls
            .spotify
            .clone()
            .unwrap_or_else(|| format!("https://open.spotify.com/track/{}", self.id))
    }
}

#[derive(Debug, Serialize)]
struct NewPlaylist<'a> {
    name: &'a str,
    description: &'a str,
    public: bool,
}

#[derive(Debug, Deserialize)]
struct PlaylistCreated {
    id: String,
    #[serde(default)]
    external_urls: ExternalUrls,
}

/// Spotify Web API playlists.
pub struct SpotifyDestination {
    api_base: String,
    client: Client,
    retry: RetryPolicy,
    threshold: f64,
    session: OAuthSession,
    user_id: Mutex<Option<String>>,
}

pub struct SpotifyDestinationBuilder {
    owner_id: String,
    store: Arc<dyn CredentialStore>,
    api_base: Option<String>,
    accounts_base: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    retry: Option<RetryPolicy>,
    threshold: Option<f64>,
}

impl SpotifyDestinationBuilder {
    pub fn new(owner_id: &str, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            store,
            api_base: None,
            accounts_base: None,
            client_id: None,
            client_secret: None,
            retry: None,
            threshold: None,
        }
    }

    pub fn api_base(mut self, url: &str) -> Self {
        self.api_base = Some(url.trim_end_matches('/').to_string());
        self
    }

    pub fn accounts_base(mut self, url: &str) -> Self {
        self.accounts_base = Some(url.trim_end_matches('/').to_string());
        self
    }

    pub fn client_credentials(mut self, client_id: Option<String>, client_secret: Option<String>) -> Self {
        self.client_id = client_id;
        self.client_secret = client_secret;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn build(self) -> SpotifyDestination {
        let client = Client::new();
        let accounts = self
            .accounts_base
            .unwrap_or_else(|| DEFAULT_ACCOUNTS_BASE.to_string());
        SpotifyDestination {
            api_base: self.api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            client: client.clone(),
            retry: self.retry.unwrap_or_default(),
            threshold: self.threshold.unwrap_or(DEFAULT_THRESHOLD),
            session: OAuthSession::new(
                "spotify",
                &self.owner_id,
                self.store,
                OAuthClient {
                    token_url: format!("{accounts}/api/token"),
                    client_id: self.client_id,
                    client_secret: self.client_secret,
                    auth: ClientAuth::Basic,
                },
                client,
            ),
            user_id: Mutex::new(None),
        }
    }
}

/// Search queries from most to least specific.
fn query_variants(track: &Track) -> Vec<String> {
    let (base_title, _) = split_remix(&track.title);
    let primary_artist = track
        .artist
        .split([',', '&'])
        .next()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .unwrap_or(&track.artist);

    let first = match &track.remix {
        Some(remix) => format!("track:{} artist:{} {}", track.title, track.artist, remix),
        None => format!("track:{} artist:{}", track.title, track.artist),
    };
    [
        first,
        format!("track:\"{base_title}\" artist:\"{primary_artist}\""),
        format!("\"{base_title}\" {primary_artist}"),
    ]
    .into_iter()
    .unique()
    .collect()
}

impl SpotifyDestination {
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(&str, &str)],
        body: Option<serde_json::Value>,
        policy: &RetryPolicy,
    ) -> Result<T> {
        let token = self.session.access_token().await?;
        let url = format!("{}/{}", self.api_base, endpoint.trim_start_matches('/'));
        let (url, token, body, client) = (url.as_str(), token.as_str(), body.as_ref(), &self.client);
        with_retry(&format!("Spotify {method} {endpoint}"), policy, move || {
            let method = method.clone();
            async move {
                debug!("Request: {} {}", method, url);
                let mut request = client.request(method, url).bearer_auth(token).query(query);
                if let Some(body) = body {
                    request = request.json(body);
                }
                let response = request.send().await?;
                if response.status() == StatusCode::UNAUTHORIZED {
                    return Err(DiggerError::NotAuthenticated("spotify".to_string()));
                }
                if !response.status().is_success() {
                    return Err(error_from_response(response).await);
                }
                handle_response(response).await
            }
        })
        .await
    }

    async fn user_id(&self) -> Result<String> {
        let mut cached = self.user_id.lock().await;
        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }
        let profile: Profile = self
            .request(Method::GET, "me", &[], None, &self.retry)
            .await?;
        *cached = Some(profile.id.clone());
        Ok(profile.id)
    }

    async fn search(&self, query: &str) -> Result<Vec<SpotifyTrack>> {
        let response: SearchResponse = self
            .request(
                Method::GET,
                "search",
                &[("q", query), ("type", "track"), ("limit", SEARCH_LIMIT)],
                None,
                &self.retry,
            )
            .await?;
        Ok(response.tracks.items)
    }
}

#[async_trait]
impl PlaylistDestination for SpotifyDestination {
    fn id(&self) -> &'static str {
        "spotify"
    }

    fn name(&self) -> &'static str {
        "Spotify"
    }

    fn max_batch_size(&self) -> usize {
        MAX_BATCH
    }

    async fn authenticate(&self, credentials: Option<Credentials>) -> bool {
        if let Err(e) = self.session.adopt(credentials).await {
            warn!("Spotify authentication failed: {}", e);
            return false;
        }
        *self.user_id.lock().await = None;
        match self.user_id().await {
            Ok(id) => {
                info!("Authenticated with Spotify as {}", id);
                true
            }
            Err(e) => {
                warn!("Spotify authentication failed: {}", e);
                false
            }
        }
    }

    async fn search_track(&self, track: &Track) -> Result<MatchResult> {
        let mut best: Option<(SpotifyTrack, f64)> = None;
        let mut last_error = None;

        for query in query_variants(track) {
            let items = match self.search(&query).await {
                Ok(items) => items,
                Err(e @ DiggerError::NotAuthenticated(_)) => return Err(e),
                Err(e) => {
                    debug!("Spotify search '{}' failed: {}", query, e);
                    last_error = Some(e);
                    continue;
                }
            };
            for item in items {
                let score = matching::score(track, &item.name, &item.artist_credit());
                if best.as_ref().is_none_or(|(_, s)| score > *s) {
                    best = Some((item, score));
                }
            }
            if best.as_ref().is_some_and(|(_, s)| *s >= self.threshold) {
                break;
            }
        }

        match best {
            Some((item, score)) => Ok(MatchResult::candidate(
                track.clone(),
                item.id.clone(),
                item.url(),
                item.name.clone(),
                item.artist_credit(),
                score,
            )
            .accept_if(self.threshold)),
            None => match last_error {
                Some(e) => Err(e),
                None => Ok(MatchResult::unmatched(
                    track.clone(),
                    "No matching tracks found on Spotify",
                )),
            },
        }
    }

    async fn create_empty_playlist(
        &self,
        name: &str,
        description: &str,
        public: bool,
    ) -> Result<CreatedPlaylist> {
        let user_id = self.user_id().await?;
        let body = serde_json::to_value(NewPlaylist {
            name,
            description,
            public,
        })?;
        let created: PlaylistCreated = self
            .request(
                Method::POST,
                &format!("users/{user_id}/playlists"),
                &[],
                Some(body),
                &RetryPolicy::no_retry(),
            )
            .await?;
        let url = created
            .external_urls
            .spotify
            .unwrap_or_else(|| format!("https://open.spotify.com/playlist/{}", created.id));
        Ok(CreatedPlaylist {
            id: created.id,
            url,
        })
    }

    async fn add_tracks(&self, playlist_id: &str, match_ids: &[String]) -> Result<usize> {
        let uris: Vec<String> = match_ids
            .iter()
            .map(|id| format!("spotify:track:{id}"))
            .collect();
        let _: serde_json::Value = self
            .request(
                Method::POST,
                &format!("playlists/{playlist_id}/tracks"),
                &[],
                Some(json!({ "uris": uris })),
                &RetryPolicy::no_retry(),
            )
            .await?;
        Ok(match_ids.len())
    }
}

/// Builds a [`SpotifyDestination`] per owner.
pub struct SpotifyFactory {
    client_id: Option<String>,
    client_secret: Option<String>,
    api_base: Option<String>,
    accounts_base: Option<String>,
}

impl SpotifyFactory {
    pub fn new(client_id: Option<String>, client_secret: Option<String>) -> Self {
        Self {
            client_id,
            client_secret,
            api_base: None,
            accounts_base: None,
        }
    }

    pub fn with_bases(mut self, api_base: &str, accounts_base: &str) -> Self {
        self.api_base = Some(api_base.to_string());
        self.accounts_base = Some(accounts_base.to_string());
        self
    }
}

impl DestinationFactory for SpotifyFactory {
    fn id(&self) -> &'static str {
        "spotify"
    }

    fn name(&self) -> &'static str {
        "Spotify"
    }

    fn for_owner(
        &self,
        owner_id: &str,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Arc<dyn PlaylistDestination>> {
        let mut builder = SpotifyDestinationBuilder::new(owner_id, store)
            .client_credentials(self.client_id.clone(), self.client_secret.clone());
        if let Some(api) = &self.api_base {
            builder = builder.api_base(api);
        }
        if let Some(accounts) = &self.accounts_base {
            builder = builder.accounts_base(accounts);
        }
        Ok(Arc::new(builder.build()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn hit(id: &str, name: &str, artists: &[&str]) -> serde_json::Value {
        json!({
            "id": id,
            "name": name,
            "artists": artists.iter().map(|a| json!({ "name": a })).collect::<Vec<_>>(),
            "external_urls": { "spotify": format!("https://open.spotify.com/track/{id}") }
        })
    }

    async fn destination(server: &MockServer) -> SpotifyDestination {
        Mock::given(method("GET"))
            .and(path("/me"))
            .and(header("authorization", "Bearer token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "dj" })))
            .mount(server)
            .await;
        let dest = SpotifyDestinationBuilder::new("owner", Arc::new(MemoryCredentialStore::new()))
            .api_base(&server.uri())
            .accounts_base(&server.uri())
            .retry(RetryPolicy::no_retry())
            .build();
        assert!(dest.authenticate(Some(Credentials::new("token"))).await);
        dest
    }

    #[test]
    fn variants_go_from_specific_to_loose() {
        let track = Track::new("Rain", "Kerri Chandler, Dixon", "Traxsource", "u")
            .with_remix(Some("Dixon Edit".into()));
        let variants = query_variants(&track);
        assert_eq!(variants[0], "track:Rain artist:Kerri Chandler, Dixon Dixon Edit");
        assert_eq!(variants[1], "track:\"Rain\" artist:\"Kerri Chandler\"");
        assert_eq!(variants[2], "\"Rain\" Kerri Chandler");
    }

    #[tokio::test]
    async fn rejects_bad_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        let dest = SpotifyDestinationBuilder::new("owner", Arc::new(MemoryCredentialStore::new()))
            .api_base(&server.uri())
            .build();
        assert!(!dest.authenticate(Some(Credentials::new("bad"))).await);
        assert!(!dest.authenticate(None).await);
    }

    #[tokio::test]
    async fn search_picks_best_scoring_hit() {
        let server = MockServer::start().await;
        let dest = destination(&server).await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("type", "track"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tracks": { "items": [
                    hit("x1", "Deep Blue Sea Shanty", &["Someone"]),
                    hit("x2", "Deep Blue - Extended Mix", &["Nova"]),
                ]}
            })))
            .mount(&server)
            .await;

        let track = Track::new("Deep Blue", "Nova", "Beatport", "u");
        let result = dest.search_track(&track).await.unwrap();
        assert!(result.matched);
        assert_eq!(result.match_id, "x2");
        assert_eq!(result.match_artist, "Nova");
        assert!(result.score >= 0.9);
    }

    #[tokio::test]
    async fn empty_search_is_unmatched() {
        let server = MockServer::start().await;
        let dest = destination(&server).await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "tracks": { "items": [] } })))
            .mount(&server)
            .await;
        let result = dest
            .search_track(&Track::new("Nothing", "Nobody", "Juno", "u"))
            .await
            .unwrap();
        assert!(!result.matched);
        assert!(!result.has_candidate());
    }

    #[tokio::test]
    async fn creates_playlist_and_adds_uris() {
        let server = MockServer::start().await;
        let dest = destination(&server).await;
        Mock::given(method("POST"))
            .and(path("/users/dj/playlists"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "pl9",
                "external_urls": { "spotify": "https://open.spotify.com/playlist/pl9" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/playlists/pl9/tracks"))
            .and(body_json(json!({ "uris": ["spotify:track:a", "spotify:track:b"] })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "snapshot_id": "s" })))
            .expect(1)
            .mount(&server)
            .await;

        let created = dest.create_empty_playlist("Weekly", "", false).await.unwrap();
        assert_eq!(created.id, "pl9");
        let added = dest
            .add_tracks(&created.id, &["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(added, 2);
    }
}
