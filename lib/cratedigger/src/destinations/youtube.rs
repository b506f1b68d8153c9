use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use shared::{track::UNKNOWN_ARTIST, MatchResult, Track};
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

use super::{ClientAuth, OAuthClient, OAuthSession};
use crate::credentials::{CredentialStore, Credentials};
use crate::error::{DiggerError, Result};
use crate::http::{error_from_response, handle_response, with_retry, RetryPolicy};
use crate::matching;
use crate::parsing::parse_title;
use crate::traits::{CreatedPlaylist, DestinationFactory, PlaylistDestination};

const DEFAULT_API_BASE: &str = "https://www.googleapis.com/youtube/v3";
const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const MAX_BATCH: usize = 50;
const DEFAULT_THRESHOLD: f64 = 0.5;

static RE_VIDEO_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:youtube\.com/watch\?(?:.*&)?v=|youtu\.be/|youtube\.com/shorts/)([\w-]{11})").unwrap()
});

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ChannelItem {
    snippet: ChannelSnippet,
}

#[derive(Debug, Deserialize)]
struct ChannelSnippet {
    title: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct VideoSnippet {
    title: String,
    channel_title: String,
}

#[derive(Debug, Deserialize)]
struct Video {
    id: String,
    #[serde(default)]
    snippet: VideoSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    id: SearchId,
    #[serde(default)]
    snippet: VideoSnippet,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

/// Video id of a YouTube watch, short link or shorts URL.
pub fn video_id_from_url(url: &str) -> Option<&str> {
    RE_VIDEO_ID.captures(url)?.get(1).map(|m| m.as_str())
}

/// Score an upload both as-is (title vs channel) and split into artist and
/// title, keeping the better of the two.
fn score_upload(track: &Track, video_title: &str, channel: &str) -> f64 {
    let raw = matching::score(track, video_title, channel);
    let parsed = parse_title(video_title);
    let artist = if parsed.artist == UNKNOWN_ARTIST {
        channel
    } else {
        parsed.artist.as_str()
    };
    let title = match &parsed.remix {
        Some(remix) => format!("{} ({})", parsed.title, remix),
        None => parsed.title.clone(),
    };
    raw.max(matching::score(track, &title, artist))
}

fn search_query(track: &Track) -> String {
    match &track.remix {
        Some(remix) => format!("{} - {} {}", track.artist, track.title, remix),
        None => format!("{} - {}", track.artist, track.title),
    }
}

/// YouTube Data API playlists.
pub struct YouTubeDestination {
    api_base: String,
    client: Client,
    retry: RetryPolicy,
    threshold: f64,
    session: OAuthSession,
}

pub struct YouTubeDestinationBuilder {
    owner_id: String,
    store: Arc<dyn CredentialStore>,
    api_base: Option<String>,
    token_url: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    retry: Option<RetryPolicy>,
    threshold: Option<f64>,
}

impl YouTubeDestinationBuilder {
    pub fn new(owner_id: &str, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            store,
            api_base: None,
            token_url: None,
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

    pub fn token_url(mut self, url: &str) -> Self {
        self.token_url = Some(url.to_string());
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

    pub fn build(self) -> YouTubeDestination {
        let client = Client::new();
        YouTubeDestination {
            api_base: self.api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            client: client.clone(),
            retry: self.retry.unwrap_or_default(),
            threshold: self.threshold.unwrap_or(DEFAULT_THRESHOLD),
            session: OAuthSession::new(
                "youtube",
                &self.owner_id,
                self.store,
                OAuthClient {
                    token_url: self.token_url.unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
                    client_id: self.client_id,
                    client_secret: self.client_secret,
                    auth: ClientAuth::Form,
                },
                client,
            ),
        }
    }
}

impl YouTubeDestination {
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(&str, &str)],
        body: Option<serde_json::Value>,
        policy: &RetryPolicy,
    ) -> Result<T> {
        let token = self.session.access_token().await?;
        let url = format!("{}/{}", self.api_base, endpoint);
        let (url, token, body, client) = (url.as_str(), token.as_str(), body.as_ref(), &self.client);
        with_retry(&format!("YouTube {method} {endpoint}"), policy, move || {
            let method = method.clone();
            async move {
                debug!("Request: {} {}", method, url);
                let mut request = client.request(method, url).bearer_auth(token).query(query);
                if let Some(body) = body {
                    request = request.json(body);
                }
                let response = request.send().await?;
                if response.status() == StatusCode::UNAUTHORIZED {
                    return Err(DiggerError::NotAuthenticated("youtube".to_string()));
                }
                if !response.status().is_success() {
                    return Err(error_from_response(response).await);
                }
                handle_response(response).await
            }
        })
        .await
    }

    async fn direct_match(&self, track: &Track, video_id: &str) -> Result<Option<MatchResult>> {
        let page: Page<Video> = self
            .request(
                Method::GET,
                "videos",
                &[("part", "snippet"), ("id", video_id)],
                None,
                &self.retry,
            )
            .await?;
        Ok(page.items.into_iter().next().map(|video| {
            let mut result = MatchResult::candidate(
                track.clone(),
                video.id.clone(),
                format!("https://www.youtube.com/watch?v={}", video.id),
                video.snippet.title,
                video.snippet.channel_title,
                1.0,
            )
            .accept_if(self.threshold);
            result.message = "Direct YouTube URL match".to_string();
            result
        }))
    }
}

#[async_trait]
impl PlaylistDestination for YouTubeDestination {
    fn id(&self) -> &'static str {
        "youtube"
    }

    fn name(&self) -> &'static str {
        "YouTube"
    }

    fn max_batch_size(&self) -> usize {
        MAX_BATCH
    }

    async fn authenticate(&self, credentials: Option<Credentials>) -> bool {
        if let Err(e) = self.session.adopt(credentials).await {
            warn!("YouTube authentication failed: {}", e);
            return false;
        }
        let page: Result<Page<ChannelItem>> = self
            .request(
                Method::GET,
                "channels",
                &[("part", "snippet"), ("mine", "true")],
                None,
                &self.retry,
            )
            .await;
        match page {
            Ok(page) => match page.items.first() {
                Some(channel) => {
                    info!("Authenticated as YouTube channel: {}", channel.snippet.title);
                    true
                }
                None => {
                    warn!("Failed to get channel information");
                    false
                }
            },
            Err(e) => {
                warn!("YouTube authentication failed: {}", e);
                false
            }
        }
    }

    async fn search_track(&self, track: &Track) -> Result<MatchResult> {
        if let Some(video_id) = video_id_from_url(&track.source_url) {
            match self.direct_match(track, video_id).await {
                Ok(Some(result)) => return Ok(result),
                Ok(None) => debug!("Video {} no longer available, searching", video_id),
                Err(e @ DiggerError::NotAuthenticated(_)) => return Err(e),
                Err(e) => warn!("Error getting video details for {}: {}", video_id, e),
            }
        }

        let query = search_query(track);
        let page: Page<SearchResult> = self
            .request(
                Method::GET,
                "search",
                &[
                    ("part", "snippet"),
                    ("q", query.as_str()),
                    ("type", "video"),
                    ("maxResults", "5"),
                ],
                None,
                &self.retry,
            )
            .await?;

        let best = page
            .items
            .into_iter()
            .filter_map(|hit| {
                let video_id = hit.id.video_id?;
                let score = score_upload(track, &hit.snippet.title, &hit.snippet.channel_title);
                Some((video_id, hit.snippet, score))
            })
            .max_by(|a, b| a.2.total_cmp(&b.2));

        Ok(match best {
            Some((video_id, snippet, score)) => MatchResult::candidate(
                track.clone(),
                video_id.clone(),
                format!("https://www.youtube.com/watch?v={video_id}"),
                snippet.title,
                snippet.channel_title,
                score,
            )
            .accept_if(self.threshold),
            None => MatchResult::unmatched(track.clone(), "No videos found on YouTube"),
        })
    }

    async fn create_empty_playlist(
        &self,
        name: &str,
        description: &str,
        public: bool,
    ) -> Result<CreatedPlaylist> {
        let body = json!({
            "snippet": { "title": name, "description": description },
            "status": { "privacyStatus": if public { "public" } else { "private" } }
        });
        let created: Created = self
            .request(
                Method::POST,
                "playlists",
                &[("part", "snippet,status")],
                Some(body),
                &RetryPolicy::no_retry(),
            )
            .await?;
        info!("Created YouTube playlist: {} ({})", name, created.id);
        Ok(CreatedPlaylist {
            url: format!("https://www.youtube.com/playlist?list={}", created.id),
            id: created.id,
        })
    }

    async fn add_tracks(&self, playlist_id: &str, match_ids: &[String]) -> Result<usize> {
        let mut added = 0;
        for video_id in match_ids {
            let body = json!({
                "snippet": {
                    "playlistId": playlist_id,
                    "resourceId": { "kind": "youtube#video", "videoId": video_id }
                }
            });
            let inserted: Result<serde_json::Value> = self
                .request(
                    Method::POST,
                    "playlistItems",
                    &[("part", "snippet")],
                    Some(body),
                    &RetryPolicy::no_retry(),
                )
                .await;
            match inserted {
                Ok(_) => added += 1,
                Err(e) if added == 0 => return Err(e),
                Err(e) => {
                    warn!("Error adding video {} to playlist: {}", video_id, e);
                    return Err(DiggerError::PartialBatch {
                        added,
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(added)
    }
}

/// Builds a [`YouTubeDestination`] per owner.
pub struct YouTubeFactory {
    client_id: Option<String>,
    client_secret: Option<String>,
    api_base: Option<String>,
    token_url: Option<String>,
}

impl YouTubeFactory {
    pub fn new(client_id: Option<String>, client_secret: Option<String>) -> Self {
        Self {
            client_id,
            client_secret,
            api_base: None,
            token_url: None,
        }
    }

    pub fn with_endpoints(mut self, api_base: &str, token_url: &str) -> Self {
        self.api_base = Some(api_base.to_string());
        self.token_url = Some(token_url.to_string());
        self
    }
}

impl DestinationFactory for YouTubeFactory {
    fn id(&self) -> &'static str {
        "youtube"
    }

    fn name(&self) -> &'static str {
        "YouTube"
    }

    fn for_owner(
        &self,
        owner_id: &str,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Arc<dyn PlaylistDestination>> {
        let mut builder = YouTubeDestinationBuilder::new(owner_id, store)
            .client_credentials(self.client_id.clone(), self.client_secret.clone());
        if let Some(api) = &self.api_base {
            builder = builder.api_base(api);
        }
        if let Some(token_url) = &self.token_url {
            builder = builder.token_url(token_url);
        }
        Ok(Arc::new(builder.build()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn destination(server: &MockServer) -> YouTubeDestination {
        Mock::given(method("GET"))
            .and(path("/channels"))
            .and(query_param("mine", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{ "snippet": { "title": "My Channel" } }]
            })))
            .mount(server)
            .await;
        let dest = YouTubeDestinationBuilder::new("owner", Arc::new(MemoryCredentialStore::new()))
            .api_base(&server.uri())
            .retry(RetryPolicy::no_retry())
            .build();
        assert!(dest.authenticate(Some(Credentials::new("token"))).await);
        dest
    }

    #[test]
    fn extracts_video_ids() {
        assert_eq!(
            video_id_from_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ&list=x"),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(video_id_from_url("https://youtu.be/dQw4w9WgXcQ"), Some("dQw4w9WgXcQ"));
        assert_eq!(video_id_from_url("https://www.beatport.com/track/1"), None);
    }

    #[test]
    fn uploads_score_on_parsed_split() {
        let track = Track::new("Deep Blue", "Nova", "Beatport", "u");
        let score = score_upload(&track, "Nova - Deep Blue (Official Video)", "Label");
        assert!(score >= 0.9, "score was {score}");
    }

    #[tokio::test]
    async fn youtube_sourced_tracks_match_directly() {
        let server = MockServer::start().await;
        let dest = destination(&server).await;
        Mock::given(method("GET"))
            .and(path("/videos"))
            .and(query_param("id", "abcdefghijk"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{ "id": "abcdefghijk", "snippet": { "title": "Nova - Deep Blue", "channelTitle": "Label" } }]
            })))
            .mount(&server)
            .await;

        let track = Track::new(
            "Deep Blue",
            "Nova",
            "YouTube",
            "https://www.youtube.com/watch?v=abcdefghijk",
        );
        let result = dest.search_track(&track).await.unwrap();
        assert!(result.matched);
        assert_eq!(result.score, 1.0);
        assert_eq!(result.message, "Direct YouTube URL match");
    }

    #[tokio::test]
    async fn search_falls_back_to_best_video() {
        let server = MockServer::start().await;
        let dest = destination(&server).await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("type", "video"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    { "id": { "videoId": "v1" }, "snippet": { "title": "Something Else", "channelTitle": "X" } },
                    { "id": { "videoId": "v2" }, "snippet": { "title": "Kerri Chandler - Rain", "channelTitle": "Kaoz" } },
                    { "id": { "channelId": "c1" }, "snippet": { "title": "Kerri Chandler", "channelTitle": "Kerri Chandler" } }
                ]
            })))
            .mount(&server)
            .await;

        let track = Track::new("Rain", "Kerri Chandler", "Traxsource", "https://t/1");
        let result = dest.search_track(&track).await.unwrap();
        assert!(result.matched);
        assert_eq!(result.match_id, "v2");
    }

    #[tokio::test]
    async fn insert_failure_mid_batch_reports_partial() {
        let server = MockServer::start().await;
        let dest = destination(&server).await;
        Mock::given(method("POST"))
            .and(path("/playlistItems"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "item" })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/playlistItems"))
            .respond_with(ResponseTemplate::new(403).set_body_string("quotaExceeded"))
            .mount(&server)
            .await;

        let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        match dest.add_tracks("pl", &ids).await {
            Err(DiggerError::PartialBatch { added, .. }) => assert_eq!(added, 1),
            other => panic!("unexpected {other:?}"),
        }
    }
}
