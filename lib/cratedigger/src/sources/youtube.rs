use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use regex::Regex;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize};
use shared::task::{SourceDescriptor, SourceKind};
use shared::Track;
use std::sync::LazyLock;
use tracing::{debug, info, warn};
use url::Url;

use super::{cutoff, resolve_genre};
use crate::error::{DiggerError, Result};
use crate::http::{browser_client, fetch_text, handle_response, with_retry, RetryPolicy};
use crate::parsing::{is_excluded_upload, parse_title};
use crate::MusicSource;

const DEFAULT_API_BASE: &str = "https://www.googleapis.com/youtube/v3";
const DEFAULT_WEB_BASE: &str = "https://www.youtube.com";

/// 4 pages of 50 items per playlist.
const MAX_PAGES: usize = 4;
const PAGE_SIZE: &str = "50";
const MIN_PER_CHANNEL: usize = 10;

const SELECTED_BASE: (&str, &str) = ("PLSr_oFUba1jtP9x5ZFs5Y0GJkb8fmC161", "Selected Base");
const DEFECTED: (&str, &str) = ("PLoRGBexfBL8dbhIs6-GqWapmosx-0gqa7", "Defected Music");
const GLITTERBOX: (&str, &str) = ("PLIxQjHO1yTm99RG32st06TnxZHMgCbT4H", "Glitterbox Ibiza");
const ANJUNADEEP: (&str, &str) = ("PLp0LvzekmDePVdSozfdcux2Lm-zw25Iie", "Anjunadeep");
const TOOLROOM: (&str, &str) = ("PLGdqhGdToks3HVLQqYbkp1pkyyuZUkJ8U", "Toolroom Records");
const TOOLROOM_2: (&str, &str) = ("PLGdqhGdToks1CslquLlNQ4mofBwqnyrjW", "Toolroom Records");
const SPINNIN: (&str, &str) = ("PL53244BC75ACF40D0", "Spinnin' Records");
const STAY_TRUE: (&str, &str) = ("PLOH68idrufmjnBkoJLchYzyRN_uFcH628", "Stay True Sounds");

const GENRE_PLAYLISTS: &[(&str, &[(&str, &str)])] = &[
    ("selected-base", &[SELECTED_BASE]),
    ("defected-music", &[DEFECTED]),
    ("glitterbox-ibiza", &[GLITTERBOX]),
    ("anjunadeep", &[ANJUNADEEP]),
    ("toolroom-records", &[TOOLROOM, TOOLROOM_2]),
    ("spinnin-records", &[SPINNIN]),
    ("stay-true-sounds", &[STAY_TRUE]),
    (
        "all",
        &[SELECTED_BASE, GLITTERBOX, DEFECTED, ANJUNADEEP, TOOLROOM, SPINNIN, STAY_TRUE],
    ),
];

static RE_SCRAPED_VIDEO_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""videoId":"([\w-]{11})""#).unwrap());
static RE_SCRAPED_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""title":\{(?:"runs":\[\{"text":|"simpleText":)"((?:[^"\\]|\\.)*)""#).unwrap()
});

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ItemSnippet {
    title: String,
    channel_title: String,
    published_at: Option<DateTime<Utc>>,
    video_owner_channel_title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ItemContent {
    video_id: Option<String>,
    video_published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItem {
    #[serde(default)]
    snippet: ItemSnippet,
    #[serde(default)]
    content_details: ItemContent,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Channel {
    content_details: ChannelContent,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelContent {
    related_playlists: RelatedPlaylists,
}

#[derive(Debug, Deserialize)]
struct RelatedPlaylists {
    uploads: String,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    snippet: SearchSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchSnippet {
    channel_id: String,
    #[serde(default)]
    channel_title: String,
}

/// Curated YouTube label playlists plus arbitrary user playlists and channels.
///
/// With an API key the Data API v3 is used and uploads carry publish dates.
/// Without one, playlist and channel pages are scraped and tracks are undated.
#[derive(Debug, Clone)]
pub struct YouTubeSource {
    api_key: Option<String>,
    api_base: String,
    web_base: String,
    client: Client,
    retry: RetryPolicy,
}

#[derive(Default)]
pub struct YouTubeSourceBuilder {
    api_key: Option<String>,
    api_base: Option<String>,
    web_base: Option<String>,
    retry: Option<RetryPolicy>,
}

impl YouTubeSourceBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn api_key(mut self, key: &str) -> Self {
        if !key.trim().is_empty() {
            self.api_key = Some(key.trim().to_string());
        }
        self
    }

    pub fn api_base(mut self, url: &str) -> Self {
        self.api_base = Some(url.trim_end_matches('/').to_string());
        self
    }

    pub fn web_base(mut self, url: &str) -> Self {
        self.web_base = Some(url.trim_end_matches('/').to_string());
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn build(self) -> Result<YouTubeSource> {
        Ok(YouTubeSource {
            api_key: self.api_key,
            api_base: self.api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            web_base: self.web_base.unwrap_or_else(|| DEFAULT_WEB_BASE.to_string()),
            client: browser_client()?,
            retry: self.retry.unwrap_or_default(),
        })
    }
}

/// Parse a playlist, channel, `/c/`, `/user/` or `@handle` URL into a descriptor.
pub fn descriptor_from_url(name: &str, raw: &str) -> Option<SourceDescriptor> {
    let raw = raw.trim();
    if let Some(handle) = raw.strip_prefix('@') {
        return (!handle.is_empty()).then(|| custom(name, SourceKind::Channel, raw, raw));
    }

    let url = Url::parse(raw).ok()?;
    let host = url.host_str()?.trim_start_matches("www.").trim_start_matches("m.");
    if host != "youtube.com" && host != "music.youtube.com" {
        return None;
    }

    if let Some((_, list)) = url.query_pairs().find(|(k, _)| k == "list") {
        return Some(custom(name, SourceKind::Playlist, &list, raw));
    }

    let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        ["channel", id, ..] => Some(custom(name, SourceKind::Channel, id, raw)),
        ["c" | "user", vanity, ..] => Some(custom(name, SourceKind::Channel, &format!("@{vanity}"), raw)),
        [handle, ..] if handle.starts_with('@') && handle.len() > 1 => {
            Some(custom(name, SourceKind::Channel, handle, raw))
        }
        _ => None,
    }
}

fn custom(name: &str, kind: SourceKind, id: &str, url: &str) -> SourceDescriptor {
    SourceDescriptor {
        id: id.to_string(),
        name: if name.trim().is_empty() { id.to_string() } else { name.trim().to_string() },
        kind,
        custom: true,
        url: Some(url.to_string()),
    }
}

fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

fn is_unavailable(title: &str) -> bool {
    title.is_empty() || title == "Private video" || title == "Deleted video"
}

fn upload_to_track(title: &str, video_id: &str, channel: &str, source: &str, published: Option<DateTime<Utc>>) -> Track {
    let parsed = parse_title(title);
    Track::new(parsed.title, parsed.artist, source, watch_url(video_id))
        .with_remix(parsed.remix)
        .with_release_date(published.map(|p| p.date_naive()))
        .with_info("video_id", video_id)
        .with_info("channel", channel)
}

/// Pair each video id in a page's embedded JSON with the first title that
/// follows it before the next video id.
fn scrape_uploads(html: &str) -> Vec<(String, String)> {
    let ids: Vec<(usize, &str)> = RE_SCRAPED_VIDEO_ID
        .captures_iter(html)
        .filter_map(|c| Some((c.get(0)?.start(), c.get(1)?.as_str())))
        .collect();
    let titles: Vec<(usize, String)> = RE_SCRAPED_TITLE
        .captures_iter(html)
        .filter_map(|c| {
            let raw = c.get(1)?.as_str();
            let decoded = serde_json::from_str::<String>(&format!("\"{raw}\"")).ok()?;
            Some((c.get(0)?.start(), decoded))
        })
        .collect();

    let mut seen = std::collections::HashSet::new();
    let mut uploads = Vec::new();
    for (index, (position, id)) in ids.iter().enumerate() {
        if !seen.insert(*id) {
            continue;
        }
        let next = ids.get(index + 1).map_or(usize::MAX, |(p, _)| *p);
        if let Some((_, title)) = titles.iter().find(|(t, _)| *t > *position && *t < next) {
            uploads.push((id.to_string(), title.clone()));
        }
    }
    uploads
}

impl YouTubeSource {
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    async fn api_get<T: DeserializeOwned>(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<T> {
        let key = self
            .api_key
            .as_deref()
            .ok_or(DiggerError::NotConfigured("YOUTUBE_API_KEY"))?;
        let url = format!("{}/{}", self.api_base, endpoint);
        let (url, client) = (url.as_str(), &self.client);
        with_retry(&format!("YouTube {endpoint}"), &self.retry, move || async move {
            debug!("Request: GET {}", url);
            let response = client
                .get(url)
                .query(params)
                .query(&[("key", key)])
                .send()
                .await?;
            handle_response(response).await
        })
        .await
    }

    async fn resolve_handle(&self, handle: &str) -> Result<Option<(String, String)>> {
        info!("Resolving {} to channel ID...", handle);
        let page: Page<SearchHit> = self
            .api_get(
                "search",
                &[("part", "snippet"), ("q", handle), ("type", "channel"), ("maxResults", "5")],
            )
            .await?;
        Ok(page
            .items
            .into_iter()
            .next()
            .map(|hit| (hit.snippet.channel_id, hit.snippet.channel_title)))
    }

    async fn uploads_playlist(&self, channel_id: &str) -> Result<Option<String>> {
        let page: Page<Channel> = self
            .api_get("channels", &[("part", "contentDetails"), ("id", channel_id)])
            .await?;
        Ok(page
            .items
            .into_iter()
            .next()
            .map(|c| c.content_details.related_playlists.uploads))
    }

    async fn playlist_tracks(
        &self,
        playlist_id: &str,
        source_name: &str,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Track>> {
        let mut tracks = Vec::new();
        let mut page_token: Option<String> = None;

        for page_number in 1..=MAX_PAGES {
            let mut params = vec![
                ("part", "snippet,contentDetails"),
                ("playlistId", playlist_id),
                ("maxResults", PAGE_SIZE),
            ];
            if let Some(token) = page_token.as_deref() {
                params.push(("pageToken", token));
            }
            let page: Page<PlaylistItem> = self.api_get("playlistItems", &params).await?;
            debug!("Playlist {}: page {}, {} items", source_name, page_number, page.items.len());

            for item in page.items {
                let Some(video_id) = item.content_details.video_id.as_deref() else {
                    continue;
                };
                let title = item.snippet.title.trim();
                if is_unavailable(title) || is_excluded_upload(title) {
                    continue;
                }
                let published = item
                    .content_details
                    .video_published_at
                    .or(item.snippet.published_at);
                if published.is_some_and(|p| p < cutoff) {
                    continue;
                }
                let channel = item
                    .snippet
                    .video_owner_channel_title
                    .as_deref()
                    .unwrap_or(&item.snippet.channel_title);
                tracks.push(upload_to_track(title, video_id, channel, source_name, published));
                if tracks.len() >= limit {
                    return Ok(tracks);
                }
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        info!("Playlist {}: found {} tracks within date range", source_name, tracks.len());
        Ok(tracks)
    }

    async fn descriptor_tracks(
        &self,
        descriptor: &SourceDescriptor,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Track>> {
        match descriptor.kind {
            SourceKind::Playlist => {
                self.playlist_tracks(&descriptor.id, &descriptor.name, cutoff, limit)
                    .await
            }
            SourceKind::Channel => {
                let mut channel_id = descriptor.id.clone();
                if channel_id.starts_with('@') {
                    match self.resolve_handle(&channel_id).await? {
                        Some((id, title)) => {
                            info!("Resolved {} to channel {} ({})", descriptor.id, title, id);
                            channel_id = id;
                        }
                        None => {
                            warn!("Channel {} not found in search", descriptor.id);
                            return Ok(Vec::new());
                        }
                    }
                }
                match self.uploads_playlist(&channel_id).await? {
                    Some(uploads) => {
                        self.playlist_tracks(&uploads, &descriptor.name, cutoff, limit)
                            .await
                    }
                    None => {
                        warn!("Channel {} not found", descriptor.name);
                        Ok(Vec::new())
                    }
                }
            }
            SourceKind::Provider => Ok(Vec::new()),
        }
    }

    async fn scrape_descriptor(&self, descriptor: &SourceDescriptor, limit: usize) -> Result<Vec<Track>> {
        let url = match descriptor.kind {
            SourceKind::Playlist => format!("{}/playlist?list={}", self.web_base, descriptor.id),
            SourceKind::Channel if descriptor.id.starts_with('@') => {
                format!("{}/{}/videos", self.web_base, descriptor.id)
            }
            SourceKind::Channel => format!("{}/channel/{}/videos", self.web_base, descriptor.id),
            SourceKind::Provider => return Ok(Vec::new()),
        };
        let html = fetch_text(&self.client, &url, &self.retry).await?;
        Ok(scrape_uploads(&html)
            .into_iter()
            .filter(|(_, title)| !is_unavailable(title) && !is_excluded_upload(title))
            .take(limit)
            .map(|(id, title)| upload_to_track(&title, &id, &descriptor.name, &descriptor.name, None))
            .collect())
    }

    async fn fetch_descriptors(
        &self,
        descriptors: &[SourceDescriptor],
        days_to_look_back: u32,
        limit: usize,
    ) -> Result<Vec<Track>> {
        let descriptors: Vec<&SourceDescriptor> = descriptors
            .iter()
            .filter(|d| d.kind != SourceKind::Provider)
            .collect();
        if descriptors.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let cutoff = cutoff(days_to_look_back);
        let scraping = self.api_key.is_none();
        let per_source = if scraping {
            (limit / descriptors.len()).max(1)
        } else {
            (limit / descriptors.len()).max(MIN_PER_CHANNEL)
        };
        if scraping {
            warn!("No YouTube API key configured, scraping pages without dates");
        }

        let mut all_tracks = Vec::new();
        let mut failures = 0;
        let mut last_error = None;
        for descriptor in &descriptors {
            let result = if scraping {
                self.scrape_descriptor(descriptor, per_source).await
            } else {
                self.descriptor_tracks(descriptor, cutoff, per_source).await
            };
            match result {
                Ok(tracks) => {
                    info!("Found {} tracks from {}", tracks.len(), descriptor.name);
                    all_tracks.extend(tracks);
                }
                Err(e) => {
                    warn!("Error fetching tracks from {} ({}): {}", descriptor.name, descriptor.id, e);
                    failures += 1;
                    last_error = Some(e);
                }
            }
            if all_tracks.len() >= limit {
                break;
            }
        }

        if all_tracks.is_empty() {
            if failures == descriptors.len() {
                if let Some(e) = last_error {
                    return Err(e);
                }
            }
            warn!("No tracks found from any of the {} sources", descriptors.len());
        }

        all_tracks.shuffle(&mut rand::rng());
        all_tracks.truncate(limit);
        Ok(all_tracks)
    }
}

#[async_trait]
impl MusicSource for YouTubeSource {
    fn id(&self) -> &'static str {
        "youtube"
    }

    fn name(&self) -> &str {
        "YouTube"
    }

    fn description(&self) -> &'static str {
        "Fetches tracks from YouTube channels and playlists"
    }

    fn available_genres(&self) -> Vec<&'static str> {
        GENRE_PLAYLISTS.iter().map(|(key, _)| *key).collect()
    }

    async fn get_tracks(
        &self,
        days_to_look_back: u32,
        genre: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Track>> {
        let genre = resolve_genre(self.name(), genre, &self.available_genres());
        let playlists = GENRE_PLAYLISTS
            .iter()
            .find(|(key, _)| *key == genre)
            .map_or(&[][..], |(_, playlists)| *playlists);
        let descriptors: Vec<SourceDescriptor> = playlists
            .iter()
            .map(|(id, name)| SourceDescriptor {
                id: id.to_string(),
                name: name.to_string(),
                kind: SourceKind::Playlist,
                custom: false,
                url: None,
            })
            .collect();
        self.fetch_descriptors(&descriptors, days_to_look_back, limit)
            .await
    }

    async fn get_tracks_from_sources(
        &self,
        sources: &[SourceDescriptor],
        days_to_look_back: u32,
        limit: usize,
    ) -> Result<Vec<Track>> {
        self.fetch_descriptors(sources, days_to_look_back, limit)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn item(video_id: &str, title: &str, published: DateTime<Utc>) -> serde_json::Value {
        json!({
            "snippet": {
                "title": title,
                "channelTitle": "Label",
                "publishedAt": published.to_rfc3339(),
                "videoOwnerChannelTitle": "Label Official"
            },
            "contentDetails": { "videoId": video_id }
        })
    }

    fn source(server: &MockServer) -> YouTubeSource {
        YouTubeSourceBuilder::new()
            .api_key("test-key")
            .api_base(&server.uri())
            .web_base(&server.uri())
            .retry(RetryPolicy::no_retry())
            .build()
            .unwrap()
    }

    #[test]
    fn descriptors_from_urls() {
        let playlist = descriptor_from_url("Mine", "https://www.youtube.com/playlist?list=PL123").unwrap();
        assert_eq!(playlist.kind, SourceKind::Playlist);
        assert_eq!(playlist.id, "PL123");
        assert!(playlist.custom);

        let channel = descriptor_from_url("", "https://youtube.com/channel/UCabc/videos").unwrap();
        assert_eq!((channel.kind, channel.id.as_str()), (SourceKind::Channel, "UCabc"));
        assert_eq!(channel.name, "UCabc");

        assert_eq!(descriptor_from_url("x", "https://www.youtube.com/@defected").unwrap().id, "@defected");
        assert_eq!(descriptor_from_url("x", "https://www.youtube.com/c/toolroom").unwrap().id, "@toolroom");
        assert_eq!(descriptor_from_url("x", "@anjunadeep").unwrap().id, "@anjunadeep");
        assert!(descriptor_from_url("x", "https://vimeo.com/123").is_none());
        assert!(descriptor_from_url("x", "not a url").is_none());
    }

    #[test]
    fn scraped_pages_pair_ids_with_titles() {
        let html = r#"{"videoId":"aaaaaaaaaaa","x":1,"title":{"runs":[{"text":"Nova - Deep Blue & More"}]},
            "videoId":"aaaaaaaaaaa",
            "videoId":"bbbbbbbbbbb","title":{"simpleText":"Second \"Quoted\""}}"#;
        let uploads = scrape_uploads(html);
        assert_eq!(uploads.len(), 2);
        assert_eq!(uploads[0], ("aaaaaaaaaaa".to_string(), "Nova - Deep Blue & More".to_string()));
        assert_eq!(uploads[1].1, "Second \"Quoted\"");
    }

    #[tokio::test]
    async fn playlist_items_are_filtered_and_parsed() {
        let server = MockServer::start().await;
        let now = Utc::now();
        Mock::given(method("GET"))
            .and(path("/playlistItems"))
            .and(query_param("playlistId", "PLcustom"))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    item("vid00000001", "Nova - Deep Blue (Extended Mix) [Official Video]", now),
                    item("vid00000002", "Private video", now),
                    item("vid00000003", "Glitterbox Radio Show 301", now),
                    item("vid00000004", "Old - Tune", now - Duration::days(60)),
                ]
            })))
            .mount(&server)
            .await;

        let descriptor = descriptor_from_url("Mine", "https://www.youtube.com/playlist?list=PLcustom").unwrap();
        let tracks = source(&server)
            .get_tracks_from_sources(&[descriptor], 14, 50)
            .await
            .unwrap();
        assert_eq!(tracks.len(), 1);
        let track = &tracks[0];
        assert_eq!((track.artist.as_str(), track.title.as_str()), ("Nova", "Deep Blue"));
        assert_eq!(track.remix.as_deref(), Some("Extended Mix"));
        assert_eq!(track.source_url, "https://www.youtube.com/watch?v=vid00000001");
        assert_eq!(track.additional_info.get("channel").map(String::as_str), Some("Label Official"));
    }

    #[tokio::test]
    async fn handles_resolve_to_uploads_playlist() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "@label"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{ "snippet": { "channelId": "UC1", "channelTitle": "Label" } }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/channels"))
            .and(query_param("id", "UC1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{ "contentDetails": { "relatedPlaylists": { "uploads": "UU1" } } }]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/playlistItems"))
            .and(query_param("playlistId", "UU1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [item("vid00000009", "Label Artist - Fresh Cut", Utc::now())]
            })))
            .mount(&server)
            .await;

        let descriptor = descriptor_from_url("Label", "@label").unwrap();
        let tracks = source(&server)
            .get_tracks_from_sources(&[descriptor], 7, 5)
            .await
            .unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].title, "Fresh Cut");
    }

    #[tokio::test]
    async fn every_source_failing_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("quotaExceeded"))
            .mount(&server)
            .await;
        let result = source(&server).get_tracks(7, Some("anjunadeep"), 10).await;
        assert!(matches!(result, Err(DiggerError::Api { status: 403, .. })));
    }

    #[tokio::test]
    async fn scrapes_without_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/playlist"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<script>var ytInitialData = {"videoId":"ccccccccccc","title":{"runs":[{"text":"Nova - Lights"}]}};</script>"#,
            ))
            .mount(&server)
            .await;
        let source = YouTubeSourceBuilder::new()
            .web_base(&server.uri())
            .retry(RetryPolicy::no_retry())
            .build()
            .unwrap();
        assert!(!source.has_api_key());
        let tracks = source.get_tracks(7, Some("defected-music"), 10).await.unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].release_date, None);
        assert_eq!(tracks[0].artist, "Nova");
    }
}
