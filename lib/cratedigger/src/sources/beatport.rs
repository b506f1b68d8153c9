use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use futures::future::join_all;
use reqwest::Client;
use serde::Deserialize;
use shared::Track;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use super::{cutoff, resolve_genre, within_window};
use crate::error::Result;
use crate::http::{browser_client, fetch_text, RetryPolicy};
use crate::parsing::parse_title;
use crate::MusicSource;

const DEFAULT_BASE_URL: &str = "https://www.beatport.com";

const GENRE_IDS: &[(&str, Option<u32>)] = &[
    ("all", None),
    ("house", Some(5)),
    ("deep-house", Some(12)),
    ("tech-house", Some(11)),
    ("techno", Some(6)),
    ("electronica", Some(3)),
    ("drum-and-bass", Some(1)),
    ("minimal", Some(14)),
    ("progressive-house", Some(15)),
    ("melodic-house", Some(90)),
    ("afro-house", Some(89)),
];

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

/// Beatport's release and top-100 RSS feeds.
#[derive(Debug, Clone)]
pub struct BeatportSource {
    base_url: String,
    client: Client,
    retry: RetryPolicy,
}

#[derive(Default)]
pub struct BeatportSourceBuilder {
    base_url: Option<String>,
    retry: Option<RetryPolicy>,
}

impl BeatportSourceBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn base_url(mut self, url: &str) -> Self {
        self.base_url = Some(url.trim_end_matches('/').to_string());
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub fn build(self) -> Result<BeatportSource> {
        Ok(BeatportSource {
            base_url: self.base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client: browser_client()?,
            retry: self.retry.unwrap_or_default(),
        })
    }
}

impl BeatportSource {
    fn feed_urls(&self, genre: &str) -> Vec<String> {
        let id = GENRE_IDS
            .iter()
            .find(|(key, _)| *key == genre)
            .and_then(|(_, id)| *id);
        ["releases", "top-100"]
            .iter()
            .map(|feed| match id {
                Some(id) => format!("{}/feed/{}/genre/{}", self.base_url, feed, id),
                None => format!("{}/feed/{}", self.base_url, feed),
            })
            .collect()
    }

    async fn fetch_feed(&self, url: &str, cutoff: DateTime<Utc>) -> Result<Vec<Track>> {
        info!("Processing Beatport feed: {}", url);
        let body = fetch_text(&self.client, url, &self.retry).await?;
        let tracks = parse_feed(&body, cutoff)?;
        info!("Found {} tracks in feed {}", tracks.len(), url);
        Ok(tracks)
    }
}

fn parse_pub_date(raw: &str) -> Option<NaiveDate> {
    match DateTime::parse_from_rfc2822(raw.trim()) {
        Ok(dt) => Some(dt.with_timezone(&Utc).date_naive()),
        Err(_) => {
            warn!("Could not parse date: {}", raw);
            None
        }
    }
}

fn parse_feed(xml: &str, cutoff: DateTime<Utc>) -> Result<Vec<Track>> {
    let rss: Rss = quick_xml::de::from_str(xml)?;
    let tracks = rss
        .channel
        .items
        .into_iter()
        .filter_map(|item| {
            let (title, link) = (item.title?, item.link?);
            let released = item.pub_date.as_deref().and_then(parse_pub_date);
            if !within_window(released, cutoff) {
                debug!("Skipping old track: {} ({:?})", title, released);
                return None;
            }
            let parsed = parse_title(&title);
            Some(
                Track::new(parsed.title, parsed.artist, "Beatport", link.trim())
                    .with_remix(parsed.remix)
                    .with_release_date(released),
            )
        })
        .collect();
    Ok(tracks)
}

#[async_trait]
impl MusicSource for BeatportSource {
    fn id(&self) -> &'static str {
        "beatport"
    }

    fn name(&self) -> &str {
        "Beatport"
    }

    fn description(&self) -> &'static str {
        "Fetches tracks from Beatport's RSS feeds for new releases and charts"
    }

    fn available_genres(&self) -> Vec<&'static str> {
        GENRE_IDS.iter().map(|(key, _)| *key).collect()
    }

    async fn get_tracks(
        &self,
        days_to_look_back: u32,
        genre: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Track>> {
        let cutoff = cutoff(days_to_look_back);
        let genre = resolve_genre(self.name(), genre, &self.available_genres());
        let urls = self.feed_urls(genre);
        info!("Fetching tracks from {} Beatport RSS feeds", urls.len());

        let results = join_all(urls.iter().map(|url| self.fetch_feed(url, cutoff))).await;

        let mut seen = HashSet::new();
        let mut tracks = Vec::new();
        let mut last_error = None;
        for result in results {
            match result {
                Ok(feed) => tracks.extend(
                    feed.into_iter()
                        .filter(|t| !t.source_url.is_empty() && seen.insert(t.source_url.clone())),
                ),
                Err(e) => {
                    warn!("Error processing Beatport feed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        // every feed failed: surface the transport error
        if tracks.is_empty() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        // newest first, undated last
        tracks.sort_by(|a, b| b.release_date.cmp(&a.release_date));
        tracks.truncate(limit);
        info!("Found {} tracks from Beatport RSS", tracks.len());
        Ok(tracks)
    }
}
