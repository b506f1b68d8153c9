use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::join_all;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use shared::{track::UNKNOWN_ARTIST, Track};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use super::{cutoff, resolve_genre, within_window, DETAIL_BATCH_SIZE};
use crate::error::Result;
use crate::http::{browser_client, fetch_text, RateLimiter, RetryPolicy};
use crate::parsing::split_remix;
use crate::MusicSource;

const DEFAULT_BASE_URL: &str = "https://www.traxsource.com";

const GENRE_PATHS: &[(&str, &str)] = &[
    ("all", ""),
    ("house", "5"),
    ("deep-house", "67"),
    ("soulful-house", "12"),
    ("afro-house", "107"),
    ("tech-house", "14"),
];

static RE_DMY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{2}-\d{2}-\d{4})").unwrap());
static RE_YMD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d{4}-\d{2}-\d{2})").unwrap());

#[derive(Debug, Clone, PartialEq)]
struct ChartRow {
    title: String,
    artist: String,
    url: String,
}

/// Traxsource top-100 charts, dated through each track's detail page.
#[derive(Debug, Clone)]
pub struct TraxsourceSource {
    base_url: String,
    client: Client,
    retry: RetryPolicy,
    limiter: RateLimiter,
}

#[derive(Default)]
pub struct TraxsourceSourceBuilder {
    base_url: Option<String>,
    retry: Option<RetryPolicy>,
    max_requests_per_window: Option<usize>,
    window_seconds: Option<i64>,
}

impl TraxsourceSourceBuilder {
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

    pub fn rate_limit(mut self, max_requests: usize, window_seconds: i64) -> Self {
        self.max_requests_per_window = Some(max_requests);
        self.window_seconds = Some(window_seconds);
        self
    }

    pub fn build(self) -> Result<TraxsourceSource> {
        Ok(TraxsourceSource {
            base_url: self.base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client: browser_client()?,
            retry: self.retry.unwrap_or_default(),
            limiter: RateLimiter::new(
                self.max_requests_per_window.unwrap_or(30),
                self.window_seconds.unwrap_or(60),
            ),
        })
    }
}

impl TraxsourceSource {
    fn chart_url(&self, genre: &str) -> String {
        match GENRE_PATHS.iter().find(|(key, _)| *key == genre) {
            Some((_, id)) if !id.is_empty() => format!("{}/top100/{}", self.base_url, id),
            _ => format!("{}/top100", self.base_url),
        }
    }

    async fn release_date(&self, url: &str) -> Option<NaiveDate> {
        self.limiter.acquire().await;
        match fetch_text(&self.client, url, &self.retry).await {
            Ok(html) => parse_release_date(&html),
            Err(e) => {
                warn!("Could not fetch track page at {}: {}", url, e);
                None
            }
        }
    }
}

fn text_of(element: scraper::ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn parse_chart(html: &str, base_url: &str) -> Vec<ChartRow> {
    let document = Html::parse_document(html);
    let (Ok(row_sel), Ok(title_sel), Ok(artist_sel)) = (
        Selector::parse(".trk-row"),
        Selector::parse(".title a"),
        Selector::parse(".artist a"),
    ) else {
        return Vec::new();
    };

    document
        .select(&row_sel)
        .filter_map(|row| {
            let link = row.select(&title_sel).next()?;
            let title = text_of(link);
            let href = link.value().attr("href")?;
            if title.is_empty() {
                return None;
            }
            let artists: Vec<String> = row
                .select(&artist_sel)
                .map(text_of)
                .filter(|a| !a.is_empty())
                .collect();
            let artist = if artists.is_empty() {
                UNKNOWN_ARTIST.to_string()
            } else {
                artists.join(", ")
            };
            let url = if href.starts_with("http") {
                href.to_string()
            } else {
                format!("{base_url}{href}")
            };
            Some(ChartRow { title, artist, url })
        })
        .collect()
}

fn parse_release_date(html: &str) -> Option<NaiveDate> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(".release-date").ok()?;
    let text = text_of(document.select(&selector).next()?);
    if let Some(caps) = RE_DMY.captures(&text) {
        return NaiveDate::parse_from_str(&caps[1], "%d-%m-%Y").ok();
    }
    let caps = RE_YMD.captures(&text)?;
    NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok()
}

#[async_trait]
impl MusicSource for TraxsourceSource {
    fn id(&self) -> &'static str {
        "traxsource"
    }

    fn name(&self) -> &str {
        "Traxsource"
    }

    fn description(&self) -> &'static str {
        "Scrapes tracks from Traxsource's Top 100 charts"
    }

    fn available_genres(&self) -> Vec<&'static str> {
        GENRE_PATHS.iter().map(|(key, _)| *key).collect()
    }

    async fn get_tracks(
        &self,
        days_to_look_back: u32,
        genre: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Track>> {
        let cutoff = cutoff(days_to_look_back);
        let genre = resolve_genre(self.name(), genre, &self.available_genres());
        let url = self.chart_url(genre);
        info!("Fetching tracks from Traxsource chart: {}", url);

        let html = fetch_text(&self.client, &url, &self.retry).await?;
        let mut rows = parse_chart(&html, &self.base_url);
        rows.truncate(limit);

        let mut tracks = Vec::new();
        for (index, batch) in rows.chunks(DETAIL_BATCH_SIZE).enumerate() {
            let dates = join_all(batch.iter().map(|row| self.release_date(&row.url))).await;
            for (row, released) in batch.iter().zip(dates) {
                if !within_window(released, cutoff) {
                    debug!("Skipping old track: {} ({:?})", row.title, released);
                    continue;
                }
                let (title, remix) = split_remix(&row.title);
                tracks.push(
                    Track::new(title, row.artist.clone(), "Traxsource", row.url.clone())
                        .with_remix(remix)
                        .with_release_date(released),
                );
            }
            info!(
                "Processed {}/{} tracks",
                ((index + 1) * DETAIL_BATCH_SIZE).min(rows.len()),
                rows.len()
            );
        }

        info!("Found {} tracks from Traxsource", tracks.len());
        Ok(tracks)
    }
}
