use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::join_all;
use reqwest::Client;
use scraper::{Html, Selector};
use shared::Track;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use super::{cutoff, resolve_genre, within_window, DETAIL_BATCH_SIZE};
use crate::error::Result;
use crate::http::{browser_client, fetch_text, RateLimiter, RetryPolicy};
use crate::parsing::split_remix;
use crate::MusicSource;

const DEFAULT_BASE_URL: &str = "https://www.junodownload.com";

const GENRE_PATHS: &[(&str, &str)] = &[
    ("all", "all"),
    ("funky-house", "funky-club-house"),
    ("deep-house", "deep-house"),
    ("disco", "disco"),
    ("drum-and-bass", "drumandbass"),
    ("dancehall", "dancehall-reggae"),
];

const CHARTS: &[&str] = &["bestsellers", "hype"];

const DATE_FORMATS: &[&str] = &["%d %b %Y", "%d %B %Y", "%B %d, %Y", "%b %d, %Y"];

#[derive(Debug, Clone, PartialEq)]
struct ProductPage {
    title: String,
    artist: String,
    released: Option<NaiveDate>,
}

/// Juno Download bestseller and hype charts, one detail page per track.
#[derive(Debug, Clone)]
pub struct JunoSource {
    base_url: String,
    client: Client,
    retry: RetryPolicy,
    limiter: RateLimiter,
}

#[derive(Default)]
pub struct JunoSourceBuilder {
    base_url: Option<String>,
    retry: Option<RetryPolicy>,
    max_requests_per_window: Option<usize>,
    window_seconds: Option<i64>,
}

impl JunoSourceBuilder {
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

    pub fn build(self) -> Result<JunoSource> {
        Ok(JunoSource {
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

impl JunoSource {
    fn chart_url(&self, genre: &str, chart: &str) -> String {
        let genre_path = GENRE_PATHS
            .iter()
            .find(|(key, _)| *key == genre)
            .map_or("all", |(_, p)| *p);
        format!(
            "{}/{}/charts/{}/this-week/releases/?music_product_type=single&items_per_page=100",
            self.base_url, genre_path, chart
        )
    }

    async fn product(&self, url: &str) -> Option<ProductPage> {
        self.limiter.acquire().await;
        match fetch_text(&self.client, url, &self.retry).await {
            Ok(html) => {
                let page = parse_product(&html);
                if page.is_none() {
                    warn!("Could not find title or artist on {}", url);
                }
                page
            }
            Err(e) => {
                warn!("Error accessing track page {}: {}", url, e);
                None
            }
        }
    }
}

fn text_of(element: scraper::ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn parse_listing(html: &str, base_url: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let (Ok(item_sel), Ok(link_sel)) = (
        Selector::parse(".jd-listing-item"),
        Selector::parse(".juno-title a"),
    ) else {
        return Vec::new();
    };

    document
        .select(&item_sel)
        .filter_map(|item| item.select(&link_sel).next()?.value().attr("href"))
        .filter(|href| href.contains("/track/"))
        .map(|href| {
            if href.starts_with("http") {
                href.to_string()
            } else {
                format!("{base_url}{href}")
            }
        })
        .collect()
}

fn parse_release_date(text: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text.trim(), fmt).ok())
}

fn parse_product(html: &str) -> Option<ProductPage> {
    let document = Html::parse_document(html);
    let title_sel = Selector::parse("h1.product-title").ok()?;
    let artist_sel = Selector::parse(".product-artist a").ok()?;
    let date_sel = Selector::parse(".release-date-value").ok()?;

    let title = text_of(document.select(&title_sel).next()?);
    let artists: Vec<String> = document
        .select(&artist_sel)
        .map(text_of)
        .filter(|a| !a.is_empty())
        .collect();
    if title.is_empty() || artists.is_empty() {
        return None;
    }
    let released = document
        .select(&date_sel)
        .next()
        .and_then(|el| parse_release_date(&text_of(el)));

    Some(ProductPage {
        title,
        artist: artists.join(", "),
        released,
    })
}

#[async_trait]
impl MusicSource for JunoSource {
    fn id(&self) -> &'static str {
        "juno"
    }

    fn name(&self) -> &str {
        "Juno Download"
    }

    fn description(&self) -> &'static str {
        "Scrapes tracks from Juno Download's bestsellers and hype charts"
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

        let mut seen = HashSet::new();
        let mut links = Vec::new();
        let mut last_error = None;
        for chart in CHARTS {
            let url = self.chart_url(genre, chart);
            info!("Scraping Juno Download URL: {}", url);
            match fetch_text(&self.client, &url, &self.retry).await {
                Ok(html) => {
                    let found = parse_listing(&html, &self.base_url);
                    info!("Found {} track links on {}", found.len(), url);
                    links.extend(found.into_iter().filter(|l| seen.insert(l.clone())));
                }
                Err(e) => {
                    warn!("Error accessing {}: {}", url, e);
                    last_error = Some(e);
                }
            }
        }
        if links.is_empty() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        // oversample, some detail pages fail or fall outside the window
        links.truncate(limit.saturating_mul(2));
        info!("Will process {} unique track links", links.len());

        let mut tracks = Vec::new();
        for batch in links.chunks(DETAIL_BATCH_SIZE) {
            if tracks.len() >= limit {
                break;
            }
            let pages = join_all(batch.iter().map(|url| self.product(url))).await;
            for (url, page) in batch.iter().zip(pages) {
                let Some(page) = page else { continue };
                if !within_window(page.released, cutoff) {
                    debug!("Track too old: {} - {:?}", url, page.released);
                    continue;
                }
                let (title, remix) = split_remix(&page.title);
                tracks.push(
                    Track::new(title, page.artist, "Juno Download", url.clone())
                        .with_remix(remix)
                        .with_release_date(page.released),
                );
            }
        }

        tracks.truncate(limit);
        info!("Found {} tracks from Juno Download", tracks.len());
        Ok(tracks)
    }
}
