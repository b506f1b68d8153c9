pub mod beatport;
pub mod juno;
pub mod traxsource;
pub mod youtube;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use shared::{task::SourceDescriptor, Track};
use std::sync::Arc;
use tracing::warn;

use crate::error::Result;
use crate::MusicSource;

pub use beatport::{BeatportSource, BeatportSourceBuilder};
pub use juno::{JunoSource, JunoSourceBuilder};
pub use traxsource::{TraxsourceSource, TraxsourceSourceBuilder};
pub use youtube::{YouTubeSource, YouTubeSourceBuilder};

/// Detail pages fetched concurrently per round.
pub(crate) const DETAIL_BATCH_SIZE: usize = 5;

/// Oldest instant still inside the look-back window. Zero days counts as one.
pub(crate) fn cutoff(days_to_look_back: u32) -> DateTime<Utc> {
    Utc::now() - Duration::days(i64::from(days_to_look_back.max(1)))
}

/// Tracks with no known date pass; dated ones must fall inside the window.
pub(crate) fn within_window(date: Option<NaiveDate>, cutoff: DateTime<Utc>) -> bool {
    date.is_none_or(|d| d >= cutoff.date_naive())
}

/// Lowercased genre key, or `all` (with a warning) when the source lacks it.
pub(crate) fn resolve_genre<'a>(source: &str, genre: Option<&str>, known: &[&'a str]) -> &'a str {
    let requested = genre.map(|g| g.trim().to_lowercase());
    match requested.as_deref() {
        None | Some("") | Some("all") => "all",
        Some(g) => match known.iter().find(|k| **k == g) {
            Some(k) => k,
            None => {
                warn!("Genre {} not found in {} sources, using 'all'", g, source);
                "all"
            }
        },
    }
}

/// A source limited to a fixed list of playlists or channels, exposed as a
/// plain [`MusicSource`]. Used for an owner's custom sources.
pub struct CuratedSource {
    inner: Arc<dyn MusicSource>,
    sources: Vec<SourceDescriptor>,
    name: String,
}

impl CuratedSource {
    pub fn new(inner: Arc<dyn MusicSource>, sources: Vec<SourceDescriptor>) -> Self {
        let name = match sources.as_slice() {
            [only] => only.name.clone(),
            _ => format!("{} (custom)", inner.name()),
        };
        Self {
            inner,
            sources,
            name,
        }
    }

    pub fn descriptors(&self) -> &[SourceDescriptor] {
        &self.sources
    }
}

#[async_trait]
impl MusicSource for CuratedSource {
    fn id(&self) -> &'static str {
        self.inner.id()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &'static str {
        "User-selected playlists and channels"
    }

    async fn get_tracks(
        &self,
        days_to_look_back: u32,
        _genre: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Track>> {
        self.inner
            .get_tracks_from_sources(&self.sources, days_to_look_back, limit)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_genre_falls_back_to_all() {
        let known = ["all", "house", "techno"];
        assert_eq!(resolve_genre("Test", Some("House"), &known), "house");
        assert_eq!(resolve_genre("Test", Some("polka"), &known), "all");
        assert_eq!(resolve_genre("Test", None, &known), "all");
    }

    #[test]
    fn undated_tracks_stay_in_window() {
        let cut = cutoff(7);
        assert!(within_window(None, cut));
        assert!(within_window(Some(Utc::now().date_naive()), cut));
        let old = (Utc::now() - Duration::days(30)).date_naive();
        assert!(!within_window(Some(old), cut));
    }

    #[test]
    fn zero_days_is_one_day() {
        let cut = cutoff(0);
        assert!(Utc::now() - cut >= Duration::days(1));
    }
}
