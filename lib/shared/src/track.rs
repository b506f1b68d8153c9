use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// A candidate track as reported by one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub remix: Option<String>,
    #[serde(default)]
    pub release_date: Option<NaiveDate>,
    pub source: String,
    pub source_url: String,
    #[serde(default)]
    pub additional_info: BTreeMap<String, String>,
}

impl Track {
    pub fn new(
        title: impl Into<String>,
        artist: impl Into<String>,
        source: impl Into<String>,
        source_url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            remix: None,
            release_date: None,
            source: source.into(),
            source_url: source_url.into(),
            additional_info: BTreeMap::new(),
        }
    }

    pub fn with_remix(mut self, remix: Option<String>) -> Self {
        self.remix = remix.filter(|r| !r.trim().is_empty());
        self
    }

    pub fn with_release_date(mut self, date: Option<NaiveDate>) -> Self {
        self.release_date = date;
        self
    }

    pub fn with_info(mut self, key: &str, value: impl Into<String>) -> Self {
        self.additional_info.insert(key.to_string(), value.into());
        self
    }

    /// "Artist - Title (Remix)", the form used in progress messages.
    pub fn display_name(&self) -> String {
        match &self.remix {
            Some(remix) => format!("{} - {} ({})", self.artist, self.title, remix),
            None => format!("{} - {}", self.artist, self.title),
        }
    }
}
