use serde::{Deserialize, Serialize};

use crate::track::Track;

/// Outcome of looking up one track on a destination platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub track: Track,
    pub matched: bool,
    #[serde(default)]
    pub match_id: String,
    #[serde(default)]
    pub match_url: String,
    #[serde(default)]
    pub match_name: String,
    #[serde(default)]
    pub match_artist: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub message: String,
}

impl MatchResult {
    pub fn unmatched(track: Track, message: impl Into<String>) -> Self {
        Self {
            track,
            matched: false,
            match_id: String::new(),
            match_url: String::new(),
            match_name: String::new(),
            match_artist: String::new(),
            score: 0.0,
            message: message.into(),
        }
    }

    /// Best candidate found for `track`. `matched` is left false; callers decide
    /// acceptance with [`MatchResult::accept_if`].
    pub fn candidate(
        track: Track,
        match_id: impl Into<String>,
        match_url: impl Into<String>,
        match_name: impl Into<String>,
        match_artist: impl Into<String>,
        score: f64,
    ) -> Self {
        Self {
            track,
            matched: false,
            match_id: match_id.into(),
            match_url: match_url.into(),
            match_name: match_name.into(),
            match_artist: match_artist.into(),
            score,
            message: String::new(),
        }
    }

    pub fn has_candidate(&self) -> bool {
        !self.match_id.is_empty()
    }

    /// Re-classify against `threshold` and refresh the message accordingly.
    pub fn accept_if(mut self, threshold: f64) -> Self {
        self.matched = self.has_candidate() && self.score >= threshold;
        if self.has_candidate() {
            self.message = if self.matched {
                format!("Found match with score {:.2}", self.score)
            } else {
                format!("No good matches found (best score: {:.2})", self.score)
            };
        }
        self
    }
}

/// Terminal output of one synchronization run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaylistResult {
    pub success: bool,
    #[serde(default)]
    pub playlist_id: String,
    #[serde(default)]
    pub playlist_url: String,
    #[serde(default)]
    pub tracks_added: usize,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub added_tracks: Vec<MatchResult>,
    #[serde(default)]
    pub unmatched_tracks: Vec<MatchResult>,
    #[serde(default)]
    pub csv_data: Option<String>,
}

impl PlaylistResult {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            ..Default::default()
        }
    }
}
