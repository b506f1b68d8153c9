use async_trait::async_trait;
use chrono::Utc;
use shared::{task::SourceDescriptor, MatchResult, PlaylistResult, Track};
use std::sync::Arc;
use tracing::{info, warn};

use crate::credentials::{CredentialStore, Credentials};
use crate::error::{DiggerError, Result};
use crate::export::matches_to_csv;
use crate::progress::{report, ProgressSender};

#[async_trait]
pub trait MusicSource: Send + Sync {
    fn id(&self) -> &'static str;
    fn name(&self) -> &str;
    fn description(&self) -> &'static str;

    fn available_genres(&self) -> Vec<&'static str> {
        vec!["all"]
    }

    /// Tracks released within the last `days_to_look_back` days, at most `limit`.
    async fn get_tracks(
        &self,
        days_to_look_back: u32,
        genre: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Track>>;

    /// Same as [`MusicSource::get_tracks`] but over an explicit list of
    /// playlists or channels.
    async fn get_tracks_from_sources(
        &self,
        _sources: &[SourceDescriptor],
        _days_to_look_back: u32,
        _limit: usize,
    ) -> Result<Vec<Track>> {
        Err(DiggerError::Unsupported(self.name().to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedPlaylist {
    pub id: String,
    pub url: String,
}

#[async_trait]
pub trait PlaylistDestination: Send + Sync {
    fn id(&self) -> &'static str;
    fn name(&self) -> &'static str;

    /// Largest number of ids accepted by one [`PlaylistDestination::add_tracks`] call.
    fn max_batch_size(&self) -> usize;

    /// Adopt `credentials` (or the stored ones) and verify them. Never errors:
    /// any failure reports `false`.
    async fn authenticate(&self, credentials: Option<Credentials>) -> bool;

    /// Best candidate for `track`, with `matched` set against the destination's
    /// own search threshold.
    async fn search_track(&self, track: &Track) -> Result<MatchResult>;

    async fn create_empty_playlist(
        &self,
        name: &str,
        description: &str,
        public: bool,
    ) -> Result<CreatedPlaylist>;

    /// Append one batch. Destinations that insert item by item report a
    /// mid-batch failure as [`DiggerError::PartialBatch`].
    async fn add_tracks(&self, playlist_id: &str, match_ids: &[String]) -> Result<usize>;

    async fn create_playlist(
        &self,
        name: &str,
        description: &str,
        tracks: Vec<Track>,
        public: bool,
        min_match_score: f64,
        progress: Option<ProgressSender>,
    ) -> Result<PlaylistResult> {
        let name = expand_date(name);
        let description = expand_date(description);
        let progress = progress.as_ref();

        let playlist = match self.create_empty_playlist(&name, &description, public).await {
            Ok(playlist) => playlist,
            Err(e @ DiggerError::NotAuthenticated(_)) => return Err(e),
            Err(e) => {
                warn!("{}: failed to create playlist '{}': {}", self.name(), name, e);
                return Ok(PlaylistResult::failed(format!("Failed to create playlist: {e}")));
            }
        };
        info!("{}: created playlist '{}' ({})", self.name(), name, playlist.id);

        let total = tracks.len();
        let mut added = Vec::new();
        let mut unmatched = Vec::new();

        for (index, track) in tracks.into_iter().enumerate() {
            report(
                progress,
                index,
                total,
                format!("Searching for track {}/{}: {}", index + 1, total, track.display_name()),
            );

            let result = match self.search_track(&track).await {
                Ok(result) => result.accept_if(min_match_score),
                Err(e @ DiggerError::NotAuthenticated(_)) => return Err(e),
                Err(e) => {
                    warn!("{}: search failed for {}: {}", self.name(), track.display_name(), e);
                    MatchResult::unmatched(track, format!("Search failed: {e}"))
                }
            };

            let summary = if result.matched {
                format!("Found match for {}", result.track.display_name())
            } else {
                format!("No match found for {}", result.track.display_name())
            };
            report(progress, index + 1, total, summary);

            if result.matched {
                added.push(result);
            } else {
                unmatched.push(result);
            }
        }

        if added.is_empty() {
            let csv = matches_to_csv(&added, &unmatched);
            return Ok(PlaylistResult {
                success: true,
                playlist_id: playlist.id,
                playlist_url: playlist.url,
                tracks_added: 0,
                message: "Created empty playlist - no matching tracks found".to_string(),
                added_tracks: added,
                unmatched_tracks: unmatched,
                csv_data: Some(csv),
            });
        }

        let ids: Vec<String> = added.iter().map(|m| m.match_id.clone()).collect();
        let batch_size = self.max_batch_size().max(1);
        let batches = ids.len().div_ceil(batch_size);
        let mut tracks_added = 0;
        let mut failure = None;

        for (batch_index, batch) in ids.chunks(batch_size).enumerate() {
            // counted after the searches so `current` keeps climbing
            report(
                progress,
                total + batch_index,
                total + batches,
                format!("Adding batch {}/{} to playlist", batch_index + 1, batches),
            );
            match self.add_tracks(&playlist.id, batch).await {
                Ok(count) => tracks_added += count,
                Err(DiggerError::PartialBatch { added: count, reason }) => {
                    tracks_added += count;
                    failure = Some(reason);
                    break;
                }
                Err(e) => {
                    failure = Some(e.to_string());
                    break;
                }
            }
        }

        let message = match &failure {
            Some(reason) => {
                warn!("{}: adding tracks stopped: {}", self.name(), reason);
                // committed ids are a prefix of `added`, the rest never made it
                let committed = tracks_added.min(added.len());
                for mut pending in added.split_off(committed) {
                    pending.message = format!("Matched but not added: {reason}");
                    unmatched.push(pending);
                }
                format!(
                    "Added {} of {} matched tracks to '{}'; adding stopped: {}",
                    tracks_added, ids.len(), name, reason
                )
            }
            None => format!("Added {} tracks to playlist '{}'", tracks_added, name),
        };

        let csv = matches_to_csv(&added, &unmatched);
        Ok(PlaylistResult {
            success: true,
            playlist_id: playlist.id,
            playlist_url: playlist.url,
            tracks_added,
            message,
            added_tracks: added,
            unmatched_tracks: unmatched,
            csv_data: Some(csv),
        })
    }
}

/// Builds a destination bound to one owner's stored credentials.
pub trait DestinationFactory: Send + Sync {
    fn id(&self) -> &'static str;
    fn name(&self) -> &'static str;
    fn for_owner(
        &self,
        owner_id: &str,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Arc<dyn PlaylistDestination>>;
}

/// Replace `{date}` with today's date (UTC, `YYYY-MM-DD`).
pub fn expand_date(template: &str) -> String {
    template.replace("{date}", &Utc::now().format("%Y-%m-%d").to_string())
}


#[cfg(test)]
mod tests {
    use super::mock::MockDestination;
    use super::*;
    use crate::progress;

    fn tracks() -> Vec<Track> {
        vec![
            Track::new("Deep Blue", "Nova", "Beatport", "https://b/1"),
            Track::new("Rain", "Kerri Chandler", "Traxsource", "https://t/2"),
            Track::new("Unknown Thing", "Nobody", "Juno", "https://j/3"),
        ]
    }

    #[tokio::test]
    async fn commits_matches_and_exports_everything() {
        let dest = MockDestination::new(&[
            ("a", "Deep Blue (Extended Mix)", "Nova"),
            ("b", "Rain", "Kerri Chandler"),
        ]);
        let (tx, mut rx) = progress::channel();
        let result = dest
            .create_playlist("New Music {date}", "", tracks(), false, 0.7, Some(tx))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.tracks_added, 2);
        assert_eq!(result.added_tracks.len(), 2);
        assert_eq!(result.unmatched_tracks.len(), 1);
        assert!(!result.message.contains("{date}"));
        assert_eq!(result.csv_data.unwrap().lines().count(), 4);
        assert_eq!(*dest.added.lock().unwrap(), vec!["a", "b"]);

        let mut last = 0;
        let mut events = 0;
        while let Ok(event) = rx.try_recv() {
            if event.message.starts_with("Searching") || event.message.contains("match") {
                assert!(event.current >= last);
                last = event.current;
            }
            events += 1;
        }
        assert!(events >= 6);
    }

    #[tokio::test]
    async fn batch_progress_continues_after_searches() {
        let dest = MockDestination::new(&[
            ("a", "Deep Blue (Extended Mix)", "Nova"),
            ("b", "Rain", "Kerri Chandler"),
        ]);
        let (tx, mut rx) = progress::channel();
        dest.create_playlist("Weekly", "", tracks(), false, 0.7, Some(tx))
            .await
            .unwrap();

        let mut last = 0;
        let mut saw_batch = false;
        while let Ok(event) = rx.try_recv() {
            assert!(event.current >= last, "{} went back to {}", last, event.current);
            last = event.current;
            if event.message.starts_with("Adding batch") {
                saw_batch = true;
                assert!(event.current >= tracks().len());
            }
        }
        assert!(saw_batch);
    }

    #[tokio::test]
    async fn batch_failure_keeps_committed_count() {
        let mut dest = MockDestination::new(&[
            ("a", "Deep Blue", "Nova"),
            ("b", "Rain", "Kerri Chandler"),
            ("c", "Unknown Thing", "Nobody"),
        ]);
        dest.batch_size = 2;
        dest.fail_on_batch = Some(2);

        let result = dest
            .create_playlist("Weekly", "", tracks(), true, 0.7, None)
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.tracks_added, 2);
        assert_eq!(result.added_tracks.len(), 2);
        assert_eq!(result.unmatched_tracks.len(), 1);
        assert!(result.unmatched_tracks[0].message.starts_with("Matched but not added"));
        assert!(result.message.contains("adding stopped"));
    }

    #[tokio::test]
    async fn no_matches_yields_empty_playlist() {
        let dest = MockDestination::new(&[]);
        let result = dest
            .create_playlist("Weekly", "", tracks(), false, 0.7, None)
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.tracks_added, 0);
        assert_eq!(result.unmatched_tracks.len(), 3);
        assert!(result.message.contains("no matching tracks"));
    }

    #[test]
    fn date_placeholder_is_replaced() {
        let expanded = expand_date("New Music {date}");
        assert!(!expanded.contains('{'));
        assert_eq!(expanded.len(), "New Music ".len() + 10);
    }
}
