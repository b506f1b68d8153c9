use cratedigger::export::tracks_to_csv;
use cratedigger::progress::{self, ProgressReceiver};
use cratedigger::sources::CuratedSource;
use cratedigger::traits::expand_date;
use cratedigger::{DiggerError, MusicSource};
use shared::task::{SourceDescriptor, SourceKind, Task, TaskResult, TaskStatus};
use std::sync::Arc;
use tracing::{info, warn};

use super::{TaskManager, TaskSlot};
use crate::error::{Result, TaskError};

/// Mirror progress events into the polled view, scaled onto `from..=to`.
/// The published value never goes backwards within one phase.
async fn forward_progress(slot: &TaskSlot, mut rx: ProgressReceiver, from: u8, to: u8) {
    let mut last = from;
    while let Some(event) = rx.recv().await {
        let span = f64::from(to.saturating_sub(from));
        let progress = from.saturating_add((span * event.fraction()).round() as u8);
        last = last.max(progress.min(to));
        slot.publish_progress(last, event.message);
    }
}

impl TaskManager {
    pub(super) async fn run_step(&self, slot: &TaskSlot, task: &mut Task) -> Result<()> {
        match task.step {
            0 => self.resolve_sources(task).await,
            1 => self.fetch_tracks(slot, task).await,
            2 => self.finish(slot, task).await,
            step => Err(TaskError::Failed(format!("Unknown task step: {step}"))),
        }
    }

    async fn resolve_sources(&self, task: &mut Task) -> Result<()> {
        let selection = task.params.source_selection;
        let mut sources = Vec::new();
        if selection.includes_predefined() {
            sources.extend(
                self.services
                    .list_sources()
                    .into_iter()
                    .map(|(id, name)| SourceDescriptor::provider(id, name)),
            );
        }
        if selection.includes_custom() {
            sources.extend(self.custom_sources.active_for_owner(&task.owner_id).await?);
        }
        if sources.is_empty() {
            return Err(DiggerError::NoSources.into());
        }

        info!(task_id = %task.id, "Resolved {} sources", sources.len());
        task.message = format!("Found {} sources, fetching tracks...", sources.len());
        task.sources = sources;
        task.progress = 10;
        task.step = 1;
        Ok(())
    }

    /// Registered providers as-is, custom playlists and channels grouped
    /// behind the YouTube source.
    fn instantiate(&self, descriptors: &[SourceDescriptor]) -> Result<Vec<Arc<dyn MusicSource>>> {
        let mut sources = Vec::new();
        let mut custom = Vec::new();
        for descriptor in descriptors {
            match descriptor.kind {
                SourceKind::Provider => match self.services.source(&descriptor.id) {
                    Some(source) => sources.push(source.clone()),
                    None => warn!("Source {} is no longer registered", descriptor.id),
                },
                SourceKind::Playlist | SourceKind::Channel => custom.push(descriptor.clone()),
            }
        }
        if !custom.is_empty() {
            match self.services.source("youtube") {
                Some(youtube) => {
                    sources.push(Arc::new(CuratedSource::new(youtube.clone(), custom)));
                }
                None => warn!("Skipping {} custom sources, YouTube is not configured", custom.len()),
            }
        }
        if sources.is_empty() {
            return Err(DiggerError::NoSources.into());
        }
        Ok(sources)
    }

    async fn fetch_tracks(&self, slot: &TaskSlot, task: &mut Task) -> Result<()> {
        let sources = self.instantiate(&task.sources)?;
        task.progress = 30;
        task.message = format!("Fetching tracks from {} sources...", sources.len());
        slot.publish(task);

        let params = task.params.clone();
        let (tx, rx) = progress::channel();
        let fetch = async move {
            self.orchestrator
                .aggregate(&sources, params.genre.as_deref(), params.days, params.limit, Some(&tx))
                .await
        };
        let (tracks, ()) = tokio::join!(fetch, forward_progress(slot, rx, 30, 50));
        let tracks = tracks?;

        info!(task_id = %task.id, "Fetched {} tracks", tracks.len());
        task.csv_data = Some(tracks_to_csv(&tracks));
        task.message = format!("Found {} tracks", tracks.len());
        task.tracks = tracks;
        task.progress = 50;
        task.step = 2;
        Ok(())
    }

    async fn finish(&self, slot: &TaskSlot, task: &mut Task) -> Result<()> {
        let params = task.params.clone();
        let mut result = TaskResult {
            playlist_name: expand_date(&params.name),
            track_count: task.tracks.len(),
            tracks: task.tracks.clone(),
            sources_used: task.sources.iter().map(|s| s.name.clone()).collect(),
            genre: params.genre.clone(),
            days_searched: params.days,
            playlist_url: None,
            tracks_added: None,
            matched_tracks: None,
            unmatched_tracks: None,
        };

        match &params.destination {
            Some(destination_id) => {
                let factory = self
                    .services
                    .destination(Some(destination_id))
                    .ok_or_else(|| TaskError::Failed(format!("Unknown destination: {destination_id}")))?;
                let destination = factory.for_owner(&task.owner_id, self.credentials.clone())?;

                task.progress = 55;
                task.message = format!("Authenticating with {}...", destination.name());
                slot.publish(task);
                if !destination.authenticate(None).await {
                    return Err(DiggerError::NotAuthenticated(destination.name().to_string()).into());
                }

                task.message = format!("Matching tracks on {}...", destination.name());
                slot.publish(task);
                let tracks = task.tracks.clone();
                let (name, description) = (params.name.as_str(), params.description.as_str());
                let (public, min_match_score) = (params.public, params.min_match_score);
                let (tx, rx) = progress::channel();
                let commit = async move {
                    destination
                        .create_playlist(
                            name,
                            description,
                            tracks,
                            public,
                            min_match_score,
                            Some(tx),
                        )
                        .await
                };
                let (playlist, ()) = tokio::join!(commit, forward_progress(slot, rx, 55, 95));
                let playlist = playlist?;
                if !playlist.success {
                    return Err(TaskError::Failed(playlist.message));
                }

                info!(task_id = %task.id, "{}", playlist.message);
                if playlist.csv_data.is_some() {
                    task.csv_data = playlist.csv_data;
                }
                result.playlist_url = Some(playlist.playlist_url);
                result.tracks_added = Some(playlist.tracks_added);
                result.matched_tracks = Some(playlist.added_tracks);
                result.unmatched_tracks = Some(playlist.unmatched_tracks);
                task.message = playlist.message;
            }
            None => {
                task.message = format!(
                    "Found {} tracks for '{}', export ready",
                    result.track_count, result.playlist_name
                );
            }
        }

        task.result = Some(result);
        task.status = TaskStatus::Completed;
        task.progress = 100;
        task.step = 3;
        Ok(())
    }
}
