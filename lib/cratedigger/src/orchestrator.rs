//! Fetch from every source, aggregate, then hand the result to a destination.

use futures::future::join_all;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use shared::{PlaylistResult, Track};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{DiggerError, Result};
use crate::progress::{report, ProgressSender};
use crate::{MusicSource, PlaylistDestination};

const DEFAULT_BATCH_PAUSE: Duration = Duration::from_millis(500);
const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(120);
const OVERSAMPLE: usize = 2;
const MIN_PER_SOURCE: usize = 10;

/// What to build and where.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRequest {
    pub name: String,
    pub description: String,
    pub genre: Option<String>,
    pub days: u32,
    pub public: bool,
    pub limit: usize,
    pub min_match_score: f64,
}

impl Default for SyncRequest {
    fn default() -> Self {
        Self {
            name: "New Music {date}".to_string(),
            description: String::new(),
            genre: None,
            days: 14,
            public: false,
            limit: 50,
            min_match_score: 0.7,
        }
    }
}

impl SyncRequest {
    pub fn validate(&self) -> Result<()> {
        if self.limit == 0 {
            return Err(DiggerError::InvalidParameter(
                "limit must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_match_score) {
            return Err(DiggerError::InvalidParameter(format!(
                "min_match_score must be between 0 and 1, got {}",
                self.min_match_score
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Orchestrator {
    batch_pause: Duration,
    source_timeout: Duration,
    seed: Option<u64>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        OrchestratorBuilder::new().build()
    }
}

#[derive(Default)]
pub struct OrchestratorBuilder {
    batch_pause: Option<Duration>,
    source_timeout: Option<Duration>,
    seed: Option<u64>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Pause between two fan-out batches.
    pub fn batch_pause(mut self, pause: Duration) -> Self {
        self.batch_pause = Some(pause);
        self
    }

    pub fn source_timeout(mut self, timeout: Duration) -> Self {
        self.source_timeout = Some(timeout);
        self
    }

    /// Fixed seed for down-sampling.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> Orchestrator {
        Orchestrator {
            batch_pause: self.batch_pause.unwrap_or(DEFAULT_BATCH_PAUSE),
            source_timeout: self.source_timeout.unwrap_or(DEFAULT_SOURCE_TIMEOUT),
            seed: self.seed,
        }
    }
}

/// Sources fetched concurrently per batch.
fn fan_out(source_count: usize) -> usize {
    match source_count {
        0..=4 => source_count.max(1),
        5..=10 => 3,
        _ => 5,
    }
}

/// Tracks requested from each source.
pub fn per_source_quota(limit: usize, source_count: usize) -> usize {
    limit
        .saturating_mul(OVERSAMPLE)
        .div_ceil(source_count.max(1))
        .max(MIN_PER_SOURCE)
}

/// Drop tracks whose non-empty `source_url` was already seen.
fn dedup(tracks: Vec<Track>) -> Vec<Track> {
    let mut seen = HashSet::new();
    tracks
        .into_iter()
        .filter(|t| t.source_url.is_empty() || seen.insert(t.source_url.clone()))
        .collect()
}

/// Uniformly keep `limit` tracks, preserving their relative order.
fn downsample<R: Rng + ?Sized>(tracks: Vec<Track>, limit: usize, rng: &mut R) -> Vec<Track> {
    if tracks.len() <= limit {
        return tracks;
    }
    let mut keep = vec![false; tracks.len()];
    for i in index::sample(rng, tracks.len(), limit).into_vec() {
        keep[i] = true;
    }
    tracks
        .into_iter()
        .zip(keep)
        .filter_map(|(track, kept)| kept.then_some(track))
        .collect()
}

impl Orchestrator {
    fn sample(&self, tracks: Vec<Track>, limit: usize) -> Vec<Track> {
        match self.seed {
            Some(seed) => downsample(tracks, limit, &mut StdRng::seed_from_u64(seed)),
            None => downsample(tracks, limit, &mut rand::rng()),
        }
    }

    async fn fetch_one(
        &self,
        source: &dyn MusicSource,
        genre: Option<&str>,
        days: u32,
        quota: usize,
    ) -> Result<Vec<Track>> {
        let name = source.name().to_string();
        match tokio::time::timeout(self.source_timeout, source.get_tracks(days, genre, quota)).await {
            Ok(Ok(tracks)) => Ok(tracks
                .into_iter()
                .map(|mut track| {
                    track.source = name.clone();
                    track
                })
                .collect()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(DiggerError::Timeout {
                operation: format!("Fetching from {name}"),
            }),
        }
    }

    /// Fetch from every source with bounded parallelism. A failing source is
    /// skipped, only an empty aggregate is an error.
    pub async fn aggregate(
        &self,
        sources: &[Arc<dyn MusicSource>],
        genre: Option<&str>,
        days: u32,
        limit: usize,
        progress: Option<&ProgressSender>,
    ) -> Result<Vec<Track>> {
        if sources.is_empty() {
            return Err(DiggerError::NoSources);
        }
        if limit == 0 {
            return Err(DiggerError::InvalidParameter(
                "limit must be greater than 0".to_string(),
            ));
        }

        let total = sources.len();
        let quota = per_source_quota(limit, total);
        let batch_size = fan_out(total);
        info!(
            "Fetching up to {} tracks from each of {} sources ({} at a time)",
            quota, total, batch_size
        );
        report(progress, 0, total, format!("Fetching tracks from {total} sources"));

        let mut collected = Vec::new();
        let mut done = 0;
        for (batch_index, batch) in sources.chunks(batch_size).enumerate() {
            if batch_index > 0 && !self.batch_pause.is_zero() {
                tokio::time::sleep(self.batch_pause).await;
            }
            let results = join_all(
                batch
                    .iter()
                    .map(|source| self.fetch_one(source.as_ref(), genre, days, quota)),
            )
            .await;

            for (source, result) in batch.iter().zip(results) {
                done += 1;
                match result {
                    Ok(tracks) => {
                        info!("Got {} tracks from {}", tracks.len(), source.name());
                        report(
                            progress,
                            done,
                            total,
                            format!("Got {} tracks from {}", tracks.len(), source.name()),
                        );
                        collected.extend(tracks);
                    }
                    Err(e) => {
                        warn!("Skipping source {}: {}", source.name(), e);
                        report(progress, done, total, format!("Skipped {}: {}", source.name(), e));
                    }
                }
            }
        }

        let unique = dedup(collected);
        if unique.is_empty() {
            return Err(DiggerError::NoTracks);
        }
        let found = unique.len();
        let tracks = self.sample(unique, limit);
        info!("Aggregated {} unique tracks, keeping {}", found, tracks.len());
        Ok(tracks)
    }

    /// Authenticate, fetch and commit one playlist.
    pub async fn synchronize(
        &self,
        sources: &[Arc<dyn MusicSource>],
        destination: Option<Arc<dyn PlaylistDestination>>,
        request: &SyncRequest,
        progress: Option<ProgressSender>,
    ) -> Result<PlaylistResult> {
        if sources.is_empty() {
            return Err(DiggerError::NoSources);
        }
        let destination = destination.ok_or(DiggerError::NoDestination)?;
        request.validate()?;

        if !destination.authenticate(None).await {
            return Err(DiggerError::AuthenticationFailed {
                destination: destination.name().to_string(),
                reason: "credentials missing or rejected".to_string(),
            });
        }

        let tracks = self
            .aggregate(
                sources,
                request.genre.as_deref(),
                request.days,
                request.limit,
                progress.as_ref(),
            )
            .await?;

        info!(
            "Creating playlist '{}' on {} from {} tracks",
            request.name,
            destination.name(),
            tracks.len()
        );
        destination
            .create_playlist(
                &request.name,
                &request.description,
                tracks,
                request.public,
                request.min_match_score,
                progress,
            )
            .await
    }
}
