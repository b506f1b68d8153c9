//! Fixtures shared by the task and router tests.

use async_trait::async_trait;
use cratedigger::{
    CreatedPlaylist, CredentialStore, Credentials, DestinationFactory, MemoryCredentialStore,
    MusicSource, OrchestratorBuilder, PlaylistDestination, Services, ServicesBuilder,
};
use shared::task::{SourceDescriptor, SourceSelection, TaskParams};
use shared::{MatchResult, Track};
use std::sync::Arc;
use std::time::Duration;

use crate::db;
use crate::models::{
    CustomSourceStore, SqliteCustomSourceStore, SqliteTaskStore, TaskStore,
};
use crate::tasks::TaskManager;

pub struct StaticSource {
    id: &'static str,
    name: &'static str,
    delay: Duration,
}

#[async_trait]
impl MusicSource for StaticSource {
    fn id(&self) -> &'static str {
        self.id
    }

    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &'static str {
        "Two fixed tracks"
    }

    async fn get_tracks(&self, _days: u32, _genre: Option<&str>, limit: usize) -> cratedigger::Result<Vec<Track>> {
        tokio::time::sleep(self.delay).await;
        Ok((0..2)
            .map(|i| {
                Track::new(
                    format!("{} Tune {i}", self.name),
                    "Static Act",
                    self.name,
                    format!("https://{}/{i}", self.id),
                )
            })
            .take(limit)
            .collect())
    }

    async fn get_tracks_from_sources(
        &self,
        sources: &[SourceDescriptor],
        _days: u32,
        _limit: usize,
    ) -> cratedigger::Result<Vec<Track>> {
        Ok(sources
            .iter()
            .map(|s| Track::new(format!("{} Upload", s.name), "Channel Act", "YouTube", format!("https://custom/{}", s.id)))
            .collect())
    }
}

/// Accepts every track with a perfect score.
pub struct StaticDestination {
    authenticated: bool,
}

#[async_trait]
impl PlaylistDestination for StaticDestination {
    fn id(&self) -> &'static str {
        "static"
    }

    fn name(&self) -> &'static str {
        "Static"
    }

    fn max_batch_size(&self) -> usize {
        50
    }

    async fn authenticate(&self, _credentials: Option<Credentials>) -> bool {
        self.authenticated
    }

    async fn search_track(&self, track: &Track) -> cratedigger::Result<MatchResult> {
        Ok(MatchResult::candidate(
            track.clone(),
            track.source_url.clone(),
            track.source_url.clone(),
            track.title.clone(),
            track.artist.clone(),
            1.0,
        )
        .accept_if(0.5))
    }

    async fn create_empty_playlist(&self, _name: &str, _description: &str, _public: bool) -> cratedigger::Result<CreatedPlaylist> {
        Ok(CreatedPlaylist {
            id: "1".into(),
            url: "https://static/playlist/1".into(),
        })
    }

    async fn add_tracks(&self, _playlist_id: &str, match_ids: &[String]) -> cratedigger::Result<usize> {
        Ok(match_ids.len())
    }
}

pub struct StaticFactory {
    id: &'static str,
    authenticated: bool,
}

impl DestinationFactory for StaticFactory {
    fn id(&self) -> &'static str {
        self.id
    }

    fn name(&self) -> &'static str {
        "Static"
    }

    fn for_owner(&self, _owner_id: &str, _store: Arc<dyn CredentialStore>) -> cratedigger::Result<Arc<dyn PlaylistDestination>> {
        Ok(Arc::new(StaticDestination {
            authenticated: self.authenticated,
        }))
    }
}

/// Two sources (`alpha` and `youtube`) plus an accepting `static` and a
/// rejecting `locked` destination.
pub fn services(delay: Duration) -> Arc<Services> {
    let services = ServicesBuilder::new()
        .add_source(StaticSource {
            id: "alpha",
            name: "Alpha",
            delay,
        })
        .add_source(StaticSource {
            id: "youtube",
            name: "YouTube",
            delay,
        })
        .add_destination(StaticFactory {
            id: "static",
            authenticated: true,
        })
        .add_destination(StaticFactory {
            id: "locked",
            authenticated: false,
        })
        .build()
        .unwrap();
    Arc::new(services)
}

pub struct Stores {
    pub tasks: Arc<dyn TaskStore>,
    pub custom_sources: Arc<dyn CustomSourceStore>,
    pub credentials: Arc<dyn CredentialStore>,
}

/// In-memory stores; `alice` owns one custom playlist.
pub async fn stores() -> Stores {
    let pool = db::connect("sqlite::memory:").await.unwrap();
    let custom_sources = SqliteCustomSourceStore::new(pool.clone());
    custom_sources
        .add("alice", "Label picks", "https://www.youtube.com/playlist?list=PLalice")
        .await
        .unwrap();
    Stores {
        tasks: Arc::new(SqliteTaskStore::new(pool)),
        custom_sources: Arc::new(custom_sources),
        credentials: Arc::new(MemoryCredentialStore::new()),
    }
}

pub fn manager_with(services: Arc<Services>, stores: &Stores) -> TaskManager {
    TaskManager::new(
        services,
        stores.tasks.clone(),
        stores.custom_sources.clone(),
        stores.credentials.clone(),
    )
    .with_orchestrator(
        OrchestratorBuilder::new()
            .batch_pause(Duration::ZERO)
            .seed(1)
            .build(),
    )
}

pub async fn manager(services: Arc<Services>) -> TaskManager {
    manager_with(services, &stores().await)
}

pub fn params(selection: SourceSelection, destination: Option<&str>) -> TaskParams {
    TaskParams {
        name: "New Music {date}".into(),
        description: String::new(),
        genre: None,
        days: 7,
        public: false,
        source_selection: selection,
        limit: 10,
        destination: destination.map(str::to_string),
        min_match_score: 0.7,
    }
}
