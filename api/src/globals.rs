use std::sync::{Arc, Once};

use cratedigger::{
    destinations::{spotify::SpotifyFactory, youtube::YouTubeFactory},
    sources::{
        beatport::BeatportSourceBuilder, juno::JunoSourceBuilder,
        traxsource::TraxsourceSourceBuilder, youtube::YouTubeSourceBuilder,
    },
    OrchestratorBuilder, Services, ServicesBuilder,
};
use tracing::{info, warn};

use crate::config::{AppConfig, CONFIG};
use crate::db;
use crate::error::{Result, TaskError};
use crate::models::{SqliteCredentialStore, SqliteCustomSourceStore, SqliteTaskStore};
use crate::tasks::TaskManager;

/// Registers every built-in source and destination.
pub fn build_services(config: &AppConfig) -> Result<Services> {
    let mut youtube = YouTubeSourceBuilder::new();
    if let Some(key) = config.youtube_api_key.as_deref() {
        youtube = youtube.api_key(key);
    } else {
        warn!("YOUTUBE_API_KEY not set, YouTube channels are read from public feeds only");
    }

    ServicesBuilder::new()
        .add_source(BeatportSourceBuilder::new().build()?)
        .add_source(TraxsourceSourceBuilder::new().build()?)
        .add_source(JunoSourceBuilder::new().build()?)
        .add_source(youtube.build()?)
        .add_destination(SpotifyFactory::new(
            config.spotify_client_id.clone(),
            config.spotify_client_secret.clone(),
        ))
        .add_destination(YouTubeFactory::new(
            config.google_client_id.clone(),
            config.google_client_secret.clone(),
        ))
        .default_destination("spotify")
        .build()
        .map_err(|e| TaskError::Config(e.to_string()))
}

/// Task manager wired to the process-wide pool and configuration.
pub async fn task_manager() -> Result<Arc<TaskManager>> {
    let pool = db::pool().await?;
    let services = Arc::new(build_services(&CONFIG)?);
    let orchestrator = OrchestratorBuilder::new()
        .batch_pause(CONFIG.fetch_batch_pause())
        .source_timeout(CONFIG.source_timeout())
        .build();

    let manager = TaskManager::new(
        services,
        Arc::new(SqliteTaskStore::new(pool.clone())),
        Arc::new(SqliteCustomSourceStore::new(pool.clone())),
        Arc::new(SqliteCredentialStore::new(pool.clone())),
    )
    .with_orchestrator(orchestrator)
    .with_deadline(CONFIG.task_deadline());

    Ok(Arc::new(manager))
}

static CLEANUP_TASK_INIT: Once = Once::new();

/// Start the background sweep of expired tasks. Only the first call spawns.
pub fn start_task_cleanup(manager: Arc<TaskManager>) {
    CLEANUP_TASK_INIT.call_once(|| {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(CONFIG.task_cleanup_interval());
            loop {
                interval.tick().await;
                match manager.cleanup_old_tasks(CONFIG.task_max_age()).await {
                    Ok(0) => {}
                    Ok(removed) => info!(removed, "Removed expired tasks"),
                    Err(e) => warn!("Task cleanup failed: {}", e),
                }
            }
        });
        info!(
            "Started task cleanup (interval: {}s, max age: {}s)",
            CONFIG.task_cleanup_interval_secs, CONFIG.task_max_age_secs
        );
    });
}
