//! Centralized configuration management.
//!
//! All environment variables are read once through this module, so the rest of
//! the service never calls `env::var()` directly.

use std::sync::LazyLock;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite database URL (default: "sqlite:cratedigger.db")
    pub database_url: String,
    /// HTTP server port (default: 9765)
    pub port: u16,
    /// HTTP server bind address (default: "0.0.0.0")
    pub ip: String,
    /// YouTube Data API key; without it uploads are scraped
    pub youtube_api_key: Option<String>,
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
    pub default_limit: usize,
    pub default_min_match_score: f64,
    /// Pause between source fan-out batches, in milliseconds
    pub fetch_batch_pause_ms: u64,
    pub source_timeout_secs: u64,
    /// Completed or abandoned tasks older than this are dropped
    pub task_max_age_secs: u64,
    /// A task still running after this long is failed on its next advance
    pub task_deadline_secs: u64,
    pub task_cleanup_interval_secs: u64,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    var(name).and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: var("DATABASE_URL").unwrap_or_else(|| "sqlite:cratedigger.db".to_string()),
            port: parsed("PORT", 9765),
            ip: var("IP").unwrap_or_else(|| "0.0.0.0".to_string()),
            youtube_api_key: var("YOUTUBE_API_KEY"),
            spotify_client_id: var("SPOTIFY_CLIENT_ID"),
            spotify_client_secret: var("SPOTIFY_CLIENT_SECRET"),
            google_client_id: var("GOOGLE_CLIENT_ID"),
            google_client_secret: var("GOOGLE_CLIENT_SECRET"),
            default_limit: parsed("DEFAULT_LIMIT", 50),
            default_min_match_score: parsed("DEFAULT_MIN_MATCH_SCORE", 0.7),
            fetch_batch_pause_ms: parsed("FETCH_BATCH_PAUSE_MS", 500),
            source_timeout_secs: parsed("SOURCE_TIMEOUT_SECS", 120),
            task_max_age_secs: parsed("TASK_MAX_AGE_SECS", 3600),
            task_deadline_secs: parsed("TASK_DEADLINE_SECS", 1800),
            task_cleanup_interval_secs: parsed("TASK_CLEANUP_INTERVAL_SECS", 300),
        }
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn fetch_batch_pause(&self) -> Duration {
        Duration::from_millis(self.fetch_batch_pause_ms)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }

    pub fn task_max_age(&self) -> Duration {
        Duration::from_secs(self.task_max_age_secs)
    }

    pub fn task_deadline(&self) -> Duration {
        Duration::from_secs(self.task_deadline_secs)
    }

    pub fn task_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.task_cleanup_interval_secs.max(1))
    }
}

/// Global application configuration singleton.
/// Loaded once at startup from environment variables.
pub static CONFIG: LazyLock<AppConfig> = LazyLock::new(AppConfig::from_env);
