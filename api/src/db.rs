use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tokio::sync::OnceCell;
use tracing::info;

use crate::config::CONFIG;
use crate::error::Result;

static DB: OnceCell<SqlitePool> = OnceCell::const_new();

/// Open (creating the file when needed) and migrate a SQLite database.
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    if let Some(path_str) = database_url.strip_prefix("sqlite:") {
        let path = std::path::Path::new(path_str.trim_start_matches("//"));
        if !path_str.contains(":memory:") && !path.exists() {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::File::create(path).await?;
        }
    }

    // every in-memory connection is its own database, keep exactly one alive
    let pool = if database_url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(database_url)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?
    };

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database ready at {}", database_url);
    Ok(pool)
}

/// Process-wide pool for [`CONFIG`]'s database, opened on first use.
pub async fn pool() -> Result<&'static SqlitePool> {
    DB.get_or_try_init(|| connect(CONFIG.database_url())).await
}
