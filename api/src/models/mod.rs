pub mod credential;
pub mod custom_source;
pub mod task;

pub use credential::SqliteCredentialStore;
pub use custom_source::{CustomSource, CustomSourceStore, SqliteCustomSourceStore};
pub use task::{SqliteTaskStore, TaskStore};

use chrono::{DateTime, Utc};

pub(crate) fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}
