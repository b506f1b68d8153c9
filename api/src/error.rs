use cratedigger::DiggerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Digger(#[from] DiggerError),

    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Terminal task failure, the message is shown as is.
    #[error("{0}")]
    Failed(String),
}

pub type Result<T> = std::result::Result<T, TaskError>;
