use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::playlist::MatchResult;
use crate::track::Track;

/// Task lifecycle. `Completed` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Error,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Error => "error",
        }
    }
}

impl From<String> for TaskStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending" | "processing" => TaskStatus::Pending,
            "running" => TaskStatus::Running,
            "completed" | "complete" => TaskStatus::Completed,
            _ => TaskStatus::Error,
        }
    }
}

/// Which source set a task draws from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceSelection {
    Predefined,
    Custom,
    #[default]
    Both,
}

impl SourceSelection {
    pub fn includes_predefined(&self) -> bool {
        matches!(self, SourceSelection::Predefined | SourceSelection::Both)
    }

    pub fn includes_custom(&self) -> bool {
        matches!(self, SourceSelection::Custom | SourceSelection::Both)
    }
}

impl From<&str> for SourceSelection {
    fn from(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "predefined" => SourceSelection::Predefined,
            "custom" => SourceSelection::Custom,
            _ => SourceSelection::Both,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// A registered provider adapter, `id` is its registry key.
    Provider,
    Playlist,
    Channel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub id: String,
    pub name: String,
    pub kind: SourceKind,
    #[serde(default)]
    pub custom: bool,
    #[serde(default)]
    pub url: Option<String>,
}

impl SourceDescriptor {
    pub fn provider(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: SourceKind::Provider,
            custom: false,
            url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskParams {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub genre: Option<String>,
    pub days: u32,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub source_selection: SourceSelection,
    pub limit: usize,
    /// Destination id to commit to; `None` stops after the export.
    #[serde(default)]
    pub destination: Option<String>,
    pub min_match_score: f64,
}

/// Summary stored on a completed task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub playlist_name: String,
    pub track_count: usize,
    pub tracks: Vec<Track>,
    pub sources_used: Vec<String>,
    pub genre: Option<String>,
    pub days_searched: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playlist_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracks_added: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_tracks: Option<Vec<MatchResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unmatched_tracks: Option<Vec<MatchResult>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub owner_id: String,
    pub status: TaskStatus,
    pub progress: u8,
    pub step: u32,
    pub message: String,
    #[serde(default)]
    pub error: Option<String>,
    pub params: TaskParams,
    #[serde(default)]
    pub sources: Vec<SourceDescriptor>,
    #[serde(default)]
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub result: Option<TaskResult>,
    #[serde(default)]
    pub csv_data: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(id: String, owner_id: String, params: TaskParams) -> Self {
        let now = Utc::now();
        Self {
            id,
            owner_id,
            status: TaskStatus::Pending,
            progress: 0,
            step: 0,
            message: "Initializing playlist creation...".to_string(),
            error: None,
            params,
            sources: Vec::new(),
            tracks: Vec::new(),
            result: None,
            csv_data: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.status = TaskStatus::Error;
        self.error = Some(message.clone());
        self.message = message;
        self.touch();
    }
}

/// Read-only view handed to pollers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: String,
    pub owner_id: String,
    pub status: TaskStatus,
    pub progress: u8,
    pub step: u32,
    pub message: String,
    pub error: Option<String>,
    pub params: TaskParams,
    pub sources: Vec<SourceDescriptor>,
    pub track_count: usize,
    pub result: Option<TaskResult>,
    pub has_csv: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Task> for TaskSnapshot {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            owner_id: task.owner_id.clone(),
            status: task.status,
            progress: task.progress,
            step: task.step,
            message: task.message.clone(),
            error: task.error.clone(),
            params: task.params.clone(),
            sources: task.sources.clone(),
            track_count: task.tracks.len(),
            result: task.result.clone(),
            has_csv: task.csv_data.is_some(),
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_legacy_names() {
        assert_eq!(TaskStatus::from("processing".to_string()), TaskStatus::Pending);
        assert_eq!(TaskStatus::from("complete".to_string()), TaskStatus::Completed);
        assert!(TaskStatus::Error.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }

    #[test]
    fn selection_defaults_to_both() {
        let selection = SourceSelection::from("whatever");
        assert!(selection.includes_custom() && selection.includes_predefined());
        assert!(!SourceSelection::from("Predefined").includes_custom());
    }
}
