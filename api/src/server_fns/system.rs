use axum::{extract::State, Json};
use serde::Serialize;
use serde_json::{json, Value};

use super::AppState;

#[derive(Debug, Serialize)]
pub struct SourceInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub genres: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DestinationInfo {
    pub id: String,
    pub name: String,
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn list_sources(State(state): State<AppState>) -> Json<Vec<SourceInfo>> {
    Json(
        state
            .tasks
            .services()
            .sources()
            .iter()
            .map(|source| SourceInfo {
                id: source.id().to_string(),
                name: source.name().to_string(),
                description: source.description().to_string(),
                genres: source
                    .available_genres()
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            })
            .collect(),
    )
}

pub async fn list_destinations(State(state): State<AppState>) -> Json<Vec<DestinationInfo>> {
    Json(
        state
            .tasks
            .services()
            .list_destinations()
            .into_iter()
            .map(|(id, name)| DestinationInfo {
                id: id.to_string(),
                name: name.to_string(),
            })
            .collect(),
    )
}
