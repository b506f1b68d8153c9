use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared::task::{SourceSelection, TaskParams, TaskSnapshot};

use super::{ApiError, ApiResult, AppState};
use crate::config::CONFIG;

fn default_days() -> u32 {
    14
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub owner_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default = "default_days")]
    pub days: u32,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub source_selection: SourceSelection,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub min_match_score: Option<f64>,
}

impl From<CreateTaskRequest> for TaskParams {
    fn from(req: CreateTaskRequest) -> Self {
        TaskParams {
            name: req.name,
            description: req.description,
            genre: req.genre.filter(|g| !g.trim().is_empty()),
            days: req.days,
            public: req.public,
            source_selection: req.source_selection,
            limit: req.limit.unwrap_or(CONFIG.default_limit),
            destination: req.destination.filter(|d| !d.trim().is_empty()),
            min_match_score: req
                .min_match_score
                .unwrap_or(CONFIG.default_min_match_score),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AdvanceResponse {
    pub updated: bool,
    pub task: TaskSnapshot,
}

pub async fn create_task(
    State(state): State<AppState>,
    Json(req): Json<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let owner_id = req.owner_id.clone();
    let id = state.tasks.create_new_task(&owner_id, req.into()).await?;
    Ok((StatusCode::CREATED, Json(json!({ "task_id": id }))))
}

async fn snapshot(state: &AppState, id: &str) -> ApiResult<TaskSnapshot> {
    state
        .tasks
        .get_task(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("task {id}")))
}

pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<TaskSnapshot>> {
    Ok(Json(snapshot(&state, &id).await?))
}

pub async fn advance_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AdvanceResponse>> {
    let updated = state.tasks.advance_one_step(&id).await?;
    let task = snapshot(&state, &id).await?;
    Ok(Json(AdvanceResponse { updated, task }))
}

pub async fn cancel_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let cancelled = state.tasks.cancel_task(&id).await?;
    let task = snapshot(&state, &id).await?;
    Ok(Json(json!({ "cancelled": cancelled, "task": task })))
}

pub async fn download_csv(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let csv = state
        .tasks
        .csv(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no CSV export for task {id}")))?;
    let disposition = format!("attachment; filename=\"playlist-{id}.csv\"");
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    ))
}
