use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use super::{ApiResult, AppState};
use crate::models::CustomSource;

#[derive(Debug, Deserialize)]
pub struct AddSourceRequest {
    #[serde(default)]
    pub name: String,
    pub url: String,
}

pub async fn list_custom_sources(
    State(state): State<AppState>,
    Path(owner): Path<String>,
) -> ApiResult<Json<Vec<CustomSource>>> {
    Ok(Json(state.tasks.custom_sources().list(&owner).await?))
}

pub async fn add_custom_source(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Json(req): Json<AddSourceRequest>,
) -> ApiResult<(StatusCode, Json<CustomSource>)> {
    let source = state
        .tasks
        .custom_sources()
        .add(&owner, &req.name, &req.url)
        .await?;
    Ok((StatusCode::CREATED, Json(source)))
}
