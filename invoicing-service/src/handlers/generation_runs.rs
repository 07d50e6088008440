use crate::models::{GenerationRun, GenerationRunResult, GenerationTrigger};
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    #[serde(default = "default_limit")]
    pub limit: i32,
}

fn default_limit() -> i32 {
    20
}

#[derive(Debug, Serialize)]
pub struct GenerationRunResponse {
    #[serde(flatten)]
    pub run: GenerationRun,
    pub results: Vec<GenerationRunResult>,
}

/// Kick off a generation pass immediately, outside the schedule.
#[tracing::instrument(skip(state))]
pub async fn trigger_generation_run(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<GenerationRun>), AppError> {
    let run = state.generator.run(GenerationTrigger::Manual).await?;
    Ok((StatusCode::CREATED, Json(run)))
}

#[tracing::instrument(skip(state))]
pub async fn list_generation_runs(
    State(state): State<AppState>,
    Query(query): Query<ListRunsQuery>,
) -> Result<Json<Vec<GenerationRun>>, AppError> {
    let runs = state.db.list_generation_runs(query.limit).await?;
    Ok(Json(runs))
}

#[tracing::instrument(skip(state))]
pub async fn get_generation_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<GenerationRunResponse>, AppError> {
    let (run, results) = state
        .db
        .get_generation_run(run_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Generation run {} not found", run_id)))?;

    Ok(Json(GenerationRunResponse { run, results }))
}
