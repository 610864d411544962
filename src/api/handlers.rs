use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{
    db::blob::keys::{PROCESSED_PREFIX, RAW_PREFIX},
    error::{AppError, AppResult},
    models::RecommendationRow,
    services::{AppendReport, BackfillReport, BootstrapReport, PipelineReport},
};

use super::AppState;

// Request/Response types

#[derive(Debug, Deserialize)]
pub struct BackfillParams {
    pub weeks_back: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct RecommendationsResponse {
    pub key: Option<String>,
    pub count: usize,
    pub recommendations: Vec<RecommendationRow>,
}

#[derive(Debug, Serialize)]
pub struct FilesResponse {
    pub prefix: String,
    pub files: Vec<String>,
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Runs the full weekly pipeline
pub async fn run_pipeline(State(state): State<AppState>) -> AppResult<Json<PipelineReport>> {
    let report = state.pipeline.run().await?;
    Ok(Json(report))
}

/// Appends the latest weekly snapshot to the history
pub async fn append_history(State(state): State<AppState>) -> AppResult<Json<AppendReport>> {
    let report = state.pipeline.history().append_latest_week().await?;
    Ok(Json(report))
}

/// Rebuilds the history from the historical snapshots
pub async fn bootstrap_history(
    State(state): State<AppState>,
) -> AppResult<Json<BootstrapReport>> {
    let report = state.pipeline.history().bootstrap().await?;
    Ok(Json(report))
}

/// Fetches past weeks of the list into the historical prefix
pub async fn backfill_history(
    State(state): State<AppState>,
    Query(params): Query<BackfillParams>,
) -> AppResult<Json<BackfillReport>> {
    let weeks_back = params.weeks_back.unwrap_or(state.config.history_weeks_back);
    if weeks_back == 0 {
        return Err(AppError::InvalidInput(
            "weeks_back must be at least 1".to_string(),
        ));
    }

    let report = state
        .pipeline
        .fetcher()
        .fetch_historical(weeks_back)
        .await?;
    Ok(Json(report))
}

/// Rebuilds and persists the recommendation table
pub async fn rebuild_recommendations(
    State(state): State<AppState>,
) -> AppResult<Json<RecommendationsResponse>> {
    let output = state.pipeline.recommendations().rebuild().await?;
    Ok(Json(RecommendationsResponse {
        key: Some(output.key),
        count: output.table.len(),
        recommendations: output.table.rows().to_vec(),
    }))
}

/// Current recommendations derived from the stored history
pub async fn get_recommendations(
    State(state): State<AppState>,
) -> AppResult<Json<RecommendationsResponse>> {
    let table = state.pipeline.recommendations().current().await?;
    Ok(Json(RecommendationsResponse {
        key: None,
        count: table.len(),
        recommendations: table.rows().to_vec(),
    }))
}

async fn list_prefix(state: &AppState, prefix: &str) -> AppResult<Json<FilesResponse>> {
    let files = state.store().list(prefix).await?;
    Ok(Json(FilesResponse {
        prefix: prefix.to_string(),
        files,
    }))
}

pub async fn list_files(State(state): State<AppState>) -> AppResult<Json<FilesResponse>> {
    list_prefix(&state, "").await
}

pub async fn list_raw_files(State(state): State<AppState>) -> AppResult<Json<FilesResponse>> {
    list_prefix(&state, RAW_PREFIX).await
}

pub async fn list_processed_files(
    State(state): State<AppState>,
) -> AppResult<Json<FilesResponse>> {
    list_prefix(&state, PROCESSED_PREFIX).await
}
