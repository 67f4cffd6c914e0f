//! Axum route handlers for the Generation API. Thin pass-throughs over the
//! coordinator: request validation and ownership live there, the handlers
//! only translate between HTTP and coordinator calls.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::generation::{DocumentResult, DocumentType, GenerationRecord};
use crate::models::job::JobRef;
use crate::pipeline::context::GenerationOptions;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StartGenerationRequest {
    pub user_id: Uuid,
    pub profile_id: Uuid,
    pub job_posting_id: Option<Uuid>,
    pub job_description_id: Option<Uuid>,
    /// Degrade to deterministic outputs instead of failing when the model
    /// provider stays down.
    #[serde(default)]
    pub fallback_enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct RegenerateRequest {
    pub user_id: Uuid,
    /// Defaults to both document types when omitted.
    pub document_types: Option<Vec<DocumentType>>,
    #[serde(default)]
    pub fallback_enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ContentQuery {
    pub user_id: Uuid,
    pub document_type: DocumentType,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct GenerationResponse {
    pub generation: GenerationRecord,
}

#[derive(Debug, Serialize)]
pub struct ListGenerationsResponse {
    pub generations: Vec<GenerationRecord>,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

#[derive(Debug, Serialize)]
pub struct ContentResponse {
    pub document: DocumentResult,
}

fn job_ref(request: &StartGenerationRequest) -> Result<JobRef, AppError> {
    JobRef::from_ids(request.job_posting_id, request.job_description_id).ok_or_else(|| {
        AppError::Validation(
            "exactly one of job_posting_id or job_description_id is required".to_string(),
        )
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/generations/resume
///
/// Accepts a resume generation and returns the PENDING record immediately;
/// the pipeline runs in the background.
pub async fn handle_start_resume(
    State(state): State<AppState>,
    Json(request): Json<StartGenerationRequest>,
) -> Result<Json<GenerationResponse>, AppError> {
    let job = job_ref(&request)?;
    let mut options = GenerationOptions::resume();
    options.fallback_enabled = request.fallback_enabled;

    let generation = state
        .coordinator
        .start(request.user_id, request.profile_id, job, options)
        .await?;
    Ok(Json(GenerationResponse { generation }))
}

/// POST /api/v1/generations/cover-letter
pub async fn handle_start_cover_letter(
    State(state): State<AppState>,
    Json(request): Json<StartGenerationRequest>,
) -> Result<Json<GenerationResponse>, AppError> {
    let job = job_ref(&request)?;
    let mut options = GenerationOptions::cover_letter();
    options.fallback_enabled = request.fallback_enabled;

    let generation = state
        .coordinator
        .start(request.user_id, request.profile_id, job, options)
        .await?;
    Ok(Json(GenerationResponse { generation }))
}

/// GET /api/v1/generations/:id
pub async fn handle_get_generation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<UserQuery>,
) -> Result<Json<GenerationResponse>, AppError> {
    let generation = state.coordinator.status(query.user_id, id).await?;
    Ok(Json(GenerationResponse { generation }))
}

/// GET /api/v1/generations
///
/// All generations for the user's profiles, newest first.
pub async fn handle_list_generations(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<ListGenerationsResponse>, AppError> {
    let generations = state.coordinator.list(query.user_id).await?;
    Ok(Json(ListGenerationsResponse { generations }))
}

/// POST /api/v1/generations/:id/cancel
///
/// `cancelled: false` means there was nothing to cancel — unknown id,
/// already-terminal run, or a run that finished first. Never an error.
pub async fn handle_cancel_generation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<CancelRequest>,
) -> Result<Json<CancelResponse>, AppError> {
    let cancelled = state.coordinator.cancel(request.user_id, id).await?;
    Ok(Json(CancelResponse { cancelled }))
}

/// POST /api/v1/generations/:id/regenerate
///
/// Starts a fresh run against the same profile and job; the source record is
/// left untouched.
pub async fn handle_regenerate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<RegenerateRequest>,
) -> Result<Json<GenerationResponse>, AppError> {
    let options = GenerationOptions {
        document_types: request
            .document_types
            .unwrap_or_else(|| GenerationOptions::both().document_types),
        fallback_enabled: request.fallback_enabled,
    };

    let generation = state
        .coordinator
        .regenerate(request.user_id, id, options)
        .await?;
    Ok(Json(GenerationResponse { generation }))
}

/// GET /api/v1/generations/:id/content?document_type=resume
pub async fn handle_get_content(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ContentQuery>,
) -> Result<Json<ContentResponse>, AppError> {
    let document = state
        .coordinator
        .content(query.user_id, id, query.document_type)
        .await?;
    Ok(Json(ContentResponse { document }))
}
