//! Import routes
//!
//! The upload handler persists the file and starts processing
//! asynchronously; everything else is a read or a signal against the
//! job registry.

use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::ingest::{JobOptions, Progress};

use super::super::FeatureState;

/// Create import routes
pub fn routes() -> Router<FeatureState> {
    Router::new()
        .route("/imports", post(create_import))
        .route("/imports/:job_id/progress", get(get_progress))
        .route("/imports/:job_id/cancel", post(cancel_import))
        .route("/imports/:job_id/failures", get(download_failures))
}

/// Create an import job from a multipart upload
///
/// POST /imports
/// Parts: `file` (required), `dry_run` (optional bool), `batch_size`
/// (optional int > 0).
async fn create_import(
    State(state): State<FeatureState>,
    mut multipart: Multipart,
) -> AppResult<Response> {
    let mut file_bytes: Option<axum::body::Bytes> = None;
    let mut options = JobOptions::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                file_bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {e}")))?,
                );
            },
            Some("dry_run") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Invalid dry_run field: {e}")))?;
                options.dry_run = text
                    .trim()
                    .parse()
                    .map_err(|_| AppError::BadRequest("dry_run must be true or false".into()))?;
            },
            Some("batch_size") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Invalid batch_size field: {e}")))?;
                let batch_size: usize = text
                    .trim()
                    .parse()
                    .map_err(|_| AppError::BadRequest("batch_size must be a positive integer".into()))?;
                if batch_size == 0 {
                    return Err(AppError::BadRequest(
                        "batch_size must be greater than 0".into(),
                    ));
                }
                options.batch_size = Some(batch_size);
            },
            _ => {},
        }
    }

    let file_bytes =
        file_bytes.ok_or_else(|| AppError::BadRequest("A 'file' part is required".into()))?;
    if file_bytes.is_empty() {
        return Err(AppError::BadRequest("Uploaded file is empty".into()));
    }

    let job = state.registry.create_job(options).await;

    tokio::fs::create_dir_all(&state.upload_dir).await?;
    let path = state.upload_dir.join(format!("{}.csv", job.id));
    if let Err(e) = tokio::fs::write(&path, &file_bytes).await {
        state.registry.cleanup(job.id).await;
        return Err(e.into());
    }

    // Processing runs detached; the caller polls progress by job id. The
    // processor reports its own failures through the progress channel.
    let processor = job.processor.clone();
    tokio::spawn(async move {
        let _ = processor.process_file(&path).await;
    });

    Ok((StatusCode::ACCEPTED, Json(json!({ "job_id": job.id }))).into_response())
}

/// Latest progress snapshot for a job
///
/// GET /imports/:job_id/progress
async fn get_progress(
    State(state): State<FeatureState>,
    Path(job_id): Path<Uuid>,
) -> AppResult<Json<Progress>> {
    state
        .registry
        .get_progress(job_id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No import job {job_id}")))
}

/// Request cooperative cancellation
///
/// POST /imports/:job_id/cancel
async fn cancel_import(
    State(state): State<FeatureState>,
    Path(job_id): Path<Uuid>,
) -> Json<serde_json::Value> {
    let cancelled = state.registry.cancel_job(job_id).await;
    Json(json!({ "job_id": job_id, "cancelled": cancelled }))
}

/// Download the failed-record artifact
///
/// GET /imports/:job_id/failures
async fn download_failures(
    State(state): State<FeatureState>,
    Path(job_id): Path<Uuid>,
) -> AppResult<Response> {
    let processor = state
        .registry
        .get_processor(job_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("No import job {job_id}")))?;

    let path = processor
        .failed_artifact()
        .ok_or_else(|| AppError::NotFound("No failed records for this job".into()))?;

    let content = tokio::fs::read(&path).await?;
    Ok((
        [(header::CONTENT_TYPE, "text/csv")],
        content,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_import_routes_exist() {
        let _router = routes();
    }
}
