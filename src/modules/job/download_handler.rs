use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
};
use tokio_util::io::ReaderStream;
use tracing::info;

use super::service::{parse_job_id, JobService};
use crate::common::error::JobError;
use crate::common::response::{ApiError, ApiResponse};
use crate::state::AppState;

/// Download the processed video
///
/// Streams the output file; the suggested filename is the original stem with
/// `_1080p` appended.
#[utoipa::path(
    get,
    path = "/api/download/{id}",
    params(("id" = String, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Processed video stream (video/mp4)"),
        (status = 400, description = "Video not ready for download", body = ApiResponse<String>),
        (status = 404, description = "Video not found", body = ApiResponse<String>)
    ),
    tag = "Videos"
)]
pub async fn download_video(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_job_id(&id)?;
    let (job, path) = JobService::prepare_download(state, id).await?;

    let file = tokio::fs::File::open(&path).await.map_err(JobError::from)?;
    let length = file.metadata().await.map_err(JobError::from)?.len();

    let filename = job.download_filename().replace(['"', '\\'], "_");
    info!("📤 Serving job {} as {} ({} bytes)", job.id, filename, length);

    let body = Body::from_stream(ReaderStream::new(file));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(header::CONTENT_LENGTH, length)
        .header(header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", filename))
        .body(body)
        .map_err(|e| ApiError(e.to_string(), StatusCode::INTERNAL_SERVER_ERROR))
}
