use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tracing::info;
use validator::Validate;

use super::dto::{JobResponse, ListJobsQuery, ProcessAccepted, ServiceInfo};
use super::service::{parse_job_id, JobService};
use crate::common::error::JobError;
use crate::common::response::{ApiError, ApiResponse, ApiSuccess};
use crate::common::upload::{is_video, resolve_media_type};
use crate::state::AppState;

const FILE_FIELDS: [&str; 2] = ["file", "video"];

#[utoipa::path(
    get,
    path = "/api/",
    responses((status = 200, description = "Service banner", body = ServiceInfo)),
    tag = "Videos"
)]
pub async fn root() -> impl IntoResponse {
    Json(ServiceInfo {
        message: "QuickScale 1080 API".to_string(),
    })
}

/// Upload a video
///
/// Streams the `file` part to disk, probes it and records an `uploaded` job.
#[utoipa::path(
    post,
    path = "/api/upload",
    request_body(content = String, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Video uploaded", body = JobResponse),
        (status = 400, description = "Missing, empty or non-video file", body = ApiResponse<String>),
        (status = 500, description = "Storage failure", body = ApiResponse<String>)
    ),
    tag = "Videos"
)]
pub async fn upload_video(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<JobResponse>, ApiError> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(ApiError(format!("Malformed multipart body: {}", e.body_text()), e.status())),
        };

        let name = field.name().unwrap_or("").to_string();
        if !FILE_FIELDS.contains(&name.as_str()) {
            continue;
        }

        let file_name = field.file_name().unwrap_or("").to_string();
        let media_type = match resolve_media_type(field.content_type(), &file_name) {
            Some(m) if is_video(&m) => m,
            other => {
                let declared = other.map(|m| m.to_string()).unwrap_or_else(|| "unknown".to_string());
                return Err(JobError::InvalidInput(format!(
                    "Invalid content type {}: only video/* allowed",
                    declared
                ))
                .into());
            }
        };

        info!("Starting upload: {} ({})", file_name, media_type);
        let job = JobService::upload(state, field, file_name, media_type).await?;
        return Ok(Json(job));
    }

    Err(JobError::InvalidInput("No file field found in multipart request".to_string()).into())
}

/// Start upscaling
///
/// Returns immediately; poll the status endpoint for the outcome.
#[utoipa::path(
    post,
    path = "/api/process/{id}",
    params(("id" = String, Path, description = "Job ID")),
    responses(
        (status = 202, description = "Processing started", body = ApiResponse<ProcessAccepted>),
        (status = 404, description = "Video not found", body = ApiResponse<String>),
        (status = 409, description = "Already processing or processed", body = ApiResponse<String>)
    ),
    tag = "Videos"
)]
pub async fn process_video(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_job_id(&id)?;
    let accepted = JobService::start_processing(state, id).await?;
    Ok(ApiSuccess(
        ApiResponse::success(accepted, "Processing started"),
        StatusCode::ACCEPTED,
    ))
}

#[utoipa::path(
    get,
    path = "/api/status/{id}",
    params(("id" = String, Path, description = "Job ID")),
    responses(
        (status = 200, description = "Current job record", body = JobResponse),
        (status = 404, description = "Video not found", body = ApiResponse<String>)
    ),
    tag = "Videos"
)]
pub async fn get_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobResponse>, ApiError> {
    let id = parse_job_id(&id)?;
    Ok(Json(JobService::get_status(state, id).await?))
}

/// Most recent jobs, newest first
#[utoipa::path(
    get,
    path = "/api/videos",
    params(ListJobsQuery),
    responses(
        (status = 200, description = "Recent jobs", body = Vec<JobResponse>),
        (status = 400, description = "Invalid limit", body = ApiResponse<String>)
    ),
    tag = "Videos"
)]
pub async fn list_videos(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<Vec<JobResponse>>, ApiError> {
    query
        .validate()
        .map_err(|e| ApiError(e.to_string(), StatusCode::BAD_REQUEST))?;
    Ok(Json(JobService::list_recent(state, query.limit()).await?))
}
