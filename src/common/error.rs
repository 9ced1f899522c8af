use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::common::response::ApiError;
use crate::infrastructure::media::MediaError;
use crate::modules::job::model::JobStatus;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("Video not found")]
    NotFound,
    #[error("Processed file not found")]
    OutputMissing,
    #[error("Video not ready for download (status: {0})")]
    NotReady(JobStatus),
    #[error("Video already processed or processing (status: {0})")]
    AlreadyStarted(JobStatus),
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Media error: {0}")]
    Media(#[from] MediaError),
}

impl JobError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            JobError::InvalidInput(_) | JobError::NotReady(_) => StatusCode::BAD_REQUEST,
            JobError::NotFound | JobError::OutputMissing => StatusCode::NOT_FOUND,
            JobError::AlreadyStarted(_) => StatusCode::CONFLICT,
            JobError::Storage(_) | JobError::Database(_) | JobError::Media(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        let status = err.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", err);
        }
        ApiError(err.to_string(), status)
    }
}

impl IntoResponse for JobError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}
