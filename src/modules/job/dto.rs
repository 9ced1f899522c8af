use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::model::{Job, JobStatus};

/// Public view of a job. Storage paths stay on the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct JobResponse {
    pub id: Uuid,
    pub filename: String,
    pub original_resolution: Option<String>,
    pub target_resolution: String,
    pub status: JobStatus,
    pub error_message: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option", default)]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub processed_at: Option<OffsetDateTime>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            filename: job.filename,
            original_resolution: job.original_resolution,
            target_resolution: job.target_resolution,
            status: job.status,
            error_message: job.error_message,
            created_at: job.created_at,
            processed_at: job.processed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProcessAccepted {
    pub video_id: Uuid,
    pub status: JobStatus,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceInfo {
    pub message: String,
}

#[derive(Debug, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListJobsQuery {
    #[validate(range(min = 1, max = 100, message = "limit must be between 1 and 100"))]
    pub limit: Option<u32>,
}

impl ListJobsQuery {
    pub const DEFAULT_LIMIT: u32 = 100;

    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT)
    }
}
