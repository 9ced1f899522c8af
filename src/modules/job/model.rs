use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

pub use crate::infrastructure::media::Resolution;

/// Every job is scaled to this size.
pub const TARGET_RESOLUTION: Resolution = Resolution { width: 1920, height: 1080 };

/// Appended to the original file stem when naming the processed download.
pub const OUTPUT_SUFFIX: &str = "_1080p";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, ToSchema, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum JobStatus {
    Uploaded,
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Uploaded => "uploaded",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }

    /// Only forward, single-step moves are legal.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Uploaded, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Error)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, FromRow, Clone, PartialEq)]
pub struct Job {
    pub id: Uuid,
    pub filename: String,
    pub original_resolution: Option<String>,
    pub target_resolution: String,
    pub status: JobStatus,
    pub stored_path: String,
    pub output_path: Option<String>,
    pub error_message: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub processed_at: Option<OffsetDateTime>,
}

impl Job {
    pub fn new(id: Uuid, filename: String, original_resolution: Resolution, stored_path: String) -> Self {
        Self {
            id,
            filename,
            original_resolution: Some(original_resolution.to_string()),
            target_resolution: TARGET_RESOLUTION.to_string(),
            status: JobStatus::Uploaded,
            stored_path,
            output_path: None,
            error_message: None,
            created_at: OffsetDateTime::now_utc(),
            processed_at: None,
        }
    }

    /// Name offered to the browser: original stem, resolution suffix, extension of the output.
    pub fn download_filename(&self) -> String {
        let ext_source = self.output_path.as_deref().unwrap_or(&self.filename);
        let ext = Path::new(ext_source).extension().and_then(|e| e.to_str());
        suffixed_filename(&self.filename, ext)
    }
}

/// `clip.mov` + `mov` becomes `clip_1080p.mov`.
pub fn suffixed_filename(original: &str, extension: Option<&str>) -> String {
    let stem = Path::new(original)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("video");
    match extension {
        Some(ext) => format!("{}{}.{}", stem, OUTPUT_SUFFIX, ext),
        None => format!("{}{}", stem, OUTPUT_SUFFIX),
    }
}
