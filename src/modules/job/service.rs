use std::path::PathBuf;

use axum::extract::multipart::Field;
use mime::Mime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::dto::{JobResponse, ProcessAccepted};
use super::model::{Job, JobStatus};
use super::repository::JobRepository;
use crate::common::error::JobError;
use crate::common::upload::stream_to_disk;
use crate::infrastructure::media::MediaError;
use crate::infrastructure::storage::local::upload_extension;
use crate::state::AppState;
use crate::workers::transcoder;

pub struct JobService;

impl JobService {
    /// Persist an uploaded video and register it as an `uploaded` job.
    ///
    /// The media type must already have been checked by the caller. Nothing is
    /// recorded unless the stored file probes as a video.
    #[instrument(skip(state, field))]
    pub async fn upload(
        state: AppState,
        field: Field<'_>,
        filename: String,
        media_type: Mime,
    ) -> Result<JobResponse, JobError> {
        if filename.trim().is_empty() {
            return Err(JobError::InvalidInput("No file provided".to_string()));
        }

        let id = Uuid::new_v4();
        let stored_path = state.storage.upload_path(id, upload_extension(&filename, &media_type).as_deref());

        let size = stream_to_disk(field, &stored_path).await?;
        if size == 0 {
            state.storage.remove(&stored_path).await;
            return Err(JobError::InvalidInput("Uploaded file is empty".to_string()));
        }

        let info = match state.media.probe(&stored_path).await {
            Ok(info) => info,
            Err(e @ MediaError::Spawn { .. }) => {
                state.storage.remove(&stored_path).await;
                return Err(e.into());
            }
            Err(e) => {
                warn!("Rejected upload {}: {}", filename, e);
                state.storage.remove(&stored_path).await;
                return Err(JobError::InvalidInput(format!("File is not a recognized video: {}", e)));
            }
        };

        let job = Job::new(id, filename, info.resolution(), stored_path.to_string_lossy().into_owned());
        if let Err(e) = JobRepository::insert(&state.db, &job).await {
            state.storage.remove(&stored_path).await;
            return Err(e.into());
        }

        info!(
            "📥 Job {} uploaded ({} bytes, {} {}, {:.2} fps, {:.1}s, audio: {})",
            job.id,
            size,
            info.codec.as_deref().unwrap_or("unknown"),
            info.resolution(),
            info.frame_rate.unwrap_or_default(),
            info.duration_secs.unwrap_or_default(),
            info.has_audio
        );
        Ok(job.into())
    }

    /// Move an `uploaded` job to `processing` and hand it to the transcoder.
    ///
    /// Returns as soon as the background task is scheduled. A job that is not
    /// `uploaded` is never restarted.
    #[instrument(skip(state))]
    pub async fn start_processing(state: AppState, id: Uuid) -> Result<ProcessAccepted, JobError> {
        // Claimed before the row changes; the janitor skips claimed ids.
        let Some(claim) = state.active_jobs.claim(id) else {
            return Err(Self::already_started(&state, id).await);
        };
        if !JobRepository::mark_processing(&state.db, id).await? {
            return Err(Self::already_started(&state, id).await);
        }

        info!("⚙️ Job {} queued for upscaling", id);
        transcoder::spawn_transcode(state, id, claim);

        Ok(ProcessAccepted {
            video_id: id,
            status: JobStatus::Processing,
        })
    }

    async fn already_started(state: &AppState, id: Uuid) -> JobError {
        match JobRepository::find_by_id(&state.db, id).await {
            Ok(Some(job)) => JobError::AlreadyStarted(job.status),
            Ok(None) => JobError::NotFound,
            Err(e) => e.into(),
        }
    }

    pub async fn get_status(state: AppState, id: Uuid) -> Result<JobResponse, JobError> {
        Self::find(&state, id).await.map(Into::into)
    }

    pub async fn list_recent(state: AppState, limit: u32) -> Result<Vec<JobResponse>, JobError> {
        let jobs = JobRepository::list_recent(&state.db, limit).await?;
        Ok(jobs.into_iter().map(Into::into).collect())
    }

    /// The job and the on-disk location of its processed output.
    pub async fn prepare_download(state: AppState, id: Uuid) -> Result<(Job, PathBuf), JobError> {
        let job = Self::find(&state, id).await?;
        if job.status != JobStatus::Completed {
            return Err(JobError::NotReady(job.status));
        }

        let path = job
            .output_path
            .as_ref()
            .map(PathBuf::from)
            .ok_or(JobError::NotReady(job.status))?;

        if !tokio::fs::try_exists(&path).await? {
            warn!("Processed file for job {} is missing at {}", id, path.display());
            return Err(JobError::OutputMissing);
        }

        Ok((job, path))
    }

    async fn find(state: &AppState, id: Uuid) -> Result<Job, JobError> {
        JobRepository::find_by_id(&state.db, id)
            .await?
            .ok_or(JobError::NotFound)
    }
}

/// Unknown and malformed ids are treated alike.
pub fn parse_job_id(raw: &str) -> Result<Uuid, JobError> {
    Uuid::parse_str(raw.trim()).map_err(|_| JobError::NotFound)
}
