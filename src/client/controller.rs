use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{BoxStream, StreamExt};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::api::{ClientError, DownloadedFile, JobApi, SelectedFile};
use super::poller::Poller;
use crate::modules::job::dto::JobResponse;
use crate::modules::job::model::suffixed_filename;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Uploading,
    Processing,
    Completed,
    Error,
}

/// Everything a UI needs to render the current state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientSnapshot {
    pub phase: Phase,
    pub file: Option<SelectedFile>,
    pub job: Option<JobResponse>,
    /// Cosmetic; the backend reports no real progress.
    pub progress: u8,
    pub error: Option<String>,
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Please select a video file")]
    NotAVideo,
    #[error("No file selected")]
    NoFileSelected,
    #[error("Cannot do that while {0:?}")]
    WrongPhase(Phase),
    #[error("{}", .0.user_message())]
    Api(#[from] ClientError),
    #[error("Failed to save download: {0}")]
    Save(#[from] std::io::Error),
}

/// Front-end state machine: idle → uploading → processing → completed / error.
pub struct ClientController {
    api: Arc<dyn JobApi>,
    state: Arc<watch::Sender<ClientSnapshot>>,
    poller: Option<Poller>,
    poll_interval: Duration,
}

impl ClientController {
    pub fn new(api: Arc<dyn JobApi>) -> Self {
        Self::with_poll_interval(api, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(api: Arc<dyn JobApi>, poll_interval: Duration) -> Self {
        let (tx, _rx) = watch::channel(ClientSnapshot::default());
        Self {
            api,
            state: Arc::new(tx),
            poller: None,
            poll_interval,
        }
    }

    pub fn snapshot(&self) -> ClientSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ClientSnapshot> {
        self.state.subscribe()
    }

    /// Pick a file. Clears any earlier job; a non-video file is refused with
    /// an error but another selection is still possible.
    pub fn select_file(&mut self, file: SelectedFile) -> Result<(), ControllerError> {
        self.stop_polling();

        if !file.is_video() {
            self.state.send_replace(ClientSnapshot {
                phase: Phase::Error,
                error: Some(ControllerError::NotAVideo.to_string()),
                ..ClientSnapshot::default()
            });
            return Err(ControllerError::NotAVideo);
        }

        self.state.send_replace(ClientSnapshot {
            file: Some(file),
            ..ClientSnapshot::default()
        });
        Ok(())
    }

    /// Upload the selected file and trigger processing, then start polling.
    pub async fn start(&mut self) -> Result<JobResponse, ControllerError> {
        let snap = self.snapshot();
        if snap.phase != Phase::Idle {
            return Err(ControllerError::WrongPhase(snap.phase));
        }
        let file = snap.file.ok_or(ControllerError::NoFileSelected)?;

        self.stop_polling();
        self.state.send_modify(|s| {
            s.phase = Phase::Uploading;
            s.progress = 0;
            s.error = None;
            s.job = None;
        });

        let job = match self.upload_and_trigger(&file).await {
            Ok(job) => job,
            Err(e) => {
                warn!("Upload of {} failed: {}", file.name, e);
                self.state.send_modify(|s| {
                    s.phase = Phase::Error;
                    s.error = Some(e.user_message());
                });
                return Err(e.into());
            }
        };

        info!("Job {} started for {}", job.id, file.name);
        self.state.send_modify(|s| {
            s.phase = Phase::Processing;
            s.job = Some(job.clone());
        });
        self.poller = Some(Poller::spawn(
            self.api.clone(),
            self.state.clone(),
            job.id,
            self.poll_interval,
        ));
        Ok(job)
    }

    async fn upload_and_trigger(&self, file: &SelectedFile) -> Result<JobResponse, ClientError> {
        let job = self.api.upload(file).await?;
        // Record the upload before triggering so a failed trigger still shows the job.
        self.state.send_modify(|s| s.job = Some(job.clone()));
        self.api.trigger(job.id).await?;
        Ok(job)
    }

    /// Resolve once the job leaves `processing` (or immediately if it is not there).
    pub async fn wait_until_settled(&self) -> ClientSnapshot {
        let mut rx = self.subscribe();
        let result = rx
            .wait_for(|s| !matches!(s.phase, Phase::Uploading | Phase::Processing))
            .await
            .map(|s| s.clone());
        result.unwrap_or_else(|_| self.snapshot())
    }

    /// Fetch the processed file into `dest_dir`, named `<stem>_1080p<ext>`.
    pub async fn download(&self, dest_dir: &Path) -> Result<PathBuf, ControllerError> {
        let snap = self.snapshot();
        if snap.phase != Phase::Completed {
            return Err(ControllerError::WrongPhase(snap.phase));
        }
        let job = snap.job.ok_or(ControllerError::WrongPhase(snap.phase))?;

        let DownloadedFile { filename, body } = self.api.download(job.id).await?;
        let filename = filename.unwrap_or_else(|| {
            let ext = Path::new(&job.filename).extension().and_then(|e| e.to_str());
            suffixed_filename(&job.filename, ext)
        });

        let target = dest_dir.join(filename);
        match save_stream(body, &target).await {
            Ok(written) => {
                info!("Saved {} ({} bytes)", target.display(), written);
                Ok(target)
            }
            Err(e) => {
                warn!("Download of job {} failed: {}", job.id, e);
                if let Err(rm) = tokio::fs::remove_file(&target).await {
                    warn!("Could not remove partial {}: {}", target.display(), rm);
                }
                Err(e)
            }
        }
    }

    /// Drop everything and go back to `idle`.
    pub fn reset(&mut self) {
        self.stop_polling();
        self.state.send_replace(ClientSnapshot::default());
    }

    pub fn is_polling(&self) -> bool {
        self.poller.as_ref().is_some_and(|p| !p.is_finished())
    }

    fn stop_polling(&mut self) {
        if let Some(poller) = self.poller.take() {
            debug!("Stopped polling job {}", poller.job_id());
            poller.cancel();
        }
    }
}

async fn save_stream(
    mut body: BoxStream<'static, Result<Bytes, ClientError>>,
    target: &Path,
) -> Result<u64, ControllerError> {
    let mut file = tokio::fs::File::create(target).await?;
    let mut written = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}
