use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::api::{ClientError, JobApi};
use super::controller::{ClientSnapshot, Phase};
use crate::modules::job::dto::JobResponse;
use crate::modules::job::model::JobStatus;

/// Simulated progress never passes this before the backend reports completion.
pub const PROGRESS_CAP: u8 = 90;
pub const PROGRESS_STEP: u8 = 10;

/// Status poll loop bound to one job. Dropping it stops the loop.
pub struct Poller {
    job_id: Uuid,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Poller {
    pub fn spawn(
        api: Arc<dyn JobApi>,
        state: Arc<watch::Sender<ClientSnapshot>>,
        job_id: Uuid,
        every: Duration,
    ) -> Self {
        let token = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(api, state, job_id, every, token.clone()));
        Self { job_id, token, handle }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn poll_loop(
    api: Arc<dyn JobApi>,
    state: Arc<watch::Sender<ClientSnapshot>>,
    job_id: Uuid,
    every: Duration,
    token: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            _ = token.cancelled() => break,
            r = api.status(job_id) => r,
        };

        if token.is_cancelled() || !apply_poll(&state, job_id, result) {
            break;
        }
    }
    debug!("Stopped polling job {}", job_id);
}

/// Fold one poll result into the snapshot. Returns whether polling should go on.
///
/// Results for a job that is no longer the current one are dropped.
pub(crate) fn apply_poll(
    state: &watch::Sender<ClientSnapshot>,
    job_id: Uuid,
    result: Result<JobResponse, ClientError>,
) -> bool {
    let mut keep_polling = false;
    state.send_if_modified(|snap| {
        if snap.phase != Phase::Processing || snap.job.as_ref().map(|j| j.id) != Some(job_id) {
            return false;
        }

        match result {
            Ok(record) => match record.status {
                JobStatus::Completed => {
                    snap.job = Some(record);
                    snap.progress = 100;
                    snap.phase = Phase::Completed;
                }
                JobStatus::Error => {
                    snap.error = Some(
                        record
                            .error_message
                            .clone()
                            .unwrap_or_else(|| "Processing failed".to_string()),
                    );
                    snap.job = Some(record);
                    snap.phase = Phase::Error;
                }
                JobStatus::Uploaded | JobStatus::Processing => {
                    snap.job = Some(record);
                    snap.progress = (snap.progress + PROGRESS_STEP).min(PROGRESS_CAP);
                    keep_polling = true;
                }
            },
            Err(e) => {
                warn!("Status poll for job {} failed: {}", job_id, e);
                snap.error = Some(e.user_message());
                snap.phase = Phase::Error;
            }
        }
        true
    });
    keep_polling
}
