use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::infrastructure::media::{MediaError, Resolution};
use crate::modules::job::model::TARGET_RESOLUTION;
use crate::modules::job::repository::JobRepository;
use crate::state::AppState;

const WRITE_ATTEMPTS: u32 = 4;
const WRITE_BACKOFF: Duration = Duration::from_millis(100);

/// Why a background run ended in `error`. The message is what clients see.
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("{0}")]
    Media(#[from] MediaError),
    #[error("Transcoder finished without producing an output file")]
    MissingOutput,
    #[error("Output resolution mismatch: expected {expected}, got {actual}")]
    ResolutionMismatch { expected: Resolution, actual: Resolution },
    #[error("Audio track mismatch: source audio {source_audio}, output audio {output_audio}")]
    AudioMismatch { source_audio: bool, output_audio: bool },
    #[error("Transcoder queue closed")]
    QueueClosed,
    #[error("Could not load job: {0}")]
    Lookup(#[source] sqlx::Error),
}

/// Ids of jobs that a transcoder task of this process owns.
///
/// A `processing` row whose id is absent here has nobody left to finish it.
#[derive(Clone, Debug, Default)]
pub struct ActiveJobs(Arc<Mutex<HashSet<Uuid>>>);

impl ActiveJobs {
    /// `None` if the id is already held.
    pub fn claim(&self, id: Uuid) -> Option<ActiveClaim> {
        self.lock().insert(id).then(|| ActiveClaim { jobs: self.clone(), id })
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.lock().contains(&id)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<Uuid>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Released on drop, including when the task panics.
#[derive(Debug)]
pub struct ActiveClaim {
    jobs: ActiveJobs,
    id: Uuid,
}

impl Drop for ActiveClaim {
    fn drop(&mut self) {
        self.jobs.lock().remove(&self.id);
    }
}

pub fn spawn_transcode(state: AppState, id: Uuid, claim: ActiveClaim) -> JoinHandle<()> {
    tokio::spawn(async move {
        run_job(&state, id).await;
        drop(claim);
    })
}

async fn run_job(state: &AppState, id: Uuid) {
    let job = match with_retry(|| JobRepository::find_by_id(&state.db, id)).await {
        Ok(Some(job)) => job,
        Ok(None) => {
            warn!("Job {} disappeared before upscaling", id);
            return;
        }
        Err(e) => {
            error!("❌ Job {} could not be loaded: {}", id, e);
            record_outcome(state, id, Err(TranscodeError::Lookup(e))).await;
            return;
        }
    };

    let output = state.storage.output_for_source(id, Path::new(&job.stored_path));

    let result = match state.transcode_slots.clone().acquire_owned().await {
        Ok(_permit) => {
            info!("🎥 Upscaling job {} ({})", job.id, job.filename);
            transcode(state, Path::new(&job.stored_path), &output).await
        }
        Err(_) => Err(TranscodeError::QueueClosed),
    };

    if let Err(e) = &result {
        error!("❌ Job {} failed: {}", id, e);
        state.storage.remove(&output).await;
    }
    record_outcome(state, id, result).await;
}

/// Write the terminal status. A success that cannot be recorded is downgraded to
/// a failure so the row still leaves `processing`.
async fn record_outcome(state: &AppState, id: Uuid, result: Result<PathBuf, TranscodeError>) {
    let recorded = match &result {
        Ok(path) => {
            let output_path = path.to_string_lossy();
            with_retry(|| JobRepository::mark_completed(&state.db, id, &output_path)).await
        }
        Err(e) => {
            let message = e.to_string();
            with_retry(|| JobRepository::mark_failed(&state.db, id, &message)).await
        }
    };

    let err = match recorded {
        Ok(true) => {
            info!("✅ Job {} finished", id);
            return;
        }
        Ok(false) => {
            warn!("Job {} was no longer processing; result dropped", id);
            return;
        }
        Err(e) => e,
    };
    error!("Failed to record result of job {}: {}", id, err);

    if let Ok(path) = &result {
        state.storage.remove(path).await;
        let message = format!("Failed to record transcoder result: {}", err);
        match with_retry(|| JobRepository::mark_failed(&state.db, id, &message)).await {
            Ok(_) => warn!("Job {} marked failed after its result was lost", id),
            Err(e) => error!("Job {} left for the janitor: {}", id, e),
        }
    }
}

async fn transcode(state: &AppState, input: &Path, output: &Path) -> Result<PathBuf, TranscodeError> {
    let source = state.media.probe(input).await?;

    state.media.upscale(input, output, TARGET_RESOLUTION).await?;

    if !tokio::fs::try_exists(output).await.unwrap_or(false) {
        return Err(TranscodeError::MissingOutput);
    }

    let result = state.media.probe(output).await?;
    if result.resolution() != TARGET_RESOLUTION {
        return Err(TranscodeError::ResolutionMismatch {
            expected: TARGET_RESOLUTION,
            actual: result.resolution(),
        });
    }
    if result.has_audio != source.has_audio {
        return Err(TranscodeError::AudioMismatch {
            source_audio: source.has_audio,
            output_audio: result.has_audio,
        });
    }

    Ok(output.to_path_buf())
}

/// Run a database call, backing off between failed attempts.
async fn with_retry<T, F, Fut>(mut op: F) -> Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let mut delay = WRITE_BACKOFF;
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < WRITE_ATTEMPTS => {
                warn!("Database call failed (attempt {}/{}): {}", attempt, WRITE_ATTEMPTS, e);
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let calls = &AtomicU32::new(0);
        let result = with_retry(|| async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(sqlx::Error::PoolTimedOut)
            } else {
                Ok(true)
            }
        })
        .await;

        assert!(result.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_give_up_eventually() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = with_retry(|| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(sqlx::Error::PoolClosed)
        })
        .await;

        assert!(matches!(result, Err(sqlx::Error::PoolClosed)));
        assert_eq!(calls.load(Ordering::SeqCst), WRITE_ATTEMPTS);
    }

    #[test]
    fn claims_are_exclusive_and_released_on_drop() {
        let jobs = ActiveJobs::default();
        let id = Uuid::new_v4();

        let claim = jobs.claim(id).unwrap();
        assert!(jobs.claim(id).is_none());
        assert!(jobs.contains(id));

        drop(claim);
        assert!(!jobs.contains(id));
        assert!(jobs.claim(id).is_some());
    }
}
