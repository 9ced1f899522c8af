use std::path::Path;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::common::error::JobError;
use crate::modules::job::repository::JobRepository;
use crate::state::AppState;

pub const ORPHANED_MESSAGE: &str = "Processing stopped before a result was recorded";

/// Periodically fail orphaned `processing` jobs and, when retention is
/// enabled, purge jobs older than the retention window.
pub fn start_janitor(state: AppState) -> JoinHandle<()> {
    let retention = state.config.retention();
    let every = Duration::from_secs(state.config.janitor_interval_secs.max(1));

    info!("🧹 Janitor running every {:?}, retention {:?}", every, retention);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match reconcile(&state).await {
                Ok(0) => {}
                Ok(n) => warn!("🧹 Failed {} orphaned jobs", n),
                Err(e) => error!("Janitor reconcile failed: {}", e),
            }
            let Some(retention) = retention else { continue };
            match sweep(&state, retention).await {
                Ok(0) => {}
                Ok(n) => info!("🧹 Purged {} expired jobs", n),
                Err(e) => error!("Janitor sweep failed: {}", e),
            }
        }
    })
}

/// Move `processing` jobs that no transcoder task owns to `error`.
pub async fn reconcile(state: &AppState) -> Result<usize, JobError> {
    let mut failed = 0;
    for id in JobRepository::processing_ids(&state.db).await? {
        if state.active_jobs.contains(id) {
            continue;
        }
        if JobRepository::mark_failed(&state.db, id, ORPHANED_MESSAGE).await? {
            warn!("Job {} had no transcoder; marked failed", id);
            failed += 1;
        }
    }
    Ok(failed)
}

/// One pass. Jobs still `processing` are left alone.
pub async fn sweep(state: &AppState, retention: Duration) -> Result<usize, JobError> {
    let cutoff = OffsetDateTime::now_utc() - retention;
    let expired = JobRepository::find_expired(&state.db, cutoff).await?;

    let mut purged = 0;
    for job in expired {
        // Row goes first so a job claimed in the meantime keeps its files.
        if !JobRepository::delete_unless_processing(&state.db, job.id).await? {
            continue;
        }
        state.storage.remove(Path::new(&job.stored_path)).await;
        if let Some(output) = &job.output_path {
            state.storage.remove(Path::new(output)).await;
        }
        purged += 1;
    }
    Ok(purged)
}
