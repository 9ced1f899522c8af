use sqlx::SqlitePool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::model::{Job, JobStatus};

const JOB_COLUMNS: &str = "id, filename, original_resolution, target_resolution, status, \
     stored_path, output_path, error_message, created_at, processed_at";

pub struct JobRepository;

impl JobRepository {
    pub async fn insert(pool: &SqlitePool, job: &Job) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO jobs (id, filename, original_resolution, target_resolution, status,
                              stored_path, output_path, error_message, created_at, processed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.id)
        .bind(&job.filename)
        .bind(&job.original_resolution)
        .bind(&job.target_resolution)
        .bind(job.status)
        .bind(&job.stored_path)
        .bind(&job.output_path)
        .bind(&job.error_message)
        .bind(job.created_at)
        .bind(job.processed_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Job>, sqlx::Error> {
        sqlx::query_as::<_, Job>(&format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_recent(pool: &SqlitePool, limit: u32) -> Result<Vec<Job>, sqlx::Error> {
        sqlx::query_as::<_, Job>(&format!(
            "SELECT {} FROM jobs ORDER BY julianday(created_at) DESC, rowid DESC LIMIT ?",
            JOB_COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(pool)
        .await
    }

    /// Claim an `uploaded` job for processing. `false` when the job is missing
    /// or was already claimed.
    pub async fn mark_processing(pool: &SqlitePool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE jobs SET status = ? WHERE id = ? AND status = ?")
            .bind(JobStatus::Processing)
            .bind(id)
            .bind(JobStatus::Uploaded)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Status and output path land in one statement, so readers never see one
    /// without the other.
    pub async fn mark_completed(pool: &SqlitePool, id: Uuid, output_path: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = ?, output_path = ?, processed_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(JobStatus::Completed)
        .bind(output_path)
        .bind(OffsetDateTime::now_utc())
        .bind(id)
        .bind(JobStatus::Processing)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn mark_failed(pool: &SqlitePool, id: Uuid, message: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET status = ?, error_message = ? WHERE id = ? AND status = ?",
        )
        .bind(JobStatus::Error)
        .bind(message)
        .bind(id)
        .bind(JobStatus::Processing)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Fail every job still marked `processing`. Only valid before any
    /// transcoder task of this process has started.
    pub async fn fail_interrupted(pool: &SqlitePool, message: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("UPDATE jobs SET status = ?, error_message = ? WHERE status = ?")
            .bind(JobStatus::Error)
            .bind(message)
            .bind(JobStatus::Processing)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn processing_ids(pool: &SqlitePool) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM jobs WHERE status = ?")
            .bind(JobStatus::Processing)
            .fetch_all(pool)
            .await
    }

    /// Jobs older than `before` that no transcoder is working on.
    pub async fn find_expired(pool: &SqlitePool, before: OffsetDateTime) -> Result<Vec<Job>, sqlx::Error> {
        sqlx::query_as::<_, Job>(&format!(
            "SELECT {} FROM jobs WHERE julianday(created_at) < julianday(?) AND status != ?",
            JOB_COLUMNS
        ))
        .bind(before)
        .bind(JobStatus::Processing)
        .fetch_all(pool)
        .await
    }

    pub async fn delete_unless_processing(pool: &SqlitePool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = ? AND status != ?")
            .bind(id)
            .bind(JobStatus::Processing)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::db::pool::connect_to_db;
    use crate::modules::job::model::Resolution;

    async fn pool() -> (tempfile::TempDir, SqlitePool) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("jobs.db").display());
        let pool = connect_to_db(&url).await.unwrap();
        (dir, pool)
    }

    fn new_job() -> Job {
        Job::new(
            Uuid::new_v4(),
            "clip.mp4".to_string(),
            Resolution::new(1280, 720),
            "uploads/clip.mp4".to_string(),
        )
    }

    #[tokio::test]
    async fn inserted_job_is_readable() {
        let (_dir, pool) = pool().await;
        let job = new_job();
        JobRepository::insert(&pool, &job).await.unwrap();

        let found = JobRepository::find_by_id(&pool, job.id).await.unwrap().unwrap();
        assert_eq!(found.id, job.id);
        assert_eq!(found.status, JobStatus::Uploaded);
        assert_eq!(found.original_resolution.as_deref(), Some("1280x720"));
        assert!(JobRepository::find_by_id(&pool, Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn processing_claim_succeeds_once() {
        let (_dir, pool) = pool().await;
        let job = new_job();
        JobRepository::insert(&pool, &job).await.unwrap();

        assert!(JobRepository::mark_processing(&pool, job.id).await.unwrap());
        assert!(!JobRepository::mark_processing(&pool, job.id).await.unwrap());
        assert!(!JobRepository::mark_processing(&pool, Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn terminal_transitions_require_processing() {
        let (_dir, pool) = pool().await;
        let job = new_job();
        JobRepository::insert(&pool, &job).await.unwrap();

        // uploaded -> completed would skip a state
        assert!(!JobRepository::mark_completed(&pool, job.id, "out.mp4").await.unwrap());

        JobRepository::mark_processing(&pool, job.id).await.unwrap();
        assert!(JobRepository::mark_completed(&pool, job.id, "out.mp4").await.unwrap());
        assert!(!JobRepository::mark_failed(&pool, job.id, "late").await.unwrap());

        let done = JobRepository::find_by_id(&pool, job.id).await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.output_path.as_deref(), Some("out.mp4"));
        assert!(done.processed_at.is_some());
        assert!(done.error_message.is_none());
    }

    #[tokio::test]
    async fn interrupted_jobs_are_failed() {
        let (_dir, pool) = pool().await;
        let stuck = new_job();
        let idle = new_job();
        JobRepository::insert(&pool, &stuck).await.unwrap();
        JobRepository::insert(&pool, &idle).await.unwrap();
        JobRepository::mark_processing(&pool, stuck.id).await.unwrap();

        assert_eq!(JobRepository::fail_interrupted(&pool, "restart").await.unwrap(), 1);

        let stuck = JobRepository::find_by_id(&pool, stuck.id).await.unwrap().unwrap();
        assert_eq!(stuck.status, JobStatus::Error);
        assert_eq!(stuck.error_message.as_deref(), Some("restart"));
        let idle = JobRepository::find_by_id(&pool, idle.id).await.unwrap().unwrap();
        assert_eq!(idle.status, JobStatus::Uploaded);
    }

    #[tokio::test]
    async fn expiry_skips_processing_jobs() {
        let (_dir, pool) = pool().await;
        let mut old = new_job();
        old.created_at -= time::Duration::days(3);
        let mut busy = new_job();
        busy.created_at -= time::Duration::days(3);
        let fresh = new_job();
        for job in [&old, &busy, &fresh] {
            JobRepository::insert(&pool, job).await.unwrap();
        }
        JobRepository::mark_processing(&pool, busy.id).await.unwrap();

        let cutoff = OffsetDateTime::now_utc() - time::Duration::days(1);
        let expired = JobRepository::find_expired(&pool, cutoff).await.unwrap();
        assert_eq!(expired.iter().map(|j| j.id).collect::<Vec<_>>(), vec![old.id]);

        assert!(JobRepository::delete_unless_processing(&pool, old.id).await.unwrap());
        assert!(!JobRepository::delete_unless_processing(&pool, busy.id).await.unwrap());
    }

    #[tokio::test]
    async fn recent_jobs_are_newest_first() {
        let (_dir, pool) = pool().await;
        let mut older = new_job();
        older.created_at -= time::Duration::minutes(5);
        let newer = new_job();
        JobRepository::insert(&pool, &older).await.unwrap();
        JobRepository::insert(&pool, &newer).await.unwrap();

        let listed = JobRepository::list_recent(&pool, 10).await.unwrap();
        assert_eq!(listed.iter().map(|j| j.id).collect::<Vec<_>>(), vec![newer.id, older.id]);
        assert_eq!(JobRepository::list_recent(&pool, 1).await.unwrap().len(), 1);
    }
}
