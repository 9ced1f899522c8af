use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::config::settings::AppConfig;
use crate::infrastructure::db::pool::DbPool;
use crate::infrastructure::media::MediaToolkit;
use crate::infrastructure::storage::local::StorageService;
use crate::workers::transcoder::ActiveJobs;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db: DbPool,
    pub storage: StorageService,
    pub media: Arc<dyn MediaToolkit>,
    /// Caps how many transcoder processes run at once.
    pub transcode_slots: Arc<Semaphore>,
    pub active_jobs: ActiveJobs,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        db: DbPool,
        storage: StorageService,
        media: Arc<dyn MediaToolkit>,
    ) -> Self {
        let transcode_slots = Arc::new(Semaphore::new(config.max_concurrent_transcodes.max(1)));
        Self {
            config,
            db,
            storage,
            media,
            transcode_slots,
            active_jobs: ActiveJobs::default(),
        }
    }
}
