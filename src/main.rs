use std::sync::Arc;

use anyhow::Context;
use dotenvy::dotenv;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use quickscale::app;
use quickscale::config::settings::AppConfig;
use quickscale::infrastructure::db::pool::connect_to_db;
use quickscale::infrastructure::media::FfmpegToolkit;
use quickscale::infrastructure::storage::local::StorageService;
use quickscale::modules::job::repository::JobRepository;
use quickscale::state::AppState;
use quickscale::workers::janitor;

const INTERRUPTED_MESSAGE: &str = "Processing interrupted by server restart";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("quickscale=info,tower_http=info")),
        )
        .init();

    info!("Starting server...");

    let config = AppConfig::new();
    let db = connect_to_db(&config.database_url)
        .await
        .context("Failed to open job store")?;
    let storage = StorageService::new(&config.upload_dir, &config.processed_dir)
        .await
        .context("Failed to prepare storage directories")?;
    let media = Arc::new(FfmpegToolkit::new(
        &config.ffmpeg_bin,
        &config.ffprobe_bin,
        config.transcode_timeout(),
    ));

    // No transcoder of this process has run yet, so anything still marked
    // processing belongs to a previous run.
    let interrupted = JobRepository::fail_interrupted(&db, INTERRUPTED_MESSAGE).await?;
    if interrupted > 0 {
        warn!("Marked {} interrupted jobs as failed", interrupted);
    }

    let state = AppState::new(config.clone(), db, storage, media);
    let _janitor = janitor::start_janitor(state.clone());

    let app = app::create_app(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server running on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
