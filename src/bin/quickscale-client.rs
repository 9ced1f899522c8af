use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use quickscale::client::{ClientController, HttpJobApi, Phase, SelectedFile};

/// Upload a video, wait for the 1080p upscale and download the result.
#[derive(Debug, Parser)]
#[command(name = "quickscale-client", version)]
struct Args {
    /// Video file to upscale
    file: PathBuf,

    /// Base URL of the QuickScale server
    #[arg(long, default_value = "http://localhost:8001")]
    server: String,

    /// Directory the processed video is saved into
    #[arg(long, default_value = ".")]
    out: PathBuf,

    /// Seconds between status checks
    #[arg(long, default_value_t = 2)]
    interval: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let args = Args::parse();

    let api = Arc::new(HttpJobApi::new(&args.server)?);
    let mut controller = ClientController::with_poll_interval(api, Duration::from_secs(args.interval.max(1)));

    let file = SelectedFile::from_path(&args.file)
        .await
        .with_context(|| format!("Cannot read {}", args.file.display()))?;
    controller.select_file(file)?;

    let job = controller.start().await?;
    println!(
        "Uploaded {} ({}), upscaling to {}...",
        job.filename,
        job.original_resolution.as_deref().unwrap_or("unknown resolution"),
        job.target_resolution
    );

    let mut updates = controller.subscribe();
    let progress = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let snap = updates.borrow_and_update().clone();
            if snap.phase != Phase::Processing {
                break;
            }
            println!("  {:>3}%", snap.progress);
        }
    });

    let settled = controller.wait_until_settled().await;
    progress.abort();

    match settled.phase {
        Phase::Completed => {
            let saved = controller.download(&args.out).await?;
            println!("Done: {}", saved.display());
            Ok(())
        }
        _ => bail!(
            "Processing failed: {}",
            settled.error.unwrap_or_else(|| "unknown error".to_string())
        ),
    }
}
