#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use tempfile::TempDir;

use quickscale::app::create_app;
use quickscale::config::settings::AppConfig;
use quickscale::infrastructure::db::pool::connect_to_db;
use quickscale::infrastructure::media::{MediaError, MediaInfo, MediaToolkit, Resolution};
use quickscale::infrastructure::storage::local::StorageService;
use quickscale::modules::job::dto::JobResponse;
use quickscale::modules::job::model::JobStatus;
use quickscale::state::AppState;

pub mod fixtures {
    /// A tiny stand-in container the fake toolkit understands.
    pub fn fake_video(width: u32, height: u32, audio: bool) -> Vec<u8> {
        format!("FAKEVIDEO {}x{} {}", width, height, if audio { "audio" } else { "silent" }).into_bytes()
    }

    /// Probes fine, but the fake transcoder fails on it.
    pub fn broken_video() -> Vec<u8> {
        b"FAKEVIDEO 1280x720 audio BROKEN".to_vec()
    }

    /// Transcodes "successfully" to the wrong size.
    pub fn shrinking_video() -> Vec<u8> {
        b"FAKEVIDEO 1280x720 audio WRONGSIZE".to_vec()
    }
}

/// Media toolkit that reads and writes the `FAKEVIDEO WxH audio|silent` format.
#[derive(Default)]
pub struct FakeMedia {
    pub delay: Duration,
    /// Behave as if ffprobe is not installed.
    pub missing_tools: bool,
}

impl FakeMedia {
    pub fn slow(delay: Duration) -> Self {
        Self { delay, ..Self::default() }
    }

    pub fn without_tools() -> Self {
        Self { missing_tools: true, ..Self::default() }
    }
}

fn parse_fake(content: &str) -> Result<MediaInfo, MediaError> {
    let mut parts = content.split_whitespace();
    if parts.next() != Some("FAKEVIDEO") {
        return Err(MediaError::NoVideoStream);
    }
    let res: Resolution = parts
        .next()
        .ok_or_else(|| MediaError::Parse("missing size".into()))?
        .parse()
        .map_err(MediaError::Parse)?;
    let has_audio = parts.next() == Some("audio");
    Ok(MediaInfo {
        width: res.width,
        height: res.height,
        codec: Some("fake".to_string()),
        frame_rate: Some(25.0),
        duration_secs: Some(5.0),
        has_audio,
    })
}

#[async_trait]
impl MediaToolkit for FakeMedia {
    async fn probe(&self, path: &Path) -> Result<MediaInfo, MediaError> {
        if self.missing_tools {
            return Err(MediaError::Spawn {
                tool: "fakeprobe".to_string(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }
        let bytes = tokio::fs::read(path).await.map_err(|source| MediaError::Spawn {
            tool: "fakeprobe".to_string(),
            source,
        })?;
        parse_fake(&String::from_utf8_lossy(&bytes))
    }

    async fn upscale(&self, input: &Path, output: &Path, target: Resolution) -> Result<(), MediaError> {
        tokio::time::sleep(self.delay).await;

        let source = tokio::fs::read_to_string(input).await.map_err(|source| MediaError::Spawn {
            tool: "fakempeg".to_string(),
            source,
        })?;
        if source.contains("BROKEN") {
            return Err(MediaError::Failed {
                tool: "fakempeg".to_string(),
                code: 1,
                stderr: "Invalid data found when processing input".to_string(),
            });
        }

        let info = parse_fake(&source)?;
        let size = if source.contains("WRONGSIZE") {
            Resolution::new(640, 360)
        } else {
            target
        };
        let audio = if info.has_audio { "audio" } else { "silent" };
        tokio::fs::write(output, format!("FAKEVIDEO {} {}", size, audio))
            .await
            .map_err(|source| MediaError::Spawn {
                tool: "fakempeg".to_string(),
                source,
            })
    }
}

pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub dir: TempDir,
}

pub async fn setup_test_app() -> TestApp {
    setup_test_app_with(FakeMedia::default()).await
}

pub async fn setup_test_app_with(media: FakeMedia) -> TestApp {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");

    let config = AppConfig {
        database_url: format!("sqlite://{}", dir.path().join("jobs.db").display()),
        upload_dir: dir.path().join("uploads"),
        processed_dir: dir.path().join("processed"),
        max_upload_bytes: 16 * 1024 * 1024,
        cors_origins: vec!["*".to_string()],
        ..AppConfig::new()
    };

    let db = connect_to_db(&config.database_url).await.expect("Failed to open job store");
    let storage = StorageService::new(&config.upload_dir, &config.processed_dir)
        .await
        .expect("Failed to create storage dirs");
    let state = AppState::new(config, db, storage, Arc::new(media));

    let server = TestServer::new(create_app(state.clone())).expect("Failed to create test server");
    TestApp { server, state, dir }
}

pub fn video_form(filename: &str, content_type: &str, bytes: Vec<u8>) -> MultipartForm {
    MultipartForm::new().add_part(
        "file",
        Part::bytes(bytes).file_name(filename).mime_type(content_type),
    )
}

pub async fn upload(server: &TestServer, filename: &str, bytes: Vec<u8>) -> JobResponse {
    let response = server
        .post("/api/upload")
        .multipart(video_form(filename, "video/mp4", bytes))
        .await;
    response.assert_status_ok();
    response.json::<JobResponse>()
}

/// Poll the status endpoint until the job is terminal.
pub async fn wait_for_terminal(server: &TestServer, id: uuid::Uuid) -> JobResponse {
    for _ in 0..500 {
        let job = server.get(&format!("/api/status/{}", id)).await.json::<JobResponse>();
        if job.status.is_terminal() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} never reached a terminal status", id);
}

pub fn assert_status(job: &JobResponse, status: JobStatus) {
    assert_eq!(job.status, status, "unexpected status for {:?}", job);
}
