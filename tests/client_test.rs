//! The client controller driving a real server over HTTP.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use helpers::fixtures::fake_video;
use helpers::{setup_test_app, TestApp};
use quickscale::app::create_app;
use quickscale::client::{ClientController, HttpJobApi, Phase, SelectedFile};
use quickscale::modules::job::model::JobStatus;

/// Serve the test app on an ephemeral port and return its base URL.
async fn serve(app: &TestApp) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = create_app(app.state.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn controller(base: &str) -> ClientController {
    let api = Arc::new(HttpJobApi::new(base).unwrap());
    ClientController::with_poll_interval(api, Duration::from_millis(20))
}

#[tokio::test]
async fn test_controller_round_trip() {
    let app = setup_test_app().await;
    let base = serve(&app).await;

    let source = app.dir.path().join("clip.mp4");
    tokio::fs::write(&source, fake_video(1280, 720, true)).await.unwrap();

    let mut ctl = controller(&base);
    ctl.select_file(SelectedFile::from_path(&source).await.unwrap()).unwrap();

    let job = ctl.start().await.unwrap();
    assert_eq!(job.original_resolution.as_deref(), Some("1280x720"));

    let settled = ctl.wait_until_settled().await;
    assert_eq!(settled.phase, Phase::Completed);
    assert_eq!(settled.progress, 100);
    assert_eq!(settled.job.as_ref().unwrap().status, JobStatus::Completed);

    let out = tempfile::tempdir().unwrap();
    let saved = ctl.download(out.path()).await.unwrap();
    assert_eq!(saved, out.path().join("clip_1080p.mp4"));
    assert_eq!(tokio::fs::read(&saved).await.unwrap(), b"FAKEVIDEO 1920x1080 audio");

    ctl.reset();
    assert_eq!(ctl.snapshot().phase, Phase::Idle);
}

#[tokio::test]
async fn test_controller_reports_server_rejection() {
    let app = setup_test_app().await;
    let base = serve(&app).await;

    let source = app.dir.path().join("fake.mp4");
    tokio::fs::write(&source, b"this is text pretending to be video").await.unwrap();

    let mut ctl = controller(&base);
    ctl.select_file(SelectedFile::from_path(&source).await.unwrap()).unwrap();

    assert!(ctl.start().await.is_err());
    let snap = ctl.snapshot();
    assert_eq!(snap.phase, Phase::Error);
    assert!(
        snap.error.as_deref().unwrap().starts_with("File is not a recognized video"),
        "unexpected message: {:?}",
        snap.error
    );
}

#[tokio::test]
async fn test_new_cycle_abandons_previous_job() {
    let app = setup_test_app().await;
    let base = serve(&app).await;

    let first = app.dir.path().join("first.mp4");
    let second = app.dir.path().join("second.mp4");
    tokio::fs::write(&first, fake_video(1280, 720, true)).await.unwrap();
    tokio::fs::write(&second, fake_video(640, 360, false)).await.unwrap();

    let mut ctl = controller(&base);
    ctl.select_file(SelectedFile::from_path(&first).await.unwrap()).unwrap();
    let first_job = ctl.start().await.unwrap();

    // picking another file drops the first job's poller
    ctl.select_file(SelectedFile::from_path(&second).await.unwrap()).unwrap();
    assert!(!ctl.is_polling());
    let second_job = ctl.start().await.unwrap();
    assert_ne!(first_job.id, second_job.id);

    let settled = ctl.wait_until_settled().await;
    assert_eq!(settled.phase, Phase::Completed);
    assert_eq!(settled.job.unwrap().id, second_job.id);
}
