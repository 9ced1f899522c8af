use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;

use crate::state::AppState;

pub mod download_handler;
pub mod dto;
pub mod handler;
pub mod model;
pub mod repository;
pub mod service;

pub fn router(state: &AppState) -> Router<AppState> {
    let upload = Router::new()
        .route("/api/upload", post(handler::upload_video))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.config.max_upload_bytes));

    Router::new()
        .route("/api", get(handler::root))
        .route("/api/", get(handler::root))
        .route("/api/process/{id}", post(handler::process_video))
        .route("/api/status/{id}", get(handler::get_status))
        .route("/api/download/{id}", get(download_handler::download_video))
        .route("/api/videos", get(handler::list_videos))
        .merge(upload)
}
