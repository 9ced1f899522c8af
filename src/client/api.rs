use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{BoxStream, StreamExt, TryStreamExt};
use mime::Mime;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Response};
use thiserror::Error;
use tokio_util::io::ReaderStream;
use url::Url;
use uuid::Uuid;

use crate::common::response::ApiResponse;
use crate::modules::job::dto::JobResponse;

const GENERIC_FAILURE: &str = "Something went wrong. Please try again.";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Server returned {status}: {message}")]
    Server { status: u16, message: String },
    #[error("Invalid server URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Text for the user: the server's own detail when it sent one.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Server { message, .. } if !message.is_empty() => message.clone(),
            _ => GENERIC_FAILURE.to_string(),
        }
    }
}

/// A file the user picked, not yet uploaded.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedFile {
    pub path: PathBuf,
    pub name: String,
    pub media_type: Option<Mime>,
    pub size: u64,
}

impl SelectedFile {
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let size = tokio::fs::metadata(path).await?.len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string());
        Ok(Self {
            path: path.to_path_buf(),
            media_type: mime_guess::from_path(path).first(),
            name,
            size,
        })
    }

    pub fn is_video(&self) -> bool {
        self.media_type
            .as_ref()
            .is_some_and(|m| m.type_() == mime::VIDEO)
    }
}

/// A processed file on its way down; `body` yields it chunk by chunk.
pub struct DownloadedFile {
    pub filename: Option<String>,
    pub body: BoxStream<'static, Result<Bytes, ClientError>>,
}

/// The four backend operations the controller drives.
#[async_trait]
pub trait JobApi: Send + Sync {
    async fn upload(&self, file: &SelectedFile) -> Result<JobResponse, ClientError>;
    async fn trigger(&self, id: Uuid) -> Result<(), ClientError>;
    async fn status(&self, id: Uuid) -> Result<JobResponse, ClientError>;
    async fn download(&self, id: Uuid) -> Result<DownloadedFile, ClientError>;
}

pub struct HttpJobApi {
    http: reqwest::Client,
    base: Url,
}

impl HttpJobApi {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            http: reqwest::Client::new(),
            base,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.base.join(path)?)
    }
}

#[async_trait]
impl JobApi for HttpJobApi {
    async fn upload(&self, file: &SelectedFile) -> Result<JobResponse, ClientError> {
        let handle = tokio::fs::File::open(&file.path).await?;
        let body = Body::wrap_stream(ReaderStream::new(handle));
        let content_type = file
            .media_type
            .as_ref()
            .map(|m| m.to_string())
            .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string());
        let part = Part::stream_with_length(body, file.size)
            .file_name(file.name.clone())
            .mime_str(&content_type)?;

        let response = self
            .http
            .post(self.endpoint("api/upload")?)
            .multipart(Form::new().part("file", part))
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn trigger(&self, id: Uuid) -> Result<(), ClientError> {
        let response = self
            .http
            .post(self.endpoint(&format!("api/process/{}", id))?)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn status(&self, id: Uuid) -> Result<JobResponse, ClientError> {
        let response = self
            .http
            .get(self.endpoint(&format!("api/status/{}", id))?)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn download(&self, id: Uuid) -> Result<DownloadedFile, ClientError> {
        let response = self
            .http
            .get(self.endpoint(&format!("api/download/{}", id))?)
            .send()
            .await?;
        let response = check(response).await?;
        let filename = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(attachment_filename);
        Ok(DownloadedFile {
            filename,
            body: response.bytes_stream().map_err(ClientError::from).boxed(),
        })
    }
}

/// Turn a non-2xx response into [`ClientError::Server`] with the server's message.
async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiResponse<serde_json::Value>>(&text)
        .map(|body| body.message)
        .unwrap_or_else(|_| status.canonical_reason().unwrap_or("").to_string());
    Err(ClientError::Server {
        status: status.as_u16(),
        message,
    })
}

fn attachment_filename(header: &str) -> Option<String> {
    let (_, rest) = header.split_once("filename=")?;
    let name = rest.split(';').next()?.trim().trim_matches('"');
    // Never let the server pick a directory.
    let name = Path::new(name).file_name()?.to_str()?;
    (!name.is_empty()).then(|| name.to_string())
}
