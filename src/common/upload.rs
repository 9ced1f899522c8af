use std::path::{Path, PathBuf};

use axum::{body::Bytes, extract::multipart::Field};
use futures_util::StreamExt;
use mime::Mime;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, error};

use crate::common::error::JobError;

const WRITE_BUFFER: usize = 1024 * 1024;

/// Resolve the media type of an uploaded part.
///
/// The declared type wins; a missing or generic `application/octet-stream`
/// declaration falls back to a guess from the filename.
pub fn resolve_media_type(declared: Option<&str>, filename: &str) -> Option<Mime> {
    let declared = declared
        .and_then(|ct| ct.parse::<Mime>().ok())
        .filter(|m| *m != mime::APPLICATION_OCTET_STREAM);

    declared.or_else(|| mime_guess::from_path(filename).first())
}

pub fn is_video(media_type: &Mime) -> bool {
    media_type.type_() == mime::VIDEO
}

/// Streams chunks into a file, removing it again if the upload does not finish.
pub struct DiskUploader {
    path: PathBuf,
    writer: BufWriter<File>,
    written: u64,
}

impl DiskUploader {
    pub async fn new(path: PathBuf) -> Result<Self, JobError> {
        let file = File::create(&path).await?;
        Ok(Self {
            path,
            writer: BufWriter::with_capacity(WRITE_BUFFER, file),
            written: 0,
        })
    }

    pub async fn write_chunk(&mut self, chunk: Bytes) -> Result<(), JobError> {
        self.writer.write_all(&chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    pub async fn finish(mut self) -> Result<u64, JobError> {
        self.writer.flush().await?;
        self.writer.get_ref().sync_all().await?;
        Ok(self.written)
    }

    pub async fn abort(self) {
        let path = self.path;
        drop(self.writer);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            debug!("Could not remove partial upload {}: {}", path.display(), e);
        }
    }
}

/// Write one multipart field to `path`, returning the byte count.
pub async fn stream_to_disk(mut field: Field<'_>, path: &Path) -> Result<u64, JobError> {
    let mut uploader = DiskUploader::new(path.to_path_buf()).await?;

    while let Some(chunk) = field.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                error!("Upload stream error: {}", e);
                uploader.abort().await;
                return Err(JobError::InvalidInput(format!("Upload interrupted: {}", e.body_text())));
            }
        };

        if let Err(e) = uploader.write_chunk(chunk).await {
            error!("Failed writing {}: {}", path.display(), e);
            uploader.abort().await;
            return Err(e);
        }
    }

    uploader.finish().await
}
