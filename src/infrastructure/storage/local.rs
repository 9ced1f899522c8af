use std::io;
use std::path::{Path, PathBuf};

use mime::Mime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::infrastructure::media::Container;
use crate::modules::job::model::OUTPUT_SUFFIX;

/// Uploads and transcoder outputs on the local filesystem.
///
/// ffmpeg reads and writes real paths, so both directories live on local disk.
#[derive(Clone, Debug)]
pub struct StorageService {
    pub upload_dir: PathBuf,
    pub processed_dir: PathBuf,
}

impl StorageService {
    pub async fn new(upload_dir: impl Into<PathBuf>, processed_dir: impl Into<PathBuf>) -> io::Result<Self> {
        let storage = Self {
            upload_dir: upload_dir.into(),
            processed_dir: processed_dir.into(),
        };
        tokio::fs::create_dir_all(&storage.upload_dir).await?;
        tokio::fs::create_dir_all(&storage.processed_dir).await?;

        info!(
            "✅ Storage ready (uploads: {}, processed: {})",
            storage.upload_dir.display(),
            storage.processed_dir.display()
        );
        Ok(storage)
    }

    pub fn upload_path(&self, id: Uuid, extension: Option<&str>) -> PathBuf {
        self.upload_dir.join(with_extension(id.to_string(), extension))
    }

    pub fn output_path(&self, id: Uuid, extension: Option<&str>) -> PathBuf {
        self.processed_dir
            .join(with_extension(format!("{}{}", id, OUTPUT_SUFFIX), extension))
    }

    /// Where the upscaled copy of `source` goes, in a container that holds H.264.
    pub fn output_for_source(&self, id: Uuid, source: &Path) -> PathBuf {
        let extension = source.extension().and_then(|e| e.to_str());
        self.output_path(id, Some(Container::for_extension(extension).extension))
    }

    /// Missing files are not an error.
    pub async fn remove(&self, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
}

fn with_extension(stem: String, extension: Option<&str>) -> String {
    match extension {
        Some(ext) => format!("{}.{}", stem, ext),
        None => stem,
    }
}

/// Extension of a client-supplied filename, if it is safe to reuse on disk.
pub fn safe_extension(filename: &str) -> Option<String> {
    let ext = Path::new(filename).extension()?.to_str()?;
    let valid = !ext.is_empty() && ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric());
    valid.then(|| ext.to_ascii_lowercase())
}

/// Extension for a stored upload: the filename's, else one registered for the media type.
pub fn upload_extension(filename: &str, media_type: &Mime) -> Option<String> {
    safe_extension(filename).or_else(|| {
        let known = mime_guess::get_mime_extensions(media_type)?;
        known.first().map(|ext| ext.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_sanitised() {
        assert_eq!(safe_extension("clip.MP4").as_deref(), Some("mp4"));
        assert_eq!(safe_extension("archive.tar.mkv").as_deref(), Some("mkv"));
        assert_eq!(safe_extension("noext"), None);
        assert_eq!(safe_extension("evil.m p4"), None);
        assert_eq!(safe_extension("../../etc/passwd.$x"), None);
    }

    #[test]
    fn extension_falls_back_to_media_type() {
        let mp4: Mime = "video/mp4".parse().unwrap();
        assert_eq!(upload_extension("clip.mov", &mp4).as_deref(), Some("mov"));

        let guessed = upload_extension("recording", &mp4).unwrap();
        assert!(mime_guess::from_ext(&guessed).iter().any(|m| m == mp4));

        assert_eq!(upload_extension("recording", &"video/x-unheard-of".parse().unwrap()), None);
    }

    #[tokio::test]
    async fn output_always_has_an_h264_container() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageService::new(dir.path().join("up"), dir.path().join("out"))
            .await
            .unwrap();
        let id = Uuid::new_v4();
        let out = dir.path().join("out");

        assert_eq!(
            storage.output_for_source(id, &storage.upload_path(id, None)),
            out.join(format!("{}_1080p.mp4", id))
        );
        assert_eq!(
            storage.output_for_source(id, &storage.upload_path(id, Some("webm"))),
            out.join(format!("{}_1080p.mkv", id))
        );
        assert_eq!(
            storage.output_for_source(id, &storage.upload_path(id, Some("mov"))),
            out.join(format!("{}_1080p.mov", id))
        );
    }

    #[tokio::test]
    async fn paths_are_derived_from_job_id() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageService::new(dir.path().join("up"), dir.path().join("out"))
            .await
            .unwrap();
        let id = Uuid::new_v4();

        assert_eq!(storage.upload_path(id, Some("mp4")), dir.path().join("up").join(format!("{}.mp4", id)));
        assert_eq!(
            storage.output_path(id, Some("mp4")),
            dir.path().join("out").join(format!("{}_1080p.mp4", id))
        );
        assert!(dir.path().join("up").is_dir());
        assert!(dir.path().join("out").is_dir());

        // removing a file that was never written is quiet
        storage.remove(&storage.upload_path(id, None)).await;
    }
}
