//! Orchestration of the external media tools.
//!
//! Nothing here decodes video itself; `ffprobe` answers questions about a file
//! and `ffmpeg` produces the scaled copy. The [`MediaToolkit`] trait is the seam
//! the job service talks to.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod ffmpeg;

pub use ffmpeg::FfmpegToolkit;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once('x')
            .ok_or_else(|| format!("Invalid resolution: {}", s))?;
        let width = w.trim().parse::<u32>().map_err(|_| format!("Invalid width in {}", s))?;
        let height = h.trim().parse::<u32>().map_err(|_| format!("Invalid height in {}", s))?;
        Ok(Self { width, height })
    }
}

/// Where an H.264 encode is written: file extension plus the ffmpeg muxer.
///
/// The source extension is kept when its container accepts H.264. WebM only
/// takes VP8/VP9/AV1, so it moves to Matroska, which still accepts the copied
/// Vorbis or Opus track. Anything else, including no extension, becomes MP4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Container {
    pub extension: &'static str,
    pub muxer: &'static str,
}

impl Container {
    pub const MP4: Container = Container { extension: "mp4", muxer: "mp4" };

    pub fn for_extension(extension: Option<&str>) -> Self {
        let ext = extension.map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("mp4") => Self::MP4,
            Some("m4v") => Container { extension: "m4v", muxer: "mp4" },
            Some("mov") => Container { extension: "mov", muxer: "mov" },
            Some("mkv") | Some("webm") => Container { extension: "mkv", muxer: "matroska" },
            Some("ts") => Container { extension: "ts", muxer: "mpegts" },
            _ => Self::MP4,
        }
    }

    pub fn for_path(path: &Path) -> Self {
        Self::for_extension(path.extension().and_then(|e| e.to_str()))
    }
}

/// What a probe learned about a container.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
    pub codec: Option<String>,
    pub frame_rate: Option<f64>,
    pub duration_secs: Option<f64>,
    pub has_audio: bool,
}

impl MediaInfo {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} exited with status {code}: {stderr}")]
    Failed {
        tool: String,
        code: i32,
        stderr: String,
    },
    #[error("No video stream found")]
    NoVideoStream,
    #[error("Unreadable probe output: {0}")]
    Parse(String),
    #[error("Transcoder did not finish within {0:?}")]
    TimedOut(Duration),
}

#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// Inspect a stored file. Fails if it is not a container with a video stream.
    async fn probe(&self, path: &Path) -> Result<MediaInfo, MediaError>;

    /// Write `input` scaled to `target` into `output`.
    ///
    /// Frame rate is left alone, audio is copied when present, video is
    /// re-encoded to H.264.
    async fn upscale(&self, input: &Path, output: &Path, target: Resolution) -> Result<(), MediaError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_parses_and_formats() {
        let res: Resolution = "1280x720".parse().unwrap();
        assert_eq!(res, Resolution::new(1280, 720));
        assert_eq!(Resolution::new(1920, 1080).to_string(), "1920x1080");
        assert!("1280".parse::<Resolution>().is_err());
        assert!("axb".parse::<Resolution>().is_err());
    }

    #[test]
    fn container_always_accepts_h264() {
        assert_eq!(Container::for_extension(Some("MOV")), Container { extension: "mov", muxer: "mov" });
        assert_eq!(Container::for_extension(Some("webm")), Container { extension: "mkv", muxer: "matroska" });
        assert_eq!(Container::for_extension(Some("m4v")).muxer, "mp4");
        assert_eq!(Container::for_extension(Some("avi")), Container::MP4);
        assert_eq!(Container::for_extension(None), Container::MP4);
        assert_eq!(Container::for_path(Path::new("out/clip_1080p")), Container::MP4);
    }
}
