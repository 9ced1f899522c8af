use std::path::Path;
use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use super::{Container, MediaError, MediaInfo, MediaToolkit, Resolution};

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Shells out to `ffprobe` and `ffmpeg`.
#[derive(Debug, Clone)]
pub struct FfmpegToolkit {
    ffmpeg_bin: String,
    ffprobe_bin: String,
    timeout: Option<Duration>,
}

impl FfmpegToolkit {
    pub fn new(ffmpeg_bin: impl Into<String>, ffprobe_bin: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.into(),
            ffprobe_bin: ffprobe_bin.into(),
            timeout,
        }
    }

    fn scale_args(input: &Path, output: &Path, target: Resolution) -> Vec<String> {
        vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-y".into(),
            "-i".into(),
            input.to_string_lossy().into_owned(),
            "-map".into(),
            "0:v:0".into(),
            // Trailing '?' keeps sources without audio valid.
            "-map".into(),
            "0:a?".into(),
            "-vf".into(),
            format!("scale={}:{}:flags=bicubic", target.width, target.height),
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            "medium".into(),
            "-crf".into(),
            "18".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-c:a".into(),
            "copy".into(),
            "-f".into(),
            Container::for_path(output).muxer.into(),
            output.to_string_lossy().into_owned(),
        ]
    }
}

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    async fn probe(&self, path: &Path) -> Result<MediaInfo, MediaError> {
        debug!("ffprobe: {}", path.display());

        let output = Command::new(&self.ffprobe_bin)
            .args(["-v", "error", "-print_format", "json", "-show_streams", "-show_format"])
            .arg(path)
            .output()
            .await
            .map_err(|source| MediaError::Spawn { tool: self.ffprobe_bin.clone(), source })?;

        let output = check_exit(&self.ffprobe_bin, output)?;
        parse_probe(&output.stdout)
    }

    async fn upscale(&self, input: &Path, output: &Path, target: Resolution) -> Result<(), MediaError> {
        let args = Self::scale_args(input, output, target);
        info!("🎥 {} {}", self.ffmpeg_bin, args.join(" "));

        let mut cmd = Command::new(&self.ffmpeg_bin);
        cmd.args(&args).kill_on_drop(true);

        let run = cmd.output();
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .map_err(|_| MediaError::TimedOut(limit))?,
            None => run.await,
        };

        let result = result.map_err(|source| MediaError::Spawn { tool: self.ffmpeg_bin.clone(), source })?;
        check_exit(&self.ffmpeg_bin, result)?;
        Ok(())
    }
}

fn check_exit(tool: &str, output: Output) -> Result<Output, MediaError> {
    if output.status.success() {
        return Ok(output);
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(MediaError::Failed {
        tool: tool.to_string(),
        code: output.status.code().unwrap_or(-1),
        stderr: last_lines(&stderr, 5),
    })
}

/// ffmpeg stderr can be long; the tail carries the actual failure.
fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

fn parse_probe(stdout: &[u8]) -> Result<MediaInfo, MediaError> {
    let data: ProbeOutput = serde_json::from_slice(stdout).map_err(|e| MediaError::Parse(e.to_string()))?;

    let video = data
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or(MediaError::NoVideoStream)?;

    let (width, height) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(MediaError::Parse("video stream has no dimensions".to_string())),
    };

    let has_audio = data.streams.iter().any(|s| s.codec_type.as_deref() == Some("audio"));
    let duration_secs = data
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok());

    Ok(MediaInfo {
        width,
        height,
        codec: video.codec_name.clone(),
        frame_rate: video.r_frame_rate.as_deref().and_then(parse_frame_rate),
        duration_secs,
        has_audio,
    })
}

/// "30000/1001" style rationals.
fn parse_frame_rate(raw: &str) -> Option<f64> {
    match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            (den != 0.0).then(|| num / den)
        }
        None => raw.parse().ok(),
    }
}
