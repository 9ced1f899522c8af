use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use crate::config::env::{self, EnvKey};

const DEFAULT_MAX_UPLOAD_BYTES: usize = 2 * 1024 * 1024 * 1024;

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub server_host: String,
    pub server_port: u16,
    pub database_url: String,
    pub upload_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
    pub max_upload_bytes: usize,
    pub max_concurrent_transcodes: usize,
    /// Zero disables the limit.
    pub transcode_timeout_secs: u64,
    /// Zero disables the retention janitor.
    pub retention_hours: u64,
    pub janitor_interval_secs: u64,
    pub cors_origins: Vec<String>,
}

impl AppConfig {
    pub fn new() -> Self {
        Self {
            server_host: env::get_or(EnvKey::ServerHost, "0.0.0.0"),
            server_port: env::get_parsed(EnvKey::ServerPort, 8001),
            database_url: env::get_or(EnvKey::DatabaseUrl, "sqlite://data/quickscale.db"),
            upload_dir: PathBuf::from(env::get_or(EnvKey::UploadDir, "uploads")),
            processed_dir: PathBuf::from(env::get_or(EnvKey::ProcessedDir, "processed")),
            ffmpeg_bin: env::get_or(EnvKey::FfmpegBin, "ffmpeg"),
            ffprobe_bin: env::get_or(EnvKey::FfprobeBin, "ffprobe"),
            max_upload_bytes: env::get_parsed(EnvKey::MaxUploadBytes, DEFAULT_MAX_UPLOAD_BYTES),
            max_concurrent_transcodes: env::get_parsed(EnvKey::MaxConcurrentTranscodes, 2usize).max(1),
            transcode_timeout_secs: env::get_parsed(EnvKey::TranscodeTimeoutSecs, 0),
            retention_hours: env::get_parsed(EnvKey::RetentionHours, 24),
            janitor_interval_secs: env::get_parsed(EnvKey::JanitorIntervalSecs, 3600u64).max(1),
            cors_origins: parse_origins(&env::get_or(EnvKey::CorsOrigins, "*")),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn transcode_timeout(&self) -> Option<Duration> {
        (self.transcode_timeout_secs > 0).then(|| Duration::from_secs(self.transcode_timeout_secs))
    }

    pub fn retention(&self) -> Option<Duration> {
        (self.retention_hours > 0).then(|| Duration::from_secs(self.retention_hours * 3600))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origins_are_split_and_trimmed() {
        assert_eq!(
            parse_origins("http://a.test, http://b.test ,,"),
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
        assert_eq!(parse_origins("*"), vec!["*".to_string()]);
    }
}
