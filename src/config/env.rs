use std::env;
use std::str::FromStr;

pub enum EnvKey {
    ServerHost,
    ServerPort,
    DatabaseUrl,
    UploadDir,
    ProcessedDir,
    FfmpegBin,
    FfprobeBin,
    MaxUploadBytes,
    MaxConcurrentTranscodes,
    TranscodeTimeoutSecs,
    RetentionHours,
    JanitorIntervalSecs,
    CorsOrigins,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerHost => "APP_HOST",
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::DatabaseUrl => "DATABASE_URL",
            EnvKey::UploadDir => "UPLOAD_DIR",
            EnvKey::ProcessedDir => "PROCESSED_DIR",
            EnvKey::FfmpegBin => "FFMPEG_BIN",
            EnvKey::FfprobeBin => "FFPROBE_BIN",
            EnvKey::MaxUploadBytes => "MAX_UPLOAD_BYTES",
            EnvKey::MaxConcurrentTranscodes => "MAX_CONCURRENT_TRANSCODES",
            EnvKey::TranscodeTimeoutSecs => "TRANSCODE_TIMEOUT_SECS",
            EnvKey::RetentionHours => "RETENTION_HOURS",
            EnvKey::JanitorIntervalSecs => "JANITOR_INTERVAL_SECS",
            EnvKey::CorsOrigins => "CORS_ORIGINS",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    match get(key) {
        Ok(val) => val.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}
