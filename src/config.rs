//! Runtime configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::constants::{BSKY_PUBLIC_API, OPENAI_API_BASE};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to parse {name} as number: {source}")]
    ParseFloat {
        name: String,
        #[source]
        source: std::num::ParseFloatError,
    },
    #[error("failed to parse {name} as boolean: {value}")]
    ParseBool { name: String, value: String },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Bluesky
    pub bsky_api_base: String,
    pub thread_depth: u32,
    pub parent_height: u32,
    pub request_timeout: Duration,

    // Model API
    pub openai_base_url: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_retries: u32,
    pub retry_base: Duration,

    // Video processing
    pub process_videos: bool,
    pub transcription_model: String,
    pub yt_dlp_path: String,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub max_frames: usize,
    pub tool_timeout: Duration,
    pub work_dir: Option<PathBuf>,

    // Prompt composition
    pub assistant_handle: Option<String>,
    pub system_preamble: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Bluesky
            bsky_api_base: env_or_default("BSKY_API_BASE", BSKY_PUBLIC_API),
            thread_depth: parse_env_u32("BSKY_THREAD_DEPTH", 100)?,
            parent_height: parse_env_u32("BSKY_PARENT_HEIGHT", 100)?,
            request_timeout: Duration::from_secs(parse_env_u64("REQUEST_TIMEOUT_SECS", 30)?),

            // Model API
            openai_base_url: env_or_default("OPENAI_BASE_URL", OPENAI_API_BASE),
            openai_api_key: optional_env("OPENAI_API_KEY"),
            openai_model: env_or_default("OPENAI_MODEL", "gpt-4o-mini"),
            temperature: parse_env_f32("OPENAI_TEMPERATURE", 0.7)?,
            max_tokens: parse_env_u32("OPENAI_MAX_TOKENS", 1000)?,
            max_retries: parse_env_u32("OPENAI_MAX_RETRIES", 5)?,
            retry_base: Duration::from_millis(parse_env_u64("OPENAI_RETRY_BASE_MS", 1000)?),

            // Video processing
            process_videos: parse_env_bool("PROCESS_VIDEOS", true)?,
            transcription_model: env_or_default("TRANSCRIPTION_MODEL", "whisper-1"),
            yt_dlp_path: env_or_default("YT_DLP_PATH", "yt-dlp"),
            ffmpeg_path: env_or_default("FFMPEG_PATH", "ffmpeg"),
            ffprobe_path: env_or_default("FFPROBE_PATH", "ffprobe"),
            max_frames: parse_env_usize("VIDEO_MAX_FRAMES", 5)?,
            tool_timeout: Duration::from_secs(parse_env_u64("TOOL_TIMEOUT_SECS", 300)?),
            work_dir: optional_env("WORK_DIR").map(PathBuf::from),

            // Prompt composition
            assistant_handle: optional_env("ASSISTANT_HANDLE"),
            system_preamble: optional_env("SYSTEM_PREAMBLE"),
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thread_depth == 0 {
            return Err(ConfigError::InvalidValue {
                name: "BSKY_THREAD_DEPTH".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.max_frames == 0 {
            return Err(ConfigError::InvalidValue {
                name: "VIDEO_MAX_FRAMES".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidValue {
                name: "OPENAI_TEMPERATURE".to_string(),
                message: format!("must be between 0 and 2, got {}", self.temperature),
            });
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "REQUEST_TIMEOUT_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Configuration with defaults and no environment lookups, for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            bsky_api_base: BSKY_PUBLIC_API.to_string(),
            thread_depth: 100,
            parent_height: 100,
            request_timeout: Duration::from_secs(10),
            openai_base_url: OPENAI_API_BASE.to_string(),
            openai_api_key: Some("test-key".to_string()),
            openai_model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            max_retries: 2,
            retry_base: Duration::from_millis(10),
            process_videos: true,
            transcription_model: "whisper-1".to_string(),
            yt_dlp_path: "yt-dlp".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            max_frames: 5,
            tool_timeout: Duration::from_secs(60),
            work_dir: None,
            assistant_handle: None,
            system_preamble: None,
        }
    }
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_f32(name: &str, default: f32) -> Result<f32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseFloat {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => parse_bool(name, &val),
        _ => Ok(default),
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::ParseBool {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}
