//! Video download, frame sampling and transcription.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result as AnyResult};
use async_trait::async_trait;
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};

pub mod ffmpeg;
pub mod transcribe;
pub mod transcript;
pub mod ytdlp;

pub use transcribe::TranscriptionClient;

/// Frames and speech extracted from one video.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoResult {
    /// Image references in playback order.
    pub frames: Vec<String>,
    /// Transcript text; empty when the video has no speech or no audio.
    pub transcript: String,
}

/// Turns a video URL into frames and a transcript.
#[async_trait]
pub trait VideoProcessor: Send + Sync {
    /// # Errors
    ///
    /// Returns [`Error::Processing`] on download, decoding or transcription failure.
    async fn process(&self, video_url: &str) -> Result<VideoResult>;
}

/// [`VideoProcessor`] backed by yt-dlp, ffmpeg and a transcription API.
pub struct MediaToolsProcessor {
    yt_dlp_path: String,
    ffmpeg_path: String,
    ffprobe_path: String,
    max_frames: usize,
    tool_timeout: Duration,
    work_dir: Option<PathBuf>,
    transcriber: Option<TranscriptionClient>,
}

impl MediaToolsProcessor {
    /// Build from configuration. Transcription is disabled without an API key.
    ///
    /// # Errors
    ///
    /// Returns an error if the transcription HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        let transcriber = match &config.openai_api_key {
            Some(key) => Some(TranscriptionClient::new(
                config.openai_base_url.clone(),
                key.clone(),
                config.transcription_model.clone(),
                config.tool_timeout,
            )?),
            None => {
                info!("OPENAI_API_KEY not set, videos will be processed without transcripts");
                None
            }
        };

        Ok(Self {
            yt_dlp_path: config.yt_dlp_path.clone(),
            ffmpeg_path: config.ffmpeg_path.clone(),
            ffprobe_path: config.ffprobe_path.clone(),
            max_frames: config.max_frames,
            tool_timeout: config.tool_timeout,
            work_dir: config.work_dir.clone(),
            transcriber,
        })
    }

    async fn scratch_dir(&self) -> AnyResult<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("bsky2llm-video-");

        let scratch = match &self.work_dir {
            Some(dir) => {
                tokio::fs::create_dir_all(dir)
                    .await
                    .with_context(|| format!("Failed to create work directory {}", dir.display()))?;
                builder.tempdir_in(dir)
            }
            None => builder.tempdir(),
        };
        scratch.context("Failed to create scratch directory")
    }

    async fn run(&self, video_url: &str) -> AnyResult<VideoResult> {
        let scratch = self.scratch_dir().await?;
        let dir = scratch.path();

        let video = ytdlp::download(&self.yt_dlp_path, video_url, dir, self.tool_timeout).await?;

        let duration = ffmpeg::probe_duration(&self.ffprobe_path, &video, self.tool_timeout)
            .await
            .unwrap_or_else(|e| {
                warn!("Failed to probe duration, sampling first frame only: {e:#}");
                None
            });

        let mut frames = Vec::new();
        for (i, at) in ffmpeg::frame_timestamps(duration, self.max_frames)
            .into_iter()
            .enumerate()
        {
            let out = dir.join(format!("frame_{}.jpg", i + 1));
            if let Some(path) =
                ffmpeg::extract_frame(&self.ffmpeg_path, &video, at, &out, self.tool_timeout)
                    .await?
            {
                frames.push(ffmpeg::image_data_url(&path).await?);
            }
        }
        if frames.is_empty() {
            anyhow::bail!("no frames could be extracted from {video_url}");
        }

        let transcript = self.transcript_for(&video, dir).await?;

        debug!(
            url = %video_url,
            frames = frames.len(),
            transcript_len = transcript.len(),
            "Video processing complete"
        );

        Ok(VideoResult { frames, transcript })
    }

    async fn transcript_for(&self, video: &Path, dir: &Path) -> AnyResult<String> {
        let Some(transcriber) = &self.transcriber else {
            return Ok(String::new());
        };

        if !ffmpeg::has_audio(&self.ffprobe_path, video, self.tool_timeout).await? {
            debug!("Video has no audio stream, skipping transcription");
            return Ok(String::new());
        }

        let audio = dir.join("audio.mp3");
        ffmpeg::extract_audio(&self.ffmpeg_path, video, &audio, self.tool_timeout).await?;
        transcriber
            .transcribe(&audio)
            .await
            .context("Transcription request failed")
    }
}

#[async_trait]
impl VideoProcessor for MediaToolsProcessor {
    async fn process(&self, video_url: &str) -> Result<VideoResult> {
        info!(url = %video_url, "Processing video");
        self.run(video_url)
            .await
            .map_err(|e| Error::Processing(format!("{e:#}")))
    }
}
