//! Speech-to-text through an OpenAI-compatible `/v1/audio/transcriptions` endpoint.

use std::path::Path;
use std::time::Duration;

use reqwest::multipart;
use tracing::{debug, info};

use super::transcript::{parse_vtt, render_transcript};
use crate::constants::USER_AGENT;
use crate::error::{Error, Result};

/// Client for the transcription endpoint.
#[derive(Clone)]
pub struct TranscriptionClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl TranscriptionClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    /// Transcribe an audio file into timestamped text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Upstream`] on a non-success status and
    /// [`Error::Io`] if the file cannot be read.
    pub async fn transcribe(&self, audio: &Path) -> Result<String> {
        let filename = audio
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.mp3")
            .to_string();
        let bytes = tokio::fs::read(audio).await?;

        let part = multipart::Part::bytes(bytes)
            .file_name(filename)
            .mime_str("audio/mpeg")?;
        let form = multipart::Form::new()
            .text("model", self.model.clone())
            .text("response_format", "vtt")
            .part("file", part);

        let url = format!(
            "{}/v1/audio/transcriptions",
            self.base_url.trim_end_matches('/')
        );
        debug!(url = %url, file = %audio.display(), "Uploading audio for transcription");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let transcript = render_transcript(&parse_vtt(&body));
        info!(chars = transcript.len(), "Audio transcribed");
        Ok(transcript)
    }
}
