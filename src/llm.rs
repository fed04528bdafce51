//! OpenAI-compatible chat-completion client.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::constants::{JSON_MODE_INSTRUCTION, JSON_SCHEMA_INSTRUCTION, USER_AGENT};
use crate::error::{Error, Result};
use crate::message::{Message, Role};

/// Upper bound for a single retry delay.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Requested shape of the model reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ResponseFormat {
    #[default]
    Text,
    /// JSON object output, optionally following `schema`.
    Json { schema: Option<Value> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelResponse {
    Text(String),
    Structured(Value),
}

impl ModelResponse {
    /// Printable form: raw text, or pretty-printed JSON.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Structured(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
        }
    }
}

#[async_trait]
pub trait ModelCaller: Send + Sync {
    /// Send `messages` and return the first completion.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Upstream`] when the API answers with a non-success
    /// status after retries are exhausted.
    async fn call(&self, messages: &[Message], format: &ResponseFormat) -> Result<ModelResponse>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<JsonObjectFormat>,
}

#[derive(Debug, Serialize)]
struct JsonObjectFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
    retry_base: Duration,
}

impl OpenAiClient {
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no API key is configured.
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config
            .openai_api_key
            .clone()
            .ok_or_else(|| Error::Config("OPENAI_API_KEY is required to call the model".to_string()))?;

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: config.openai_base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.openai_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            retry_base: config.retry_base,
        })
    }

    async fn send(&self, request: &ChatRequest<'_>) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let mut attempt = 0;

        loop {
            let result = self
                .http
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(request)
                .send()
                .await;

            let error = match result {
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await?;
                    if status.is_success() {
                        return Ok(body);
                    }
                    Error::Upstream {
                        status: status.as_u16(),
                        body,
                    }
                }
                Err(e) => Error::Http(e),
            };

            if attempt >= self.max_retries || !is_retryable(&error) {
                return Err(error);
            }

            let delay = retry_delay(self.retry_base, attempt);
            attempt += 1;
            warn!(
                attempt,
                max_retries = self.max_retries,
                delay_ms = delay.as_millis() as u64,
                "Model call failed, retrying: {error}"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ModelCaller for OpenAiClient {
    async fn call(&self, messages: &[Message], format: &ResponseFormat) -> Result<ModelResponse> {
        let structured = matches!(format, ResponseFormat::Json { .. });
        let messages = match format {
            ResponseFormat::Text => messages.to_vec(),
            ResponseFormat::Json { schema } => with_json_instructions(messages, schema.as_ref()),
        };

        let request = ChatRequest {
            model: &self.model,
            messages: &messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format: structured.then_some(JsonObjectFormat { kind: "json_object" }),
        };
        debug!(
            model = %self.model,
            messages = messages.len(),
            structured,
            "Calling model"
        );

        let body = self.send(&request).await?;
        let parsed: ChatResponse = serde_json::from_str(&body)?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        info!(chars = content.len(), "Model replied");

        if !structured {
            return Ok(ModelResponse::Text(content));
        }
        match serde_json::from_str(&content) {
            Ok(value) => Ok(ModelResponse::Structured(value)),
            Err(e) => {
                warn!("Model reply is not valid JSON, returning raw text: {e}");
                Ok(ModelResponse::Text(content))
            }
        }
    }
}

/// Copy `messages`, adding JSON-mode instructions to the first system
/// message or inserting one at the front.
fn with_json_instructions(messages: &[Message], schema: Option<&Value>) -> Vec<Message> {
    let mut instruction = JSON_MODE_INSTRUCTION.to_string();
    if let Some(schema) = schema {
        let schema = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
        instruction.push_str(&format!("\n{JSON_SCHEMA_INSTRUCTION} {schema}"));
    }

    let mut messages = messages.to_vec();
    match messages.iter_mut().find(|m| m.role == Role::System) {
        Some(system) => system.append_text(&format!("\n\n{instruction}")),
        None => messages.insert(0, Message::text(Role::System, instruction)),
    }
    messages
}

fn is_retryable(error: &Error) -> bool {
    match error {
        Error::Upstream { status, .. } => *status == 429 || *status >= 500,
        Error::Http(e) => e.is_timeout() || e.is_connect(),
        _ => false,
    }
}

/// `base * 2^attempt`, capped at [`MAX_RETRY_DELAY`], scaled by a random factor in `[0.5, 1.0]`.
fn retry_delay(base: Duration, attempt: u32) -> Duration {
    let exp = base.saturating_mul(2u32.saturating_pow(attempt));
    let capped = exp.min(MAX_RETRY_DELAY);
    let jitter = rand::thread_rng().gen_range(0.5..=1.0);
    capped.mul_f64(jitter)
}
