//! OpenAI-compatible HTTP providers.
//!
//! - Transcription: multipart upload to `{base}/audio/transcriptions`
//! - Minutes: single user message to `{base}/chat/completions`
//!
//! Both use the blocking reqwest client. Status codes are mapped onto
//! [`ProviderError`] so the retry policy can tell transient failures apart.

use super::minutes::{MinutesGenerator, MinutesRequest};
use super::transcriber::{ChunkRequest, ChunkSegment, ChunkTranscript, Transcriber};
use crate::defaults;
use crate::error::ProviderError;
use reqwest::blocking::{Client, Response, multipart};
use serde::Deserialize;
use std::time::Duration;

/// Connection settings shared by both OpenAI providers.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: defaults::OPENAI_BASE_URL.to_string(),
            timeout: Duration::from_secs(defaults::HTTP_TIMEOUT_SECS),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn client(&self) -> Result<Client, ProviderError> {
        Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ProviderError::Network {
                message: format!("failed to create HTTP client: {e}"),
            })
    }
}

/// Whisper-style transcription over HTTP.
pub struct OpenAiTranscriber {
    client: Client,
    config: OpenAiConfig,
    model: String,
}

impl OpenAiTranscriber {
    pub fn new(config: OpenAiConfig, model: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: config.client()?,
            config,
            model: model.into(),
        })
    }
}

impl Transcriber for OpenAiTranscriber {
    fn transcribe(&self, request: &ChunkRequest) -> Result<ChunkTranscript, ProviderError> {
        let file = multipart::Part::bytes(request.audio.clone())
            .file_name(request.file_name.clone())
            .mime_str("audio/wav")
            .map_err(|e| ProviderError::Rejected {
                status: 0,
                message: format!("invalid upload part: {e}"),
            })?;

        let mut form = multipart::Form::new()
            .text("model", self.model.clone())
            .part("file", file);
        if request.segments {
            form = form
                .text("response_format", "verbose_json")
                .text("timestamp_granularities[]", "segment");
        } else {
            form = form.text("response_format", "json");
        }
        if let Some(language) = &request.language {
            form = form.text("language", language.clone());
        }
        if let Some(prompt) = &request.prompt {
            form = form.text("prompt", prompt.clone());
        }

        let response = self
            .client
            .post(self.config.endpoint("audio/transcriptions"))
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .map_err(transport_error)?;
        let body = read_success_body(response)?;
        parse_transcription(&body, request.segments)
    }

    fn provider_name(&self) -> &str {
        defaults::PROVIDER
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn supports_segments(&self) -> bool {
        // Only whisper-1 returns verbose_json segments; the gpt-4o
        // transcription models answer with plain text.
        self.model.starts_with("whisper")
    }
}

/// Chat-completions minutes generation.
pub struct OpenAiMinutesGenerator {
    client: Client,
    config: OpenAiConfig,
    model: String,
}

impl OpenAiMinutesGenerator {
    pub fn new(config: OpenAiConfig, model: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: config.client()?,
            config,
            model: model.into(),
        })
    }
}

impl MinutesGenerator for OpenAiMinutesGenerator {
    fn generate(&self, request: &MinutesRequest) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(self.config.endpoint("chat/completions"))
            .bearer_auth(&self.config.api_key)
            .json(&serde_json::json!({
                "model": self.model,
                "messages": [
                    {"role": "user", "content": request.message()}
                ]
            }))
            .send()
            .map_err(transport_error)?;
        let body = read_success_body(response)?;
        parse_chat_completion(&body)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    segments: Option<Vec<RawSegment>>,
}

#[derive(Debug, Deserialize)]
struct RawSegment {
    start: f64,
    end: f64,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

fn transport_error(error: reqwest::Error) -> ProviderError {
    let message = if error.is_timeout() {
        format!("request timed out: {error}")
    } else {
        error.to_string()
    };
    ProviderError::Network { message }
}

fn read_success_body(response: Response) -> Result<String, ProviderError> {
    let status = response.status().as_u16();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response.text().map_err(transport_error)?;

    if (200..300).contains(&status) {
        Ok(body)
    } else {
        Err(classify_status(status, retry_after.as_deref(), &body))
    }
}

/// Map a non-success HTTP status onto a provider error.
pub fn classify_status(status: u16, retry_after: Option<&str>, body: &str) -> ProviderError {
    let message = error_message(body);
    match status {
        429 => ProviderError::RateLimited {
            message,
            retry_after: retry_after.and_then(parse_retry_after),
        },
        401 | 403 => ProviderError::Auth { message },
        500..=599 => ProviderError::Server { status, message },
        _ => ProviderError::Rejected { status, message },
    }
}

/// `Retry-After` in (possibly fractional) seconds, capped at
/// [`MAX_RETRY_AFTER_SECS`](crate::defaults::MAX_RETRY_AFTER_SECS).
///
/// Values that do not fit a `Duration` are capped too rather than dropped.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let seconds: f64 = value.trim().parse().ok()?;
    if seconds.is_nan() || seconds < 0.0 {
        return None;
    }
    let cap = Duration::from_secs(crate::defaults::MAX_RETRY_AFTER_SECS);
    Some(Duration::try_from_secs_f64(seconds).map_or(cap, |d| d.min(cap)))
}

// OpenAI wraps errors as {"error": {"message": "..."}}; fall back to the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "no response body".to_string()
            } else {
                trimmed.to_string()
            }
        })
}

/// Parse a transcription response body.
///
/// Segments are only reported when they were requested and present.
pub fn parse_transcription(
    body: &str,
    segments_requested: bool,
) -> Result<ChunkTranscript, ProviderError> {
    let response: TranscriptionResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::MalformedResponse {
            message: format!("transcription response: {e}"),
        })?;

    let segments = match (segments_requested, response.segments) {
        (true, Some(raw)) => Some(
            raw.into_iter()
                .filter(|s| !s.text.trim().is_empty())
                .map(|s| ChunkSegment {
                    start: s.start,
                    end: s.end,
                    text: s.text.trim().to_string(),
                })
                .collect(),
        ),
        _ => None,
    };

    Ok(ChunkTranscript {
        text: response.text.trim().to_string(),
        segments,
        language: response.language.filter(|l| !l.is_empty()),
        duration_secs: response.duration,
    })
}

/// Extract the Markdown from a chat-completions body.
pub fn parse_chat_completion(body: &str) -> Result<String, ProviderError> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::MalformedResponse {
            message: format!("chat completion response: {e}"),
        })?;
    response
        .choices
        .into_iter()
        .filter_map(|c| c.message.content)
        .map(|content| content.trim().to_string())
        .find(|content| !content.is_empty())
        .ok_or_else(|| ProviderError::MalformedResponse {
            message: "chat completion contained no text".to_string(),
        })
}
