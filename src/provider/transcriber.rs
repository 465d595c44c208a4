use crate::defaults;
use crate::error::ProviderError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One chunk handed to a transcription provider.
#[derive(Debug, Clone)]
pub struct ChunkRequest {
    pub chunk_index: usize,
    pub file_name: String,
    /// WAV bytes of the chunk.
    pub audio: Vec<u8>,
    pub language: Option<String>,
    pub prompt: Option<String>,
    /// Ask for timed segments. Ignored by providers that cannot return them.
    pub segments: bool,
}

/// Timed span inside one chunk, relative to the chunk start.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Provider result for one chunk.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChunkTranscript {
    pub text: String,
    /// `None` when the provider returned plain text only.
    pub segments: Option<Vec<ChunkSegment>>,
    /// Detected language, if reported.
    pub language: Option<String>,
    /// Audio length the provider reported for this chunk.
    pub duration_secs: Option<f64>,
}

impl ChunkTranscript {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// Trait for chunk transcription.
///
/// Implementations make exactly one provider call per `transcribe`; retries
/// are applied by the caller.
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, request: &ChunkRequest) -> Result<ChunkTranscript, ProviderError>;

    /// Provider name recorded in the manifest (e.g. "openai").
    fn provider_name(&self) -> &str;

    fn model_name(&self) -> &str;

    /// Whether this provider/model can return timed segments at all.
    fn supports_segments(&self) -> bool;
}

impl<T: Transcriber + ?Sized> Transcriber for Arc<T> {
    fn transcribe(&self, request: &ChunkRequest) -> Result<ChunkTranscript, ProviderError> {
        (**self).transcribe(request)
    }

    fn provider_name(&self) -> &str {
        (**self).provider_name()
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn supports_segments(&self) -> bool {
        (**self).supports_segments()
    }
}

/// Mock transcriber for testing.
///
/// Returns `"chunk N"` for chunk N unless told otherwise, and can script
/// transient failures, permanent failures and per-chunk delays.
#[derive(Debug, Default)]
pub struct MockTranscriber {
    model_name: String,
    responses: HashMap<usize, String>,
    segments: bool,
    plain_text_chunks: Vec<usize>,
    transient_failures: HashMap<usize, u32>,
    permanent_failures: HashMap<usize, ProviderError>,
    delays: HashMap<usize, Duration>,
    calls: AtomicU32,
    calls_per_chunk: Mutex<HashMap<usize, u32>>,
}

impl MockTranscriber {
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            ..Self::default()
        }
    }

    /// Text returned for `chunk_index`.
    pub fn with_response(mut self, chunk_index: usize, text: &str) -> Self {
        self.responses.insert(chunk_index, text.to_string());
        self
    }

    /// Return one segment spanning each chunk when segments are requested.
    pub fn with_segments(mut self) -> Self {
        self.segments = true;
        self
    }

    /// Return plain text for `chunk_index` even when segments are requested.
    pub fn without_segments_for(mut self, chunk_index: usize) -> Self {
        self.plain_text_chunks.push(chunk_index);
        self
    }

    /// Fail the first `times` calls for `chunk_index` with a 503.
    pub fn with_transient_failures(mut self, chunk_index: usize, times: u32) -> Self {
        self.transient_failures.insert(chunk_index, times);
        self
    }

    /// Fail every call for `chunk_index` with `error`.
    pub fn with_failure(mut self, chunk_index: usize, error: ProviderError) -> Self {
        self.permanent_failures.insert(chunk_index, error);
        self
    }

    /// Sleep before answering for `chunk_index`.
    pub fn with_delay(mut self, chunk_index: usize, delay: Duration) -> Self {
        self.delays.insert(chunk_index, delay);
        self
    }

    /// Total calls across all chunks.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, chunk_index: usize) -> u32 {
        self.calls_per_chunk
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&chunk_index)
            .copied()
            .unwrap_or(0)
    }
}

impl Transcriber for MockTranscriber {
    fn transcribe(&self, request: &ChunkRequest) -> Result<ChunkTranscript, ProviderError> {
        let index = request.chunk_index;
        self.calls.fetch_add(1, Ordering::SeqCst);
        let attempt = {
            let mut per_chunk = self
                .calls_per_chunk
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            let count = per_chunk.entry(index).or_insert(0);
            *count += 1;
            *count
        };

        if let Some(delay) = self.delays.get(&index) {
            std::thread::sleep(*delay);
        }
        if let Some(error) = self.permanent_failures.get(&index) {
            return Err(error.clone());
        }
        if attempt <= self.transient_failures.get(&index).copied().unwrap_or(0) {
            return Err(ProviderError::Server {
                status: 503,
                message: format!("mock outage on chunk {index}, attempt {attempt}"),
            });
        }

        let text = self
            .responses
            .get(&index)
            .cloned()
            .unwrap_or_else(|| format!("chunk {index}"));
        let segments = (request.segments
            && self.segments
            && !self.plain_text_chunks.contains(&index))
        .then(|| {
            vec![ChunkSegment {
                start: 0.0,
                end: 1.0,
                text: text.clone(),
            }]
        });

        Ok(ChunkTranscript {
            text,
            segments,
            language: request.language.clone(),
            duration_secs: None,
        })
    }

    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model_name(&self) -> &str {
        if self.model_name.is_empty() {
            defaults::TRANSCRIPTION_MODEL
        } else {
            &self.model_name
        }
    }

    fn supports_segments(&self) -> bool {
        self.segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(chunk_index: usize) -> ChunkRequest {
        ChunkRequest {
            chunk_index,
            file_name: format!("chunk_{chunk_index:04}.wav"),
            audio: vec![0u8; 44],
            language: Some("en".to_string()),
            prompt: None,
            segments: true,
        }
    }

    #[test]
    fn test_mock_default_response_names_chunk() {
        let transcriber = MockTranscriber::new("test-model");
        let result = transcriber.transcribe(&request(2)).unwrap();
        assert_eq!(result.text, "chunk 2");
        assert_eq!(result.language.as_deref(), Some("en"));
        assert!(result.segments.is_none());
    }

    #[test]
    fn test_mock_transient_failures_then_success() {
        let transcriber = MockTranscriber::new("m").with_transient_failures(0, 2);

        let first = transcriber.transcribe(&request(0)).unwrap_err();
        assert!(first.is_transient());
        assert!(transcriber.transcribe(&request(0)).is_err());
        assert!(transcriber.transcribe(&request(0)).is_ok());
        assert_eq!(transcriber.calls_for(0), 3);
        assert_eq!(transcriber.calls(), 3);
    }

    #[test]
    fn test_mock_permanent_failure() {
        let transcriber = MockTranscriber::new("m").with_failure(
            1,
            ProviderError::Auth {
                message: "bad key".to_string(),
            },
        );
        assert!(transcriber.transcribe(&request(0)).is_ok());
        let error = transcriber.transcribe(&request(1)).unwrap_err();
        assert!(!error.is_transient());
    }

    #[test]
    fn test_mock_segments_respect_request_and_overrides() {
        let transcriber = MockTranscriber::new("m")
            .with_segments()
            .without_segments_for(1);
        assert!(transcriber.supports_segments());
        assert!(transcriber.transcribe(&request(0)).unwrap().segments.is_some());
        assert!(transcriber.transcribe(&request(1)).unwrap().segments.is_none());

        let mut plain = request(0);
        plain.segments = false;
        assert!(transcriber.transcribe(&plain).unwrap().segments.is_none());
    }

    #[test]
    fn test_transcriber_trait_is_object_safe() {
        let transcriber: Arc<dyn Transcriber> =
            Arc::new(MockTranscriber::new("boxed").with_response(0, "hello"));
        assert_eq!(transcriber.model_name(), "boxed");
        assert_eq!(transcriber.provider_name(), "mock");
        assert_eq!(transcriber.transcribe(&request(0)).unwrap().text, "hello");
    }
}
