use crate::error::{PipelineError, ProviderError, Result};
use crate::files;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Version tag of [`DEFAULT_MINUTES_PROMPT`].
pub const DEFAULT_PROMPT_VERSION: &str = "minutes_v1";

/// Built-in minutes prompt, used when no prompt file is configured.
pub const DEFAULT_MINUTES_PROMPT: &str = "\
You are writing the minutes of a meeting from its transcript.

Return Markdown only. Do not use code fences.

Structure:
# Meeting minutes
## Summary
A short paragraph describing the purpose and outcome of the meeting.
## Discussion
Bullet points grouped by topic. Attribute statements to speakers only when the transcript makes the speaker clear.
## Decisions
Bullet points. Write \"None recorded.\" if there were none.
## Action items
Prefer action items as a Markdown table with the columns Owner, Action and Due. Leave a cell empty rather than guessing.

Stay faithful to the transcript. Do not invent names, dates or figures.
";

/// Minutes prompt plus its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedPrompt {
    pub text: String,
    /// SHA-256 of the prompt bytes.
    pub hash: String,
    /// `None` for the built-in prompt.
    pub path: Option<PathBuf>,
}

/// Load the prompt at `path`, or the built-in one.
pub fn load_prompt(path: Option<&Path>) -> Result<LoadedPrompt> {
    let Some(path) = path else {
        return Ok(LoadedPrompt {
            text: DEFAULT_MINUTES_PROMPT.to_string(),
            hash: files::sha256_bytes(DEFAULT_MINUTES_PROMPT.as_bytes()),
            path: None,
        });
    };

    if !path.is_file() {
        return Err(PipelineError::validation(format!(
            "minutes prompt not found: {}",
            path.display()
        )));
    }
    let bytes = std::fs::read(path).map_err(|e| PipelineError::io(path, e))?;
    let text = String::from_utf8(bytes.clone()).map_err(|_| {
        PipelineError::validation(format!("minutes prompt is not UTF-8: {}", path.display()))
    })?;
    if text.trim().is_empty() {
        return Err(PipelineError::validation(format!(
            "minutes prompt is empty: {}",
            path.display()
        )));
    }

    Ok(LoadedPrompt {
        text,
        hash: files::sha256_bytes(&bytes),
        path: Some(path.to_path_buf()),
    })
}

/// Input to a minutes generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct MinutesRequest {
    pub prompt: String,
    pub transcript: String,
    pub extra_context: BTreeMap<String, String>,
}

impl MinutesRequest {
    /// Single user message sent to the text model.
    ///
    /// ```
    /// use minutes::provider::MinutesRequest;
    /// use std::collections::BTreeMap;
    ///
    /// let request = MinutesRequest {
    ///     prompt: "Summarize.".to_string(),
    ///     transcript: "We agreed to ship.".to_string(),
    ///     extra_context: BTreeMap::from([("team".to_string(), "infra".to_string())]),
    /// };
    /// assert_eq!(
    ///     request.message(),
    ///     "Summarize.\n\nTranscript:\nWe agreed to ship.\n\nExtra context:\n- team: infra"
    /// );
    /// ```
    pub fn message(&self) -> String {
        let mut parts = vec![
            self.prompt.trim().to_string(),
            String::new(),
            "Transcript:".to_string(),
            self.transcript.trim().to_string(),
        ];
        if !self.extra_context.is_empty() {
            parts.push(String::new());
            parts.push("Extra context:".to_string());
            for (key, value) in &self.extra_context {
                parts.push(format!("- {key}: {value}"));
            }
        }
        parts.join("\n").trim().to_string()
    }
}

/// Trait for turning a transcript into Markdown minutes.
pub trait MinutesGenerator: Send + Sync {
    fn generate(&self, request: &MinutesRequest) -> std::result::Result<String, ProviderError>;

    fn model_name(&self) -> &str;
}

impl<T: MinutesGenerator + ?Sized> MinutesGenerator for Arc<T> {
    fn generate(&self, request: &MinutesRequest) -> std::result::Result<String, ProviderError> {
        (**self).generate(request)
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

/// Mock minutes generator for testing.
#[derive(Debug)]
pub struct MockMinutesGenerator {
    model_name: String,
    response: Option<String>,
    failure: Option<ProviderError>,
    calls: AtomicU32,
    last_message: std::sync::Mutex<Option<String>>,
}

impl MockMinutesGenerator {
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            response: None,
            failure: None,
            calls: AtomicU32::new(0),
            last_message: std::sync::Mutex::new(None),
        }
    }

    /// Markdown to return instead of the default echo.
    pub fn with_response(mut self, markdown: &str) -> Self {
        self.response = Some(markdown.to_string());
        self
    }

    pub fn with_failure(mut self, error: ProviderError) -> Self {
        self.failure = Some(error);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Message of the most recent call.
    pub fn last_message(&self) -> Option<String> {
        self.last_message
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl MinutesGenerator for MockMinutesGenerator {
    fn generate(&self, request: &MinutesRequest) -> std::result::Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_message.lock().unwrap_or_else(|e| e.into_inner()) = Some(request.message());

        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        Ok(self.response.clone().unwrap_or_else(|| {
            format!("# Meeting minutes\n\n{}\n", request.transcript.trim())
        }))
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_prompt_is_loadable() {
        let prompt = load_prompt(None).unwrap();
        assert!(prompt.path.is_none());
        assert!(prompt.text.contains("Return Markdown only"));
        assert!(prompt.text.contains("Do not use code fences"));
        assert_eq!(prompt.hash.len(), 64);
    }

    #[test]
    fn test_load_prompt_from_file_records_hash() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prompt.md");
        std::fs::write(&path, "Write minutes.\n").unwrap();

        let prompt = load_prompt(Some(&path)).unwrap();
        assert_eq!(prompt.text, "Write minutes.\n");
        assert_eq!(prompt.hash, files::sha256_bytes(b"Write minutes.\n"));
        assert_eq!(prompt.path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_empty_prompt_is_validation_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prompt.md");
        std::fs::write(&path, "  \n\n").unwrap();

        let result = load_prompt(Some(&path));
        assert!(matches!(result, Err(PipelineError::Validation { .. })));
    }

    #[test]
    fn test_missing_prompt_is_validation_error() {
        let dir = TempDir::new().unwrap();
        let result = load_prompt(Some(&dir.path().join("absent.md")));
        assert!(matches!(result, Err(PipelineError::Validation { .. })));
    }

    #[test]
    fn test_message_without_context() {
        let request = MinutesRequest {
            prompt: "  Prompt  \n".to_string(),
            transcript: "\nHello there.\n".to_string(),
            extra_context: BTreeMap::new(),
        };
        assert_eq!(request.message(), "Prompt\n\nTranscript:\nHello there.");
    }

    #[test]
    fn test_message_context_sorted_by_key() {
        let request = MinutesRequest {
            prompt: "P".to_string(),
            transcript: "T".to_string(),
            extra_context: BTreeMap::from([
                ("zeta".to_string(), "last".to_string()),
                ("alpha".to_string(), "first".to_string()),
            ]),
        };
        assert!(
            request
                .message()
                .ends_with("Extra context:\n- alpha: first\n- zeta: last")
        );
    }

    #[test]
    fn test_mock_records_calls_and_message() {
        let generator = MockMinutesGenerator::new("gpt-test").with_response("# Notes");
        let request = MinutesRequest {
            prompt: "P".to_string(),
            transcript: "T".to_string(),
            extra_context: BTreeMap::new(),
        };
        assert_eq!(generator.generate(&request).unwrap(), "# Notes");
        assert_eq!(generator.calls(), 1);
        assert_eq!(
            generator.last_message().as_deref(),
            Some("P\n\nTranscript:\nT")
        );
    }
}
