//! Error types for minutes.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure returned by an external provider (transcription or minutes generation).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("rate limited by provider: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("network error: {message}")]
    Network { message: String },

    #[error("provider server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("authentication failed: {message}")]
    Auth { message: String },

    #[error("malformed provider response: {message}")]
    MalformedResponse { message: String },

    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
}

impl ProviderError {
    /// Returns true if the same call may succeed when repeated.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. }
                | ProviderError::Network { .. }
                | ProviderError::Server { .. }
        )
    }

    /// Delay the provider asked for before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    // Input and precondition errors
    #[error("Validation failed: {message}")]
    Validation { message: String },

    // External tool errors (ffmpeg)
    #[error("{tool} failed: {message}")]
    ToolInvocation { tool: String, message: String },

    // Provider errors (transcription, minutes generation)
    #[error("{operation} failed")]
    Provider {
        operation: String,
        #[source]
        source: ProviderError,
    },

    // Chunk result errors
    #[error("Aggregation failed: {message}")]
    Aggregation { message: String },

    // File system errors
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Manifest bookkeeping errors
    #[error("Manifest error: {message}")]
    Manifest { message: String },
}

impl PipelineError {
    pub fn validation(message: impl Into<String>) -> Self {
        PipelineError::Validation {
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn provider(operation: impl Into<String>, source: ProviderError) -> Self {
        PipelineError::Provider {
            operation: operation.into(),
            source,
        }
    }

    /// Classification recorded in the manifest for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Validation { .. } => ErrorKind::ValidationError,
            PipelineError::ToolInvocation { .. } => ErrorKind::ToolInvocationError,
            PipelineError::Provider { .. } => ErrorKind::ProviderError,
            PipelineError::Aggregation { .. } => ErrorKind::AggregationError,
            PipelineError::Io { .. } => ErrorKind::IoError,
            PipelineError::Manifest { .. } => ErrorKind::ManifestError,
        }
    }

    /// Renders the `source()` chain, one cause per line.
    pub fn cause_chain(&self) -> String {
        let mut lines = vec![self.to_string()];
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            lines.push(format!("caused by: {cause}"));
            source = cause.source();
        }
        lines.join("\n")
    }
}

/// Error classification persisted in step records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    ToolInvocationError,
    ProviderError,
    AggregationError,
    IoError,
    ManifestError,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::ToolInvocationError => "tool_invocation_error",
            ErrorKind::ProviderError => "provider_error",
            ErrorKind::AggregationError => "aggregation_error",
            ErrorKind::IoError => "io_error",
            ErrorKind::ManifestError => "manifest_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_validation_display() {
        let error = PipelineError::validation("input not found: /tmp/x.mp3");
        assert_eq!(
            error.to_string(),
            "Validation failed: input not found: /tmp/x.mp3"
        );
    }

    #[test]
    fn test_tool_invocation_display() {
        let error = PipelineError::ToolInvocation {
            tool: "ffmpeg".to_string(),
            message: "exit status 1".to_string(),
        };
        assert_eq!(error.to_string(), "ffmpeg failed: exit status 1");
    }

    #[test]
    fn test_io_display_includes_path() {
        let error = PipelineError::io(
            "/out/transcript.txt",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(error.to_string(), "I/O error at /out/transcript.txt: denied");
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            PipelineError::validation("x").kind(),
            ErrorKind::ValidationError
        );
        assert_eq!(
            PipelineError::Aggregation {
                message: "x".to_string()
            }
            .kind(),
            ErrorKind::AggregationError
        );
        assert_eq!(
            PipelineError::provider(
                "transcription",
                ProviderError::Auth {
                    message: "bad key".to_string()
                }
            )
            .kind(),
            ErrorKind::ProviderError
        );
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::ToolInvocationError).unwrap();
        assert_eq!(json, "\"tool_invocation_error\"");
        assert_eq!(ErrorKind::ToolInvocationError.to_string(), "tool_invocation_error");
    }

    #[test]
    fn test_transient_classification() {
        assert!(
            ProviderError::RateLimited {
                message: "slow down".to_string(),
                retry_after: None
            }
            .is_transient()
        );
        assert!(
            ProviderError::Network {
                message: "reset".to_string()
            }
            .is_transient()
        );
        assert!(
            ProviderError::Server {
                status: 503,
                message: "unavailable".to_string()
            }
            .is_transient()
        );
        assert!(
            !ProviderError::Auth {
                message: "bad key".to_string()
            }
            .is_transient()
        );
        assert!(
            !ProviderError::MalformedResponse {
                message: "no text".to_string()
            }
            .is_transient()
        );
        assert!(
            !ProviderError::Rejected {
                status: 400,
                message: "bad file".to_string()
            }
            .is_transient()
        );
    }

    #[test]
    fn test_retry_after_only_for_rate_limit() {
        let limited = ProviderError::RateLimited {
            message: "wait".to_string(),
            retry_after: Some(Duration::from_secs(2)),
        };
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(2)));

        let server = ProviderError::Server {
            status: 500,
            message: "boom".to_string(),
        };
        assert_eq!(server.retry_after(), None);
    }

    #[test]
    fn test_cause_chain_lists_sources() {
        let error = PipelineError::provider(
            "transcription of chunk 3",
            ProviderError::Server {
                status: 502,
                message: "bad gateway".to_string(),
            },
        );
        let chain = error.cause_chain();
        assert_eq!(
            chain,
            "transcription of chunk 3 failed\ncaused by: provider server error (502): bad gateway"
        );
    }

    #[test]
    fn test_error_source_chain_io() {
        let error = PipelineError::io(
            "/x",
            io::Error::new(io::ErrorKind::NotFound, "missing"),
        );
        let error_trait: &dyn std::error::Error = &error;
        assert!(error_trait.source().is_some());
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<PipelineError>();
        assert_sync::<PipelineError>();
        assert_send::<ProviderError>();
    }
}
