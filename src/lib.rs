//! minutes - Meeting recording to transcript and minutes
//!
//! Runs a recording through validate, normalize, chunk, transcribe,
//! generate and write_outputs, keeping a durable manifest of every step.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod clock;
pub mod config;
pub mod defaults;
#[cfg(feature = "cli")]
pub mod diagnostics;
pub mod error;
pub mod export;
pub mod files;
pub mod manifest;
pub mod output;
pub mod pipeline;
pub mod provider;

// Collaborator seams
pub use audio::{AudioTool, CommandExecutor, FfmpegTool, SystemCommandExecutor};
pub use export::{DocxExporter, PandocExporter};
pub use clock::{Clock, SystemClock};
pub use provider::{MinutesGenerator, Transcriber};

// Run engine
pub use manifest::{Manifest, ManifestStore, Step, StepStatus};
pub use pipeline::{Orchestrator, RunConfig, RunReport, RunState};

// Error handling
pub use error::{ErrorKind, PipelineError, ProviderError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
