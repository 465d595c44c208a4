//! Step-sequenced run engine.
//!
//! The orchestrator drives each step through the executor, which records
//! status and artifacts in the manifest store. Only the transcribe step
//! fans out, over a bounded worker pool joined before aggregation.

pub mod aggregator;
pub mod executor;
pub mod orchestrator;
pub mod paths;
pub mod retry;
mod stages;

pub use aggregator::{AggregatedTranscript, ChunkResult, TranscriptSegment, aggregate};
pub use executor::{StepContext, StepExecutor, StepOutcome};
pub use orchestrator::{Orchestrator, RunConfig, RunReport, RunState, derive_run_id};
pub use paths::RunPaths;
pub use retry::{Attempts, RetryPolicy, with_retries};
