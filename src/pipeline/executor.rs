//! Runs one step body and records its outcome in the manifest store.

use crate::error::{PipelineError, Result};
use crate::manifest::{ArtifactUpdate, FailureContext, Manifest, ManifestStore, Step, StepError};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

/// What the orchestrator should do after a step.
#[derive(Debug, PartialEq)]
pub enum StepOutcome<T> {
    /// The step succeeded; its output feeds the next step.
    Continue(T),
    /// The step failed and was recorded; schedule nothing further.
    Halt,
}

/// Per-step state shared with the step body.
#[derive(Debug)]
pub struct StepContext {
    step: Step,
    provider_calls: AtomicU32,
    entries: Mutex<BTreeMap<String, String>>,
}

impl StepContext {
    fn new(step: Step) -> Self {
        Self {
            step,
            provider_calls: AtomicU32::new(0),
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn step(&self) -> Step {
        self.step
    }

    /// Count external provider calls. Safe to call from worker threads.
    pub fn add_provider_calls(&self, calls: u32) {
        self.provider_calls.fetch_add(calls, Ordering::SeqCst);
    }

    pub fn provider_calls(&self) -> u32 {
        self.provider_calls.load(Ordering::SeqCst)
    }

    /// Note a step parameter or path in the step's manifest record.
    pub fn set(&self, key: &str, value: impl Display) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }

    fn take_entries(&self) -> BTreeMap<String, String> {
        std::mem::take(&mut *self.entries.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Run-level location attached to every recorded failure.
#[derive(Debug, Clone)]
struct FailureSite {
    input_path: String,
    run_dir: String,
}

/// Wraps step bodies: marks them running, then success or failed.
///
/// Never retries; a failed body becomes [`StepOutcome::Halt`].
pub struct StepExecutor {
    store: ManifestStore,
    include_traceback: bool,
    site: Option<FailureSite>,
}

impl StepExecutor {
    pub fn new(store: ManifestStore, include_traceback: bool) -> Self {
        Self {
            store,
            include_traceback,
            site: None,
        }
    }

    /// Attach `input` and `run_dir` to the context of every recorded failure.
    pub fn with_failure_site(mut self, input: &Path, run_dir: &Path) -> Self {
        self.site = Some(FailureSite {
            input_path: input.display().to_string(),
            run_dir: run_dir.display().to_string(),
        });
        self
    }

    /// Run `body` as `step`.
    ///
    /// Body failures are recorded and turned into `Halt`. An `Err` means the
    /// manifest itself refused the transition, e.g. a predecessor has not succeeded.
    pub fn execute<T>(
        &mut self,
        step: Step,
        body: impl FnOnce(&StepContext) -> Result<(T, ArtifactUpdate)>,
    ) -> Result<StepOutcome<T>> {
        self.store.record_step_start(step)?;
        tracing::info!(step = %step, "step started");
        let started = Instant::now();

        let context = StepContext::new(step);
        let result = body(&context);
        let calls = context.provider_calls();
        if calls > 0 {
            self.store.set_provider_calls(step, calls);
        }
        let entries = context.take_entries();
        if !entries.is_empty() {
            self.store.set_step_context(step, entries);
        }

        let error = match result {
            Ok((value, update)) => match self.store.record_step_success(step, update) {
                Ok(()) => {
                    tracing::info!(
                        step = %step,
                        duration_ms = started.elapsed().as_millis() as u64,
                        provider_calls = calls,
                        "step succeeded"
                    );
                    return Ok(StepOutcome::Continue(value));
                }
                Err(e) => e,
            },
            Err(e) => e,
        };

        self.fail(step, &error)?;
        Ok(StepOutcome::Halt)
    }

    /// Record `error` against `step`; a no-op if the step already failed.
    pub fn fail(&mut self, step: Step, error: &PipelineError) -> Result<()> {
        tracing::error!(
            step = %step,
            error_kind = %error.kind(),
            error = %error,
            "step failed"
        );
        let mut step_error = StepError::from_error(error, self.include_traceback);
        if let Some(site) = &self.site {
            let step_context = self
                .store
                .manifest()
                .record(step)
                .map(|record| record.context.clone())
                .unwrap_or_default();
            step_error = step_error.with_context(FailureContext {
                step,
                input_path: site.input_path.clone(),
                run_dir: site.run_dir.clone(),
                step_context,
            });
        }
        self.store.record_step_failure(step, step_error)
    }

    pub fn manifest(&self) -> &Manifest {
        self.store.manifest()
    }

    /// Persist the final manifest and return it.
    pub fn finish(mut self) -> Result<Manifest> {
        self.store.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::error::{ErrorKind, ProviderError};
    use crate::manifest::StepStatus;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;

    fn executor(include_traceback: bool) -> StepExecutor {
        let start = Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).unwrap();
        let store = ManifestStore::new(Manifest::new("exec", start), Arc::new(MockClock::new(start)));
        StepExecutor::new(store, include_traceback)
    }

    fn validated() -> ArtifactUpdate {
        ArtifactUpdate::Validated {
            input_path: "in.wav".to_string(),
            input_sha256: "00".to_string(),
        }
    }

    #[test]
    fn test_success_continues_with_value() {
        let mut executor = executor(false);
        let outcome = executor
            .execute(Step::Validate, |_| Ok((42, validated())))
            .unwrap();
        assert_eq!(outcome, StepOutcome::Continue(42));
        assert_eq!(executor.manifest().status(Step::Validate), StepStatus::Success);
        assert_eq!(
            executor.manifest().artifacts.input_path.as_deref(),
            Some("in.wav")
        );
    }

    #[test]
    fn test_failure_halts_and_records_error() {
        let mut executor = executor(false);
        let outcome = executor
            .execute(Step::Validate, |_| -> Result<((), ArtifactUpdate)> {
                Err(PipelineError::validation("input not found: x.mp3"))
            })
            .unwrap();
        assert_eq!(outcome, StepOutcome::Halt);

        let record = executor.manifest().record(Step::Validate).unwrap();
        assert_eq!(record.status, StepStatus::Failed);
        let error = record.error.as_ref().unwrap();
        assert_eq!(error.kind, ErrorKind::ValidationError);
        assert!(error.traceback.is_none());
        assert!(executor.manifest().artifacts.input_path.is_none());
    }

    #[test]
    fn test_traceback_included_when_enabled() {
        let mut executor = executor(true);
        executor
            .execute(Step::Validate, |_| -> Result<((), ArtifactUpdate)> {
                Err(PipelineError::provider(
                    "minutes generation",
                    ProviderError::Auth {
                        message: "invalid key".to_string(),
                    },
                ))
            })
            .unwrap();
        let error = executor
            .manifest()
            .record(Step::Validate)
            .unwrap()
            .error
            .clone()
            .unwrap();
        assert_eq!(
            error.traceback.as_deref(),
            Some("minutes generation failed\ncaused by: authentication failed: invalid key")
        );
    }

    #[test]
    fn test_wrong_artifacts_fail_the_step() {
        let mut executor = executor(false);
        let outcome = executor
            .execute(Step::Validate, |_| {
                Ok((
                    (),
                    ArtifactUpdate::Normalized {
                        path: "normalized.wav".to_string(),
                        sha256: "00".to_string(),
                    },
                ))
            })
            .unwrap();
        assert_eq!(outcome, StepOutcome::Halt);
        let record = executor.manifest().record(Step::Validate).unwrap();
        assert_eq!(record.error.as_ref().unwrap().kind, ErrorKind::ManifestError);
    }

    #[test]
    fn test_out_of_order_step_is_refused() {
        let mut executor = executor(false);
        let result = executor.execute(Step::Chunk, |_| Ok(((), validated())));
        assert!(matches!(result, Err(PipelineError::Manifest { .. })));
        assert_eq!(executor.manifest().status(Step::Chunk), StepStatus::Pending);
    }

    #[test]
    fn test_provider_calls_recorded() {
        let mut executor = executor(false);
        executor
            .execute(Step::Validate, |ctx| {
                ctx.add_provider_calls(2);
                ctx.add_provider_calls(1);
                Ok(((), validated()))
            })
            .unwrap();
        let record = executor.manifest().record(Step::Validate).unwrap();
        assert_eq!(record.provider_calls, Some(3));
    }

    #[test]
    fn test_fail_is_idempotent_after_halt() {
        let mut executor = executor(false);
        executor
            .execute(Step::Validate, |_| -> Result<((), ArtifactUpdate)> {
                Err(PipelineError::validation("first"))
            })
            .unwrap();
        executor
            .fail(Step::Validate, &PipelineError::validation("outer handler"))
            .unwrap();
        let record = executor.manifest().record(Step::Validate).unwrap();
        assert_eq!(
            record.error.as_ref().unwrap().message,
            "Validation failed: first"
        );
        assert_eq!(executor.manifest().errors.len(), 1);
    }

    #[test]
    fn test_context_entries_recorded_on_success() {
        let mut executor = executor(false);
        executor
            .execute(Step::Validate, |ctx| {
                ctx.set("output_dir", "/out/run");
                ctx.set("chunk_seconds", 600);
                Ok(((), validated()))
            })
            .unwrap();
        let context = &executor.manifest().record(Step::Validate).unwrap().context;
        assert_eq!(context["output_dir"], "/out/run");
        assert_eq!(context["chunk_seconds"], "600");
    }

    #[test]
    fn test_failure_carries_site_and_step_context() {
        let mut executor =
            executor(false).with_failure_site(Path::new("/in/meeting.mp3"), Path::new("/out/run"));
        executor
            .execute(Step::Validate, |ctx| -> Result<((), ArtifactUpdate)> {
                ctx.set("output_dir", "/out/run");
                Err(PipelineError::validation("input is empty"))
            })
            .unwrap();
        let record = executor.manifest().record(Step::Validate).unwrap();
        assert_eq!(record.context["output_dir"], "/out/run");
        let context = record.error.as_ref().unwrap().context.clone().unwrap();
        assert_eq!(context.step, Step::Validate);
        assert_eq!(context.input_path, "/in/meeting.mp3");
        assert_eq!(context.run_dir, "/out/run");
        assert_eq!(context.step_context, record.context);
    }

    #[test]
    fn test_failure_without_site_has_no_context() {
        let mut executor = executor(false);
        executor
            .execute(Step::Validate, |_| -> Result<((), ArtifactUpdate)> {
                Err(PipelineError::validation("input is empty"))
            })
            .unwrap();
        let record = executor.manifest().record(Step::Validate).unwrap();
        assert!(record.error.as_ref().unwrap().context.is_none());
        assert!(record.context.is_empty());
    }
}
