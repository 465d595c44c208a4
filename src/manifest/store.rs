//! In-memory manifest with guarded status transitions and persistence.

use super::model::{ArtifactUpdate, Manifest, Step, StepError, StepStatus};
use crate::clock::Clock;
use crate::error::{PipelineError, Result};
use crate::files;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// When the manifest is written to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Persistence {
    /// Rewrite after every step transition.
    #[default]
    EachStep,
    /// Write once, when the run concludes.
    OnFinish,
}

impl Persistence {
    pub fn as_str(self) -> &'static str {
        match self {
            Persistence::EachStep => "each-step",
            Persistence::OnFinish => "on-finish",
        }
    }
}

impl fmt::Display for Persistence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Persistence {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "each-step" => Ok(Persistence::EachStep),
            "on-finish" => Ok(Persistence::OnFinish),
            other => Err(format!(
                "Unknown persistence policy: {other} (expected each-step or on-finish)"
            )),
        }
    }
}

/// Single source of truth for a run's outcome.
///
/// Status only moves `pending -> running -> success|failed`, and a step may
/// only start once every predecessor has succeeded.
pub struct ManifestStore {
    manifest: Manifest,
    clock: Arc<dyn Clock>,
    path: Option<PathBuf>,
    persistence: Persistence,
}

impl ManifestStore {
    pub fn new(manifest: Manifest, clock: Arc<dyn Clock>) -> Self {
        Self {
            manifest,
            clock,
            path: None,
            persistence: Persistence::default(),
        }
    }

    /// Persist to `path` according to `persistence`.
    pub fn with_persistence(mut self, path: impl Into<PathBuf>, persistence: Persistence) -> Self {
        self.path = Some(path.into());
        self.persistence = persistence;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn record_step_start(&mut self, step: Step) -> Result<()> {
        if let Some(blocker) = step
            .predecessors()
            .iter()
            .find(|p| self.manifest.status(**p) != StepStatus::Success)
        {
            return Err(PipelineError::Manifest {
                message: format!(
                    "cannot start {step}: {blocker} is {}",
                    self.manifest.status(*blocker)
                ),
            });
        }
        self.expect_status(step, StepStatus::Pending, "start")?;

        let now = self.clock.now();
        let record = self.manifest.steps.entry(step).or_default();
        record.status = StepStatus::Running;
        record.started_at = Some(now);
        self.checkpoint();
        Ok(())
    }

    /// Mark `step` successful and merge the artifacts it produced.
    pub fn record_step_success(&mut self, step: Step, update: ArtifactUpdate) -> Result<()> {
        if update.step() != step {
            return Err(PipelineError::Manifest {
                message: format!("{step} cannot record artifacts of {}", update.step()),
            });
        }
        self.expect_status(step, StepStatus::Running, "complete")?;

        let now = self.clock.now();
        let record = self.manifest.steps.entry(step).or_default();
        record.status = StepStatus::Success;
        record.ended_at = Some(now);
        record.duration_ms = elapsed_ms(record.started_at, now);
        self.manifest.artifacts.apply(update);
        self.checkpoint();
        Ok(())
    }

    /// Mark `step` failed.
    ///
    /// Safe to call again for a step that is already failed: the first
    /// recorded error wins. Fails only for a step that already succeeded.
    pub fn record_step_failure(&mut self, step: Step, error: StepError) -> Result<()> {
        match self.manifest.status(step) {
            StepStatus::Failed => return Ok(()),
            StepStatus::Success => {
                return Err(PipelineError::Manifest {
                    message: format!("cannot fail {step}: already succeeded"),
                });
            }
            StepStatus::Pending | StepStatus::Running => {}
        }

        let now = self.clock.now();
        self.manifest
            .errors
            .push(format!("{step}: {}: {}", error.kind, error.message));
        let record = self.manifest.steps.entry(step).or_default();
        record.status = StepStatus::Failed;
        record.ended_at = Some(now);
        record.duration_ms = elapsed_ms(record.started_at, now);
        record.error = Some(error);
        self.checkpoint();
        Ok(())
    }

    /// Record how many provider calls `step` made, retries included.
    pub fn set_provider_calls(&mut self, step: Step, calls: u32) {
        self.manifest.steps.entry(step).or_default().provider_calls = Some(calls);
    }

    /// Merge context entries into `step`'s record; later values replace earlier ones.
    pub fn set_step_context(
        &mut self,
        step: Step,
        context: impl IntoIterator<Item = (String, String)>,
    ) {
        self.manifest
            .steps
            .entry(step)
            .or_default()
            .context
            .extend(context);
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn snapshot(&self) -> Manifest {
        self.manifest.clone()
    }

    /// Write the manifest now, regardless of policy.
    pub fn persist(&mut self) -> Result<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        self.manifest.updated_at = self.clock.now();
        let json = self.manifest.to_json_pretty()?;
        files::write_atomic(&path, files::with_trailing_newline(&json).as_bytes())
    }

    /// Final write once the run has concluded.
    pub fn finish(&mut self) -> Result<Manifest> {
        self.persist()?;
        Ok(self.snapshot())
    }

    fn checkpoint(&mut self) {
        if self.persistence != Persistence::EachStep {
            return;
        }
        // The final write in `finish` still reports failures.
        if let Err(e) = self.persist() {
            tracing::warn!(error = %e, "manifest checkpoint failed");
        }
    }

    fn expect_status(&self, step: Step, expected: StepStatus, action: &str) -> Result<()> {
        let actual = self.manifest.status(step);
        if actual == expected {
            Ok(())
        } else {
            Err(PipelineError::Manifest {
                message: format!("cannot {action} {step}: status is {actual}"),
            })
        }
    }
}

fn elapsed_ms(
    started: Option<chrono::DateTime<chrono::Utc>>,
    ended: chrono::DateTime<chrono::Utc>,
) -> Option<u64> {
    started.map(|s| u64::try_from((ended - s).num_milliseconds()).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::error::ErrorKind;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn store() -> ManifestStore {
        let start = Utc.with_ymd_and_hms(2026, 5, 6, 9, 0, 0).unwrap();
        let clock = MockClock::new(start);
        ManifestStore::new(Manifest::new("run-test", start), Arc::new(clock))
    }

    fn validated() -> ArtifactUpdate {
        ArtifactUpdate::Validated {
            input_path: "/in/meeting.mp3".to_string(),
            input_sha256: "ab".to_string(),
        }
    }

    fn step_error(message: &str) -> StepError {
        StepError {
            kind: ErrorKind::ToolInvocationError,
            message: message.to_string(),
            traceback: None,
            context: None,
        }
    }

    #[test]
    fn test_start_then_success() {
        let mut store = store();
        store.record_step_start(Step::Validate).unwrap();
        assert_eq!(store.manifest().status(Step::Validate), StepStatus::Running);

        store.record_step_success(Step::Validate, validated()).unwrap();
        let record = store.manifest().record(Step::Validate).unwrap();
        assert_eq!(record.status, StepStatus::Success);
        assert!(record.started_at.unwrap() < record.ended_at.unwrap());
        assert_eq!(record.duration_ms, Some(1));
        assert_eq!(
            store.manifest().artifacts.input_path.as_deref(),
            Some("/in/meeting.mp3")
        );
    }

    #[test]
    fn test_start_requires_predecessors_success() {
        let mut store = store();
        let result = store.record_step_start(Step::Normalize);
        assert!(matches!(result, Err(PipelineError::Manifest { .. })));
        assert_eq!(store.manifest().status(Step::Normalize), StepStatus::Pending);
    }

    #[test]
    fn test_cannot_start_twice() {
        let mut store = store();
        store.record_step_start(Step::Validate).unwrap();
        assert!(store.record_step_start(Step::Validate).is_err());
    }

    #[test]
    fn test_success_requires_running() {
        let mut store = store();
        let result = store.record_step_success(Step::Validate, validated());
        assert!(result.is_err());
        assert!(store.manifest().artifacts.input_path.is_none());
    }

    #[test]
    fn test_success_rejects_foreign_artifacts() {
        let mut store = store();
        store.record_step_start(Step::Validate).unwrap();
        let update = ArtifactUpdate::Normalized {
            path: "normalized.wav".to_string(),
            sha256: "cd".to_string(),
        };
        assert!(store.record_step_success(Step::Validate, update).is_err());
        assert!(store.manifest().artifacts.normalized_audio_path.is_none());
    }

    #[test]
    fn test_failure_is_idempotent() {
        let mut store = store();
        store.record_step_start(Step::Validate).unwrap();
        store
            .record_step_failure(Step::Validate, step_error("first"))
            .unwrap();
        store
            .record_step_failure(Step::Validate, step_error("second"))
            .unwrap();

        let record = store.manifest().record(Step::Validate).unwrap();
        assert_eq!(record.status, StepStatus::Failed);
        assert_eq!(record.error.as_ref().unwrap().message, "first");
        assert_eq!(
            store.manifest().errors,
            vec!["validate: tool_invocation_error: first".to_string()]
        );
    }

    #[test]
    fn test_failure_after_success_is_rejected() {
        let mut store = store();
        store.record_step_start(Step::Validate).unwrap();
        store.record_step_success(Step::Validate, validated()).unwrap();
        assert!(
            store
                .record_step_failure(Step::Validate, step_error("late"))
                .is_err()
        );
        assert_eq!(store.manifest().status(Step::Validate), StepStatus::Success);
    }

    #[test]
    fn test_failure_of_pending_step_has_no_duration() {
        let mut store = store();
        store
            .record_step_failure(Step::Validate, step_error("never ran"))
            .unwrap();
        let record = store.manifest().record(Step::Validate).unwrap();
        assert!(record.started_at.is_none());
        assert!(record.ended_at.is_some());
        assert!(record.duration_ms.is_none());
    }

    #[test]
    fn test_no_path_persist_is_noop() {
        let mut store = store();
        store.persist().unwrap();
        assert!(store.path().is_none());
    }

    #[test]
    fn test_each_step_writes_after_transition() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest.json");
        let mut store = store().with_persistence(&path, Persistence::EachStep);

        store.record_step_start(Step::Validate).unwrap();
        let on_disk = Manifest::load(&path).unwrap();
        assert_eq!(on_disk.status(Step::Validate), StepStatus::Running);
    }

    #[test]
    fn test_on_finish_writes_only_at_end() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest.json");
        let mut store = store().with_persistence(&path, Persistence::OnFinish);

        store.record_step_start(Step::Validate).unwrap();
        store.record_step_success(Step::Validate, validated()).unwrap();
        assert!(!path.exists());

        let manifest = store.finish().unwrap();
        let on_disk = Manifest::load(&path).unwrap();
        assert_eq!(on_disk, manifest);
        assert!(on_disk.updated_at > on_disk.created_at);
    }

    #[test]
    fn test_persistence_parse() {
        assert_eq!("on-finish".parse::<Persistence>(), Ok(Persistence::OnFinish));
        assert_eq!(Persistence::EachStep.to_string(), "each-step");
        assert!("sometimes".parse::<Persistence>().is_err());
    }

    #[test]
    fn test_step_context_merges() {
        let mut store = store();
        store.set_step_context(Step::Chunk, [("chunk_seconds".to_string(), "600".to_string())]);
        store.set_step_context(
            Step::Chunk,
            [
                ("chunk_seconds".to_string(), "300".to_string()),
                ("chunks_dir".to_string(), "chunks".to_string()),
            ],
        );
        let context = &store.manifest().record(Step::Chunk).unwrap().context;
        assert_eq!(context.len(), 2);
        assert_eq!(context["chunk_seconds"], "300");
        assert_eq!(context["chunks_dir"], "chunks");
    }
}
