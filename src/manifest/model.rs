//! Manifest data model: run identity, step records, artifacts.

use crate::error::{ErrorKind, PipelineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Manifest schema version.
pub const MANIFEST_VERSION: &str = "1";

/// Pipeline stage, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Validate,
    Normalize,
    Chunk,
    Transcribe,
    Generate,
    WriteOutputs,
}

impl Step {
    /// All steps in their fixed execution order.
    pub const ALL: [Step; 6] = [
        Step::Validate,
        Step::Normalize,
        Step::Chunk,
        Step::Transcribe,
        Step::Generate,
        Step::WriteOutputs,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Step::Validate => "validate",
            Step::Normalize => "normalize",
            Step::Chunk => "chunk",
            Step::Transcribe => "transcribe",
            Step::Generate => "generate",
            Step::WriteOutputs => "write_outputs",
        }
    }

    /// Position in the execution order.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Steps that must succeed before this one may start.
    pub fn predecessors(self) -> &'static [Step] {
        &Self::ALL[..self.index()]
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Step {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Step::ALL
            .into_iter()
            .find(|step| step.name() == s)
            .ok_or_else(|| format!("Unknown step: {s}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Success,
    Failed,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Success => "success",
            StepStatus::Failed => "failed",
        }
    }

    /// True for `success` and `failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, StepStatus::Success | StepStatus::Failed)
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a step was when it failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureContext {
    pub step: Step,
    pub input_path: String,
    pub run_dir: String,
    /// The step's own context entries at the time of failure.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub step_context: BTreeMap<String, String>,
}

/// Structured error recorded on a failed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<FailureContext>,
}

impl StepError {
    /// Captures `error`; the cause chain is kept only when `include_traceback` is set.
    pub fn from_error(error: &PipelineError, include_traceback: bool) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
            traceback: include_traceback.then(|| error.cause_chain()),
            context: None,
        }
    }

    pub fn with_context(mut self, context: FailureContext) -> Self {
        self.context = Some(context);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StepRecord {
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// External provider calls made by this step, retries included.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_calls: Option<u32>,
    /// Step parameters and paths, e.g. `chunk_seconds` or `provider`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
}

/// Artifact references accumulated over a run.
///
/// A field is set only once the step producing it has succeeded.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Artifacts {
    // validate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_sha256: Option<String>,

    // normalize
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized_audio_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized_audio_sha256: Option<String>,

    // chunk
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_paths: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_seconds: Option<u64>,

    // transcribe
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_chunk_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_segments_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_duration_s: Option<f64>,

    // generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minutes_markdown: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minutes_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minutes_prompt_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minutes_prompt_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minutes_prompt_hash: Option<String>,

    // write_outputs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_segments_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minutes_md_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minutes_sha256: Option<String>,

    // export-docx, outside the step sequence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minutes_docx_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minutes_docx_sha256: Option<String>,
}

/// Transcript metadata produced by the `transcribe` step.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptRefs {
    pub text: String,
    pub provider: String,
    pub model: String,
    pub language: Option<String>,
    pub chunk_count: usize,
    /// `None` when any chunk came back without segments.
    pub segments_count: Option<usize>,
    /// Summed chunk durations.
    pub duration_secs: f64,
}

/// Minutes metadata produced by the `generate` step.
#[derive(Debug, Clone, PartialEq)]
pub struct MinutesRefs {
    pub markdown: String,
    pub model: String,
    pub prompt_version: Option<String>,
    pub prompt_path: Option<String>,
    pub prompt_hash: String,
}

/// Artifacts a single step contributes on success.
///
/// One variant per step, so a step can only ever write its own fields.
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactUpdate {
    Validated {
        input_path: String,
        input_sha256: String,
    },
    Normalized {
        path: String,
        sha256: String,
    },
    Chunked {
        chunks_dir: String,
        chunk_paths: Vec<String>,
        chunk_seconds: u64,
    },
    Transcribed(TranscriptRefs),
    Generated(MinutesRefs),
    OutputsWritten {
        transcript_path: String,
        transcript_sha256: String,
        segments_path: Option<String>,
        minutes_md_path: String,
        minutes_sha256: String,
    },
}

impl ArtifactUpdate {
    /// The step allowed to contribute this update.
    pub fn step(&self) -> Step {
        match self {
            ArtifactUpdate::Validated { .. } => Step::Validate,
            ArtifactUpdate::Normalized { .. } => Step::Normalize,
            ArtifactUpdate::Chunked { .. } => Step::Chunk,
            ArtifactUpdate::Transcribed(_) => Step::Transcribe,
            ArtifactUpdate::Generated(_) => Step::Generate,
            ArtifactUpdate::OutputsWritten { .. } => Step::WriteOutputs,
        }
    }
}

impl Artifacts {
    /// Serialized field names, in declaration order.
    pub const FIELDS: [&'static str; 26] = [
        "input_path",
        "input_sha256",
        "normalized_audio_path",
        "normalized_audio_sha256",
        "chunks_dir",
        "chunk_paths",
        "chunk_seconds",
        "transcript_text",
        "transcript_provider",
        "transcript_model",
        "transcript_language",
        "transcript_chunk_count",
        "transcript_segments_count",
        "transcript_duration_s",
        "minutes_markdown",
        "minutes_model",
        "minutes_prompt_version",
        "minutes_prompt_path",
        "minutes_prompt_hash",
        "transcript_path",
        "transcript_sha256",
        "transcript_segments_path",
        "minutes_md_path",
        "minutes_sha256",
        "minutes_docx_path",
        "minutes_docx_sha256",
    ];

    /// Value of the field serialized as `name`, `None` when unset.
    ///
    /// Names outside [`Artifacts::FIELDS`] are a manifest error.
    pub fn field(&self, name: &str) -> Result<Option<serde_json::Value>> {
        if !Self::FIELDS.contains(&name) {
            return Err(PipelineError::Manifest {
                message: format!("Unknown artifact field: {name}"),
            });
        }
        let value = serde_json::to_value(self).map_err(|e| PipelineError::Manifest {
            message: format!("Failed to serialize artifacts: {e}"),
        })?;
        Ok(value.get(name).filter(|v| !v.is_null()).cloned())
    }

    pub(crate) fn apply(&mut self, update: ArtifactUpdate) {
        match update {
            ArtifactUpdate::Validated {
                input_path,
                input_sha256,
            } => {
                self.input_path = Some(input_path);
                self.input_sha256 = Some(input_sha256);
            }
            ArtifactUpdate::Normalized { path, sha256 } => {
                self.normalized_audio_path = Some(path);
                self.normalized_audio_sha256 = Some(sha256);
            }
            ArtifactUpdate::Chunked {
                chunks_dir,
                chunk_paths,
                chunk_seconds,
            } => {
                self.chunks_dir = Some(chunks_dir);
                self.chunk_paths = Some(chunk_paths);
                self.chunk_seconds = Some(chunk_seconds);
            }
            ArtifactUpdate::Transcribed(t) => {
                self.transcript_text = Some(t.text);
                self.transcript_provider = Some(t.provider);
                self.transcript_model = Some(t.model);
                self.transcript_language = t.language;
                self.transcript_chunk_count = Some(t.chunk_count);
                self.transcript_segments_count = t.segments_count;
                self.transcript_duration_s = Some(t.duration_secs);
            }
            ArtifactUpdate::Generated(m) => {
                self.minutes_markdown = Some(m.markdown);
                self.minutes_model = Some(m.model);
                self.minutes_prompt_version = m.prompt_version;
                self.minutes_prompt_path = m.prompt_path;
                self.minutes_prompt_hash = Some(m.prompt_hash);
            }
            ArtifactUpdate::OutputsWritten {
                transcript_path,
                transcript_sha256,
                segments_path,
                minutes_md_path,
                minutes_sha256,
            } => {
                self.transcript_path = Some(transcript_path);
                self.transcript_sha256 = Some(transcript_sha256);
                self.transcript_segments_path = segments_path;
                self.minutes_md_path = Some(minutes_md_path);
                self.minutes_sha256 = Some(minutes_sha256);
            }
        }
    }
}

/// Serialized snapshot of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub steps: BTreeMap<Step, StepRecord>,
    pub artifacts: Artifacts,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl Manifest {
    /// A fresh manifest with every step pending.
    pub fn new(run_id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            run_id: run_id.into(),
            created_at,
            updated_at: created_at,
            steps: Step::ALL
                .into_iter()
                .map(|step| (step, StepRecord::default()))
                .collect(),
            artifacts: Artifacts::default(),
            errors: Vec::new(),
        }
    }

    pub fn status(&self, step: Step) -> StepStatus {
        self.steps
            .get(&step)
            .map(|record| record.status)
            .unwrap_or_default()
    }

    pub fn record(&self, step: Step) -> Option<&StepRecord> {
        self.steps.get(&step)
    }

    /// True once every step has succeeded.
    pub fn is_complete(&self) -> bool {
        Step::ALL
            .into_iter()
            .all(|step| self.status(step) == StepStatus::Success)
    }

    /// The step that halted the run, if any.
    pub fn failed_step(&self) -> Option<Step> {
        Step::ALL
            .into_iter()
            .find(|step| self.status(*step) == StepStatus::Failed)
    }

    /// True when `step` already succeeded and its recorded outputs still hold.
    ///
    /// Every `(field, hash)` in `expected_hashes` must match the recorded
    /// value, and every `required` artifact must be set and non-empty. Unknown
    /// field names are an error once the step has succeeded.
    pub fn can_skip(
        &self,
        step: Step,
        required: &[&str],
        expected_hashes: &[(&str, &str)],
    ) -> Result<bool> {
        if self.status(step) != StepStatus::Success {
            return Ok(false);
        }
        for (field, expected) in expected_hashes {
            match self.artifacts.field(field)? {
                Some(serde_json::Value::String(actual)) if actual == *expected => {}
                _ => return Ok(false),
            }
        }
        for field in required {
            let present = match self.artifacts.field(field)? {
                None => false,
                Some(serde_json::Value::String(s)) => !s.is_empty(),
                Some(serde_json::Value::Array(items)) => !items.is_empty(),
                Some(_) => true,
            };
            if !present {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Record a DOCX rendering of the minutes.
    pub fn record_docx_export(
        &mut self,
        path: impl Into<String>,
        sha256: impl Into<String>,
        at: DateTime<Utc>,
    ) {
        self.artifacts.minutes_docx_path = Some(path.into());
        self.artifacts.minutes_docx_sha256 = Some(sha256.into());
        self.updated_at = at;
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| PipelineError::Manifest {
            message: format!("Failed to serialize manifest: {e}"),
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let mut manifest: Manifest =
            serde_json::from_str(json).map_err(|e| PipelineError::Manifest {
                message: format!("Invalid manifest: {e}"),
            })?;
        // Older or hand-edited manifests may omit steps that never ran.
        for step in Step::ALL {
            manifest.steps.entry(step).or_default();
        }
        Ok(manifest)
    }

    /// Load a persisted manifest.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        Self::from_json(&json)
    }
}
