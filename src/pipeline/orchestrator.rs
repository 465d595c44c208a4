//! Sequences the six steps and halts on the first failure.

use super::executor::{StepExecutor, StepOutcome};
use super::paths::RunPaths;
use super::stages::Stages;
use crate::audio::AudioTool;
use crate::clock::{Clock, SystemClock};
use crate::defaults;
use crate::error::{PipelineError, Result};
use crate::files;
use crate::manifest::{Manifest, ManifestStore, Persistence, Step};
use crate::provider::{MinutesGenerator, Transcriber};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Parameters of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Exclusive directory for this run's outputs.
    pub output_dir: PathBuf,
    /// Derived from input path and start time when unset.
    pub run_id: Option<String>,
    pub sample_rate: u32,
    pub channels: u16,
    pub chunk_seconds: u64,
    /// Extra attempts per chunk after a transient transcription failure.
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Concurrent chunk transcriptions.
    pub workers: usize,
    pub language: Option<String>,
    pub transcription_prompt: Option<String>,
    /// Request timed segments when the transcriber supports them.
    pub segments: bool,
    /// Minutes prompt file; the built-in prompt when unset.
    pub prompt_path: Option<PathBuf>,
    pub prompt_version: Option<String>,
    pub extra_context: BTreeMap<String, String>,
    /// Keep the error cause chain in failed step records.
    pub include_error_traceback: bool,
    pub persistence: Persistence,
}

impl RunConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            run_id: None,
            sample_rate: defaults::SAMPLE_RATE,
            channels: defaults::CHANNELS,
            chunk_seconds: defaults::CHUNK_SECONDS,
            max_retries: defaults::MAX_RETRIES,
            retry_delay: Duration::ZERO,
            workers: defaults::WORKERS,
            language: None,
            transcription_prompt: None,
            segments: true,
            prompt_path: None,
            prompt_version: None,
            extra_context: BTreeMap::new(),
            include_error_traceback: false,
            persistence: Persistence::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_seconds == 0 {
            return Err(PipelineError::validation("chunk_seconds must be greater than 0"));
        }
        if self.sample_rate == 0 {
            return Err(PipelineError::validation("sample_rate must be greater than 0"));
        }
        if self.channels == 0 {
            return Err(PipelineError::validation("channels must be greater than 0"));
        }
        if self.workers == 0 {
            return Err(PipelineError::validation("workers must be greater than 0"));
        }
        if let Some(run_id) = &self.run_id
            && run_id.trim().is_empty()
        {
            return Err(PipelineError::validation("run_id must not be empty"));
        }
        Ok(())
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Done,
    Halted { step: Step },
}

/// What a run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub manifest: Manifest,
    pub manifest_path: PathBuf,
    pub output_dir: PathBuf,
    pub state: RunState,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.state == RunState::Done
    }
}

/// Deterministic run id: first 16 hex chars of SHA-256(input path, start time).
pub fn derive_run_id(input: &Path, created_at: DateTime<Utc>) -> String {
    let mut bytes = input.as_os_str().as_encoded_bytes().to_vec();
    bytes.extend_from_slice(
        created_at
            .to_rfc3339_opts(SecondsFormat::Micros, true)
            .as_bytes(),
    );
    let mut id = files::sha256_bytes(&bytes);
    id.truncate(16);
    id
}

/// Drives validate, normalize, chunk, transcribe, generate, write_outputs.
///
/// Holds no step logic of its own; it sequences, halts and persists.
pub struct Orchestrator {
    config: RunConfig,
    audio: Arc<dyn AudioTool>,
    transcriber: Arc<dyn Transcriber>,
    minutes: Arc<dyn MinutesGenerator>,
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    pub fn new(
        config: RunConfig,
        audio: Arc<dyn AudioTool>,
        transcriber: Arc<dyn Transcriber>,
        minutes: Arc<dyn MinutesGenerator>,
    ) -> Self {
        Self {
            config,
            audio,
            transcriber,
            minutes,
            clock: Arc::new(SystemClock),
        }
    }

    /// Use a custom clock for manifest timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run the pipeline on `input`.
    ///
    /// A failed step is not an `Err`: the report carries `RunState::Halted`
    /// and the manifest records the failure. `Err` means the manifest itself
    /// could not be created or written.
    pub fn run(&self, input: &Path) -> Result<RunReport> {
        let created_at = self.clock.now();
        let run_id = self
            .config
            .run_id
            .clone()
            .unwrap_or_else(|| derive_run_id(input, created_at));

        let paths = RunPaths::new(&self.config.output_dir);
        std::fs::create_dir_all(&paths.output_dir)
            .map_err(|e| PipelineError::io(&paths.output_dir, e))?;

        tracing::info!(
            run_id = %run_id,
            input = %input.display(),
            output_dir = %paths.output_dir.display(),
            "run started"
        );

        let store = ManifestStore::new(Manifest::new(run_id, created_at), self.clock.clone())
            .with_persistence(&paths.manifest, self.config.persistence);
        let mut executor = StepExecutor::new(store, self.config.include_error_traceback)
            .with_failure_site(input, &paths.output_dir);
        let stages = Stages {
            config: &self.config,
            paths: &paths,
            audio: self.audio.as_ref(),
            transcriber: self.transcriber.as_ref(),
            minutes: self.minutes.as_ref(),
        };

        // Persist whatever state was reached, even on a bookkeeping error.
        let state = drive(&mut executor, &stages, input);
        let manifest = executor.finish()?;
        let state = state?;

        match state {
            RunState::Done => tracing::info!(run_id = %manifest.run_id, "run finished"),
            RunState::Halted { step } => {
                tracing::warn!(run_id = %manifest.run_id, step = %step, "run halted")
            }
        }

        Ok(RunReport {
            manifest,
            manifest_path: paths.manifest,
            output_dir: paths.output_dir,
            state,
        })
    }
}

fn drive(executor: &mut StepExecutor, stages: &Stages<'_>, input: &Path) -> Result<RunState> {
    let halted = |step: Step| -> Result<RunState> { Ok(RunState::Halted { step }) };

    let StepOutcome::Continue(input) =
        executor.execute(Step::Validate, |ctx| stages.validate(ctx, input))?
    else {
        return halted(Step::Validate);
    };
    let StepOutcome::Continue(normalized) =
        executor.execute(Step::Normalize, |ctx| stages.normalize(ctx, &input))?
    else {
        return halted(Step::Normalize);
    };
    let StepOutcome::Continue(chunks) =
        executor.execute(Step::Chunk, |ctx| stages.chunk(ctx, &normalized))?
    else {
        return halted(Step::Chunk);
    };
    let StepOutcome::Continue(transcript) =
        executor.execute(Step::Transcribe, |ctx| stages.transcribe(ctx, &chunks))?
    else {
        return halted(Step::Transcribe);
    };
    let StepOutcome::Continue(markdown) =
        executor.execute(Step::Generate, |ctx| stages.generate(ctx, &transcript))?
    else {
        return halted(Step::Generate);
    };
    let StepOutcome::Continue(()) = executor.execute(Step::WriteOutputs, |ctx| {
        stages.write_outputs(ctx, &transcript, &markdown)
    })?
    else {
        return halted(Step::WriteOutputs);
    };

    Ok(RunState::Done)
}
