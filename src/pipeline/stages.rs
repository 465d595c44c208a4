//! Bodies of the six pipeline steps.
//!
//! Each body returns its output for the next step plus the artifacts it
//! contributes to the manifest. None of them touch the manifest directly.

use super::aggregator::{AggregatedTranscript, ChunkResult, aggregate};
use super::executor::StepContext;
use super::orchestrator::RunConfig;
use super::paths::RunPaths;
use super::retry::RetryPolicy;
use crate::audio::{self, AudioTool, wav};
use crate::error::{PipelineError, ProviderError, Result};
use crate::files;
use crate::manifest::{ArtifactUpdate, MinutesRefs, TranscriptRefs};
use crate::provider::{
    ChunkRequest, DEFAULT_PROMPT_VERSION, MinutesGenerator, MinutesRequest, Transcriber,
    load_prompt,
};
use std::path::{Path, PathBuf};
use std::thread;

pub(crate) struct Stages<'a> {
    pub config: &'a RunConfig,
    pub paths: &'a RunPaths,
    pub audio: &'a dyn AudioTool,
    pub transcriber: &'a dyn Transcriber,
    pub minutes: &'a dyn MinutesGenerator,
}

impl Stages<'_> {
    /// Check run parameters and the input file; hash the input.
    pub fn validate(
        &self,
        context: &StepContext,
        input: &Path,
    ) -> Result<(PathBuf, ArtifactUpdate)> {
        context.set("output_dir", self.paths.output_dir.display());
        self.config.validate()?;

        if !input.exists() {
            return Err(PipelineError::validation(format!(
                "input not found: {}",
                input.display()
            )));
        }
        if !input.is_file() {
            return Err(PipelineError::validation(format!(
                "input is not a file: {}",
                input.display()
            )));
        }
        let size = std::fs::metadata(input)
            .map_err(|e| PipelineError::io(input, e))?
            .len();
        if size == 0 {
            return Err(PipelineError::validation(format!(
                "input is empty: {}",
                input.display()
            )));
        }

        let input = std::path::absolute(input).map_err(|e| PipelineError::io(input, e))?;
        let sha256 = files::sha256_file(&input)?;
        let update = ArtifactUpdate::Validated {
            input_path: self.paths.reference(&input),
            input_sha256: sha256,
        };
        Ok((input, update))
    }

    /// Convert the input to PCM WAV and verify the result.
    pub fn normalize(
        &self,
        context: &StepContext,
        input: &Path,
    ) -> Result<(PathBuf, ArtifactUpdate)> {
        let output = self.paths.normalized.clone();
        let (rate, channels) = (self.config.sample_rate, self.config.channels);
        context.set("normalizer", self.audio.name());
        context.set("output_path", output.display());
        self.audio.normalize(input, &output, rate, channels)?;

        let info = wav::inspect(&output).map_err(|e| self.tool_error(e.to_string()))?;
        if !info.matches(rate, channels) {
            return Err(self.tool_error(format!(
                "normalized audio is {} Hz / {} ch / {} bit, expected {rate} Hz / {channels} ch / 16 bit",
                info.sample_rate, info.channels, info.bits_per_sample
            )));
        }

        let update = ArtifactUpdate::Normalized {
            path: self.paths.reference(&output),
            sha256: files::sha256_file(&output)?,
        };
        Ok((output, update))
    }

    /// Split normalized audio into chunks. Refuses a non-empty chunks dir.
    pub fn chunk(
        &self,
        context: &StepContext,
        normalized: &Path,
    ) -> Result<(Vec<PathBuf>, ArtifactUpdate)> {
        let chunks_dir = &self.paths.chunks_dir;
        context.set("chunk_seconds", self.config.chunk_seconds);
        context.set("chunker", self.audio.name());
        context.set("chunks_dir", chunks_dir.display());
        if !audio::dir_is_empty(chunks_dir)? {
            return Err(PipelineError::validation(format!(
                "chunks directory is not empty: {} (use a fresh output directory)",
                chunks_dir.display()
            )));
        }

        let chunk_seconds = self.config.chunk_seconds;
        let chunk_paths = self.audio.chunk(normalized, chunks_dir, chunk_seconds)?;
        audio::check_chunk_sequence(&chunk_paths).map_err(|message| self.tool_error(message))?;
        tracing::info!(chunks = chunk_paths.len(), chunk_seconds, "audio chunked");

        let update = ArtifactUpdate::Chunked {
            chunks_dir: self.paths.reference(chunks_dir),
            chunk_paths: chunk_paths.iter().map(|p| self.paths.reference(p)).collect(),
            chunk_seconds,
        };
        Ok((chunk_paths, update))
    }

    /// Transcribe every chunk on a bounded worker pool, then aggregate.
    ///
    /// Waits for all chunks before deciding; any failed chunk fails the step.
    pub fn transcribe(
        &self,
        context: &StepContext,
        chunks: &[PathBuf],
    ) -> Result<(AggregatedTranscript, ArtifactUpdate)> {
        let workers = self.config.workers.clamp(1, chunks.len().max(1));
        context.set("provider", self.transcriber.provider_name());
        context.set("model", self.transcriber.model_name());
        context.set("chunk_count", chunks.len());
        context.set("workers", workers);
        let (job_tx, job_rx) = crossbeam_channel::bounded::<(usize, &Path)>(chunks.len().max(1));
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<(usize, Result<ChunkResult>)>();

        for (index, path) in chunks.iter().enumerate() {
            job_tx
                .send((index, path.as_path()))
                .map_err(|_| PipelineError::Aggregation {
                    message: "transcription job queue closed".to_string(),
                })?;
        }
        drop(job_tx);

        thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    for (index, path) in job_rx.iter() {
                        let result = self.transcribe_chunk(context, index, path);
                        if result_tx.send((index, result)).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(result_tx);

        let mut results = Vec::with_capacity(chunks.len());
        let mut failures = Vec::new();
        for (index, result) in result_rx.iter() {
            match result {
                Ok(chunk) => results.push(chunk),
                Err(e) => failures.push((index, e)),
            }
        }

        failures.sort_by_key(|(index, _)| *index);
        if let Some((_, first)) = failures.into_iter().next() {
            return Err(first);
        }

        let aggregated = aggregate(results)?;
        let update = ArtifactUpdate::Transcribed(TranscriptRefs {
            text: aggregated.text.clone(),
            provider: self.transcriber.provider_name().to_string(),
            model: self.transcriber.model_name().to_string(),
            language: aggregated
                .language
                .clone()
                .or_else(|| self.config.language.clone()),
            chunk_count: aggregated.chunk_count,
            segments_count: aggregated.segments.as_ref().map(Vec::len),
            duration_secs: aggregated.duration_secs,
        });
        Ok((aggregated, update))
    }

    fn transcribe_chunk(
        &self,
        context: &StepContext,
        index: usize,
        path: &Path,
    ) -> Result<ChunkResult> {
        let audio = std::fs::read(path).map_err(|e| PipelineError::io(path, e))?;
        let request = ChunkRequest {
            chunk_index: index,
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| audio::chunk_file_name(index)),
            audio,
            language: self.config.language.clone(),
            prompt: self.config.transcription_prompt.clone(),
            segments: self.config.segments && self.transcriber.supports_segments(),
        };

        let policy = RetryPolicy::new(self.config.max_retries).with_delay(self.config.retry_delay);
        let outcome = policy.run(|attempt| {
            context.add_provider_calls(1);
            tracing::debug!(chunk = index, attempt, "transcribing chunk");
            self.transcriber.transcribe(&request)
        });

        let attempts = outcome.attempts;
        let transcript = outcome.result.map_err(|e| {
            tracing::warn!(chunk = index, attempts, error = %e, "chunk failed");
            PipelineError::provider(format!("transcription of chunk {index}"), e)
        })?;

        let duration_secs = wav::inspect(path)
            .ok()
            .map(|info| info.duration_secs)
            .or(transcript.duration_secs)
            .unwrap_or(self.config.chunk_seconds as f64);

        Ok(ChunkResult {
            chunk_index: index,
            transcript,
            duration_secs,
        })
    }

    /// Turn the transcript into Markdown minutes with a single provider call.
    pub fn generate(
        &self,
        context: &StepContext,
        transcript: &AggregatedTranscript,
    ) -> Result<(String, ArtifactUpdate)> {
        context.set("model", self.minutes.model_name());
        if let Some(path) = &self.config.prompt_path {
            context.set("prompt_path", path.display());
        }
        if let Some(version) = &self.config.prompt_version {
            context.set("prompt_version", version);
        }
        let prompt = load_prompt(self.config.prompt_path.as_deref())?;
        let request = MinutesRequest {
            prompt: prompt.text,
            transcript: transcript.text.clone(),
            extra_context: self.config.extra_context.clone(),
        };

        context.add_provider_calls(1);
        let markdown = self
            .minutes
            .generate(&request)
            .map_err(|e| PipelineError::provider("minutes generation", e))?;
        let markdown = markdown.trim().to_string();
        if markdown.is_empty() {
            return Err(PipelineError::provider(
                "minutes generation",
                ProviderError::MalformedResponse {
                    message: "provider returned empty markdown".to_string(),
                },
            ));
        }

        let prompt_version = self.config.prompt_version.clone().or_else(|| {
            prompt
                .path
                .is_none()
                .then(|| DEFAULT_PROMPT_VERSION.to_string())
        });
        let update = ArtifactUpdate::Generated(MinutesRefs {
            markdown: markdown.clone(),
            model: self.minutes.model_name().to_string(),
            prompt_version,
            prompt_path: prompt.path.as_deref().map(|p| p.display().to_string()),
            prompt_hash: prompt.hash,
        });
        Ok((markdown, update))
    }

    /// Write transcript, optional segments and minutes to the output dir.
    pub fn write_outputs(
        &self,
        context: &StepContext,
        transcript: &AggregatedTranscript,
        markdown: &str,
    ) -> Result<((), ArtifactUpdate)> {
        context.set("transcript_path", self.paths.transcript.display());
        if transcript.segments.is_some() {
            context.set("transcript_segments_path", self.paths.segments.display());
        }
        context.set("minutes_md_path", self.paths.minutes.display());
        let transcript_text = files::with_trailing_newline(&transcript.text);
        files::write_atomic(&self.paths.transcript, transcript_text.as_bytes())?;

        let segments_path = match &transcript.segments {
            Some(segments) => {
                let json = serde_json::to_string_pretty(segments).map_err(|e| {
                    PipelineError::Aggregation {
                        message: format!("cannot serialize segments: {e}"),
                    }
                })?;
                files::write_atomic(
                    &self.paths.segments,
                    files::with_trailing_newline(&json).as_bytes(),
                )?;
                Some(self.paths.reference(&self.paths.segments))
            }
            None => None,
        };

        let minutes_text = files::with_trailing_newline(markdown);
        files::write_atomic(&self.paths.minutes, minutes_text.as_bytes())?;

        let update = ArtifactUpdate::OutputsWritten {
            transcript_path: self.paths.reference(&self.paths.transcript),
            transcript_sha256: files::sha256_bytes(transcript_text.as_bytes()),
            segments_path,
            minutes_md_path: self.paths.reference(&self.paths.minutes),
            minutes_sha256: files::sha256_bytes(minutes_text.as_bytes()),
        };
        Ok(((), update))
    }

    fn tool_error(&self, message: String) -> PipelineError {
        PipelineError::ToolInvocation {
            tool: self.audio.name().to_string(),
            message,
        }
    }
}
