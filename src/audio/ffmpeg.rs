//! ffmpeg-backed [`AudioTool`].

use super::command::{CommandExecutor, SystemCommandExecutor};
use super::tool::{AudioTool, CHUNK_EXTENSION, CHUNK_PREFIX, check_chunk_sequence, scan_chunks};
use crate::error::{PipelineError, Result};
use std::path::{Path, PathBuf};

/// Arguments for converting `input` to PCM WAV.
pub fn normalize_args(input: &str, output: &str, sample_rate: u32, channels: u16) -> Vec<String> {
    [
        "-y",
        "-i",
        input,
        "-vn",
        "-acodec",
        "pcm_s16le",
        "-ar",
        &sample_rate.to_string(),
        "-ac",
        &channels.to_string(),
        output,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Arguments for splitting `input` into `chunk_%04d.wav` files in `chunks_dir`.
pub fn chunk_args(input: &str, chunks_dir: &str, chunk_seconds: u64) -> Vec<String> {
    let pattern = format!("{chunks_dir}/{CHUNK_PREFIX}%04d.{CHUNK_EXTENSION}");
    [
        "-y",
        "-i",
        input,
        "-f",
        "segment",
        "-segment_time",
        &chunk_seconds.to_string(),
        "-reset_timestamps",
        "1",
        "-map",
        "0:a:0",
        "-c",
        "copy",
        &pattern,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Audio tool that shells out to ffmpeg.
pub struct FfmpegTool<E: CommandExecutor> {
    executor: E,
    program: String,
}

impl<E: CommandExecutor> FfmpegTool<E> {
    pub fn new(executor: E, program: impl Into<String>) -> Self {
        Self {
            executor,
            program: program.into(),
        }
    }

    fn run(&self, args: &[String]) -> Result<()> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.executor.execute(&self.program, &args)?;
        Ok(())
    }

    fn utf8<'a>(&self, path: &'a Path) -> Result<&'a str> {
        path.to_str().ok_or_else(|| {
            PipelineError::validation(format!(
                "{} cannot be passed to {}: path is not UTF-8",
                path.display(),
                self.program
            ))
        })
    }
}

impl FfmpegTool<SystemCommandExecutor> {
    /// Runs `program` as a child process, resolved via PATH.
    pub fn system(program: impl Into<String>) -> Self {
        Self::new(SystemCommandExecutor::new(), program)
    }
}

impl<E: CommandExecutor> AudioTool for FfmpegTool<E> {
    fn name(&self) -> &str {
        &self.program
    }

    fn normalize(&self, input: &Path, output: &Path, sample_rate: u32, channels: u16) -> Result<()> {
        let args = normalize_args(self.utf8(input)?, self.utf8(output)?, sample_rate, channels);
        self.run(&args)
    }

    fn chunk(&self, input: &Path, chunks_dir: &Path, chunk_seconds: u64) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(chunks_dir).map_err(|e| PipelineError::io(chunks_dir, e))?;
        let args = chunk_args(self.utf8(input)?, self.utf8(chunks_dir)?, chunk_seconds);
        self.run(&args)?;

        let paths = scan_chunks(chunks_dir)?;
        check_chunk_sequence(&paths).map_err(|message| PipelineError::ToolInvocation {
            tool: self.program.clone(),
            message,
        })?;
        Ok(paths)
    }
}
