use crate::defaults;
use crate::export::DocxOptions;
use crate::manifest::Persistence;
use crate::pipeline::RunConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub transcription: TranscriptionConfig,
    pub minutes: MinutesConfig,
    pub pipeline: PipelineConfig,
    pub openai: OpenAiConfig,
    pub export: ExportConfig,
}

/// Normalization and chunking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub chunk_seconds: u64,
}

/// Chunk transcription
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub provider: String,
    pub model: String,
    pub language: Option<String>,
    pub prompt: Option<String>,
    pub max_retries: u32,
    pub workers: usize,
    /// Request timed segments when the model supports them.
    pub segments: bool,
    pub retry_delay_ms: u64,
}

/// Minutes generation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MinutesConfig {
    pub model: String,
    pub prompt_path: Option<PathBuf>,
    pub prompt_version: Option<String>,
}

/// Run bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub include_error_traceback: bool,
    pub ffmpeg: String,
    pub persist: Persistence,
}

/// OpenAI-compatible endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

/// DOCX export of finished minutes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExportConfig {
    pub pandoc: String,
    pub reference_doc: Option<PathBuf>,
    pub toc: bool,
    pub toc_depth: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            channels: defaults::CHANNELS,
            chunk_seconds: defaults::CHUNK_SECONDS,
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            provider: defaults::PROVIDER.to_string(),
            model: defaults::TRANSCRIPTION_MODEL.to_string(),
            language: None,
            prompt: None,
            max_retries: defaults::MAX_RETRIES,
            workers: defaults::WORKERS,
            segments: true,
            retry_delay_ms: 0,
        }
    }
}

impl Default for MinutesConfig {
    fn default() -> Self {
        Self {
            model: defaults::MINUTES_MODEL.to_string(),
            prompt_path: None,
            prompt_version: None,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            include_error_traceback: false,
            ffmpeg: defaults::FFMPEG.to_string(),
            persist: Persistence::default(),
        }
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::OPENAI_BASE_URL.to_string(),
            timeout_secs: defaults::HTTP_TIMEOUT_SECS,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            pandoc: defaults::PANDOC.to_string(),
            reference_doc: None,
            toc: false,
            toc_depth: defaults::TOC_DEPTH,
        }
    }
}

impl ExportConfig {
    pub fn docx_options(&self) -> DocxOptions {
        DocxOptions {
            reference_doc: self.reference_doc.clone(),
            toc: self.toc,
            toc_depth: self.toc_depth,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file, or defaults if the file doesn't exist
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound) =>
            {
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - MINUTES_TRANSCRIPTION_MODEL → transcription.model
    /// - MINUTES_MINUTES_MODEL → minutes.model
    /// - MINUTES_LANGUAGE → transcription.language
    /// - MINUTES_FFMPEG → pipeline.ffmpeg
    /// - MINUTES_PANDOC → export.pandoc
    /// - PANDOC_PATH → export.pandoc, only while it is still the default
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(model) = std::env::var("MINUTES_TRANSCRIPTION_MODEL")
            && !model.is_empty()
        {
            self.transcription.model = model;
        }

        if let Ok(model) = std::env::var("MINUTES_MINUTES_MODEL")
            && !model.is_empty()
        {
            self.minutes.model = model;
        }

        if let Ok(language) = std::env::var("MINUTES_LANGUAGE")
            && !language.is_empty()
        {
            self.transcription.language = Some(language);
        }

        if let Ok(ffmpeg) = std::env::var("MINUTES_FFMPEG")
            && !ffmpeg.is_empty()
        {
            self.pipeline.ffmpeg = ffmpeg;
        }

        if let Ok(pandoc) = std::env::var("MINUTES_PANDOC")
            && !pandoc.is_empty()
        {
            self.export.pandoc = pandoc;
        } else if self.export.pandoc == defaults::PANDOC
            && let Ok(pandoc) = std::env::var(defaults::PANDOC_PATH_ENV)
            && !pandoc.is_empty()
        {
            self.export.pandoc = pandoc;
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/minutes/config.toml on Linux, `None` without a home directory.
    #[cfg(feature = "cli")]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("minutes").join("config.toml"))
    }

    /// Run parameters for a run writing into `output_dir`.
    pub fn to_run_config(&self, output_dir: impl Into<PathBuf>) -> RunConfig {
        let mut run = RunConfig::new(output_dir);
        run.sample_rate = self.audio.sample_rate;
        run.channels = self.audio.channels;
        run.chunk_seconds = self.audio.chunk_seconds;
        run.max_retries = self.transcription.max_retries;
        run.retry_delay = Duration::from_millis(self.transcription.retry_delay_ms);
        run.workers = self.transcription.workers;
        run.language = self.transcription.language.clone();
        run.transcription_prompt = self.transcription.prompt.clone();
        run.segments = self.transcription.segments;
        run.prompt_path = self.minutes.prompt_path.clone();
        run.prompt_version = self.minutes.prompt_version.clone();
        run.include_error_traceback = self.pipeline.include_error_traceback;
        run.persistence = self.pipeline.persist;
        run
    }
}
