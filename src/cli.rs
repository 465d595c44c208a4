//! Command-line interface for minutes
//!
//! Provides argument parsing using clap derive macros. Flags are plain
//! configuration: they override the config file and environment, then
//! become a [`RunConfig`].

use crate::config::Config;
use crate::pipeline::RunConfig;
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Meeting recording to transcript and minutes
#[derive(Parser, Debug)]
#[command(
    name = "minutes",
    version,
    about = "Turn a meeting recording into transcript and minutes"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: step progress, -vv: full diagnostics)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the pipeline on one recording
    Run(RunArgs),

    /// Print a summary of a run manifest
    Manifest {
        /// Path to manifest.json (or the run's output directory)
        path: PathBuf,
    },

    /// Render a finished run's minutes as DOCX with pandoc
    ExportDocx(ExportDocxArgs),

    /// Check system dependencies
    Check,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Arguments of `minutes run`
#[derive(Args, Debug, Clone, PartialEq)]
pub struct RunArgs {
    /// Audio or video file to process
    #[arg(long, short = 'i', value_name = "PATH")]
    pub input: PathBuf,

    /// Output directory for this run (must not contain earlier chunks)
    #[arg(long, short = 'o', value_name = "DIR")]
    pub output_dir: PathBuf,

    /// Run identifier (default: derived from input path and start time)
    #[arg(long, value_name = "ID")]
    pub run_id: Option<String>,

    /// Transcription model (default: whisper-1)
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Minutes generation model (default: gpt-4o-mini)
    #[arg(long, value_name = "MODEL")]
    pub minutes_model: Option<String>,

    /// Language code passed to transcription (default: auto-detect). Examples: en, de, fr
    #[arg(long, value_name = "LANG")]
    pub language: Option<String>,

    /// Vocabulary hint passed to transcription
    #[arg(long, value_name = "TEXT")]
    pub transcription_prompt: Option<String>,

    /// Chunk length (default: 10m). Examples: 600, 90s, 10m
    #[arg(long, value_name = "DURATION", value_parser = parse_duration_secs)]
    pub chunk_duration: Option<u64>,

    /// Sample rate of the normalized audio in Hz
    #[arg(long, value_name = "HZ")]
    pub sample_rate: Option<u32>,

    /// Channel count of the normalized audio
    #[arg(long, value_name = "N")]
    pub channels: Option<u16>,

    /// Extra attempts per chunk after a transient transcription failure
    #[arg(long, value_name = "N")]
    pub max_retries: Option<u32>,

    /// Concurrent chunk transcriptions
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Minutes prompt file (default: built-in prompt)
    #[arg(long, value_name = "PATH")]
    pub prompt_path: Option<PathBuf>,

    /// Version tag recorded with the minutes prompt
    #[arg(long, value_name = "VERSION")]
    pub prompt_version: Option<String>,

    /// Extra context for minutes generation (repeatable)
    #[arg(long = "context", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub context: Vec<(String, String)>,

    /// Do not request timed segments
    #[arg(long)]
    pub no_segments: bool,

    /// Record error cause chains in the manifest
    #[arg(long)]
    pub include_error_traceback: bool,
}

/// Arguments of `minutes export-docx`
#[derive(Args, Debug, Clone, PartialEq)]
pub struct ExportDocxArgs {
    /// Path to manifest.json (or the run's output directory)
    pub path: PathBuf,

    /// Output file (default: minutes.docx in the run directory)
    #[arg(long, short = 'o', value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Reference document supplying styles
    #[arg(long, value_name = "PATH")]
    pub reference_doc: Option<PathBuf>,

    /// Include a table of contents
    #[arg(long)]
    pub toc: bool,

    /// Heading depth of the table of contents (default: 2)
    #[arg(long, value_name = "N")]
    pub toc_depth: Option<u32>,

    /// pandoc executable
    #[arg(long, value_name = "PATH")]
    pub pandoc: Option<String>,
}

impl ExportDocxArgs {
    /// Overlay flags onto `config`.
    pub fn apply_to(&self, mut config: Config) -> Config {
        if let Some(path) = &self.reference_doc {
            config.export.reference_doc = Some(path.clone());
        }
        if self.toc {
            config.export.toc = true;
        }
        if let Some(depth) = self.toc_depth {
            config.export.toc_depth = depth;
        }
        if let Some(pandoc) = &self.pandoc {
            config.export.pandoc = pandoc.clone();
        }
        config
    }
}

/// Parse a duration string into seconds.
///
/// Supports any duration format accepted by `humantime`: bare numbers (seconds),
/// single-unit (`90s`, `10m`), and compound (`1h30m`).
fn parse_duration_secs(s: &str) -> Result<u64, String> {
    let s = s.trim();
    // Bare number → seconds
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(secs);
    }
    humantime::parse_duration(s)
        .map(|d| d.as_secs())
        .map_err(|e| e.to_string())
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

impl RunArgs {
    /// Overlay flags onto `config`.
    pub fn apply_to(&self, mut config: Config) -> Config {
        if let Some(model) = &self.model {
            config.transcription.model = model.clone();
        }
        if let Some(model) = &self.minutes_model {
            config.minutes.model = model.clone();
        }
        if let Some(language) = &self.language {
            config.transcription.language = Some(language.clone());
        }
        if let Some(prompt) = &self.transcription_prompt {
            config.transcription.prompt = Some(prompt.clone());
        }
        if let Some(secs) = self.chunk_duration {
            config.audio.chunk_seconds = secs;
        }
        if let Some(rate) = self.sample_rate {
            config.audio.sample_rate = rate;
        }
        if let Some(channels) = self.channels {
            config.audio.channels = channels;
        }
        if let Some(retries) = self.max_retries {
            config.transcription.max_retries = retries;
        }
        if let Some(workers) = self.workers {
            config.transcription.workers = workers;
        }
        if let Some(path) = &self.prompt_path {
            config.minutes.prompt_path = Some(path.clone());
        }
        if let Some(version) = &self.prompt_version {
            config.minutes.prompt_version = Some(version.clone());
        }
        if self.no_segments {
            config.transcription.segments = false;
        }
        if self.include_error_traceback {
            config.pipeline.include_error_traceback = true;
        }
        config
    }

    /// Run parameters from an already-overlaid `config` plus run-only flags.
    pub fn run_config(&self, config: &Config) -> RunConfig {
        let mut run = config.to_run_config(&self.output_dir);
        run.run_id = self.run_id.clone();
        run.extra_context = self.context.iter().cloned().collect();
        run
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Persistence;

    fn parse_run(args: &[&str]) -> RunArgs {
        let mut argv = vec!["minutes", "run", "--input", "in.m4a", "--output-dir", "out"];
        argv.extend_from_slice(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Run(args) => args,
            other => panic!("Expected Run command, got {other:?}"),
        }
    }

    #[test]
    fn test_run_minimal() {
        let args = parse_run(&[]);
        assert_eq!(args.input, PathBuf::from("in.m4a"));
        assert_eq!(args.output_dir, PathBuf::from("out"));
        assert_eq!(args.run_id, None);
        assert!(args.context.is_empty());
        assert!(!args.no_segments);
    }

    #[test]
    fn test_run_requires_input_and_output() {
        assert!(Cli::try_parse_from(["minutes", "run", "--input", "x.wav"]).is_err());
        assert!(Cli::try_parse_from(["minutes", "run", "--output-dir", "out"]).is_err());
    }

    #[test]
    fn test_missing_subcommand_is_error() {
        assert!(Cli::try_parse_from(["minutes"]).is_err());
    }

    #[test]
    fn test_verbose_count() {
        let cli = Cli::try_parse_from(["minutes", "-vv", "check"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Check));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "minutes",
            "manifest",
            "runs/a/manifest.json",
            "--config",
            "/etc/minutes.toml",
            "-q",
        ])
        .unwrap();
        assert!(cli.quiet);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/minutes.toml")));
        match cli.command {
            Commands::Manifest { path } => {
                assert_eq!(path, PathBuf::from("runs/a/manifest.json"))
            }
            other => panic!("Expected Manifest command, got {other:?}"),
        }
    }

    #[test]
    fn test_chunk_duration_formats() {
        assert_eq!(parse_run(&["--chunk-duration", "600"]).chunk_duration, Some(600));
        assert_eq!(parse_run(&["--chunk-duration", "90s"]).chunk_duration, Some(90));
        assert_eq!(parse_run(&["--chunk-duration", "10m"]).chunk_duration, Some(600));
        assert!(
            Cli::try_parse_from([
                "minutes",
                "run",
                "-i",
                "a",
                "-o",
                "b",
                "--chunk-duration",
                "soon"
            ])
            .is_err()
        );
    }

    #[test]
    fn test_context_repeatable() {
        let args = parse_run(&["--context", "team=infra", "--context", "date = 2026-03-01"]);
        assert_eq!(
            args.context,
            vec![
                ("team".to_string(), "infra".to_string()),
                ("date".to_string(), "2026-03-01".to_string())
            ]
        );
    }

    #[test]
    fn test_context_requires_equals() {
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=value").is_err());
        assert_eq!(
            parse_key_value("url=http://x?a=b"),
            Ok(("url".to_string(), "http://x?a=b".to_string()))
        );
    }

    #[test]
    fn test_flags_override_config() {
        let mut file = Config::default();
        file.transcription.model = "from-file".to_string();
        file.transcription.workers = 8;
        file.pipeline.persist = Persistence::OnFinish;

        let args = parse_run(&[
            "--model",
            "whisper-large",
            "--max-retries",
            "0",
            "--no-segments",
            "--run-id",
            "weekly-sync",
            "--context",
            "team=infra",
        ]);
        let config = args.apply_to(file);
        assert_eq!(config.transcription.model, "whisper-large");
        assert_eq!(config.transcription.workers, 8);

        let run = args.run_config(&config);
        assert_eq!(run.max_retries, 0);
        assert!(!run.segments);
        assert_eq!(run.run_id.as_deref(), Some("weekly-sync"));
        assert_eq!(run.extra_context.get("team").map(String::as_str), Some("infra"));
        assert_eq!(run.persistence, Persistence::OnFinish);
        assert_eq!(run.output_dir, PathBuf::from("out"));
    }

    #[test]
    fn test_export_docx_flags_override_config() {
        let cli = Cli::try_parse_from([
            "minutes",
            "export-docx",
            "runs/board",
            "--toc",
            "--toc-depth",
            "3",
            "--reference-doc",
            "styles.docx",
        ])
        .unwrap();
        let Commands::ExportDocx(args) = cli.command else {
            panic!("Expected ExportDocx command");
        };
        assert_eq!(args.path, PathBuf::from("runs/board"));
        assert_eq!(args.output, None);

        let mut file = Config::default();
        file.export.pandoc = "/opt/pandoc".to_string();
        let options = args.apply_to(file.clone()).export.docx_options();
        assert!(options.toc);
        assert_eq!(options.toc_depth, 3);
        assert_eq!(options.reference_doc, Some(PathBuf::from("styles.docx")));
        assert_eq!(args.apply_to(file).export.pandoc, "/opt/pandoc");
    }

    #[test]
    fn test_export_docx_requires_path() {
        assert!(Cli::try_parse_from(["minutes", "export-docx"]).is_err());
    }

    #[test]
    fn test_completions_command() {
        let cli = Cli::try_parse_from(["minutes", "completions", "bash"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Completions { shell: Shell::Bash }
        ));
    }
}
