use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser};
use minutes::audio::FfmpegTool;
use minutes::cli::{Cli, Commands, ExportDocxArgs, RunArgs};
use minutes::clock::SystemClock;
use minutes::config::Config;
use minutes::defaults;
use minutes::diagnostics::check_dependencies;
use minutes::export::{PandocExporter, export_run_docx};
use minutes::manifest::Manifest;
use minutes::output::format_manifest_summary;
use minutes::pipeline::Orchestrator;
use minutes::provider::{OpenAiConfig, OpenAiMinutesGenerator, OpenAiTranscriber};
use owo_colors::OwoColorize;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    match dispatch(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins; otherwise the level follows -q / -v / -vv.
fn init_logging(quiet: bool, verbose: u8) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "minutes=info,warn",
        (false, _) => "minutes=debug,info",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| level.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Returns whether the command succeeded.
fn dispatch(cli: Cli) -> Result<bool> {
    match cli.command {
        Commands::Run(args) => {
            let config = load_config(cli.config.as_deref())?;
            run_pipeline(&args, config, cli.quiet)
        }
        Commands::Manifest { path } => {
            let manifest = load_manifest(&path)?;
            print!(
                "{}",
                format_manifest_summary(&manifest, use_color(std::io::stdout().is_terminal()))
            );
            Ok(manifest.failed_step().is_none())
        }
        Commands::ExportDocx(args) => {
            let config = load_config(cli.config.as_deref())?;
            export_docx(&args, config)
        }
        Commands::Check => {
            let config = load_config(cli.config.as_deref())?;
            Ok(check_dependencies(&config))
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "minutes",
                &mut std::io::stdout(),
            );
            Ok(true)
        }
    }
}

fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?
    } else if let Some(default_path) = Config::default_path() {
        Config::load_or_default(&default_path)?
    } else {
        Config::default()
    };

    Ok(config.with_env_overrides())
}

fn run_pipeline(args: &RunArgs, config: Config, quiet: bool) -> Result<bool> {
    let config = args.apply_to(config);
    let run = args.run_config(&config);

    if config.transcription.provider != defaults::PROVIDER {
        bail!(
            "Unsupported provider '{}' (supported: {})",
            config.transcription.provider,
            defaults::PROVIDER
        );
    }
    let api_key = match std::env::var(defaults::API_KEY_ENV) {
        Ok(key) if !key.trim().is_empty() => key,
        _ => bail!("{} is not set", defaults::API_KEY_ENV),
    };
    let provider = OpenAiConfig::new(api_key)
        .with_base_url(config.openai.base_url.clone())
        .with_timeout(Duration::from_secs(config.openai.timeout_secs));

    let audio = FfmpegTool::system(config.pipeline.ffmpeg.clone());
    let transcriber = OpenAiTranscriber::new(provider.clone(), config.transcription.model.clone())
        .context("Failed to create transcription client")?;
    let minutes = OpenAiMinutesGenerator::new(provider, config.minutes.model.clone())
        .context("Failed to create minutes client")?;

    let orchestrator = Orchestrator::new(
        run,
        Arc::new(audio),
        Arc::new(transcriber),
        Arc::new(minutes),
    );
    let report = orchestrator
        .run(&args.input)
        .context("Run aborted: manifest could not be written")?;

    println!("manifest_path={}", report.manifest_path.display());
    println!("output_dir={}", report.output_dir.display());
    if !quiet {
        eprint!(
            "{}",
            format_manifest_summary(&report.manifest, use_color(std::io::stderr().is_terminal()))
        );
    }
    Ok(report.succeeded())
}

fn export_docx(args: &ExportDocxArgs, config: Config) -> Result<bool> {
    let config = args.apply_to(config);
    let manifest_path = manifest_file(&args.path);
    let exporter = PandocExporter::system(config.export.pandoc.clone());
    let (_, export) = export_run_docx(
        &manifest_path,
        &exporter,
        args.output.as_deref(),
        &config.export.docx_options(),
        &SystemClock,
    )
    .with_context(|| format!("DOCX export failed for {}", manifest_path.display()))?;

    println!("minutes_docx_path={}", export.path.display());
    println!("minutes_docx_sha256={}", export.sha256);
    Ok(true)
}

/// Accepts the manifest file itself or the run's output directory.
fn manifest_file(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(minutes::pipeline::paths::MANIFEST_FILE)
    } else {
        path.to_path_buf()
    }
}

fn load_manifest(path: &Path) -> Result<Manifest> {
    let file = manifest_file(path);
    Manifest::load(&file).with_context(|| format!("Failed to read manifest {}", file.display()))
}

fn use_color(is_terminal: bool) -> bool {
    is_terminal && std::env::var_os("NO_COLOR").is_none()
}
