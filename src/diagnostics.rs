//! System diagnostics and dependency checking.
//!
//! Verifies that the audio tool is installed and a provider key is configured.
//! pandoc is reported too but only needed for `minutes export-docx`.

use crate::config::Config;
use crate::defaults;
use std::process::Command;

/// Result of a dependency check.
#[derive(Debug, PartialEq)]
pub enum CheckResult {
    /// Tool is installed and working
    Ok,
    /// Tool is not found
    NotFound,
    /// Tool is found but has issues
    Warning(String),
}

/// Check if a command exists and answers `version_flag`.
fn check_command(command: &str, version_flag: &str) -> CheckResult {
    match Command::new(command).arg(version_flag).output() {
        Ok(output) if output.status.success() => CheckResult::Ok,
        Ok(_) => CheckResult::Warning(format!("'{}' found but {} failed", command, version_flag)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => CheckResult::NotFound,
        Err(e) => CheckResult::Warning(format!("Error checking '{}': {}", command, e)),
    }
}

/// Check that an API key variable is set and non-blank.
fn check_env_key(name: &str) -> CheckResult {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => CheckResult::Ok,
        Ok(_) => CheckResult::Warning(format!("{} is set but empty", name)),
        Err(_) => CheckResult::NotFound,
    }
}

/// Run all dependency checks and print results.
///
/// Returns `true` when everything needed for `minutes run` is present.
pub fn check_dependencies(config: &Config) -> bool {
    println!("minutes {}", crate::version_string());
    println!("Checking system dependencies...\n");
    let mut ready = true;

    let ffmpeg = &config.pipeline.ffmpeg;
    print!("{} (audio normalize/chunk): ", ffmpeg);
    match check_command(ffmpeg, "-version") {
        CheckResult::Ok => println!("✓ OK"),
        CheckResult::NotFound => {
            ready = false;
            println!("✗ NOT FOUND");
            println!("  Install: sudo apt install ffmpeg  (Debian/Ubuntu)");
            println!("           sudo pacman -S ffmpeg    (Arch)");
            println!("           brew install ffmpeg      (macOS)");
        }
        CheckResult::Warning(msg) => {
            ready = false;
            println!("⚠ WARNING: {}", msg);
        }
    }

    print!("{} (provider credentials): ", defaults::API_KEY_ENV);
    match check_env_key(defaults::API_KEY_ENV) {
        CheckResult::Ok => println!("✓ OK"),
        CheckResult::NotFound => {
            ready = false;
            println!("✗ NOT SET");
            println!("  export {}=...", defaults::API_KEY_ENV);
        }
        CheckResult::Warning(msg) => {
            ready = false;
            println!("⚠ WARNING: {}", msg);
        }
    }

    let pandoc = &config.export.pandoc;
    print!("{} (optional, export-docx): ", pandoc);
    match check_command(pandoc, "--version") {
        CheckResult::Ok => println!("✓ OK"),
        CheckResult::NotFound => {
            println!("✗ NOT FOUND");
            println!("  Install: https://pandoc.org/installing.html");
        }
        CheckResult::Warning(msg) => println!("⚠ WARNING: {}", msg),
    }

    println!();
    println!("Provider: {} ({})", config.transcription.provider, config.openai.base_url);
    println!(
        "Models:   {} (transcription), {} (minutes)",
        config.transcription.model, config.minutes.model
    );

    println!();
    if ready {
        println!("All dependencies satisfied.");
    } else {
        println!("Some dependencies are missing; `minutes run` will fail.");
    }
    ready
}
