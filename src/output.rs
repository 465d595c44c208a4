//! Terminal rendering of run manifests.
//! Used by `minutes run` after a run and by `minutes manifest`.

use crate::manifest::{Manifest, Step, StepStatus};

const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

fn status_color(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Success => GREEN,
        StepStatus::Failed => RED,
        StepStatus::Running => YELLOW,
        StepStatus::Pending => DIM,
    }
}

fn status_mark(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Success => "✓",
        StepStatus::Failed => "✗",
        StepStatus::Running => "…",
        StepStatus::Pending => "-",
    }
}

/// Multi-line summary: one line per step, then failures and key artifacts.
pub fn format_manifest_summary(manifest: &Manifest, color: bool) -> String {
    let paint = |code: &'static str| if color { code } else { "" };
    let reset = paint(RESET);
    let mut out = String::new();

    out.push_str(&format!("run {}\n", manifest.run_id));
    for step in Step::ALL {
        let Some(record) = manifest.record(step) else {
            continue;
        };
        let status = record.status;
        out.push_str(&format!(
            "  {}{} {:<14} {:<8}{reset}",
            paint(status_color(status)),
            status_mark(status),
            step.name(),
            status.as_str(),
        ));
        if let Some(ms) = record.duration_ms {
            out.push_str(&format!(" {}{ms} ms{reset}", paint(DIM)));
        }
        if let Some(calls) = record.provider_calls {
            out.push_str(&format!(" {}({calls} provider calls){reset}", paint(DIM)));
        }
        out.push('\n');
        if let Some(error) = &record.error {
            out.push_str(&format!(
                "      {}{}: {}{reset}\n",
                paint(RED),
                error.kind,
                error.message
            ));
        }
    }

    let artifacts = &manifest.artifacts;
    let outputs = [
        ("transcript", artifacts.transcript_path.as_deref()),
        ("segments", artifacts.transcript_segments_path.as_deref()),
        ("minutes", artifacts.minutes_md_path.as_deref()),
        ("docx", artifacts.minutes_docx_path.as_deref()),
    ];
    for (label, path) in outputs {
        if let Some(path) = path {
            out.push_str(&format!("  {label}: {path}\n"));
        }
    }
    if let Some(count) = artifacts.transcript_chunk_count {
        out.push_str(&format!("  chunks: {count}\n"));
    }

    out
}
