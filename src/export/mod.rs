//! DOCX rendering of finished minutes.
//!
//! Runs after a successful pipeline run, outside the step sequence. The
//! result is recorded in the run's manifest as `minutes_docx_path` and
//! `minutes_docx_sha256`.

pub mod pandoc;

pub use pandoc::{PandocExporter, pandoc_args};

use crate::clock::Clock;
use crate::defaults;
use crate::error::{PipelineError, Result};
use crate::files;
use crate::manifest::{Manifest, Step};
use crate::pipeline::RunPaths;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Styling of the generated document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocxOptions {
    /// Template whose styles the document inherits.
    pub reference_doc: Option<PathBuf>,
    /// Prepend a table of contents.
    pub toc: bool,
    pub toc_depth: u32,
}

impl Default for DocxOptions {
    fn default() -> Self {
        Self {
            reference_doc: None,
            toc: false,
            toc_depth: defaults::TOC_DEPTH,
        }
    }
}

impl DocxOptions {
    pub fn validate(&self) -> Result<()> {
        if self.toc_depth == 0 {
            return Err(PipelineError::validation("toc_depth must be at least 1"));
        }
        if let Some(reference) = &self.reference_doc
            && !reference.is_file()
        {
            return Err(PipelineError::validation(format!(
                "reference document not found: {}",
                reference.display()
            )));
        }
        Ok(())
    }
}

/// Converts Markdown minutes to DOCX.
pub trait DocxExporter: Send + Sync {
    /// Tool name used in error messages (e.g. "pandoc").
    fn name(&self) -> &str;

    /// Write `output` from `input`. Inputs are already validated.
    fn export(&self, input: &Path, output: &Path, options: &DocxOptions) -> Result<()>;
}

impl<T: DocxExporter + ?Sized> DocxExporter for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn export(&self, input: &Path, output: &Path, options: &DocxOptions) -> Result<()> {
        (**self).export(input, output, options)
    }
}

/// A written DOCX file.
#[derive(Debug, Clone, PartialEq)]
pub struct DocxExport {
    pub path: PathBuf,
    pub sha256: String,
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

/// Render `markdown` to `output` and hash the result.
pub fn export_minutes_docx(
    exporter: &dyn DocxExporter,
    markdown: &Path,
    output: &Path,
    options: &DocxOptions,
) -> Result<DocxExport> {
    if !markdown.is_file() {
        return Err(PipelineError::validation(format!(
            "minutes markdown not found: {}",
            markdown.display()
        )));
    }
    if !has_extension(markdown, "md") {
        return Err(PipelineError::validation(format!(
            "minutes must be a .md file: {}",
            markdown.display()
        )));
    }
    if !has_extension(output, "docx") {
        return Err(PipelineError::validation(format!(
            "output must be a .docx file: {}",
            output.display()
        )));
    }
    options.validate()?;

    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
    }
    exporter.export(markdown, output, options)?;

    let sha256 = files::sha256_file(output)?;
    tracing::info!(
        tool = exporter.name(),
        output = %output.display(),
        "minutes exported to docx"
    );
    Ok(DocxExport {
        path: output.to_path_buf(),
        sha256,
    })
}

/// Export the minutes of a finished run and record the result in its manifest.
///
/// `output` defaults to `minutes.docx` in the run directory. The manifest is
/// rewritten atomically; a failed export leaves it untouched.
pub fn export_run_docx(
    manifest_path: &Path,
    exporter: &dyn DocxExporter,
    output: Option<&Path>,
    options: &DocxOptions,
    clock: &dyn Clock,
) -> Result<(Manifest, DocxExport)> {
    let mut manifest = Manifest::load(manifest_path)?;
    let run_dir = manifest_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let paths = RunPaths::new(run_dir);

    let reference = match &manifest.artifacts.minutes_md_path {
        Some(reference) if manifest.can_skip(Step::WriteOutputs, &["minutes_md_path"], &[])? => {
            reference.clone()
        }
        _ => {
            return Err(PipelineError::validation(format!(
                "run {} has no written minutes to export",
                manifest.run_id
            )));
        }
    };
    let markdown = paths.resolve(&reference);
    let output = output.map_or_else(|| paths.minutes_docx.clone(), Path::to_path_buf);

    let export = export_minutes_docx(exporter, &markdown, &output, options)?;
    manifest.record_docx_export(paths.reference(&export.path), export.sha256.clone(), clock.now());
    let json = manifest.to_json_pretty()?;
    files::write_atomic(manifest_path, files::with_trailing_newline(&json).as_bytes())?;
    Ok((manifest, export))
}

/// Mock exporter for testing.
///
/// Writes a small fake document containing the Markdown bytes.
#[derive(Debug, Default)]
pub struct MockDocxExporter {
    failure: Option<String>,
    calls: AtomicU32,
}

impl MockDocxExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DocxExporter for MockDocxExporter {
    fn name(&self) -> &str {
        "mock-pandoc"
    }

    fn export(&self, input: &Path, output: &Path, _options: &DocxOptions) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.failure {
            return Err(PipelineError::ToolInvocation {
                tool: self.name().to_string(),
                message: message.clone(),
            });
        }
        let mut document = b"PK\x03\x04".to_vec();
        document.extend(std::fs::read(input).map_err(|e| PipelineError::io(input, e))?);
        std::fs::write(output, document).map_err(|e| PipelineError::io(output, e))
    }
}
