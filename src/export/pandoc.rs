//! pandoc-backed [`DocxExporter`].

use super::{DocxExporter, DocxOptions};
use crate::audio::{CommandExecutor, SystemCommandExecutor};
use crate::error::{PipelineError, Result};
use std::path::Path;

/// Arguments for converting Markdown `input` to DOCX `output`.
pub fn pandoc_args(input: &str, output: &str, options: &DocxOptions) -> Vec<String> {
    let mut args: Vec<String> = ["--from", "markdown", "--to", "docx", input, "--output", output]
        .iter()
        .map(|s| s.to_string())
        .collect();
    if let Some(reference) = &options.reference_doc {
        args.push("--reference-doc".to_string());
        args.push(reference.display().to_string());
    }
    if options.toc {
        args.push("--toc".to_string());
        args.push("--toc-depth".to_string());
        args.push(options.toc_depth.to_string());
    }
    args
}

/// DOCX exporter that shells out to pandoc.
pub struct PandocExporter<E: CommandExecutor> {
    executor: E,
    program: String,
}

impl<E: CommandExecutor> PandocExporter<E> {
    pub fn new(executor: E, program: impl Into<String>) -> Self {
        Self {
            executor,
            program: program.into(),
        }
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

impl PandocExporter<SystemCommandExecutor> {
    /// Runs `program` as a child process, resolved via PATH.
    pub fn system(program: impl Into<String>) -> Self {
        Self::new(SystemCommandExecutor::new(), program)
    }
}

impl<E: CommandExecutor> DocxExporter for PandocExporter<E> {
    fn name(&self) -> &str {
        &self.program
    }

    fn export(&self, input: &Path, output: &Path, options: &DocxOptions) -> Result<()> {
        let args = pandoc_args(self.utf8(input)?, self.utf8(output)?, options);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.executor.execute(&self.program, &args)?;

        if !output.is_file() {
            return Err(PipelineError::ToolInvocation {
                tool: self.program.clone(),
                message: format!("no output written to {}", output.display()),
            });
        }
        Ok(())
    }
}
