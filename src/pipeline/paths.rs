use crate::files;
use std::path::{Path, PathBuf};

/// File name of the run manifest inside the output directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// File layout of one run's output directory.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPaths {
    pub output_dir: PathBuf,
    pub manifest: PathBuf,
    pub normalized: PathBuf,
    pub chunks_dir: PathBuf,
    pub transcript: PathBuf,
    pub segments: PathBuf,
    pub minutes: PathBuf,
    pub minutes_docx: PathBuf,
}

impl RunPaths {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            manifest: output_dir.join(MANIFEST_FILE),
            normalized: output_dir.join("normalized.wav"),
            chunks_dir: output_dir.join("chunks"),
            transcript: output_dir.join("transcript.txt"),
            segments: output_dir.join("transcript_segments.json"),
            minutes: output_dir.join("minutes.md"),
            minutes_docx: output_dir.join("minutes.docx"),
        }
    }

    /// Manifest reference for `path`: relative inside the output dir.
    pub fn reference(&self, path: &Path) -> String {
        files::relative_ref(path, &self.output_dir)
    }

    /// Inverse of [`RunPaths::reference`].
    pub fn resolve(&self, reference: &str) -> PathBuf {
        let path = Path::new(reference);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.output_dir.join(path)
        }
    }
}
