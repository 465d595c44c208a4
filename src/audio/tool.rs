use super::wav;
use crate::error::{PipelineError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Prefix and extension of chunk files: `chunk_0000.wav`.
pub const CHUNK_PREFIX: &str = "chunk_";
pub const CHUNK_EXTENSION: &str = "wav";

/// Trait for the media tool that normalizes and splits audio.
pub trait AudioTool: Send + Sync {
    /// Tool name used in error messages (e.g. "ffmpeg").
    fn name(&self) -> &str;

    /// Convert `input` to 16-bit PCM WAV at `output`.
    fn normalize(&self, input: &Path, output: &Path, sample_rate: u32, channels: u16) -> Result<()>;

    /// Split `input` into `chunk_seconds` slices inside `chunks_dir`.
    ///
    /// Returns chunk paths ordered by chunk index.
    fn chunk(&self, input: &Path, chunks_dir: &Path, chunk_seconds: u64) -> Result<Vec<PathBuf>>;
}

impl<T: AudioTool + ?Sized> AudioTool for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn normalize(&self, input: &Path, output: &Path, sample_rate: u32, channels: u16) -> Result<()> {
        (**self).normalize(input, output, sample_rate, channels)
    }

    fn chunk(&self, input: &Path, chunks_dir: &Path, chunk_seconds: u64) -> Result<Vec<PathBuf>> {
        (**self).chunk(input, chunks_dir, chunk_seconds)
    }
}

pub fn chunk_file_name(index: usize) -> String {
    format!("{CHUNK_PREFIX}{index:04}.{CHUNK_EXTENSION}")
}

/// Index encoded in a chunk file name, if it is one.
pub fn parse_chunk_index(file_name: &str) -> Option<usize> {
    let digits = file_name
        .strip_prefix(CHUNK_PREFIX)?
        .strip_suffix(CHUNK_EXTENSION)?
        .strip_suffix('.')?;
    if digits.len() < 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Check that `paths` are `chunk_NNNN.wav` files numbered 0..n in order.
///
/// Returns a description of the first problem found.
pub fn check_chunk_sequence(paths: &[PathBuf]) -> std::result::Result<(), String> {
    if paths.is_empty() {
        return Err("no chunks were produced".to_string());
    }
    for (expected, path) in paths.iter().enumerate() {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match parse_chunk_index(&name) {
            Some(index) if index == expected => {}
            Some(index) => {
                return Err(format!(
                    "chunk indices are not contiguous: expected {expected}, found {index}"
                ));
            }
            None => return Err(format!("unexpected file in chunks dir: {name}")),
        }
        if !path.is_file() {
            return Err(format!("chunk not found: {}", path.display()));
        }
    }
    Ok(())
}

/// Every entry of `dir`, sorted by chunk index.
///
/// Index order differs from name order once indices outgrow the four-digit
/// padding (`chunk_10000.wav` sorts before `chunk_9999.wav` by name).
/// Entries without an index come last, by name; pair with
/// [`check_chunk_sequence`] to reject strays and gaps.
pub fn scan_chunks(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| PipelineError::io(dir, e))?;
    let mut keyed = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PipelineError::io(dir, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let index = parse_chunk_index(&name).unwrap_or(usize::MAX);
        keyed.push(((index, name), entry.path()));
    }
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(keyed.into_iter().map(|(_, path)| path).collect())
}

/// True when `dir` does not exist or holds no entries.
pub fn dir_is_empty(dir: &Path) -> Result<bool> {
    match std::fs::read_dir(dir) {
        Ok(mut entries) => Ok(entries.next().is_none()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(PipelineError::io(dir, e)),
    }
}

/// Mock audio tool for testing.
///
/// Writes real silent WAV files so downstream steps can read them.
#[derive(Debug)]
pub struct MockAudioTool {
    duration_secs: f64,
    normalize_failure: Option<String>,
    chunk_failure: Option<String>,
    normalize_calls: AtomicU32,
    chunk_calls: AtomicU32,
}

impl Default for MockAudioTool {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAudioTool {
    /// One second of audio.
    pub fn new() -> Self {
        Self {
            duration_secs: 1.0,
            normalize_failure: None,
            chunk_failure: None,
            normalize_calls: AtomicU32::new(0),
            chunk_calls: AtomicU32::new(0),
        }
    }

    /// Length of the normalized audio; decides how many chunks are written.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = secs;
        self
    }

    pub fn with_normalize_failure(mut self, message: &str) -> Self {
        self.normalize_failure = Some(message.to_string());
        self
    }

    pub fn with_chunk_failure(mut self, message: &str) -> Self {
        self.chunk_failure = Some(message.to_string());
        self
    }

    pub fn normalize_calls(&self) -> u32 {
        self.normalize_calls.load(Ordering::SeqCst)
    }

    pub fn chunk_calls(&self) -> u32 {
        self.chunk_calls.load(Ordering::SeqCst)
    }

    fn failure(&self, message: &str) -> PipelineError {
        PipelineError::ToolInvocation {
            tool: self.name().to_string(),
            message: message.to_string(),
        }
    }
}

impl AudioTool for MockAudioTool {
    fn name(&self) -> &str {
        "mock-ffmpeg"
    }

    fn normalize(&self, input: &Path, output: &Path, sample_rate: u32, channels: u16) -> Result<()> {
        self.normalize_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.normalize_failure {
            return Err(self.failure(message));
        }
        if !input.is_file() {
            return Err(self.failure(&format!("{}: No such file", input.display())));
        }
        wav::write_silence(output, sample_rate, channels, self.duration_secs)
    }

    fn chunk(&self, input: &Path, chunks_dir: &Path, chunk_seconds: u64) -> Result<Vec<PathBuf>> {
        self.chunk_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.chunk_failure {
            return Err(self.failure(message));
        }
        let info = wav::inspect(input)?;
        std::fs::create_dir_all(chunks_dir).map_err(|e| PipelineError::io(chunks_dir, e))?;

        let chunk_secs = chunk_seconds as f64;
        let count = (info.duration_secs / chunk_secs).ceil().max(1.0) as usize;
        let mut paths = Vec::with_capacity(count);
        for index in 0..count {
            let remaining = info.duration_secs - index as f64 * chunk_secs;
            let path = chunks_dir.join(chunk_file_name(index));
            wav::write_silence(
                &path,
                info.sample_rate,
                info.channels,
                remaining.min(chunk_secs),
            )?;
            paths.push(path);
        }
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_chunk_file_name_zero_padded() {
        assert_eq!(chunk_file_name(0), "chunk_0000.wav");
        assert_eq!(chunk_file_name(12), "chunk_0012.wav");
        assert_eq!(chunk_file_name(12345), "chunk_12345.wav");
    }

    #[test]
    fn test_parse_chunk_index() {
        assert_eq!(parse_chunk_index("chunk_0000.wav"), Some(0));
        assert_eq!(parse_chunk_index("chunk_0042.wav"), Some(42));
        assert_eq!(parse_chunk_index("chunk_12345.wav"), Some(12345));
        assert_eq!(parse_chunk_index("chunk_42.wav"), None);
        assert_eq!(parse_chunk_index("chunk_0001.mp3"), None);
        assert_eq!(parse_chunk_index("chunk_00a1.wav"), None);
        assert_eq!(parse_chunk_index("notes.txt"), None);
    }

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"x").unwrap();
        path
    }

    #[test]
    fn test_check_chunk_sequence_accepts_contiguous() {
        let dir = TempDir::new().unwrap();
        let paths = vec![
            touch(dir.path(), "chunk_0000.wav"),
            touch(dir.path(), "chunk_0001.wav"),
        ];
        assert!(check_chunk_sequence(&paths).is_ok());
    }

    #[test]
    fn test_check_chunk_sequence_rejects_gap_and_strays() {
        let dir = TempDir::new().unwrap();
        let gap = vec![
            touch(dir.path(), "chunk_0000.wav"),
            touch(dir.path(), "chunk_0002.wav"),
        ];
        assert!(check_chunk_sequence(&gap).unwrap_err().contains("contiguous"));

        let stray = vec![touch(dir.path(), "cover.jpg")];
        assert!(check_chunk_sequence(&stray).unwrap_err().contains("cover.jpg"));

        let not_zero_based = vec![touch(dir.path(), "chunk_0001.wav")];
        assert!(check_chunk_sequence(&not_zero_based).is_err());

        assert!(check_chunk_sequence(&[]).is_err());
    }

    #[test]
    fn test_scan_chunks_sorted() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "chunk_0001.wav");
        touch(dir.path(), "chunk_0000.wav");
        let paths = scan_chunks(dir.path()).unwrap();
        assert_eq!(paths[0].file_name().unwrap(), "chunk_0000.wav");
        assert_eq!(paths[1].file_name().unwrap(), "chunk_0001.wav");
    }

    #[test]
    fn test_scan_chunks_orders_by_index_past_four_digits() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "chunk_10000.wav");
        touch(dir.path(), "notes.txt");
        touch(dir.path(), "chunk_9999.wav");
        touch(dir.path(), "chunk_1000.wav");
        let names: Vec<_> = scan_chunks(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            ["chunk_1000.wav", "chunk_9999.wav", "chunk_10000.wav", "notes.txt"]
        );
    }

    #[test]
    fn test_scanned_sequence_crosses_four_digit_boundary() {
        let dir = TempDir::new().unwrap();
        for index in 0..=10_000 {
            touch(dir.path(), &chunk_file_name(index));
        }
        let paths = scan_chunks(dir.path()).unwrap();
        assert_eq!(paths.len(), 10_001);
        assert!(check_chunk_sequence(&paths).is_ok());
    }

    #[test]
    fn test_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(dir_is_empty(&dir.path().join("missing")).unwrap());
        assert!(dir_is_empty(dir.path()).unwrap());
        touch(dir.path(), "chunk_0000.wav");
        assert!(!dir_is_empty(dir.path()).unwrap());
    }

    #[test]
    fn test_mock_tool_writes_real_chunks() {
        let dir = TempDir::new().unwrap();
        let input = touch(dir.path(), "meeting.mp3");
        let normalized = dir.path().join("normalized.wav");
        let tool = MockAudioTool::new().with_duration(2.5);

        tool.normalize(&input, &normalized, 16000, 1).unwrap();
        let chunks = tool.chunk(&normalized, &dir.path().join("chunks"), 1).unwrap();

        assert_eq!(chunks.len(), 3);
        assert!(check_chunk_sequence(&chunks).is_ok());
        let last = wav::inspect(&chunks[2]).unwrap();
        assert!((last.duration_secs - 0.5).abs() < 1e-9);
        assert_eq!(tool.normalize_calls(), 1);
        assert_eq!(tool.chunk_calls(), 1);
    }

    #[test]
    fn test_mock_tool_scripted_failure() {
        let dir = TempDir::new().unwrap();
        let tool = MockAudioTool::new().with_chunk_failure("segment muxer exploded");
        let result = tool.chunk(&dir.path().join("n.wav"), dir.path(), 1);
        assert!(matches!(result, Err(PipelineError::ToolInvocation { .. })));
    }
}
