//! Default configuration constants for minutes.
//!
//! Shared by the config file layer, the CLI, and `RunConfig` so every entry
//! point agrees on the same values.

/// Sample rate of the normalized WAV in Hz.
///
/// 16kHz mono is what speech-to-text providers resample to anyway; sending
/// it directly keeps chunk uploads small.
pub const SAMPLE_RATE: u32 = 16000;

/// Channel count of the normalized WAV.
pub const CHANNELS: u16 = 1;

/// Chunk length in seconds.
///
/// Ten minutes of 16kHz mono PCM is ~19 MB, below the 25 MB upload limit of
/// the OpenAI transcription endpoint.
pub const CHUNK_SECONDS: u64 = 600;

/// Additional attempts per chunk after the first transcription call fails transiently.
pub const MAX_RETRIES: u32 = 2;

/// Longest pause honored between retries, whatever the provider's `Retry-After` asks for.
pub const MAX_RETRY_AFTER_SECS: u64 = 300;

/// Concurrent chunk transcription calls.
pub const WORKERS: usize = 4;

/// Default transcription model.
pub const TRANSCRIPTION_MODEL: &str = "whisper-1";

/// Default minutes generation model.
pub const MINUTES_MODEL: &str = "gpt-4o-mini";

/// Default transcription provider name.
pub const PROVIDER: &str = "openai";

/// Base URL of the OpenAI-compatible API.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// HTTP timeout for provider calls in seconds.
pub const HTTP_TIMEOUT_SECS: u64 = 120;

/// ffmpeg executable looked up on PATH.
pub const FFMPEG: &str = "ffmpeg";

/// pandoc executable used for DOCX export.
pub const PANDOC: &str = "pandoc";

/// Fallback pandoc location when neither config nor `MINUTES_PANDOC` set one.
pub const PANDOC_PATH_ENV: &str = "PANDOC_PATH";

/// Heading depth of the DOCX table of contents.
pub const TOC_DEPTH: u32 = 2;

/// Environment variable holding the provider API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
