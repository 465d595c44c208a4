//! External provider boundaries: chunk transcription and minutes generation.

pub mod minutes;
#[cfg(feature = "openai")]
pub mod openai;
pub mod transcriber;

pub use minutes::{
    DEFAULT_MINUTES_PROMPT, DEFAULT_PROMPT_VERSION, LoadedPrompt, MinutesGenerator,
    MinutesRequest, MockMinutesGenerator, load_prompt,
};
#[cfg(feature = "openai")]
pub use openai::{OpenAiConfig, OpenAiMinutesGenerator, OpenAiTranscriber};
pub use transcriber::{ChunkRequest, ChunkSegment, ChunkTranscript, MockTranscriber, Transcriber};
