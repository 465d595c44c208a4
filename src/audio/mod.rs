//! Media tooling: normalization, chunking, WAV inspection.

pub mod command;
pub mod ffmpeg;
pub mod tool;
pub mod wav;

pub use command::{CommandExecutor, SystemCommandExecutor};
pub use ffmpeg::FfmpegTool;
pub use tool::{
    AudioTool, MockAudioTool, check_chunk_sequence, chunk_file_name, dir_is_empty,
    parse_chunk_index,
};
pub use wav::WavInfo;
