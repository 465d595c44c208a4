//! Merge per-chunk transcription results into one ordered transcript.

use crate::error::{PipelineError, Result};
use crate::provider::ChunkTranscript;
use serde::{Deserialize, Serialize};

/// Separator placed between the texts of consecutive chunks.
pub const CHUNK_SEPARATOR: &str = "\n\n";

/// Transcription result of one chunk, tagged with its position.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkResult {
    pub chunk_index: usize,
    pub transcript: ChunkTranscript,
    /// Length of the chunk audio, used to offset later chunks' segments.
    pub duration_secs: f64,
}

/// Timed span of the full transcript, in seconds from the start of the recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub chunk_index: usize,
    pub start_time: f64,
    pub end_time: f64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedTranscript {
    pub text: String,
    /// `None` unless every chunk supplied segments.
    pub segments: Option<Vec<TranscriptSegment>>,
    /// First language reported by any chunk, in chunk order.
    pub language: Option<String>,
    pub chunk_count: usize,
    /// Summed chunk durations.
    pub duration_secs: f64,
}

/// Combine chunk results in chunk-index order, whatever order they arrived in.
///
/// Indices must be exactly `0..n`. Texts are joined with [`CHUNK_SEPARATOR`];
/// segments are shifted by the summed duration of the preceding chunks.
/// A chunk whose text is blank contributes no separator, so it leaves no
/// boundary in the text, but its duration still shifts later segments.
pub fn aggregate(mut results: Vec<ChunkResult>) -> Result<AggregatedTranscript> {
    if results.is_empty() {
        return Err(PipelineError::Aggregation {
            message: "no chunk results to aggregate".to_string(),
        });
    }
    results.sort_by_key(|r| r.chunk_index);
    for (expected, result) in results.iter().enumerate() {
        if result.chunk_index != expected {
            return Err(PipelineError::Aggregation {
                message: format!(
                    "chunk results are not contiguous: expected index {expected}, found {}",
                    result.chunk_index
                ),
            });
        }
    }

    let text = results
        .iter()
        .map(|r| r.transcript.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(CHUNK_SEPARATOR);
    if text.is_empty() {
        return Err(PipelineError::Aggregation {
            message: "every chunk transcribed to empty text".to_string(),
        });
    }

    let segments = if results.iter().all(|r| r.transcript.segments.is_some()) {
        let mut offset = 0.0;
        let mut merged = Vec::new();
        for result in &results {
            for segment in result.transcript.segments.iter().flatten() {
                merged.push(TranscriptSegment {
                    chunk_index: result.chunk_index,
                    start_time: segment.start + offset,
                    end_time: segment.end + offset,
                    text: segment.text.clone(),
                });
            }
            offset += result.duration_secs;
        }
        Some(merged)
    } else {
        None
    };

    let language = results
        .iter()
        .find_map(|r| r.transcript.language.clone());

    Ok(AggregatedTranscript {
        text,
        segments,
        language,
        chunk_count: results.len(),
        duration_secs: results.iter().map(|r| r.duration_secs).sum(),
    })
}
