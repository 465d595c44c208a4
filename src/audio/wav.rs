//! WAV header inspection for normalized audio and chunks.

use crate::error::{PipelineError, Result};
use std::path::Path;

/// Format and length of a WAV file, read from its header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WavInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub duration_secs: f64,
}

/// Read the header of the WAV file at `path`.
pub fn inspect(path: &Path) -> Result<WavInfo> {
    let reader = hound::WavReader::open(path).map_err(|e| match e {
        hound::Error::IoError(source) => PipelineError::io(path, source),
        other => PipelineError::validation(format!(
            "not a valid WAV file: {}: {other}",
            path.display()
        )),
    })?;
    let spec = reader.spec();
    let frames = reader.duration();
    let duration_secs = if spec.sample_rate == 0 {
        0.0
    } else {
        f64::from(frames) / f64::from(spec.sample_rate)
    };
    Ok(WavInfo {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        bits_per_sample: spec.bits_per_sample,
        duration_secs,
    })
}

impl WavInfo {
    /// True for 16-bit PCM at the given rate and channel count.
    pub fn matches(&self, sample_rate: u32, channels: u16) -> bool {
        self.sample_rate == sample_rate && self.channels == channels && self.bits_per_sample == 16
    }
}

/// Write `secs` of 16-bit PCM silence.
pub fn write_silence(path: &Path, sample_rate: u32, channels: u16, secs: f64) -> Result<()> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let to_error = |e: hound::Error| match e {
        hound::Error::IoError(source) => PipelineError::io(path, source),
        other => PipelineError::validation(format!("cannot write WAV {}: {other}", path.display())),
    };

    let mut writer = hound::WavWriter::create(path, spec).map_err(to_error)?;
    let frames = (secs.max(0.0) * f64::from(sample_rate)).round() as u64;
    for _ in 0..frames * u64::from(channels) {
        writer.write_sample(0i16).map_err(to_error)?;
    }
    writer.finalize().map_err(to_error)
}
