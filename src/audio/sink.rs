use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::error::RetuneError;

/// 32-bit float WAV writer with explicit finalization.
pub struct WavSink {
    writer: hound::WavWriter<BufWriter<File>>,
    channels: usize,
    frames_written: u64,
}

impl WavSink {
    pub fn open(path: &Path, sample_rate: u32, channels: usize) -> Result<Self, RetuneError> {
        let spec = hound::WavSpec {
            channels: channels as u16,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let writer = hound::WavWriter::create(path, spec).map_err(|e| match e {
            hound::Error::IoError(source) => RetuneError::FileOpen {
                path: path.to_path_buf(),
                source,
            },
            other => RetuneError::Wav(other),
        })?;
        Ok(Self {
            writer,
            channels,
            frames_written: 0,
        })
    }

    /// Writes interleaved samples and returns the number of whole frames
    /// written.
    pub fn write_frames(&mut self, interleaved: &[f32]) -> Result<u64, RetuneError> {
        for &sample in interleaved {
            self.writer.write_sample(sample)?;
        }
        let frames = interleaved.len() as u64 / self.channels as u64;
        self.frames_written += frames;
        Ok(frames)
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Flushes sample data and rewrites the header lengths.
    pub fn finalize(self) -> Result<(), RetuneError> {
        self.writer.finalize()?;
        Ok(())
    }
}
