use indicatif::{ProgressBar, ProgressStyle};

use crate::audio::AudioBuffer;
use crate::config::ShiftConfig;
use crate::error::RetuneError;
use crate::shift::stretch::PitchStretcher;

/// Duration-preserving pitch shift over a fully decoded signal.
///
/// One engine invocation constructs a fresh stretcher, streams the
/// de-interleaved input through it block by block in strict order, flushes
/// the buffered tail, trims the priming latency from the head using an RMS
/// onset scan, and re-interleaves. The tail is always preserved in full:
/// output duration differs from input only by head-trim variance of at most
/// one block.
pub struct PitchShiftEngine {
    semitones: f64,
    options: ShiftConfig,
}

impl PitchShiftEngine {
    pub fn new(semitones: f64, options: ShiftConfig) -> Self {
        Self { semitones, options }
    }

    pub fn process(&self, audio: &AudioBuffer) -> Result<AudioBuffer, RetuneError> {
        if audio.samples.is_empty() || audio.channels == 0 {
            return Err(RetuneError::EmptyAudio);
        }

        let channels = audio.channels;
        let frames = audio.frames();

        let mut stretcher = PitchStretcher::new(
            channels,
            audio.sample_rate,
            self.semitones,
            self.options.tonality_limit_hz,
        );
        let block = stretcher.block_samples();
        let latency = stretcher.output_latency();

        // De-interleave into per-channel buffers, zero-padded to a whole
        // number of blocks.
        let padded = (frames + block - 1) / block * block;
        let mut inputs: Vec<Vec<f32>> = vec![vec![0.0; padded]; channels];
        for f in 0..frames {
            for ch in 0..channels {
                inputs[ch][f] = audio.samples[f * channels + ch];
            }
        }

        let num_blocks = padded / block;
        log::info!(
            "Shifting {} frame(s) by {:+.2} semitone(s) in {} block(s) of {}",
            frames,
            self.semitones,
            num_blocks,
            block
        );

        let pb = ProgressBar::new(num_blocks as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} blocks")
                .unwrap()
                .progress_chars("=>-"),
        );

        let mut outputs: Vec<Vec<f32>> = (0..channels)
            .map(|_| Vec::with_capacity(padded + latency))
            .collect();
        for b in 0..num_blocks {
            let start = b * block;
            let slices: Vec<&[f32]> = inputs.iter().map(|ch| &ch[start..start + block]).collect();
            let out = stretcher.process(&slices);
            for (ch, out_block) in out.iter().enumerate() {
                outputs[ch].extend_from_slice(out_block);
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        let tail = stretcher.flush();
        for (ch, tail_block) in tail.iter().enumerate() {
            outputs[ch].extend_from_slice(tail_block);
        }

        let trim = self.find_trim_offset(&outputs, latency);
        log::debug!("trimming {} priming sample(s) ({} nominal)", trim, latency);

        let out_frames = outputs[0].len() - trim;
        let mut interleaved = vec![0.0f32; out_frames * channels];
        for f in 0..out_frames {
            for ch in 0..channels {
                interleaved[f * channels + ch] = outputs[ch][trim + f];
            }
        }

        Ok(AudioBuffer {
            samples: interleaved,
            sample_rate: audio.sample_rate,
            channels,
        })
    }

    /// Finds the head-trim point: starting at the nominal latency, scans
    /// consecutive windows for sustained RMS energy across all channels,
    /// backs the accepted index off by half the consecutive-window span, and
    /// never trims less than the nominal latency. Falls back to the nominal
    /// latency when nothing crosses the threshold.
    fn find_trim_offset(&self, outputs: &[Vec<f32>], base_latency: usize) -> usize {
        let window = self.options.onset_window;
        let required = self.options.onset_windows_required.max(1);
        let threshold = self.options.onset_threshold;
        let channels = outputs.len();
        let total = outputs[0].len();

        if total < base_latency + window {
            return base_latency.min(total);
        }

        let mut hits = 0;
        let mut i = base_latency;
        while i + window <= total {
            let mut sum_sq = 0.0f64;
            for ch in outputs {
                for &v in &ch[i..i + window] {
                    sum_sq += v as f64 * v as f64;
                }
            }
            let rms = (sum_sq / (window * channels) as f64).sqrt();
            if rms > threshold {
                hits += 1;
                if hits >= required {
                    let backoff = (required - 1) * window / 2;
                    return i.saturating_sub(backoff).max(base_latency);
                }
            } else {
                hits = 0;
            }
            i += window;
        }

        base_latency
    }
}
