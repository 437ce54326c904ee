use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// One block's frequency estimate: the refined spectral peak and its
/// magnitude. A silent block reports `(0.0 Hz, 0.0)`; callers must treat
/// zero magnitude as "no pitch", not as a C-class detection.
#[derive(Debug, Clone, Copy)]
pub struct PitchObservation {
    pub frequency_hz: f64,
    pub magnitude: f64,
}

/// Turns one interleaved multichannel block into a `PitchObservation`:
/// downmix to mono, Hann window, forward FFT, magnitude spectrum, peak
/// pick, parabolic refinement.
///
/// The FFT plan, window and scratch buffers live for the whole analysis
/// pass; `analyze` is called once per block with a constant block size.
pub struct FrameAnalyzer {
    fft: Arc<dyn Fft<f64>>,
    fft_size: usize,
    sample_rate: u32,
    window: Vec<f64>,
    buffer: Vec<Complex<f64>>,
    magnitudes: Vec<f64>,
}

impl FrameAnalyzer {
    pub fn new(fft_size: usize, sample_rate: u32) -> Self {
        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(fft_size);
        Self {
            fft,
            fft_size,
            sample_rate,
            window: hann_window(fft_size),
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            magnitudes: vec![0.0; fft_size / 2],
        }
    }

    /// Analyzes one block of `fft_size * channels` interleaved samples.
    pub fn analyze(&mut self, block: &[f32], channels: usize) -> PitchObservation {
        debug_assert_eq!(block.len(), self.fft_size * channels);

        for i in 0..self.fft_size {
            let frame = &block[i * channels..(i + 1) * channels];
            let mono = frame.iter().map(|&s| s as f64).sum::<f64>() / channels as f64;
            self.buffer[i] = Complex::new(mono * self.window[i], 0.0);
        }

        self.fft.process(&mut self.buffer);

        for i in 0..self.fft_size / 2 {
            self.magnitudes[i] = self.buffer[i].norm();
        }

        let mut peak = 0;
        let mut max_magnitude = 0.0;
        for (i, &magnitude) in self.magnitudes.iter().enumerate() {
            if magnitude > max_magnitude {
                max_magnitude = magnitude;
                peak = i;
            }
        }

        let frequency_hz = refine_frequency(
            peak,
            &self.magnitudes,
            self.fft_size,
            self.sample_rate as f64,
        );

        PitchObservation {
            frequency_hz,
            magnitude: max_magnitude,
        }
    }
}

/// Refines a peak bin to sub-bin accuracy by parabolic interpolation over
/// its magnitude neighbors. A peak without valid neighbors (bin 0 or the
/// last usable bin), or one with a degenerate flat neighborhood, falls back
/// to the plain bin frequency.
pub(crate) fn refine_frequency(
    peak: usize,
    magnitudes: &[f64],
    fft_size: usize,
    sample_rate: f64,
) -> f64 {
    let bin_hz = sample_rate / fft_size as f64;
    if peak == 0 || peak + 1 >= fft_size / 2 {
        return peak as f64 * bin_hz;
    }

    let alpha = magnitudes[peak - 1];
    let beta = magnitudes[peak];
    let gamma = magnitudes[peak + 1];
    let denominator = alpha - 2.0 * beta + gamma;
    if denominator == 0.0 {
        return peak as f64 * bin_hz;
    }

    let adjustment = 0.5 * (alpha - gamma) / denominator;
    (peak as f64 + adjustment) * bin_hz
}

fn hann_window(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / (size - 1) as f64).cos())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frequency: f64, sample_rate: f64, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                (2.0 * std::f64::consts::PI * frequency * i as f64 / sample_rate).sin() as f32
            })
            .collect()
    }

    #[test]
    fn silent_block_reports_no_pitch() {
        for n in [256usize, 1024, 8192] {
            let mut analyzer = FrameAnalyzer::new(n, 44100);
            let block = vec![0.0f32; n];
            let obs = analyzer.analyze(&block, 1);
            assert_eq!(obs.magnitude, 0.0);
            assert_eq!(obs.frequency_hz, 0.0);
        }
    }

    #[test]
    fn bin_centered_sine_needs_no_adjustment() {
        // sample_rate == fft_size makes every integer frequency a bin center.
        let n = 1024;
        let mut analyzer = FrameAnalyzer::new(n, 1024);
        let block = sine(128.0, 1024.0, n);
        let obs = analyzer.analyze(&block, 1);
        assert!(
            (obs.frequency_hz - 128.0).abs() < 0.05,
            "got {} Hz",
            obs.frequency_hz
        );
        assert!(obs.magnitude > 0.0);
    }

    #[test]
    fn off_bin_sine_is_refined_toward_the_true_frequency() {
        let n = 1024;
        let mut analyzer = FrameAnalyzer::new(n, 1024);
        let block = sine(128.4, 1024.0, n);
        let obs = analyzer.analyze(&block, 1);
        assert!(
            (obs.frequency_hz - 128.4).abs() < 0.2,
            "got {} Hz",
            obs.frequency_hz
        );
    }

    #[test]
    fn stereo_block_is_downmixed_before_analysis() {
        let n = 1024;
        let mut analyzer = FrameAnalyzer::new(n, 1024);
        let mono = sine(128.0, 1024.0, n);
        let mut stereo = Vec::with_capacity(n * 2);
        for &s in &mono {
            stereo.push(s);
            stereo.push(-s); // cancels to silence on average
        }
        let obs = analyzer.analyze(&stereo, 2);
        assert!(obs.magnitude < 1e-9, "got magnitude {}", obs.magnitude);
    }

    #[test]
    fn refine_at_spectrum_edges_returns_the_bin_frequency() {
        let n = 1024usize;
        let sr = 44100.0;
        let mut magnitudes = vec![0.0f64; n / 2];

        magnitudes[0] = 10.0;
        assert_eq!(refine_frequency(0, &magnitudes, n, sr), 0.0);

        magnitudes[n / 2 - 1] = 20.0;
        let expected = (n / 2 - 1) as f64 * sr / n as f64;
        assert_eq!(refine_frequency(n / 2 - 1, &magnitudes, n, sr), expected);
    }

    #[test]
    fn refine_with_flat_neighborhood_does_not_divide_by_zero() {
        let n = 1024usize;
        let magnitudes = vec![1.0f64; n / 2];
        let refined = refine_frequency(100, &magnitudes, n, 44100.0);
        assert_eq!(refined, 100.0 * 44100.0 / 1024.0);
    }
}
