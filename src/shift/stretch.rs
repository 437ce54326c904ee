use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f64::consts::PI;
use std::sync::Arc;

const FRAME_SIZE: usize = 2048;
const OVERLAP: usize = 4;
const HOP: usize = FRAME_SIZE / OVERLAP;
const LATENCY: usize = FRAME_SIZE - HOP;

/// Sum of the squared periodic Hann window across overlapping frames at
/// 75% overlap; the overlap-add gain to divide out.
const COLA_GAIN: f64 = 1.5;

/// Streaming phase-vocoder pitch shifter.
///
/// Construction is configuration: channel count, sample rate, transpose
/// amount and tonality limit are fixed for the stretcher's lifetime, so an
/// unconfigured instance cannot exist. Blocks must be fed strictly in order
/// through `process`; the stretcher carries overlap-add state across calls.
/// `flush` consumes the stretcher and returns the buffered tail, which makes
/// process-after-flush a compile-time error.
///
/// Each channel runs an independent STFT chain: analysis frames of
/// `FRAME_SIZE` samples at 75% overlap, per-bin true-frequency estimation
/// from phase deltas, and bin remapping by the pitch ratio. Synthesis phases
/// are referenced to the analysis phases, with only the accumulated shift
/// offset carried across frames; at a transpose of zero the resynthesis is
/// exact. Output lags input by `output_latency()` samples of priming.
pub struct PitchStretcher {
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
    window: Vec<f64>,
    ratio: f64,
    bin_hz: f64,
    cutoff_bin: usize,
    channels: Vec<ChannelState>,
    // per-frame scratch, shared across channels
    spectrum: Vec<Complex<f64>>,
    ana_magn: Vec<f64>,
    ana_freq: Vec<f64>,
    ana_phase: Vec<f64>,
    syn_magn: Vec<f64>,
    syn_phase: Vec<f64>,
    syn_advance: Vec<f64>,
}

struct ChannelState {
    in_fifo: Vec<f32>,
    out_fifo: Vec<f32>,
    fill: usize,
    last_phase: Vec<f64>,
    /// Accumulated phase offset of the transposed content relative to the
    /// analysis phase, per synthesis bin.
    shift_offset: Vec<f64>,
    accum: Vec<f64>,
}

impl ChannelState {
    fn new() -> Self {
        Self {
            in_fifo: vec![0.0; FRAME_SIZE],
            out_fifo: vec![0.0; HOP],
            fill: LATENCY,
            last_phase: vec![0.0; FRAME_SIZE / 2 + 1],
            shift_offset: vec![0.0; FRAME_SIZE / 2 + 1],
            accum: vec![0.0; FRAME_SIZE],
        }
    }
}

impl PitchStretcher {
    /// `tonality_limit_hz` bounds the shifted region of the spectrum: bins
    /// above the cutoff are carried through unscaled. The cutoff is clamped
    /// to Nyquist.
    pub fn new(channels: usize, sample_rate: u32, semitones: f64, tonality_limit_hz: f64) -> Self {
        assert!(channels > 0, "stretcher needs at least one channel");

        let mut planner = FftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(FRAME_SIZE);
        let inverse = planner.plan_fft_inverse(FRAME_SIZE);

        let bin_hz = sample_rate as f64 / FRAME_SIZE as f64;
        let nyquist = sample_rate as f64 / 2.0;
        let cutoff_hz = tonality_limit_hz.clamp(0.0, nyquist);
        let cutoff_bin = ((cutoff_hz / bin_hz) as usize).min(FRAME_SIZE / 2);

        Self {
            forward,
            inverse,
            window: periodic_hann(FRAME_SIZE),
            ratio: 2f64.powf(semitones / 12.0),
            bin_hz,
            cutoff_bin,
            channels: (0..channels).map(|_| ChannelState::new()).collect(),
            spectrum: vec![Complex::new(0.0, 0.0); FRAME_SIZE],
            ana_magn: vec![0.0; FRAME_SIZE / 2 + 1],
            ana_freq: vec![0.0; FRAME_SIZE / 2 + 1],
            ana_phase: vec![0.0; FRAME_SIZE / 2 + 1],
            syn_magn: vec![0.0; FRAME_SIZE / 2 + 1],
            syn_phase: vec![0.0; FRAME_SIZE / 2 + 1],
            syn_advance: vec![0.0; FRAME_SIZE / 2 + 1],
        }
    }

    /// Preferred input block length for `process`.
    pub fn block_samples(&self) -> usize {
        FRAME_SIZE
    }

    /// Number of priming samples at the head of the output stream.
    pub fn output_latency(&self) -> usize {
        LATENCY
    }

    /// Feeds one in-order block per channel and returns the same-length
    /// output block per channel.
    pub fn process(&mut self, input: &[&[f32]]) -> Vec<Vec<f32>> {
        assert_eq!(input.len(), self.channels.len(), "channel count mismatch");
        let block_len = input[0].len();
        debug_assert!(input.iter().all(|ch| ch.len() == block_len));

        let mut output: Vec<Vec<f32>> = (0..self.channels.len())
            .map(|_| Vec::with_capacity(block_len))
            .collect();
        for ch in 0..self.channels.len() {
            for i in 0..block_len {
                let out = self.push_sample(ch, input[ch][i]);
                output[ch].push(out);
            }
        }
        output
    }

    /// Consumes the stretcher, pushing zeros to drain the buffered tail.
    /// The returned blocks have `output_latency()` samples per channel.
    pub fn flush(mut self) -> Vec<Vec<f32>> {
        let zeros = vec![0.0f32; LATENCY];
        let blocks: Vec<&[f32]> = (0..self.channels.len()).map(|_| zeros.as_slice()).collect();
        self.process(&blocks)
    }

    fn push_sample(&mut self, ch: usize, sample: f32) -> f32 {
        let state = &mut self.channels[ch];
        let out = state.out_fifo[state.fill - LATENCY];
        state.in_fifo[state.fill] = sample;
        state.fill += 1;
        if state.fill == FRAME_SIZE {
            self.process_frame(ch);
        }
        out
    }

    fn process_frame(&mut self, ch: usize) {
        let Self {
            forward,
            inverse,
            window,
            ratio,
            bin_hz,
            cutoff_bin,
            channels,
            spectrum,
            ana_magn,
            ana_freq,
            ana_phase,
            syn_magn,
            syn_phase,
            syn_advance,
        } = self;
        let state = &mut channels[ch];
        let half = FRAME_SIZE / 2;
        // expected phase advance per hop for bin k is k * expect
        let expect = 2.0 * PI * HOP as f64 / FRAME_SIZE as f64;

        for i in 0..FRAME_SIZE {
            spectrum[i] = Complex::new(state.in_fifo[i] as f64 * window[i], 0.0);
        }
        forward.process(spectrum);

        // Analysis: true frequency per bin from the phase delta.
        for k in 0..=half {
            let bin = spectrum[k];
            let magnitude = bin.norm();
            let phase = bin.im.atan2(bin.re);

            let mut delta = phase - state.last_phase[k];
            state.last_phase[k] = phase;
            delta = wrap_phase(delta - k as f64 * expect);

            let deviation = OVERLAP as f64 * delta / (2.0 * PI);
            ana_magn[k] = magnitude;
            ana_freq[k] = (k as f64 + deviation) * *bin_hz;
            ana_phase[k] = phase;
        }

        // Transpose: remap bins by the pitch ratio. Bins above the tonality
        // cutoff keep their position and frequency.
        syn_magn.fill(0.0);
        syn_phase.fill(0.0);
        syn_advance.fill(0.0);
        for k in 0..=half {
            let (target, advance) = if k > *cutoff_bin {
                (k, 0.0)
            } else {
                // Extra phase the transposed content gains per hop over the
                // analysis phase it is referenced to.
                let target = (k as f64 * *ratio).round() as usize;
                let advance = (*ratio - 1.0) * ana_freq[k] / *bin_hz * expect;
                (target, advance)
            };
            if target <= half {
                syn_magn[target] += ana_magn[k];
                syn_phase[target] = ana_phase[k];
                syn_advance[target] = advance;
            }
        }

        // Synthesis: analysis-phase-referenced resynthesis. Only the shift
        // offset accumulates across frames, so a unity ratio reproduces the
        // analysis spectrum exactly.
        for k in 0..=half {
            state.shift_offset[k] = wrap_phase(state.shift_offset[k] + syn_advance[k]);
            let phase = wrap_phase(syn_phase[k] + state.shift_offset[k]);
            spectrum[k] = Complex::from_polar(syn_magn[k], phase);
        }
        for k in 1..half {
            spectrum[FRAME_SIZE - k] = spectrum[k].conj();
        }
        inverse.process(spectrum);

        // Overlap-add (inverse FFT is unnormalized, hence / FRAME_SIZE).
        for i in 0..FRAME_SIZE {
            state.accum[i] += spectrum[i].re / FRAME_SIZE as f64 * window[i] / COLA_GAIN;
        }
        for i in 0..HOP {
            state.out_fifo[i] = state.accum[i] as f32;
        }
        state.accum.copy_within(HOP.., 0);
        state.accum[LATENCY..].fill(0.0);

        // Keep the trailing LATENCY input samples for the next frame.
        state.in_fifo.copy_within(HOP.., 0);
        state.fill = LATENCY;
    }
}

/// Wraps a phase into (-PI, PI].
fn wrap_phase(phase: f64) -> f64 {
    let wrapped = phase.rem_euclid(2.0 * PI);
    if wrapped > PI {
        wrapped - 2.0 * PI
    } else {
        wrapped
    }
}

fn periodic_hann(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / size as f64).cos())
        .collect()
}
