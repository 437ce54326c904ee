use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::audio::aggregate::NoteTally;
use crate::audio::analysis::FrameAnalyzer;
use crate::audio::note::{classify, PitchClass};
use crate::audio::sink::WavSink;
use crate::audio::source::AudioSource;
use crate::audio::AudioBuffer;
use crate::config::Config;
use crate::error::RetuneError;
use crate::shift::engine::PitchShiftEngine;

pub struct AnalysisReport {
    pub note: PitchClass,
    pub score: f64,
    pub blocks: usize,
}

/// Pass 1: stream the file in fixed-size blocks and fold every block's
/// pitch observation into a fresh tally.
///
/// Emits the per-block stdout lines; silent blocks are reported with the
/// "-" placeholder and excluded from the tally.
pub fn analyze_file(path: &Path, fft_size: usize) -> Result<AnalysisReport, RetuneError> {
    let mut source = AudioSource::open(path)?;
    log::info!(
        "Opened {}: {} Hz, {} channel(s), {} frame(s)",
        path.display(),
        source.sample_rate(),
        source.channels(),
        source
            .total_frames()
            .map_or_else(|| "?".into(), |f| f.to_string())
    );

    let channels = source.channels();
    let mut analyzer = FrameAnalyzer::new(fft_size, source.sample_rate());
    let mut tally = NoteTally::new();
    let mut block = vec![0.0f32; fft_size * channels];
    let mut blocks = 0;
    let mut frames_total = 0u64;

    loop {
        // Zero-fill so a partial final block is analyzed zero-padded.
        block.fill(0.0);
        let frames = source.read_frames(&mut block)?;
        if frames == 0 {
            break;
        }
        frames_total += frames as u64;
        blocks += 1;

        let obs = analyzer.analyze(&block, channels);
        let label = classify(obs.frequency_hz);
        println!(
            "Fundamental frequency: {:.2} Hz, Magnitude: {:.2}, Note: {}",
            obs.frequency_hz,
            obs.magnitude,
            label.map_or("-", |note| note.name())
        );
        if let Some(note) = label {
            tally.record(note, obs.magnitude);
        }
    }

    if frames_total == 0 {
        return Err(RetuneError::EmptyAudio);
    }
    let (note, score) = tally.winner().ok_or(RetuneError::EmptyAudio)?;
    log::info!(
        "Analyzed {} block(s), {} frame(s), {} pitched observation(s)",
        blocks,
        frames_total,
        tally.observations()
    );

    Ok(AnalysisReport {
        note,
        score,
        blocks,
    })
}

/// Full two-pass run: analyze, decide, re-acquire the original at full
/// resolution, shift, and write the artifact.
pub fn run(input: &Path, output: Option<&Path>, config: &Config) -> Result<()> {
    let report = analyze_file(input, config.analysis.fft_size)
        .with_context(|| format!("analysis failed for {}", input.display()))?;
    println!("Overall note: {}, Score: {:.2}", report.note, report.score);

    if report.note == PitchClass::C {
        println!("The file is already tuned to C. No changes made.");
        return Ok(());
    }

    let semitones = report.note.semitones_to_c();
    log::info!(
        "Retuning {} by {:+} semitone(s) toward C ({} analyzed block(s))",
        report.note,
        semitones,
        report.blocks
    );

    // Pass 2: reopen the source rather than reusing the downmixed analysis
    // signal; the shift operates on the original multichannel audio.
    let mut source = AudioSource::open(input)?;
    let audio = AudioBuffer {
        samples: source.read_all()?,
        sample_rate: source.sample_rate(),
        channels: source.channels(),
    };
    drop(source);
    log::info!(
        "Reloaded {} frame(s) ({:.1}s) for the tuning pass",
        audio.frames(),
        audio.duration_secs()
    );

    let engine = PitchShiftEngine::new(semitones as f64, config.shift.clone());
    let shifted = engine
        .process(&audio)
        .context("pitch shift failed")?;

    let out_path: PathBuf = output.map_or_else(
        || PathBuf::from(format!("tuned_{}.wav", report.note)),
        Path::to_path_buf,
    );
    let mut sink = WavSink::open(&out_path, shifted.sample_rate, shifted.channels)?;
    let expected = shifted.frames() as u64;
    sink.write_frames(&shifted.samples)?;
    let written = sink.frames_written();
    sink.finalize()?;
    if written != expected {
        log::warn!(
            "wrote {} of {} frame(s) to {}",
            written,
            expected,
            out_path.display()
        );
    }

    println!("Tuned file saved as: {}", out_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_test_wav(name: &str, frequency: f64, sample_rate: u32, seconds: f64) -> PathBuf {
        let path = std::env::temp_dir().join(name);
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        let frames = (seconds * sample_rate as f64) as usize;
        for i in 0..frames {
            let s = 0.5
                * (2.0 * std::f64::consts::PI * frequency * i as f64 / sample_rate as f64).sin();
            writer.write_sample(s as f32).unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    #[test]
    fn two_second_440hz_sine_is_dominantly_a() {
        let path = write_test_wav("retune_pipeline_a440.wav", 440.0, 44100, 2.0);
        let report = analyze_file(&path, 8192).unwrap();
        assert_eq!(report.note, PitchClass::A);
        assert!(report.score > 0.0);
        assert!(report.blocks >= 10);
        // The configured table moves A up three semitones onto C.
        assert_eq!(report.note.semitones_to_c(), 3);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn zero_length_input_fails_with_empty_audio() {
        let path = std::env::temp_dir().join("retune_pipeline_empty.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let writer = hound::WavWriter::create(&path, spec).unwrap();
        writer.finalize().unwrap();

        assert!(matches!(
            analyze_file(&path, 8192),
            Err(RetuneError::EmptyAudio)
        ));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_input_is_a_file_open_error() {
        let path = Path::new("/nonexistent/retune-no-such-file.wav");
        assert!(matches!(
            analyze_file(path, 8192),
            Err(RetuneError::FileOpen { .. })
        ));
    }

    #[test]
    fn end_to_end_writes_a_retuned_artifact() {
        let input = write_test_wav("retune_pipeline_e2e.wav", 440.0, 44100, 1.0);
        let output = std::env::temp_dir().join("retune_pipeline_e2e_out.wav");
        std::fs::remove_file(&output).ok();

        let config = Config::default();
        run(&input, Some(&output), &config).unwrap();

        let mut reader = hound::WavReader::open(&output).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 44100);
        let frames = reader.duration() as i64;
        // Duration preserved within one stretch block of head-trim variance.
        assert!((frames - 44100).abs() <= 2048, "got {} frames", frames);
        // An A shifted +3 semitones lands near C5 (~523.25 Hz).
        let samples: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        let n = 8192;
        let mut analyzer = FrameAnalyzer::new(n, 44100);
        let obs = analyzer.analyze(&samples[4096..4096 + n], 1);
        assert!(
            (obs.frequency_hz - 523.25).abs() < 15.0,
            "expected ~523 Hz, got {:.1}",
            obs.frequency_hz
        );

        std::fs::remove_file(&input).ok();
        std::fs::remove_file(&output).ok();
    }
}
