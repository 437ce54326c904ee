use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub shift: ShiftConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// Analysis FFT block size in samples.
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShiftConfig {
    /// Upper bound of the pitch-scaled spectrum region (Hz).
    #[serde(default = "default_tonality_limit_hz")]
    pub tonality_limit_hz: f64,
    /// Onset-scan window length in samples.
    #[serde(default = "default_onset_window")]
    pub onset_window: usize,
    /// RMS level a window must exceed to count toward an onset.
    #[serde(default = "default_onset_threshold")]
    pub onset_threshold: f64,
    /// Consecutive qualifying windows required to accept an onset.
    #[serde(default = "default_onset_windows_required")]
    pub onset_windows_required: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            fft_size: default_fft_size(),
        }
    }
}

impl Default for ShiftConfig {
    fn default() -> Self {
        Self {
            tonality_limit_hz: default_tonality_limit_hz(),
            onset_window: default_onset_window(),
            onset_threshold: default_onset_threshold(),
            onset_windows_required: default_onset_windows_required(),
        }
    }
}

fn default_fft_size() -> usize { 8192 }
fn default_tonality_limit_hz() -> f64 { 8000.0 }
fn default_onset_window() -> usize { 256 }
fn default_onset_threshold() -> f64 { 1e-4 }
fn default_onset_windows_required() -> usize { 3 }

pub fn load_config(path: &PathBuf) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    toml::from_str(&content).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.analysis.fft_size, 8192);
        assert_eq!(config.shift.tonality_limit_hz, 8000.0);
        assert_eq!(config.shift.onset_window, 256);
        assert_eq!(config.shift.onset_windows_required, 3);
    }

    #[test]
    fn partial_sections_keep_unset_defaults() {
        let config: Config = toml::from_str(
            "[analysis]\nfft_size = 4096\n\n[shift]\ntonality_limit_hz = 6000.0\n",
        )
        .unwrap();
        assert_eq!(config.analysis.fft_size, 4096);
        assert_eq!(config.shift.tonality_limit_hz, 6000.0);
        assert_eq!(config.shift.onset_threshold, 1e-4);
    }
}
