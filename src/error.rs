use std::path::PathBuf;
use thiserror::Error;

/// Failure taxonomy for the analyze/retune pipeline.
///
/// Partial I/O (skipped undecodable packets, short writes) is not a variant:
/// it is recovered locally with a `log::warn!` and processing continues.
#[derive(Debug, Error)]
pub enum RetuneError {
    #[error("failed to open {path}: {source}")]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Zero-length input, or a stream with no analyzable audio content.
    #[error("input contains no analyzable audio")]
    EmptyAudio,

    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("decode error: {0}")]
    Decode(#[from] symphonia::core::errors::Error),

    #[error("wav write error: {0}")]
    Wav(#[from] hound::Error),
}
