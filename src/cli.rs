use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "retune",
    about = "Detects a recording's dominant note and retunes it toward C"
)]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG)
    pub input: Option<PathBuf>,

    /// Output WAV path (defaults to tuned_<NOTE>.wav)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Analysis FFT block size in samples (power of two)
    #[arg(long, default_value_t = 8192)]
    pub fft_size: usize,

    /// Config file path (defaults to retune.toml / platform config dir)
    #[arg(long)]
    pub config: Option<PathBuf>,
}
