mod audio;
mod cli;
mod config;
mod error;
mod pipeline;
mod shift;

use anyhow::{Context, Result};
use clap::Parser;

use cli::Cli;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    // Load config: explicit --config path, or auto-detect retune.toml / global config
    let config_path = cli.config.clone().or_else(|| {
        let local = std::path::PathBuf::from("retune.toml");
        if local.exists() {
            return Some(local);
        }
        if let Some(config_dir) = dirs::config_dir() {
            let platform = config_dir.join("retune").join("config.toml");
            if platform.exists() {
                return Some(platform);
            }
        }
        None
    });
    let mut config = config::Config::default();
    if let Some(ref path) = config_path {
        if let Some(cfg) = config::load_config(path) {
            log::info!("Loaded config from {}", path.display());
            config = cfg;
        } else {
            log::warn!("Failed to load config from {}", path.display());
        }
    }
    // Merge: the CLI value applies only when it was explicitly set
    if cli.fft_size != 8192 {
        config.analysis.fft_size = cli.fft_size;
    }
    anyhow::ensure!(
        config.analysis.fft_size.is_power_of_two() && config.analysis.fft_size >= 256,
        "fft size must be a power of two >= 256, got {}",
        config.analysis.fft_size
    );

    let input = cli.input.as_ref().context("Input audio file is required")?;
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }

    pipeline::run(input, cli.output.as_deref(), &config)
}
