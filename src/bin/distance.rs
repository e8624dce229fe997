use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use lanetrack::{video, Config};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Distance to the closest vehicle in the ego lane, per frame
#[derive(Debug, Parser)]
#[clap(version)]
struct Opts {
    /// Input video
    video: PathBuf,

    /// Output JSON with distances per vehicle
    json: PathBuf,

    /// Detections file, `<frame>:<json array>` per line
    #[clap(short, long)]
    detections: PathBuf,

    /// Annotated output video
    #[clap(short, long, default_value = "output.mp4")]
    output: PathBuf,

    /// YAML configuration
    #[clap(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lanetrack=info")),
        )
        .init();

    let opts = Opts::parse();

    let config = match &opts.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };

    video::distance_session(&opts.video, &opts.detections, &opts.json, &opts.output, &config)?;

    info!("distances with timestamps saved to {}", opts.json.display());

    Ok(())
}
