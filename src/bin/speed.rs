use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use lanetrack::{video, Config};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Speed of vehicles crossing a detection line, from dense optical flow
#[derive(Debug, Parser)]
#[clap(version)]
struct Opts {
    /// Input video
    video: PathBuf,

    /// Output JSON with speeds per vehicle
    json: PathBuf,

    /// Annotated output video
    output: PathBuf,

    /// Detections file with detector track ids, `<frame>:<json array>` per line
    #[clap(short, long)]
    detections: PathBuf,

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

    info!("processing video: {}", opts.video.display());

    let config = match &opts.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };

    video::speed_session(&opts.video, &opts.detections, &opts.json, &opts.output, &config)?;

    info!("speeds saved to {}", opts.json.display());
    info!("output video saved to {}", opts.output.display());

    Ok(())
}
