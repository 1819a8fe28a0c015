use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use reel_compositor::{
    composition::{Segment, StitchEngine},
    config::Config,
    progress::{ProcessingProgress, ProcessingStage, ProgressCallback},
    video::{Clip, FfmpegEncoderFactory, SyntheticLoader},
};

#[derive(Parser)]
#[command(
    name = "reel-compositor",
    version,
    about = "Stitch video clips into a single reel with transitions",
    long_about = "Reel-Compositor plays an ordered list of clips back to back, blends each junction with the requested transition and encodes the result into one video file."
)]
struct Cli {
    /// Clip manifest (TOML with [[clips]] tables)
    #[arg(short, long)]
    manifest: PathBuf,

    /// Output video file path
    #[arg(short, long, required_unless_present = "plan_only")]
    output: Option<PathBuf>,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the output frame rate
    #[arg(long)]
    fps: Option<f64>,

    /// Print the frame plan and exit without rendering
    #[arg(long)]
    plan_only: bool,

    /// Read clips from generated synthetic: URLs instead of decoding them
    #[arg(long)]
    synthetic: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    clips: Vec<Clip>,
}

fn load_manifest(path: &Path) -> Result<Vec<Clip>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {:?}", path))?;
    let manifest: Manifest = toml::from_str(&content)
        .with_context(|| format!("Failed to parse manifest {:?}", path))?;
    Ok(manifest.clips)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    info!("Starting Reel-Compositor v{}", env!("CARGO_PKG_VERSION"));
    info!("Manifest: {:?}", cli.manifest);

    // Load configuration
    let mut config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };
    if let Some(fps) = cli.fps {
        config.output.fps = fps;
    }
    config.validate()?;

    let clips = load_manifest(&cli.manifest)?;
    info!("{} clips in manifest", clips.len());

    let engine = if cli.synthetic {
        let encoders = Arc::new(FfmpegEncoderFactory::from_config(&config));
        StitchEngine::new(config, Arc::new(SyntheticLoader::new()), encoders)
    } else {
        StitchEngine::with_ffmpeg(config)
    };

    if cli.plan_only {
        let plan = engine.plan(&clips).await?;
        for segment in &plan.segments {
            match segment {
                Segment::Main { clip, start, frames } => {
                    println!("main        clip {:>3}  from {:>7.3}s  {:>6} frames", clip + 1, start, frames);
                }
                Segment::Transition { from, to, kind, duration, frames, .. } => {
                    println!(
                        "{:<11} clip {:>3} -> {:<3} {:.3}s  {:>6} frames",
                        kind.name(), from + 1, to + 1, duration, frames
                    );
                }
            }
        }
        for warning in &plan.warnings {
            warn!("{}", warning);
        }
        println!("total {} frames ({:.2}s at {} fps)", plan.total_frames, plan.duration(), plan.fps);
        return Ok(());
    }

    let output = cli
        .output
        .ok_or_else(|| anyhow::anyhow!("--output is required unless --plan-only is set"))?;

    // Ctrl-C cancels the run
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling...");
            on_interrupt.cancel();
        }
    });

    let on_progress: ProgressCallback = Arc::new(|p: ProcessingProgress| {
        if p.stage != ProcessingStage::Error {
            info!("[{:>11}] {:>3}%  {}", p.stage.to_string(), p.progress, p.message);
        }
    });

    let video = engine
        .process_with_cancel(&clips, Some(on_progress), cancel)
        .await?;
    video.save(&output).await?;

    info!("Reel saved to {:?}", output);
    println!("{}", video.mime_type);
    Ok(())
}
