use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gazetrack_core::{calibration, AnomalyDrain, CalibrationPhase, GrayFrame, PupilLocator};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod config;
mod source;
mod worker;

use config::Config;
use source::ReplaySource;

#[derive(Parser)]
#[command(name = "gazetrack", about = "Gazetrack webcam gaze analysis CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze recorded frames and print one JSON snapshot per line
    Analyze {
        /// Directory of grayscale or color frames, processed in file-name order
        #[arg(short, long)]
        frames: PathBuf,
        /// JSON sidecar with the detector's landmarks per frame
        #[arg(short, long)]
        landmarks: PathBuf,
    },
    /// Print the binarization threshold sweep for one pre-cropped eye image
    Sweep {
        #[arg(short, long)]
        image: PathBuf,
    },
    /// Run frames until calibration completes and print the frozen thresholds
    Calibrate {
        #[arg(short, long)]
        frames: PathBuf,
        #[arg(short, long)]
        landmarks: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Analyze { frames, landmarks } => analyze(&config, &frames, &landmarks).await,
        Commands::Sweep { image } => sweep(&config, &image),
        Commands::Calibrate { frames, landmarks } => calibrate(&config, &frames, &landmarks).await,
    }
}

async fn analyze(config: &Config, frames_dir: &Path, sidecar: &Path) -> Result<()> {
    let frames = source::list_frames(frames_dir)
        .with_context(|| format!("failed to list frames in {}", frames_dir.display()))?;
    let source = ReplaySource::load(sidecar)
        .with_context(|| format!("failed to load landmarks from {}", sidecar.display()))?;
    if source.is_empty() {
        tracing::warn!(sidecar = %sidecar.display(), "landmark sidecar is empty; every frame reads as no face");
    }
    tracing::info!(frames = frames.len(), sidecar_entries = source.len(), "analysis starting");

    let (handle, anomalies) = worker::spawn_engine(&config.tracker, source, config.queue_depth)?;
    let logger = spawn_anomaly_logger(anomalies);

    for path in frames {
        match handle.refresh(path.clone()).await {
            Ok(snapshot) => println!("{}", serde_json::to_string(&snapshot)?),
            Err(worker::WorkerError::Frame(e)) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable frame");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let report = handle.calibration().await?;
    drop(handle);
    logger.await?;
    tracing::info!(frames = report.frames, phase = ?report.phase, "analysis complete");
    Ok(())
}

async fn calibrate(config: &Config, frames_dir: &Path, sidecar: &Path) -> Result<()> {
    let frames = source::list_frames(frames_dir)
        .with_context(|| format!("failed to list frames in {}", frames_dir.display()))?;
    let source = ReplaySource::load(sidecar)
        .with_context(|| format!("failed to load landmarks from {}", sidecar.display()))?;

    let (handle, anomalies) = worker::spawn_engine(&config.tracker, source, config.queue_depth)?;
    let logger = spawn_anomaly_logger(anomalies);

    let mut report = handle.calibration().await?;
    for path in frames {
        if report.phase == CalibrationPhase::Calibrated {
            break;
        }
        match handle.refresh(path.clone()).await {
            Ok(_) => {}
            Err(worker::WorkerError::Frame(e)) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable frame");
            }
            Err(e) => return Err(e.into()),
        }
        report = handle.calibration().await?;
    }

    drop(handle);
    logger.await?;

    match (report.phase, report.left, report.right) {
        (CalibrationPhase::Calibrated, Some(left), Some(right)) => {
            println!("left  {left}");
            println!("right {right}");
            println!("frames {}", report.frames);
            Ok(())
        }
        _ => bail!(
            "calibration incomplete after {} frames ({} required with both eyes located)",
            report.frames,
            config.tracker.calibration_frames
        ),
    }
}

fn sweep(config: &Config, image: &Path) -> Result<()> {
    let eye = GrayFrame::load(image)
        .with_context(|| format!("failed to load eye image {}", image.display()))?;
    let locator = PupilLocator::new(&eye);
    let tracker = &config.tracker;

    for threshold in tracker.threshold_min..=tracker.threshold_max {
        println!("{threshold} {:.4}", locator.iris_size(threshold));
    }
    let best = calibration::sweep(
        &locator,
        tracker.threshold_min..=tracker.threshold_max,
        tracker.target_iris_size,
    );
    println!(
        "best {} {:.4} (target {})",
        best.threshold, best.iris_size, tracker.target_iris_size
    );
    Ok(())
}

/// Log anomaly records from a blocking consumer until the engine shuts down.
fn spawn_anomaly_logger(anomalies: AnomalyDrain) -> tokio::task::JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        for anomaly in anomalies.iter() {
            tracing::warn!(
                timestamp = %anomaly.timestamp.to_rfc3339(),
                classification = anomaly.kind.classification(),
                detail = ?anomaly.kind,
                "anomaly"
            );
        }
    })
}
