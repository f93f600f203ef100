use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use blink_core::landmarks::indices;
use blink_core::{eye_aspect_ratio, FaceMatchEngine};
use blink_engine::{spawn_engine, BatchReport, Config};

mod manifest;

use manifest::{FrameManifest, NoEmbedder, QueuedProvider};

#[derive(Parser)]
#[command(
    name = "blink",
    version,
    about = "Blink liveness and face matching over recorded frames"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Eye aspect ratios of one landmark set.
    Ear {
        /// JSON array of `{x, y}` points.
        landmarks: PathBuf,
    },
    /// Spectacle score for one face in one image.
    Spectacles { image: PathBuf, landmarks: PathBuf },
    /// Blinked/unblinked frames of a recorded sequence.
    Classify {
        /// Frame manifest with per-frame landmarks.
        manifest: PathBuf,
    },
    /// Match a probe embedding against a gallery or a single reference.
    Match {
        probe: PathBuf,
        #[arg(long, conflicts_with = "reference")]
        gallery: Option<PathBuf>,
        #[arg(long)]
        reference: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct EarReport {
    left: f32,
    right: f32,
    mean: f32,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.cmd {
        Commands::Ear { landmarks } => {
            let landmarks = manifest::load_landmarks(&landmarks)?;
            let left = eye_aspect_ratio(&landmarks, &indices::LEFT_EYE).context("left eye")?;
            let right = eye_aspect_ratio(&landmarks, &indices::RIGHT_EYE).context("right eye")?;
            print_json(&EarReport {
                left,
                right,
                mean: (left + right) / 2.0,
            })?;
        }
        Commands::Spectacles { image, landmarks } => {
            let frame = manifest::load_frame(&image)?;
            let landmarks = manifest::load_landmarks(&landmarks)?;
            let engine = spawn_engine(&config, QueuedProvider::new([vec![landmarks]]), NoEmbedder)
                .context("failed to start engine")?;
            let score = engine.check_spectacles(frame).await?;
            print_json(&score)?;
        }
        Commands::Classify { manifest } => {
            let report = classify(&config, &manifest).await?;
            print_json(&report)?;
        }
        Commands::Match {
            probe,
            gallery,
            reference,
        } => {
            let probe = manifest::load_embedding(&probe)?;
            let result = match (gallery, reference) {
                (Some(gallery), _) => {
                    let gallery = manifest::load_gallery(&gallery)?;
                    let engine = spawn_engine(&config, QueuedProvider::new(Vec::new()), NoEmbedder)
                        .context("failed to start engine")?;
                    engine.identify_embedding(probe, gallery).await?
                }
                (None, Some(reference)) => {
                    let reference = manifest::load_embedding(&reference)?;
                    let matcher = FaceMatchEngine::new(config.match_config()?)?;
                    matcher.compare_embeddings(&probe, &reference)
                }
                (None, None) => bail!("either --gallery or --reference is required"),
            };
            print_json(&result)?;
        }
    }

    Ok(())
}

async fn classify(config: &Config, path: &std::path::Path) -> Result<BatchReport> {
    let recording = FrameManifest::load(path)?;
    let total = recording.frames.len();

    let mut origin = Vec::with_capacity(total);
    let mut frames = Vec::with_capacity(total);
    let mut faces = Vec::with_capacity(total);
    let mut undecodable = Vec::new();

    for (index, entry) in recording.frames.into_iter().enumerate() {
        match manifest::load_frame(&entry.image) {
            Ok(frame) => {
                origin.push(index);
                frames.push(frame);
                faces.push(entry.faces);
            }
            Err(e) => {
                tracing::warn!(frame = index, error = %format!("{e:#}"), "skipping frame");
                undecodable.push(index);
            }
        }
    }

    let engine = spawn_engine(config, QueuedProvider::new(faces), NoEmbedder)
        .context("failed to start engine")?;
    let classification = engine.classify_batch(frames).await?;
    let report = BatchReport::from_decoded(classification, &origin, undecodable);

    tracing::info!(
        frames = total,
        blinked = report.classification.blinked.len(),
        unblinked = report.classification.unblinked.len(),
        "manifest classified"
    );
    Ok(report)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
