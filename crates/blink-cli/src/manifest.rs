//! JSON inputs for offline runs, and the stand-in models that replay them.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use blink_core::{
    EmbedError, Embedding, FaceEmbedder, Frame, GalleryEntry, LandmarkProvider, LandmarkSet,
    ProviderError, Reference,
};

/// Recorded frames with their precomputed landmarks.
///
/// ```json
/// { "frames": [ { "image": "f000.png", "faces": [[{"x": 0.1, "y": 0.2}, ...]] } ] }
/// ```
#[derive(Debug, Deserialize)]
pub struct FrameManifest {
    pub frames: Vec<ManifestFrame>,
}

#[derive(Debug, Deserialize)]
pub struct ManifestFrame {
    /// Image path, relative to the manifest file.
    pub image: PathBuf,
    #[serde(default)]
    pub faces: Vec<LandmarkSet>,
}

impl FrameManifest {
    pub fn load(path: &Path) -> Result<Self> {
        let mut manifest: FrameManifest = read_json(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for frame in &mut manifest.frames {
            if frame.image.is_relative() {
                frame.image = base.join(&frame.image);
            }
        }
        Ok(manifest)
    }
}

#[derive(Debug, Deserialize)]
struct GalleryRecord {
    id: String,
    name: String,
    embedding: Vec<f32>,
}

pub fn load_gallery(path: &Path) -> Result<Vec<GalleryEntry>> {
    let records: Vec<GalleryRecord> = read_json(path)?;
    Ok(records
        .into_iter()
        .map(|r| GalleryEntry {
            identity_id: r.id,
            identity_name: r.name,
            reference: Reference::Embedding(Embedding::new(r.embedding)),
        })
        .collect())
}

pub fn load_embedding(path: &Path) -> Result<Embedding> {
    read_json(path)
}

pub fn load_landmarks(path: &Path) -> Result<LandmarkSet> {
    read_json(path)
}

pub fn load_frame(path: &Path) -> Result<Frame> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Frame::decode(&bytes).with_context(|| format!("failed to decode {}", path.display()))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

/// Replays precomputed landmarks, one queue entry per `detect` call.
pub struct QueuedProvider {
    queue: VecDeque<Vec<LandmarkSet>>,
}

impl QueuedProvider {
    pub fn new(faces: impl IntoIterator<Item = Vec<LandmarkSet>>) -> Self {
        Self {
            queue: faces.into_iter().collect(),
        }
    }
}

impl LandmarkProvider for QueuedProvider {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<LandmarkSet>, ProviderError> {
        self.queue
            .pop_front()
            .ok_or_else(|| ProviderError::Inference("no landmarks recorded for frame".into()))
    }
}

/// Offline runs carry embeddings in JSON; there is no model to run.
pub struct NoEmbedder;

impl FaceEmbedder for NoEmbedder {
    fn embed(&mut self, _frame: &Frame) -> Result<Vec<Embedding>, EmbedError> {
        Err(EmbedError::Unavailable("no embedding model in offline mode".into()))
    }
}
