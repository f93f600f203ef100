//! Face matching by Euclidean embedding distance.
//!
//! Distances below the match threshold (0.6 by default) are the same person.
//! The engine always answers with a [`MatchResult`]; failures are carried in
//! its `error` field so callers have one code path.

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, MatchConfig};
use crate::frame::{EncodedFrame, Frame};
use crate::provider::FaceEmbedder;

pub const NO_VALID_REFERENCES: &str = "no valid reference faces found in gallery";

/// Fixed-length face descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance, or `None` when the dimensions differ or a
    /// component is not finite.
    pub fn distance(&self, other: &Embedding) -> Option<f32> {
        if self.dim() != other.dim() || self.values.is_empty() {
            return None;
        }
        let sum: f32 = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum();
        let distance = sum.sqrt();
        distance.is_finite().then_some(distance)
    }
}

/// What a gallery entry is compared by.
#[derive(Debug, Clone)]
pub enum Reference {
    /// Precomputed by the identity store.
    Embedding(Embedding),
    /// Enrollment photo, embedded on every call.
    Image(Frame),
    /// Enrollment photo as uploaded; skipped if it does not decode.
    Encoded(EncodedFrame),
}

/// One known identity. The gallery is read-only to the engine.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub identity_id: String,
    pub identity_name: String,
    pub reference: Reference,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub matched: bool,
    pub identity_id: Option<String>,
    pub identity_name: Option<String>,
    /// `1 - distance` clamped to `[0, 1]`, rounded to four decimals.
    pub confidence: f32,
    /// Distance to the closest valid reference, when one was found.
    pub distance: Option<f32>,
    pub error: Option<String>,
}

impl MatchResult {
    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            matched: false,
            identity_id: None,
            identity_name: None,
            confidence: 0.0,
            distance: None,
            error: Some(reason.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FaceMatchEngine {
    config: MatchConfig,
}

impl FaceMatchEngine {
    pub fn new(config: MatchConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn threshold(&self) -> f32 {
        self.config.threshold
    }

    /// Identify the single face in `captured` against `gallery`.
    pub fn identify<E>(
        &self,
        embedder: &mut E,
        captured: &Frame,
        gallery: &[GalleryEntry],
    ) -> MatchResult
    where
        E: FaceEmbedder + ?Sized,
    {
        match single_embedding(embedder, captured, "captured image") {
            Ok(probe) => self.identify_embedding(embedder, &probe, gallery),
            Err(reason) => MatchResult::failure(reason),
        }
    }

    /// Identify a precomputed probe embedding against `gallery`.
    ///
    /// Entries whose reference yields no usable embedding are skipped.
    pub fn identify_embedding<E>(
        &self,
        embedder: &mut E,
        probe: &Embedding,
        gallery: &[GalleryEntry],
    ) -> MatchResult
    where
        E: FaceEmbedder + ?Sized,
    {
        let mut best: Option<(f32, &GalleryEntry)> = None;

        for entry in gallery {
            let reference = match &entry.reference {
                Reference::Embedding(embedding) => embedding.clone(),
                Reference::Image(frame) => {
                    match single_embedding(embedder, frame, "reference image") {
                        Ok(embedding) => embedding,
                        Err(reason) => {
                            tracing::debug!(
                                identity = %entry.identity_id,
                                reason = %reason,
                                "skipping gallery entry"
                            );
                            continue;
                        }
                    }
                }
                Reference::Encoded(encoded) => {
                    let embedded = encoded
                        .decode()
                        .map_err(|e| format!("failed to decode reference frame: {e}"))
                        .and_then(|frame| single_embedding(embedder, &frame, "reference image"));
                    match embedded {
                        Ok(embedding) => embedding,
                        Err(reason) => {
                            tracing::debug!(
                                identity = %entry.identity_id,
                                reason = %reason,
                                "skipping gallery entry"
                            );
                            continue;
                        }
                    }
                }
            };

            let Some(distance) = probe.distance(&reference) else {
                tracing::warn!(
                    identity = %entry.identity_id,
                    probe_dim = probe.dim(),
                    reference_dim = reference.dim(),
                    "skipping gallery entry: embedding not comparable"
                );
                continue;
            };

            if best.map_or(true, |(d, _)| distance < d) {
                best = Some((distance, entry));
            }
        }

        let Some((distance, entry)) = best else {
            return MatchResult::failure(NO_VALID_REFERENCES);
        };

        let result = self.decide(distance, Some(entry));
        tracing::debug!(
            distance,
            matched = result.matched,
            identity = %entry.identity_id,
            "gallery match evaluated"
        );
        result
    }

    /// One-to-one comparison of two images.
    pub fn compare<E>(&self, embedder: &mut E, captured: &Frame, reference: &Frame) -> MatchResult
    where
        E: FaceEmbedder + ?Sized,
    {
        let probe = match single_embedding(embedder, captured, "captured image") {
            Ok(e) => e,
            Err(reason) => return MatchResult::failure(reason),
        };
        let reference = match single_embedding(embedder, reference, "reference image") {
            Ok(e) => e,
            Err(reason) => return MatchResult::failure(reason),
        };
        self.compare_embeddings(&probe, &reference)
    }

    /// [`identify`](Self::identify) for an uploaded capture.
    pub fn identify_encoded<E>(
        &self,
        embedder: &mut E,
        captured: &EncodedFrame,
        gallery: &[GalleryEntry],
    ) -> MatchResult
    where
        E: FaceEmbedder + ?Sized,
    {
        match captured.decode() {
            Ok(frame) => self.identify(embedder, &frame, gallery),
            Err(e) => MatchResult::failure(format!("failed to decode captured frame: {e}")),
        }
    }

    /// [`compare`](Self::compare) for two uploaded images.
    pub fn compare_encoded<E>(
        &self,
        embedder: &mut E,
        captured: &EncodedFrame,
        reference: &EncodedFrame,
    ) -> MatchResult
    where
        E: FaceEmbedder + ?Sized,
    {
        let captured = match captured.decode() {
            Ok(frame) => frame,
            Err(e) => return MatchResult::failure(format!("failed to decode captured frame: {e}")),
        };
        let reference = match reference.decode() {
            Ok(frame) => frame,
            Err(e) => return MatchResult::failure(format!("failed to decode reference frame: {e}")),
        };
        self.compare(embedder, &captured, &reference)
    }

    /// One-to-one comparison of two embeddings.
    pub fn compare_embeddings(&self, probe: &Embedding, reference: &Embedding) -> MatchResult {
        match probe.distance(reference) {
            Some(distance) => self.decide(distance, None),
            None => MatchResult::failure(format!(
                "embedding dimensions differ: {} vs {}",
                probe.dim(),
                reference.dim()
            )),
        }
    }

    fn decide(&self, distance: f32, entry: Option<&GalleryEntry>) -> MatchResult {
        let matched = distance < self.config.threshold;
        let confidence = round4((1.0 - distance).clamp(0.0, 1.0));
        let (identity_id, identity_name) = match entry {
            Some(e) if matched => (Some(e.identity_id.clone()), Some(e.identity_name.clone())),
            _ => (None, None),
        };
        MatchResult {
            matched,
            identity_id,
            identity_name,
            confidence,
            distance: Some(distance),
            error: None,
        }
    }
}

/// Embed `frame`, requiring exactly one face.
fn single_embedding<E>(embedder: &mut E, frame: &Frame, what: &str) -> Result<Embedding, String>
where
    E: FaceEmbedder + ?Sized,
{
    let mut faces = embedder
        .embed(frame)
        .map_err(|e| format!("failed to embed {what}: {e}"))?;
    match faces.len() {
        0 => Err(format!("no face detected in {what}")),
        1 => Ok(faces.remove(0)),
        n => Err(format!("{n} faces detected in {what}, expected exactly one")),
    }
}

fn round4(value: f32) -> f32 {
    (value * 10_000.0).round() / 10_000.0
}
