//! Frame classification and decision logic for blink-gated face capture.
//!
//! Everything here is synchronous and deterministic: the landmark model and
//! the embedding model are external collaborators reached through the
//! traits in [`provider`], and pixels arrive as BGR [`Frame`]s.

pub mod blink;
pub mod config;
pub mod frame;
pub mod landmarks;
pub mod matcher;
pub mod provider;
pub mod spectacles;

pub use blink::{
    BlinkDetector, BlinkPhase, BlinkSessionState, CaptureEvent, CaptureKind, Classification,
    Observation, Step, StepOutcome,
};
pub use config::{BlinkConfig, CaptureMode, ConfigError, MatchConfig, SpectacleConfig};
pub use frame::{EncodedFrame, Frame, FrameError};
pub use landmarks::{
    eye_aspect_ratio, extract_region, BoundingBox, GeometryError, LandmarkSet, Point, Region,
    RegionKind,
};
pub use matcher::{Embedding, FaceMatchEngine, GalleryEntry, MatchResult, Reference};
pub use provider::{EmbedError, FaceEmbedder, LandmarkProvider, ProviderError};
pub use spectacles::{SpectacleScore, SpectacleScorer};
