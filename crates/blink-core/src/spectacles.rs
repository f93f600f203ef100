//! Heuristic spectacle detection from eye and nose-bridge crops.
//!
//! Four image-statistics signals, each bounded to `[0, 1]`, fused with fixed
//! weights:
//!
//! - **frame structure**: closed contours of rim-like size around each eye,
//!   found on a contrast-equalized crop
//! - **lens pattern**: specular highlights and tinted-lens darkness
//! - **symmetry**: left/right intensity histogram correlation
//! - **bridge**: near-horizontal line segments across the nose bridge
//!
//! The scorer carries no state between frames and is safe to share.

use image::GrayImage;
use imageproc::contours::{find_contours, Contour};
use imageproc::contrast::equalize_histogram;
use imageproc::edges::canny;
use imageproc::hough::{detect_lines, LineDetectionOptions};
use serde::Serialize;

use crate::config::{ConfigError, SpectacleConfig};
use crate::frame::Frame;
use crate::landmarks::{extract_region, indices, GeometryError, LandmarkSet, RegionKind};

const CANNY_LOW: f32 = 30.0;
const CANNY_HIGH: f32 = 100.0;

/// Contour areas (px², on the 96x48 eye canvas) plausible for a rim edge.
const MIN_FRAME_CONTOUR_AREA: f32 = 20.0;
const MAX_FRAME_CONTOUR_AREA: f32 = 5000.0;
/// Contour count at which the frame-structure signal saturates.
const EXPECTED_FRAME_CONTOURS: f32 = 10.0;

/// Gray levels, after equalization, counted as reflection and as lens tint.
const BRIGHT_LEVEL: u8 = 200;
const DARK_LEVEL: u8 = 80;
const BRIGHT_WEIGHT: f32 = 0.4;
const DARK_WEIGHT: f32 = 0.3;

/// Hough accumulator votes needed for a bridge line.
const BRIDGE_LINE_VOTES: u32 = 10;
const BRIDGE_LINE_SUPPRESSION: u32 = 4;
/// Max deviation of a line from horizontal, in degrees.
const HORIZONTAL_TOLERANCE_DEG: u32 = 15;
/// Horizontal line count at which the bridge signal saturates.
const EXPECTED_BRIDGE_LINES: f32 = 3.0;

/// Per-frame spectacle evidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpectacleScore {
    pub detected: bool,
    pub confidence: f32,
    pub frame_score: f32,
    pub lens_score: f32,
    pub symmetry_score: f32,
    pub bridge_score: f32,
}

impl SpectacleScore {
    /// The result reported when the frame cannot be evaluated.
    pub fn undetermined() -> Self {
        Self {
            detected: false,
            confidence: 0.0,
            frame_score: 0.0,
            lens_score: 0.0,
            symmetry_score: 0.0,
            bridge_score: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SpectacleScorer {
    config: SpectacleConfig,
}

impl SpectacleScorer {
    pub fn new(config: SpectacleConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SpectacleConfig {
        &self.config
    }

    /// Score one face, degrading to [`SpectacleScore::undetermined`] when
    /// the crops cannot be taken.
    pub fn score(&self, frame: &Frame, landmarks: &LandmarkSet) -> SpectacleScore {
        match self.evaluate(frame, landmarks) {
            Ok(score) => score,
            Err(e) if e.is_soft() => {
                tracing::debug!(error = %e, "spectacle check skipped");
                SpectacleScore::undetermined()
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "spectacle check failed: landmark set does not match the face mesh"
                );
                SpectacleScore::undetermined()
            }
        }
    }

    /// Score one face, reporting why the crops could not be taken.
    pub fn evaluate(
        &self,
        frame: &Frame,
        landmarks: &LandmarkSet,
    ) -> Result<SpectacleScore, GeometryError> {
        let left = extract_region(frame, landmarks, &indices::LEFT_EYE, RegionKind::Eye)?;
        let right = extract_region(frame, landmarks, &indices::RIGHT_EYE, RegionKind::Eye)?;
        let bridge = extract_region(frame, landmarks, &indices::NOSE_BRIDGE, RegionKind::Bridge)?;

        let left = left.pixels.to_gray();
        let right = right.pixels.to_gray();
        let bridge = bridge.pixels.to_gray();

        let frame_score = (frame_structure_score(&left) + frame_structure_score(&right)) / 2.0;
        let lens_score = (lens_pattern_score(&left) + lens_pattern_score(&right)) / 2.0;
        let symmetry_score = symmetry_score(&left, &right);
        let bridge_score = bridge_score(&bridge);

        let score = self.fuse(frame_score, lens_score, symmetry_score, bridge_score);
        tracing::trace!(
            frame = score.frame_score,
            lens = score.lens_score,
            symmetry = score.symmetry_score,
            bridge = score.bridge_score,
            confidence = score.confidence,
            "spectacle sub-scores"
        );
        Ok(score)
    }

    /// Weighted fusion of the four sub-scores, each clamped to `[0, 1]` first.
    pub fn fuse(&self, frame: f32, lens: f32, symmetry: f32, bridge: f32) -> SpectacleScore {
        let subs = [frame, lens, symmetry, bridge].map(unit);
        let confidence: f32 = subs
            .iter()
            .zip(self.config.weights.iter())
            .map(|(s, w)| s * w)
            .sum();

        SpectacleScore {
            detected: confidence > self.config.threshold,
            confidence,
            frame_score: subs[0],
            lens_score: subs[1],
            symmetry_score: subs[2],
            bridge_score: subs[3],
        }
    }
}

fn unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Contrast is equalized before edge detection so thin or low-contrast rims
/// still clear the Canny thresholds. Global equalization stands in for a
/// tiled (CLAHE) pass, which `imageproc` does not provide.
fn frame_structure_score(gray: &GrayImage) -> f32 {
    rim_contour_score(&canny(&equalize_histogram(gray), CANNY_LOW, CANNY_HIGH))
}

fn rim_contour_score(edges: &GrayImage) -> f32 {
    let contours: Vec<Contour<i32>> = find_contours(edges);
    let rims = contours
        .iter()
        .map(contour_area)
        .filter(|&area| area > MIN_FRAME_CONTOUR_AREA && area < MAX_FRAME_CONTOUR_AREA)
        .count();
    (rims as f32 / EXPECTED_FRAME_CONTOURS).min(1.0)
}

/// Shoelace area of the polygon through the contour points.
fn contour_area(contour: &Contour<i32>) -> f32 {
    let points = &contour.points;
    if points.len() < 3 {
        return 0.0;
    }
    let twice_area: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| i64::from(a.x) * i64::from(b.y) - i64::from(b.x) * i64::from(a.y))
        .sum();
    twice_area.abs() as f32 / 2.0
}

fn lens_pattern_score(gray: &GrayImage) -> f32 {
    let equalized = equalize_histogram(gray);
    let total = equalized.as_raw().len() as f32;
    let (bright, dark) = equalized
        .as_raw()
        .iter()
        .fold((0usize, 0usize), |(bright, dark), &v| {
            (
                bright + usize::from(v > BRIGHT_LEVEL),
                dark + usize::from(v < DARK_LEVEL),
            )
        });
    let bright_ratio = bright as f32 / total;
    let dark_ratio = dark as f32 / total;
    (bright_ratio * BRIGHT_WEIGHT + dark_ratio * DARK_WEIGHT).min(1.0)
}

fn histogram(gray: &GrayImage) -> [f64; 256] {
    let mut bins = [0.0f64; 256];
    for &v in gray.as_raw() {
        bins[usize::from(v)] += 1.0;
    }
    bins
}

/// Pearson correlation of the two 256-bin histograms, floored at zero.
fn symmetry_score(left: &GrayImage, right: &GrayImage) -> f32 {
    let a = histogram(left);
    let b = histogram(right);
    let mean_a = a.iter().sum::<f64>() / 256.0;
    let mean_b = b.iter().sum::<f64>() / 256.0;

    let (mut cov, mut var_a, mut var_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b.iter()) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }

    let denom = (var_a * var_b).sqrt();
    if denom <= f64::EPSILON {
        // Flat histograms: only identical ones correlate.
        return if a == b { 1.0 } else { 0.0 };
    }
    unit((cov / denom) as f32)
}

fn bridge_score(gray: &GrayImage) -> f32 {
    horizontal_line_score(&canny(gray, CANNY_LOW, CANNY_HIGH))
}

fn horizontal_line_score(edges: &GrayImage) -> f32 {
    let options = LineDetectionOptions {
        vote_threshold: BRIDGE_LINE_VOTES,
        suppression_radius: BRIDGE_LINE_SUPPRESSION,
    };
    // A horizontal line has a vertical normal: 90 degrees.
    let horizontal = detect_lines(edges, options)
        .iter()
        .filter(|line| line.angle_in_degrees.abs_diff(90) <= HORIZONTAL_TOLERANCE_DEG)
        .count();
    (horizontal as f32 / EXPECTED_BRIDGE_LINES).min(1.0)
}
