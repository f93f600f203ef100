//! Landmark geometry: eye aspect ratio and landmark-anchored crops.
//!
//! Landmarks are normalized `[0, 1]` image coordinates in the 468/478-point
//! face mesh layout. Only the indices in [`indices`] are read by position.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::frame::Frame;

/// Face mesh indices this crate depends on.
pub mod indices {
    /// Left eye, ordered outer corner, upper lid x2, inner corner, lower lid x2.
    pub const LEFT_EYE: [usize; 6] = [33, 160, 158, 133, 153, 144];
    /// Right eye, same ordering as [`LEFT_EYE`].
    pub const RIGHT_EYE: [usize; 6] = [362, 385, 387, 263, 373, 380];
    /// Nose bridge between the eyes, where a spectacle bridge sits.
    pub const NOSE_BRIDGE: [usize; 2] = [168, 197];
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("degenerate eye geometry: corner-to-corner distance is zero")]
    DegenerateGeometry,
    #[error("crop region is empty after clamping to the frame")]
    EmptyRegion,
    #[error("landmark index {index} out of range for a set of {len} points")]
    LandmarkOutOfRange { index: usize, len: usize },
}

impl GeometryError {
    /// Expected per-frame conditions, as opposed to a provider that broke
    /// its indexing contract.
    pub fn is_soft(&self) -> bool {
        !matches!(self, GeometryError::LandmarkOutOfRange { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// All landmarks of one detected face in one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkSet {
    points: Vec<Point>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn point(&self, index: usize) -> Result<Point, GeometryError> {
        self.points
            .get(index)
            .copied()
            .ok_or(GeometryError::LandmarkOutOfRange {
                index,
                len: self.points.len(),
            })
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Mean EAR of both eyes.
    pub fn mean_ear(&self) -> Result<f32, GeometryError> {
        let left = eye_aspect_ratio(self, &indices::LEFT_EYE)?;
        let right = eye_aspect_ratio(self, &indices::RIGHT_EYE)?;
        Ok((left + right) / 2.0)
    }
}

/// Eye aspect ratio: `(|p1 - p5| + |p2 - p4|) / (2 |p0 - p3|)`.
///
/// `eye` lists, in order, the outer corner, two upper-lid points, the inner
/// corner and two lower-lid points. Open eyes sit around 0.3 to 0.4 and a
/// closed eye drops towards zero.
pub fn eye_aspect_ratio(landmarks: &LandmarkSet, eye: &[usize; 6]) -> Result<f32, GeometryError> {
    let p = |i: usize| landmarks.point(eye[i]);

    let a = p(1)?.distance(&p(5)?);
    let b = p(2)?.distance(&p(4)?);
    let c = p(0)?.distance(&p(3)?);

    if c == 0.0 || !c.is_finite() {
        return Err(GeometryError::DegenerateGeometry);
    }

    Ok((a + b) / (2.0 * c))
}

/// Pixel rectangle `[x_min, x_max) x [y_min, y_max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x_min: u32,
    pub y_min: u32,
    pub x_max: u32,
    pub y_max: u32,
}

impl BoundingBox {
    pub fn width(&self) -> u32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> u32 {
        self.y_max - self.y_min
    }
}

/// Eye crops: margin around the six eye points wide enough to take in a
/// spectacle rim, then resized to a fixed canvas.
pub const EYE_MARGIN_X: i64 = 30;
pub const EYE_MARGIN_Y: i64 = 25;
pub const EYE_CROP_WIDTH: u32 = 96;
pub const EYE_CROP_HEIGHT: u32 = 48;

/// Nose bridge crops.
pub const BRIDGE_MARGIN_X: i64 = 20;
pub const BRIDGE_MARGIN_Y: i64 = 15;
pub const BRIDGE_CROP_WIDTH: u32 = 60;
pub const BRIDGE_CROP_HEIGHT: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    Eye,
    Bridge,
}

impl RegionKind {
    fn margins(self) -> (i64, i64) {
        match self {
            RegionKind::Eye => (EYE_MARGIN_X, EYE_MARGIN_Y),
            RegionKind::Bridge => (BRIDGE_MARGIN_X, BRIDGE_MARGIN_Y),
        }
    }

    fn canonical_size(self) -> (u32, u32) {
        match self {
            RegionKind::Eye => (EYE_CROP_WIDTH, EYE_CROP_HEIGHT),
            RegionKind::Bridge => (BRIDGE_CROP_WIDTH, BRIDGE_CROP_HEIGHT),
        }
    }
}

/// A canonical-size crop and where it came from in the source frame.
#[derive(Debug, Clone)]
pub struct Region {
    pub kind: RegionKind,
    pub bbox: BoundingBox,
    pub pixels: Frame,
}

/// Crop the region spanned by `subset`, widened by the margin for `kind`,
/// clamped to the frame and resized to the canonical size for `kind`.
pub fn extract_region(
    frame: &Frame,
    landmarks: &LandmarkSet,
    subset: &[usize],
    kind: RegionKind,
) -> Result<Region, GeometryError> {
    let bbox = region_bounds(frame.width(), frame.height(), landmarks, subset, kind)?;
    let (width, height) = kind.canonical_size();
    Ok(Region {
        kind,
        bbox,
        pixels: frame.crop_resized(bbox, width, height),
    })
}

fn region_bounds(
    width: u32,
    height: u32,
    landmarks: &LandmarkSet,
    subset: &[usize],
    kind: RegionKind,
) -> Result<BoundingBox, GeometryError> {
    let (w, h) = (i64::from(width), i64::from(height));
    let mut xs = Vec::with_capacity(subset.len());
    let mut ys = Vec::with_capacity(subset.len());
    for &index in subset {
        let point = landmarks.point(index)?;
        let (px, py) = (point.x * width as f32, point.y * height as f32);
        if !px.is_finite() || !py.is_finite() {
            return Err(GeometryError::EmptyRegion);
        }
        // Truncation toward zero, as pixel indices.
        xs.push(px as i64);
        ys.push(py as i64);
    }

    let (Some(&x_lo), Some(&x_hi)) = (xs.iter().min(), xs.iter().max()) else {
        return Err(GeometryError::EmptyRegion);
    };
    let (Some(&y_lo), Some(&y_hi)) = (ys.iter().min(), ys.iter().max()) else {
        return Err(GeometryError::EmptyRegion);
    };

    let (mx, my) = kind.margins();
    let x_min = x_lo.saturating_sub(mx).clamp(0, w);
    let x_max = x_hi.saturating_add(mx).clamp(0, w);
    let y_min = y_lo.saturating_sub(my).clamp(0, h);
    let y_max = y_hi.saturating_add(my).clamp(0, h);

    if x_max <= x_min || y_max <= y_min {
        return Err(GeometryError::EmptyRegion);
    }

    Ok(BoundingBox {
        x_min: x_min as u32,
        y_min: y_min as u32,
        x_max: x_max as u32,
        y_max: y_max as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MESH_POINTS: usize = 468;

    /// A face mesh with both eyes centred on `(0.375, 0.375)` / `(0.625, 0.375)`,
    /// eye width 0.125 and lid gaps set so that EAR equals `ear`.
    fn face_with_ear(ear: f32) -> LandmarkSet {
        let mut points = vec![Point::new(0.5, 0.5); MESH_POINTS];
        place_eye(&mut points, &indices::LEFT_EYE, (0.375, 0.375), 0.125, ear);
        place_eye(&mut points, &indices::RIGHT_EYE, (0.625, 0.375), 0.125, ear);
        LandmarkSet::new(points)
    }

    fn place_eye(points: &mut [Point], eye: &[usize; 6], centre: (f32, f32), width: f32, ear: f32) {
        let (cx, cy) = centre;
        let gap = ear * width;
        points[eye[0]] = Point::new(cx - width / 2.0, cy);
        points[eye[1]] = Point::new(cx - width / 6.0, cy - gap / 2.0);
        points[eye[2]] = Point::new(cx + width / 6.0, cy - gap / 2.0);
        points[eye[3]] = Point::new(cx + width / 2.0, cy);
        points[eye[4]] = Point::new(cx + width / 6.0, cy + gap / 2.0);
        points[eye[5]] = Point::new(cx - width / 6.0, cy + gap / 2.0);
    }

    fn black_frame(width: u32, height: u32) -> Frame {
        Frame::from_bgr(width, height, vec![0; (width * height * 3) as usize]).unwrap()
    }

    #[test]
    fn test_ear_known_geometry() {
        let face = face_with_ear(0.3);
        let ear = eye_aspect_ratio(&face, &indices::LEFT_EYE).unwrap();
        assert!((ear - 0.3).abs() < 1e-5);
        assert!((face.mean_ear().unwrap() - 0.3).abs() < 1e-5);
    }

    #[test]
    fn test_ear_invariant_under_mirroring() {
        let face = face_with_ear(0.27);
        let original = eye_aspect_ratio(&face, &indices::LEFT_EYE).unwrap();

        let flip_h = LandmarkSet::new(
            face.points()
                .iter()
                .map(|p| Point::new(1.0 - p.x, p.y))
                .collect(),
        );
        let flip_v = LandmarkSet::new(
            face.points()
                .iter()
                .map(|p| Point::new(p.x, 1.0 - p.y))
                .collect(),
        );

        let h = eye_aspect_ratio(&flip_h, &indices::LEFT_EYE).unwrap();
        let v = eye_aspect_ratio(&flip_v, &indices::LEFT_EYE).unwrap();
        assert!((original - h).abs() < 1e-5);
        assert!((original - v).abs() < 1e-5);
    }

    #[test]
    fn test_open_pattern_above_open_threshold() {
        // Lid gaps at 0.4x the eye width: comfortably open.
        let face = face_with_ear(0.4);
        assert!(face.mean_ear().unwrap() > 0.37);
    }

    #[test]
    fn test_collapsed_eye_is_degenerate() {
        let mut points = vec![Point::new(0.5, 0.5); MESH_POINTS];
        points[indices::LEFT_EYE[1]] = Point::new(0.5, 0.48);
        let face = LandmarkSet::new(points);
        assert_eq!(
            eye_aspect_ratio(&face, &indices::LEFT_EYE),
            Err(GeometryError::DegenerateGeometry)
        );
    }

    #[test]
    fn test_short_landmark_set_reports_index() {
        let face = LandmarkSet::new(vec![Point::new(0.1, 0.1); 100]);
        let err = eye_aspect_ratio(&face, &indices::LEFT_EYE).unwrap_err();
        assert_eq!(
            err,
            GeometryError::LandmarkOutOfRange {
                index: 160,
                len: 100
            }
        );
        assert!(!err.is_soft());
        assert!(GeometryError::EmptyRegion.is_soft());
    }

    #[test]
    fn test_eye_region_canonical_size() {
        let frame = black_frame(640, 480);
        let face = face_with_ear(0.3);
        let region = extract_region(&frame, &face, &indices::LEFT_EYE, RegionKind::Eye).unwrap();
        assert_eq!(region.pixels.width(), EYE_CROP_WIDTH);
        assert_eq!(region.pixels.height(), EYE_CROP_HEIGHT);
        // Eye corners sit at x = 200 and x = 280 before the 30 px margin.
        assert_eq!(region.bbox.x_min, 170);
        assert_eq!(region.bbox.x_max, 310);
    }

    #[test]
    fn test_bridge_region_canonical_size() {
        let frame = black_frame(640, 480);
        let face = face_with_ear(0.3);
        let region =
            extract_region(&frame, &face, &indices::NOSE_BRIDGE, RegionKind::Bridge).unwrap();
        assert_eq!(region.pixels.width(), BRIDGE_CROP_WIDTH);
        assert_eq!(region.pixels.height(), BRIDGE_CROP_HEIGHT);
        assert_eq!(region.bbox.width(), 40);
        assert_eq!(region.bbox.height(), 30);
    }

    #[test]
    fn test_region_clamped_at_frame_edge() {
        let frame = black_frame(200, 100);
        let mut points = vec![Point::new(0.0, 0.0); MESH_POINTS];
        for &i in &indices::LEFT_EYE {
            points[i] = Point::new(0.015625, 0.03125);
        }
        let face = LandmarkSet::new(points);
        let region = extract_region(&frame, &face, &indices::LEFT_EYE, RegionKind::Eye).unwrap();
        assert_eq!(region.bbox.x_min, 0);
        assert_eq!(region.bbox.y_min, 0);
        assert_eq!(region.bbox.x_max, 33);
        assert_eq!(region.bbox.y_max, 28);
    }

    #[test]
    fn test_region_outside_frame_is_empty() {
        let frame = black_frame(640, 480);
        for offset in [-0.5_f32, 1.5] {
            let face = LandmarkSet::new(vec![Point::new(offset, offset); MESH_POINTS]);
            let result = extract_region(&frame, &face, &indices::LEFT_EYE, RegionKind::Eye);
            assert!(matches!(result, Err(GeometryError::EmptyRegion)));
        }
    }

    #[test]
    fn test_far_out_landmarks_are_empty_region() {
        let frame = black_frame(640, 480);
        for offset in [1e30_f32, -1e30, f32::MAX, f32::MIN] {
            let face = LandmarkSet::new(vec![Point::new(offset, offset); MESH_POINTS]);
            for (subset, kind) in [
                (&indices::LEFT_EYE[..], RegionKind::Eye),
                (&indices::NOSE_BRIDGE[..], RegionKind::Bridge),
            ] {
                let result = extract_region(&frame, &face, subset, kind);
                assert!(matches!(result, Err(GeometryError::EmptyRegion)));
            }
        }
    }

    #[test]
    fn test_huge_but_in_range_product_is_clamped() {
        // 1e9 scales to a finite pixel index far past the frame edge.
        let frame = black_frame(64, 64);
        let mut points = vec![Point::new(0.5, 0.5); MESH_POINTS];
        points[indices::NOSE_BRIDGE[1]] = Point::new(1e9, 0.5);
        let face = LandmarkSet::new(points);
        let region =
            extract_region(&frame, &face, &indices::NOSE_BRIDGE, RegionKind::Bridge).unwrap();
        assert_eq!(region.bbox.x_max, 64);
        assert_eq!(region.bbox.x_min, 12);
    }

    #[test]
    fn test_non_finite_landmark_is_empty_region() {
        let frame = black_frame(64, 64);
        let face = LandmarkSet::new(vec![Point::new(f32::NAN, 0.5); MESH_POINTS]);
        let result = extract_region(&frame, &face, &indices::NOSE_BRIDGE, RegionKind::Bridge);
        assert!(matches!(result, Err(GeometryError::EmptyRegion)));
    }

    #[test]
    fn test_landmarks_deserialize_from_points() {
        let json = r#"[{"x": 0.1, "y": 0.2}, {"x": 0.3, "y": 0.4, "z": -0.01}]"#;
        let set: LandmarkSet = serde_json::from_str(json).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.point(1).unwrap(), Point::new(0.3, 0.4));
    }
}
