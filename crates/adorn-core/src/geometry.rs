//! Anchor extraction and face-shape classification.
//!
//! Converts a smoothed landmark frame into the pixel-space quantities the
//! renderer consumes: ear/neck anchor points, inter-ear distance, the face
//! bounding box, and a coarse shape category derived from its aspect ratio.

use crate::types::{indices, FaceShape, Landmark, Point};

/// Aspect ratios below this classify as round.
const ROUND_ASPECT_MAX: f32 = 1.05;
/// Aspect ratios above this classify as long.
const LONG_ASPECT_MIN: f32 = 1.25;

/// Pixel-space anchors and aggregate measures for one frame.
#[derive(Debug, Clone)]
pub struct FaceAnchors {
    pub left_ear: Point,
    pub right_ear: Point,
    pub neck: Point,
    /// Raw (unsmoothed) inter-ear distance in pixels.
    pub ear_dist: f32,
    /// Face bounding-box width in pixels.
    pub face_width: f32,
    /// Face bounding-box height in pixels.
    pub face_height: f32,
    /// height / width, with a 1 px floor on the denominator.
    pub aspect: f32,
    pub shape: FaceShape,
}

/// Extract anchors from a smoothed landmark frame.
///
/// Returns `None` if the frame is too short to contain the semantic ear and
/// neck indices; a malformed frame must never index out of bounds.
pub fn extract_anchors(landmarks: &[Landmark], width: u32, height: u32) -> Option<FaceAnchors> {
    let left = landmarks.get(indices::LEFT_EAR)?.to_pixels(width, height);
    let right = landmarks.get(indices::RIGHT_EAR)?.to_pixels(width, height);
    let neck = landmarks.get(indices::NECK)?.to_pixels(width, height);

    let (mut min_x, mut min_y, mut max_x, mut max_y) = (f32::MAX, f32::MAX, f32::MIN, f32::MIN);
    for lm in landmarks {
        min_x = min_x.min(lm.x);
        min_y = min_y.min(lm.y);
        max_x = max_x.max(lm.x);
        max_y = max_y.max(lm.y);
    }

    let face_width = (max_x - min_x) * width as f32;
    let face_height = (max_y - min_y) * height as f32;
    // Degenerate detections (all landmarks collapsed) must not divide by zero.
    let aspect = face_height / face_width.max(1.0);

    Some(FaceAnchors {
        left_ear: left,
        right_ear: right,
        neck,
        ear_dist: left.distance(&right),
        face_width,
        face_height,
        aspect,
        shape: classify_shape(aspect),
    })
}

/// Classify the bounding-box aspect ratio (height / width) into a shape.
///
/// Comparisons are exclusive: an aspect of exactly 1.05 or 1.25 is oval.
pub fn classify_shape(aspect: f32) -> FaceShape {
    if aspect < ROUND_ASPECT_MAX {
        FaceShape::Round
    } else if aspect > LONG_ASPECT_MIN {
        FaceShape::Long
    } else {
        FaceShape::Oval
    }
}

/// Earring placement bias for a face shape.
///
/// Offsets are fractions of the face bounding box (applied laterally and
/// vertically); the multiplier scales the earring size. Rounder faces get a
/// larger lateral offset so the earring clears the cheek.
#[derive(Debug, Clone, Copy)]
pub struct ShapeBias {
    pub x_frac: f32,
    pub y_frac: f32,
    pub size_mult: f32,
}

impl ShapeBias {
    pub fn for_shape(shape: FaceShape) -> Self {
        match shape {
            FaceShape::Round => Self { x_frac: 0.06, y_frac: 0.02, size_mult: 1.10 },
            FaceShape::Oval => Self { x_frac: 0.045, y_frac: 0.015, size_mult: 1.00 },
            FaceShape::Long => Self { x_frac: 0.04, y_frac: 0.005, size_mult: 0.95 },
        }
    }

    /// Pixel offsets for a face bounding box, rounded like the original tuning.
    pub fn offsets_px(&self, face_width: f32, face_height: f32) -> (f32, f32) {
        (
            (face_width * self.x_frac).round(),
            (face_height * self.y_frac).round(),
        )
    }
}
