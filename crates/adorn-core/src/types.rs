use serde::{Deserialize, Serialize};

/// A normalized facial landmark produced by the face-mesh model.
///
/// Coordinates are image-relative in [0, 1]; `z` is depth relative to the
/// face plane, in the same normalized scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Convert to pixel space for a canvas of the given size.
    pub fn to_pixels(&self, width: u32, height: u32) -> Point {
        Point {
            x: self.x * width as f32,
            y: self.y * height as f32,
        }
    }
}

/// A pixel-space point on the overlay canvas.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Point) -> f32 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    /// Exponential blend toward `target`: `self * retain + target * (1 - retain)`.
    pub fn blend(&self, target: &Point, retain: f32) -> Point {
        Point {
            x: self.x * retain + target.x * (1.0 - retain),
            y: self.y * retain + target.y * (1.0 - retain),
        }
    }
}

/// Semantic landmark indices in the 468-point face mesh.
pub mod indices {
    /// Left ear region (tragus).
    pub const LEFT_EAR: usize = 132;
    /// Right ear region (tragus).
    pub const RIGHT_EAR: usize = 361;
    /// Chin center, used as the neck anchor.
    pub const NECK: usize = 152;
    /// Central-face indices (forehead to nose tip) bounding the region
    /// checked for hair/head occlusion.
    pub const OCCLUSION_REGION: [usize; 6] = [10, 151, 9, 197, 195, 4];
}

/// Number of landmarks in a full face-mesh frame.
pub const MESH_LANDMARK_COUNT: usize = 468;

/// Coarse face-shape category derived from the face bounding-box aspect
/// ratio. Biases earring placement only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaceShape {
    Round,
    Oval,
    Long,
}

impl FaceShape {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Round => "round",
            Self::Oval => "oval",
            Self::Long => "long",
        }
    }
}

/// Jewelry category. At most one image per category is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JewelryCategory {
    Earring,
    Necklace,
}

impl JewelryCategory {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Earring => "earring",
            Self::Necklace => "necklace",
        }
    }
}
