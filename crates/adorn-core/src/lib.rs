//! adorn-core — Landmark-driven overlay placement for virtual jewelry try-on.
//!
//! Smooths raw face-mesh landmarks, derives ear/neck anchors and a coarse
//! face shape, estimates head tilt, and composites earring/necklace sprites
//! (plus a watermark and best-effort hair occlusion) onto RGBA frames.
//! Face-mesh and person-segmentation models run via ONNX Runtime.

pub mod angle;
pub mod assets;
pub mod geometry;
pub mod mesh;
pub mod occlusion;
pub mod params;
pub mod render;
pub mod segment;
pub mod session;
pub mod smoothing;
pub mod types;

pub use assets::{ActiveAssets, AssetError, JewelryAsset, LoadTicket};
pub use mesh::{FaceMesher, MesherError};
pub use params::TryOnParams;
pub use segment::{SegmentationMask, Segmenter, SegmenterError};
pub use session::TryOnSession;
pub use types::{FaceShape, JewelryCategory, Landmark};

use std::path::PathBuf;

/// Default directory for the ONNX model files.
pub fn default_model_dir() -> PathBuf {
    PathBuf::from("/usr/share/adorn/models")
}
