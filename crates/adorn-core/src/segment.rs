//! Person segmentation via ONNX Runtime.
//!
//! Wraps a selfie-segmentation model producing a binary person/background
//! mask at the model's own resolution. Segmentation is best-effort and
//! throttled: the mask may be a frame or two stale relative to the overlay,
//! which the occlusion compositor accepts.

use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::time::{Duration, Instant};
use thiserror::Error;

// --- Named constants ---
const SEG_INPUT_SIZE: usize = 256;
/// Probability above which a pixel is labeled person.
const SEG_PERSON_THRESHOLD: f32 = 0.7;
/// Minimum interval between segmentation runs.
pub const SEG_MIN_INTERVAL: Duration = Duration::from_millis(300);

#[derive(Error, Debug)]
pub enum SegmenterError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Dense binary person mask at the model's native resolution.
///
/// Lookup rescales display coordinates into mask space, so the mask
/// resolution is independent of the canvas.
#[derive(Debug, Clone)]
pub struct SegmentationMask {
    /// Row-major labels: 1 = person, 0 = background.
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl SegmentationMask {
    /// Whether the canvas pixel (x, y) on a `canvas_w` × `canvas_h` surface
    /// maps to a person-labeled mask cell. Out-of-range lookups are false.
    pub fn is_person(&self, x: u32, y: u32, canvas_w: u32, canvas_h: u32) -> bool {
        if canvas_w == 0 || canvas_h == 0 || self.width == 0 || self.height == 0 {
            return false;
        }
        let mx = (x as u64 * self.width as u64 / canvas_w as u64) as u32;
        let my = (y as u64 * self.height as u64 / canvas_h as u64) as u32;
        if mx >= self.width || my >= self.height {
            return false;
        }
        self.data
            .get((my * self.width + mx) as usize)
            .is_some_and(|&v| v == 1)
    }
}

/// Timestamp-based throttle guard for segmentation runs.
///
/// There is no background lane for this workload; a run is simply skipped
/// when the interval has not elapsed.
pub struct SegThrottle {
    min_interval: Duration,
    last_run: Option<Instant>,
}

impl SegThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_run: None,
        }
    }

    /// True if enough time has passed since the last accepted run; records
    /// the run when it returns true.
    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last_run {
            Some(last) if now.duration_since(last) < self.min_interval => false,
            _ => {
                self.last_run = Some(now);
                true
            }
        }
    }
}

impl Default for SegThrottle {
    fn default() -> Self {
        Self::new(SEG_MIN_INTERVAL)
    }
}

/// Selfie-segmentation model wrapper.
pub struct Segmenter {
    session: Session,
    input_size: usize,
}

impl Segmenter {
    /// Load the segmentation ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, SegmenterError> {
        if !Path::new(model_path).exists() {
            return Err(SegmenterError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
            "loaded segmentation model"
        );

        Ok(Self {
            session,
            input_size: SEG_INPUT_SIZE,
        })
    }

    /// Segment an RGB frame, returning a binary person mask at the model's
    /// native resolution.
    pub fn segment(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<SegmentationMask, SegmenterError> {
        validate_frame(rgb, width, height)?;

        let input = self.preprocess(rgb, width as usize, height as usize);
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, probs) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| SegmenterError::InferenceFailed(format!("mask output: {e}")))?;

        let side = self.input_size;
        if probs.len() < side * side {
            return Err(SegmenterError::InferenceFailed(format!(
                "mask output too short: expected {}, got {}",
                side * side,
                probs.len()
            )));
        }

        let data = probs[..side * side]
            .iter()
            .map(|&p| u8::from(p > SEG_PERSON_THRESHOLD))
            .collect();

        Ok(SegmentationMask {
            data,
            width: side as u32,
            height: side as u32,
        })
    }

    /// Resize the RGB frame to the square model input (NHWC, 0–1 floats).
    /// Nearest-neighbor is enough here: the mask is coarse by design.
    /// Caller validates dimensions; a zero side would underflow the clamps.
    fn preprocess(&self, rgb: &[u8], width: usize, height: usize) -> Array4<f32> {
        let side = self.input_size;
        let mut tensor = Array4::<f32>::zeros((1, side, side, 3));

        for y in 0..side {
            let src_y = (y * height / side).min(height - 1);
            for x in 0..side {
                let src_x = (x * width / side).min(width - 1);
                let off = (src_y * width + src_x) * 3;
                for c in 0..3 {
                    tensor[[0, y, x, c]] = rgb[off + c] as f32 / 255.0;
                }
            }
        }

        tensor
    }
}

/// Reject frames whose dimensions or buffer cannot hold `width * height`
/// RGB pixels before any preprocessing touches them.
fn validate_frame(rgb: &[u8], width: u32, height: u32) -> Result<(), SegmenterError> {
    let expected = width as usize * height as usize * 3;
    if width == 0 || height == 0 || rgb.len() < expected {
        return Err(SegmenterError::InferenceFailed(format!(
            "bad frame: {width}x{height}, expected {expected} bytes, got {}",
            rgb.len()
        )));
    }
    Ok(())
}
