//! Face-mesh landmark detection via ONNX Runtime.
//!
//! Wraps a MediaPipe-style face landmark model: 468 3D points regressed in
//! input-pixel coordinates plus a face-presence score. Frames are letterboxed
//! into the square model input; landmarks are de-mapped back into normalized
//! frame coordinates so the rest of the pipeline stays resolution-agnostic.

use crate::types::{Landmark, MESH_LANDMARK_COUNT};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Named constants ---
const MESH_INPUT_SIZE: usize = 192;
/// Face-presence score (after sigmoid) below which a frame counts as no
/// detection.
const MESH_MIN_FACE_SCORE: f32 = 0.5;
/// Floats per landmark frame: 468 points × (x, y, z).
const MESH_OUTPUT_LEN: usize = MESH_LANDMARK_COUNT * 3;

#[derive(Error, Debug)]
pub enum MesherError {
    #[error("model file not found: {0} — place the face mesh ONNX model there")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Metadata for coordinate de-mapping after letterbox resize.
struct LetterboxInfo {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// Face landmark predictor.
pub struct FaceMesher {
    session: Session,
    input_size: usize,
    /// Output tensor indices (landmarks, score), discovered by length at
    /// load time.
    landmarks_idx: usize,
    score_idx: usize,
}

impl FaceMesher {
    /// Load the face-mesh ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, MesherError> {
        if !Path::new(model_path).exists() {
            return Err(MesherError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();
        tracing::info!(
            path = model_path,
            outputs = ?output_names,
            "loaded face mesh model"
        );

        if output_names.len() < 2 {
            return Err(MesherError::InferenceFailed(format!(
                "face mesh model requires 2 outputs (landmarks, score), got {}",
                output_names.len()
            )));
        }

        // Conventional exports put landmarks first and the face flag second;
        // verified against the actual tensor lengths on the first frame.
        Ok(Self {
            session,
            input_size: MESH_INPUT_SIZE,
            landmarks_idx: 0,
            score_idx: 1,
        })
    }

    /// Run the model on an RGB frame.
    ///
    /// Returns `Ok(None)` when no face is present this frame; that is the
    /// recoverable detection-absent case, not an error.
    pub fn detect(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Option<Vec<Landmark>>, MesherError> {
        let expected = width as usize * height as usize * 3;
        if width == 0 || height == 0 || rgb.len() < expected {
            return Err(MesherError::InferenceFailed(format!(
                "frame buffer too short: expected {expected}, got {}",
                rgb.len()
            )));
        }

        let (input, letterbox) = self.preprocess(rgb, width as usize, height as usize);
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (mut landmarks_idx, mut score_idx) = (self.landmarks_idx, self.score_idx);
        let (_, first) = outputs[landmarks_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| MesherError::InferenceFailed(format!("landmarks output: {e}")))?;
        if first.len() < MESH_OUTPUT_LEN {
            // Outputs are swapped in this export.
            std::mem::swap(&mut landmarks_idx, &mut score_idx);
            self.landmarks_idx = landmarks_idx;
            self.score_idx = score_idx;
            tracing::debug!("face mesh outputs swapped, using length-based mapping");
        }

        let (_, score_raw) = outputs[score_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| MesherError::InferenceFailed(format!("score output: {e}")))?;
        let score = sigmoid(score_raw.first().copied().unwrap_or(f32::NEG_INFINITY));
        if score < MESH_MIN_FACE_SCORE {
            tracing::trace!(score, "no face this frame");
            return Ok(None);
        }

        let (_, coords) = outputs[landmarks_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| MesherError::InferenceFailed(format!("landmarks output: {e}")))?;
        if coords.len() < MESH_OUTPUT_LEN {
            return Err(MesherError::InferenceFailed(format!(
                "landmark output too short: expected {MESH_OUTPUT_LEN}, got {}",
                coords.len()
            )));
        }

        let landmarks = demap_landmarks(coords, &letterbox, width, height);
        Ok(Some(landmarks))
    }

    /// Letterbox an RGB frame into the square model input (NHWC, 0–1 floats),
    /// bilinear-resampled. Padding is mid-gray so it normalizes near the
    /// input mean.
    fn preprocess(&self, rgb: &[u8], width: usize, height: usize) -> (Array4<f32>, LetterboxInfo) {
        let side = self.input_size;
        let scale = (side as f32 / width as f32).min(side as f32 / height as f32);
        let new_w = (width as f32 * scale).round() as usize;
        let new_h = (height as f32 * scale).round() as usize;
        let pad_x = (side - new_w) as f32 / 2.0;
        let pad_y = (side - new_h) as f32 / 2.0;

        let pad_x_start = pad_x.floor() as usize;
        let pad_y_start = pad_y.floor() as usize;
        let inv_scale = 1.0 / scale;

        let mut tensor = Array4::<f32>::from_elem((1, side, side, 3), 0.5);

        for y in 0..new_h {
            let src_y = (y as f32 + 0.5) * inv_scale - 0.5;
            let y0 = (src_y.floor() as i32).clamp(0, height as i32 - 1) as usize;
            let y1 = (y0 + 1).min(height - 1);
            let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

            for x in 0..new_w {
                let src_x = (x as f32 + 0.5) * inv_scale - 0.5;
                let x0 = (src_x.floor() as i32).clamp(0, width as i32 - 1) as usize;
                let x1 = (x0 + 1).min(width - 1);
                let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

                for c in 0..3 {
                    let tl = rgb[(y0 * width + x0) * 3 + c] as f32;
                    let tr = rgb[(y0 * width + x1) * 3 + c] as f32;
                    let bl = rgb[(y1 * width + x0) * 3 + c] as f32;
                    let br = rgb[(y1 * width + x1) * 3 + c] as f32;

                    let val = tl * (1.0 - fx) * (1.0 - fy)
                        + tr * fx * (1.0 - fy)
                        + bl * (1.0 - fx) * fy
                        + br * fx * fy;

                    tensor[[0, pad_y_start + y, pad_x_start + x, c]] = val / 255.0;
                }
            }
        }

        (tensor, LetterboxInfo { scale, pad_x, pad_y })
    }
}

/// Map model-space landmark coordinates back to normalized frame coordinates.
fn demap_landmarks(
    coords: &[f32],
    letterbox: &LetterboxInfo,
    width: u32,
    height: u32,
) -> Vec<Landmark> {
    let mut landmarks = Vec::with_capacity(MESH_LANDMARK_COUNT);
    for i in 0..MESH_LANDMARK_COUNT {
        let x = (coords[i * 3] - letterbox.pad_x) / letterbox.scale;
        let y = (coords[i * 3 + 1] - letterbox.pad_y) / letterbox.scale;
        // z shares the model-input scale; normalize against frame width like
        // x so depth stays comparable across resolutions.
        let z = coords[i * 3 + 2] / letterbox.scale;
        landmarks.push(Landmark::new(
            x / width as f32,
            y / height as f32,
            z / width as f32,
        ));
    }
    landmarks
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
