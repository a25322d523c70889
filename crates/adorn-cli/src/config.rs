use std::path::PathBuf;

use adorn_core::TryOnParams;

/// CLI configuration, loaded from environment variables.
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Directory containing jewelry image folders.
    pub asset_dir: PathBuf,
    /// Watermark image composited onto every export, if present.
    pub watermark_path: Option<PathBuf>,
    /// Tunable-parameter TOML file.
    pub params_path: PathBuf,
    /// Directory snapshots and try-all composites are written to.
    pub output_dir: PathBuf,
    /// Number of warmup frames to discard at startup (camera AGC/AE
    /// stabilization).
    pub warmup_frames: usize,
    /// Frames fed through the pipeline per snapshot so smoothing settles.
    pub frames_per_snapshot: usize,
    /// Frames fed through the pipeline after each try-all asset swap.
    pub settle_frames: usize,
    /// Whether to run person segmentation for occlusion compositing.
    pub segmentation_enabled: bool,
}

impl Config {
    /// Load configuration from `ADORN_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("ADORN_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| adorn_core::default_model_dir());

        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".config")
            })
            .join("adorn");

        Self {
            camera_device: std::env::var("ADORN_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            model_dir,
            asset_dir: std::env::var("ADORN_ASSET_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("assets")),
            watermark_path: std::env::var("ADORN_WATERMARK_PATH").ok().map(PathBuf::from),
            params_path: std::env::var("ADORN_PARAMS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| config_dir.join("params.toml")),
            output_dir: std::env::var("ADORN_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".")),
            warmup_frames: env_usize("ADORN_WARMUP_FRAMES", 4),
            frames_per_snapshot: env_usize("ADORN_FRAMES_PER_SNAPSHOT", 12),
            settle_frames: env_usize("ADORN_SETTLE_FRAMES", 12),
            segmentation_enabled: std::env::var("ADORN_SEGMENTATION_ENABLED")
                .map(|v| v != "0")
                .unwrap_or(true),
        }
    }

    /// Path to the face-mesh landmark model.
    pub fn mesh_model_path(&self) -> String {
        self.model_dir
            .join("face_mesh.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the person-segmentation model.
    pub fn segmentation_model_path(&self) -> String {
        self.model_dir
            .join("selfie_segmentation.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Load tunables from the params file, falling back to defaults when the
    /// file is absent or unreadable.
    pub fn load_params(&self) -> TryOnParams {
        match std::fs::read_to_string(&self.params_path) {
            Ok(text) => match TryOnParams::from_toml(&text) {
                Ok(params) => params,
                Err(e) => {
                    tracing::warn!(
                        path = %self.params_path.display(),
                        error = %e,
                        "invalid params file, using defaults"
                    );
                    TryOnParams::default()
                }
            },
            Err(_) => TryOnParams::default(),
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
