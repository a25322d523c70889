use std::path::PathBuf;
use std::time::Instant;

use adorn_core::assets::{AssetError, JewelryAsset, LoadTicket};
use adorn_core::segment::{SegThrottle, Segmenter};
use adorn_core::session::{encode_png, TryOnSession};
use adorn_core::{FaceMesher, JewelryCategory, TryOnParams};
use adorn_hw::{Camera, Frame};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::config::Config;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] adorn_hw::CameraError),
    #[error("face mesh error: {0}")]
    Mesher(#[from] adorn_core::MesherError),
    #[error("asset error: {0}")]
    Asset(#[from] AssetError),
    #[error("image encode error: {0}")]
    Encode(#[from] image::ImageError),
    #[error("no face detected in any captured frame")]
    NoFaceDetected,
    #[error("engine thread exited")]
    ChannelClosed,
}

/// One composite from a try-all batch.
pub struct TryOnLook {
    pub asset_id: String,
    pub png: Vec<u8>,
}

/// Messages sent from async callers to the engine thread.
enum EngineRequest {
    BeginAssetLoad {
        category: JewelryCategory,
        reply: oneshot::Sender<LoadTicket>,
    },
    CommitAsset {
        ticket: LoadTicket,
        result: Result<JewelryAsset, AssetError>,
        reply: oneshot::Sender<Result<bool, EngineError>>,
    },
    ClearAsset {
        category: JewelryCategory,
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<Result<Vec<u8>, EngineError>>,
    },
    TryAll {
        category: JewelryCategory,
        paths: Vec<PathBuf>,
        reply: oneshot::Sender<Result<Vec<TryOnLook>, EngineError>>,
    },
    GetParams {
        reply: oneshot::Sender<TryOnParams>,
    },
    SetParams {
        params: TryOnParams,
        reply: oneshot::Sender<()>,
    },
    Status {
        reply: oneshot::Sender<String>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Load and activate a jewelry asset.
    ///
    /// The decode runs off the engine thread; the engine applies the result
    /// only if no newer load for the category was requested meanwhile.
    /// Returns false when this load lost to a newer one.
    pub async fn load_asset(
        &self,
        category: JewelryCategory,
        path: PathBuf,
    ) -> Result<bool, EngineError> {
        let ticket = self
            .request(|reply| EngineRequest::BeginAssetLoad { category, reply })
            .await?;

        let result = tokio::task::spawn_blocking(move || JewelryAsset::load(&path, category))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;

        self.request(|reply| EngineRequest::CommitAsset {
            ticket,
            result,
            reply,
        })
        .await?
    }

    /// Deactivate the active image for a category.
    pub async fn clear_asset(&self, category: JewelryCategory) -> Result<(), EngineError> {
        self.request(|reply| EngineRequest::ClearAsset { category, reply })
            .await
    }

    /// Capture a still composite as PNG bytes. Watermark-only when no face
    /// is detected during the capture burst.
    pub async fn snapshot(&self) -> Result<Vec<u8>, EngineError> {
        self.request(|reply| EngineRequest::Snapshot { reply }).await?
    }

    /// Cycle through the given assets, producing one composite per asset.
    pub async fn try_all(
        &self,
        category: JewelryCategory,
        paths: Vec<PathBuf>,
    ) -> Result<Vec<TryOnLook>, EngineError> {
        self.request(|reply| EngineRequest::TryAll {
            category,
            paths,
            reply,
        })
        .await?
    }

    pub async fn params(&self) -> Result<TryOnParams, EngineError> {
        self.request(|reply| EngineRequest::GetParams { reply }).await
    }

    pub async fn set_params(&self, params: TryOnParams) -> Result<(), EngineError> {
        self.request(|reply| EngineRequest::SetParams { params, reply })
            .await
    }

    /// Engine status as a JSON document.
    pub async fn status(&self) -> Result<String, EngineError> {
        self.request(|reply| EngineRequest::Status { reply }).await
    }
}

/// Everything the engine thread owns.
struct Engine {
    camera: Camera,
    mesher: FaceMesher,
    segmenter: Option<Segmenter>,
    seg_throttle: SegThrottle,
    last_mask: Option<adorn_core::SegmentationMask>,
    session: TryOnSession,
    frames_per_snapshot: usize,
    settle_frames: usize,
}

/// Spawn the engine on a dedicated OS thread.
///
/// Opens the camera and loads the face-mesh model synchronously (fail-fast);
/// the segmentation model and watermark are best-effort. Discards warmup
/// frames, then enters the request loop.
pub fn spawn_engine(config: &Config) -> Result<EngineHandle, EngineError> {
    let camera = Camera::open(&config.camera_device)?;
    tracing::info!(
        device = %config.camera_device,
        width = camera.width,
        height = camera.height,
        "camera opened"
    );

    let mesher = FaceMesher::load(&config.mesh_model_path())?;
    tracing::info!(path = %config.mesh_model_path(), "face mesh model loaded");

    // Occlusion is best-effort: a missing segmentation model only disables it.
    let segmenter = if config.segmentation_enabled {
        match Segmenter::load(&config.segmentation_model_path()) {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::warn!(error = %e, "segmentation unavailable; occlusion compositing disabled");
                None
            }
        }
    } else {
        tracing::info!("segmentation disabled via ADORN_SEGMENTATION_ENABLED=0");
        None
    };

    let mut session = TryOnSession::new(config.load_params());
    if let Some(path) = &config.watermark_path {
        match image::open(path) {
            Ok(img) => session.set_watermark(Some(img.to_rgba8())),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "watermark load failed; continuing without")
            }
        }
    }

    if config.warmup_frames > 0 {
        tracing::info!(count = config.warmup_frames, "discarding warmup frames");
        // One continuous burst, so the sensor actually streams while
        // AGC/AE settles.
        let _ = camera.capture_frames(config.warmup_frames);
    }

    let mut engine = Engine {
        camera,
        mesher,
        segmenter,
        seg_throttle: SegThrottle::default(),
        last_mask: None,
        session,
        frames_per_snapshot: config.frames_per_snapshot,
        settle_frames: config.settle_frames,
    };

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("adorn-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                engine.handle(req);
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    Ok(EngineHandle { tx })
}

impl Engine {
    fn handle(&mut self, req: EngineRequest) {
        match req {
            EngineRequest::BeginAssetLoad { category, reply } => {
                let _ = reply.send(self.session.begin_asset_load(category));
            }
            EngineRequest::CommitAsset {
                ticket,
                result,
                reply,
            } => {
                let outcome = match result {
                    Ok(asset) => Ok(self.session.commit_asset(ticket, asset)),
                    Err(e) => {
                        tracing::warn!(
                            category = ticket.category().name(),
                            error = %e,
                            "asset load failed; active image unchanged"
                        );
                        Err(EngineError::Asset(e))
                    }
                };
                let _ = reply.send(outcome);
            }
            EngineRequest::ClearAsset { category, reply } => {
                self.session.clear_asset(category);
                let _ = reply.send(());
            }
            EngineRequest::Snapshot { reply } => {
                let _ = reply.send(self.run_snapshot());
            }
            EngineRequest::TryAll {
                category,
                paths,
                reply,
            } => {
                let _ = reply.send(self.run_try_all(category, paths));
            }
            EngineRequest::GetParams { reply } => {
                let _ = reply.send(self.session.params().clone());
            }
            EngineRequest::SetParams { params, reply } => {
                self.session.set_params(params);
                let _ = reply.send(());
            }
            EngineRequest::Status { reply } => {
                let _ = reply.send(self.status_json());
            }
        }
    }

    /// One captured frame through the pipeline: detect, (throttled) segment,
    /// composite. Never fails; inference errors degrade per frame.
    fn pipeline_pass(&mut self, frame: &Frame) -> image::RgbaImage {
        let rgba = frame.to_rgba();

        // Detection-absent is recoverable; inference errors degrade the same
        // way rather than aborting a batch mid-run.
        let landmarks = match self.mesher.detect(&frame.data, frame.width, frame.height) {
            Ok(lms) => lms,
            Err(e) => {
                tracing::warn!(error = %e, "face mesh inference failed this frame");
                None
            }
        };

        if let Some(segmenter) = &mut self.segmenter {
            if self.seg_throttle.ready(Instant::now()) {
                match segmenter.segment(&frame.data, frame.width, frame.height) {
                    Ok(mask) => self.last_mask = Some(mask),
                    // Keep the previous mask; staleness is accepted.
                    Err(e) => tracing::debug!(error = %e, "segmentation failed, keeping stale mask"),
                }
            }
        }

        self.session
            .process_frame(&rgba, landmarks.as_deref(), self.last_mask.as_ref())
    }

    /// Capture one burst, feed it through the pipeline so smoothing settles,
    /// and export the last composite.
    ///
    /// A face-less burst still exports: the composite degrades to
    /// watermark-only rather than failing the snapshot.
    fn run_snapshot(&mut self) -> Result<Vec<u8>, EngineError> {
        let frames = self.camera.capture_frames(self.frames_per_snapshot.max(1))?;
        let mut composite = None;
        for frame in &frames {
            composite = Some(self.pipeline_pass(frame));
        }
        let composite = composite.ok_or_else(|| {
            EngineError::Camera(adorn_hw::CameraError::CaptureFailed(
                "empty capture burst".into(),
            ))
        })?;
        if !self.session.face_present() {
            tracing::warn!("no face detected; exporting watermark-only snapshot");
        }
        Ok(encode_png(&composite)?)
    }

    /// Cycle through assets, capturing one composite per successfully loaded
    /// asset. Load failures and face-less settles skip the item.
    fn run_try_all(
        &mut self,
        category: JewelryCategory,
        paths: Vec<PathBuf>,
    ) -> Result<Vec<TryOnLook>, EngineError> {
        let mut looks = Vec::new();

        for path in &paths {
            let ticket = self.session.begin_asset_load(category);
            let asset = match JewelryAsset::load(path, category) {
                Ok(asset) => asset,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping asset");
                    continue;
                }
            };
            let asset_id = asset.id.clone();
            self.session.commit_asset(ticket, asset);

            let frames = self.camera.capture_frames(self.settle_frames.max(1))?;
            let mut composite = None;
            for frame in &frames {
                composite = Some(self.pipeline_pass(frame));
            }

            if !self.session.face_present() {
                tracing::warn!(asset = %asset_id, "no face while settling; skipping capture");
                continue;
            }
            if let Some(composite) = composite {
                looks.push(TryOnLook {
                    asset_id,
                    png: encode_png(&composite)?,
                });
            }
        }

        if looks.is_empty() && !paths.is_empty() {
            return Err(EngineError::NoFaceDetected);
        }
        Ok(looks)
    }

    fn status_json(&self) -> String {
        serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "camera": {
                "device": self.camera.device_path,
                "width": self.camera.width,
                "height": self.camera.height,
            },
            "face_present": self.session.face_present(),
            "segmentation": self.segmenter.is_some(),
            "active_earring": self.session.active_asset(JewelryCategory::Earring).map(|a| a.id.clone()),
            "active_necklace": self.session.active_asset(JewelryCategory::Necklace).map(|a| a.id.clone()),
            "params": {
                "ear_size_factor": self.session.params().ear_size_factor,
                "neck_scale": self.session.params().neck_scale,
                "neck_y_offset": self.session.params().neck_y_offset,
                "pos_smooth": self.session.params().pos_smooth,
                "ear_dist_smooth": self.session.params().ear_dist_smooth,
            },
        })
        .to_string()
    }
}
