//! The try-on session: one context object owning all mutable pipeline state.
//!
//! Each detection frame flows smoother → anchors/shape → angle → renderer →
//! optional occlusion → watermark, synchronously. The session is single-
//! context by design; there are no globals and no locks.

use image::RgbaImage;

use crate::angle::AngleTracker;
use crate::assets::{ActiveAssets, JewelryAsset, LoadTicket};
use crate::geometry::{self, FaceAnchors};
use crate::occlusion;
use crate::params::TryOnParams;
use crate::render::{self, OverlayState};
use crate::segment::SegmentationMask;
use crate::smoothing::LandmarkSmoother;
use crate::types::{FaceShape, JewelryCategory, Landmark, Point};

/// Smoothed anchor state carried between frames.
struct AnchorState {
    left_ear: Point,
    right_ear: Point,
    neck: Point,
    ear_dist: f32,
    shape: FaceShape,
    face_width: f32,
    face_height: f32,
}

/// A virtual try-on session.
pub struct TryOnSession {
    params: TryOnParams,
    smoother: LandmarkSmoother,
    angle: AngleTracker,
    anchors: Option<AnchorState>,
    assets: ActiveAssets,
    watermark: Option<RgbaImage>,
}

impl TryOnSession {
    pub fn new(params: TryOnParams) -> Self {
        let params = params.sanitized();
        Self {
            smoother: LandmarkSmoother::new(params.landmark_smooth, params.reset_after_missed),
            angle: AngleTracker::new(params.angle_smooth),
            anchors: None,
            assets: ActiveAssets::new(),
            watermark: None,
            params,
        }
    }

    /// Set (or clear) the watermark composited onto every frame.
    pub fn set_watermark(&mut self, watermark: Option<RgbaImage>) {
        self.watermark = watermark;
    }

    pub fn params(&self) -> &TryOnParams {
        &self.params
    }

    /// Replace the tunables. Smoothing state is kept; only the factors change.
    pub fn set_params(&mut self, params: TryOnParams) {
        let params = params.sanitized();
        self.smoother.set_retain(params.landmark_smooth);
        self.smoother.set_reset_after(params.reset_after_missed);
        self.angle.set_retain(params.angle_smooth);
        self.params = params;
    }

    /// Register a load request for a category. The returned ticket must be
    /// passed back to [`commit_asset`](Self::commit_asset) with the decoded
    /// image; stale tickets are rejected there.
    pub fn begin_asset_load(&mut self, category: JewelryCategory) -> LoadTicket {
        self.assets.begin_load(category)
    }

    /// Apply a completed asset load; returns false if the ticket is stale.
    pub fn commit_asset(&mut self, ticket: LoadTicket, asset: JewelryAsset) -> bool {
        self.assets.commit(ticket, asset)
    }

    /// Deactivate the active image for a category.
    pub fn clear_asset(&mut self, category: JewelryCategory) {
        self.assets.clear(category);
    }

    pub fn active_asset(&self, category: JewelryCategory) -> Option<&JewelryAsset> {
        self.assets.active(category)
    }

    /// Whether a face is currently being tracked.
    pub fn face_present(&self) -> bool {
        self.anchors.is_some()
    }

    /// Run one pipeline pass: composite the active jewelry (and watermark)
    /// over `frame`, given this frame's raw landmarks and the most recent
    /// segmentation mask (which may be stale, or absent to skip occlusion).
    ///
    /// Never fails: a missing detection degrades to a watermark-only pass and
    /// a malformed landmark frame is treated the same way.
    pub fn process_frame(
        &mut self,
        frame: &RgbaImage,
        raw_landmarks: Option<&[Landmark]>,
        mask: Option<&SegmentationMask>,
    ) -> RgbaImage {
        let mut canvas = frame.clone();

        let Some(raw) = raw_landmarks else {
            self.record_miss();
            render::draw_watermark(&mut canvas, self.watermark.as_ref());
            return canvas;
        };

        let smoothed: Vec<Landmark> = self.smoother.update(raw).to_vec();
        let Some(frame_anchors) =
            geometry::extract_anchors(&smoothed, canvas.width(), canvas.height())
        else {
            // Frame too short to contain the semantic indices.
            self.record_miss();
            render::draw_watermark(&mut canvas, self.watermark.as_ref());
            return canvas;
        };

        let state = self.advance_state(&frame_anchors);

        render::draw_jewelry(
            &mut canvas,
            &state,
            self.assets.active(JewelryCategory::Earring).map(|a| &a.image),
            self.assets.active(JewelryCategory::Necklace).map(|a| &a.image),
            &self.params,
        );

        if let Some(mask) = mask {
            occlusion::composite_occlusion(&mut canvas, frame, &smoothed, mask);
        }

        render::draw_watermark(&mut canvas, self.watermark.as_ref());
        canvas
    }

    /// Blend this frame's anchors into the carried state and produce the
    /// renderer's view of it.
    fn advance_state(&mut self, frame: &FaceAnchors) -> OverlayState {
        let raw_angle = (frame.right_ear.y - frame.left_ear.y)
            .atan2(frame.right_ear.x - frame.left_ear.x);

        match &mut self.anchors {
            None => {
                self.angle.reset();
                self.anchors = Some(AnchorState {
                    left_ear: frame.left_ear,
                    right_ear: frame.right_ear,
                    neck: frame.neck,
                    ear_dist: frame.ear_dist,
                    shape: frame.shape,
                    face_width: frame.face_width,
                    face_height: frame.face_height,
                });
            }
            Some(state) => {
                state.left_ear = state.left_ear.blend(&frame.left_ear, self.params.pos_smooth);
                state.right_ear = state.right_ear.blend(&frame.right_ear, self.params.pos_smooth);
                state.neck = state.neck.blend(&frame.neck, self.params.pos_smooth);
                state.ear_dist = state.ear_dist * self.params.ear_dist_smooth
                    + frame.ear_dist * (1.0 - self.params.ear_dist_smooth);
                state.shape = frame.shape;
                state.face_width = frame.face_width;
                state.face_height = frame.face_height;
            }
        }
        self.angle.update(raw_angle);
        let angle = self.angle.reported();

        match &self.anchors {
            Some(state) => OverlayState {
                left_ear: state.left_ear,
                right_ear: state.right_ear,
                neck: state.neck,
                ear_dist: state.ear_dist,
                angle,
                shape: state.shape,
                face_width: state.face_width,
                face_height: state.face_height,
            },
            // Unreachable (state was just seeded), but the renderer can run
            // straight off this frame's anchors.
            None => OverlayState {
                left_ear: frame.left_ear,
                right_ear: frame.right_ear,
                neck: frame.neck,
                ear_dist: frame.ear_dist,
                angle,
                shape: frame.shape,
                face_width: frame.face_width,
                face_height: frame.face_height,
            },
        }
    }

    fn record_miss(&mut self) {
        if self.smoother.miss() {
            self.anchors = None;
            self.angle.reset();
        }
    }
}

/// Encode a composite to PNG bytes (the export format for snapshots and
/// try-all galleries).
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    let mut bytes = Vec::new();
    image.write_to(
        &mut std::io::Cursor::new(&mut bytes),
        image::ImageFormat::Png,
    )?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{indices, MESH_LANDMARK_COUNT};
    use image::Rgba;

    /// Synthetic face: ears on a line tilted by `tilt` radians about the
    /// frame center, chin below, with a plausible bbox spread.
    fn synthetic_face(tilt: f32) -> Vec<Landmark> {
        let mut lms = vec![Landmark::new(0.5, 0.5, 0.0); MESH_LANDMARK_COUNT];
        let half = 0.15f32;
        let (sin, cos) = tilt.sin_cos();
        lms[indices::LEFT_EAR] = Landmark::new(0.5 - half * cos, 0.5 - half * sin, 0.0);
        lms[indices::RIGHT_EAR] = Landmark::new(0.5 + half * cos, 0.5 + half * sin, 0.0);
        lms[indices::NECK] = Landmark::new(0.5, 0.72, 0.0);
        // Spread the bbox.
        lms[0] = Landmark::new(0.35, 0.28, 0.0);
        lms[1] = Landmark::new(0.65, 0.75, 0.0);
        lms
    }

    fn frame() -> RgbaImage {
        RgbaImage::from_pixel(320, 240, Rgba([15, 25, 35, 255]))
    }

    #[test]
    fn test_rotating_face_without_assets_is_watermark_only() {
        let mut session = TryOnSession::new(TryOnParams::default());
        let wm = RgbaImage::from_pixel(6, 6, Rgba([255, 255, 255, 255]));
        session.set_watermark(Some(wm.clone()));

        let frame = frame();
        let mut expected = frame.clone();
        render::draw_watermark(&mut expected, Some(&wm));

        for i in 0..30 {
            // −10° to +10° over 30 frames.
            let tilt = (-10.0 + 20.0 * i as f32 / 29.0).to_radians();
            let out = session.process_frame(&frame, Some(&synthetic_face(tilt)), None);
            assert_eq!(out, expected, "frame {i} was not watermark-only");
        }
    }

    #[test]
    fn test_detection_absent_renders_watermark_only() {
        let mut session = TryOnSession::new(TryOnParams::default());
        let wm = RgbaImage::from_pixel(4, 4, Rgba([200, 200, 200, 255]));
        session.set_watermark(Some(wm.clone()));

        let frame = frame();
        let out = session.process_frame(&frame, None, None);

        let mut expected = frame.clone();
        render::draw_watermark(&mut expected, Some(&wm));
        assert_eq!(out, expected);
    }

    #[test]
    fn test_earring_changes_pixels_when_active() {
        let mut session = TryOnSession::new(TryOnParams::default());
        let ticket = session.begin_asset_load(JewelryCategory::Earring);
        let asset = JewelryAsset {
            id: "e.png".into(),
            category: JewelryCategory::Earring,
            image: RgbaImage::from_pixel(8, 8, Rgba([255, 0, 0, 255])),
        };
        assert!(session.commit_asset(ticket, asset));

        let frame = frame();
        let out = session.process_frame(&frame, Some(&synthetic_face(0.0)), None);
        assert_ne!(out, frame, "active earring should alter the composite");
    }

    #[test]
    fn test_state_resets_after_consecutive_misses() {
        let mut session = TryOnSession::new(TryOnParams::default());
        let frame = frame();
        session.process_frame(&frame, Some(&synthetic_face(0.0)), None);
        assert!(session.face_present());

        for _ in 0..3 {
            session.process_frame(&frame, None, None);
        }
        assert!(!session.face_present());
    }

    #[test]
    fn test_single_miss_keeps_tracking() {
        let mut session = TryOnSession::new(TryOnParams::default());
        let frame = frame();
        session.process_frame(&frame, Some(&synthetic_face(0.0)), None);
        session.process_frame(&frame, None, None);
        assert!(session.face_present());
    }

    #[test]
    fn test_malformed_landmark_frame_does_not_panic() {
        let mut session = TryOnSession::new(TryOnParams::default());
        let frame = frame();
        let short = vec![Landmark::new(0.5, 0.5, 0.0); 7];
        let out = session.process_frame(&frame, Some(&short), None);
        assert_eq!(out, frame);
    }

    #[test]
    fn test_occlusion_restores_video_over_jewelry() {
        let commit_earring = |session: &mut TryOnSession| {
            let ticket = session.begin_asset_load(JewelryCategory::Earring);
            let asset = JewelryAsset {
                id: "e.png".into(),
                category: JewelryCategory::Earring,
                image: RgbaImage::from_pixel(8, 8, Rgba([255, 0, 0, 255])),
            };
            assert!(session.commit_asset(ticket, asset));
        };

        // Central-face landmarks spread so the padded occlusion box covers
        // both earrings.
        let mut lms = synthetic_face(0.0);
        lms[indices::OCCLUSION_REGION[0]] = Landmark::new(0.2, 0.3, 0.0);
        lms[indices::OCCLUSION_REGION[1]] = Landmark::new(0.8, 0.7, 0.0);

        let frame = frame();
        let full_person = SegmentationMask {
            data: vec![1; 64],
            width: 8,
            height: 8,
        };

        let mut with_mask = TryOnSession::new(TryOnParams::default());
        commit_earring(&mut with_mask);
        let restored = with_mask.process_frame(&frame, Some(&lms), Some(&full_person));
        assert_eq!(restored, frame, "person mask should hide the earrings");

        let mut without_mask = TryOnSession::new(TryOnParams::default());
        commit_earring(&mut without_mask);
        let drawn = without_mask.process_frame(&frame, Some(&lms), None);
        assert_ne!(drawn, frame, "earrings should draw when no mask is given");
    }

    #[test]
    fn test_encode_png_roundtrip() {
        let img = RgbaImage::from_pixel(5, 4, Rgba([9, 8, 7, 255]));
        let bytes = encode_png(&img).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded, img);
    }
}
