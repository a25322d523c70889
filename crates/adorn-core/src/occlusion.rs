//! Hair/head occlusion compositing.
//!
//! After the jewelry is drawn, raw video pixels are restored over the
//! central-face region wherever the segmentation mask says "person", so
//! overlay graphics that bled into hair or skin disappear behind them. The
//! mask is allowed to be stale relative to the overlay; this is an accepted
//! approximation, not something to resynchronize frame-for-frame.

use image::RgbaImage;

use crate::segment::SegmentationMask;
use crate::types::{indices, Landmark};

/// Horizontal padding around the central-face box, as a fraction of its width.
const PAD_X_FRAC: f32 = 0.18;
/// Vertical padding, as a fraction of the box height. Generous upward so the
/// hairline is covered.
const PAD_Y_FRAC: f32 = 0.40;

/// Restore raw video pixels over the person-labeled part of the padded
/// central-face box. No-op when the box is degenerate, the landmark frame is
/// too short, or the video frame does not match the canvas size.
pub fn composite_occlusion(
    canvas: &mut RgbaImage,
    video: &RgbaImage,
    landmarks: &[Landmark],
    mask: &SegmentationMask,
) {
    let (cw, ch) = (canvas.width(), canvas.height());
    if cw == 0 || ch == 0 || video.width() != cw || video.height() != ch {
        return;
    }

    // Normalized bounding box over the central-face indices.
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (f32::MAX, f32::MAX, f32::MIN, f32::MIN);
    for &i in &indices::OCCLUSION_REGION {
        let Some(lm) = landmarks.get(i) else {
            return;
        };
        min_x = min_x.min(lm.x);
        min_y = min_y.min(lm.y);
        max_x = max_x.max(lm.x);
        max_y = max_y.max(lm.y);
    }

    let pad_x = PAD_X_FRAC * (max_x - min_x);
    let pad_y = PAD_Y_FRAC * (max_y - min_y);

    let left = (((min_x - pad_x) * cw as f32).max(0.0)) as u32;
    let top = (((min_y - pad_y) * ch as f32).max(0.0)) as u32;
    let right = (((max_x + pad_x) * cw as f32).min(cw as f32)) as u32;
    let bottom = (((max_y + pad_y) * ch as f32).min(ch as f32)) as u32;
    if right <= left || bottom <= top {
        return;
    }

    for y in top..bottom {
        for x in left..right {
            if mask.is_person(x, y, cw, ch) {
                canvas.put_pixel(x, y, *video.get_pixel(x, y));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MESH_LANDMARK_COUNT;
    use image::Rgba;

    fn face_landmarks() -> Vec<Landmark> {
        let mut lms = vec![Landmark::new(0.5, 0.5, 0.0); MESH_LANDMARK_COUNT];
        // Central-face column from forehead (0.3) to nose tip (0.6).
        for (k, &i) in indices::OCCLUSION_REGION.iter().enumerate() {
            lms[i] = Landmark::new(0.45 + 0.02 * k as f32, 0.3 + 0.06 * k as f32, 0.0);
        }
        lms
    }

    fn full_person_mask() -> SegmentationMask {
        SegmentationMask {
            data: vec![1; 16],
            width: 4,
            height: 4,
        }
    }

    #[test]
    fn test_restores_video_inside_person_region() {
        let video = RgbaImage::from_pixel(100, 100, Rgba([10, 20, 30, 255]));
        // Canvas fully painted over, as if jewelry covered everything.
        let mut canvas = RgbaImage::from_pixel(100, 100, Rgba([200, 0, 0, 255]));
        composite_occlusion(&mut canvas, &video, &face_landmarks(), &full_person_mask());
        // Center of the face box restored to video.
        assert_eq!(canvas.get_pixel(50, 45).0, [10, 20, 30, 255]);
        // Far corner still the overlay.
        assert_eq!(canvas.get_pixel(2, 95).0, [200, 0, 0, 255]);
    }

    #[test]
    fn test_background_pixels_keep_overlay() {
        let video = RgbaImage::from_pixel(100, 100, Rgba([10, 20, 30, 255]));
        let mut canvas = RgbaImage::from_pixel(100, 100, Rgba([200, 0, 0, 255]));
        let mask = SegmentationMask {
            data: vec![0; 16],
            width: 4,
            height: 4,
        };
        let before = canvas.clone();
        composite_occlusion(&mut canvas, &video, &face_landmarks(), &mask);
        assert_eq!(canvas, before);
    }

    #[test]
    fn test_short_landmark_frame_is_noop() {
        let video = RgbaImage::from_pixel(50, 50, Rgba([1, 1, 1, 255]));
        let mut canvas = RgbaImage::from_pixel(50, 50, Rgba([9, 9, 9, 255]));
        let before = canvas.clone();
        let lms = vec![Landmark::new(0.5, 0.5, 0.0); 3];
        composite_occlusion(&mut canvas, &video, &lms, &full_person_mask());
        assert_eq!(canvas, before);
    }

    #[test]
    fn test_mismatched_video_size_is_noop() {
        let video = RgbaImage::from_pixel(64, 64, Rgba([1, 1, 1, 255]));
        let mut canvas = RgbaImage::from_pixel(100, 100, Rgba([9, 9, 9, 255]));
        let before = canvas.clone();
        composite_occlusion(&mut canvas, &video, &face_landmarks(), &full_person_mask());
        assert_eq!(canvas, before);
    }

    #[test]
    fn test_zero_canvas_does_not_panic() {
        let video = RgbaImage::new(0, 0);
        let mut canvas = RgbaImage::new(0, 0);
        composite_occlusion(&mut canvas, &video, &face_landmarks(), &full_person_mask());
    }
}
