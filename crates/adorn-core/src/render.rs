//! Overlay rendering.
//!
//! Composites jewelry sprites onto an RGBA canvas by inverse-mapping each
//! destination pixel through the placement transform (scale + rotation about
//! the sprite center) and bilinear-sampling the source. Missing images and
//! zero-sized canvases are skipped, never errors: a render pass must survive
//! any single bad frame.

use image::RgbaImage;

use crate::geometry::ShapeBias;
use crate::params::TryOnParams;
use crate::types::{FaceShape, Point};

// --- Placement constants (no magic numbers in the draw paths) ---
/// Earring vertical drop below the ear anchor, as a fraction of its height.
const EARRING_DROP_FRAC: f32 = 0.18;
/// Damping applied to the head angle for earring tilt correction. Earrings
/// hang from the lobe, so they counter-rotate slightly rather than following
/// head roll rigidly.
const EARRING_TILT_DAMP: f32 = 0.08;
/// Watermark width as a fraction of canvas width.
const WATERMARK_WIDTH_FRAC: f32 = 0.22;
/// Watermark margin from the bottom-right corner, in pixels.
const WATERMARK_MARGIN: u32 = 14;
/// Watermark opacity.
const WATERMARK_ALPHA: f32 = 0.85;

/// Everything the renderer needs for one frame, already smoothed.
#[derive(Debug, Clone)]
pub struct OverlayState {
    pub left_ear: Point,
    pub right_ear: Point,
    pub neck: Point,
    /// Smoothed inter-ear distance in pixels.
    pub ear_dist: f32,
    /// Reported (median-filtered) head angle in radians.
    pub angle: f32,
    pub shape: FaceShape,
    pub face_width: f32,
    pub face_height: f32,
}

/// Draw both jewelry overlays for one frame. Either image may be absent.
pub fn draw_jewelry(
    canvas: &mut RgbaImage,
    state: &OverlayState,
    earring: Option<&RgbaImage>,
    necklace: Option<&RgbaImage>,
    params: &TryOnParams,
) {
    if canvas.width() == 0 || canvas.height() == 0 {
        return;
    }

    let bias = ShapeBias::for_shape(state.shape);
    let (x_adj, y_adj) = bias.offsets_px(state.face_width, state.face_height);

    if let Some(img) = earring {
        let width = state.ear_dist * params.ear_size_factor * bias.size_mult;
        if let Some(height) = scaled_height(img, width) {
            let drop = height * EARRING_DROP_FRAC + y_adj;
            let tilt = -(state.angle * EARRING_TILT_DAMP);

            let left = Point::new(state.left_ear.x - x_adj, state.left_ear.y + drop);
            draw_sprite(canvas, img, left, width, tilt, 1.0);

            // Mirrored tilt so both earrings swing outward under head roll.
            let right = Point::new(state.right_ear.x + x_adj, state.right_ear.y + drop);
            draw_sprite(canvas, img, right, width, -tilt, 1.0);
        }
    }

    if let Some(img) = necklace {
        let width = state.ear_dist * params.neck_scale;
        if scaled_height(img, width).is_some() {
            let center = Point::new(
                state.neck.x,
                state.neck.y + state.ear_dist * params.neck_y_offset,
            );
            // The necklace follows head roll fully, unlike earrings.
            draw_sprite(canvas, img, center, width, state.angle, 1.0);
        }
    }
}

/// Composite the watermark into the bottom-right corner at fixed opacity.
/// Drawn last on every composite, independent of detection success.
pub fn draw_watermark(canvas: &mut RgbaImage, watermark: Option<&RgbaImage>) {
    let Some(img) = watermark else {
        return;
    };
    let (cw, ch) = (canvas.width(), canvas.height());
    if cw == 0 || ch == 0 {
        return;
    }
    let width = (cw as f32 * WATERMARK_WIDTH_FRAC).round();
    let Some(height) = scaled_height(img, width) else {
        return;
    };
    let center = Point::new(
        cw as f32 - width / 2.0 - WATERMARK_MARGIN as f32,
        ch as f32 - height / 2.0 - WATERMARK_MARGIN as f32,
    );
    draw_sprite(canvas, img, center, width, 0.0, WATERMARK_ALPHA);
}

/// Target height preserving the source aspect ratio, or `None` if the sprite
/// or target width is degenerate.
fn scaled_height(img: &RgbaImage, width: f32) -> Option<f32> {
    if img.width() == 0 || img.height() == 0 || width <= 0.0 {
        return None;
    }
    Some(img.height() as f32 / img.width() as f32 * width)
}

/// Draw `sprite` centered at `center`, scaled to `width` pixels wide and
/// rotated by `angle` radians, alpha-blended onto the canvas.
///
/// Destination pixels are inverse-mapped into sprite space and sampled with
/// bilinear interpolation; pixels that map outside the sprite contribute
/// nothing. `opacity` multiplies the sprite's own alpha channel.
pub fn draw_sprite(
    canvas: &mut RgbaImage,
    sprite: &RgbaImage,
    center: Point,
    width: f32,
    angle: f32,
    opacity: f32,
) {
    let Some(height) = scaled_height(sprite, width) else {
        return;
    };
    let (cw, ch) = (canvas.width() as i64, canvas.height() as i64);
    if cw == 0 || ch == 0 || opacity <= 0.0 {
        return;
    }

    // Conservative destination bounds: half the rotated diagonal.
    let half_diag = (width * width + height * height).sqrt() / 2.0;
    let x0 = ((center.x - half_diag).floor() as i64).clamp(0, cw);
    let x1 = ((center.x + half_diag).ceil() as i64).clamp(0, cw);
    let y0 = ((center.y - half_diag).floor() as i64).clamp(0, ch);
    let y1 = ((center.y + half_diag).ceil() as i64).clamp(0, ch);

    let (sin, cos) = angle.sin_cos();
    let scale_x = sprite.width() as f32 / width;
    let scale_y = sprite.height() as f32 / height;

    for dy in y0..y1 {
        for dx in x0..x1 {
            // Rotate the destination offset back into sprite-local space.
            let ox = dx as f32 + 0.5 - center.x;
            let oy = dy as f32 + 0.5 - center.y;
            let lx = ox * cos + oy * sin;
            let ly = -ox * sin + oy * cos;

            let sx = (lx + width / 2.0) * scale_x - 0.5;
            let sy = (ly + height / 2.0) * scale_y - 0.5;

            let Some([r, g, b, a]) = sample_bilinear(sprite, sx, sy) else {
                continue;
            };
            let alpha = a * opacity;
            if alpha <= 0.0 {
                continue;
            }

            let dst = canvas.get_pixel_mut(dx as u32, dy as u32);
            for (d, s) in dst.0.iter_mut().take(3).zip([r, g, b]) {
                *d = (*d as f32 * (1.0 - alpha) + s * alpha).round() as u8;
            }
            let da = dst.0[3] as f32 / 255.0;
            dst.0[3] = ((alpha + da * (1.0 - alpha)) * 255.0).round() as u8;
        }
    }
}

/// Bilinear RGBA sample at fractional coordinates, `None` outside the image.
/// Channels are returned as [r, g, b] in 0–255 and alpha in 0–1.
fn sample_bilinear(img: &RgbaImage, x: f32, y: f32) -> Option<[f32; 4]> {
    let (w, h) = (img.width() as i64, img.height() as i64);
    if x < -0.5 || y < -0.5 || x > w as f32 - 0.5 || y > h as f32 - 0.5 {
        return None;
    }

    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let sample = |px: i64, py: i64| -> [f32; 4] {
        if px >= 0 && px < w && py >= 0 && py < h {
            let p = img.get_pixel(px as u32, py as u32).0;
            [p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32 / 255.0]
        } else {
            [0.0; 4]
        }
    };

    let tl = sample(x0, y0);
    let tr = sample(x0 + 1, y0);
    let bl = sample(x0, y0 + 1);
    let br = sample(x0 + 1, y0 + 1);

    let mut out = [0.0f32; 4];
    for i in 0..4 {
        let top = tl[i] * (1.0 - fx) + tr[i] * fx;
        let bot = bl[i] * (1.0 - fx) + br[i] * fx;
        out[i] = top * (1.0 - fy) + bot * fy;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(w: u32, h: u32, px: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba(px))
    }

    fn state() -> OverlayState {
        OverlayState {
            left_ear: Point::new(300.0, 360.0),
            right_ear: Point::new(700.0, 360.0),
            neck: Point::new(500.0, 520.0),
            ear_dist: 400.0,
            angle: 0.0,
            shape: FaceShape::Oval,
            face_width: 420.0,
            face_height: 480.0,
        }
    }

    #[test]
    fn test_missing_images_is_noop() {
        let mut canvas = solid(64, 64, [10, 20, 30, 255]);
        let before = canvas.clone();
        draw_jewelry(&mut canvas, &state(), None, None, &TryOnParams::default());
        assert_eq!(canvas, before);
    }

    #[test]
    fn test_zero_sized_canvas_does_not_panic() {
        let mut canvas = RgbaImage::new(0, 0);
        let sprite = solid(8, 8, [255, 0, 0, 255]);
        draw_jewelry(
            &mut canvas,
            &state(),
            Some(&sprite),
            Some(&sprite),
            &TryOnParams::default(),
        );
        draw_watermark(&mut canvas, Some(&sprite));
    }

    #[test]
    fn test_zero_sized_sprite_is_skipped() {
        let mut canvas = solid(32, 32, [0, 0, 0, 255]);
        let before = canvas.clone();
        let empty = RgbaImage::new(0, 0);
        draw_sprite(&mut canvas, &empty, Point::new(16.0, 16.0), 10.0, 0.0, 1.0);
        assert_eq!(canvas, before);
    }

    #[test]
    fn test_render_is_idempotent() {
        let mut a = solid(200, 200, [40, 40, 40, 255]);
        let mut b = a.clone();
        let earring = solid(10, 20, [200, 180, 40, 255]);
        let necklace = solid(30, 12, [220, 220, 220, 255]);
        let st = OverlayState {
            left_ear: Point::new(60.0, 90.0),
            right_ear: Point::new(140.0, 95.0),
            neck: Point::new(100.0, 130.0),
            ear_dist: 80.0,
            angle: 0.06,
            shape: FaceShape::Round,
            face_width: 90.0,
            face_height: 85.0,
        };
        let params = TryOnParams::default();
        draw_jewelry(&mut a, &st, Some(&earring), Some(&necklace), &params);
        draw_jewelry(&mut b, &st, Some(&earring), Some(&necklace), &params);
        assert_eq!(a, b);
    }

    #[test]
    fn test_sprite_lands_at_center() {
        let mut canvas = solid(100, 100, [0, 0, 0, 255]);
        let sprite = solid(4, 4, [255, 255, 255, 255]);
        draw_sprite(&mut canvas, &sprite, Point::new(50.0, 50.0), 10.0, 0.0, 1.0);
        assert_eq!(canvas.get_pixel(50, 50).0[0], 255);
        // Far corner untouched.
        assert_eq!(canvas.get_pixel(5, 5).0[0], 0);
    }

    #[test]
    fn test_sprite_clips_at_canvas_edge() {
        let mut canvas = solid(20, 20, [0, 0, 0, 255]);
        let sprite = solid(4, 4, [255, 255, 255, 255]);
        // Center outside the canvas; only the overlapping part draws.
        draw_sprite(&mut canvas, &sprite, Point::new(19.5, 10.0), 8.0, 0.3, 1.0);
        assert_eq!(canvas.get_pixel(0, 0).0[0], 0);
    }

    #[test]
    fn test_transparent_pixels_leave_canvas_alone() {
        let mut canvas = solid(40, 40, [7, 8, 9, 255]);
        let before = canvas.clone();
        let sprite = solid(8, 8, [255, 0, 0, 0]);
        draw_sprite(&mut canvas, &sprite, Point::new(20.0, 20.0), 16.0, 0.0, 1.0);
        assert_eq!(canvas, before);
    }

    #[test]
    fn test_watermark_bottom_right_fixed_opacity() {
        let mut canvas = solid(200, 100, [0, 0, 0, 255]);
        let wm = solid(10, 10, [255, 255, 255, 255]);
        draw_watermark(&mut canvas, Some(&wm));
        // Watermark width = 44 px, so its center sits at x = 200 - 22 - 14.
        let px = canvas.get_pixel(164, 100 - 22 - 14).0;
        // 0.85 opacity over black.
        assert!((px[0] as f32 - 255.0 * 0.85).abs() <= 1.5, "got {}", px[0]);
        // Top-left corner untouched.
        assert_eq!(canvas.get_pixel(0, 0).0, [0, 0, 0, 255]);
    }

    #[test]
    fn test_watermark_absent_is_noop() {
        let mut canvas = solid(64, 64, [1, 2, 3, 255]);
        let before = canvas.clone();
        draw_watermark(&mut canvas, None);
        assert_eq!(canvas, before);
    }

    #[test]
    fn test_earrings_draw_near_both_ears() {
        let mut canvas = solid(1000, 720, [0, 0, 0, 255]);
        let earring = solid(10, 10, [255, 0, 0, 255]);
        let st = state();
        draw_jewelry(&mut canvas, &st, Some(&earring), None, &TryOnParams::default());

        let near = |cx: u32, cy: u32| -> bool {
            let mut hit = false;
            for y in cy.saturating_sub(60)..(cy + 60).min(719) {
                for x in cx.saturating_sub(60)..(cx + 60).min(999) {
                    if canvas.get_pixel(x, y).0[0] > 200 {
                        hit = true;
                    }
                }
            }
            hit
        };
        assert!(near(300, 360), "no earring near left ear");
        assert!(near(700, 360), "no earring near right ear");
    }
}
