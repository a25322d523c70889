//! Temporal landmark smoothing.
//!
//! The raw mesh jitters by a few pixels frame to frame; an exponential
//! moving average over every coordinate suppresses that before any anchor
//! geometry is derived. The first accepted frame is adopted verbatim, and
//! the state is discarded after a configurable run of missed detections so
//! re-acquisition restarts from raw values instead of dragging the overlay
//! in from a stale position.

use crate::types::Landmark;

/// Exponentially smooths successive landmark frames.
pub struct LandmarkSmoother {
    /// EMA retention toward the previous smoothed frame.
    retain: f32,
    /// Missed detections tolerated before the state resets.
    reset_after_missed: u32,
    smoothed: Option<Vec<Landmark>>,
    consecutive_missed: u32,
}

impl LandmarkSmoother {
    pub fn new(retain: f32, reset_after_missed: u32) -> Self {
        Self {
            retain,
            reset_after_missed,
            smoothed: None,
            consecutive_missed: 0,
        }
    }

    /// Feed one frame of raw landmarks, returning the smoothed frame.
    ///
    /// On the first frame (or the first after a reset) the raw values pass
    /// through unchanged. If the raw frame has a different landmark count
    /// than the held state (a model swap mid-session), the state restarts
    /// from raw rather than blending mismatched indices.
    pub fn update(&mut self, raw: &[Landmark]) -> &[Landmark] {
        self.consecutive_missed = 0;

        match &mut self.smoothed {
            Some(prev) if prev.len() == raw.len() => {
                let retain = self.retain;
                for (s, r) in prev.iter_mut().zip(raw.iter()) {
                    s.x = s.x * retain + r.x * (1.0 - retain);
                    s.y = s.y * retain + r.y * (1.0 - retain);
                    s.z = s.z * retain + r.z * (1.0 - retain);
                }
            }
            _ => {
                self.smoothed = Some(raw.to_vec());
            }
        }

        self.smoothed.as_deref().unwrap_or(&[])
    }

    /// Record a frame with no detection. Returns true if this miss crossed
    /// the reset threshold and the smoothing state was discarded.
    pub fn miss(&mut self) -> bool {
        if self.smoothed.is_none() {
            return false;
        }
        self.consecutive_missed += 1;
        if self.consecutive_missed >= self.reset_after_missed {
            tracing::debug!(
                missed = self.consecutive_missed,
                "detection lost, resetting landmark smoothing state"
            );
            self.reset();
            return true;
        }
        false
    }

    /// Discard all smoothing state.
    pub fn reset(&mut self) {
        self.smoothed = None;
        self.consecutive_missed = 0;
    }

    /// The current smoothed frame, if any detection has been accepted.
    pub fn current(&self) -> Option<&[Landmark]> {
        self.smoothed.as_deref()
    }

    pub fn set_retain(&mut self, retain: f32) {
        self.retain = retain;
    }

    pub fn set_reset_after(&mut self, missed: u32) {
        self.reset_after_missed = missed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(vals: &[(f32, f32)]) -> Vec<Landmark> {
        vals.iter().map(|&(x, y)| Landmark::new(x, y, 0.0)).collect()
    }

    #[test]
    fn test_first_frame_passes_through() {
        let mut s = LandmarkSmoother::new(0.72, 3);
        let raw = frame(&[(0.1, 0.2), (0.3, 0.4)]);
        let out = s.update(&raw);
        assert_eq!(out, raw.as_slice());
    }

    #[test]
    fn test_second_frame_is_blended() {
        let mut s = LandmarkSmoother::new(0.72, 3);
        s.update(&frame(&[(0.0, 0.0)]));
        let out = s.update(&frame(&[(1.0, 1.0)]));
        // 0.0 * 0.72 + 1.0 * 0.28
        assert!((out[0].x - 0.28).abs() < 1e-6);
        assert!((out[0].y - 0.28).abs() < 1e-6);
    }

    #[test]
    fn test_converges_to_constant_input() {
        let mut s = LandmarkSmoother::new(0.72, 3);
        let target = frame(&[(0.6, 0.4)]);
        s.update(&frame(&[(0.0, 0.0)]));
        for _ in 0..100 {
            s.update(&target);
        }
        let out = s.current().unwrap();
        assert!((out[0].x - 0.6).abs() < 1e-4);
        assert!((out[0].y - 0.4).abs() < 1e-4);
    }

    #[test]
    fn test_single_miss_keeps_state() {
        let mut s = LandmarkSmoother::new(0.72, 3);
        s.update(&frame(&[(0.5, 0.5)]));
        assert!(!s.miss());
        assert!(s.current().is_some());
    }

    #[test]
    fn test_reset_after_consecutive_misses() {
        let mut s = LandmarkSmoother::new(0.72, 3);
        s.update(&frame(&[(0.5, 0.5)]));
        assert!(!s.miss());
        assert!(!s.miss());
        assert!(s.miss());
        assert!(s.current().is_none());

        // Re-acquisition restarts from raw.
        let raw = frame(&[(0.9, 0.1)]);
        let out = s.update(&raw);
        assert_eq!(out, raw.as_slice());
    }

    #[test]
    fn test_miss_counter_clears_on_detection() {
        let mut s = LandmarkSmoother::new(0.72, 2);
        s.update(&frame(&[(0.5, 0.5)]));
        assert!(!s.miss());
        s.update(&frame(&[(0.5, 0.5)]));
        // Counter restarted, so one more miss does not reset.
        assert!(!s.miss());
        assert!(s.current().is_some());
    }

    #[test]
    fn test_length_change_restarts_from_raw() {
        let mut s = LandmarkSmoother::new(0.72, 3);
        s.update(&frame(&[(0.0, 0.0), (1.0, 1.0)]));
        let raw = frame(&[(0.5, 0.5)]);
        let out = s.update(&raw);
        assert_eq!(out, raw.as_slice());
    }

    #[test]
    fn test_miss_before_any_detection_is_noop() {
        let mut s = LandmarkSmoother::new(0.72, 1);
        assert!(!s.miss());
        assert!(s.current().is_none());
    }
}
