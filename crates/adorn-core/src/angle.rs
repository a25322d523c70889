//! Head-tilt estimation.
//!
//! The raw angle is `atan2` of the ear-to-ear delta. Exponential smoothing is
//! applied to the *wrapped* angular difference so interpolation is correct
//! across the ±π boundary, and the reported value is the median of a short
//! history window to knock out single-frame tilt spikes.

use std::f32::consts::PI;

/// History window length for the median filter.
const ANGLE_HISTORY_LEN: usize = 5;
/// Minimum samples before the median replaces the latest smoothed value.
const MEDIAN_MIN_SAMPLES: usize = 3;

/// Wrap an angular difference into (−π, π].
pub fn wrap_angle(diff: f32) -> f32 {
    let mut d = diff;
    while d > PI {
        d -= 2.0 * PI;
    }
    while d < -PI {
        d += 2.0 * PI;
    }
    d
}

/// Circularly smoothed, median-filtered head angle.
pub struct AngleTracker {
    /// EMA retention on the previous smoothed angle.
    retain: f32,
    smoothed: Option<f32>,
    history: Vec<f32>,
}

impl AngleTracker {
    pub fn new(retain: f32) -> Self {
        Self {
            retain,
            smoothed: None,
            history: Vec::with_capacity(ANGLE_HISTORY_LEN),
        }
    }

    /// Feed the raw angle for this frame and return the reported angle.
    pub fn update(&mut self, raw: f32) -> f32 {
        let smoothed = match self.smoothed {
            None => raw,
            Some(prev) => {
                let diff = wrap_angle(raw - prev);
                wrap_angle(prev + diff * (1.0 - self.retain))
            }
        };
        self.smoothed = Some(smoothed);

        // FIFO history, oldest out.
        if self.history.len() == ANGLE_HISTORY_LEN {
            self.history.remove(0);
        }
        self.history.push(smoothed);

        self.reported()
    }

    /// Median of the history once it holds enough samples; otherwise the
    /// latest smoothed value.
    pub fn reported(&self) -> f32 {
        let Some(latest) = self.smoothed else {
            return 0.0;
        };
        if self.history.len() < MEDIAN_MIN_SAMPLES {
            return latest;
        }
        let mut sorted = self.history.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        sorted[sorted.len() / 2]
    }

    pub fn reset(&mut self) {
        self.smoothed = None;
        self.history.clear();
    }

    pub fn set_retain(&mut self, retain: f32) {
        self.retain = retain;
    }
}
