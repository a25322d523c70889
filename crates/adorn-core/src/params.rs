//! Tunable pipeline parameters.
//!
//! One parameter set drives the whole pipeline; the defaults are the values
//! the overlay was tuned with. All fields are plain data so they can be
//! loaded from a TOML file or adjusted at runtime through the engine.

use serde::{Deserialize, Serialize};

/// Tunable overlay parameters.
///
/// Smoothing values are *retention* factors: the weight kept on the previous
/// smoothed value, with `1 - retention` applied to the new raw sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TryOnParams {
    /// Per-landmark EMA retention applied to the raw mesh.
    pub landmark_smooth: f32,
    /// Anchor-point (ear/neck) EMA retention.
    pub pos_smooth: f32,
    /// Inter-ear distance EMA retention.
    pub ear_dist_smooth: f32,
    /// Head-angle EMA retention (applied to the wrapped angular difference).
    pub angle_smooth: f32,
    /// Earring width as a fraction of the inter-ear distance.
    pub ear_size_factor: f32,
    /// Necklace width as a fraction of the inter-ear distance.
    pub neck_scale: f32,
    /// Necklace vertical drop below the chin anchor, as a fraction of the
    /// inter-ear distance.
    pub neck_y_offset: f32,
    /// Consecutive missed detections before smoothing state is discarded.
    pub reset_after_missed: u32,
}

impl Default for TryOnParams {
    fn default() -> Self {
        Self {
            landmark_smooth: 0.72,
            pos_smooth: 0.88,
            ear_dist_smooth: 0.90,
            angle_smooth: 0.82,
            ear_size_factor: 0.24,
            neck_scale: 1.15,
            neck_y_offset: 0.95,
            reset_after_missed: 3,
        }
    }
}

impl TryOnParams {
    /// Parse parameters from a TOML document. Missing fields take defaults.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Serialize to TOML for writing back to a params file.
    pub fn to_toml(&self) -> String {
        // Serialization of a flat struct of floats/ints cannot fail.
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Clamp smoothing factors into [0, 1) so a bad params file cannot make
    /// the EMAs diverge or freeze.
    pub fn sanitized(mut self) -> Self {
        for v in [
            &mut self.landmark_smooth,
            &mut self.pos_smooth,
            &mut self.ear_dist_smooth,
            &mut self.angle_smooth,
        ] {
            *v = v.clamp(0.0, 0.999);
        }
        self.ear_size_factor = self.ear_size_factor.max(0.0);
        self.neck_scale = self.neck_scale.max(0.0);
        self
    }
}
