//! Editor configuration supplied by the host widget.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config value for `{field}`: {value}")]
    Invalid { field: &'static str, value: f64 },
}

/// Tunables for hit-testing, gestures, and the timeline.
///
/// Every field has a default, so hosts only need to send overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Base radius of a spline control point, in canvas pixels at scale 1.
    pub point_radius: f64,
    /// Base half-extent of a box-layer point, in canvas pixels at scale 1.
    pub box_radius: f64,
    /// Length of the rotation handle stem beyond the box edge.
    pub handle_length: f64,
    /// Radius of the rotation handle knob.
    pub handle_radius: f64,
    /// Proximity threshold for picking inactive layers.
    pub layer_hit_threshold: f64,
    /// Larger threshold for the first point of an inactive layer.
    pub first_point_hit_threshold: f64,
    /// Squared-distance epsilon for position-based point identity.
    pub identity_epsilon: f64,
    /// Horizontal pixels per frame while scrubbing.
    pub pixels_per_frame: f64,
    /// Number of frames in the timeline (frames are 1-based).
    pub max_frames: u32,
    /// Fraction of the raw distance ratio kept by damped scaling.
    pub scale_damping: f64,
    /// Minimum distance baseline before dividing by a pointer distance.
    pub min_baseline: f64,
    /// Lower bound of the group scale factor.
    pub group_scale_min: f64,
    /// Upper bound of the group scale factor.
    pub group_scale_max: f64,
    /// Maximum number of undo snapshots.
    pub undo_depth: usize,
    /// Minimum spacing between captured freehand samples.
    pub freehand_spacing: f64,
    /// Simplification tolerance applied to finished freehand strokes.
    pub freehand_tolerance: f64,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            point_radius: 6.0,
            box_radius: 20.0,
            handle_length: 30.0,
            handle_radius: 5.0,
            layer_hit_threshold: 15.0,
            first_point_hit_threshold: 22.0,
            identity_epsilon: 0.25,
            pixels_per_frame: 10.0,
            max_frames: 100,
            scale_damping: 0.1,
            min_baseline: 10.0,
            group_scale_min: 0.1,
            group_scale_max: 10.0,
            undo_depth: 50,
            freehand_spacing: 2.0,
            freehand_tolerance: 1.0,
        }
    }
}

impl EditorConfig {
    /// Parse a config from host-supplied JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would break hit-testing or timeline math.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("point_radius", self.point_radius),
            ("box_radius", self.box_radius),
            ("handle_length", self.handle_length),
            ("layer_hit_threshold", self.layer_hit_threshold),
            ("first_point_hit_threshold", self.first_point_hit_threshold),
            ("pixels_per_frame", self.pixels_per_frame),
            ("min_baseline", self.min_baseline),
            ("group_scale_min", self.group_scale_min),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Invalid { field, value });
            }
        }
        if self.max_frames == 0 {
            return Err(ConfigError::Invalid { field: "max_frames", value: 0.0 });
        }
        if self.group_scale_max < self.group_scale_min {
            return Err(ConfigError::Invalid {
                field: "group_scale_max",
                value: self.group_scale_max,
            });
        }
        Ok(())
    }
}
