//! Keyframe interpolation and frame/time mapping for box layers.
//!
//! Keys are kept sorted by frame with a stable sort, so keys that share a
//! frame stay in insertion order. At a shared frame the later key wins; a
//! frame strictly between two groups interpolates from the last key of the
//! earlier group toward the first key of the later one.

use crate::geometry::{clamp_point_scale, shortest_angle_delta};
use crate::layer::BoxKey;
use serde::{Deserialize, Serialize};

/// Interpolated box state at a frame, in normalized space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeySample {
    pub x: f64,
    pub y: f64,
    pub scale: f64,
    pub rotation: f64,
}

impl From<&BoxKey> for KeySample {
    fn from(key: &BoxKey) -> Self {
        Self {
            x: key.x,
            y: key.y,
            scale: clamp_point_scale(key.scale),
            rotation: finite_or_zero(key.rotation),
        }
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

/// Global timeline position shared by all box layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeline {
    /// Current frame (1-based).
    pub frame: u32,
    pub max_frames: u32,
}

impl Timeline {
    pub fn new(max_frames: u32) -> Self {
        Self {
            frame: 1,
            max_frames: max_frames.max(1),
        }
    }

    /// Clamp and store a frame, returning the committed value.
    pub fn seek(&mut self, frame: i64) -> u32 {
        self.frame = clamp_frame(frame, self.max_frames);
        self.frame
    }
}

/// Stable sort by frame.
pub fn sort_keys(keys: &mut [BoxKey]) {
    keys.sort_by_key(|k| k.frame);
}

/// Clamp a frame number into `[1, max_frames]`.
pub fn clamp_frame(frame: i64, max_frames: u32) -> u32 {
    frame.clamp(1, i64::from(max_frames.max(1))) as u32
}

/// Interpolate along the shortest angular path from `from` to `to`.
///
/// The result starts at the raw `from` value, so accumulated multi-turn
/// rotations on keys are preserved at `t = 0`.
pub fn lerp_rotation(from: f64, to: f64, t: f64) -> f64 {
    from + shortest_angle_delta(from, to) * t
}

/// Sample the keys at `frame`.
///
/// Frames before the first key hold the first key; frames at or after the
/// last key hold the last key. Returns `None` when there are no keys.
pub fn sample(keys: &[BoxKey], frame: u32) -> Option<KeySample> {
    let first = keys.first()?;
    let idx = keys.partition_point(|k| k.frame <= frame);
    if idx == 0 {
        return Some(first.into());
    }
    if idx == keys.len() {
        return keys.last().map(KeySample::from);
    }

    let k0 = KeySample::from(&keys[idx - 1]);
    let k1 = KeySample::from(&keys[idx]);
    let span = f64::from(keys[idx].frame - keys[idx - 1].frame);
    let t = f64::from(frame - keys[idx - 1].frame) / span;

    Some(KeySample {
        x: k0.x + (k1.x - k0.x) * t,
        y: k0.y + (k1.y - k0.y) * t,
        scale: clamp_point_scale(k0.scale + (k1.scale - k0.scale) * t),
        rotation: lerp_rotation(k0.rotation, k1.rotation, t),
    })
}

/// Insert a key keeping frame order, or replace the first key at that frame.
/// Returns the index of the key.
pub fn upsert_key(keys: &mut Vec<BoxKey>, key: BoxKey) -> usize {
    if let Some(idx) = keys.iter().position(|k| k.frame == key.frame) {
        keys[idx] = key;
        return idx;
    }
    let idx = keys.partition_point(|k| k.frame < key.frame);
    keys.insert(idx, key);
    idx
}

/// Remove the first key at `frame`.
pub fn remove_key(keys: &mut Vec<BoxKey>, frame: u32) -> Option<BoxKey> {
    let idx = keys.iter().position(|k| k.frame == frame)?;
    Some(keys.remove(idx))
}

/// Frame of the first key strictly after `frame`.
pub fn next_key_frame(keys: &[BoxKey], frame: u32) -> Option<u32> {
    keys.iter().map(|k| k.frame).find(|&f| f > frame)
}

/// Frame of the last key strictly before `frame`.
pub fn prev_key_frame(keys: &[BoxKey], frame: u32) -> Option<u32> {
    keys.iter().rev().map(|k| k.frame).find(|&f| f < frame)
}

/// Map a frame to media time: frame 1 is 0 and the last frame is
/// `duration`, linearly in between.
pub fn frame_to_time(frame: u32, num_frames: u32, duration: f64) -> f64 {
    if !(duration.is_finite() && duration > 0.0) {
        return 0.0;
    }
    let span = f64::from(num_frames.saturating_sub(1).max(1));
    let time = f64::from(frame.saturating_sub(1)) / span * duration;
    time.clamp(0.0, duration)
}

/// Frame reached by a horizontal scrub of `delta_x` pixels from `start`.
pub fn scrub_frame(start: u32, delta_x: f64, pixels_per_frame: f64, max_frames: u32) -> u32 {
    let frames = if pixels_per_frame > 0.0 && delta_x.is_finite() {
        (delta_x / pixels_per_frame).round() as i64
    } else {
        0
    };
    clamp_frame(i64::from(start) + frames, max_frames)
}
