//! Scale, normalization, and handle geometry helpers.
//!
//! Everything here is a pure function of its arguments. Any radius used for
//! drawing or hit-testing goes through [`canvas_scale`], which bridges
//! normalized background space and canvas pixels.

use crate::background::Background;
use crate::config::EditorConfig;
use crate::layer::ControlPoint;
use kurbo::{Point, Vec2};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI, TAU};

/// Smallest allowed point scale.
pub const POINT_SCALE_MIN: f64 = 0.2;
/// Largest allowed point scale.
pub const POINT_SCALE_MAX: f64 = 3.0;

/// Clamp a point scale into range; non-finite values become 1.
pub fn clamp_point_scale(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(POINT_SCALE_MIN, POINT_SCALE_MAX)
    } else {
        1.0
    }
}

/// Resolve the effective scale from the fields a stored point may carry.
///
/// Box points prefer `box_scale`, then `point_scale`; other points prefer
/// `point_scale`. The generic `scale` is the last resort.
pub fn resolve_point_scale(
    box_scale: Option<f64>,
    point_scale: Option<f64>,
    scale: Option<f64>,
    for_box: bool,
) -> f64 {
    let preferred = if for_box {
        box_scale.or(point_scale)
    } else {
        point_scale
    };
    clamp_point_scale(preferred.or(scale).unwrap_or(1.0))
}

/// Effective scale of a working point.
pub fn point_scale(point: &ControlPoint) -> f64 {
    clamp_point_scale(point.scale)
}

/// Scale of the active background placement.
pub fn canvas_scale(background: &Background, video_ready: bool) -> f64 {
    let scale = background.active(video_ready).scale;
    if scale.is_finite() && scale > 0.0 { scale } else { 1.0 }
}

/// Map a native-pixel point into normalized [0,1] space.
pub fn normalize(point: Point, width: f64, height: f64) -> Point {
    Point::new(point.x / safe_extent(width), point.y / safe_extent(height))
}

/// Map a normalized point into native pixels.
pub fn denormalize(point: Point, width: f64, height: f64) -> Point {
    Point::new(point.x * safe_extent(width), point.y * safe_extent(height))
}

/// Like [`denormalize`], snapped to whole pixels.
pub fn denormalize_rounded(point: Point, width: f64, height: f64) -> Point {
    let p = denormalize(point, width, height);
    Point::new(p.x.round(), p.y.round())
}

fn safe_extent(extent: f64) -> f64 {
    if extent.is_finite() && extent > 0.0 { extent } else { 1.0 }
}

/// Radius of a spline point in canvas pixels.
pub fn scaled_point_radius(point: &ControlPoint, base_radius: f64, canvas_scale: f64) -> f64 {
    base_radius * point_scale(point) * canvas_scale
}

/// Half-extent of a box point in canvas pixels.
pub fn scaled_box_radius(point: &ControlPoint, config: &EditorConfig, canvas_scale: f64) -> f64 {
    scaled_point_radius(point, config.box_radius, canvas_scale)
}

/// Unit direction a rotation points to; rotation 0 is straight up.
pub fn rotation_direction(rotation: f64) -> Vec2 {
    Vec2::new(rotation.sin(), -rotation.cos())
}

/// Rotation handle of a box point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxHandleGeometry {
    /// Where the stem leaves the box edge.
    pub base: Point,
    /// Center of the handle knob.
    pub tip: Point,
    /// Knob radius in canvas pixels.
    pub knob_radius: f64,
}

/// Compute the rotation handle for a box point.
///
/// The stem length is `handle_length` in unscaled units: the box radius is
/// divided by the canvas scale, the fixed length is added, and the sum is
/// scaled back. The stem therefore tracks the background scale but never
/// the point's own scale.
pub fn compute_box_handle_geometry(
    point: &ControlPoint,
    config: &EditorConfig,
    canvas_scale: f64,
) -> BoxHandleGeometry {
    let radius = scaled_box_radius(point, config, canvas_scale);
    let dir = rotation_direction(point.rotation);
    let local_tip = radius / canvas_scale + config.handle_length;
    BoxHandleGeometry {
        base: point.position + dir * radius,
        tip: point.position + dir * (local_tip * canvas_scale),
        knob_radius: config.handle_radius * canvas_scale,
    }
}

/// Angle of `pointer` around `center` in handle convention (0 = up).
pub fn handle_angle(center: Point, pointer: Point) -> f64 {
    let d = pointer - center;
    d.y.atan2(d.x) + FRAC_PI_2
}

/// Unwrap an angle delta across the ±π boundary.
pub fn unwrap_delta(mut delta: f64) -> f64 {
    if delta > PI {
        delta -= TAU;
    } else if delta < -PI {
        delta += TAU;
    }
    delta
}

/// Signed shortest angular difference from `from` to `to`, in (-π, π].
pub fn shortest_angle_delta(from: f64, to: f64) -> f64 {
    let delta = (to - from).rem_euclid(TAU);
    if delta > PI { delta - TAU } else { delta }
}

/// Chebyshev (max-axis) distance.
pub fn chebyshev_distance(a: Point, b: Point) -> f64 {
    (a.x - b.x).abs().max((a.y - b.y).abs())
}

/// Euclidean distance from `p` to the segment `a`-`b`.
pub fn point_segment_distance(p: Point, a: Point, b: Point) -> f64 {
    let ab = b - a;
    let len_sq = ab.hypot2();
    if len_sq < 1e-12 {
        return p.distance(a);
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    p.distance(a + ab * t)
}

/// Mix `damping` of the raw ratio with the identity.
pub fn damped_factor(raw: f64, damping: f64) -> f64 {
    1.0 + (raw - 1.0) * damping
}

/// Force a distance to at least `min` in magnitude, keeping its sign.
pub fn with_min_baseline(distance: f64, min: f64) -> f64 {
    if distance.abs() < min {
        if distance < 0.0 { -min } else { min }
    } else {
        distance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::Placement;

    #[test]
    fn test_clamp_point_scale_idempotent() {
        for v in [-5.0, 0.0, 0.1, 0.2, 0.7, 1.0, 2.99, 3.0, 7.5, f64::NAN, f64::INFINITY] {
            let once = clamp_point_scale(v);
            assert_eq!(clamp_point_scale(once), once);
            assert!((POINT_SCALE_MIN..=POINT_SCALE_MAX).contains(&once));
        }
    }

    #[test]
    fn test_clamp_point_scale_identity_in_range() {
        let mut v = POINT_SCALE_MIN;
        while v <= POINT_SCALE_MAX {
            assert_eq!(clamp_point_scale(v), v);
            v += 0.037;
        }
    }

    #[test]
    fn test_clamp_point_scale_non_finite_defaults() {
        assert_eq!(clamp_point_scale(f64::NAN), 1.0);
        assert_eq!(clamp_point_scale(f64::NEG_INFINITY), 1.0);
    }

    #[test]
    fn test_resolve_point_scale_preference() {
        assert_eq!(resolve_point_scale(Some(2.0), Some(1.5), Some(0.5), true), 2.0);
        assert_eq!(resolve_point_scale(Some(2.0), Some(1.5), Some(0.5), false), 1.5);
        assert_eq!(resolve_point_scale(None, None, Some(0.5), true), 0.5);
        assert_eq!(resolve_point_scale(None, None, None, true), 1.0);
        assert_eq!(resolve_point_scale(Some(10.0), None, None, true), 3.0);
    }

    #[test]
    fn test_canvas_scale_sources() {
        let mut background = Background::default();
        assert_eq!(canvas_scale(&background, false), 1.0);

        background.image = Some(Placement::new(100.0, 100.0).with_transform(0.5, Vec2::ZERO));
        background.video = Some(Placement::new(100.0, 100.0).with_transform(2.0, Vec2::ZERO));
        assert_eq!(canvas_scale(&background, false), 0.5);
        assert_eq!(canvas_scale(&background, true), 2.0);
    }

    #[test]
    fn test_normalize_roundtrip_float_dims() {
        let (w, h) = (1280.5, 719.25);
        for &(x, y) in &[(0.0, 0.0), (10.3, 500.7), (1280.5, 719.25), (640.123, 1.0)] {
            let p = Point::new(x, y);
            let back = denormalize(normalize(p, w, h), w, h);
            assert!((back.x - p.x).abs() < 1e-6);
            assert!((back.y - p.y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_normalize_roundtrip_integer_dims_rounded() {
        let (w, h) = (1920.0, 1080.0);
        for x in (0..=1920).step_by(97) {
            for y in (0..=1080).step_by(83) {
                let p = Point::new(x as f64, y as f64);
                let back = denormalize_rounded(normalize(p, w, h), w, h);
                assert_eq!(back, p);
            }
        }
    }

    #[test]
    fn test_handle_stem_ignores_point_scale() {
        let config = EditorConfig::default();
        let mut point = ControlPoint::new(Point::new(100.0, 100.0));
        for (point_scale, canvas) in [(1.0, 1.0), (2.5, 1.0), (0.5, 2.0), (3.0, 0.25)] {
            point.scale = point_scale;
            let geometry = compute_box_handle_geometry(&point, &config, canvas);
            let stem = geometry.base.distance(geometry.tip);
            assert!((stem - config.handle_length * canvas).abs() < 1e-9);
        }
    }

    #[test]
    fn test_handle_points_along_rotation() {
        let config = EditorConfig::default();
        let mut point = ControlPoint::new(Point::new(0.0, 0.0));
        let up = compute_box_handle_geometry(&point, &config, 1.0);
        assert!(up.tip.y < 0.0 && up.tip.x.abs() < 1e-9);

        point.rotation = FRAC_PI_2;
        let right = compute_box_handle_geometry(&point, &config, 1.0);
        assert!(right.tip.x > 0.0 && right.tip.y.abs() < 1e-9);
    }

    #[test]
    fn test_handle_angle_matches_direction() {
        let center = Point::new(10.0, 10.0);
        let angle = handle_angle(center, Point::new(10.0, 0.0));
        assert!(angle.abs() < 1e-12);
        let angle = handle_angle(center, Point::new(20.0, 10.0));
        assert!((angle - FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn test_unwrap_delta() {
        assert!((unwrap_delta(1.9 * PI) - (-0.1 * PI)).abs() < 1e-12);
        assert!((unwrap_delta(-1.9 * PI) - 0.1 * PI).abs() < 1e-12);
        assert_eq!(unwrap_delta(0.5), 0.5);
    }

    #[test]
    fn test_shortest_angle_delta() {
        assert!((shortest_angle_delta(3.0, -3.0) - (TAU - 6.0)).abs() < 1e-12);
        assert!((shortest_angle_delta(0.0, 1.0) - 1.0).abs() < 1e-12);
        assert!((shortest_angle_delta(0.0, 4.0 * PI + 0.5) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_point_segment_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(10.0, 0.0);
        assert!((point_segment_distance(Point::new(5.0, 3.0), a, b) - 3.0).abs() < 1e-12);
        assert!((point_segment_distance(Point::new(-4.0, 3.0), a, b) - 5.0).abs() < 1e-12);
        assert!((point_segment_distance(Point::new(1.0, 1.0), a, a) - 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_min_baseline_keeps_sign() {
        assert_eq!(with_min_baseline(0.0, 10.0), 10.0);
        assert_eq!(with_min_baseline(-3.0, 10.0), -10.0);
        assert_eq!(with_min_baseline(25.0, 10.0), 25.0);
    }
}
