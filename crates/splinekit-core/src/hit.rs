//! Point, handle, and layer picking.

use crate::geometry::{
    BoxHandleGeometry, chebyshev_distance, point_segment_distance, scaled_point_radius,
};
use crate::layer::{ControlPoint, Layer, LayerId, PointId};
use kurbo::Point;

/// Extra grab margin around the rotation handle knob, in canvas pixels.
pub const HANDLE_HIT_SLOP: f64 = 4.0;

/// Distances closer than this count as equal when breaking ties.
const TIE_EPSILON: f64 = 1e-9;

/// Per-point hit radius: the base radius scaled by the point's own scale
/// and the canvas scale.
#[derive(Debug, Clone, Copy)]
pub struct HitRadius {
    pub base: f64,
    pub canvas_scale: f64,
}

impl HitRadius {
    pub fn radius_for(&self, point: &ControlPoint) -> f64 {
        scaled_point_radius(point, self.base, self.canvas_scale)
    }
}

/// Result of [`pick_point`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointHit {
    pub index: usize,
    pub radius: f64,
    pub distance: f64,
}

/// Find the point under `coords`.
///
/// Uses Chebyshev distance against each point's own radius (box handles are
/// square). The closest point wins; on a tie the smaller radius wins.
pub fn pick_point(points: &[ControlPoint], coords: Point, radius: &HitRadius) -> Option<PointHit> {
    let mut best: Option<PointHit> = None;
    for (index, point) in points.iter().enumerate() {
        let r = radius.radius_for(point);
        let distance = chebyshev_distance(coords, point.position);
        if distance > r {
            continue;
        }
        let candidate = PointHit { index, radius: r, distance };
        best = match best {
            None => Some(candidate),
            Some(current) => {
                let closer = distance < current.distance - TIE_EPSILON;
                let tie = (distance - current.distance).abs() <= TIE_EPSILON;
                if closer || (tie && r < current.radius) {
                    Some(candidate)
                } else {
                    Some(current)
                }
            }
        };
    }
    best
}

/// Whether `coords` grabs the rotation handle knob.
pub fn hit_box_handle(handle: &BoxHandleGeometry, coords: Point) -> bool {
    chebyshev_distance(coords, handle.tip) <= handle.knob_radius + HANDLE_HIT_SLOP
}

/// Proximity thresholds for picking inactive layers.
#[derive(Debug, Clone, Copy)]
pub struct LayerThresholds {
    /// Threshold for points after the first and for segments.
    pub default: f64,
    /// Threshold for the first point (the start-of-curve marker).
    pub first_point: f64,
}

/// Result of [`pick_layer`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerHit {
    pub layer: LayerId,
    pub distance: f64,
}

/// Nearest layer to `coords` by Euclidean distance to its points and
/// segments, among the given (inactive) layers.
pub fn pick_layer<'a>(
    layers: impl IntoIterator<Item = &'a Layer>,
    coords: Point,
    thresholds: LayerThresholds,
) -> Option<LayerHit> {
    let mut best: Option<LayerHit> = None;
    for layer in layers {
        let Some(distance) = layer_distance(&layer.outline(), coords, thresholds) else {
            continue;
        };
        if best.is_none_or(|b| distance < b.distance) {
            best = Some(LayerHit { layer: layer.id(), distance });
        }
    }
    best
}

/// Smallest in-threshold distance from `coords` to an outline.
fn layer_distance(outline: &[Point], coords: Point, thresholds: LayerThresholds) -> Option<f64> {
    let mut best: Option<f64> = None;
    let mut consider = |distance: f64, threshold: f64| {
        if distance <= threshold && best.is_none_or(|b| distance < b) {
            best = Some(distance);
        }
    };

    for (i, p) in outline.iter().enumerate() {
        let threshold = if i == 0 { thresholds.first_point } else { thresholds.default };
        consider(coords.distance(*p), threshold);
    }
    for pair in outline.windows(2) {
        consider(point_segment_distance(coords, pair[0], pair[1]), thresholds.default);
    }
    best
}

/// A possibly stale reference to a point captured at gesture start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointRef {
    pub uid: Option<PointId>,
    pub index: Option<usize>,
    pub position: Point,
}

impl PointRef {
    pub fn of(points: &[ControlPoint], index: usize) -> Option<Self> {
        let point = points.get(index)?;
        Some(Self {
            uid: point.uid,
            index: Some(index),
            position: point.position,
        })
    }
}

/// Resolve a point reference to its current index.
///
/// Tries, in order: the stable `uid`; the remembered slot if it still holds
/// a point at the same position; the nearest point within `epsilon`
/// (squared distance); the nearest point overall.
pub fn resolve_point_index(points: &[ControlPoint], target: &PointRef, epsilon: f64) -> Option<usize> {
    if points.is_empty() {
        return None;
    }

    if let Some(uid) = target.uid {
        if let Some(idx) = points.iter().position(|p| p.uid == Some(uid)) {
            return Some(idx);
        }
    }

    if let Some(idx) = target.index {
        if points.get(idx).is_some_and(|p| p.position == target.position) {
            return Some(idx);
        }
    }

    let (nearest, dist_sq) = points
        .iter()
        .enumerate()
        .map(|(i, p)| (i, (p.position - target.position).hypot2()))
        .min_by(|a, b| a.1.total_cmp(&b.1))?;
    if dist_sq > epsilon {
        log::debug!("Point resolved by nearest fallback ({dist_sq:.3}px² away)");
    }
    Some(nearest)
}
