//! Freehand stroke capture for handdraw layers.

use crate::layer::ControlPoint;
use kurbo::{Point, Vec2};

/// A stroke being drawn with the pointer.
#[derive(Debug, Clone, Default)]
pub struct Stroke {
    points: Vec<Point>,
    min_spacing: f64,
}

impl Stroke {
    /// Start a stroke; samples closer than `min_spacing` to the previous one
    /// are dropped.
    pub fn begin(start: Point, min_spacing: f64) -> Self {
        Self {
            points: vec![start],
            min_spacing: min_spacing.max(0.0),
        }
    }

    /// Add a sample. Returns true if it was kept.
    pub fn push(&mut self, point: Point) -> bool {
        if let Some(last) = self.points.last() {
            if last.distance(point) < self.min_spacing {
                return false;
            }
        }
        self.points.push(point);
        true
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Simplify and convert to control points.
    pub fn finish(self, tolerance: f64) -> Vec<ControlPoint> {
        simplify(&self.points, tolerance)
            .into_iter()
            .map(ControlPoint::new)
            .collect()
    }
}

/// Ramer-Douglas-Peucker simplification.
pub fn simplify(points: &[Point], tolerance: f64) -> Vec<Point> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let first = points[0];
    let last = points[points.len() - 1];
    let (split, max_dist) = points[1..points.len() - 1]
        .iter()
        .enumerate()
        .map(|(i, &p)| (i + 1, line_distance(p, first, last)))
        .fold((0, 0.0), |best, cur| if cur.1 > best.1 { cur } else { best });

    if max_dist > tolerance.max(0.0) {
        let mut left = simplify(&points[..=split], tolerance);
        let right = simplify(&points[split..], tolerance);
        left.pop();
        left.extend(right);
        left
    } else {
        vec![first, last]
    }
}

/// Perpendicular distance from `p` to the infinite line through `a` and `b`.
fn line_distance(p: Point, a: Point, b: Point) -> f64 {
    let ab: Vec2 = b - a;
    let len = ab.hypot();
    if len < f64::EPSILON {
        return p.distance(a);
    }
    (p - a).cross(ab).abs() / len
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spacing_drops_dense_samples() {
        let mut stroke = Stroke::begin(Point::new(0.0, 0.0), 2.0);
        assert!(!stroke.push(Point::new(1.0, 0.0)));
        assert!(stroke.push(Point::new(2.5, 0.0)));
        assert_eq!(stroke.len(), 2);
    }

    #[test]
    fn test_simplify_removes_near_collinear() {
        let points = vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.1),
            Point::new(2.0, 0.0),
            Point::new(3.0, 0.1),
            Point::new(4.0, 0.0),
        ];
        assert_eq!(simplify(&points, 0.5), vec![Point::new(0.0, 0.0), Point::new(4.0, 0.0)]);
    }

    #[test]
    fn test_simplify_keeps_corner() {
        let points = vec![
            Point::new(0.0, 0.0),
            Point::new(5.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 5.0),
            Point::new(10.0, 10.0),
        ];
        let out = simplify(&points, 1.0);
        assert_eq!(out, vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(10.0, 10.0)]);
    }

    #[test]
    fn test_finish_assigns_identities() {
        let mut stroke = Stroke::begin(Point::new(0.0, 0.0), 0.0);
        stroke.push(Point::new(10.0, 10.0));
        let points = stroke.finish(1.0);
        assert_eq!(points.len(), 2);
        assert!(points.iter().all(|p| p.uid.is_some()));
        assert_ne!(points[0].uid, points[1].uid);
    }
}
