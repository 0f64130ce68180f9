//! Layer and point data model.
//!
//! A layer is one of three kinds: a plain spline, a freehand drawing, or a
//! box keyframe track. Spline and handdraw points live in canvas pixel space
//! while the session is running; box keyframes are kept normalized because
//! they are the source of truth for the materialized points.

use crate::background::Placement;
use crate::timeline;
use kurbo::Point;
use peniko::Color;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identity of a control point.
pub type PointId = Uuid;

/// Stable identity of a layer.
pub type LayerId = Uuid;

/// A control point in canvas pixel space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlPoint {
    pub position: Point,
    /// Raw scale; always read through [`crate::geometry::point_scale`].
    pub scale: f64,
    /// Unbounded radian accumulator.
    pub rotation: f64,
    pub highlighted: bool,
    /// Drag-lock marker, set only while a gesture holds the point.
    #[serde(skip)]
    pub fix: bool,
    /// Absent on legacy data.
    pub uid: Option<PointId>,
}

impl ControlPoint {
    /// Create a fresh point with a new identity.
    pub fn new(position: Point) -> Self {
        Self {
            position,
            scale: 1.0,
            rotation: 0.0,
            highlighted: false,
            fix: false,
            uid: Some(Uuid::new_v4()),
        }
    }

    /// Create a point without identity, as read from legacy data.
    pub fn legacy(position: Point) -> Self {
        Self {
            uid: None,
            ..Self::new(position)
        }
    }
}

/// Serializable color representation (RGBA8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl SerializableColor {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

impl From<Color> for SerializableColor {
    fn from(color: Color) -> Self {
        let rgba = color.to_rgba8();
        Self {
            r: rgba.r,
            g: rgba.g,
            b: rgba.b,
            a: rgba.a,
        }
    }
}

impl From<SerializableColor> for Color {
    fn from(color: SerializableColor) -> Self {
        Color::from_rgba8(color.r, color.g, color.b, color.a)
    }
}

/// Stroke styling shared by all layer kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerStyle {
    pub color: SerializableColor,
    pub width: f64,
}

impl Default for LayerStyle {
    fn default() -> Self {
        Self {
            color: SerializableColor::new(31, 119, 180, 255),
            width: 3.0,
        }
    }
}

/// Curve interpolation of a spline layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    #[default]
    Linear,
    Cardinal,
    Basis,
    Points,
    Box,
}

/// Easing applied by the backend when walking a spline over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Easing {
    #[default]
    Linear,
    In,
    Out,
    InOut,
}

/// Layer discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerKind {
    Spline,
    Handdraw,
    Box,
}

/// A plain spline: ordered control points plus timing metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplineLayer {
    pub id: LayerId,
    pub name: String,
    pub style: LayerStyle,
    pub interpolation: Interpolation,
    pub points: Vec<ControlPoint>,
    pub repeat: u32,
    pub offset: i32,
    pub a_pause: u32,
    pub z_pause: u32,
    pub easing: Easing,
    pub scale: f64,
    pub driven: bool,
}

impl SplineLayer {
    pub fn new(name: impl Into<String>, points: Vec<ControlPoint>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            style: LayerStyle::default(),
            interpolation: Interpolation::default(),
            points,
            repeat: 1,
            offset: 0,
            a_pause: 0,
            z_pause: 0,
            easing: Easing::default(),
            scale: 1.0,
            driven: false,
        }
    }
}

/// A freehand drawing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HanddrawLayer {
    pub id: LayerId,
    pub name: String,
    pub style: LayerStyle,
    pub points: Vec<ControlPoint>,
}

impl HanddrawLayer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            style: LayerStyle {
                width: 2.0,
                ..LayerStyle::default()
            },
            points: Vec::new(),
        }
    }
}

/// A keyframe of a box layer, in normalized background space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxKey {
    pub frame: u32,
    pub x: f64,
    pub y: f64,
    pub scale: f64,
    pub rotation: f64,
}

/// An oriented box keyframe track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxLayer {
    pub id: LayerId,
    pub name: String,
    pub style: LayerStyle,
    /// Sorted ascending by frame.
    pub keys: Vec<BoxKey>,
    /// Current frame of this layer (1-based).
    pub timeline_point: u32,
    pub enabled: bool,
    pub ref_attachment: Option<serde_json::Value>,
    pub ref_selection: Option<serde_json::Value>,
    /// Interpolated point at `timeline_point`.
    #[serde(skip)]
    pub active_point: Option<ControlPoint>,
    /// One point per key, materialized in canvas space.
    #[serde(skip)]
    pub working_points: Vec<ControlPoint>,
}

impl BoxLayer {
    pub fn new(name: impl Into<String>, keys: Vec<BoxKey>) -> Self {
        let mut layer = Self {
            id: Uuid::new_v4(),
            name: name.into(),
            style: LayerStyle {
                color: SerializableColor::new(214, 39, 40, 255),
                ..LayerStyle::default()
            },
            keys,
            timeline_point: 1,
            enabled: true,
            ref_attachment: None,
            ref_selection: None,
            active_point: None,
            working_points: Vec::new(),
        };
        timeline::sort_keys(&mut layer.keys);
        layer
    }

    /// Rebuild the working points and the active point from the keys.
    pub fn materialize(&mut self, placement: &Placement) {
        self.working_points = self
            .keys
            .iter()
            .map(|key| {
                let mut point = ControlPoint::new(placement.to_canvas(Point::new(key.x, key.y)));
                point.scale = key.scale;
                point.rotation = key.rotation;
                point
            })
            .collect();
        self.refresh_active_point(placement);
    }

    /// Recompute only the interpolated point at the current frame.
    pub fn refresh_active_point(&mut self, placement: &Placement) {
        self.active_point = self.sample_point(&self.keys, placement);
    }

    /// Recompute the active point as if the working points were already
    /// written back, leaving the keys untouched.
    pub fn preview_active_point(&mut self, placement: &Placement) {
        let mut keys = self.keys.clone();
        write_points_into_keys(&mut keys, &self.working_points, placement);
        self.active_point = self.sample_point(&keys, placement);
    }

    fn sample_point(&self, keys: &[BoxKey], placement: &Placement) -> Option<ControlPoint> {
        let uid = self.active_point.as_ref().and_then(|p| p.uid);
        timeline::sample(keys, self.timeline_point).map(|sample| {
            let mut point = ControlPoint::new(placement.to_canvas(Point::new(sample.x, sample.y)));
            point.scale = sample.scale;
            point.rotation = sample.rotation;
            if uid.is_some() {
                point.uid = uid;
            }
            point
        })
    }

    /// Write the working points back into the keys, preserving frames.
    pub fn update_keys_from_working_points(&mut self, placement: &Placement) {
        write_points_into_keys(&mut self.keys, &self.working_points, placement);
    }

    /// Index of the first key at `frame`, if any.
    pub fn key_index_at(&self, frame: u32) -> Option<usize> {
        self.keys.iter().position(|k| k.frame == frame)
    }
}

fn write_points_into_keys(keys: &mut [BoxKey], points: &[ControlPoint], placement: &Placement) {
    for (key, point) in keys.iter_mut().zip(points) {
        let normalized = placement.to_normalized(point.position);
        key.x = normalized.x;
        key.y = normalized.y;
        key.scale = crate::geometry::clamp_point_scale(point.scale);
        key.rotation = point.rotation;
    }
}

/// A layer ("widget value").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Layer {
    Spline(SplineLayer),
    Handdraw(HanddrawLayer),
    Box(BoxLayer),
}

impl Layer {
    pub fn id(&self) -> LayerId {
        match self {
            Layer::Spline(l) => l.id,
            Layer::Handdraw(l) => l.id,
            Layer::Box(l) => l.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Layer::Spline(l) => &l.name,
            Layer::Handdraw(l) => &l.name,
            Layer::Box(l) => &l.name,
        }
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        match self {
            Layer::Spline(l) => l.name = name,
            Layer::Handdraw(l) => l.name = name,
            Layer::Box(l) => l.name = name,
        }
    }

    pub fn kind(&self) -> LayerKind {
        match self {
            Layer::Spline(_) => LayerKind::Spline,
            Layer::Handdraw(_) => LayerKind::Handdraw,
            Layer::Box(_) => LayerKind::Box,
        }
    }

    pub fn style(&self) -> &LayerStyle {
        match self {
            Layer::Spline(l) => &l.style,
            Layer::Handdraw(l) => &l.style,
            Layer::Box(l) => &l.style,
        }
    }

    /// The editable point array: spline/handdraw points, or the box layer's
    /// materialized key points.
    pub fn points(&self) -> &[ControlPoint] {
        match self {
            Layer::Spline(l) => &l.points,
            Layer::Handdraw(l) => &l.points,
            Layer::Box(l) => &l.working_points,
        }
    }

    pub fn points_mut(&mut self) -> &mut Vec<ControlPoint> {
        match self {
            Layer::Spline(l) => &mut l.points,
            Layer::Handdraw(l) => &mut l.points,
            Layer::Box(l) => &mut l.working_points,
        }
    }

    /// Points used for proximity picking of inactive layers.
    pub fn outline(&self) -> Vec<Point> {
        match self {
            Layer::Box(l) => l.active_point.iter().map(|p| p.position).collect(),
            _ => self.points().iter().map(|p| p.position).collect(),
        }
    }

    pub fn as_box(&self) -> Option<&BoxLayer> {
        match self {
            Layer::Box(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_box_mut(&mut self) -> Option<&mut BoxLayer> {
        match self {
            Layer::Box(l) => Some(l),
            _ => None,
        }
    }

    pub fn is_box(&self) -> bool {
        matches!(self, Layer::Box(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(frame: u32, x: f64) -> BoxKey {
        BoxKey { frame, x, y: 0.5, scale: 1.0, rotation: 0.0 }
    }

    #[test]
    fn test_box_layer_sorts_keys() {
        let layer = BoxLayer::new("box", vec![key(10, 0.9), key(1, 0.1), key(5, 0.5)]);
        let frames: Vec<u32> = layer.keys.iter().map(|k| k.frame).collect();
        assert_eq!(frames, vec![1, 5, 10]);
    }

    #[test]
    fn test_materialize_maps_keys_to_canvas() {
        let placement = Placement::new(200.0, 100.0);
        let mut layer = BoxLayer::new("box", vec![key(1, 0.25), key(10, 0.75)]);
        layer.materialize(&placement);

        assert_eq!(layer.working_points.len(), 2);
        assert!((layer.working_points[0].position.x - 50.0).abs() < 1e-9);
        assert!((layer.working_points[1].position.x - 150.0).abs() < 1e-9);
        let active = layer.active_point.as_ref().unwrap();
        assert!((active.position.x - 50.0).abs() < 1e-9);
        assert!((active.position.y - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_write_back_preserves_frames() {
        let placement = Placement::new(200.0, 100.0);
        let mut layer = BoxLayer::new("box", vec![key(1, 0.25), key(10, 0.75)]);
        layer.materialize(&placement);
        layer.working_points[1].position = Point::new(100.0, 25.0);
        layer.working_points[1].scale = 9.0;
        layer.update_keys_from_working_points(&placement);

        assert_eq!(layer.keys[1].frame, 10);
        assert!((layer.keys[1].x - 0.5).abs() < 1e-9);
        assert!((layer.keys[1].y - 0.25).abs() < 1e-9);
        assert!((layer.keys[1].scale - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_color_roundtrip_through_peniko() {
        let color = SerializableColor::new(10, 20, 30, 255);
        let back: SerializableColor = Color::from(color).into();
        assert_eq!(color, back);
    }

    #[test]
    fn test_layer_dispatch() {
        let layer = Layer::Handdraw(HanddrawLayer::new("ink"));
        assert_eq!(layer.kind(), LayerKind::Handdraw);
        assert_eq!(layer.name(), "ink");
        assert!(layer.points().is_empty());
        assert!(layer.as_box().is_none());
    }
}
