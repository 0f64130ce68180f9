//! Persisted document form.
//!
//! Geometry is stored normalized against the active background so it
//! survives background changes. Reading is lenient: a malformed number
//! falls back to its default instead of failing the whole document, and
//! legacy field names are accepted.

use crate::background::Placement;
use crate::geometry::{clamp_point_scale, resolve_point_scale};
use crate::layer::{
    BoxKey, BoxLayer, ControlPoint, Easing, HanddrawLayer, Interpolation, Layer, LayerId, LayerStyle,
    PointId, SerializableColor, SplineLayer,
};
use kurbo::Point;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Persistence errors.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Failed to parse document: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("Failed to encode document: {0}")]
    Encode(#[source] serde_json::Error),
}

fn number_from_value(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(number_from_value))
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Bool(b)) => Some(b),
        Some(Value::Number(n)) => n.as_f64().map(|n| n != 0.0),
        _ => None,
    })
}

fn lenient_uuid<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Uuid>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Uuid::parse_str(&s).ok(),
        _ => None,
    })
}

fn frame_from(value: Option<f64>) -> u32 {
    value.map_or(1, |f| f.round().clamp(1.0, f64::from(u32::MAX)) as u32)
}

/// A stored point, normalized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedPoint {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub x: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub y: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    #[serde(default, alias = "pointScale", deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub point_scale: Option<f64>,
    #[serde(default, alias = "boxScale", deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub box_scale: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    #[serde(default, alias = "boxRotation", deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub box_rotation: Option<f64>,
    #[serde(default, deserialize_with = "lenient_bool", skip_serializing_if = "Option::is_none")]
    pub highlighted: Option<bool>,
    #[serde(default, deserialize_with = "lenient_uuid", skip_serializing_if = "Option::is_none")]
    pub uid: Option<PointId>,
}

impl PersistedPoint {
    fn from_point(point: &ControlPoint, placement: &Placement) -> Self {
        let normalized = placement.to_normalized(point.position);
        Self {
            x: Some(normalized.x),
            y: Some(normalized.y),
            scale: Some(clamp_point_scale(point.scale)),
            rotation: (point.rotation != 0.0).then_some(point.rotation),
            highlighted: point.highlighted.then_some(true),
            uid: point.uid,
            ..Self::default()
        }
    }

    fn into_point(self, placement: &Placement) -> ControlPoint {
        let normalized = Point::new(self.x.unwrap_or(0.0), self.y.unwrap_or(0.0));
        let position = placement.to_canvas(normalized);
        let mut point = match self.uid {
            Some(uid) => ControlPoint {
                uid: Some(uid),
                ..ControlPoint::new(position)
            },
            None => ControlPoint::legacy(position),
        };
        point.scale = resolve_point_scale(self.box_scale, self.point_scale, self.scale, false);
        point.rotation = self.rotation.or(self.box_rotation).unwrap_or(0.0);
        point.highlighted = self.highlighted.unwrap_or(false);
        point
    }
}

/// A stored box keyframe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedKey {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub frame: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub x: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub y: Option<f64>,
    #[serde(default, alias = "boxScale", alias = "pointScale", deserialize_with = "lenient_f64")]
    pub scale: Option<f64>,
    #[serde(default, alias = "boxRotation", deserialize_with = "lenient_f64")]
    pub rotation: Option<f64>,
}

impl From<&BoxKey> for PersistedKey {
    fn from(key: &BoxKey) -> Self {
        Self {
            frame: Some(f64::from(key.frame)),
            x: Some(key.x),
            y: Some(key.y),
            scale: Some(clamp_point_scale(key.scale)),
            rotation: Some(key.rotation),
        }
    }
}

impl From<PersistedKey> for BoxKey {
    fn from(key: PersistedKey) -> Self {
        Self {
            frame: frame_from(key.frame),
            x: key.x.unwrap_or(0.5),
            y: key.y.unwrap_or(0.5),
            scale: clamp_point_scale(key.scale.unwrap_or(1.0)),
            rotation: key.rotation.unwrap_or(0.0),
        }
    }
}

/// Style fields shared by every stored layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<SerializableColor>,
    #[serde(default, deserialize_with = "lenient_f64", skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
}

impl PersistedStyle {
    fn from_style(style: &LayerStyle) -> Self {
        Self {
            color: Some(style.color),
            width: Some(style.width),
        }
    }

    fn apply(self, style: &mut LayerStyle) {
        if let Some(color) = self.color {
            style.color = color;
        }
        if let Some(width) = self.width.filter(|w| *w > 0.0) {
            style.width = width;
        }
    }
}

/// A stored spline layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedSpline {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<LayerId>,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub style: PersistedStyle,
    #[serde(default)]
    pub interpolation: Interpolation,
    #[serde(default)]
    pub points: Vec<PersistedPoint>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub repeat: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub offset: Option<f64>,
    #[serde(default, alias = "aPause", deserialize_with = "lenient_f64")]
    pub a_pause: Option<f64>,
    #[serde(default, alias = "zPause", deserialize_with = "lenient_f64")]
    pub z_pause: Option<f64>,
    #[serde(default)]
    pub easing: Easing,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub scale: Option<f64>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub driven: Option<bool>,
}

/// A stored freehand layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedHanddraw {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<LayerId>,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub style: PersistedStyle,
    #[serde(default)]
    pub points: Vec<PersistedPoint>,
}

/// A stored box keyframe track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedBox {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<LayerId>,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub style: PersistedStyle,
    #[serde(default)]
    pub box_keys: Vec<PersistedKey>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub box_timeline_point: Option<f64>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_attachment: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_selection: Option<Value>,
}

/// A stored layer, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PersistedLayer {
    #[serde(rename = "normal")]
    Spline(PersistedSpline),
    #[serde(rename = "handdraw")]
    Handdraw(PersistedHanddraw),
    #[serde(rename = "box_layer")]
    Box(PersistedBox),
}

impl PersistedLayer {
    /// Normalize a live layer against `placement`.
    pub fn from_layer(layer: &Layer, placement: &Placement) -> Self {
        let points = |points: &[ControlPoint]| -> Vec<PersistedPoint> {
            points.iter().map(|p| PersistedPoint::from_point(p, placement)).collect()
        };
        match layer {
            Layer::Spline(l) => PersistedLayer::Spline(PersistedSpline {
                id: Some(l.id),
                name: l.name.clone(),
                style: PersistedStyle::from_style(&l.style),
                interpolation: l.interpolation,
                points: points(&l.points),
                repeat: Some(f64::from(l.repeat)),
                offset: Some(f64::from(l.offset)),
                a_pause: Some(f64::from(l.a_pause)),
                z_pause: Some(f64::from(l.z_pause)),
                easing: l.easing,
                scale: Some(l.scale),
                driven: Some(l.driven),
            }),
            Layer::Handdraw(l) => PersistedLayer::Handdraw(PersistedHanddraw {
                id: Some(l.id),
                name: l.name.clone(),
                style: PersistedStyle::from_style(&l.style),
                points: points(&l.points),
            }),
            Layer::Box(l) => PersistedLayer::Box(PersistedBox {
                id: Some(l.id),
                name: l.name.clone(),
                style: PersistedStyle::from_style(&l.style),
                box_keys: l.keys.iter().map(PersistedKey::from).collect(),
                box_timeline_point: Some(f64::from(l.timeline_point)),
                enabled: Some(l.enabled),
                ref_attachment: l.ref_attachment.clone(),
                ref_selection: l.ref_selection.clone(),
            }),
        }
    }

    /// Rebuild a live layer in canvas space under `placement`.
    ///
    /// Box layers get `max_frames` to clamp their stored frame.
    pub fn into_layer(self, placement: &Placement, max_frames: u32) -> Layer {
        let points = |points: Vec<PersistedPoint>| -> Vec<ControlPoint> {
            points.into_iter().map(|p| p.into_point(placement)).collect()
        };
        let non_negative = |v: Option<f64>, default: u32| -> u32 {
            v.map_or(default, |v| v.round().clamp(0.0, f64::from(u32::MAX)) as u32)
        };
        match self {
            PersistedLayer::Spline(p) => {
                let mut layer = SplineLayer::new(p.name, points(p.points));
                if let Some(id) = p.id {
                    layer.id = id;
                }
                p.style.apply(&mut layer.style);
                layer.interpolation = p.interpolation;
                layer.repeat = non_negative(p.repeat, 1);
                layer.offset = p
                    .offset
                    .map_or(0, |v| v.round().clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32);
                layer.a_pause = non_negative(p.a_pause, 0);
                layer.z_pause = non_negative(p.z_pause, 0);
                layer.easing = p.easing;
                layer.scale = p.scale.filter(|s| *s > 0.0).unwrap_or(1.0);
                layer.driven = p.driven.unwrap_or(false);
                Layer::Spline(layer)
            }
            PersistedLayer::Handdraw(p) => {
                let mut layer = HanddrawLayer::new(p.name);
                if let Some(id) = p.id {
                    layer.id = id;
                }
                p.style.apply(&mut layer.style);
                layer.points = points(p.points);
                Layer::Handdraw(layer)
            }
            PersistedLayer::Box(p) => {
                let keys = p.box_keys.into_iter().map(BoxKey::from).collect();
                let mut layer = BoxLayer::new(p.name, keys);
                if let Some(id) = p.id {
                    layer.id = id;
                }
                p.style.apply(&mut layer.style);
                layer.timeline_point = crate::timeline::clamp_frame(
                    i64::from(frame_from(p.box_timeline_point)),
                    max_frames,
                );
                layer.enabled = p.enabled.unwrap_or(true);
                layer.ref_attachment = p.ref_attachment;
                layer.ref_selection = p.ref_selection;
                layer.materialize(placement);
                Layer::Box(layer)
            }
        }
    }
}

/// The persisted editor value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub layers: Vec<PersistedLayer>,
    /// Index of the active layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<usize>,
}

impl Document {
    pub fn from_json(json: &str) -> Result<Self, PersistError> {
        serde_json::from_str(json).map_err(PersistError::Parse)
    }

    pub fn to_json(&self) -> Result<String, PersistError> {
        serde_json::to_string(self).map_err(PersistError::Encode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLACEMENT: Placement = Placement {
        width: 200.0,
        height: 100.0,
        scale: 1.0,
        offset: kurbo::Vec2::ZERO,
    };

    #[test]
    fn test_reads_tagged_layers() {
        let json = r#"{
            "layers": [
                {"type": "normal", "name": "path", "points": [{"x": 0.5, "y": 0.5}, {"x": 1, "y": 0}]},
                {"type": "handdraw", "name": "ink", "points": []},
                {"type": "box_layer", "name": "box", "box_keys": [{"frame": 5, "x": 0.1, "y": 0.2}], "box_timeline_point": 5}
            ],
            "active": 2
        }"#;
        let doc = Document::from_json(json).unwrap();
        assert_eq!(doc.layers.len(), 3);
        assert_eq!(doc.active, Some(2));

        let spline = doc.layers[0].clone().into_layer(&PLACEMENT, 100);
        assert_eq!(spline.points()[0].position, Point::new(100.0, 50.0));
        assert!(spline.points()[0].uid.is_none());

        let boxed = doc.layers[2].clone().into_layer(&PLACEMENT, 100);
        let boxed = boxed.as_box().unwrap();
        assert_eq!(boxed.timeline_point, 5);
        assert_eq!(boxed.working_points.len(), 1);
        assert!(boxed.enabled);
    }

    #[test]
    fn test_lenient_numbers_default() {
        let json = r#"{"type": "normal", "points": [{"x": "0.25", "y": "oops", "scale": "big", "rotation": null}]}"#;
        let layer: PersistedLayer = serde_json::from_str(json).unwrap();
        let layer = layer.into_layer(&PLACEMENT, 100);
        let point = &layer.points()[0];
        assert_eq!(point.position, Point::new(50.0, 0.0));
        assert_eq!(point.scale, 1.0);
        assert_eq!(point.rotation, 0.0);
    }

    #[test]
    fn test_legacy_aliases() {
        let json = r#"{"x": 0, "y": 0, "pointScale": 2.5, "boxRotation": 1.25}"#;
        let point: PersistedPoint = serde_json::from_str(json).unwrap();
        let point = point.into_point(&PLACEMENT);
        assert_eq!(point.scale, 2.5);
        assert_eq!(point.rotation, 1.25);

        let key: PersistedKey = serde_json::from_str(r#"{"frame": "3", "boxScale": 9}"#).unwrap();
        let key = BoxKey::from(key);
        assert_eq!(key.frame, 3);
        assert_eq!(key.scale, 3.0);
    }

    #[test]
    fn test_box_frame_is_clamped() {
        let json = r#"{"type": "box_layer", "box_keys": [{"frame": 0}], "box_timeline_point": 500}"#;
        let layer: PersistedLayer = serde_json::from_str(json).unwrap();
        let layer = layer.into_layer(&PLACEMENT, 24);
        let boxed = layer.as_box().unwrap();
        assert_eq!(boxed.keys[0].frame, 1);
        assert_eq!(boxed.timeline_point, 24);
    }

    #[test]
    fn test_live_layer_roundtrip() {
        let mut spline = SplineLayer::new("s", vec![ControlPoint::new(Point::new(20.0, 30.0))]);
        spline.points[0].highlighted = true;
        spline.repeat = 3;
        let layer = Layer::Spline(spline);

        let json = serde_json::to_string(&PersistedLayer::from_layer(&layer, &PLACEMENT)).unwrap();
        assert!(json.contains(r#""type":"normal""#));
        let back: PersistedLayer = serde_json::from_str(&json).unwrap();
        let back = back.into_layer(&PLACEMENT, 100);

        assert_eq!(back.id(), layer.id());
        let (a, b) = (&layer.points()[0], &back.points()[0]);
        assert!((a.position - b.position).hypot() < 1e-9);
        assert_eq!(a.uid, b.uid);
        assert!(b.highlighted);
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(matches!(Document::from_json("{"), Err(PersistError::Parse(_))));
    }
}
