//! Rendering adapter contract.
//!
//! The session never draws. After every mutation it builds a [`Scene`]
//! describing all layers in canvas space and hands it to a [`Renderer`].

use crate::config::EditorConfig;
use crate::geometry::{BoxHandleGeometry, compute_box_handle_geometry, point_scale, scaled_box_radius, scaled_point_radius};
use crate::gesture::GestureKind;
use crate::layer::{ControlPoint, Interpolation, Layer, LayerId, LayerKind, PointId, SerializableColor};
use crate::timeline::Timeline;
use kurbo::{Point, Size};
use serde::Serialize;
use thiserror::Error;

/// Renderer errors.
#[derive(Debug, Error)]
pub enum RendererError {
    #[error("Render failed: {0}")]
    RenderFailed(String),
}

/// Something that can draw a scene.
pub trait Renderer {
    fn render(&mut self, scene: &Scene) -> Result<(), RendererError>;
}

/// A drawable point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenePoint {
    pub uid: Option<PointId>,
    pub position: Point,
    /// Effective radius in canvas pixels (half-extent for box points).
    pub radius: f64,
    pub scale: f64,
    pub rotation: f64,
    pub highlighted: bool,
    pub hovered: bool,
}

/// A drawable layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneLayer {
    pub id: LayerId,
    pub name: String,
    pub kind: LayerKind,
    pub color: SerializableColor,
    pub width: f64,
    pub active: bool,
    /// An inactive layer under the idle pointer.
    pub hovered: bool,
    pub enabled: bool,
    pub interpolation: Option<Interpolation>,
    /// Editable points: spline/handdraw points or one per box key.
    pub points: Vec<ScenePoint>,
    /// Interpolated box point at the layer's current frame.
    pub box_point: Option<ScenePoint>,
    pub handle: Option<BoxHandleGeometry>,
    pub frame: Option<u32>,
}

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scene {
    pub canvas: Size,
    pub canvas_scale: f64,
    pub frame: u32,
    pub max_frames: u32,
    pub gesture: Option<GestureKind>,
    pub layers: Vec<SceneLayer>,
    /// Freehand stroke being drawn, not yet part of a layer.
    pub stroke: Vec<Point>,
}

/// Inputs needed to turn layers into scene layers.
#[derive(Debug, Clone, Copy)]
pub struct SceneContext<'a> {
    pub config: &'a EditorConfig,
    pub canvas: Size,
    pub canvas_scale: f64,
    pub timeline: Timeline,
    pub active: Option<LayerId>,
    /// Hovered point index within the active layer.
    pub hovered: Option<usize>,
    /// Inactive layer under the idle pointer.
    pub hovered_layer: Option<LayerId>,
    pub gesture: Option<GestureKind>,
}

impl<'a> SceneContext<'a> {
    pub fn build<'l>(&self, layers: impl IntoIterator<Item = &'l Layer>) -> Scene {
        Scene {
            canvas: self.canvas,
            canvas_scale: self.canvas_scale,
            frame: self.timeline.frame,
            max_frames: self.timeline.max_frames,
            gesture: self.gesture,
            layers: layers.into_iter().map(|l| self.layer(l)).collect(),
            stroke: Vec::new(),
        }
    }

    fn layer(&self, layer: &Layer) -> SceneLayer {
        let active = self.active == Some(layer.id());
        let hovered = if active { self.hovered } else { None };
        let style = layer.style();
        let mut scene = SceneLayer {
            id: layer.id(),
            name: layer.name().to_string(),
            kind: layer.kind(),
            color: style.color,
            width: style.width * self.canvas_scale,
            active,
            hovered: !active && self.hovered_layer == Some(layer.id()),
            enabled: true,
            interpolation: None,
            points: Vec::new(),
            box_point: None,
            handle: None,
            frame: None,
        };

        match layer {
            Layer::Spline(spline) => {
                scene.interpolation = Some(spline.interpolation);
                scene.points = self.points(&spline.points, hovered, false);
            }
            Layer::Handdraw(handdraw) => {
                scene.points = self.points(&handdraw.points, hovered, false);
            }
            Layer::Box(boxed) => {
                scene.enabled = boxed.enabled;
                scene.frame = Some(boxed.timeline_point);
                if active {
                    scene.points = self.points(&boxed.working_points, hovered, true);
                }
                if let Some(point) = &boxed.active_point {
                    scene.box_point = Some(self.point(point, false, true));
                    scene.handle = Some(compute_box_handle_geometry(point, self.config, self.canvas_scale));
                }
            }
        }
        scene
    }

    fn points(&self, points: &[ControlPoint], hovered: Option<usize>, for_box: bool) -> Vec<ScenePoint> {
        points
            .iter()
            .enumerate()
            .map(|(i, p)| self.point(p, hovered == Some(i), for_box))
            .collect()
    }

    fn point(&self, point: &ControlPoint, hovered: bool, for_box: bool) -> ScenePoint {
        let radius = if for_box {
            scaled_box_radius(point, self.config, self.canvas_scale)
        } else {
            scaled_point_radius(point, self.config.point_radius, self.canvas_scale)
        };
        ScenePoint {
            uid: point.uid,
            position: point.position,
            radius,
            scale: point_scale(point),
            rotation: point.rotation,
            highlighted: point.highlighted,
            hovered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::Placement;
    use crate::layer::{BoxKey, BoxLayer, SplineLayer};

    fn context(config: &EditorConfig, active: Option<LayerId>) -> SceneContext<'_> {
        SceneContext {
            config,
            canvas: Size::new(200.0, 100.0),
            canvas_scale: 2.0,
            timeline: Timeline::new(50),
            active,
            hovered: Some(1),
            hovered_layer: None,
            gesture: None,
        }
    }

    #[test]
    fn test_scene_scales_radii() {
        let config = EditorConfig::default();
        let mut points = vec![ControlPoint::new(Point::new(0.0, 0.0)), ControlPoint::new(Point::new(5.0, 5.0))];
        points[1].scale = 0.5;
        let layer = Layer::Spline(SplineLayer::new("s", points));
        let scene = context(&config, Some(layer.id())).build([&layer]);

        let pts = &scene.layers[0].points;
        assert_eq!(pts[0].radius, config.point_radius * 2.0);
        assert_eq!(pts[1].radius, config.point_radius * 0.5 * 2.0);
        assert!(pts[1].hovered && !pts[0].hovered);
        assert_eq!(scene.layers[0].interpolation, Some(Interpolation::Linear));
    }

    #[test]
    fn test_inactive_box_shows_only_interpolated_point() {
        let config = EditorConfig::default();
        let mut boxed = BoxLayer::new("b", vec![BoxKey { frame: 1, x: 0.5, y: 0.5, scale: 1.0, rotation: 0.0 }]);
        boxed.materialize(&Placement::new(200.0, 100.0));
        let layer = Layer::Box(boxed);

        let inactive = context(&config, None).build([&layer]);
        assert!(inactive.layers[0].points.is_empty());
        assert!(inactive.layers[0].box_point.is_some());
        assert!(inactive.layers[0].handle.is_some());
        assert_eq!(inactive.layers[0].frame, Some(1));

        let active = context(&config, Some(layer.id())).build([&layer]);
        assert_eq!(active.layers[0].points.len(), 1);
        assert_eq!(active.layers[0].points[0].radius, config.box_radius * 2.0);
    }

    #[test]
    fn test_hovered_layer_is_flagged_only_when_inactive() {
        let config = EditorConfig::default();
        let a = Layer::Spline(SplineLayer::new("a", vec![ControlPoint::new(Point::new(1.0, 2.0))]));
        let b = Layer::Spline(SplineLayer::new("b", vec![ControlPoint::new(Point::new(3.0, 4.0))]));
        let mut ctx = context(&config, Some(a.id()));
        ctx.hovered_layer = Some(b.id());
        let scene = ctx.build([&a, &b]);
        assert!(!scene.layers[0].hovered);
        assert!(scene.layers[1].hovered);

        ctx.hovered_layer = Some(a.id());
        assert!(!ctx.build([&a, &b]).layers[0].hovered);
    }

    #[test]
    fn test_scene_serializes() {
        let config = EditorConfig::default();
        let layer = Layer::Spline(SplineLayer::new("s", vec![ControlPoint::new(Point::new(1.0, 2.0))]));
        let scene = context(&config, None).build([&layer]);
        let json = serde_json::to_value(&scene).unwrap();
        assert_eq!(json["layers"][0]["name"], "s");
        assert_eq!(json["frame"], 1);
    }
}
