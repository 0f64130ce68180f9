//! Gesture dispatch and per-gesture transient state.
//!
//! The button and modifiers at pointer-down fully determine the gesture.
//! Every gesture keeps a drag-start snapshot and computes its output from
//! that snapshot and the live pointer, so replaying a pointer path
//! reproduces the same points. The only path-dependent state is the handle
//! rotation accumulator, which lets a box turn more than once.

use crate::config::EditorConfig;
use crate::geometry::{damped_factor, handle_angle, unwrap_delta, with_min_baseline};
use crate::handdraw::Stroke;
use crate::hit::PointRef;
use crate::input::{Modifiers, MouseButton};
use crate::layer::{ControlPoint, LayerKind};
use kurbo::{Point, Vec2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What the pointer landed on at pointer-down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressTarget {
    /// A point of the active layer (index into its editable points).
    Point(usize),
    /// The interpolated point of the active box layer.
    BoxPoint,
    /// The rotation handle of the active box point.
    BoxHandle,
    /// Nothing editable.
    Empty,
}

/// Gesture kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GestureKind {
    PointDrag,
    GroupRotate,
    GroupTranslate,
    GroupScale,
    PointScale,
    BoxHandleRotate,
    TimelineScrub,
    Draw,
}

/// Outcome of dispatching a pointer-down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressAction {
    Begin(GestureKind),
    DeletePoint(usize),
    ToggleHighlight(usize),
    AppendPoint,
    InsertPoint,
    SelectLayer,
    Ignore,
}

/// Reasons an in-flight gesture has to be aborted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GestureError {
    #[error("gesture has no session context")]
    NoContext,
    #[error("gesture layer was removed")]
    LayerMissing,
    #[error("gesture target point could not be resolved")]
    PointNotFound,
    #[error("point count changed from {expected} to {found} during the gesture")]
    SnapshotMismatch { expected: usize, found: usize },
}

/// Map a pointer-down to an action.
pub fn classify(
    button: MouseButton,
    modifiers: Modifiers,
    target: PressTarget,
    active: Option<LayerKind>,
) -> PressAction {
    let is_box = active == Some(LayerKind::Box);
    let point = match target {
        PressTarget::Point(index) => Some(Some(index)),
        PressTarget::BoxPoint => Some(None),
        PressTarget::BoxHandle | PressTarget::Empty => None,
    };

    match (button, target, point) {
        (MouseButton::Primary, PressTarget::BoxHandle, _) => {
            PressAction::Begin(GestureKind::BoxHandleRotate)
        }
        (MouseButton::Primary, _, Some(_)) => {
            if modifiers.alt {
                PressAction::Begin(GestureKind::GroupRotate)
            } else {
                PressAction::Begin(GestureKind::PointDrag)
            }
        }
        (MouseButton::Primary, _, None) => match active {
            Some(LayerKind::Box) if modifiers.shift => {
                PressAction::Begin(GestureKind::TimelineScrub)
            }
            Some(LayerKind::Spline | LayerKind::Handdraw) if modifiers.shift => {
                PressAction::AppendPoint
            }
            Some(LayerKind::Spline) if modifiers.command() => PressAction::InsertPoint,
            Some(LayerKind::Handdraw) if modifiers == Modifiers::NONE => {
                PressAction::Begin(GestureKind::Draw)
            }
            _ => PressAction::SelectLayer,
        },
        (MouseButton::Middle, _, Some(_)) if modifiers.alt => {
            PressAction::Begin(GestureKind::GroupTranslate)
        }
        (MouseButton::Secondary, _, Some(index)) => {
            if modifiers.alt {
                if is_box && !modifiers.command() {
                    PressAction::Begin(GestureKind::PointScale)
                } else {
                    PressAction::Begin(GestureKind::GroupScale)
                }
            } else {
                match index {
                    Some(_) if is_box => PressAction::Ignore,
                    Some(index) if modifiers.command() => PressAction::ToggleHighlight(index),
                    Some(index) => PressAction::DeletePoint(index),
                    None => PressAction::Ignore,
                }
            }
        }
        _ => PressAction::Ignore,
    }
}

/// Plain drag of one point.
#[derive(Debug, Clone)]
pub struct PointDrag {
    pub target: PointRef,
    /// Point minus pointer at drag start.
    pub drag_offset: Vec2,
}

impl PointDrag {
    pub fn new(target: PointRef, pointer: Point) -> Self {
        Self {
            target,
            drag_offset: target.position - pointer,
        }
    }

    pub fn position(&self, pointer: Point) -> Point {
        pointer + self.drag_offset
    }
}

/// Shared snapshot for group rotate, translate, and scale.
#[derive(Debug, Clone)]
pub struct GroupTransform {
    /// The grabbed point; it never moves during rotate and scale.
    pub anchor: PointRef,
    pub start_pointer: Point,
    /// Positions of every point at drag start.
    pub original: Vec<Point>,
}

impl GroupTransform {
    pub fn new(anchor: PointRef, start_pointer: Point, points: &[ControlPoint]) -> Self {
        Self {
            anchor,
            start_pointer,
            original: points.iter().map(|p| p.position).collect(),
        }
    }

    fn anchor_position(&self) -> Point {
        self.anchor.position
    }

    /// Rotate every snapshot offset around the anchor by the pointer angle.
    pub fn rotated(&self, pointer: Point) -> Vec<Point> {
        let anchor = self.anchor_position();
        let d = pointer - anchor;
        let angle = if d.hypot2() < 1e-12 { 0.0 } else { d.y.atan2(d.x) };
        let (sin, cos) = angle.sin_cos();
        self.original
            .iter()
            .map(|&p| {
                let o = p - anchor;
                anchor + Vec2::new(o.x * cos - o.y * sin, o.x * sin + o.y * cos)
            })
            .collect()
    }

    /// Rigid translation of the snapshot by the pointer delta.
    pub fn translated(&self, pointer: Point) -> Vec<Point> {
        let delta = pointer - self.start_pointer;
        self.original.iter().map(|&p| p + delta).collect()
    }

    /// Damped, clamped scale factor from the horizontal pointer distance.
    pub fn scale_factor(&self, pointer: Point, config: &EditorConfig) -> f64 {
        let anchor = self.anchor_position();
        let initial = with_min_baseline(self.start_pointer.x - anchor.x, config.min_baseline);
        let raw = (pointer.x - anchor.x) / initial;
        damped_factor(raw, config.scale_damping).clamp(config.group_scale_min, config.group_scale_max)
    }

    /// Scale every snapshot offset from the anchor.
    pub fn scaled(&self, pointer: Point, config: &EditorConfig) -> Vec<Point> {
        let anchor = self.anchor_position();
        let factor = self.scale_factor(pointer, config);
        self.original
            .iter()
            .map(|&p| anchor + (p - anchor) * factor)
            .collect()
    }
}

/// Scaling one box point's own `scale`.
#[derive(Debug, Clone)]
pub struct PointScaleDrag {
    pub target: PointRef,
    pub start_pointer: Point,
    pub original_scale: f64,
}

impl PointScaleDrag {
    pub fn new(target: PointRef, start_pointer: Point, original_scale: f64) -> Self {
        Self {
            target,
            start_pointer,
            original_scale,
        }
    }

    pub fn scale(&self, pointer: Point, config: &EditorConfig) -> f64 {
        let center = self.target.position;
        let initial = with_min_baseline(self.start_pointer.x - center.x, config.min_baseline);
        let raw = (pointer.x - center.x) / initial;
        let factor = damped_factor(raw, config.scale_damping);
        crate::geometry::clamp_point_scale(self.original_scale * factor)
    }
}

/// Accumulates rotation deltas so the value can pass ±π without snapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationAccumulator {
    last_angle: f64,
    value: f64,
}

impl RotationAccumulator {
    pub fn new(start_angle: f64, start_value: f64) -> Self {
        Self {
            last_angle: start_angle,
            value: start_value,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Feed the next raw target angle and return the accumulated rotation.
    pub fn feed(&mut self, angle: f64) -> f64 {
        self.value += unwrap_delta(angle - self.last_angle);
        self.last_angle = angle;
        self.value
    }
}

/// Dragging the rotation handle of a box point.
#[derive(Debug, Clone)]
pub struct HandleRotate {
    pub target: PointRef,
    pub center: Point,
    pub accumulator: RotationAccumulator,
}

impl HandleRotate {
    pub fn new(target: PointRef, pointer: Point, rotation: f64) -> Self {
        let center = target.position;
        Self {
            target,
            center,
            accumulator: RotationAccumulator::new(handle_angle(center, pointer), rotation),
        }
    }

    pub fn update(&mut self, pointer: Point) -> f64 {
        self.accumulator.feed(handle_angle(self.center, pointer))
    }
}

/// Shift-drag scrubbing of all enabled box layers.
#[derive(Debug, Clone, Copy)]
pub struct Scrub {
    pub start_x: f64,
    pub start_frame: u32,
    pub frame: u32,
}

/// The in-flight gesture.
#[derive(Debug, Clone, Default)]
pub enum Gesture {
    #[default]
    Idle,
    PointDrag(PointDrag),
    GroupRotate(GroupTransform),
    GroupTranslate(GroupTransform),
    GroupScale(GroupTransform),
    PointScale(PointScaleDrag),
    BoxHandleRotate(HandleRotate),
    TimelineScrub(Scrub),
    Draw(Stroke),
}

impl Gesture {
    pub fn is_idle(&self) -> bool {
        matches!(self, Gesture::Idle)
    }

    pub fn kind(&self) -> Option<GestureKind> {
        Some(match self {
            Gesture::Idle => return None,
            Gesture::PointDrag(_) => GestureKind::PointDrag,
            Gesture::GroupRotate(_) => GestureKind::GroupRotate,
            Gesture::GroupTranslate(_) => GestureKind::GroupTranslate,
            Gesture::GroupScale(_) => GestureKind::GroupScale,
            Gesture::PointScale(_) => GestureKind::PointScale,
            Gesture::BoxHandleRotate(_) => GestureKind::BoxHandleRotate,
            Gesture::TimelineScrub(_) => GestureKind::TimelineScrub,
            Gesture::Draw(_) => GestureKind::Draw,
        })
    }
}
