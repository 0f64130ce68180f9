//! The editor session: owns all editor state and routes pointer input.
//!
//! Every entry point runs to completion synchronously. A mutation is
//! followed by a redraw request before control returns to the host.

use crate::background::{Background, Placement};
use crate::config::{ConfigError, EditorConfig};
use crate::geometry::{self, clamp_point_scale, compute_box_handle_geometry, point_segment_distance};
use crate::gesture::{
    Gesture, GestureError, GestureKind, GroupTransform, HandleRotate, PointDrag, PointScaleDrag,
    PressAction, PressTarget, Scrub, classify,
};
use crate::handdraw::Stroke;
use crate::history::{History, Snapshot};
use crate::hit::{HitRadius, LayerThresholds, PointRef, hit_box_handle, pick_layer, pick_point, resolve_point_index};
use crate::input::{Modifiers, MouseButton, PointerEvent};
use crate::layer::{BoxKey, BoxLayer, ControlPoint, HanddrawLayer, Layer, LayerId, SplineLayer};
use crate::persist::{Document, PersistError, PersistedLayer};
use crate::render::{Renderer, Scene, SceneContext};
use crate::timeline::{self, Timeline, clamp_frame, scrub_frame, upsert_key};
use crate::video::{VideoElement, VideoState, VideoSync};
use crate::viewport::Viewport;
use kurbo::{Point, Size};

/// What the host should do with document-level pointer listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capture {
    /// Leave listeners as they are.
    Keep,
    /// A gesture started: attach move/up/cancel listeners.
    Begin,
    /// The gesture ended: remove them.
    Release,
}

/// Result of feeding one pointer event to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventResponse {
    pub redraw: bool,
    pub capture: Capture,
}

impl EventResponse {
    pub const NONE: Self = Self {
        redraw: false,
        capture: Capture::Keep,
    };

    fn redraw() -> Self {
        Self {
            redraw: true,
            capture: Capture::Keep,
        }
    }
}

/// Bookkeeping for the in-flight gesture.
#[derive(Debug, Clone)]
struct GestureContext {
    layer: LayerId,
    start: Point,
    moved: bool,
    before: Snapshot,
    /// Set when the gesture edits box key points.
    box_edit: Option<BoxEdit>,
}

#[derive(Debug, Clone, Copy)]
struct BoxEdit {
    /// Frame of a key inserted at gesture start, removed again if nothing moved.
    inserted_frame: Option<u32>,
}

/// An editing session for one widget.
pub struct EditorSession {
    config: EditorConfig,
    layers: Vec<Layer>,
    active: Option<LayerId>,
    background: Background,
    viewport: Viewport,
    timeline: Timeline,
    video: VideoSync,
    gesture: Gesture,
    context: Option<GestureContext>,
    hovered: Option<usize>,
    hovered_layer: Option<LayerId>,
    /// A gesture was ended from outside pointer input; the host still
    /// holds its capture listeners.
    release_pending: bool,
    history: History,
    renderer: Option<Box<dyn Renderer>>,
}

impl std::fmt::Debug for EditorSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorSession")
            .field("layers", &self.layers.len())
            .field("active", &self.active)
            .field("timeline", &self.timeline)
            .field("gesture", &self.gesture.kind())
            .field("video", &self.video)
            .field("renderer", &self.renderer.is_some())
            .finish()
    }
}

impl Default for EditorSession {
    fn default() -> Self {
        Self::new(EditorConfig::default())
    }
}

impl EditorSession {
    pub fn new(config: EditorConfig) -> Self {
        Self {
            timeline: Timeline::new(config.max_frames),
            history: History::new(config.undo_depth),
            config,
            layers: Vec::new(),
            active: None,
            background: Background::default(),
            viewport: Viewport::default(),
            video: VideoSync::new(),
            gesture: Gesture::Idle,
            context: None,
            hovered: None,
            hovered_layer: None,
            release_pending: false,
            renderer: None,
        }
    }

    /// Create a session from host-supplied config JSON.
    pub fn from_config_json(json: &str) -> Result<Self, ConfigError> {
        Ok(Self::new(EditorConfig::from_json(json)?))
    }

    // --- Accessors ---

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id() == id)
    }

    pub fn active_id(&self) -> Option<LayerId> {
        self.active
    }

    pub fn active_layer(&self) -> Option<&Layer> {
        self.active.and_then(|id| self.layer(id))
    }

    pub fn timeline(&self) -> Timeline {
        self.timeline
    }

    pub fn background(&self) -> &Background {
        &self.background
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    pub fn video_state(&self) -> &VideoState {
        self.video.state()
    }

    pub fn gesture_kind(&self) -> Option<GestureKind> {
        self.gesture.kind()
    }

    pub fn hovered(&self) -> Option<usize> {
        self.hovered
    }

    /// Inactive layer under the idle pointer.
    pub fn hovered_layer(&self) -> Option<LayerId> {
        self.hovered_layer
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Scale of the background that currently defines normalized space.
    pub fn canvas_scale(&self) -> f64 {
        geometry::canvas_scale(&self.background, self.video.is_ready())
    }

    fn placement(&self) -> Placement {
        self.background.active(self.video.is_ready())
    }

    fn layer_index(&self, id: LayerId) -> Option<usize> {
        self.layers.iter().position(|l| l.id() == id)
    }

    fn active_index(&self) -> Option<usize> {
        self.active.and_then(|id| self.layer_index(id))
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            layers: self.layers.clone(),
            active: self.active,
        }
    }

    fn record(&mut self) {
        let snapshot = self.snapshot();
        self.history.push(snapshot);
    }

    // --- Rendering ---

    pub fn set_renderer(&mut self, renderer: Box<dyn Renderer>) {
        self.renderer = Some(renderer);
        self.request_redraw();
    }

    pub fn clear_renderer(&mut self) {
        self.renderer = None;
    }

    /// Describe the current state for a renderer.
    pub fn scene(&self) -> Scene {
        let context = SceneContext {
            config: &self.config,
            canvas: self.background.canvas,
            canvas_scale: self.canvas_scale(),
            timeline: self.timeline,
            active: self.active,
            hovered: self.hovered,
            hovered_layer: self.hovered_layer,
            gesture: self.gesture.kind(),
        };
        let mut scene = context.build(&self.layers);
        if let Gesture::Draw(stroke) = &self.gesture {
            scene.stroke = stroke.points().to_vec();
        }
        scene
    }

    /// Hand the current scene to the renderer.
    pub fn request_redraw(&mut self) {
        if self.renderer.is_none() {
            log::warn!("No renderer attached, skipping redraw");
            return;
        }
        let scene = self.scene();
        if let Some(renderer) = self.renderer.as_mut() {
            if let Err(err) = renderer.render(&scene) {
                log::warn!("Render failed: {err}");
            }
        }
    }

    // --- Pointer input ---

    /// Feed one pointer event in canvas-local coordinates.
    pub fn handle_pointer(&mut self, event: PointerEvent) -> EventResponse {
        let mut response = match event {
            PointerEvent::Down {
                position,
                button,
                modifiers,
            } => self.pointer_down(position, button, modifiers),
            PointerEvent::Move { position } => self.pointer_move(position),
            PointerEvent::Up { position } => {
                let last = if self.gesture.is_idle() {
                    EventResponse::NONE
                } else {
                    self.pointer_move(position)
                };
                // An aborted last move has already ended the gesture.
                if last.capture == Capture::Release { last } else { self.end_gesture() }
            }
            PointerEvent::Cancel => self.end_gesture(),
        };
        if self.take_pending_release() && response.capture == Capture::Keep {
            response.capture = Capture::Release;
        }
        if response.redraw {
            self.request_redraw();
        }
        response
    }

    /// Whether a gesture was cancelled outside pointer input since the last
    /// call. The host should then drop its capture listeners.
    pub fn take_pending_release(&mut self) -> bool {
        std::mem::take(&mut self.release_pending)
    }

    fn press_target(&self, index: usize, pointer: Point) -> PressTarget {
        let canvas_scale = self.canvas_scale();
        let Some(layer) = self.layers.get(index) else {
            return PressTarget::Empty;
        };
        if let Layer::Box(boxed) = layer {
            if let Some(active) = &boxed.active_point {
                let handle = compute_box_handle_geometry(active, &self.config, canvas_scale);
                if hit_box_handle(&handle, pointer) {
                    return PressTarget::BoxHandle;
                }
            }
            let radius = HitRadius {
                base: self.config.box_radius,
                canvas_scale,
            };
            if let Some(hit) = pick_point(&boxed.working_points, pointer, &radius) {
                return PressTarget::Point(hit.index);
            }
            let on_active = boxed
                .active_point
                .as_ref()
                .is_some_and(|p| pick_point(std::slice::from_ref(p), pointer, &radius).is_some());
            return if on_active { PressTarget::BoxPoint } else { PressTarget::Empty };
        }
        let radius = HitRadius {
            base: self.config.point_radius,
            canvas_scale,
        };
        pick_point(layer.points(), pointer, &radius).map_or(PressTarget::Empty, |hit| PressTarget::Point(hit.index))
    }

    fn pointer_down(&mut self, pointer: Point, button: MouseButton, modifiers: Modifiers) -> EventResponse {
        if !self.gesture.is_idle() {
            log::debug!("Ignoring pointer-down during {:?}", self.gesture.kind());
            return EventResponse::NONE;
        }
        let active = self.active_index();
        let kind = active.map(|idx| self.layers[idx].kind());
        let target = active.map_or(PressTarget::Empty, |idx| self.press_target(idx, pointer));
        let action = classify(button, modifiers, target, kind);
        log::debug!("Pointer down {button:?} on {target:?}: {action:?}");

        match (action, active) {
            (PressAction::SelectLayer, _) => self.select_layer_near(pointer),
            (PressAction::Ignore, _) | (_, None) => EventResponse::NONE,
            (PressAction::Begin(kind), Some(idx)) => self.begin_gesture(idx, kind, target, pointer),
            (PressAction::DeletePoint(point), Some(idx)) => self.delete_point(idx, point),
            (PressAction::ToggleHighlight(point), Some(idx)) => self.toggle_highlight(idx, point),
            (PressAction::AppendPoint, Some(idx)) => self.append_point(idx, pointer),
            (PressAction::InsertPoint, Some(idx)) => self.insert_point(idx, pointer),
        }
    }

    fn pointer_move(&mut self, pointer: Point) -> EventResponse {
        if self.gesture.is_idle() {
            return self.update_hover(pointer);
        }
        match self.update_gesture(pointer) {
            Ok(changed) => EventResponse {
                redraw: changed,
                capture: Capture::Keep,
            },
            Err(err) => {
                log::warn!("Gesture aborted: {err}");
                self.end_gesture()
            }
        }
    }

    fn update_hover(&mut self, pointer: Point) -> EventResponse {
        let hovered = self.active_index().and_then(|idx| match self.press_target(idx, pointer) {
            PressTarget::Point(i) => Some(i),
            _ => None,
        });
        let hovered_layer = if hovered.is_some() { None } else { self.layer_near(pointer) };
        if hovered == self.hovered && hovered_layer == self.hovered_layer {
            return EventResponse::NONE;
        }
        self.hovered = hovered;
        self.hovered_layer = hovered_layer;
        EventResponse::redraw()
    }

    /// Nearest inactive layer within the pick thresholds.
    fn layer_near(&self, pointer: Point) -> Option<LayerId> {
        let thresholds = LayerThresholds {
            default: self.config.layer_hit_threshold,
            first_point: self.config.first_point_hit_threshold,
        };
        let active = self.active;
        pick_layer(
            self.layers.iter().filter(|l| Some(l.id()) != active),
            pointer,
            thresholds,
        )
        .map(|hit| hit.layer)
    }

    fn begin_gesture(&mut self, idx: usize, kind: GestureKind, target: PressTarget, pointer: Point) -> EventResponse {
        let before = self.snapshot();
        let layer_id = self.layers[idx].id();

        let (target_index, box_edit) = match target {
            PressTarget::Point(i) => {
                let edit = self.layers[idx].is_box().then_some(BoxEdit { inserted_frame: None });
                (Some(i), edit)
            }
            PressTarget::BoxPoint | PressTarget::BoxHandle => match self.ensure_key_at_frame(idx) {
                Some((i, inserted_frame)) => (Some(i), Some(BoxEdit { inserted_frame })),
                None => {
                    log::warn!("Box layer has no interpolated point to edit");
                    return EventResponse::NONE;
                }
            },
            PressTarget::Empty => (None, None),
        };

        let gesture = match kind {
            GestureKind::TimelineScrub => self.begin_scrub(idx, pointer),
            GestureKind::Draw => Gesture::Draw(Stroke::begin(pointer, self.config.freehand_spacing)),
            _ => {
                let points = self.layers[idx].points();
                let Some(target) = target_index.and_then(|i| PointRef::of(points, i)) else {
                    log::warn!("{kind:?} without a target point");
                    return EventResponse::NONE;
                };
                let point = &points[target.index.unwrap_or_default()];
                match kind {
                    GestureKind::GroupRotate => Gesture::GroupRotate(GroupTransform::new(target, pointer, points)),
                    GestureKind::GroupTranslate => Gesture::GroupTranslate(GroupTransform::new(target, pointer, points)),
                    GestureKind::GroupScale => Gesture::GroupScale(GroupTransform::new(target, pointer, points)),
                    GestureKind::PointScale => {
                        Gesture::PointScale(PointScaleDrag::new(target, pointer, geometry::point_scale(point)))
                    }
                    GestureKind::BoxHandleRotate => {
                        Gesture::BoxHandleRotate(HandleRotate::new(target, pointer, point.rotation))
                    }
                    _ => Gesture::PointDrag(PointDrag::new(target, pointer)),
                }
            }
        };

        if let Some(point) = target_index.and_then(|i| self.layers[idx].points_mut().get_mut(i)) {
            point.fix = true;
        }
        log::debug!("Gesture started: {kind:?}");
        self.gesture = gesture;
        self.context = Some(GestureContext {
            layer: layer_id,
            start: pointer,
            moved: false,
            before,
            box_edit,
        });
        EventResponse {
            redraw: true,
            capture: Capture::Begin,
        }
    }

    fn begin_scrub(&mut self, idx: usize, pointer: Point) -> Gesture {
        let start_frame = self.layers[idx]
            .as_box()
            .map_or(self.timeline.frame, |b| b.timeline_point);
        let start_frame = self.commit_frame(i64::from(start_frame));
        Gesture::TimelineScrub(Scrub {
            start_x: pointer.x,
            start_frame,
            frame: start_frame,
        })
    }

    /// Make sure the box layer has a key at its current frame, capturing the
    /// interpolated point. Returns the key index and the frame if a key was
    /// inserted.
    fn ensure_key_at_frame(&mut self, idx: usize) -> Option<(usize, Option<u32>)> {
        let placement = self.placement();
        let layer = self.layers.get_mut(idx)?.as_box_mut()?;
        let frame = layer.timeline_point;
        if let Some(existing) = layer.key_index_at(frame) {
            return Some((existing, None));
        }
        let key = key_from_point(frame, layer.active_point.as_ref()?, &placement);
        let index = upsert_key(&mut layer.keys, key);
        layer.materialize(&placement);
        Some((index, Some(frame)))
    }

    fn update_gesture(&mut self, pointer: Point) -> Result<bool, GestureError> {
        let changed = self.step_gesture(pointer)?;
        if let Some(context) = self.context.as_mut() {
            if pointer != context.start {
                context.moved = true;
            }
        }
        Ok(changed)
    }

    /// Apply one pointer position to the gesture. Nothing is mutated when
    /// this fails.
    fn step_gesture(&mut self, pointer: Point) -> Result<bool, GestureError> {
        let context = self.context.as_ref().ok_or(GestureError::NoContext)?;
        let layer_id = context.layer;
        let idx = self.layer_index(layer_id).ok_or(GestureError::LayerMissing)?;
        let placement = self.placement();
        let epsilon = self.config.identity_epsilon;
        let mut scrub_to = None;

        let points = self.layers[idx].points_mut();
        match &mut self.gesture {
            Gesture::Idle => return Ok(false),
            Gesture::PointDrag(drag) => {
                let i = resolve_point_index(points, &drag.target, epsilon).ok_or(GestureError::PointNotFound)?;
                points[i].position = drag.position(pointer);
                // Legacy points have no uid; follow them by slot and position.
                drag.target.index = Some(i);
                drag.target.position = points[i].position;
            }
            Gesture::GroupRotate(group) => {
                check_snapshot(group, points)?;
                write_positions(points, group.rotated(pointer));
            }
            Gesture::GroupTranslate(group) => {
                check_snapshot(group, points)?;
                write_positions(points, group.translated(pointer));
            }
            Gesture::GroupScale(group) => {
                check_snapshot(group, points)?;
                write_positions(points, group.scaled(pointer, &self.config));
            }
            Gesture::PointScale(drag) => {
                let i = resolve_point_index(points, &drag.target, epsilon).ok_or(GestureError::PointNotFound)?;
                points[i].scale = drag.scale(pointer, &self.config);
            }
            Gesture::BoxHandleRotate(rotate) => {
                let i = resolve_point_index(points, &rotate.target, epsilon).ok_or(GestureError::PointNotFound)?;
                points[i].rotation = rotate.update(pointer);
            }
            Gesture::TimelineScrub(scrub) => {
                let frame = scrub_frame(
                    scrub.start_frame,
                    pointer.x - scrub.start_x,
                    self.config.pixels_per_frame,
                    self.timeline.max_frames,
                );
                if frame == scrub.frame {
                    return Ok(false);
                }
                scrub.frame = frame;
                scrub_to = Some(frame);
            }
            Gesture::Draw(stroke) => return Ok(stroke.push(pointer)),
        }

        if let Some(frame) = scrub_to {
            self.commit_frame(i64::from(frame));
            return Ok(true);
        }
        if let Layer::Box(boxed) = &mut self.layers[idx] {
            boxed.preview_active_point(&placement);
        }
        Ok(true)
    }

    /// Shared cleanup for pointer-up, pointer-cancel, and aborts.
    fn end_gesture(&mut self) -> EventResponse {
        let gesture = std::mem::take(&mut self.gesture);
        let Some(context) = self.context.take() else {
            return EventResponse::NONE;
        };
        let kind = gesture.kind();
        let placement = self.placement();
        let mut changed = context.moved;

        if let Some(idx) = self.layer_index(context.layer) {
            for point in self.layers[idx].points_mut() {
                point.fix = false;
            }
            if let Gesture::Draw(stroke) = gesture {
                changed = stroke.len() >= 2;
                if changed {
                    let points = stroke.finish(self.config.freehand_tolerance);
                    log::debug!("Stroke finished with {} points", points.len());
                    self.layers[idx].points_mut().extend(points);
                }
            }
            if let (Some(edit), Layer::Box(boxed)) = (context.box_edit, &mut self.layers[idx]) {
                if context.moved {
                    boxed.update_keys_from_working_points(&placement);
                } else if let Some(frame) = edit.inserted_frame {
                    timeline::remove_key(&mut boxed.keys, frame);
                }
                boxed.materialize(&placement);
            }
        }

        if changed && kind != Some(GestureKind::TimelineScrub) {
            self.history.push(context.before);
        }
        log::debug!("Gesture ended: {kind:?}");
        EventResponse {
            redraw: true,
            capture: Capture::Release,
        }
    }

    /// Abort any in-flight gesture through the normal cleanup path.
    pub fn cancel_gesture(&mut self) {
        if self.context.is_some() {
            self.end_gesture();
            self.release_pending = true;
            self.request_redraw();
        }
    }

    // --- Point edits ---

    fn delete_point(&mut self, idx: usize, point: usize) -> EventResponse {
        let len = self.layers[idx].points().len();
        if point == 0 || point + 1 >= len {
            log::debug!("Endpoint {point} is protected from deletion");
            return EventResponse::NONE;
        }
        self.record();
        self.layers[idx].points_mut().remove(point);
        self.hovered = match self.hovered {
            Some(h) if h == point => None,
            Some(h) if h > point => Some(h - 1),
            other => other,
        };
        EventResponse::redraw()
    }

    fn toggle_highlight(&mut self, idx: usize, point: usize) -> EventResponse {
        if point >= self.layers[idx].points().len() {
            return EventResponse::NONE;
        }
        self.record();
        let p = &mut self.layers[idx].points_mut()[point];
        p.highlighted = !p.highlighted;
        EventResponse::redraw()
    }

    fn append_point(&mut self, idx: usize, pointer: Point) -> EventResponse {
        self.record();
        self.layers[idx].points_mut().push(ControlPoint::new(pointer));
        EventResponse::redraw()
    }

    fn insert_point(&mut self, idx: usize, pointer: Point) -> EventResponse {
        let points = self.layers[idx].points();
        let at = points
            .windows(2)
            .enumerate()
            .map(|(i, pair)| (i + 1, point_segment_distance(pointer, pair[0].position, pair[1].position)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map_or(points.len(), |(i, _)| i);
        self.record();
        self.layers[idx].points_mut().insert(at, ControlPoint::new(pointer));
        EventResponse::redraw()
    }

    fn select_layer_near(&mut self, pointer: Point) -> EventResponse {
        let next = self.layer_near(pointer);
        if next == self.active {
            return EventResponse::NONE;
        }
        self.active = next;
        self.hovered = None;
        self.hovered_layer = None;
        log::info!("Active layer: {next:?}");
        EventResponse::redraw()
    }

    // --- Layer management ---

    fn push_layer(&mut self, layer: Layer) -> LayerId {
        self.cancel_gesture();
        self.record();
        let id = layer.id();
        log::info!("Added {:?} layer '{}'", layer.kind(), layer.name());
        self.layers.push(layer);
        self.active = Some(id);
        self.hovered = None;
        self.request_redraw();
        id
    }

    /// Add a spline with two default points and make it active.
    pub fn add_spline_layer(&mut self, name: impl Into<String>) -> LayerId {
        let placement = self.placement();
        let points = vec![
            ControlPoint::new(placement.to_canvas(Point::new(0.25, 0.5))),
            ControlPoint::new(placement.to_canvas(Point::new(0.75, 0.5))),
        ];
        self.push_layer(Layer::Spline(SplineLayer::new(name, points)))
    }

    /// Add an empty freehand layer and make it active.
    pub fn add_handdraw_layer(&mut self, name: impl Into<String>) -> LayerId {
        self.push_layer(Layer::Handdraw(HanddrawLayer::new(name)))
    }

    /// Add a box layer with one centered key at frame 1 and make it active.
    pub fn add_box_layer(&mut self, name: impl Into<String>) -> LayerId {
        let key = BoxKey {
            frame: 1,
            x: 0.5,
            y: 0.5,
            scale: 1.0,
            rotation: 0.0,
        };
        self.push_box_layer(BoxLayer::new(name, vec![key]))
    }

    /// Add a box layer with the given keys and make it active.
    pub fn push_box_layer(&mut self, mut layer: BoxLayer) -> LayerId {
        layer.timeline_point = self.timeline.frame;
        layer.materialize(&self.placement());
        self.push_layer(Layer::Box(layer))
    }

    /// Add a prepared spline or freehand layer and make it active.
    pub fn push_point_layer(&mut self, layer: Layer) -> LayerId {
        match layer {
            Layer::Box(boxed) => self.push_box_layer(boxed),
            other => self.push_layer(other),
        }
    }

    pub fn remove_layer(&mut self, id: LayerId) -> bool {
        let Some(idx) = self.layer_index(id) else {
            log::warn!("Cannot remove unknown layer {id}");
            return false;
        };
        if self.context.as_ref().is_some_and(|c| c.layer == id) {
            self.cancel_gesture();
        }
        self.record();
        let layer = self.layers.remove(idx);
        log::info!("Removed layer '{}'", layer.name());
        if self.active == Some(id) {
            self.active = None;
            self.hovered = None;
        }
        if self.hovered_layer == Some(id) {
            self.hovered_layer = None;
        }
        self.request_redraw();
        true
    }

    pub fn rename_layer(&mut self, id: LayerId, name: impl Into<String>) -> bool {
        let Some(idx) = self.layer_index(id) else {
            return false;
        };
        self.record();
        self.layers[idx].set_name(name);
        self.request_redraw();
        true
    }

    /// Make a layer active, or clear the active layer with `None`.
    pub fn set_active(&mut self, id: Option<LayerId>) -> bool {
        if let Some(id) = id {
            if self.layer_index(id).is_none() {
                log::warn!("Cannot activate unknown layer {id}");
                return false;
            }
        }
        if self.active != id {
            self.cancel_gesture();
            self.active = id;
            self.hovered = None;
            self.request_redraw();
        }
        true
    }

    /// Flip whether a box layer follows the global timeline.
    pub fn toggle_box_enabled(&mut self, id: LayerId) -> Option<bool> {
        let idx = self.layer_index(id)?;
        let enabled = {
            let boxed = self.layers[idx].as_box_mut()?;
            boxed.enabled = !boxed.enabled;
            boxed.enabled
        };
        self.request_redraw();
        Some(enabled)
    }

    // --- Background ---

    /// Keep every point at the same normalized position after the active
    /// placement changed from `old`.
    fn reproject_from(&mut self, old: Placement) {
        let new = self.placement();
        if old == new {
            return;
        }
        for layer in &mut self.layers {
            match layer {
                Layer::Box(boxed) => boxed.materialize(&new),
                other => {
                    for point in other.points_mut() {
                        point.position = old.reproject(point.position, &new);
                    }
                }
            }
        }
        log::debug!("Re-projected layers onto {}x{} background", new.width, new.height);
    }

    fn change_background(&mut self, change: impl FnOnce(&mut Self)) {
        self.cancel_gesture();
        let old = self.placement();
        change(self);
        self.reproject_from(old);
        self.request_redraw();
    }

    pub fn set_canvas_size(&mut self, size: Size) {
        self.change_background(|s| s.background.canvas = size);
    }

    pub fn set_background_image(&mut self, placement: Option<Placement>) {
        self.change_background(|s| s.background.image = placement);
    }

    /// Attach a background video; it drives normalized space once ready.
    pub fn attach_video(&mut self, element: Box<dyn VideoElement>, placement: Placement) {
        self.change_background(|s| {
            s.background.video = Some(placement);
            s.video.attach(element);
            // Catch up with the current frame once ready.
            s.video.seek_to_frame(s.timeline.frame, s.timeline.max_frames);
        });
    }

    /// Update where the video lands, e.g. once its native size is known.
    pub fn set_video_placement(&mut self, placement: Placement) {
        self.change_background(|s| s.background.video = Some(placement));
    }

    pub fn detach_video(&mut self) {
        self.change_background(|s| {
            s.background.video = None;
            s.video.detach();
        });
    }

    /// Video metadata is available.
    pub fn video_ready(&mut self, duration: f64) {
        let max_frames = self.timeline.max_frames;
        self.change_background(|s| {
            s.video.mark_ready(duration, max_frames);
        });
    }

    pub fn video_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.change_background(|s| s.video.mark_error(message));
    }

    // --- Timeline ---

    /// Move every enabled box layer and the video to `frame`.
    fn commit_frame(&mut self, frame: i64) -> u32 {
        let frame = self.timeline.seek(frame);
        let placement = self.placement();
        for layer in &mut self.layers {
            if let Layer::Box(boxed) = layer {
                if boxed.enabled {
                    boxed.timeline_point = frame;
                    boxed.refresh_active_point(&placement);
                }
            }
        }
        self.video.seek_to_frame(frame, self.timeline.max_frames);
        frame
    }

    /// Set the global frame. Returns the clamped frame.
    pub fn set_frame(&mut self, frame: i64) -> u32 {
        self.cancel_gesture();
        let frame = self.commit_frame(frame);
        self.request_redraw();
        frame
    }

    /// Move a single box layer to `frame`. Returns the clamped frame, or
    /// `None` if the layer is not a box layer.
    pub fn apply_frame(&mut self, id: LayerId, frame: i64) -> Option<u32> {
        let frame = clamp_frame(frame, self.timeline.max_frames);
        let placement = self.placement();
        let idx = self.layer_index(id);
        let Some(boxed) = idx.and_then(|i| self.layers[i].as_box_mut()) else {
            log::warn!("apply_frame on missing or non-box layer {id}");
            return None;
        };
        boxed.timeline_point = frame;
        boxed.refresh_active_point(&placement);
        self.timeline.frame = frame;
        self.video.seek_to_frame(frame, self.timeline.max_frames);
        self.request_redraw();
        Some(frame)
    }

    /// Store the box layer's interpolated point as a key at its current
    /// frame. Returns that frame.
    pub fn set_keyframe(&mut self, id: LayerId) -> Option<u32> {
        let idx = self.layer_index(id)?;
        let placement = self.placement();
        let snapshot = self.snapshot();
        let boxed = self.layers[idx].as_box_mut()?;
        let frame = boxed.timeline_point;
        let key = key_from_point(frame, boxed.active_point.as_ref()?, &placement);
        upsert_key(&mut boxed.keys, key);
        boxed.materialize(&placement);
        self.history.push(snapshot);
        self.request_redraw();
        Some(frame)
    }

    /// Remove the key at `frame`. The last remaining key is never removed.
    pub fn delete_keyframe(&mut self, id: LayerId, frame: u32) -> bool {
        let Some(idx) = self.layer_index(id) else {
            return false;
        };
        let placement = self.placement();
        let snapshot = self.snapshot();
        let Some(boxed) = self.layers[idx].as_box_mut() else {
            return false;
        };
        if boxed.keys.len() <= 1 {
            log::warn!("Refusing to delete the only key of '{}'", boxed.name);
            return false;
        }
        if timeline::remove_key(&mut boxed.keys, frame).is_none() {
            return false;
        }
        boxed.materialize(&placement);
        self.history.push(snapshot);
        self.request_redraw();
        true
    }

    /// Jump the box layer to its next key.
    pub fn next_keyframe(&mut self, id: LayerId) -> Option<u32> {
        let boxed = self.layer(id)?.as_box()?;
        let frame = timeline::next_key_frame(&boxed.keys, boxed.timeline_point)?;
        self.apply_frame(id, i64::from(frame))
    }

    /// Jump the box layer to its previous key.
    pub fn prev_keyframe(&mut self, id: LayerId) -> Option<u32> {
        let boxed = self.layer(id)?.as_box()?;
        let frame = timeline::prev_key_frame(&boxed.keys, boxed.timeline_point)?;
        self.apply_frame(id, i64::from(frame))
    }

    // --- History ---

    fn restore(&mut self, snapshot: Snapshot) {
        let placement = self.placement();
        self.layers = snapshot.layers;
        self.active = snapshot.active.filter(|id| self.layers.iter().any(|l| l.id() == *id));
        self.hovered = None;
        self.hovered_layer = None;
        for layer in &mut self.layers {
            if let Layer::Box(boxed) = layer {
                boxed.materialize(&placement);
            }
        }
        self.request_redraw();
    }

    pub fn undo(&mut self) -> bool {
        if self.context.is_some() {
            return false;
        }
        let current = self.snapshot();
        match self.history.undo(current) {
            Some(snapshot) => {
                self.restore(snapshot);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        if self.context.is_some() {
            return false;
        }
        let current = self.snapshot();
        match self.history.redo(current) {
            Some(snapshot) => {
                self.restore(snapshot);
                true
            }
            None => false,
        }
    }

    // --- Persistence ---

    /// Replace all layers with a persisted document.
    pub fn load_document(&mut self, document: Document) {
        self.cancel_gesture();
        let placement = self.placement();
        let max_frames = self.timeline.max_frames;
        self.layers = document
            .layers
            .into_iter()
            .map(|layer| layer.into_layer(&placement, max_frames))
            .collect();
        self.active = document.active.and_then(|i| self.layers.get(i)).map(Layer::id);
        self.hovered = None;
        self.hovered_layer = None;
        self.history.clear();
        if let Some(frame) = self.active_layer().and_then(Layer::as_box).map(|b| b.timeline_point) {
            self.timeline.frame = frame;
        }
        log::info!("Loaded document with {} layers", self.layers.len());
        self.request_redraw();
    }

    pub fn load_json(&mut self, json: &str) -> Result<(), PersistError> {
        let document = Document::from_json(json)?;
        self.load_document(document);
        Ok(())
    }

    /// Normalize the current layers into their persisted form.
    pub fn to_document(&self) -> Document {
        let placement = self.placement();
        Document {
            layers: self
                .layers
                .iter()
                .map(|layer| PersistedLayer::from_layer(layer, &placement))
                .collect(),
            active: self.active_index(),
        }
    }

    pub fn to_json(&self) -> Result<String, PersistError> {
        self.to_document().to_json()
    }
}

fn key_from_point(frame: u32, point: &ControlPoint, placement: &Placement) -> BoxKey {
    let normalized = placement.to_normalized(point.position);
    BoxKey {
        frame,
        x: normalized.x,
        y: normalized.y,
        scale: clamp_point_scale(point.scale),
        rotation: point.rotation,
    }
}

fn check_snapshot(group: &GroupTransform, points: &[ControlPoint]) -> Result<(), GestureError> {
    if group.original.len() != points.len() {
        return Err(GestureError::SnapshotMismatch {
            expected: group.original.len(),
            found: points.len(),
        });
    }
    Ok(())
}

fn write_positions(points: &mut [ControlPoint], positions: Vec<Point>) {
    for (point, position) in points.iter_mut().zip(positions) {
        point.position = position;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn down(x: f64, y: f64, button: MouseButton, modifiers: Modifiers) -> PointerEvent {
        PointerEvent::Down {
            position: Point::new(x, y),
            button,
            modifiers,
        }
    }

    fn mv(x: f64, y: f64) -> PointerEvent {
        PointerEvent::Move {
            position: Point::new(x, y),
        }
    }

    fn up(x: f64, y: f64) -> PointerEvent {
        PointerEvent::Up {
            position: Point::new(x, y),
        }
    }

    fn spline_session(coords: &[(f64, f64)]) -> (EditorSession, LayerId) {
        let mut session = EditorSession::default();
        let points = coords.iter().map(|&(x, y)| ControlPoint::new(Point::new(x, y))).collect();
        let id = session.push_point_layer(Layer::Spline(SplineLayer::new("s", points)));
        (session, id)
    }

    fn positions(session: &EditorSession) -> Vec<Point> {
        session.active_layer().unwrap().points().iter().map(|p| p.position).collect()
    }

    #[test]
    fn test_point_drag_moves_with_offset() {
        let (mut session, _) = spline_session(&[(100.0, 100.0), (200.0, 100.0)]);
        let response = session.handle_pointer(down(102.0, 101.0, MouseButton::Primary, Modifiers::NONE));
        assert_eq!(response.capture, Capture::Begin);
        assert!(session.active_layer().unwrap().points()[0].fix);

        session.handle_pointer(mv(112.0, 121.0));
        assert_eq!(positions(&session)[0], Point::new(110.0, 120.0));

        let response = session.handle_pointer(up(112.0, 121.0));
        assert_eq!(response.capture, Capture::Release);
        assert!(!session.active_layer().unwrap().points()[0].fix);
        assert!(session.can_undo());
    }

    #[test]
    fn test_click_without_move_records_nothing() {
        let (mut session, _) = spline_session(&[(100.0, 100.0), (200.0, 100.0)]);
        let undo_before = session.can_undo();
        session.handle_pointer(down(100.0, 100.0, MouseButton::Primary, Modifiers::NONE));
        session.handle_pointer(up(100.0, 100.0));
        assert_eq!(session.can_undo(), undo_before);
    }

    #[test]
    fn test_overlapping_down_is_ignored() {
        let (mut session, _) = spline_session(&[(100.0, 100.0), (200.0, 100.0)]);
        session.handle_pointer(down(100.0, 100.0, MouseButton::Primary, Modifiers::NONE));
        let response = session.handle_pointer(down(200.0, 100.0, MouseButton::Middle, Modifiers::alt()));
        assert_eq!(response, EventResponse::NONE);
        assert_eq!(session.gesture_kind(), Some(GestureKind::PointDrag));
    }

    #[test]
    fn test_right_click_deletes_interior_only() {
        let (mut session, _) = spline_session(&[(0.0, 0.0), (50.0, 0.0), (100.0, 0.0)]);
        session.handle_pointer(down(100.0, 0.0, MouseButton::Secondary, Modifiers::NONE));
        assert_eq!(positions(&session).len(), 3);
        session.handle_pointer(down(50.0, 0.0, MouseButton::Secondary, Modifiers::NONE));
        assert_eq!(positions(&session), vec![Point::new(0.0, 0.0), Point::new(100.0, 0.0)]);
        assert!(session.gesture_kind().is_none());
    }

    #[test]
    fn test_ctrl_right_click_toggles_highlight() {
        let (mut session, _) = spline_session(&[(0.0, 0.0), (50.0, 0.0)]);
        session.handle_pointer(down(50.0, 0.0, MouseButton::Secondary, Modifiers::ctrl()));
        assert!(session.active_layer().unwrap().points()[1].highlighted);
    }

    #[test]
    fn test_append_and_insert_points() {
        let (mut session, _) = spline_session(&[(0.0, 0.0), (100.0, 0.0)]);
        session.handle_pointer(down(300.0, 300.0, MouseButton::Primary, Modifiers::shift()));
        assert_eq!(positions(&session).last(), Some(&Point::new(300.0, 300.0)));

        session.handle_pointer(down(50.0, 40.0, MouseButton::Primary, Modifiers::ctrl()));
        assert_eq!(positions(&session)[1], Point::new(50.0, 40.0));
        assert_eq!(positions(&session).len(), 4);
    }

    #[test]
    fn test_group_translate_is_rigid() {
        let (mut session, _) = spline_session(&[(0.0, 0.0), (100.0, 0.0), (100.0, 100.0)]);
        session.handle_pointer(down(100.0, 0.0, MouseButton::Middle, Modifiers::alt()));
        for step in 1..=10 {
            session.handle_pointer(mv(100.0 + f64::from(step), 0.0));
        }
        session.handle_pointer(up(110.0, 5.0));
        assert_eq!(
            positions(&session),
            vec![Point::new(10.0, 5.0), Point::new(110.0, 5.0), Point::new(110.0, 105.0)]
        );
    }

    #[test]
    fn test_group_gesture_aborts_when_points_change() {
        let (mut session, id) = spline_session(&[(0.0, 0.0), (100.0, 0.0), (200.0, 0.0)]);
        session.history.clear();
        session.handle_pointer(down(0.0, 0.0, MouseButton::Primary, Modifiers::alt()));
        let idx = session.layer_index(id).unwrap();
        session.layers[idx].points_mut().pop();

        let response = session.handle_pointer(mv(0.0, 50.0));
        assert_eq!(response.capture, Capture::Release);
        assert!(session.gesture_kind().is_none());
        assert_eq!(positions(&session), vec![Point::new(0.0, 0.0), Point::new(100.0, 0.0)]);
        // The rejected step changed nothing, so there is nothing to undo.
        assert!(!session.can_undo());
    }

    #[test]
    fn test_idle_hover_finds_inactive_layers() {
        let (mut session, first) = spline_session(&[(0.0, 0.0), (100.0, 0.0)]);
        let second = session.add_spline_layer("other");
        assert_eq!(session.active_id(), Some(second));

        assert!(session.handle_pointer(mv(50.0, 10.0)).redraw);
        assert_eq!(session.hovered_layer(), Some(first));
        let scene = session.scene();
        assert!(scene.layers[0].hovered);
        assert!(!scene.layers[1].hovered);

        session.handle_pointer(mv(300.0, 400.0));
        assert_eq!(session.hovered_layer(), None);
    }

    #[test]
    fn test_hover_tracks_active_points() {
        let (mut session, _) = spline_session(&[(0.0, 0.0), (100.0, 0.0)]);
        assert!(session.handle_pointer(mv(99.0, 1.0)).redraw);
        assert_eq!(session.hovered(), Some(1));
        assert!(!session.handle_pointer(mv(98.0, 1.0)).redraw);
        session.handle_pointer(mv(300.0, 300.0));
        assert_eq!(session.hovered(), None);
    }

    #[test]
    fn test_click_selects_nearby_inactive_layer() {
        let (mut session, first) = spline_session(&[(0.0, 0.0), (100.0, 0.0)]);
        let second = session.add_spline_layer("other");
        assert_eq!(session.active_id(), Some(second));

        session.handle_pointer(down(50.0, 10.0, MouseButton::Primary, Modifiers::NONE));
        assert_eq!(session.active_id(), Some(first));

        session.handle_pointer(down(50.0, 400.0, MouseButton::Primary, Modifiers::NONE));
        assert_eq!(session.active_id(), None);
    }

    #[test]
    fn test_freehand_stroke_is_committed() {
        let mut session = EditorSession::default();
        session.add_handdraw_layer("ink");
        session.handle_pointer(down(0.0, 0.0, MouseButton::Primary, Modifiers::NONE));
        assert_eq!(session.gesture_kind(), Some(GestureKind::Draw));
        for i in 1..=20 {
            session.handle_pointer(mv(f64::from(i) * 5.0, 0.0));
        }
        assert_eq!(session.scene().stroke.len(), 21);
        session.handle_pointer(up(100.0, 0.0));
        assert_eq!(positions(&session), vec![Point::new(0.0, 0.0), Point::new(100.0, 0.0)]);
    }

    #[test]
    fn test_background_change_reprojects_points() {
        let mut session = EditorSession::default();
        session.set_background_image(Some(Placement::new(100.0, 100.0)));
        let id = session.add_spline_layer("s");
        assert_eq!(positions(&session)[0], Point::new(25.0, 50.0));

        session.set_background_image(Some(
            Placement::new(100.0, 100.0).with_transform(2.0, kurbo::Vec2::new(10.0, 0.0)),
        ));
        assert_eq!(positions(&session)[0], Point::new(60.0, 100.0));
        assert_eq!(session.canvas_scale(), 2.0);
        assert!(session.layer(id).is_some());
    }

    #[test]
    fn test_undo_redo_layer_edits() {
        let mut session = EditorSession::default();
        let id = session.add_spline_layer("s");
        session.rename_layer(id, "renamed");
        assert!(session.undo());
        assert_eq!(session.layer(id).unwrap().name(), "s");
        assert!(session.redo());
        assert_eq!(session.layer(id).unwrap().name(), "renamed");
        assert!(session.undo());
        assert!(session.undo());
        assert!(session.layers().is_empty());
        assert_eq!(session.active_id(), None);
    }

    #[test]
    fn test_delete_keyframe_keeps_last_key() {
        let mut session = EditorSession::default();
        let id = session.add_box_layer("box");
        assert!(!session.delete_keyframe(id, 1));
        session.apply_frame(id, 10);
        assert_eq!(session.set_keyframe(id), Some(10));
        assert!(session.delete_keyframe(id, 1));
        assert_eq!(session.layer(id).unwrap().as_box().unwrap().keys.len(), 1);
    }
}
