//! The `SplineEditor` object exported to JavaScript.

use crate::dom::{Listeners, modifiers, pointer_sample};
use crate::media::{HtmlVideoSink, JsRenderer};
use kurbo::{Point, Size, Vec2};
use splinekit_core::{Capture, EditorConfig, EditorSession, LayerId, MouseButton, Placement, PointerEvent};
use std::cell::{Cell, RefCell, RefMut};
use std::ops::{Deref, DerefMut};
use std::rc::{Rc, Weak};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{Event, HtmlCanvasElement, HtmlVideoElement, MouseEvent};

/// HTMLMediaElement.HAVE_METADATA
const HAVE_METADATA: u16 = 1;

struct Shared {
    session: RefCell<EditorSession>,
    canvas: HtmlCanvasElement,
    /// Document listeners for the gesture in flight.
    capture: RefCell<Option<Listeners>>,
    /// Detached capture listeners whose closures may still be on the stack.
    retired: RefCell<Vec<Listeners>>,
    canvas_listeners: RefCell<Option<Listeners>>,
    video_listeners: RefCell<Option<Listeners>>,
    video_transform: Cell<(f64, Vec2)>,
}

/// Mutable session access. Dropping it releases the capture listeners if
/// the call cancelled a gesture.
struct SessionGuard<'a> {
    shared: &'a Shared,
    session: RefMut<'a, EditorSession>,
}

impl Deref for SessionGuard<'_> {
    type Target = EditorSession;

    fn deref(&self) -> &EditorSession {
        &self.session
    }
}

impl DerefMut for SessionGuard<'_> {
    fn deref_mut(&mut self) -> &mut EditorSession {
        &mut self.session
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        if self.session.take_pending_release() {
            self.shared.release_capture();
        }
    }
}

impl Shared {
    fn edit(&self) -> SessionGuard<'_> {
        SessionGuard {
            shared: self,
            session: self.session.borrow_mut(),
        }
    }

    fn dispatch(self: &Rc<Self>, event: &Event) {
        let Some(sample) = pointer_sample(event) else {
            return;
        };
        let response = {
            let mut session = self.session.borrow_mut();
            let rect = self.canvas.get_bounding_client_rect();
            session.viewport_mut().canvas_origin = Some(Point::new(rect.left(), rect.top()));
            let position = session.viewport().client_to_canvas(Some(&sample));

            let pointer = match event.type_().as_str() {
                "pointerdown" => {
                    let Some(mouse) = event.dyn_ref::<MouseEvent>() else {
                        return;
                    };
                    let Some(button) = MouseButton::from_dom(mouse.button()) else {
                        return;
                    };
                    event.prevent_default();
                    PointerEvent::Down {
                        position,
                        button,
                        modifiers: modifiers(mouse),
                    }
                }
                "pointermove" => PointerEvent::Move { position },
                "pointerup" => PointerEvent::Up { position },
                "pointercancel" => PointerEvent::Cancel,
                _ => return,
            };
            session.handle_pointer(pointer)
        };

        match response.capture {
            Capture::Begin => self.begin_capture(),
            Capture::Release => self.release_capture(),
            Capture::Keep => {}
        }
    }

    fn begin_capture(self: &Rc<Self>) {
        self.release_capture();
        self.retired.borrow_mut().clear();

        let Some(document) = web_sys::window().and_then(|w| w.document()) else {
            log::error!("No document to capture pointer events on");
            return;
        };
        let mut listeners = Listeners::new(document.into());
        for name in ["pointermove", "pointerup", "pointercancel"] {
            let weak = Rc::downgrade(self);
            if let Err(err) = listeners.listen(name, move |event| {
                if let Some(shared) = weak.upgrade() {
                    shared.dispatch(&event);
                }
            }) {
                log::error!("Failed to attach {name} listener: {err:?}");
            }
        }
        *self.capture.borrow_mut() = Some(listeners);
    }

    fn release_capture(&self) {
        let Some(mut listeners) = self.capture.borrow_mut().take() else {
            return;
        };
        listeners.detach();
        self.retired.borrow_mut().push(listeners);
    }

    fn attach_canvas(self: &Rc<Self>) -> Result<(), JsValue> {
        let mut listeners = Listeners::new(self.canvas.clone().into());
        let weak: Weak<Self> = Rc::downgrade(self);
        listeners.listen("pointerdown", move |event| {
            if let Some(shared) = weak.upgrade() {
                shared.dispatch(&event);
            }
        })?;
        listeners.listen("contextmenu", |event| event.prevent_default())?;
        *self.canvas_listeners.borrow_mut() = Some(listeners);
        Ok(())
    }

    fn video_loaded(&self, video: &HtmlVideoElement) {
        let (scale, offset) = self.video_transform.get();
        let placement = Placement::new(f64::from(video.video_width()), f64::from(video.video_height()))
            .with_transform(scale, offset);
        let mut session = self.edit();
        session.set_video_placement(placement);
        session.video_ready(video.duration());
    }
}

/// Spline and keyframe-box editor bound to one canvas element.
#[wasm_bindgen]
pub struct SplineEditor {
    shared: Rc<Shared>,
}

fn parse_id(id: &str) -> Result<LayerId, JsValue> {
    id.parse::<LayerId>()
        .map_err(|e| JsValue::from_str(&format!("invalid layer id {id:?}: {e}")))
}

fn js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

impl SplineEditor {
    fn session(&self) -> SessionGuard<'_> {
        self.shared.edit()
    }
}

#[wasm_bindgen]
impl SplineEditor {
    /// Bind to `canvas`, optionally configured from a JSON object string.
    #[wasm_bindgen(constructor)]
    pub fn new(canvas: HtmlCanvasElement, config_json: Option<String>) -> Result<SplineEditor, JsValue> {
        let config = match config_json {
            Some(json) => EditorConfig::from_json(&json).map_err(js_error)?,
            None => EditorConfig::default(),
        };
        let mut session = EditorSession::new(config);
        session.set_canvas_size(Size::new(f64::from(canvas.width()), f64::from(canvas.height())));

        let shared = Rc::new(Shared {
            session: RefCell::new(session),
            canvas,
            capture: RefCell::new(None),
            retired: RefCell::new(Vec::new()),
            canvas_listeners: RefCell::new(None),
            video_listeners: RefCell::new(None),
            video_transform: Cell::new((1.0, Vec2::ZERO)),
        });
        shared.attach_canvas()?;
        log::info!("SplineEditor attached");
        Ok(Self { shared })
    }

    /// Receive every scene as a plain object. The callback must not call
    /// back into the editor.
    #[wasm_bindgen(js_name = setRenderCallback)]
    pub fn set_render_callback(&self, callback: js_sys::Function) {
        self.session().set_renderer(Box::new(JsRenderer::new(callback)));
    }

    #[wasm_bindgen(js_name = clearRenderCallback)]
    pub fn clear_render_callback(&self) {
        self.session().clear_renderer();
    }

    #[wasm_bindgen(js_name = setZoom)]
    pub fn set_zoom(&self, zoom: f64) {
        if zoom.is_finite() && zoom > 0.0 {
            self.session().viewport_mut().zoom = zoom;
        }
    }

    #[wasm_bindgen(js_name = setCanvasSize)]
    pub fn set_canvas_size(&self, width: f64, height: f64) {
        self.session().set_canvas_size(Size::new(width, height));
    }

    #[wasm_bindgen(js_name = setBackgroundImage)]
    pub fn set_background_image(&self, width: f64, height: f64, scale: f64, offset_x: f64, offset_y: f64) {
        let placement = Placement::new(width, height).with_transform(scale, Vec2::new(offset_x, offset_y));
        self.session().set_background_image(Some(placement));
    }

    #[wasm_bindgen(js_name = clearBackgroundImage)]
    pub fn clear_background_image(&self) {
        self.session().set_background_image(None);
    }

    /// Drive normalized space and the timeline from a `<video>` element.
    #[wasm_bindgen(js_name = attachVideo)]
    pub fn attach_video(&self, video: HtmlVideoElement, scale: f64, offset_x: f64, offset_y: f64) -> Result<(), JsValue> {
        self.detach_video();
        let offset = Vec2::new(offset_x, offset_y);
        self.shared.video_transform.set((scale, offset));

        let placement = Placement::new(f64::from(video.video_width()), f64::from(video.video_height()))
            .with_transform(scale, offset);
        self.session()
            .attach_video(Box::new(HtmlVideoSink::new(video.clone())), placement);

        let mut listeners = Listeners::new(video.clone().into());
        let weak = Rc::downgrade(&self.shared);
        let element = video.clone();
        listeners.listen("loadedmetadata", move |_| {
            if let Some(shared) = weak.upgrade() {
                shared.video_loaded(&element);
            }
        })?;
        // Some browsers reach canplay without a separate loadedmetadata.
        let weak = Rc::downgrade(&self.shared);
        let element = video.clone();
        listeners.listen("canplay", move |_| {
            if let Some(shared) = weak.upgrade() {
                let ready = shared.session.borrow().video_state().is_ready();
                if !ready {
                    shared.video_loaded(&element);
                }
            }
        })?;
        let weak = Rc::downgrade(&self.shared);
        let element = video.clone();
        listeners.listen("error", move |_| {
            let message = element
                .error()
                .map(|e| format!("media error {}", e.code()))
                .unwrap_or_else(|| "media error".to_string());
            log::error!("Video failed: {message}");
            if let Some(shared) = weak.upgrade() {
                shared.edit().video_error(message);
            }
        })?;
        *self.shared.video_listeners.borrow_mut() = Some(listeners);

        if video.ready_state() >= HAVE_METADATA {
            self.shared.video_loaded(&video);
        }
        Ok(())
    }

    #[wasm_bindgen(js_name = detachVideo)]
    pub fn detach_video(&self) {
        if self.shared.video_listeners.borrow_mut().take().is_some() {
            self.session().detach_video();
        }
    }

    #[wasm_bindgen(js_name = addSplineLayer)]
    pub fn add_spline_layer(&self, name: &str) -> String {
        self.session().add_spline_layer(name).to_string()
    }

    #[wasm_bindgen(js_name = addHanddrawLayer)]
    pub fn add_handdraw_layer(&self, name: &str) -> String {
        self.session().add_handdraw_layer(name).to_string()
    }

    #[wasm_bindgen(js_name = addBoxLayer)]
    pub fn add_box_layer(&self, name: &str) -> String {
        self.session().add_box_layer(name).to_string()
    }

    #[wasm_bindgen(js_name = removeLayer)]
    pub fn remove_layer(&self, id: &str) -> Result<bool, JsValue> {
        Ok(self.session().remove_layer(parse_id(id)?))
    }

    #[wasm_bindgen(js_name = renameLayer)]
    pub fn rename_layer(&self, id: &str, name: &str) -> Result<bool, JsValue> {
        Ok(self.session().rename_layer(parse_id(id)?, name))
    }

    /// Activate a layer, or clear the selection with `undefined`.
    #[wasm_bindgen(js_name = setActive)]
    pub fn set_active(&self, id: Option<String>) -> Result<bool, JsValue> {
        let id = id.as_deref().map(parse_id).transpose()?;
        Ok(self.session().set_active(id))
    }

    #[wasm_bindgen(js_name = toggleBoxEnabled)]
    pub fn toggle_box_enabled(&self, id: &str) -> Result<Option<bool>, JsValue> {
        Ok(self.session().toggle_box_enabled(parse_id(id)?))
    }

    #[wasm_bindgen(js_name = setFrame)]
    pub fn set_frame(&self, frame: f64) -> u32 {
        self.session().set_frame(frame.round() as i64)
    }

    pub fn frame(&self) -> u32 {
        self.shared.session.borrow().timeline().frame
    }

    #[wasm_bindgen(js_name = setKeyframe)]
    pub fn set_keyframe(&self, id: &str) -> Result<Option<u32>, JsValue> {
        Ok(self.session().set_keyframe(parse_id(id)?))
    }

    #[wasm_bindgen(js_name = deleteKeyframe)]
    pub fn delete_keyframe(&self, id: &str, frame: u32) -> Result<bool, JsValue> {
        Ok(self.session().delete_keyframe(parse_id(id)?, frame))
    }

    #[wasm_bindgen(js_name = nextKeyframe)]
    pub fn next_keyframe(&self, id: &str) -> Result<Option<u32>, JsValue> {
        Ok(self.session().next_keyframe(parse_id(id)?))
    }

    #[wasm_bindgen(js_name = prevKeyframe)]
    pub fn prev_keyframe(&self, id: &str) -> Result<Option<u32>, JsValue> {
        Ok(self.session().prev_keyframe(parse_id(id)?))
    }

    pub fn undo(&self) -> bool {
        self.session().undo()
    }

    pub fn redo(&self) -> bool {
        self.session().redo()
    }

    /// Replace the document with a saved one.
    pub fn load(&self, json: &str) -> Result<(), JsValue> {
        self.session().load_json(json).map_err(js_error)
    }

    pub fn save(&self) -> Result<String, JsValue> {
        self.shared.session.borrow().to_json().map_err(js_error)
    }

    /// Current scene as a plain object.
    pub fn scene(&self) -> Result<JsValue, JsValue> {
        let scene = self.shared.session.borrow().scene();
        serde_wasm_bindgen::to_value(&scene).map_err(js_error)
    }

    pub fn redraw(&self) {
        self.session().request_redraw();
    }
}

impl Drop for SplineEditor {
    fn drop(&mut self) {
        self.shared.release_capture();
        self.shared.retired.borrow_mut().clear();
        self.shared.canvas_listeners.borrow_mut().take();
        self.shared.video_listeners.borrow_mut().take();
        log::info!("SplineEditor detached");
    }
}
