//! DOM helpers: pointer extraction and listener ownership.

use kurbo::Point;
use splinekit_core::{Modifiers, PointerSample};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{Event, EventTarget, MouseEvent, TouchEvent, TouchList};

fn touch_points(list: &TouchList) -> Vec<Point> {
    (0..list.length())
        .filter_map(|i| list.get(i))
        .map(|t| Point::new(f64::from(t.client_x()), f64::from(t.client_y())))
        .collect()
}

/// Client position(s) of a mouse, pointer, or touch event.
pub fn pointer_sample(event: &Event) -> Option<PointerSample> {
    if event.type_().starts_with("touch") {
        let touch: &TouchEvent = event.unchecked_ref();
        let mut touches = touch_points(&touch.touches());
        if touches.is_empty() {
            touches = touch_points(&touch.changed_touches());
        }
        return Some(PointerSample::Touch { touches });
    }
    event.dyn_ref::<MouseEvent>().map(|m| PointerSample::Mouse {
        client: Point::new(f64::from(m.client_x()), f64::from(m.client_y())),
    })
}

pub fn modifiers(event: &MouseEvent) -> Modifiers {
    Modifiers {
        shift: event.shift_key(),
        ctrl: event.ctrl_key(),
        alt: event.alt_key(),
        meta: event.meta_key(),
    }
}

/// Event listeners on one target, removed together.
///
/// Dropping the value removes every listener. [`Listeners::detach`] removes
/// them early but keeps the closures alive, so it is safe to call from
/// inside one of the handlers.
pub struct Listeners {
    target: EventTarget,
    handlers: Vec<(&'static str, Closure<dyn FnMut(Event)>)>,
    attached: bool,
}

impl Listeners {
    pub fn new(target: EventTarget) -> Self {
        Self {
            target,
            handlers: Vec::new(),
            attached: true,
        }
    }

    pub fn listen(&mut self, event: &'static str, handler: impl FnMut(Event) + 'static) -> Result<(), JsValue> {
        let closure = Closure::<dyn FnMut(Event)>::new(handler);
        self.target
            .add_event_listener_with_callback(event, closure.as_ref().unchecked_ref())?;
        self.handlers.push((event, closure));
        Ok(())
    }

    pub fn detach(&mut self) {
        if !self.attached {
            return;
        }
        for (event, closure) in &self.handlers {
            if let Err(err) = self
                .target
                .remove_event_listener_with_callback(event, closure.as_ref().unchecked_ref())
            {
                log::warn!("Failed to remove {event} listener: {err:?}");
            }
        }
        self.attached = false;
    }
}

impl Drop for Listeners {
    fn drop(&mut self) {
        self.detach();
    }
}
