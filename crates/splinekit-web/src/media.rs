//! Host collaborators: the `<video>` element and the JS render callback.

use splinekit_core::{Renderer, RendererError, Scene, VideoElement};
use wasm_bindgen::JsValue;
use web_sys::HtmlVideoElement;

/// Seeks a DOM video element.
pub struct HtmlVideoSink {
    element: HtmlVideoElement,
}

impl HtmlVideoSink {
    pub fn new(element: HtmlVideoElement) -> Self {
        Self { element }
    }
}

impl VideoElement for HtmlVideoSink {
    fn seek(&mut self, time: f64) {
        self.element.set_current_time(time);
    }

    fn pause(&mut self) {
        if !self.element.paused() {
            if let Err(err) = self.element.pause() {
                log::warn!("Video pause failed: {err:?}");
            }
        }
    }
}

/// Hands each scene to a JS function as a plain object.
///
/// The callback runs while the editor is busy and must not call back into
/// it synchronously.
pub struct JsRenderer {
    callback: js_sys::Function,
}

impl JsRenderer {
    pub fn new(callback: js_sys::Function) -> Self {
        Self { callback }
    }
}

impl Renderer for JsRenderer {
    fn render(&mut self, scene: &Scene) -> Result<(), RendererError> {
        let value = serde_wasm_bindgen::to_value(scene).map_err(|e| RendererError::RenderFailed(e.to_string()))?;
        self.callback
            .call1(&JsValue::NULL, &value)
            .map_err(|e| RendererError::RenderFailed(format!("{e:?}")))?;
        Ok(())
    }
}
