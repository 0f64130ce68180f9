//! SplineKit browser bridge
//!
//! Binds an [`splinekit_core::EditorSession`] to a canvas element: pointer
//! events in, scenes out through a JS callback, and an optional `<video>`
//! driving the timeline.

#[cfg(target_arch = "wasm32")]
mod dom;
#[cfg(target_arch = "wasm32")]
mod editor;
#[cfg(target_arch = "wasm32")]
mod media;
#[cfg(target_arch = "wasm32")]
mod web;

#[cfg(target_arch = "wasm32")]
pub use editor::SplineEditor;
#[cfg(target_arch = "wasm32")]
pub use media::{HtmlVideoSink, JsRenderer};
