//! Mapping raw pointer positions into canvas-local coordinates.

use kurbo::{Affine, Point};
use serde::{Deserialize, Serialize};

/// Client-space position(s) extracted from a DOM pointer event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PointerSample {
    /// Mouse or pointer event.
    Mouse { client: Point },
    /// Touch event; only the first touch is used.
    Touch { touches: Vec<Point> },
}

impl PointerSample {
    /// The client position that drives editing, if any.
    pub fn client(&self) -> Option<Point> {
        match self {
            PointerSample::Mouse { client } => Some(*client),
            PointerSample::Touch { touches } => touches.first().copied(),
        }
    }
}

/// Host viewport state: where the canvas sits on the page and how much the
/// host node graph is zoomed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Top-left of the canvas bounding rect in client pixels, if mounted.
    pub canvas_origin: Option<Point>,
    /// Host zoom factor applied to the whole widget.
    pub zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            canvas_origin: None,
            zoom: 1.0,
        }
    }
}

impl Viewport {
    pub fn new() -> Self {
        Self::default()
    }

    fn effective_zoom(&self) -> f64 {
        if self.zoom.is_finite() && self.zoom > 0.0 {
            self.zoom
        } else {
            1.0
        }
    }

    /// Transform from canvas-local to client coordinates.
    pub fn transform(&self) -> Affine {
        let origin = self.canvas_origin.unwrap_or(Point::ZERO);
        Affine::translate(origin.to_vec2()) * Affine::scale(self.effective_zoom())
    }

    /// Transform from client to canvas-local coordinates.
    pub fn inverse_transform(&self) -> Affine {
        let origin = self.canvas_origin.unwrap_or(Point::ZERO);
        Affine::scale(1.0 / self.effective_zoom()) * Affine::translate(-origin.to_vec2())
    }

    /// Canvas-local position of a pointer sample.
    ///
    /// Returns the origin when the canvas is not mounted yet or the sample
    /// carries no position.
    pub fn client_to_canvas(&self, sample: Option<&PointerSample>) -> Point {
        let Some(client) = sample.and_then(PointerSample::client) else {
            return Point::ZERO;
        };
        if self.canvas_origin.is_none() {
            return Point::ZERO;
        }
        self.inverse_transform() * client
    }
}
