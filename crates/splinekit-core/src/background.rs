//! Background placement: how normalized coordinates land on the canvas.

use crate::geometry::{denormalize, normalize};
use kurbo::{Point, Size, Vec2};
use serde::{Deserialize, Serialize};

/// Placement of a background (image, video, or the bare canvas) in canvas
/// pixel space.
///
/// `width`/`height` are the background's native pixel dimensions; `scale`
/// and `offset` map those pixels onto the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub width: f64,
    pub height: f64,
    pub scale: f64,
    pub offset: Vec2,
}

impl Placement {
    /// A placement drawn 1:1 at the canvas origin.
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            scale: 1.0,
            offset: Vec2::ZERO,
        }
    }

    pub fn with_transform(mut self, scale: f64, offset: Vec2) -> Self {
        self.scale = scale;
        self.offset = offset;
        self
    }

    fn effective_scale(&self) -> f64 {
        if self.scale.is_finite() && self.scale > 0.0 {
            self.scale
        } else {
            1.0
        }
    }

    /// Map a normalized [0,1] point to canvas pixels.
    pub fn to_canvas(&self, normalized: Point) -> Point {
        let native = denormalize(normalized, self.width, self.height);
        Point::new(
            self.offset.x + native.x * self.effective_scale(),
            self.offset.y + native.y * self.effective_scale(),
        )
    }

    /// Map a canvas pixel point to normalized [0,1] background space.
    pub fn to_normalized(&self, canvas: Point) -> Point {
        let scale = self.effective_scale();
        let native = Point::new(
            (canvas.x - self.offset.x) / scale,
            (canvas.y - self.offset.y) / scale,
        );
        normalize(native, self.width, self.height)
    }

    /// Re-project a canvas point placed under `self` so it keeps its
    /// normalized position under `other`.
    pub fn reproject(&self, canvas: Point, other: &Placement) -> Point {
        other.to_canvas(self.to_normalized(canvas))
    }
}

/// The editor background: the canvas itself plus optional image and video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Background {
    /// Internal pixel size of the canvas element.
    pub canvas: Size,
    pub image: Option<Placement>,
    pub video: Option<Placement>,
}

impl Default for Background {
    fn default() -> Self {
        Self {
            canvas: Size::new(512.0, 512.0),
            image: None,
            video: None,
        }
    }
}

impl Background {
    /// The placement that currently defines normalized space: the video if
    /// it is ready, else the image, else the bare canvas.
    pub fn active(&self, video_ready: bool) -> Placement {
        if video_ready {
            if let Some(video) = self.video {
                return video;
            }
        }
        self.image
            .unwrap_or_else(|| Placement::new(self.canvas.width, self.canvas.height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_canvas_applies_scale_and_offset() {
        let placement = Placement::new(1920.0, 1080.0).with_transform(0.25, Vec2::new(16.0, 8.0));
        let p = placement.to_canvas(Point::new(0.5, 0.5));
        assert!((p.x - (16.0 + 960.0 * 0.25)).abs() < 1e-9);
        assert!((p.y - (8.0 + 540.0 * 0.25)).abs() < 1e-9);
    }

    #[test]
    fn test_canvas_normalized_roundtrip() {
        let placement = Placement::new(640.0, 360.0).with_transform(0.8, Vec2::new(12.0, 40.0));
        let original = Point::new(100.25, 200.5);
        let back = placement.to_canvas(placement.to_normalized(original));
        assert!((back.x - original.x).abs() < 1e-6);
        assert!((back.y - original.y).abs() < 1e-6);
    }

    #[test]
    fn test_reproject_keeps_normalized_position() {
        let small = Placement::new(100.0, 100.0).with_transform(2.0, Vec2::ZERO);
        let large = Placement::new(100.0, 100.0).with_transform(4.0, Vec2::new(10.0, 0.0));
        let p = small.reproject(Point::new(100.0, 50.0), &large);
        assert!((p.x - 210.0).abs() < 1e-9);
        assert!((p.y - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_active_prefers_ready_video() {
        let mut background = Background::default();
        background.image = Some(Placement::new(100.0, 100.0).with_transform(2.0, Vec2::ZERO));
        background.video = Some(Placement::new(100.0, 100.0).with_transform(3.0, Vec2::ZERO));

        assert!((background.active(true).scale - 3.0).abs() < f64::EPSILON);
        assert!((background.active(false).scale - 2.0).abs() < f64::EPSILON);

        background.image = None;
        let bare = background.active(false);
        assert!((bare.scale - 1.0).abs() < f64::EPSILON);
        assert!((bare.width - 512.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_invalid_scale_treated_as_identity() {
        let placement = Placement::new(10.0, 10.0).with_transform(f64::NAN, Vec2::ZERO);
        let p = placement.to_canvas(Point::new(1.0, 1.0));
        assert!((p.x - 10.0).abs() < 1e-9);
    }
}
