//! SplineKit Core Library
//!
//! Platform-agnostic engine for the spline and keyframe-box editor: the
//! layer model, hit detection, the gesture state machine, and the
//! box-layer timeline.

pub mod background;
pub mod config;
pub mod geometry;
pub mod gesture;
pub mod handdraw;
pub mod history;
pub mod hit;
pub mod input;
pub mod layer;
pub mod persist;
pub mod render;
pub mod session;
pub mod timeline;
pub mod video;
pub mod viewport;

pub use background::{Background, Placement};
pub use config::{ConfigError, EditorConfig};
pub use geometry::{BoxHandleGeometry, clamp_point_scale, compute_box_handle_geometry};
pub use gesture::{GestureError, GestureKind};
pub use input::{Modifiers, MouseButton, PointerEvent};
pub use layer::{BoxKey, BoxLayer, ControlPoint, HanddrawLayer, Layer, LayerId, LayerKind, PointId, SplineLayer};
pub use persist::{Document, PersistError};
pub use render::{Renderer, RendererError, Scene};
pub use session::{Capture, EditorSession, EventResponse};
pub use timeline::Timeline;
pub use video::{VideoElement, VideoState};
pub use viewport::{PointerSample, Viewport};
