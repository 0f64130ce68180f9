//! Best-effort synchronization of a background video with the timeline.

use crate::timeline::frame_to_time;
use serde::{Deserialize, Serialize};

/// Readiness of the background video.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum VideoState {
    #[default]
    Unloaded,
    Loading,
    Ready { duration: f64 },
    Error(String),
}

impl VideoState {
    pub fn is_ready(&self) -> bool {
        matches!(self, VideoState::Ready { .. })
    }
}

/// The host video element, as seen by the timeline.
pub trait VideoElement {
    /// Set `currentTime`.
    fn seek(&mut self, time: f64);
    /// Pause playback if it is running.
    fn pause(&mut self);
}

/// Tracks video readiness and replays the latest seek once ready.
#[derive(Default)]
pub struct VideoSync {
    state: VideoState,
    element: Option<Box<dyn VideoElement>>,
    pending_frame: Option<u32>,
}

impl std::fmt::Debug for VideoSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoSync")
            .field("state", &self.state)
            .field("attached", &self.element.is_some())
            .field("pending_frame", &self.pending_frame)
            .finish()
    }
}

impl VideoSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &VideoState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    pub fn pending_frame(&self) -> Option<u32> {
        self.pending_frame
    }

    /// Attach a new element; it starts loading.
    pub fn attach(&mut self, element: Box<dyn VideoElement>) {
        self.element = Some(element);
        self.state = VideoState::Loading;
        log::info!("Background video attached, waiting for metadata");
    }

    /// Drop the element and forget any pending seek.
    pub fn detach(&mut self) {
        self.element = None;
        self.state = VideoState::Unloaded;
        self.pending_frame = None;
    }

    /// `loadedmetadata`/`canplay`: become ready and replay the pending
    /// seek. Returns true when the state changed.
    pub fn mark_ready(&mut self, duration: f64, num_frames: u32) -> bool {
        if self.element.is_none() {
            log::warn!("Video ready event without an attached element");
            return false;
        }
        let duration = if duration.is_finite() && duration > 0.0 { duration } else { 0.0 };
        let changed = self.state != (VideoState::Ready { duration });
        self.state = VideoState::Ready { duration };
        if changed {
            log::info!("Background video ready ({duration:.3}s)");
        }
        if let Some(frame) = self.pending_frame.take() {
            self.seek_to_frame(frame, num_frames);
        }
        changed
    }

    /// `error`: record the failure; timeline commits keep working.
    pub fn mark_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("Background video failed: {message}");
        self.state = VideoState::Error(message);
    }

    /// Seek to the time of `frame`, or remember it until the video is ready.
    pub fn seek_to_frame(&mut self, frame: u32, num_frames: u32) {
        let duration = match self.state {
            VideoState::Ready { duration } => duration,
            _ => {
                if self.element.is_some() {
                    self.pending_frame = Some(frame);
                }
                return;
            }
        };
        if let Some(element) = self.element.as_mut() {
            element.pause();
            element.seek(frame_to_time(frame, num_frames, duration));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Log {
        seeks: Vec<f64>,
        pauses: usize,
    }

    struct FakeVideo(Rc<RefCell<Log>>);

    impl VideoElement for FakeVideo {
        fn seek(&mut self, time: f64) {
            self.0.borrow_mut().seeks.push(time);
        }

        fn pause(&mut self) {
            self.0.borrow_mut().pauses += 1;
        }
    }

    fn attached() -> (VideoSync, Rc<RefCell<Log>>) {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut sync = VideoSync::new();
        sync.attach(Box::new(FakeVideo(log.clone())));
        (sync, log)
    }

    #[test]
    fn test_seek_before_ready_is_deferred() {
        let (mut sync, log) = attached();
        sync.seek_to_frame(11, 21);
        assert!(log.borrow().seeks.is_empty());
        assert_eq!(sync.pending_frame(), Some(11));

        assert!(sync.mark_ready(10.0, 21));
        assert_eq!(log.borrow().seeks, vec![5.0]);
        assert_eq!(sync.pending_frame(), None);
    }

    #[test]
    fn test_seek_when_ready_pauses_then_seeks() {
        let (mut sync, log) = attached();
        sync.mark_ready(4.0, 5);
        sync.seek_to_frame(5, 5);
        assert_eq!(log.borrow().seeks, vec![4.0]);
        assert_eq!(log.borrow().pauses, 1);
    }

    #[test]
    fn test_error_state_never_seeks() {
        let (mut sync, log) = attached();
        sync.mark_error("decode failed");
        sync.seek_to_frame(3, 10);
        assert!(log.borrow().seeks.is_empty());
        assert!(matches!(sync.state(), VideoState::Error(_)));
    }

    #[test]
    fn test_no_element_is_noop() {
        let mut sync = VideoSync::new();
        sync.seek_to_frame(3, 10);
        assert_eq!(sync.pending_frame(), None);
        assert!(!sync.mark_ready(1.0, 10));
        assert!(!sync.is_ready());
    }
}
