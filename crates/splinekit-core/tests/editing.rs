use kurbo::Point;
use pretty_assertions::assert_eq;
use splinekit_core::{
    Capture, ControlPoint, Document, EditorSession, GestureKind, Layer, Modifiers, MouseButton, PointerEvent,
    Renderer, RendererError, Scene, SplineLayer,
};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Clone, Default)]
struct Recorder(Rc<RefCell<Vec<Scene>>>);

impl Renderer for Recorder {
    fn render(&mut self, scene: &Scene) -> Result<(), RendererError> {
        self.0.borrow_mut().push(scene.clone());
        Ok(())
    }
}

fn spline(coords: &[(f64, f64)]) -> Layer {
    let points = coords.iter().map(|&(x, y)| ControlPoint::new(Point::new(x, y))).collect();
    Layer::Spline(SplineLayer::new("path", points))
}

fn positions(session: &EditorSession) -> Vec<Point> {
    session.active_layer().unwrap().points().iter().map(|p| p.position).collect()
}

fn event_down(x: f64, y: f64, button: MouseButton, modifiers: Modifiers) -> PointerEvent {
    PointerEvent::Down {
        position: Point::new(x, y),
        button,
        modifiers,
    }
}

fn event_move(x: f64, y: f64) -> PointerEvent {
    PointerEvent::Move {
        position: Point::new(x, y),
    }
}

#[test]
fn gestures_release_capture_and_ignore_later_moves() {
    let gestures = [
        (MouseButton::Primary, Modifiers::NONE),
        (MouseButton::Primary, Modifiers::alt()),
        (MouseButton::Middle, Modifiers::alt()),
        (MouseButton::Secondary, Modifiers::alt()),
    ];
    for (button, modifiers) in gestures {
        let mut session = EditorSession::default();
        session.push_point_layer(spline(&[(100.0, 100.0), (200.0, 100.0), (200.0, 200.0)]));

        let begin = session.handle_pointer(event_down(200.0, 100.0, button, modifiers));
        assert_eq!(begin.capture, Capture::Begin);
        session.handle_pointer(event_move(230.0, 140.0));
        let end = session.handle_pointer(PointerEvent::Up {
            position: Point::new(230.0, 140.0),
        });
        assert_eq!(end.capture, Capture::Release);
        assert_eq!(session.gesture_kind(), None);

        let settled = positions(&session);
        for (x, y) in [(0.0, 0.0), (400.0, 20.0), (230.0, 300.0)] {
            let response = session.handle_pointer(event_move(x, y));
            assert_eq!(response.capture, Capture::Keep);
        }
        assert_eq!(positions(&session), settled);
        assert!(session.active_layer().unwrap().points().iter().all(|p| !p.fix));

        // A stray second up has nothing to release.
        let stray = session.handle_pointer(PointerEvent::Up { position: Point::ZERO });
        assert_eq!(stray.capture, Capture::Keep);
    }
}

#[test]
fn cancel_uses_the_same_cleanup_as_up() {
    let mut session = EditorSession::default();
    session.push_point_layer(spline(&[(100.0, 100.0), (200.0, 100.0)]));
    session.handle_pointer(event_down(100.0, 100.0, MouseButton::Primary, Modifiers::NONE));
    session.handle_pointer(event_move(150.0, 150.0));

    let response = session.handle_pointer(PointerEvent::Cancel);
    assert_eq!(response.capture, Capture::Release);
    assert_eq!(positions(&session)[0], Point::new(150.0, 150.0));
    session.handle_pointer(event_move(10.0, 10.0));
    assert_eq!(positions(&session)[0], Point::new(150.0, 150.0));
}

#[test]
fn host_side_cancel_still_releases_capture() {
    let mut session = EditorSession::default();
    session.push_point_layer(spline(&[(100.0, 100.0), (200.0, 100.0)]));

    let begin = session.handle_pointer(event_down(100.0, 100.0, MouseButton::Primary, Modifiers::NONE));
    assert_eq!(begin.capture, Capture::Begin);
    session.handle_pointer(event_move(120.0, 110.0));
    session.set_frame(5);
    assert_eq!(session.gesture_kind(), None);

    let end = session.handle_pointer(PointerEvent::Up {
        position: Point::new(150.0, 150.0),
    });
    assert_eq!(end.capture, Capture::Release);
    assert_eq!(positions(&session)[0], Point::new(120.0, 110.0));

    let stray = session.handle_pointer(PointerEvent::Up { position: Point::ZERO });
    assert_eq!(stray.capture, Capture::Keep);
}

#[test]
fn host_can_release_right_after_cancelling_call() {
    let mut session = EditorSession::default();
    let id = session.push_point_layer(spline(&[(100.0, 100.0), (200.0, 100.0)]));
    assert!(!session.take_pending_release());

    session.handle_pointer(event_down(200.0, 100.0, MouseButton::Primary, Modifiers::NONE));
    session.set_active(None);
    assert!(session.take_pending_release());
    assert!(!session.take_pending_release());

    // Nothing in flight: no release owed.
    session.set_active(Some(id));
    assert!(!session.take_pending_release());
}

#[test]
fn group_rotate_replays_deterministically() {
    let path = [(120.0, 60.0), (100.0, 130.0), (180.0, 90.0), (140.0, 210.0)];
    let run = || {
        let mut session = EditorSession::default();
        session.push_point_layer(spline(&[(100.0, 100.0), (200.0, 100.0), (100.0, 200.0)]));
        session.handle_pointer(event_down(100.0, 100.0, MouseButton::Primary, Modifiers::alt()));
        for &(x, y) in &path {
            session.handle_pointer(event_move(x, y));
        }
        let result = positions(&session);
        session.handle_pointer(event_move(140.0, 210.0));
        session.handle_pointer(event_move(140.0, 210.0));
        assert_eq!(positions(&session), result);
        result
    };

    let first = run();
    assert_eq!(first[0], Point::new(100.0, 100.0));
    assert_eq!(run(), first);
}

#[test]
fn renderer_sees_every_mutation() {
    let recorder = Recorder::default();
    let mut session = EditorSession::default();
    session.set_renderer(Box::new(recorder.clone()));
    session.push_point_layer(spline(&[(100.0, 100.0), (200.0, 100.0)]));

    session.handle_pointer(event_down(200.0, 100.0, MouseButton::Primary, Modifiers::NONE));
    session.handle_pointer(event_move(220.0, 90.0));
    {
        let scenes = recorder.0.borrow();
        let last = scenes.last().unwrap();
        assert_eq!(last.gesture, Some(GestureKind::PointDrag));
        assert_eq!(last.layers[0].points[1].position, Point::new(220.0, 90.0));
    }
    session.handle_pointer(PointerEvent::Up {
        position: Point::new(220.0, 90.0),
    });
    let scenes = recorder.0.borrow();
    assert_eq!(scenes.last().unwrap().gesture, None);
    assert!(scenes.len() >= 4);
}

#[test]
fn document_roundtrip_restores_layers() {
    let mut session = EditorSession::default();
    session.push_point_layer(spline(&[(64.0, 128.0), (256.0, 32.0)]));
    let boxed = session.add_box_layer("box");
    session.apply_frame(boxed, 9);
    session.set_keyframe(boxed);
    session.add_handdraw_layer("ink");
    session.set_active(Some(boxed));

    let json = session.to_json().unwrap();
    let mut restored = EditorSession::default();
    restored.load_json(&json).unwrap();

    assert_eq!(restored.to_document(), session.to_document());
    assert_eq!(restored.active_id(), Some(boxed));
    assert_eq!(restored.timeline().frame, 9);
    assert!(!restored.can_undo());
}

#[test]
fn legacy_document_points_resolve_without_ids() {
    let json = r#"{
        "layers": [{"type": "normal", "points": [{"x": 0.25, "y": 0.25}, {"x": 0.5, "y": 0.25}, {"x": 0.75, "y": 0.25}]}],
        "active": 0
    }"#;
    let document = Document::from_json(json).unwrap();
    let mut session = EditorSession::default();
    session.load_document(document);
    assert!(session.active_layer().unwrap().points().iter().all(|p| p.uid.is_none()));

    session.handle_pointer(event_down(256.0, 128.0, MouseButton::Primary, Modifiers::NONE));
    session.handle_pointer(event_move(256.0, 300.0));
    session.handle_pointer(PointerEvent::Up {
        position: Point::new(256.0, 300.0),
    });
    assert_eq!(positions(&session)[1], Point::new(256.0, 300.0));
}
