//! Pointer and modifier input types.

use kurbo::Point;
use serde::{Deserialize, Serialize};

/// Mouse button identifiers, named by DOM button role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    Primary,
    Middle,
    Secondary,
}

impl MouseButton {
    /// Map a DOM `MouseEvent.button` code.
    pub fn from_dom(button: i16) -> Option<Self> {
        match button {
            0 => Some(MouseButton::Primary),
            1 => Some(MouseButton::Middle),
            2 => Some(MouseButton::Secondary),
            _ => None,
        }
    }
}

/// Modifier keys state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    pub const NONE: Self = Self {
        shift: false,
        ctrl: false,
        alt: false,
        meta: false,
    };

    pub fn alt() -> Self {
        Self { alt: true, ..Self::NONE }
    }

    pub fn shift() -> Self {
        Self { shift: true, ..Self::NONE }
    }

    pub fn ctrl() -> Self {
        Self { ctrl: true, ..Self::NONE }
    }

    /// Ctrl on other platforms, Cmd on macOS.
    pub fn command(&self) -> bool {
        self.ctrl || self.meta
    }
}

/// Pointer events in canvas-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PointerEvent {
    Down {
        position: Point,
        button: MouseButton,
        modifiers: Modifiers,
    },
    Move {
        position: Point,
    },
    Up {
        position: Point,
    },
    Cancel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dom_button_codes() {
        assert_eq!(MouseButton::from_dom(0), Some(MouseButton::Primary));
        assert_eq!(MouseButton::from_dom(1), Some(MouseButton::Middle));
        assert_eq!(MouseButton::from_dom(2), Some(MouseButton::Secondary));
        assert_eq!(MouseButton::from_dom(3), None);
    }

    #[test]
    fn test_command_modifier() {
        assert!(Modifiers::ctrl().command());
        assert!(Modifiers { meta: true, ..Modifiers::NONE }.command());
        assert!(!Modifiers::alt().command());
    }
}
