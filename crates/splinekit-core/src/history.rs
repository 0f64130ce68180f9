//! Undo/redo of layer edits.

use crate::layer::{Layer, LayerId};

/// Layer state captured before an edit.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub layers: Vec<Layer>,
    pub active: Option<LayerId>,
}

/// Bounded undo and redo stacks of [`Snapshot`]s.
#[derive(Debug, Clone)]
pub struct History {
    undo_stack: Vec<Snapshot>,
    redo_stack: Vec<Snapshot>,
    depth: usize,
}

impl History {
    pub fn new(depth: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            depth: depth.max(1),
        }
    }

    /// Record the state before a change. Clears the redo stack.
    pub fn push(&mut self, snapshot: Snapshot) {
        self.undo_stack.push(snapshot);
        self.redo_stack.clear();
        if self.undo_stack.len() > self.depth {
            self.undo_stack.remove(0);
        }
    }

    /// Step back. `current` goes onto the redo stack; the restored state is
    /// returned.
    pub fn undo(&mut self, current: Snapshot) -> Option<Snapshot> {
        let snapshot = self.undo_stack.pop()?;
        self.redo_stack.push(current);
        Some(snapshot)
    }

    /// Step forward again after an undo.
    pub fn redo(&mut self, current: Snapshot) -> Option<Snapshot> {
        let snapshot = self.redo_stack.pop()?;
        self.undo_stack.push(current);
        Some(snapshot)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}
