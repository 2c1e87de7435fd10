//! Selection set keyed by file path.
//!
//! Membership never depends on position, so resorting or repaginating the
//! grid leaves it untouched. Shift-range and drag-paint need state that lives
//! for one pointer gesture; that state is a [`Gesture`] value owned by the
//! caller rather than anything shared.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::trace;

use super::LoadedItem;

/// What a gesture does to every item it touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectAction {
    Select,
    Deselect,
}

/// State of one press-drag-release gesture.
#[derive(Debug, Default, Clone)]
pub struct Gesture {
    anchor: Option<PathBuf>,
    action: Option<SelectAction>,
    visited: HashSet<PathBuf>,
}

impl Gesture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn action(&self) -> Option<SelectAction> {
        self.action
    }

    pub fn anchor(&self) -> Option<&Path> {
        self.anchor.as_deref()
    }

    /// Pointer released. The anchor stays for the next shift-click.
    pub fn release(&mut self) {
        self.visited.clear();
    }
}

pub type SelectionCallback = Box<dyn Fn(usize)>;

#[derive(Default)]
pub struct SelectionModel {
    selected: HashSet<PathBuf>,
    callbacks: Vec<SelectionCallback>,
}

impl SelectionModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.selected.contains(path)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.selected.iter().map(PathBuf::as_path)
    }

    /// Register a callback invoked with the new count after each change.
    pub fn connect_changed<F: Fn(usize) + 'static>(&mut self, callback: F) {
        self.callbacks.push(Box::new(callback));
    }

    /// Flip membership of one item. Returns the new state.
    pub fn toggle(&mut self, item: &LoadedItem) -> bool {
        if !item.is_selectable() {
            return false;
        }
        let now_selected = if self.selected.remove(item.path()) {
            false
        } else {
            self.selected.insert(item.path().to_path_buf());
            true
        };
        self.notify();
        now_selected
    }

    /// Apply `action` to every item between `anchor` and `target` inclusive,
    /// walking `order` as currently laid out. Unknown anchors change nothing.
    pub fn select_range(
        &mut self,
        order: &[LoadedItem],
        anchor: &Path,
        target: &Path,
        action: SelectAction,
    ) -> usize {
        let find = |p: &Path| order.iter().position(|item| item.path() == p);
        let (Some(a), Some(b)) = (find(anchor), find(target)) else {
            return 0;
        };
        let (start, end) = if a <= b { (a, b) } else { (b, a) };
        let changed = order[start..=end]
            .iter()
            .filter(|item| self.apply(item, action))
            .count();
        trace!(start, end, changed, "Range selection applied");
        self.notify();
        changed
    }

    pub fn select_all(&mut self, items: &[LoadedItem]) {
        for item in items {
            self.apply(item, SelectAction::Select);
        }
        self.notify();
    }

    pub fn clear(&mut self) {
        self.selected.clear();
        self.notify();
    }

    pub fn invert(&mut self, items: &[LoadedItem]) {
        for item in items.iter().filter(|item| item.is_selectable()) {
            if !self.selected.remove(item.path()) {
                self.selected.insert(item.path().to_path_buf());
            }
        }
        self.notify();
    }

    /// Pointer press on `item`. Every press toggles the item and its new
    /// state fixes the gesture's action; a shift press then applies that
    /// action from the previous anchor through `item`.
    pub fn press(
        &mut self,
        gesture: &mut Gesture,
        item: &LoadedItem,
        shift: bool,
        order: &[LoadedItem],
    ) {
        gesture.visited.clear();
        gesture.visited.insert(item.path().to_path_buf());

        if !item.is_selectable() {
            return;
        }

        let action = if self.toggle(item) {
            SelectAction::Select
        } else {
            SelectAction::Deselect
        };
        gesture.action = Some(action);

        let previous = gesture.anchor.replace(item.path().to_path_buf());
        if let (true, Some(anchor)) = (shift, previous) {
            self.select_range(order, &anchor, item.path(), action);
        }
    }

    /// Pointer dragged over `item` during the gesture. Each item is touched
    /// at most once per gesture.
    pub fn drag_over(&mut self, gesture: &mut Gesture, item: &LoadedItem) {
        let Some(action) = gesture.action else {
            return;
        };
        if !gesture.visited.insert(item.path().to_path_buf()) {
            return;
        }
        if self.apply(item, action) {
            self.notify();
        }
    }

    fn apply(&mut self, item: &LoadedItem, action: SelectAction) -> bool {
        if !item.is_selectable() {
            return false;
        }
        match action {
            SelectAction::Select => self.selected.insert(item.path().to_path_buf()),
            SelectAction::Deselect => self.selected.remove(item.path()),
        }
    }

    fn notify(&self) {
        for cb in &self.callbacks {
            cb(self.selected.len());
        }
    }
}
