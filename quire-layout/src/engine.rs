use serde::{Deserialize, Serialize};

use crate::storage::LayoutStorage;

/// Narrowest a side pane can get, and its width while minimized.
pub const MIN_PANE_WIDTH: f64 = 40.0;
/// Shortest the bottom drawer can get, and its height while minimized.
pub const MIN_DRAWER_HEIGHT: f64 = 28.0;

pub const DEFAULT_LEFT_WIDTH: f64 = 260.0;
pub const DEFAULT_RIGHT_WIDTH: f64 = 320.0;
pub const DEFAULT_BOTTOM_HEIGHT: f64 = 220.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Side {
    Left,
    Right,
    Bottom,
}

impl Side {
    pub fn minimum(self) -> f64 {
        match self {
            Side::Left | Side::Right => MIN_PANE_WIDTH,
            Side::Bottom => MIN_DRAWER_HEIGHT,
        }
    }

    pub fn default_size(self) -> f64 {
        match self {
            Side::Left => DEFAULT_LEFT_WIDTH,
            Side::Right => DEFAULT_RIGHT_WIDTH,
            Side::Bottom => DEFAULT_BOTTOM_HEIGHT,
        }
    }
}

/// Pane geometry. Sizes are the user's chosen pixel sizes and survive
/// minimization; what is drawn comes from [`LayoutState::visible_size`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutState {
    pub left_width: f64,
    pub right_width: f64,
    pub bottom_height: f64,
    pub minimized_left: bool,
    pub minimized_right: bool,
    pub minimized_bottom: bool,
}

impl Default for LayoutState {
    fn default() -> Self {
        LayoutState {
            left_width: DEFAULT_LEFT_WIDTH,
            right_width: DEFAULT_RIGHT_WIDTH,
            bottom_height: DEFAULT_BOTTOM_HEIGHT,
            minimized_left: false,
            minimized_right: false,
            minimized_bottom: false,
        }
    }
}

impl LayoutState {
    pub fn size(&self, side: Side) -> f64 {
        match side {
            Side::Left => self.left_width,
            Side::Right => self.right_width,
            Side::Bottom => self.bottom_height,
        }
    }

    pub fn is_minimized(&self, side: Side) -> bool {
        match side {
            Side::Left => self.minimized_left,
            Side::Right => self.minimized_right,
            Side::Bottom => self.minimized_bottom,
        }
    }

    /// Size to draw: the minimum while minimized, the stored size otherwise.
    pub fn visible_size(&self, side: Side) -> f64 {
        if self.is_minimized(side) {
            side.minimum()
        } else {
            self.size(side)
        }
    }

    fn set_size(&mut self, side: Side, px: f64) {
        match side {
            Side::Left => self.left_width = px,
            Side::Right => self.right_width = px,
            Side::Bottom => self.bottom_height = px,
        }
    }

    fn set_minimized(&mut self, side: Side, minimized: bool) {
        match side {
            Side::Left => self.minimized_left = minimized,
            Side::Right => self.minimized_right = minimized,
            Side::Bottom => self.minimized_bottom = minimized,
        }
    }
}

/// Pointer location in view coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerPosition {
    pub x: f64,
    pub y: f64,
}

impl PointerPosition {
    pub fn new(x: f64, y: f64) -> Self {
        PointerPosition { x, y }
    }
}

/// Document-wide pointer move/up routing. The engine subscribes when a drag
/// starts and unsubscribes when it ends, so no handlers outlive a drag.
pub trait PointerListeners {
    fn subscribe(&mut self);
    fn unsubscribe(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ActiveDrag {
    side: Side,
    origin: PointerPosition,
    start_size: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DragState {
    Idle,
    Dragging(ActiveDrag),
}

/// Three panes (left, editor, right) over a bottom drawer, resized by
/// dragging handles and collapsed by minimize toggles.
pub struct LayoutEngine<S, L> {
    state: LayoutState,
    drag: DragState,
    storage: S,
    listeners: L,
}

impl<S, L> LayoutEngine<S, L>
where
    S: LayoutStorage,
    L: PointerListeners,
{
    /// Restore geometry from `storage`, falling back to defaults per slot.
    pub fn new(storage: S, listeners: L) -> Self {
        let mut state = LayoutState::default();
        for side in [Side::Left, Side::Right, Side::Bottom] {
            if let Some(px) = storage.load_size(side) {
                state.set_size(side, px.max(side.minimum()));
            }
            if let Some(minimized) = storage.load_minimized(side) {
                state.set_minimized(side, minimized);
            }
        }
        LayoutEngine {
            state,
            drag: DragState::Idle,
            storage,
            listeners,
        }
    }

    pub fn state(&self) -> &LayoutState {
        &self.state
    }

    pub fn visible_size(&self, side: Side) -> f64 {
        self.state.visible_size(side)
    }

    pub fn dragging(&self) -> Option<Side> {
        match self.drag {
            DragState::Idle => None,
            DragState::Dragging(active) => Some(active.side),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn listeners(&self) -> &L {
        &self.listeners
    }

    /// Pointer went down on the resize handle of `side`.
    pub fn begin_drag(&mut self, side: Side, at: PointerPosition) {
        if self.dragging().is_some() {
            self.end_drag();
        }

        let start_size = if self.state.is_minimized(side) {
            self.state.set_minimized(side, false);
            self.persist_minimized(side, false);
            self.state.set_size(side, side.minimum());
            side.minimum()
        } else {
            self.state.size(side)
        };

        self.listeners.subscribe();
        self.drag = DragState::Dragging(ActiveDrag {
            side,
            origin: at,
            start_size,
        });
        log::trace!("Drag started on {:?} at {}px", side, start_size);
    }

    /// Pointer moved during a drag. Returns the new size of the dragged pane,
    /// or `None` when no drag is active.
    pub fn drag_to(&mut self, at: PointerPosition) -> Option<f64> {
        let DragState::Dragging(active) = self.drag else {
            return None;
        };
        let dx = at.x - active.origin.x;
        let dy = at.y - active.origin.y;
        let proposed = match active.side {
            Side::Left => active.start_size + dx,
            Side::Right => active.start_size - dx,
            // The drawer handle sits on its top edge: dragging up grows it.
            Side::Bottom => active.start_size - dy,
        };
        let size = proposed.max(active.side.minimum());
        self.state.set_size(active.side, size);
        Some(size)
    }

    /// Pointer released. Persists the dragged pane's size.
    pub fn end_drag(&mut self) {
        let DragState::Dragging(active) = self.drag else {
            return;
        };
        self.drag = DragState::Idle;
        self.listeners.unsubscribe();

        let size = self.state.size(active.side);
        if let Err(e) = self.storage.save_size(active.side, size) {
            log::warn!("Failed to persist {:?} size: {}", active.side, e);
        }
        log::trace!("Drag ended on {:?} at {}px", active.side, size);
    }

    /// Collapse or restore `side`. Returns the new minimized flag.
    ///
    /// Restoring re-applies the persisted pixel size, or the default when
    /// none was ever saved.
    pub fn toggle_minimized(&mut self, side: Side) -> bool {
        let minimized = !self.state.is_minimized(side);
        self.state.set_minimized(side, minimized);
        self.persist_minimized(side, minimized);

        if !minimized {
            let restored = self
                .storage
                .load_size(side)
                .unwrap_or_else(|| side.default_size())
                .max(side.minimum());
            self.state.set_size(side, restored);
        }
        minimized
    }

    fn persist_minimized(&self, side: Side, minimized: bool) {
        if let Err(e) = self.storage.save_minimized(side, minimized) {
            log::warn!("Failed to persist {:?} minimized flag: {}", side, e);
        }
    }
}
