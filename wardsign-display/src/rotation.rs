//! Content rotation for Mixed displays
//!
//! The view list is fixed. A Mixed display advances one view per rotation
//! tick, wrapping at the end; a single-content display is frozen on its
//! view. An operator pin holds the chosen view until `resume()`.

use crate::model::{ContentMode, ViewId};
use std::time::Duration;

pub const VIEW_ORDER: [ViewId; 7] = [
    ViewId::Overview,
    ViewId::Queue,
    ViewId::Ot,
    ViewId::Emergency,
    ViewId::Inventory,
    ViewId::Departments,
    ViewId::Education,
];

pub const DEFAULT_SECTION_INTERVAL: Duration = Duration::from_secs(15);
pub const SCREEN_INTERVAL_MIN: Duration = Duration::from_secs(10);
pub const SCREEN_INTERVAL_MAX: Duration = Duration::from_secs(120);

/// Whole-screen rotation interval for kiosk mode, clamped to 10s..=120s
pub fn screen_interval(requested: Duration) -> Duration {
    requested.clamp(SCREEN_INTERVAL_MIN, SCREEN_INTERVAL_MAX)
}

#[derive(Debug, Clone)]
pub struct Rotator {
    views: Vec<ViewId>,
    index: usize,
    mode: ContentMode,
    pinned: bool,
}

impl Rotator {
    /// An empty list falls back to the standard view order.
    pub fn new(views: Vec<ViewId>, mode: ContentMode) -> Self {
        let views = if views.is_empty() { VIEW_ORDER.to_vec() } else { views };
        let mut rotator = Self { views, index: 0, mode: ContentMode::Mixed, pinned: false };
        rotator.set_mode(mode);
        rotator
    }

    pub fn for_mode(mode: ContentMode) -> Self {
        Self::new(VIEW_ORDER.to_vec(), mode)
    }

    pub fn current(&self) -> ViewId {
        self.views[self.index]
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn views(&self) -> &[ViewId] {
        &self.views
    }

    pub fn mode(&self) -> ContentMode {
        self.mode
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned
    }

    /// Automatic advance is active only for an unpinned Mixed display.
    pub fn is_rotating(&self) -> bool {
        self.mode == ContentMode::Mixed && !self.pinned
    }

    /// Unconditional step to the next view.
    pub fn advance(&mut self) -> ViewId {
        self.index = (self.index + 1) % self.views.len();
        self.current()
    }

    /// Rotation timer callback; returns whether the view changed.
    pub fn on_tick(&mut self) -> bool {
        if !self.is_rotating() {
            return false;
        }
        let before = self.index;
        self.advance();
        before != self.index
    }

    /// Switches content mode; a fixed mode jumps to its view.
    /// Returns whether anything changed.
    pub fn set_mode(&mut self, mode: ContentMode) -> bool {
        let changed = mode != self.mode;
        self.mode = mode;
        if let Some(view) = mode.fixed_view() {
            if let Some(pos) = self.position(view) {
                let moved = pos != self.index;
                self.index = pos;
                return changed || moved;
            }
        }
        changed
    }

    /// Operator override. Returns false for a view not in the list.
    pub fn pin(&mut self, view: ViewId) -> bool {
        let Some(pos) = self.position(view) else {
            return false;
        };
        self.index = pos;
        self.pinned = true;
        true
    }

    pub fn resume(&mut self) {
        self.pinned = false;
        if let Some(view) = self.mode.fixed_view() {
            if let Some(pos) = self.position(view) {
                self.index = pos;
            }
        }
    }

    fn position(&self, view: ViewId) -> Option<usize> {
        self.views.iter().position(|v| *v == view)
    }
}
