//! Selection rectangle state machine
//!
//! Every pointer, wheel and key interaction ends up as one of the mutators on
//! [`Selection`]. They are plain arithmetic over the owned [`Rect`]; the only
//! operation that can fail is wrapping the active window when the window system
//! gave us no usable geometry, and that is reported instead of propagated.

use tracing::{debug, error};

use crate::constants::{geometry::MIN_SIDE, metric};
use crate::persistence::decode_rectangle;
use crate::presets::PresetTable;
use crate::snapping;
use crate::types::{Bounds, Rect, ScrollDirection, SelectionMode};

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    rect: Rect,
    is_fullscreen: bool,
    /// Rectangle to restore when leaving fullscreen
    saved: Rect,
}

impl Selection {
    pub fn new(rect: Rect) -> Self {
        Self {
            rect,
            is_fullscreen: false,
            saved: rect,
        }
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn is_fullscreen(&self) -> bool {
        self.is_fullscreen
    }

    /// Move the origin, keeping the size
    pub fn position_at(&mut self, x: i32, y: i32) {
        self.rect.x = x;
        self.rect.y = y;
    }

    /// Put the lower-right corner at `(right, lower)`.
    /// The origin is pushed when a side would drop below the minimum.
    pub fn resize_to(&mut self, right: i32, lower: i32) {
        if right - self.rect.x < MIN_SIDE {
            self.rect.x = right - MIN_SIDE;
        }
        if lower - self.rect.y < MIN_SIDE {
            self.rect.y = lower - MIN_SIDE;
        }
        self.rect.width = right - self.rect.x;
        self.rect.height = lower - self.rect.y;
    }

    /// Resize to the preset that fits the rectangle spanned by the origin and
    /// the pointer at `(right, lower)`.
    pub fn snap_drag(&mut self, right: f64, lower: f64, presets: &PresetTable) {
        let min_side = f64::from(MIN_SIDE);
        let mut left = f64::from(self.rect.x);
        let mut upper = f64::from(self.rect.y);

        // push before dropping the sub-pixel part of the pointer position
        if right - left < min_side {
            left = right - min_side;
        }
        if lower - upper < min_side {
            upper = lower - min_side;
        }
        let right = right.trunc();
        let lower = lower.trunc();

        let wanted = (right - left) + (lower - upper) / metric::SCALE;
        let index = snapping::largest_below(presets, wanted);
        let Some(preset) = presets.get(index) else { return };
        debug!(index, width = preset.width, height = preset.height, "Drag snapped to preset");

        self.rect = Rect::new(left as i32, upper as i32, preset.width, preset.height);
    }

    /// Step to the next smaller (`Up`) or larger (`Down`) preset
    pub fn snap_scroll(&mut self, direction: ScrollDirection, presets: &PresetTable) {
        if let Some(preset) = snapping::scroll_target(presets, direction, self.rect.width, self.rect.height)
            .and_then(|index| presets.get(index))
        {
            self.rect.width = preset.width;
            self.rect.height = preset.height;
        }
    }

    /// Keep the rectangle on the monitor. Oversized sides are pinned to the
    /// full monitor extent rather than rejected.
    pub fn clamp_to_monitor(&mut self, bounds: Bounds) {
        (self.rect.x, self.rect.width) = clamp_axis(self.rect.x, self.rect.width, bounds.width);
        (self.rect.y, self.rect.height) = clamp_axis(self.rect.y, self.rect.height, bounds.height);
    }

    /// Switch between the full monitor and the rectangle in use before it
    pub fn toggle_fullscreen(&mut self, bounds: Bounds) {
        self.is_fullscreen = !self.is_fullscreen;
        if self.is_fullscreen {
            self.saved = self.rect;
            self.rect = Rect::new(0, 0, bounds.width, bounds.height);
        } else {
            self.rect = self.saved;
        }
    }

    /// Place the rectangle the first time the overlay is shown.
    /// Returns false when the active window could not be wrapped.
    pub fn initialize_from_mode(
        &mut self,
        mode: SelectionMode,
        active: Rect,
        extents: Rect,
        include_extents: bool,
        previous: (f64, f64),
        bounds: Bounds,
    ) -> bool {
        match mode {
            SelectionMode::Entire | SelectionMode::Interior => {
                self.wrap_active_window(active, extents, include_extents)
            }
            SelectionMode::Center => {
                self.rect = Rect::new(
                    bounds.width / 4,
                    bounds.height / 4,
                    bounds.width / 2,
                    bounds.height / 2,
                );
                true
            }
            SelectionMode::Previous => {
                self.rect = decode_rectangle(previous.0, previous.1);
                true
            }
        }
    }

    pub fn set_x(&mut self, x: i32) {
        self.rect.x = x;
    }

    pub fn set_y(&mut self, y: i32) {
        self.rect.y = y;
    }

    /// Negative sizes are stored as 0
    pub fn set_width(&mut self, width: i32) {
        self.rect.width = width.max(0);
    }

    pub fn set_height(&mut self, height: i32) {
        self.rect.height = height.max(0);
    }

    /// Surround the active window, with or without its frame
    pub fn wrap_active_window(&mut self, active: Rect, extents: Rect, include_extents: bool) -> bool {
        if extents.has_area() && (include_extents || !active.has_area()) {
            self.rect = extents;
            true
        } else if active.has_area() {
            self.rect = active;
            true
        } else {
            error!(
                active = ?active,
                extents = ?extents,
                "Cannot wrap the active window: width or height is zero"
            );
            false
        }
    }
}

fn clamp_axis(origin: i32, extent: i32, bound: i32) -> (i32, i32) {
    let origin = origin.max(0);
    let extent = extent.max(0);
    if origin.saturating_add(extent) > bound {
        if extent >= bound {
            (0, bound)
        } else {
            (bound - extent, extent)
        }
    } else {
        (origin, extent)
    }
}
