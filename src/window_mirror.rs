//! Mirroring the selection onto the active window
//!
//! The selection may wrap the window frame, while the window system positions
//! a window by its client area. The offset between the two is taken once when
//! the session starts and subtracted from the selection before it is applied.

use crate::types::{Rect, WindowOffset};

/// `extents - active`, component-wise
pub fn compute_offset(active: Rect, extents: Rect) -> WindowOffset {
    WindowOffset {
        dx: extents.x - active.x,
        dy: extents.y - active.y,
        dw: extents.width - active.width,
        dh: extents.height - active.height,
    }
}

/// Geometry to hand to the window system for the active window
pub fn apply(rect: Rect, include_extents: bool, offset: WindowOffset) -> Rect {
    if include_extents {
        Rect::new(
            rect.x - offset.dx,
            rect.y - offset.dy,
            rect.width - offset.dw,
            rect.height - offset.dh,
        )
    } else {
        rect
    }
}
