//! Plain geometry and mode types shared across modules

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::warn;

/// Selection rectangle in monitor-relative coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    /// Both sides are non-zero
    pub fn has_area(&self) -> bool {
        self.width != 0 && self.height != 0
    }

    pub fn contains(&self, px: i32, py: i32) -> bool {
        px >= self.x && px < self.right() && py >= self.y && py < self.bottom()
    }

    /// Same rectangle shifted by `(dx, dy)`
    pub fn translated(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Expected X,Y,WxH (for example 10,20,640x360), got '{0}'")]
pub struct RectParseError(String);

/// `X,Y,WxH`, as typed on the command line
impl FromStr for Rect {
    type Err = RectParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || RectParseError(s.to_string());
        let num = |v: &str| v.trim().parse::<i32>().map_err(|_| err());
        let mut parts = s.trim().splitn(3, ',');
        let (Some(x), Some(y), Some(size)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(err());
        };
        let (width, height) = size.split_once(['x', 'X']).ok_or_else(err)?;
        let (width, height) = (num(width)?, num(height)?);
        if width < 0 || height < 0 {
            return Err(err());
        }
        Ok(Rect::new(num(x)?, num(y)?, width, height))
    }
}

/// Size of the monitor surface the selection lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub width: i32,
    pub height: i32,
}

impl Bounds {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

/// One preset size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetEntry {
    pub width: i32,
    pub height: i32,
}

impl PresetEntry {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }
}

/// Difference between frame extents and the client area of the active window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowOffset {
    pub dx: i32,
    pub dy: i32,
    pub dw: i32,
    pub dh: i32,
}

/// Geometry reported by the window system when a session starts.
/// `active` and `extents` are relative to the monitor; `monitor` is in root coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowGeometry {
    pub active: Rect,
    pub extents: Rect,
    pub monitor: Rect,
}

impl WindowGeometry {
    pub fn bounds(&self) -> Bounds {
        Bounds::new(self.monitor.width, self.monitor.height)
    }
}

/// How the rectangle is placed when the overlay first appears
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    /// Active window without decorations
    Interior,
    /// Active window including decorations
    Entire,
    /// Middle fourth of the monitor
    Center,
    /// Rectangle from the previous session
    Previous,
}

impl SelectionMode {
    /// Parse a configuration value; unknown values fall back to `Previous`
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "interior" | "i" => Self::Interior,
            "entire" | "e" => Self::Entire,
            "center" | "c" => Self::Center,
            "previous" | "p" => Self::Previous,
            other => {
                warn!(area = %other, "Unknown selection mode, using previous rectangle");
                Self::Previous
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interior => "interior",
            Self::Entire => "entire",
            Self::Center => "center",
            Self::Previous => "previous",
        }
    }

    /// Whether frame decorations are included when wrapping the active window
    pub fn includes_extents(&self) -> bool {
        !matches!(self, Self::Interior)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}
